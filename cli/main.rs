#![deny(unused_variables)]
#![deny(dead_code)]
#![deny(unused_imports)]
#![deny(clippy::no_effect_underscore_binding)]

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::process;

use finvision::assets::{ModelAssets, StartupError, shared_assets};
use finvision::config::ForecastConfig;
use finvision::pipeline::{forecast_batch_file, forecast_single, importance_ranking};
use finvision::report::{render_importances, render_json, render_single};
use finvision::schema::FormInput;

/// Company financials for a single forecast. Omitted fields keep the form defaults.
#[derive(Args)]
pub struct PredictArgs {
    /// Total value of assets held by the company [default: 5000]
    #[arg(long, allow_negative_numbers = true)]
    pub assets: Option<f64>,

    /// Total liabilities [default: 3000]
    #[arg(long, allow_negative_numbers = true)]
    pub liabilities: Option<f64>,

    /// Employee count [default: 120]
    #[arg(long)]
    pub employees: Option<u64>,

    /// Cash and equivalents [default: 800]
    #[arg(long, allow_negative_numbers = true)]
    pub cash: Option<f64>,

    /// Retained earnings, may be negative [default: 1500]
    #[arg(long, allow_negative_numbers = true)]
    pub retained_earnings: Option<f64>,

    /// Fiscal market value [default: 12000]
    #[arg(long, allow_negative_numbers = true)]
    pub market_value: Option<f64>,

    /// Total inventory [default: 400]
    #[arg(long, allow_negative_numbers = true)]
    pub inventory: Option<f64>,

    /// Stockholders equity [default: 2000]
    #[arg(long, allow_negative_numbers = true)]
    pub equity: Option<f64>,

    /// Total debt divided by total assets [default: 0.45]
    #[arg(long, allow_negative_numbers = true)]
    pub debt_ratio: Option<f64>,

    /// Print the forecast as JSON instead of the text report
    #[arg(long)]
    pub json: bool,
}

impl PredictArgs {
    fn to_form(&self) -> FormInput {
        let defaults = FormInput::default();
        FormInput {
            assets: self.assets.unwrap_or(defaults.assets),
            liabilities: self.liabilities.unwrap_or(defaults.liabilities),
            employees: self.employees.unwrap_or(defaults.employees),
            cash: self.cash.unwrap_or(defaults.cash),
            retained_earnings: self.retained_earnings.unwrap_or(defaults.retained_earnings),
            market_value: self.market_value.unwrap_or(defaults.market_value),
            inventory: self.inventory.unwrap_or(defaults.inventory),
            equity: self.equity.unwrap_or(defaults.equity),
            debt_ratio: self.debt_ratio.unwrap_or(defaults.debt_ratio),
        }
    }
}

#[derive(Args)]
pub struct BatchArgs {
    /// Comma-separated file with one company per row; the header must include every model feature
    pub input: PathBuf,

    /// Where to write the results [default: forecast_results.csv]
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// Number of result rows to print after writing
    #[arg(long, default_value = "5")]
    pub preview: usize,
}

#[derive(Args)]
pub struct ImportanceArgs {
    /// Number of features to list [default: 10]
    #[arg(long, value_parser = clap::builder::RangedU64ValueParser::<usize>::new().range(1..))]
    pub top: Option<usize>,
}

#[derive(Parser)]
#[command(
    name = "finvision",
    about = "Corporate revenue forecasting from company financials",
    long_about = "Predicts annual revenue with a pretrained regression model, either for a \
                 single company described on the command line or for every row of a CSV file."
)]
struct Cli {
    /// Settings file [default: finvision.toml when present]
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Pretrained model artifact [default: revenue_model.toml]
    #[arg(long, global = true, value_name = "PATH")]
    model: Option<PathBuf>,

    /// Ordered feature list for the model [default: model_features.toml]
    #[arg(long, global = true, value_name = "PATH")]
    features: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Forecast revenue for a single company
    #[command(about = "Forecast revenue for one company")]
    Predict(PredictArgs),

    /// Forecast revenue for every row of a CSV file
    #[command(about = "Forecast a CSV of companies (outputs: forecast_results.csv)")]
    Batch(BatchArgs),

    /// Show the model's most influential features
    #[command(about = "List the model's global feature importances")]
    Importance(ImportanceArgs),

    /// Display version and build information
    #[command(about = "Display version and build information")]
    Version,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let Cli {
        config,
        model,
        features,
        command,
    } = cli;

    let command = match command {
        Some(Commands::Version) => {
            print_version_info();
            return;
        }
        Some(command) => command,
        None => {
            if let Err(e) = Cli::command().print_help() {
                eprintln!("Error: {e}");
                process::exit(1);
            }
            println!();
            return;
        }
    };

    let settings = match resolve_config(config, model, features) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    // Missing artifacts end the session before any request is served.
    let assets = match shared_assets(&settings.model_path, &settings.features_path) {
        Ok(assets) => assets,
        Err(e) => {
            report_startup_failure(&e, &settings);
            process::exit(1);
        }
    };

    let result = match command {
        Commands::Predict(args) => run_predict(assets, &settings, &args),
        Commands::Batch(args) => run_batch(assets, &settings, args),
        Commands::Importance(args) => run_importance(assets, &settings, &args),
        Commands::Version => Ok(()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn resolve_config(
    config: Option<PathBuf>,
    model: Option<PathBuf>,
    features: Option<PathBuf>,
) -> Result<ForecastConfig, Box<dyn std::error::Error>> {
    let mut settings = ForecastConfig::discover(config.as_deref())?;
    if let Some(path) = model {
        settings.model_path = path;
    }
    if let Some(path) = features {
        settings.features_path = path;
    }
    Ok(settings)
}

fn report_startup_failure(error: &StartupError, settings: &ForecastConfig) {
    eprintln!("Error: {error}");
    eprintln!(
        "Model files not found or unusable. Please ensure '{}' and '{}' exist and match each other.",
        settings.model_path.display(),
        settings.features_path.display()
    );
}

fn run_predict(
    assets: &ModelAssets,
    settings: &ForecastConfig,
    args: &PredictArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let form = args.to_form();
    let forecast = forecast_single(assets, &form, settings)?;

    if args.json {
        println!("{}", render_json(&forecast)?);
    } else {
        print!("{}", render_single(&forecast));
    }
    Ok(())
}

fn run_batch(
    assets: &ModelAssets,
    settings: &ForecastConfig,
    args: BatchArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = args.output.unwrap_or_else(|| settings.output_path.clone());

    println!("Forecasting companies in: {}", args.input.display());
    let batch = forecast_batch_file(assets, &args.input, &output)?;
    println!(
        "Forecast {} companies. Results saved to: {}",
        batch.table.height(),
        batch.output_path.display()
    );

    if args.preview > 0 {
        println!("{}", batch.table.head(Some(args.preview)));
    }
    Ok(())
}

fn run_importance(
    assets: &ModelAssets,
    settings: &ForecastConfig,
    args: &ImportanceArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let k = args.top.unwrap_or(settings.top_k);
    let ranked = importance_ranking(assets, k)?;
    println!("Top {} of {} model features:", ranked.len(), assets.schema().len());
    print!("{}", render_importances(&ranked));
    Ok(())
}

/// Format seconds into a human-readable duration like "2.4 hours ago"
fn format_duration_ago(seconds: u64) -> String {
    const MINUTE: u64 = 60;
    const HOUR: u64 = 60 * MINUTE;
    const DAY: u64 = 24 * HOUR;

    if seconds < MINUTE {
        format!("{} seconds ago", seconds)
    } else if seconds < HOUR {
        format!("{:.1} minutes ago", seconds as f64 / MINUTE as f64)
    } else if seconds < DAY {
        format!("{:.1} hours ago", seconds as f64 / HOUR as f64)
    } else {
        format!("{:.1} days ago", seconds as f64 / DAY as f64)
    }
}

fn print_version_info() {
    let version = env!("CARGO_PKG_VERSION");
    let build_timestamp: u64 = env!("FINVISION_BUILD_TIMESTAMP").parse().unwrap_or(0);

    println!("finvision {}", version);

    if build_timestamp > 0 {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        if now > build_timestamp {
            println!("Built: {}", format_duration_ago(now - build_timestamp));
        } else {
            println!("Built: just now");
        }
    }
}
