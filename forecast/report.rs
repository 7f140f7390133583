//! Terminal and JSON renderings of a forecast.

use crate::format::{GaugeRange, format_currency_whole};
use crate::inference::FeatureImportance;
use crate::pipeline::SingleForecast;

const GAUGE_WIDTH: usize = 40;
const BAR_WIDTH: usize = 30;
const FILLED: char = '█';
const EMPTY: char = '░';

/// The metric line, gauge and importance chart for one forecast.
pub fn render_single(forecast: &SingleForecast) -> String {
    let mut out = format!("Predicted Annual Revenue: {}\n\n", forecast.formatted);
    out.push_str("Revenue Scale (Relative)\n");
    out.push_str(&render_gauge(forecast.prediction, forecast.gauge));
    out.push_str("\n\nWhy this prediction?\n");
    out.push_str(&render_importances(&forecast.top_features));
    out.push_str(
        "Scores are the model's global feature importances and are the same for every company.\n",
    );
    out
}

/// A one-line gauge: `$0 [███░░░] $12,000`, filled in proportion to `value`.
pub fn render_gauge(value: f64, range: GaugeRange) -> String {
    let span = range.max - range.min;
    let fraction = if span > 0.0 {
        ((value - range.min) / span).clamp(0.0, 1.0)
    } else {
        0.0
    };
    let filled = (fraction * GAUGE_WIDTH as f64).round() as usize;

    let bar: String = std::iter::repeat_n(FILLED, filled)
        .chain(std::iter::repeat_n(EMPTY, GAUGE_WIDTH - filled))
        .collect();
    format!(
        "{} [{}] {}",
        format_currency_whole(range.min),
        bar,
        format_currency_whole(range.max)
    )
}

/// Horizontal bars scaled to the largest score, one feature per line.
pub fn render_importances(ranked: &[FeatureImportance]) -> String {
    if ranked.is_empty() {
        return String::from("  (no features)\n");
    }

    let name_width = ranked.iter().map(|f| f.name.chars().count()).max().unwrap_or(0);
    let top_score = ranked.iter().map(|f| f.score).fold(0.0_f64, f64::max);

    let mut out = String::new();
    for feature in ranked {
        let len = if top_score > 0.0 {
            ((feature.score / top_score) * BAR_WIDTH as f64).round() as usize
        } else {
            0
        };
        let bar: String = std::iter::repeat_n(FILLED, len).collect();
        out.push_str(&format!(
            "  {:<name_width$}  {:<BAR_WIDTH$}  {:.4}\n",
            feature.name, bar, feature.score
        ));
    }
    out
}

/// Pretty-printed JSON of the full forecast, including the raw prediction.
pub fn render_json(forecast: &SingleForecast) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(forecast)
}
