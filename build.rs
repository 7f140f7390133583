use grep::regex::RegexMatcher;
use grep::searcher::{Searcher, Sink, SinkMatch};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

// Directories the source policy does not apply to.
const EXCLUDED_DIRS: [&str; 2] = ["./target", "./examples"];

// Collects every matching line of one file so the build error lists all of them.
struct ViolationCollector {
    violations: Vec<String>,
    file_path: PathBuf,
    skip_comments_and_strings: bool,
}

impl ViolationCollector {
    fn new(file_path: &Path, skip_comments_and_strings: bool) -> Self {
        Self {
            violations: Vec::new(),
            file_path: file_path.to_path_buf(),
            skip_comments_and_strings,
        }
    }

    fn check_and_get_error_message(&self, rule: &str) -> Option<String> {
        if self.violations.is_empty() {
            return None;
        }

        let file_name = self.file_path.to_str().unwrap_or("?");
        let mut error_msg = format!(
            "\n❌ ERROR: Found {} violations in {}:\n",
            self.violations.len(),
            file_name
        );
        for violation in &self.violations {
            error_msg.push_str(&format!("   {violation}\n"));
        }
        error_msg.push_str(&format!("\n⚠️ {rule}\n"));
        Some(error_msg)
    }
}

impl Sink for ViolationCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();

        if self.skip_comments_and_strings {
            let is_comment = line_text.trim_start().starts_with("//");
            let is_in_string = line_text
                .split('"')
                .enumerate()
                .any(|(i, part)| i % 2 == 1 && part.contains('_'));
            if is_comment || is_in_string {
                return Ok(true);
            }
        }

        self.violations.push(format!("{line_number}:{line_text}"));
        Ok(true)
    }
}

// Comments whose alphabetic characters are all uppercase read as shouting.
struct UppercaseCommentCollector {
    violations: Vec<String>,
}

impl Sink for UppercaseCommentCollector {
    type Error = std::io::Error;

    fn matched(&mut self, _: &Searcher, mat: &SinkMatch) -> Result<bool, Self::Error> {
        let line_number = mat.line_number().unwrap_or(0);
        let line_text = std::str::from_utf8(mat.bytes()).unwrap_or("").trim_end();
        let trimmed = line_text.trim_start();
        if !trimmed.starts_with("//") {
            return Ok(true);
        }

        let comment_text = trimmed.trim_start_matches(['/', '!']).trim();
        let alpha_chars: Vec<char> = comment_text.chars().filter(|c| c.is_alphabetic()).collect();
        if !alpha_chars.is_empty() && alpha_chars.iter().all(|c| c.is_uppercase()) {
            self.violations.push(format!("{line_number}:{line_text}"));
        }
        Ok(true)
    }
}

fn rust_sources() -> impl Iterator<Item = PathBuf> {
    WalkDir::new(".")
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| !EXCLUDED_DIRS.iter().any(|dir| e.path().starts_with(dir)))
        .filter(|e| e.file_name() != "build.rs")
        .filter(|e| e.path().extension().is_some_and(|ext| ext == "rs"))
        .map(|e| e.into_path())
}

fn scan(pattern: &str, skip_comments_and_strings: bool, rule: &str) -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(pattern)?;
    let mut searcher = Searcher::new();
    for path in rust_sources() {
        let mut collector = ViolationCollector::new(&path, skip_comments_and_strings);
        searcher.search_path(&matcher, &path, &mut collector)?;
        if let Some(error_message) = collector.check_and_get_error_message(rule) {
            return Err(error_message.into());
        }
    }
    Ok(())
}

fn scan_for_uppercase_comments() -> Result<(), Box<dyn Error>> {
    let matcher = RegexMatcher::new_line_matcher(r"//.*")?;
    let mut searcher = Searcher::new();
    for path in rust_sources() {
        let mut collector = UppercaseCommentCollector {
            violations: Vec::new(),
        };
        searcher.search_path(&matcher, &path, &mut collector)?;
        if !collector.violations.is_empty() {
            return Err(format!(
                "\n❌ ERROR: All-uppercase comments in {}:\n   {}\n",
                path.display(),
                collector.violations.join("\n   ")
            )
            .into());
        }
    }
    Ok(())
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    println!("cargo:rustc-env=FINVISION_BUILD_TIMESTAMP={timestamp}");

    let checks: [(&str, bool, &str); 3] = [
        (
            r"\b(_[a-zA-Z0-9_]+)\b",
            true,
            "Underscore-prefixed names are not allowed. Use the binding or remove it.",
        ),
        (
            r"#\[allow\(dead_code\)\]",
            false,
            "#[allow(dead_code)] is not allowed. Use the code or remove it.",
        ),
        (
            r"//.*\b(?:FIXED|FIX|CHANGED|MODIFIED|UPDATED)\b",
            false,
            "Changelog-style comments are not allowed. Describe what the code does.",
        ),
    ];

    for (pattern, skip_comments_and_strings, rule) in checks {
        if let Err(e) = scan(pattern, skip_comments_and_strings, rule) {
            eprintln!("{e}");
            std::process::exit(1);
        }
    }

    if let Err(e) = scan_for_uppercase_comments() {
        eprintln!("{e}");
        std::process::exit(1);
    }
}
