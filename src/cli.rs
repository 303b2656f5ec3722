//! Argument parsing and result rendering for the `git-leak-scan` binary.

use std::fs;
use std::path::Path;

use chrono::DateTime;
use clap::{Parser, ValueEnum};
use colored::Colorize;
use comfy_table::{
    modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL, Attribute, Cell, ContentArrangement, Table,
};

use git_leak_scan::{ContentRuleSpec, FilePathRuleSpec, ScanResult};

#[derive(Parser)]
#[command(name = "git-leak-scan")]
#[command(about = "Scans a Git repository's full history for leaked secrets", long_about = None)]
pub struct Cli {
    /// Path to the repository to scan
    pub repository: std::path::PathBuf,

    /// Glob matched against local branch names; only commits reachable from
    /// a matching branch are walked
    #[arg(long, default_value = "*")]
    pub branches: String,

    /// Commits authored strictly before this point are excluded from the
    /// report (their ancestors are still walked for dedup purposes). Accepts
    /// either an RFC3339 timestamp or a Unix second count; "0" disables the
    /// filter
    #[arg(long, default_value = "0", value_parser = parse_since)]
    pub since: i64,

    /// Worker thread count (default: host CPU count)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Disable the built-in secret pattern pack (on by default)
    #[arg(long)]
    pub no_default_rules: bool,

    /// Add a content rule as NAME=PATTERN (repeatable); PATTERN must contain
    /// exactly one capturing group
    #[arg(long = "rule", value_parser = parse_rule)]
    pub rules: Vec<(String, String)>,

    /// Load additional content and file-path rules from a file of
    /// tab-separated `kind\tname\tpattern` lines (`kind` is `content` or
    /// `path`), read once at startup; not consulted again during the scan
    #[arg(long = "rules-file")]
    pub rules_file: Option<std::path::PathBuf>,

    /// Skip files whose extension is in this list (repeatable, no leading dot)
    #[arg(long = "skip-ext")]
    pub skip_extensions: Vec<String>,

    /// Skip files whose path contains this substring (repeatable)
    #[arg(long = "skip-path")]
    pub skip_paths: Vec<String>,

    /// Output format
    #[arg(long, value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Enable verbose (debug-level) logging
    #[arg(short, long)]
    pub verbose: bool,
}

fn parse_rule(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((name, pattern)) if !name.is_empty() && !pattern.is_empty() => {
            Ok((name.to_string(), pattern.to_string()))
        }
        _ => Err(format!("expected NAME=PATTERN, got {raw:?}")),
    }
}

fn parse_since(raw: &str) -> Result<i64, String> {
    if let Ok(seconds) = raw.parse::<i64>() {
        return Ok(seconds);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.timestamp())
        .map_err(|err| format!("expected a Unix timestamp or an RFC3339 date, got {raw:?}: {err}"))
}

/// One row loaded from a `--rules-file`, already dispatched by kind.
pub enum LoadedRule {
    Content(ContentRuleSpec),
    FilePath(FilePathRuleSpec),
}

/// Reads `kind\tname\tpattern` lines from `path`, where `kind` is `content`
/// or `path` (case-insensitive). Blank lines and lines starting with `#`
/// are skipped.
pub fn load_rules_file(path: &Path) -> Result<Vec<LoadedRule>, String> {
    let text = fs::read_to_string(path).map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| parse_rules_file_line(path, line))
        .collect()
}

fn parse_rules_file_line(path: &Path, line: &str) -> Result<LoadedRule, String> {
    let mut columns = line.splitn(3, '\t');
    let (Some(kind), Some(name), Some(pattern)) = (columns.next(), columns.next(), columns.next()) else {
        return Err(format!(
            "expected KIND\\tNAME\\tPATTERN in {}, got {line:?}",
            path.display()
        ));
    };

    match kind.to_ascii_lowercase().as_str() {
        "content" => Ok(LoadedRule::Content(ContentRuleSpec {
            name: name.to_string(),
            pattern: pattern.to_string(),
            whitelist: Vec::new(),
            blacklist: Vec::new(),
        })),
        "path" | "file_path" => Ok(LoadedRule::FilePath(FilePathRuleSpec {
            name: name.to_string(),
            pattern: pattern.to_string(),
        })),
        other => Err(format!(
            "unknown rule kind {other:?} in {} (expected \"content\" or \"path\")",
            path.display()
        )),
    }
}

#[derive(Copy, Clone, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

pub fn render(results: &[ScanResult], format: OutputFormat) {
    match format {
        OutputFormat::Table => render_table(results),
        OutputFormat::Json => render_json(results),
    }
}

fn render_table(results: &[ScanResult]) {
    if results.is_empty() {
        println!("{}", "no matches found".green());
        return;
    }

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("rule").add_attribute(Attribute::Bold),
            Cell::new("file").add_attribute(Attribute::Bold),
            Cell::new("commit").add_attribute(Attribute::Bold),
            Cell::new("author").add_attribute(Attribute::Bold),
            Cell::new("time").add_attribute(Attribute::Bold),
            Cell::new("match").add_attribute(Attribute::Bold),
        ]);

    for r in results {
        table.add_row(vec![
            Cell::new(&r.rule_name),
            Cell::new(&r.file_path),
            Cell::new(&r.commit_id[..r.commit_id.len().min(12)]),
            Cell::new(&r.author_name),
            Cell::new(&r.commit_time),
            Cell::new(&r.match_text),
        ]);
    }

    println!("{table}");
    println!("{}", format!("{} match(es) found", results.len()).red().bold());
}

fn render_json(results: &[ScanResult]) {
    match serde_json::to_string_pretty(results) {
        Ok(json) => println!("{json}"),
        Err(err) => eprintln!("failed to serialize results: {err}"),
    }
}
