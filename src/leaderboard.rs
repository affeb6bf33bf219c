//! Leaderboard ranking over persisted benchmark summaries.
//!
//! Rows are derived purely from the `summary` map of report files, so a
//! leaderboard can be rebuilt without re-reading individual outcomes.

use crate::aggregate::{Aggregator, ModelStats, ModelSummary};
use crate::config::ModelCatalog;
use chrono::{DateTime, Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};
use thiserror::Error;

/// File name pattern of persisted benchmark reports
pub const RESULTS_PATTERN: &str = "benchmark_results_*.json";

/// Run timestamp format used in report file names and payloads
pub const RUN_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

/// Leaderboard query errors
#[derive(Error, Debug)]
pub enum LeaderboardError {
    #[error("No benchmark results found in {}", dir.display())]
    NoData { dir: PathBuf },

    #[error("Benchmark results file {file} is empty or invalid")]
    InvalidData { file: String },

    #[error("Invalid results pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// One model's derived leaderboard metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardRow {
    pub model_id: String,
    pub model_name: String,
    pub provider: Option<String>,
    pub accuracy: f64,
    pub success_rate: f64,
    pub false_positives: u64,
    pub false_negatives: u64,
    /// Percentage
    pub fp_rate: f64,
    /// Percentage
    pub fn_rate: f64,
    pub total_good_prompts: u64,
    pub total_bad_prompts: u64,
    pub total_tests: u64,
    pub success_tests: u64,
    pub correct_assessments: u64,
    pub standard_match_rate: Option<f64>,
    pub subcategory_match_rate: Option<f64>,
    pub standard_matches: u64,
    pub total_standard_targets: u64,
    pub subcategory_matches: u64,
    pub total_subcategory_targets: u64,
    pub avg_latency: Option<f64>,
    pub avg_tokens: Option<f64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<String>,
}

impl LeaderboardRow {
    /// Derive a row from a persisted summary
    #[must_use]
    pub fn from_summary(model_id: &str, summary: &ModelSummary, catalog: &ModelCatalog) -> Self {
        Self::from_stats(model_id, &summary.to_stats(), catalog)
    }

    /// Derive a row from live or merged stats
    #[must_use]
    pub fn from_stats(model_id: &str, stats: &ModelStats, catalog: &ModelCatalog) -> Self {
        let descriptor = catalog.get(model_id);
        let model_name = if stats.name.trim().is_empty() || stats.name == model_id {
            descriptor.map_or_else(|| model_id.to_string(), |d| d.name.clone())
        } else {
            stats.name.clone()
        };

        Self {
            model_id: model_id.to_string(),
            model_name,
            provider: descriptor.map(|d| d.provider.clone()),
            accuracy: stats.accuracy(),
            success_rate: stats.success_rate(),
            false_positives: stats.false_positives,
            false_negatives: stats.false_negatives,
            fp_rate: stats.fp_rate() * 100.0,
            fn_rate: stats.fn_rate() * 100.0,
            total_good_prompts: stats.total_good_prompts,
            total_bad_prompts: stats.total_bad_prompts,
            total_tests: stats.total_tests,
            success_tests: stats.success_tests,
            correct_assessments: stats.correct_assessments,
            standard_match_rate: stats.standard_match_rate(),
            subcategory_match_rate: stats.subcategory_match_rate(),
            standard_matches: stats.standard_matches,
            total_standard_targets: stats.total_standard_targets,
            subcategory_matches: stats.subcategory_matches,
            total_subcategory_targets: stats.total_subcategory_targets,
            avg_latency: stats.avg_latency(),
            avg_tokens: stats.avg_tokens(),
            sources: stats.sources.clone(),
        }
    }

    /// Rows for every model in an aggregator, in model-id order
    #[must_use]
    pub fn from_aggregator(aggregator: &Aggregator, catalog: &ModelCatalog) -> Vec<Self> {
        aggregator
            .iter()
            .map(|(id, stats)| Self::from_stats(id, stats, catalog))
            .collect()
    }
}

/// A row with its rank and display percentages
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedRow {
    pub rank: usize,
    #[serde(flatten)]
    pub row: LeaderboardRow,
    pub accuracy_pct: f64,
    pub standard_match_pct: Option<f64>,
    pub subcategory_match_pct: Option<f64>,
}

fn round_to(value: f64, scale: f64) -> f64 {
    (value * scale).round() / scale
}

fn round6(value: f64) -> f64 {
    round_to(value, 1_000_000.0)
}

fn pct1(rate: f64) -> f64 {
    round_to(rate * 100.0, 10.0)
}

/// Greater means ranked higher. Missing match rates sort below any
/// measured rate, including zero.
fn compare_rows(a: &LeaderboardRow, b: &LeaderboardRow) -> Ordering {
    let missing = |rate: Option<f64>| rate.map_or(-1.0, round6);
    round6(a.accuracy)
        .total_cmp(&round6(b.accuracy))
        .then_with(|| missing(a.standard_match_rate).total_cmp(&missing(b.standard_match_rate)))
        .then_with(|| {
            missing(a.subcategory_match_rate).total_cmp(&missing(b.subcategory_match_rate))
        })
        .then_with(|| (-round6(a.fp_rate)).total_cmp(&-round6(b.fp_rate)))
        .then_with(|| a.total_tests.cmp(&b.total_tests))
}

/// Sort rows best first, keep the first `top` when `top > 0`, assign ranks.
///
/// The sort is stable, so fully tied rows keep their input order.
#[must_use]
pub fn rank_rows(mut rows: Vec<LeaderboardRow>, top: usize) -> Vec<RankedRow> {
    rows.sort_by(|a, b| compare_rows(b, a));
    if top > 0 {
        rows.truncate(top);
    }
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| RankedRow {
            rank: index + 1,
            accuracy_pct: pct1(row.accuracy),
            standard_match_pct: row.standard_match_rate.map(pct1),
            subcategory_match_pct: row.subcategory_match_rate.map(pct1),
            row,
        })
        .collect()
}

/// Run timestamp in the forms a display layer needs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunTimestamp {
    pub raw: Option<String>,
    pub iso: Option<String>,
    pub display: Option<String>,
    pub date: Option<String>,
}

impl RunTimestamp {
    /// Parse a `YYYYmmdd_HHMMSS` stamp, echoing unparseable text as-is
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Self {
        let Some(raw) = raw.filter(|r| !r.is_empty()) else {
            return Self::default();
        };
        match NaiveDateTime::parse_from_str(raw, RUN_TIMESTAMP_FORMAT) {
            Ok(dt) => Self {
                raw: Some(raw.to_string()),
                iso: Some(dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
                display: Some(dt.format("%Y-%m-%d %H:%M:%S").to_string()),
                date: Some(dt.format("%Y-%m-%d").to_string()),
            },
            Err(_) => Self {
                raw: Some(raw.to_string()),
                iso: None,
                display: Some(raw.to_string()),
                date: Some(raw.to_string()),
            },
        }
    }
}

/// Where a leaderboard came from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardMetadata {
    /// File name of the report
    pub source: String,
    /// Report modification time, RFC 3339
    pub last_updated: Option<String>,
    pub total_models: usize,
    pub benchmark_timestamp: Option<String>,
    pub benchmark_timestamp_iso: Option<String>,
    pub benchmark_timestamp_display: Option<String>,
    pub benchmark_date_display: Option<String>,
}

/// Ranked rows plus metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    pub rows: Vec<RankedRow>,
    pub metadata: LeaderboardMetadata,
}

/// The parts of a report file a leaderboard reads
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StoredSummary {
    timestamp: Option<String>,
    summary: BTreeMap<String, ModelSummary>,
}

fn read_summary(path: &Path) -> Option<StoredSummary> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Cannot read benchmark file");
            return None;
        }
    };
    match serde_json::from_str::<StoredSummary>(&content) {
        Ok(stored) if !stored.summary.is_empty() => Some(stored),
        Ok(_) => {
            tracing::warn!(path = %path.display(), "No summary section in benchmark file");
            None
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "Failed to parse benchmark file");
            None
        }
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned())
}

impl Leaderboard {
    /// Rank the summaries of one report file
    ///
    /// # Errors
    ///
    /// Returns `InvalidData` when the file is unreadable, malformed, or has
    /// no summaries, and `Io` when its metadata cannot be read.
    pub fn from_file(path: &Path, top: usize, catalog: &ModelCatalog) -> Result<Self, LeaderboardError> {
        let source = file_name(path);
        let stored = read_summary(path).ok_or_else(|| LeaderboardError::InvalidData {
            file: source.clone(),
        })?;

        let modified = std::fs::metadata(path)?.modified()?;
        let last_updated = DateTime::<Local>::from(modified).to_rfc3339();

        let rows: Vec<LeaderboardRow> = stored
            .summary
            .iter()
            .map(|(id, summary)| LeaderboardRow::from_summary(id, summary, catalog))
            .collect();
        let rows = rank_rows(rows, top);
        let stamp = RunTimestamp::parse(stored.timestamp.as_deref());

        Ok(Self {
            metadata: LeaderboardMetadata {
                source,
                last_updated: Some(last_updated),
                total_models: rows.len(),
                benchmark_timestamp: stamp.raw,
                benchmark_timestamp_iso: stamp.iso,
                benchmark_timestamp_display: stamp.display,
                benchmark_date_display: stamp.date,
            },
            rows,
        })
    }

    /// Render as a text table
    #[must_use]
    pub fn to_text(&self) -> String {
        let mut output = String::new();
        writeln!(output, "Source: {}", self.metadata.source).ok();
        if let Some(display) = &self.metadata.benchmark_timestamp_display {
            writeln!(output, "Run:    {display}").ok();
        }
        writeln!(output).ok();
        output.push_str(&render_table(&self.rows));
        output
    }
}

/// Newest report file in `dir` by modification time
///
/// # Errors
///
/// Returns an error if the search pattern is invalid. Matches whose
/// metadata cannot be read are skipped with a warning.
pub fn find_latest_results(dir: &Path) -> Result<Option<PathBuf>, LeaderboardError> {
    let pattern = dir.join(RESULTS_PATTERN);
    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;

    for path in glob::glob(&pattern.to_string_lossy())?.flatten() {
        let modified = match std::fs::metadata(&path).and_then(|m| m.modified()) {
            Ok(modified) => modified,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable results file");
                continue;
            }
        };
        let is_newer = newest
            .as_ref()
            .map_or(true, |(time, best)| (modified, &path) > (*time, best));
        if is_newer {
            newest = Some((modified, path));
        }
    }

    Ok(newest.map(|(_, path)| path))
}

/// Leaderboard for the newest report in `dir`
///
/// # Errors
///
/// Returns `NoData` when `dir` has no report files and `InvalidData` when the
/// newest one is empty or invalid.
pub fn latest_leaderboard(
    dir: &Path,
    top: usize,
    catalog: &ModelCatalog,
) -> Result<Leaderboard, LeaderboardError> {
    let latest = find_latest_results(dir)?.ok_or_else(|| LeaderboardError::NoData {
        dir: dir.to_path_buf(),
    })?;
    tracing::info!(path = %latest.display(), "Loading latest benchmark results");
    Leaderboard::from_file(&latest, top, catalog)
}

/// Merge the summaries of several report files.
///
/// Missing or malformed files are skipped with a warning.
#[must_use]
pub fn merge_reports<P: AsRef<Path>>(paths: &[P]) -> Aggregator {
    let mut aggregator = Aggregator::new();
    for path in paths {
        let path = path.as_ref();
        let Some(stored) = read_summary(path) else {
            continue;
        };
        let source = path.display().to_string();
        for (model_id, summary) in &stored.summary {
            aggregator.merge_summary(model_id, summary, &source);
        }
    }
    aggregator
}

#[derive(Tabled)]
struct LeaderboardTableRow {
    #[tabled(rename = "Rank")]
    rank: usize,
    #[tabled(rename = "Model")]
    model: String,
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Accuracy")]
    accuracy: String,
    #[tabled(rename = "FP")]
    fp: String,
    #[tabled(rename = "FN")]
    fn_: String,
    #[tabled(rename = "StdMatch")]
    standard: String,
    #[tabled(rename = "SubMatch")]
    subcategory: String,
    #[tabled(rename = "Success")]
    success: String,
    #[tabled(rename = "Tests")]
    tests: u64,
    #[tabled(rename = "Avg Latency")]
    latency: String,
    #[tabled(rename = "Avg Tokens")]
    tokens: String,
}

/// Count with its rate, or the bare count when the rate has no denominator
pub(crate) fn count_with_rate(count: u64, denominator: u64, rate_pct: f64) -> String {
    if denominator > 0 {
        format!("{count} ({rate_pct:.1}%)")
    } else {
        count.to_string()
    }
}

/// `matches/targets`, or N/A without targets
pub(crate) fn fraction_or_na(matches: u64, targets: u64) -> String {
    if targets > 0 {
        format!("{matches}/{targets}")
    } else {
        "N/A".to_string()
    }
}

/// Render ranked rows as a table
#[must_use]
pub fn render_table(rows: &[RankedRow]) -> String {
    let table_rows: Vec<LeaderboardTableRow> = rows
        .iter()
        .map(|ranked| {
            let r = &ranked.row;
            LeaderboardTableRow {
                rank: ranked.rank,
                model: r.model_name.clone(),
                provider: r.provider.clone().unwrap_or_else(|| "-".to_string()),
                accuracy: format!("{:.1}%", ranked.accuracy_pct),
                fp: count_with_rate(r.false_positives, r.total_good_prompts, r.fp_rate),
                fn_: count_with_rate(r.false_negatives, r.total_bad_prompts, r.fn_rate),
                standard: fraction_or_na(r.standard_matches, r.total_standard_targets),
                subcategory: fraction_or_na(r.subcategory_matches, r.total_subcategory_targets),
                success: format!("{:.1}%", r.success_rate * 100.0),
                tests: r.total_tests,
                latency: r
                    .avg_latency
                    .map_or_else(|| "N/A".to_string(), |v| format!("{v:.2}s")),
                tokens: r
                    .avg_tokens
                    .map_or_else(|| "N/A".to_string(), |v| format!("{v:.1}")),
            }
        })
        .collect();

    Table::new(table_rows).to_string()
}
