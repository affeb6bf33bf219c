//! Benchmark report persistence and rendering.
//!
//! A report is the hand-off artifact of a run: the flat outcome list plus a
//! per-model summary map. Leaderboards are regenerated from the summary map
//! alone.

use crate::aggregate::{Aggregator, ModelSummary};
use crate::config::ModelCatalog;
use crate::leaderboard::{
    count_with_rate, fraction_or_na, rank_rows, LeaderboardRow, RankedRow, RUN_TIMESTAMP_FORMAT,
};
use crate::outcome::TestOutcome;
use chrono::Local;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as FmtWrite;
use std::path::{Path, PathBuf};
use tabled::{Table, Tabled};
use thiserror::Error;

/// Report persistence errors
#[derive(Error, Debug)]
pub enum ReportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Timestamp for a run starting now, `YYYYmmdd_HHMMSS` in local time
#[must_use]
pub fn run_timestamp() -> String {
    Local::now().format(RUN_TIMESTAMP_FORMAT).to_string()
}

/// Persisted benchmark report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    /// Run timestamp, `YYYYmmdd_HHMMSS`
    pub timestamp: String,
    /// Every outcome in execution order
    pub results: Vec<TestOutcome>,
    /// Per-model summaries keyed by model id
    pub summary: BTreeMap<String, ModelSummary>,
}

impl BenchmarkReport {
    /// Build a report from outcomes and their aggregate
    #[must_use]
    pub fn new(timestamp: impl Into<String>, results: Vec<TestOutcome>, stats: &Aggregator) -> Self {
        Self {
            timestamp: timestamp.into(),
            results,
            summary: stats.summaries(),
        }
    }

    /// Build a report, aggregating the outcomes
    #[must_use]
    pub fn from_outcomes(timestamp: impl Into<String>, results: Vec<TestOutcome>) -> Self {
        let stats: Aggregator = results.iter().collect();
        Self::new(timestamp, results, &stats)
    }

    /// `benchmark_results_{timestamp}.json`
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("benchmark_results_{}.json", self.timestamp)
    }

    /// Render report as JSON
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write the report into `dir`, returning the file path
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or file cannot be written.
    pub fn save_in(&self, dir: &Path) -> Result<PathBuf, ReportError> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(self.file_name());
        std::fs::write(&path, self.to_json()?)?;
        tracing::info!(path = %path.display(), outcomes = self.results.len(), "Saved benchmark report");
        Ok(path)
    }

    /// Load a report from disk
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ReportError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Ranked leaderboard rows from the summary map
    #[must_use]
    pub fn ranked(&self, catalog: &ModelCatalog) -> Vec<RankedRow> {
        let rows = self
            .summary
            .iter()
            .map(|(id, summary)| LeaderboardRow::from_summary(id, summary, catalog))
            .collect();
        rank_rows(rows, 0)
    }

    /// Render report as plain text, naming models from `catalog`
    #[must_use]
    pub fn to_text(&self, catalog: &ModelCatalog, show_details: bool) -> String {
        let mut output = String::new();

        writeln!(
            output,
            "═══════════════════════════════════════════════════════════════"
        )
        .ok();
        writeln!(output, "  BENCHMARK REPORT ({})", self.timestamp).ok();
        writeln!(
            output,
            "═══════════════════════════════════════════════════════════════"
        )
        .ok();
        writeln!(output).ok();

        if self.results.is_empty() {
            writeln!(output, "No results to report.").ok();
            return output;
        }

        writeln!(output, "MODEL PERFORMANCE COMPARISON").ok();
        writeln!(
            output,
            "───────────────────────────────────────────────────────────────"
        )
        .ok();

        let rows: Vec<ComparisonTableRow> = self
            .ranked(catalog)
            .iter()
            .map(|ranked| {
                let r = &ranked.row;
                ComparisonTableRow {
                    model: r.model_name.clone(),
                    accuracy: format!("{}/{}", r.correct_assessments, r.total_tests),
                    fp: count_with_rate(r.false_positives, r.total_good_prompts, r.fp_rate),
                    fn_: count_with_rate(r.false_negatives, r.total_bad_prompts, r.fn_rate),
                    standard: fraction_or_na(r.standard_matches, r.total_standard_targets),
                    subcategory: fraction_or_na(r.subcategory_matches, r.total_subcategory_targets),
                }
            })
            .collect();
        writeln!(output, "{}", Table::new(rows)).ok();

        if show_details {
            writeln!(output).ok();
            writeln!(output, "DETAILED TEST RESULTS").ok();
            writeln!(
                output,
                "───────────────────────────────────────────────────────────────"
            )
            .ok();
            for outcome in &self.results {
                write_outcome(&mut output, outcome);
            }
        }

        output
    }
}

/// Table row for the comparison table
#[derive(Tabled)]
struct ComparisonTableRow {
    #[tabled(rename = "Model")]
    model: String,
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
}

fn mark(value: bool) -> &'static str {
    if value {
        "✓"
    } else {
        "✗"
    }
}

fn write_outcome(output: &mut String, outcome: &TestOutcome) {
    writeln!(output).ok();
    writeln!(
        output,
        "[{}] {} - {} prompt",
        outcome.model_name, outcome.prompt_id, outcome.expected_label
    )
    .ok();

    if !outcome.is_success() {
        writeln!(output, "  Status: ✗ Failed").ok();
        if let Some(kind) = outcome.error_type {
            writeln!(output, "  Error Type: {kind}").ok();
        }
        if let Some(error) = &outcome.error {
            writeln!(output, "  Error: {error}").ok();
        }
        return;
    }

    writeln!(output, "  Status: ✓ Success").ok();
    writeln!(output, "  Latency: {:.2}s", outcome.latency).ok();
    writeln!(output, "  Tokens: {}", outcome.tokens_used).ok();
    writeln!(output, "  Assessment: {}", outcome.overall_status).ok();
    writeln!(output, "  Compliance Rate: {}%", outcome.compliance_rate).ok();
    writeln!(output, "  Violations Found: {}", outcome.violations_count).ok();
    if let Some(correct) = outcome.overall_correct {
        writeln!(output, "  Assessment Correct: {}", mark(correct)).ok();
    }
    if outcome.category.is_some() || outcome.subcategory.is_some() {
        writeln!(
            output,
            "  Category/Subcategory: {} / {}",
            outcome.category.as_deref().unwrap_or("-"),
            outcome.subcategory.as_deref().unwrap_or("-")
        )
        .ok();
    }
    if let Some(expected) = &outcome.expected_standard_id {
        writeln!(
            output,
            "  Standard: expected {expected}, predicted {} {}",
            outcome.primary_standard_id.as_deref().unwrap_or("-"),
            mark(outcome.standard_match == Some(true))
        )
        .ok();
    }
    if let Some(expected) = &outcome.expected_subcategory {
        writeln!(
            output,
            "  Subcategory: expected {expected}, predicted {} {}",
            outcome.primary_subcategory.as_deref().unwrap_or("-"),
            mark(outcome.subcategory_match == Some(true))
        )
        .ok();
    }
    if !outcome.reasoning.is_empty() {
        writeln!(output, "  Reasoning: {}", outcome.reasoning).ok();
    }
}
