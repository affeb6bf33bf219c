//! Per-model aggregation of test outcomes.
//!
//! `ModelStats` is a fold over `TestOutcome`s. Every counter is an integer
//! and latency is summed in whole microseconds, so the fold gives identical
//! results for any ordering of the same outcomes.

use crate::dataset::PromptLabel;
use crate::outcome::TestOutcome;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mutable per-model accumulator
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelStats {
    pub name: String,
    pub total_tests: u64,
    pub success_tests: u64,
    pub correct_assessments: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub total_good_prompts: u64,
    pub total_bad_prompts: u64,
    pub standard_matches: u64,
    pub total_standard_targets: u64,
    pub subcategory_matches: u64,
    pub total_subcategory_targets: u64,
    pub total_tokens: u64,
    /// Per-call latencies in seconds, kept sorted ascending
    pub latencies: Vec<f64>,
    latency_micros: u64,
    latency_count: u64,
    /// Report files that contributed to these stats
    pub sources: Vec<String>,
}

/// Serialized per-model summary stored in a report file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSummary {
    pub name: String,
    pub total_tests: u64,
    pub success_tests: u64,
    pub avg_latency: f64,
    pub total_tokens: u64,
    pub correct_assessments: u64,
    pub latencies: Vec<f64>,
    pub standard_matches: u64,
    pub subcategory_matches: u64,
    #[serde(alias = "standard_targets")]
    pub total_standard_targets: u64,
    #[serde(alias = "subcategory_targets")]
    pub total_subcategory_targets: u64,
    pub false_positives: u64,
    pub false_negatives: u64,
    pub total_good_prompts: u64,
    pub total_bad_prompts: u64,
    /// False positive rate as a percentage
    pub fp_rate: f64,
    /// False negative rate as a percentage
    pub fn_rate: f64,
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_micros(seconds: f64) -> u64 {
    if seconds.is_finite() && seconds > 0.0 {
        (seconds * 1_000_000.0).round() as u64
    } else {
        0
    }
}

#[allow(clippy::cast_precision_loss)]
fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

impl ModelStats {
    /// Empty stats for a model display name
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Fold one outcome into the stats.
    ///
    /// Error outcomes only count toward `total_tests`.
    pub fn record(&mut self, outcome: &TestOutcome) {
        if self.name.is_empty() {
            self.name.clone_from(&outcome.model_name);
        }
        self.total_tests += 1;
        if !outcome.is_success() {
            return;
        }

        self.success_tests += 1;
        self.total_tokens += outcome.tokens_used;
        self.insert_latency(outcome.latency);
        self.latency_micros += to_micros(outcome.latency);
        self.latency_count += 1;

        match outcome.expected_label {
            PromptLabel::Good => self.total_good_prompts += 1,
            PromptLabel::Bad => self.total_bad_prompts += 1,
            _ => {}
        }

        if outcome.overall_correct == Some(true) {
            self.correct_assessments += 1;
        } else if outcome.is_false_positive() {
            self.false_positives += 1;
        } else if outcome.is_false_negative() {
            self.false_negatives += 1;
        }

        if let Some(matched) = outcome.standard_match {
            self.total_standard_targets += 1;
            self.standard_matches += u64::from(matched);
        }
        if let Some(matched) = outcome.subcategory_match {
            self.total_subcategory_targets += 1;
            self.subcategory_matches += u64::from(matched);
        }
    }

    /// Merge a pre-aggregated summary from another report.
    ///
    /// Latency uses the exact sample list when present, otherwise the
    /// average times the test count.
    pub fn merge_summary(&mut self, summary: &ModelSummary) {
        if self.name.is_empty() {
            self.name.clone_from(&summary.name);
        }
        self.total_tests += summary.total_tests;
        self.success_tests += summary.success_tests;
        self.correct_assessments += summary.correct_assessments;
        self.false_positives += summary.false_positives;
        self.false_negatives += summary.false_negatives;
        self.total_good_prompts += summary.total_good_prompts;
        self.total_bad_prompts += summary.total_bad_prompts;
        self.standard_matches += summary.standard_matches;
        self.total_standard_targets += summary.total_standard_targets;
        self.subcategory_matches += summary.subcategory_matches;
        self.total_subcategory_targets += summary.total_subcategory_targets;
        self.total_tokens += summary.total_tokens;

        if summary.latencies.is_empty() {
            if summary.total_tests > 0 && summary.avg_latency > 0.0 {
                #[allow(clippy::cast_precision_loss)]
                let total = summary.avg_latency * summary.total_tests as f64;
                self.latency_micros += to_micros(total);
                self.latency_count += summary.total_tests;
            }
        } else {
            for &latency in &summary.latencies {
                self.insert_latency(latency);
            }
            self.latency_micros += summary.latencies.iter().copied().map(to_micros).sum::<u64>();
            self.latency_count += summary.latencies.len() as u64;
        }
    }

    /// Remember a contributing source, once
    pub fn add_source(&mut self, source: &str) {
        if !self.sources.iter().any(|s| s == source) {
            self.sources.push(source.to_string());
        }
    }

    /// Correct assessments over total tests
    #[must_use]
    pub fn accuracy(&self) -> f64 {
        ratio(self.correct_assessments, self.total_tests)
    }

    /// Successful calls over total tests
    #[must_use]
    pub fn success_rate(&self) -> f64 {
        ratio(self.success_tests, self.total_tests)
    }

    /// False positives over good prompts, as a fraction
    #[must_use]
    pub fn fp_rate(&self) -> f64 {
        ratio(self.false_positives, self.total_good_prompts)
    }

    /// False negatives over bad prompts, as a fraction
    #[must_use]
    pub fn fn_rate(&self) -> f64 {
        ratio(self.false_negatives, self.total_bad_prompts)
    }

    /// `None` when no entry carried an expected standard
    #[must_use]
    pub fn standard_match_rate(&self) -> Option<f64> {
        (self.total_standard_targets > 0)
            .then(|| ratio(self.standard_matches, self.total_standard_targets))
    }

    /// `None` when no entry carried an expected subcategory
    #[must_use]
    pub fn subcategory_match_rate(&self) -> Option<f64> {
        (self.total_subcategory_targets > 0)
            .then(|| ratio(self.subcategory_matches, self.total_subcategory_targets))
    }

    /// Mean latency in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn avg_latency(&self) -> Option<f64> {
        (self.latency_count > 0)
            .then(|| self.latency_micros as f64 / self.latency_count as f64 / 1_000_000.0)
    }

    /// Mean tokens per successful call
    #[must_use]
    pub fn avg_tokens(&self) -> Option<f64> {
        (self.success_tests > 0).then(|| ratio(self.total_tokens, self.success_tests))
    }

    fn insert_latency(&mut self, latency: f64) {
        let at = self
            .latencies
            .partition_point(|l| l.total_cmp(&latency).is_le());
        self.latencies.insert(at, latency);
    }

    /// Snapshot for persistence
    #[must_use]
    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            name: self.name.clone(),
            total_tests: self.total_tests,
            success_tests: self.success_tests,
            avg_latency: self.avg_latency().unwrap_or(0.0),
            total_tokens: self.total_tokens,
            correct_assessments: self.correct_assessments,
            latencies: self.latencies.clone(),
            standard_matches: self.standard_matches,
            subcategory_matches: self.subcategory_matches,
            total_standard_targets: self.total_standard_targets,
            total_subcategory_targets: self.total_subcategory_targets,
            false_positives: self.false_positives,
            false_negatives: self.false_negatives,
            total_good_prompts: self.total_good_prompts,
            total_bad_prompts: self.total_bad_prompts,
            fp_rate: self.fp_rate() * 100.0,
            fn_rate: self.fn_rate() * 100.0,
        }
    }
}

impl ModelSummary {
    /// Rebuild stats from this summary alone
    #[must_use]
    pub fn to_stats(&self) -> ModelStats {
        let mut stats = ModelStats::default();
        stats.merge_summary(self);
        stats
    }
}

/// Stats for every model in a run or merged set of runs, keyed by model id
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    models: BTreeMap<String, ModelStats>,
}

impl Aggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold an outcome into its model's stats
    pub fn record(&mut self, outcome: &TestOutcome) {
        self.models
            .entry(outcome.model_id.clone())
            .or_default()
            .record(outcome);
    }

    /// Merge a summary read from `source`
    pub fn merge_summary(&mut self, model_id: &str, summary: &ModelSummary, source: &str) {
        let stats = self.models.entry(model_id.to_string()).or_default();
        stats.merge_summary(summary);
        if stats.name.is_empty() {
            stats.name = model_id.to_string();
        }
        stats.add_source(source);
    }

    #[must_use]
    pub fn get(&self, model_id: &str) -> Option<&ModelStats> {
        self.models.get(model_id)
    }

    /// Iterate stats in model-id order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ModelStats)> {
        self.models.iter().map(|(id, stats)| (id.as_str(), stats))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    /// Summaries for persistence, keyed by model id
    #[must_use]
    pub fn summaries(&self) -> BTreeMap<String, ModelSummary> {
        self.models
            .iter()
            .map(|(id, stats)| (id.clone(), stats.summary()))
            .collect()
    }
}

impl<'a> FromIterator<&'a TestOutcome> for Aggregator {
    fn from_iter<I: IntoIterator<Item = &'a TestOutcome>>(iter: I) -> Self {
        let mut aggregator = Self::new();
        for outcome in iter {
            aggregator.record(outcome);
        }
        aggregator
    }
}
