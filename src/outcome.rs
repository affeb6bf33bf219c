//! Outcome classification.
//!
//! Joins a prompt entry with a model's verdict and decides whether the
//! judgment was correct, whether it was a false positive or negative, and
//! whether the claimed primary violation matches the curated annotation.

use crate::config::ModelDescriptor;
use crate::dataset::{PromptEntry, PromptLabel};
use crate::verdict::{OverallStatus, ParsedVerdict};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;

/// Whether the judge call produced a verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Success,
    Error,
}

/// Human-readable classification of a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "Model not available")]
    ModelNotAvailable,
    #[serde(rename = "Invalid response")]
    InvalidResponse,
    #[serde(rename = "JSON parse error")]
    JsonParseError,
    #[serde(rename = "Unknown error")]
    Unknown,
}

impl ErrorKind {
    /// Classify an error from its message text
    #[must_use]
    pub fn classify(message: &str) -> Self {
        let message = message.to_lowercase();
        if message.contains("model")
            && (message.contains("not found") || message.contains("does not exist"))
        {
            Self::ModelNotAvailable
        } else if message.contains("response") || message.contains("none") {
            Self::InvalidResponse
        } else if message.contains("json") {
            Self::JsonParseError
        } else {
            Self::Unknown
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ModelNotAvailable => "Model not available",
            Self::InvalidResponse => "Invalid response",
            Self::JsonParseError => "JSON parse error",
            Self::Unknown => "Unknown error",
        })
    }
}

/// Result of testing one prompt entry against one model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub model_id: String,
    pub model_name: String,
    pub prompt_id: String,
    pub expected_label: PromptLabel,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    pub status: OutcomeStatus,
    /// Seconds, rounded to two decimals
    pub latency: f64,
    #[serde(default)]
    pub tokens_used: u64,
    #[serde(default)]
    pub overall_status: OverallStatus,
    #[serde(default)]
    pub compliance_rate: u8,
    #[serde(default)]
    pub violations_count: usize,
    #[serde(default)]
    pub primary_standard_id: Option<String>,
    #[serde(default)]
    pub primary_subcategory: Option<String>,
    #[serde(default)]
    pub expected_standard_id: Option<String>,
    #[serde(default)]
    pub expected_subcategory: Option<String>,
    #[serde(default)]
    pub standard_match: Option<bool>,
    #[serde(default)]
    pub subcategory_match: Option<bool>,
    #[serde(default)]
    pub overall_correct: Option<bool>,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_type: Option<ErrorKind>,
    /// Raw verdict object returned by the judge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Map<String, Value>>,
}

impl TestOutcome {
    /// Whether the judge produced a verdict
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    /// Benign prompt judged as failing
    #[must_use]
    pub fn is_false_positive(&self) -> bool {
        self.is_success()
            && self.expected_label == PromptLabel::Good
            && self.overall_status == OverallStatus::Fail
    }

    /// Violating prompt judged as passing
    #[must_use]
    pub fn is_false_negative(&self) -> bool {
        self.is_success()
            && self.expected_label == PromptLabel::Bad
            && self.overall_status == OverallStatus::Pass
    }

    /// Build an error outcome for a failed call
    #[must_use]
    pub fn failure(
        entry: &PromptEntry,
        model: &ModelDescriptor,
        latency: Duration,
        message: impl Into<String>,
    ) -> Self {
        let message = message.into();
        let error_type = ErrorKind::classify(&message);
        Self {
            status: OutcomeStatus::Error,
            error: Some(message),
            error_type: Some(error_type),
            ..Self::skeleton(entry, model, latency)
        }
    }

    fn skeleton(entry: &PromptEntry, model: &ModelDescriptor, latency: Duration) -> Self {
        Self {
            model_id: model.id.clone(),
            model_name: model.name.clone(),
            prompt_id: entry.id.clone(),
            expected_label: entry.expected_label.clone(),
            category: entry.category.clone(),
            subcategory: entry.subcategory.clone(),
            status: OutcomeStatus::Success,
            latency: round2(latency.as_secs_f64()),
            tokens_used: 0,
            overall_status: OverallStatus::Unknown,
            compliance_rate: 0,
            violations_count: 0,
            primary_standard_id: None,
            primary_subcategory: None,
            expected_standard_id: normalized_target(entry.standard_id.as_deref()),
            expected_subcategory: normalized_target(entry.subcategory.as_deref()),
            standard_match: None,
            subcategory_match: None,
            overall_correct: None,
            reasoning: String::new(),
            error: None,
            error_type: None,
            result: None,
        }
    }
}

/// Whether a verdict status is the right call for a label.
///
/// `None` for labels outside good / bad / mixed.
#[must_use]
pub fn overall_correct(label: &PromptLabel, status: OverallStatus) -> Option<bool> {
    match label {
        PromptLabel::Good => Some(status == OverallStatus::Pass),
        PromptLabel::Bad => Some(status == OverallStatus::Fail),
        PromptLabel::Mixed => Some(status.is_decisive()),
        PromptLabel::Other(_) => None,
    }
}

/// Case- and trim-insensitive comparison against an expected target.
///
/// `None` when there is no expected value; a missing prediction is a miss.
#[must_use]
pub fn attribute_match(expected: Option<&str>, predicted: Option<&str>) -> Option<bool> {
    let expected = normalize_for_compare(expected)?;
    Some(normalize_for_compare(predicted).is_some_and(|p| p == expected))
}

fn normalize_for_compare(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_lowercase)
}

fn normalized_target(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn round2(value: f64) -> f64 {
    (value.max(0.0) * 100.0).round() / 100.0
}

/// Classify a successful judge call
#[must_use]
pub fn classify(
    entry: &PromptEntry,
    model: &ModelDescriptor,
    latency: Duration,
    tokens_used: u64,
    parsed: ParsedVerdict,
) -> TestOutcome {
    let skeleton = TestOutcome::skeleton(entry, model, latency);
    let verdict = parsed.verdict;

    let standard_match = attribute_match(
        skeleton.expected_standard_id.as_deref(),
        verdict.primary_standard_id.as_deref(),
    );
    let subcategory_match = attribute_match(
        skeleton.expected_subcategory.as_deref(),
        verdict.primary_subcategory.as_deref(),
    );

    TestOutcome {
        tokens_used,
        overall_correct: overall_correct(&entry.expected_label, verdict.overall_status),
        overall_status: verdict.overall_status,
        compliance_rate: verdict.compliance_rate,
        violations_count: verdict.violations_count,
        primary_standard_id: verdict.primary_standard_id,
        primary_subcategory: verdict.primary_subcategory,
        standard_match,
        subcategory_match,
        reasoning: verdict.reasoning,
        result: Some(parsed.raw),
        ..skeleton
    }
}
