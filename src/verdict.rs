//! Verdict normalization.
//!
//! Judges answer with free-form JSON whose layout drifts between models.
//! This module turns that JSON into a canonical [`Verdict`]. The primary
//! violation attribution is found through an ordered chain of extractors,
//! each filling only the attributes still missing.

use crate::dataset::scalar_text;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use thiserror::Error;

/// Errors that can occur while normalizing a verdict
#[derive(Error, Debug)]
pub enum VerdictError {
    #[error("Malformed verdict JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Malformed verdict JSON: expected an object, got {0}")]
    NotAnObject(&'static str),
}

/// Overall judgment of a system prompt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OverallStatus {
    Pass,
    Fail,
    /// Absent or unrecognized status
    #[default]
    Unknown,
}

impl OverallStatus {
    /// Parse a status value (trimmed, case-insensitive)
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "PASS" => Self::Pass,
            "FAIL" => Self::Fail,
            _ => Self::Unknown,
        }
    }

    /// Whether the judge committed to PASS or FAIL
    #[must_use]
    pub const fn is_decisive(self) -> bool {
        matches!(self, Self::Pass | Self::Fail)
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Unknown => "UNKNOWN",
        })
    }
}

/// Normalized judgment for one (entry, model) pair
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Verdict {
    pub overall_status: OverallStatus,
    /// Best-effort 0-100 score
    pub compliance_rate: u8,
    pub violations_count: usize,
    pub primary_standard_id: Option<String>,
    pub primary_subcategory: Option<String>,
    pub reasoning: String,
}

/// A verdict together with the raw JSON object it came from
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedVerdict {
    pub verdict: Verdict,
    pub raw: Map<String, Value>,
}

/// Primary violation attribution, possibly partial
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrimaryIssue {
    pub standard_id: Option<String>,
    pub subcategory: Option<String>,
}

impl PrimaryIssue {
    fn is_complete(&self) -> bool {
        self.standard_id.is_some() && self.subcategory.is_some()
    }

    fn is_empty(&self) -> bool {
        self.standard_id.is_none() && self.subcategory.is_none()
    }

    /// Fill missing attributes from a later candidate
    fn fill_from(&mut self, candidate: Self) {
        if self.standard_id.is_none() {
            self.standard_id = candidate.standard_id;
        }
        if self.subcategory.is_none() {
            self.subcategory = candidate.subcategory;
        }
    }

    fn from_object(object: &Map<String, Value>, standard_key: &str, subcategory_key: &str) -> Self {
        Self {
            standard_id: object.get(standard_key).and_then(scalar_text),
            subcategory: object.get(subcategory_key).and_then(scalar_text),
        }
    }
}

/// One step of the primary-issue fallback chain
type IssueExtractor = fn(&Map<String, Value>) -> PrimaryIssue;

/// Extraction order: top-level fields, nested `primary_issue`, then `detected_issues`
const ISSUE_EXTRACTORS: &[IssueExtractor] = &[top_level_issue, nested_primary_issue, first_detected_issue];

fn top_level_issue(raw: &Map<String, Value>) -> PrimaryIssue {
    PrimaryIssue::from_object(raw, "primary_standard_id", "primary_subcategory")
}

fn nested_primary_issue(raw: &Map<String, Value>) -> PrimaryIssue {
    raw.get("primary_issue")
        .and_then(Value::as_object)
        .map(|issue| PrimaryIssue::from_object(issue, "standard_id", "subcategory"))
        .unwrap_or_default()
}

fn first_detected_issue(raw: &Map<String, Value>) -> PrimaryIssue {
    raw.get("detected_issues")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_object)
        .map(|issue| PrimaryIssue::from_object(issue, "standard_id", "subcategory"))
        .find(|issue| !issue.is_empty())
        .unwrap_or_default()
}

/// Run the extractor chain over a verdict object
#[must_use]
pub fn extract_primary_issue(raw: &Map<String, Value>) -> PrimaryIssue {
    let mut issue = PrimaryIssue::default();
    for extractor in ISSUE_EXTRACTORS {
        if issue.is_complete() {
            break;
        }
        issue.fill_from(extractor(raw));
    }
    issue
}

/// Parse fence-stripped judge text into a verdict
///
/// # Errors
///
/// Returns `VerdictError` if the text is not JSON or not a JSON object.
pub fn parse_verdict(text: &str) -> Result<ParsedVerdict, VerdictError> {
    let raw = match serde_json::from_str::<Value>(text)? {
        Value::Object(map) => map,
        Value::Array(_) => return Err(VerdictError::NotAnObject("array")),
        Value::String(_) => return Err(VerdictError::NotAnObject("string")),
        Value::Number(_) => return Err(VerdictError::NotAnObject("number")),
        Value::Bool(_) => return Err(VerdictError::NotAnObject("boolean")),
        Value::Null => return Err(VerdictError::NotAnObject("null")),
    };

    let issue = extract_primary_issue(&raw);

    let verdict = Verdict {
        overall_status: raw
            .get("overall_status")
            .and_then(Value::as_str)
            .map_or(OverallStatus::Unknown, OverallStatus::parse),
        compliance_rate: raw.get("compliance_rate").map_or(0, compliance_rate),
        violations_count: raw
            .get("violations")
            .and_then(Value::as_array)
            .map_or(0, Vec::len),
        primary_standard_id: issue.standard_id,
        primary_subcategory: issue.subcategory,
        reasoning: raw
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    };

    Ok(ParsedVerdict { verdict, raw })
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn compliance_rate(value: &Value) -> u8 {
    let rate = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };
    rate.filter(|r| r.is_finite())
        .map_or(0, |r| r.round().clamp(0.0, 100.0) as u8)
}
