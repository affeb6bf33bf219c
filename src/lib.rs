//! # Prompt Audit Bench
//!
//! Benchmark harness measuring how accurately LLM judges audit system
//! prompts for ethical-policy violations.
//!
//! Each labeled prompt is sent to every judge model with an audit
//! instruction. The judge's JSON verdict is compared against the curated
//! label and the annotated primary violation.
//!
//! ## Architecture
//!
//! ```text
//! Labeled CSV dataset
//!        ↓
//! Audit instruction (prompt + standards reference)
//!        ↓
//! Judge model (OpenAI-compatible chat completions)
//!        ↓
//! Verdict normalization
//!        ↓
//! Outcome classification (correct, FP, FN, standard match)
//!        ↓
//! Per-model aggregation
//!        ↓
//! Report (benchmark_results_*.json) → Leaderboard
//! ```

pub mod aggregate;
pub mod audit;
pub mod config;
pub mod dataset;
pub mod judge;
pub mod leaderboard;
pub mod outcome;
pub mod report;
pub mod runner;
pub mod verdict;

pub use aggregate::{Aggregator, ModelStats, ModelSummary};
pub use audit::{AuditTemplate, SYSTEM_MESSAGE};
pub use config::{
    BenchConfig, ConfigError, JudgeCredentials, JudgeSettings, ModelCatalog, ModelDescriptor,
    ModelSelection, RunSettings, StandardsCatalog,
};
pub use dataset::{
    load_prompts, load_prompts_from_reader, sample_prompts, DatasetError, LoadOptions,
    PromptEntry, PromptLabel,
};
pub use judge::{
    strip_code_fences, HttpJudge, Judge, JudgeCall, JudgeError, JudgeReply, ResponseMode,
};
pub use leaderboard::{
    find_latest_results, latest_leaderboard, merge_reports, rank_rows, render_table,
    Leaderboard, LeaderboardError, LeaderboardMetadata, LeaderboardRow, RankedRow, RunTimestamp,
};
pub use outcome::{classify, ErrorKind, OutcomeStatus, TestOutcome};
pub use report::{run_timestamp, BenchmarkReport, ReportError};
pub use runner::{BenchmarkRunner, CancelFlag, RunnerConfig};
pub use verdict::{parse_verdict, OverallStatus, ParsedVerdict, Verdict, VerdictError};
