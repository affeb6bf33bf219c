//! Benchmark driver.
//!
//! Runs every prompt entry against every model, one blocking judge call at
//! a time, folding outcomes into per-model stats as they arrive.

use crate::aggregate::Aggregator;
use crate::audit::AuditTemplate;
use crate::config::ModelDescriptor;
use crate::dataset::PromptEntry;
use crate::judge::Judge;
use crate::outcome::{classify, TestOutcome};
use crate::report::{run_timestamp, BenchmarkReport};
use crate::verdict::parse_verdict;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Run-level abort switch shared with whoever may stop the run
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop before its next judge call
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Runner configuration
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Pause after every judge call
    pub delay: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(1),
        }
    }
}

impl RunnerConfig {
    /// Config with a delay in seconds; negative or invalid values mean none
    #[must_use]
    pub fn with_delay_secs(delay_secs: f64) -> Self {
        Self {
            delay: Duration::try_from_secs_f64(delay_secs).unwrap_or(Duration::ZERO),
        }
    }
}

/// Sequential benchmark runner over a judge
pub struct BenchmarkRunner<'a, J: Judge + ?Sized> {
    judge: &'a J,
    template: AuditTemplate,
    config: RunnerConfig,
    cancel: CancelFlag,
}

impl<'a, J: Judge + ?Sized> BenchmarkRunner<'a, J> {
    /// Create a runner with default configuration
    #[must_use]
    pub fn new(judge: &'a J, template: AuditTemplate) -> Self {
        Self {
            judge,
            template,
            config: RunnerConfig::default(),
            cancel: CancelFlag::new(),
        }
    }

    /// Replace the runner configuration
    #[must_use]
    pub fn with_config(mut self, config: RunnerConfig) -> Self {
        self.config = config;
        self
    }

    /// Share an existing cancel flag
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle that stops this runner when raised
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Get the runner configuration
    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Test one entry against one model. Every failure becomes an error
    /// outcome.
    #[must_use]
    pub fn run_one(&self, entry: &PromptEntry, model: &ModelDescriptor) -> TestOutcome {
        let instruction = self.template.render(&entry.text);
        let call = self.judge.judge(&model.id, &instruction);

        let reply = match call.result {
            Ok(reply) => reply,
            Err(e) => {
                tracing::warn!(model = %model.id, prompt = %entry.id, error = %e, "Judge call failed");
                return TestOutcome::failure(entry, model, call.latency, e.to_string());
            }
        };

        match parse_verdict(&reply.content) {
            Ok(parsed) => classify(entry, model, call.latency, reply.tokens_used, parsed),
            Err(e) => {
                tracing::warn!(model = %model.id, prompt = %entry.id, error = %e, "Unusable verdict");
                TestOutcome::failure(entry, model, call.latency, e.to_string())
            }
        }
    }

    /// Run entries × models and build the report.
    ///
    /// A raised cancel flag stops the run before the next call; outcomes
    /// gathered so far are still reported.
    #[must_use]
    pub fn run(&self, entries: &[PromptEntry], models: &[ModelDescriptor]) -> BenchmarkReport {
        let timestamp = run_timestamp();
        let total = entries.len() * models.len();
        let mut results = Vec::with_capacity(total);
        let mut stats = Aggregator::new();

        tracing::info!(
            prompts = entries.len(),
            models = models.len(),
            total,
            "Starting benchmark run"
        );

        'run: for entry in entries {
            for model in models {
                if self.cancel.is_cancelled() {
                    tracing::warn!(
                        completed = results.len(),
                        total,
                        "Benchmark cancelled, keeping partial results"
                    );
                    break 'run;
                }

                tracing::info!(
                    progress = results.len() + 1,
                    total,
                    model = %model.id,
                    prompt = %entry.id,
                    "Testing prompt"
                );

                let outcome = self.run_one(entry, model);
                stats.record(&outcome);
                results.push(outcome);

                if !self.config.delay.is_zero() {
                    std::thread::sleep(self.config.delay);
                }
            }
        }

        BenchmarkReport::new(timestamp, results, &stats)
    }
}
