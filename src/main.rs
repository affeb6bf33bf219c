//! Prompt Audit Bench CLI
//!
//! Benchmark LLM judges on labeled system prompts and rank them.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use prompt_audit_bench::{
    latest_leaderboard, load_prompts, merge_reports, rank_rows, render_table, sample_prompts,
    AuditTemplate, BenchConfig, BenchmarkRunner, CancelFlag, HttpJudge, JudgeCredentials, LeaderboardRow,
    LoadOptions, ModelCatalog, ModelDescriptor, ModelSelection, RunnerConfig,
};
use std::path::PathBuf;
use tabled::{Table, Tabled};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "prompt-audit-bench")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the benchmark against judge models
    Run {
        /// YAML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Model selection: benchmark, all, openai, chinese
        #[arg(long, default_value = "benchmark")]
        models: ModelSelection,

        /// Explicit model id (repeatable, overrides the selection)
        #[arg(long = "model")]
        model_ids: Vec<String>,

        /// Labeled prompt dataset (CSV); built-in samples when omitted
        #[arg(long)]
        prompt_file: Option<PathBuf>,

        /// Only test these labels
        #[arg(long, value_delimiter = ',')]
        labels: Vec<String>,

        /// Maximum prompts per label
        #[arg(long)]
        per_label: Option<usize>,

        /// Maximum prompts per (label, category, subcategory)
        #[arg(long)]
        per_subcategory: Option<usize>,

        /// Maximum prompts overall
        #[arg(long)]
        max_prompts: Option<usize>,

        /// Seconds to wait after every judge call
        #[arg(long)]
        delay: Option<f64>,

        /// Directory for the results file
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Skip the per-outcome details in the printed report
        #[arg(long)]
        no_details: bool,
    },

    /// Show the leaderboard from benchmark result files
    Leaderboard {
        /// Result files to merge (newest file in --dir when omitted)
        #[arg(long, num_args = 1..)]
        results: Vec<PathBuf>,

        /// Directory searched for the newest results file
        #[arg(long, default_value = ".")]
        dir: PathBuf,

        /// Show only the top N models (0 shows all)
        #[arg(long, default_value = "0")]
        top: usize,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// List the model catalog
    Models,
}

#[derive(Tabled)]
struct ModelTableRow {
    #[tabled(rename = "Id")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Tier")]
    tier: String,
    #[tabled(rename = "Benchmark")]
    benchmark: String,
}

#[allow(clippy::too_many_lines)]
fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let catalog = ModelCatalog::builtin();

    match cli.command {
        Commands::Run {
            config,
            models,
            model_ids,
            prompt_file,
            labels,
            per_label,
            per_subcategory,
            max_prompts,
            delay,
            output_dir,
            no_details,
        } => {
            let config = match &config {
                Some(path) => BenchConfig::load(path)
                    .with_context(|| format!("Failed to load config {}", path.display()))?,
                None => BenchConfig::default(),
            };

            let selected: Vec<ModelDescriptor> = if !model_ids.is_empty() {
                model_ids.iter().map(|id| catalog.resolve(id)).collect()
            } else if !config.models.is_empty() {
                config.models.iter().map(|id| catalog.resolve(id)).collect()
            } else {
                catalog.select(models)
            };
            if selected.is_empty() {
                bail!("No models selected");
            }

            let entries = match &prompt_file {
                Some(path) => {
                    let options = LoadOptions {
                        labels: (!labels.is_empty()).then_some(labels),
                        per_label,
                        per_subcategory,
                        max_prompts,
                    };
                    load_prompts(path, &options)
                        .with_context(|| format!("Failed to load prompts from {}", path.display()))?
                }
                None => sample_prompts(),
            };
            if entries.is_empty() {
                bail!("No prompts to test");
            }

            let credentials = JudgeCredentials::from_env(config.judge.base_url.as_deref())?;
            let judge = HttpJudge::new(&credentials, &config.judge)?;
            let template = AuditTemplate::from_standards_path(&config.standards_path);

            tracing::info!(
                endpoint = judge.endpoint(),
                models = selected.len(),
                prompts = entries.len(),
                "Benchmark configured"
            );

            let cancel = CancelFlag::new();
            let on_interrupt = cancel.clone();
            ctrlc::set_handler(move || {
                tracing::warn!("Interrupt received, stopping after the current call");
                on_interrupt.cancel();
            })
            .context("Failed to install interrupt handler")?;

            let runner = BenchmarkRunner::new(&judge, template)
                .with_config(RunnerConfig::with_delay_secs(
                    delay.unwrap_or(config.run.delay_secs),
                ))
                .with_cancel_flag(cancel);
            let report = runner.run(&entries, &selected);

            println!("{}", report.to_text(&catalog, !no_details));

            let dir = output_dir.unwrap_or(config.run.output_dir);
            let path = report
                .save_in(&dir)
                .with_context(|| format!("Failed to save results in {}", dir.display()))?;
            println!("Results saved to: {}", path.display());
        }

        Commands::Leaderboard {
            results,
            dir,
            top,
            json,
        } => {
            if results.is_empty() {
                let board = latest_leaderboard(&dir, top, &catalog)?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&board)?);
                } else {
                    println!("{}", board.to_text());
                }
            } else {
                let merged = merge_reports(&results);
                if merged.is_empty() {
                    bail!("No usable benchmark summaries in the given files");
                }
                let rows = LeaderboardRow::from_aggregator(&merged, &catalog);
                let ranked = rank_rows(rows, top);
                if json {
                    println!("{}", serde_json::to_string_pretty(&ranked)?);
                } else {
                    println!("{}", render_table(&ranked));
                }
            }
        }

        Commands::Models => {
            let benchmark = catalog.select(ModelSelection::Benchmark);
            let rows: Vec<ModelTableRow> = catalog
                .all()
                .iter()
                .map(|m| {
                    let selected = benchmark.iter().find(|b| b.id == m.id);
                    ModelTableRow {
                        id: m.id.clone(),
                        name: m.name.clone(),
                        provider: m.provider.clone(),
                        tier: selected
                            .and_then(|b| b.tier.clone())
                            .or_else(|| m.tier.clone())
                            .unwrap_or_else(|| "-".to_string()),
                        benchmark: if selected.is_some() { "✓" } else { "" }.to_string(),
                    }
                })
                .collect();
            println!("{}", Table::new(rows));
            println!("{} models, {} in the benchmark selection", catalog.all().len(), benchmark.len());
        }
    }

    Ok(())
}
