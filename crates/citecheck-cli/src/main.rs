//! Command-line entry point.
//!
//! `validate` runs a fresh pass over a footnote file, `resume` continues an
//! interrupted run from its checkpoint log, and `report` re-renders the
//! report for any run from its log alone. Ctrl-C requests cooperative
//! cancellation; the run can be resumed afterwards.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use citecheck_core::{Citation, EngineConfig, FootnoteRecord};
use citecheck_engine::{ProgressTracker, Report, ReportGenerator, ValidationPipeline};
use citecheck_reason::{ErrorRecoveryManager, HttpProvider, ReasoningClient, RecoveryConfig};
use citecheck_rules::RuleRepository;

#[derive(Parser)]
#[command(name = "citecheck", version, about = "Legal citation validation engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate every footnote in a manuscript extract.
    Validate(ValidateArgs),
    /// Continue an interrupted run from its checkpoint log.
    Resume(ResumeArgs),
    /// Re-render the report for a run from its checkpoint log.
    Report(ReportArgs),
}

#[derive(Args)]
struct CorpusArgs {
    /// House style rule corpus (JSON).
    #[arg(long)]
    house: PathBuf,
    /// General rule corpus (JSON).
    #[arg(long)]
    general: PathBuf,
}

#[derive(Args)]
struct ServiceArgs {
    /// Reasoning service base URL.
    #[arg(long, env = "CITECHECK_ENDPOINT")]
    endpoint: String,
    /// Bearer token for the reasoning service.
    #[arg(long, env = "CITECHECK_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
    /// Engine configuration file (JSON). Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args)]
struct OutputArgs {
    /// Where to write the structured JSON report.
    #[arg(long)]
    out: Option<PathBuf>,
    /// Where to write the review queue text. Printed to stdout when omitted.
    #[arg(long)]
    queue: Option<PathBuf>,
}

#[derive(Args)]
struct ValidateArgs {
    #[command(flatten)]
    corpus: CorpusArgs,
    #[command(flatten)]
    service: ServiceArgs,
    #[command(flatten)]
    output: OutputArgs,
    /// Extracted footnote records (JSON array).
    #[arg(long)]
    footnotes: PathBuf,
    /// Directory for checkpoint logs.
    #[arg(long, default_value = ".citecheck")]
    state_dir: PathBuf,
}

#[derive(Args)]
struct ResumeArgs {
    #[command(flatten)]
    corpus: CorpusArgs,
    #[command(flatten)]
    service: ServiceArgs,
    #[command(flatten)]
    output: OutputArgs,
    /// Extracted footnote records (JSON array). Must match the original run.
    #[arg(long)]
    footnotes: PathBuf,
    #[arg(long, default_value = ".citecheck")]
    state_dir: PathBuf,
    /// Run id of the interrupted run, e.g. run-20260828T101500123.
    #[arg(long)]
    run_id: String,
}

#[derive(Args)]
struct ReportArgs {
    #[arg(long, default_value = ".citecheck")]
    state_dir: PathBuf,
    #[arg(long)]
    run_id: String,
    #[command(flatten)]
    output: OutputArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    info!("citecheck v{}", env!("CARGO_PKG_VERSION"));

    match Cli::parse().command {
        Command::Validate(args) => {
            let records = read_footnotes(&args.footnotes)?;
            let ids: Vec<String> = records
                .iter()
                .map(|r| Citation::id_for(r.footnote_number))
                .collect();
            let tracker = ProgressTracker::start_run(&args.state_dir, &ids)
                .context("starting checkpoint log")?;
            run(&args.corpus, &args.service, &args.output, &records, tracker).await
        }
        Command::Resume(args) => {
            let records = read_footnotes(&args.footnotes)?;
            let tracker = ProgressTracker::resume(&args.state_dir, &args.run_id)
                .context("reopening checkpoint log")?;
            run(&args.corpus, &args.service, &args.output, &records, tracker).await
        }
        Command::Report(args) => {
            let tracker = ProgressTracker::resume(&args.state_dir, &args.run_id)
                .context("reading checkpoint log")?;
            let report = ReportGenerator::render(
                tracker.run_id(),
                tracker.completed_verdicts(),
                Utc::now(),
            );
            emit(&args.output, &report)
        }
    }
}

async fn run(
    corpus: &CorpusArgs,
    service: &ServiceArgs,
    output: &OutputArgs,
    records: &[FootnoteRecord],
    tracker: ProgressTracker,
) -> anyhow::Result<()> {
    let config = match &service.config {
        Some(path) => EngineConfig::load(path).context("loading engine config")?,
        None => EngineConfig::default(),
    };
    let rules = Arc::new(
        RuleRepository::load(&corpus.house, &corpus.general).context("loading rule corpus")?,
    );

    let provider = HttpProvider::new(service.endpoint.clone(), service.api_key.clone());
    let recovery = ErrorRecoveryManager::new(RecoveryConfig::from_engine(&config));
    let client = Arc::new(ReasoningClient::new(Arc::new(provider), recovery));
    let pipeline = ValidationPipeline::new(rules, client, &config);

    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight citations");
            let _ = cancel_tx.send(true);
        }
    });

    let verdicts = pipeline.run(records, &tracker, cancel_rx).await;
    let report = ReportGenerator::render(tracker.run_id(), verdicts, Utc::now());

    let pending = tracker.pending();
    if pending.is_empty() {
        tracker.finish().context("archiving checkpoint log")?;
    } else {
        info!(
            run_id = tracker.run_id(),
            pending = pending.len(),
            "run incomplete; resume with --run-id {}",
            tracker.run_id()
        );
    }
    emit(output, &report)
}

fn read_footnotes(path: &Path) -> anyhow::Result<Vec<FootnoteRecord>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading footnotes from {}", path.display()))?;
    let records: Vec<FootnoteRecord> =
        serde_json::from_str(&text).context("parsing footnote records")?;
    anyhow::ensure!(!records.is_empty(), "footnote file contains no records");
    Ok(records)
}

fn emit(output: &OutputArgs, report: &Report) -> anyhow::Result<()> {
    if let Some(path) = &output.out {
        let json = serde_json::to_string_pretty(&report.structured)?;
        std::fs::write(path, json)
            .with_context(|| format!("writing report to {}", path.display()))?;
        info!(path = %path.display(), "structured report written");
    }
    let text = ReportGenerator::review_queue_text(report);
    match &output.queue {
        Some(path) => {
            std::fs::write(path, &text)
                .with_context(|| format!("writing review queue to {}", path.display()))?;
            info!(path = %path.display(), "review queue written");
        }
        None => print!("{text}"),
    }
    Ok(())
}
