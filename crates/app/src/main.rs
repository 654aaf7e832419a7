use anyhow::{bail, Context};
use chrono::Utc;
use clap::{Parser, Subcommand};
use legal_index_core::{
    AppConfig, DocumentOutcome, IndexingPipeline, OutcomeStatus, RunContext, RunReport,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "legal-index", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// YAML configuration file
    #[arg(long, global = true, env = "LEGAL_INDEX_CONFIG", default_value = "config/config.yaml")]
    config: PathBuf,

    /// Documents processed in parallel; overrides pipeline.workers
    #[arg(long, global = true)]
    workers: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Index one file.
    Single {
        /// File to index.
        #[arg(long)]
        input_file: PathBuf,
    },
    /// Index every allowed file under a directory, recursively.
    Batch {
        /// Directory to scan.
        #[arg(long)]
        input_dir: PathBuf,
        /// Print indexed documents per document type.
        #[arg(long, default_value_t = false)]
        stats: bool,
        /// Extensions to index in this run; overrides processing.allowed_extensions
        #[arg(long, value_delimiter = ',', num_args = 1..)]
        extensions: Option<Vec<String>>,
    },
    /// Drop the collection and rebuild it from a directory.
    Reindex {
        /// Directory to scan.
        #[arg(long)]
        input_dir: PathBuf,
        /// Confirm that the whole collection may be dropped.
        #[arg(long, default_value_t = false)]
        confirm: bool,
        /// Print indexed documents per document type.
        #[arg(long, default_value_t = false)]
        stats: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();
    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        config = %cli.config.display(),
        "legal-index boot"
    );

    let mut config = AppConfig::load(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    apply_overrides(&mut config, &cli);
    let context = Arc::new(RunContext::new(config).context("invalid configuration")?);

    let pipeline = IndexingPipeline::from_context(context)
        .await
        .context("initializing embedding model and vector store")?;

    let cancel = pipeline.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing documents in flight");
            cancel.cancel();
        }
    });

    match cli.command {
        Command::Single { input_file } => {
            let outcome = pipeline.single(&input_file).await?;
            print_outcome(&outcome);
            if matches!(outcome.status, OutcomeStatus::Failed { .. }) {
                bail!("{} was not indexed", input_file.display());
            }
        }
        Command::Batch {
            input_dir, stats, ..
        } => {
            let report = pipeline.batch(&input_dir).await?;
            finish_run(&report, stats)?;
        }
        Command::Reindex {
            input_dir,
            confirm,
            stats,
        } => {
            let report = pipeline.reindex(&input_dir, confirm).await?;
            finish_run(&report, stats)?;
        }
    }

    Ok(())
}

/// Command-line values that take precedence over the configuration file.
fn apply_overrides(config: &mut AppConfig, cli: &Cli) {
    if let Some(workers) = cli.workers {
        config.pipeline.workers = workers;
    }
    if let Command::Batch {
        extensions: Some(extensions),
        ..
    } = &cli.command
    {
        config.processing.allowed_extensions = extensions.clone();
    }
}

fn print_outcome(outcome: &DocumentOutcome) {
    println!("{}: {}", outcome.path.display(), outcome.status);
}

fn finish_run(report: &RunReport, stats: bool) -> anyhow::Result<()> {
    for outcome in &report.outcomes {
        print_outcome(outcome);
    }

    println!(
        "run {}: {} indexed, {} skipped, {} failed, {} cancelled; {} chunks ({} degraded) in {:.1}s",
        report.run_id,
        report.indexed(),
        report.skipped(),
        report.failed(),
        report.cancelled(),
        report.total_chunks(),
        report.degraded_chunks(),
        report.elapsed.as_secs_f64()
    );

    if stats {
        for (doc_type, count) in report.by_doc_type() {
            println!("  {doc_type}: {count}");
        }
    }

    if !report.is_success() {
        bail!("none of {} attempted documents was indexed", report.attempted());
    }
    Ok(())
}
