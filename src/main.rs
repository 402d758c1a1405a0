use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use nb_dispatch::artifact::{ArtifactStore, TIMESTAMP_FORMAT};
use nb_dispatch::config::{DispatchConfig, EngineConfig};
use nb_dispatch::dispatcher::{Dispatcher, PlannedAction, RunSummary};
use nb_dispatch::engine::PapermillEngine;
use nb_dispatch::jobs::JobSource;
use nb_dispatch::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "nb-dispatch")]
#[command(version)]
#[command(about = "Run pipeline notebooks for every configured region, skipping finished ones")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Execute every job in the config whose output does not exist yet
    Run(RunArgs),

    /// List executed notebooks in the output directory
    Status {
        /// Directory holding executed notebooks
        #[arg(long, default_value = "nb-output")]
        output_dir: PathBuf,

        /// Output format
        #[arg(long, short = 'o', default_value = "table")]
        output: OutputFormat,
    },
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// JSON list of jobs, each with `REGION` and `PIPELINE`
    #[arg(long, short = 'c', default_value = "config.json")]
    config: PathBuf,

    /// Directory for executed notebooks (created if missing)
    #[arg(long, default_value = "nb-output")]
    output_dir: PathBuf,

    /// Directory holding the pipeline template notebooks
    #[arg(long, default_value = ".")]
    templates_dir: PathBuf,

    /// Notebook execution engine executable
    #[arg(long, default_value = "papermill")]
    engine: String,

    /// Leading argument for the engine, repeatable
    /// (`--engine python3 --engine-arg=-m --engine-arg papermill`)
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    engine_args: Vec<String>,

    /// Kill a notebook that runs longer than this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Show what would run without executing anything
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Clone, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

#[derive(Serialize)]
struct ArtifactOutput {
    file_name: String,
    pipeline: String,
    region: String,
    executed_at: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

// =============================================================================
// Command Handlers
// =============================================================================

async fn run_jobs(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = DispatchConfig {
        output_dir: args.output_dir,
        templates_dir: args.templates_dir,
        engine: EngineConfig {
            program: args.engine,
            args: args.engine_args,
            timeout: args.timeout_secs.map(Duration::from_secs),
        },
    };

    // Config errors are fatal: nothing runs
    let jobs = JobSource::load(&args.config)?;

    let engine = PapermillEngine::new(config.engine.clone());
    let dispatcher = Dispatcher::new(config, engine);

    if args.dry_run {
        for job in dispatcher.plan(&jobs).await? {
            let action = match job.action {
                PlannedAction::Skip => "skip (already exists)",
                PlannedAction::Run => "run",
                PlannedAction::InvalidPipeline => "skip (not a valid pipeline)",
                PlannedAction::InvalidRegion => "skip (region unusable in a file name)",
            };
            println!("{:<24} {:<20} {}", job.region, job.pipeline, action);
        }
        return Ok(());
    }

    let dispatcher = dispatcher.with_shutdown(install_shutdown_handler());
    let reports = dispatcher.run(jobs).await?;
    let summary = RunSummary::from_reports(&reports);
    tracing::info!(
        completed = summary.completed,
        failed = summary.failed,
        skipped = summary.skipped,
        invalid = summary.invalid,
        cancelled = summary.cancelled,
        "Run finished"
    );
    println!("{}", summary);

    Ok(())
}

async fn handle_status(
    output_dir: PathBuf,
    output_format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = ArtifactStore::new(output_dir);
    let entries = store.artifacts().await?;

    match output_format {
        OutputFormat::Json => {
            let output: Vec<ArtifactOutput> = entries
                .into_iter()
                .map(|entry| ArtifactOutput {
                    executed_at: entry.name.executed_at.format(TIMESTAMP_FORMAT).to_string(),
                    pipeline: entry.name.pipeline,
                    region: entry.name.region,
                    status: entry.status.to_string(),
                    error: entry.error,
                    file_name: entry.file_name,
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        OutputFormat::Table => {
            if entries.is_empty() {
                println!("No executed notebooks in {}", store.dir().display());
                return Ok(());
            }
            println!(
                "{:<20} {:<24} {:<24} {:<10}",
                "PIPELINE", "REGION", "EXECUTED AT", "STATUS"
            );
            println!("{}", "-".repeat(80));
            for entry in entries {
                println!(
                    "{:<20} {:<24} {:<24} {:<10}",
                    entry.name.pipeline,
                    entry.name.region,
                    entry.name.executed_at.format(TIMESTAMP_FORMAT).to_string(),
                    entry.status.to_string()
                );
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    match args.command {
        Commands::Run(run_args) => run_jobs(run_args).await?,
        Commands::Status { output_dir, output } => handle_status(output_dir, &output).await?,
    }

    Ok(())
}
