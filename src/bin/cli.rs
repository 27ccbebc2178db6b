//! Group Harvester CLI
//!
//! Runs one worker. Start several on different hosts against the same job
//! board to spread the work.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use harvester::{
    coordination::{FileJobBoard, JobBoard, JobClaimCoordinator, import_keys},
    error::{AppError, Result},
    models::{Config, CooldownConfig, Window},
    pipeline::Orchestrator,
    source::HttpFeedSource,
    storage::{LocalCheckpointStore, LocalItemSink},
};

const COOKIE_ENV: &str = "HARVESTER_SESSION_COOKIE";

/// Resumable group harvester
#[derive(Parser, Debug)]
#[command(name = "harvester", version, about = "Harvest time-bounded records from a paginated source")]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "harvester.toml")]
    config: PathBuf,

    /// Job board file (overrides paths.jobs_file)
    #[arg(long, global = true)]
    jobs: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Claim and harvest jobs until none are left
    Run {
        /// Keep items newer than this date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        start_date: Option<NaiveDate>,

        /// Keep items up to and including this date (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        end_date: Option<NaiveDate>,

        /// Worker identity (default: host name)
        #[arg(long)]
        worker_id: Option<String>,

        /// Consecutive out-of-window items tolerated before stopping a job
        #[arg(long)]
        tolerance: Option<usize>,

        /// Skip the pause between jobs
        #[arg(long)]
        no_cooldown: bool,
    },

    /// Manage the job board
    Jobs {
        #[command(subcommand)]
        action: JobsAction,
    },

    /// Validate configuration
    Validate,
}

#[derive(Subcommand, Debug)]
enum JobsAction {
    /// Add one job per line of a text file
    Import { file: PathBuf },
    /// Show every job and its state
    List,
}

fn parse_date(s: &str) -> std::result::Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("expected YYYY-MM-DD: {e}"))
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let mut config = Config::load_or_default(&cli.config);
    if let Some(jobs) = &cli.jobs {
        config.paths.jobs_file = jobs.to_string_lossy().into_owned();
    }
    if let Ok(cookie) = std::env::var(COOKIE_ENV) {
        config.source.session_cookie = Some(cookie);
    }

    match cli.command {
        Command::Run {
            start_date,
            end_date,
            worker_id,
            tolerance,
            no_cooldown,
        } => {
            if let Some(id) = worker_id {
                config.worker.id = Some(id);
            }
            if let Some(tolerance) = tolerance {
                config.harvest.tolerance = tolerance;
            }
            if no_cooldown {
                config.cooldown = CooldownConfig::disabled();
            }
            config.validate()?;

            if let (Some(start), Some(end)) = (start_date, end_date) {
                if start > end {
                    return Err(AppError::validation("--start-date is after --end-date"));
                }
            }
            let window = Window::from_dates(start_date, end_date);
            run(&config, window).await?;
        }

        Command::Jobs { action } => {
            let board = FileJobBoard::new(config.paths.jobs_path());
            match action {
                JobsAction::Import { file } => {
                    let text = tokio::fs::read_to_string(&file).await?;
                    board.create_if_missing().await?;
                    let added = import_keys(&board, &text).await?;
                    log::info!("Imported {} new jobs into {}", added, board.path().display());
                }
                JobsAction::List => {
                    for job in board.list().await? {
                        println!(
                            "{:>5}  {:<12} {:<24} {}",
                            job.id,
                            job.state,
                            job.key,
                            job.owner.as_deref().unwrap_or("-")
                        );
                    }
                }
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            if let Err(e) = config.validate() {
                log::error!("Config validation failed: {}", e);
                return Err(e);
            }
            log::info!("✓ Config OK");
        }
    }

    Ok(())
}

async fn run(config: &Config, window: Window) -> Result<()> {
    let worker_id = config.worker_id();
    log::info!(
        "Worker {} starting on {} (window {} .. {})",
        worker_id,
        config.paths.jobs_path().display(),
        window.start,
        window.end
    );

    let board: Arc<dyn JobBoard> = Arc::new(FileJobBoard::new(config.paths.jobs_path()));
    let coordinator = JobClaimCoordinator::new(board, worker_id)
        .with_confirm_delay(config.worker.claim_confirm());

    let mut orchestrator = Orchestrator::new(
        coordinator,
        Arc::new(HttpFeedSource::new(&config.source)?),
        Arc::new(LocalCheckpointStore::new(config.paths.checkpoint_path())),
        Arc::new(LocalItemSink::new(config.paths.download_path())),
        config,
        window,
    );

    let summary = orchestrator.run().await?;
    log::info!(
        "Done! {} jobs completed, {} failed, {} items saved",
        summary.jobs_done,
        summary.jobs_failed,
        summary.items_persisted
    );
    Ok(())
}
