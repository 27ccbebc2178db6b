// src/pipeline/orchestrator.rs

//! Worker main loop: claim a job, harvest it, record the result, repeat.

use std::sync::Arc;

use crate::coordination::JobClaimCoordinator;
use crate::error::Result;
use crate::models::{Config, HarvestConfig, Job, Window};
use crate::pipeline::session::{HarvestSession, SessionOutcome, SessionReport};
use crate::pipeline::{BackoffController, RateLimiter};
use crate::source::ContentSource;
use crate::storage::{CheckpointStore, ItemSink};

/// Totals across all jobs a worker processed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub jobs_done: usize,
    pub jobs_failed: usize,
    pub items_persisted: usize,
}

/// How a single job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Done(SessionReport),
    Failed(SessionReport),
}

pub struct Orchestrator {
    coordinator: JobClaimCoordinator,
    source: Arc<dyn ContentSource>,
    checkpoints: Arc<dyn CheckpointStore>,
    sink: Arc<dyn ItemSink>,
    limiter: RateLimiter,
    backoff: BackoffController,
    settings: HarvestConfig,
    window: Window,
}

impl Orchestrator {
    pub fn new(
        coordinator: JobClaimCoordinator,
        source: Arc<dyn ContentSource>,
        checkpoints: Arc<dyn CheckpointStore>,
        sink: Arc<dyn ItemSink>,
        config: &Config,
        window: Window,
    ) -> Self {
        Self {
            coordinator,
            source,
            checkpoints,
            sink,
            limiter: RateLimiter::from_config(&config.rate_limit),
            backoff: BackoffController::new(config.backoff.clone(), config.cooldown.clone()),
            settings: config.harvest.clone(),
            window,
        }
    }

    /// Process jobs until the board has none left for this worker.
    ///
    /// Returns early with the first process-fatal error; the checkpoint of
    /// the interrupted job has already been flushed by then.
    pub async fn run(&mut self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        while let Some(job) = self.coordinator.claim_next().await? {
            log::info!("Now harvesting {}", job.key);
            match self.run_job(&job).await {
                Ok(JobOutcome::Done(report)) => {
                    summary.jobs_done += 1;
                    summary.items_persisted += report.persisted;
                    self.backoff.cooldown().await;
                }
                Ok(JobOutcome::Failed(report)) => {
                    summary.jobs_failed += 1;
                    summary.items_persisted += report.persisted;
                }
                Err(e) => {
                    log::error!("Harvest of {} aborted: {}", job.key, e);
                    return Err(e);
                }
            }
        }

        log::info!(
            "Finished harvesting: {} done, {} failed, {} items",
            summary.jobs_done,
            summary.jobs_failed,
            summary.items_persisted
        );
        Ok(summary)
    }

    /// Harvest one claimed job and record the result on the board.
    pub async fn run_job(&mut self, job: &Job) -> Result<JobOutcome> {
        let resume = self.checkpoints.load(&job.key).await?.map(|c| c.cursor);
        if let Some(cursor) = &resume {
            log::info!("Picking up {} from {}", job.key, cursor);
        }

        let outcome = HarvestSession::new(
            &job.key,
            self.window,
            &self.settings,
            self.source.as_ref(),
            &self.limiter,
            &mut self.backoff,
            self.checkpoints.as_ref(),
            self.sink.as_ref(),
        )
        .run(resume)
        .await?;

        match outcome {
            SessionOutcome::Completed { completion, report } => {
                // Board first: a failed update must leave the cursor in place.
                self.coordinator.mark_done(job).await?;
                self.checkpoints.clear(&job.key).await?;
                log::info!(
                    "Completed {} ({:?}): {} saved, {} too new, {} stale over {} pages",
                    job.key,
                    completion,
                    report.persisted,
                    report.skipped_new,
                    report.stale,
                    report.pages
                );
                Ok(JobOutcome::Done(report))
            }
            SessionOutcome::NotFound { message, report } => {
                self.coordinator.mark_failed(job).await?;
                self.checkpoints.clear(&job.key).await?;
                log::error!("Abandoned {}: {}", job.key, message);
                Ok(JobOutcome::Failed(report))
            }
        }
    }
}
