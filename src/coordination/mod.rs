// src/coordination/mod.rs

//! Job claiming against a shared job board.
//!
//! Workers coordinate only through the board. Claims are a read followed by
//! a write with no compare-and-swap, so two workers polling at the same
//! moment can both claim one job. An optional confirmation re-read narrows
//! that window but does not close it.

pub mod file;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Job, JobFilter, JobState, JobUpdate};

pub use file::FileJobBoard;
pub use memory::MemoryJobBoard;

/// External store of jobs.
///
/// Implementations report an unreachable board as
/// [`AppError::Coordination`](crate::error::AppError::Coordination).
#[async_trait]
pub trait JobBoard: Send + Sync {
    /// First job matching the filter, in insertion order.
    async fn find_first(&self, filter: &JobFilter) -> Result<Option<Job>>;

    async fn get(&self, id: u64) -> Result<Option<Job>>;

    /// Apply an update and return the stored job.
    async fn update(&self, id: u64, update: &JobUpdate) -> Result<Job>;

    async fn list(&self) -> Result<Vec<Job>>;

    /// Add an unclaimed job; returns `None` if the key already exists.
    async fn insert(&self, key: &str) -> Result<Option<Job>>;
}

/// Claims and releases jobs on behalf of one worker.
pub struct JobClaimCoordinator {
    board: Arc<dyn JobBoard>,
    worker_id: String,
    confirm_delay: Option<Duration>,
}

impl JobClaimCoordinator {
    pub fn new(board: Arc<dyn JobBoard>, worker_id: impl Into<String>) -> Self {
        Self {
            board,
            worker_id: worker_id.into(),
            confirm_delay: None,
        }
    }

    /// Re-read each fresh claim after `delay` and drop it if another worker overwrote it.
    pub fn with_confirm_delay(mut self, delay: Option<Duration>) -> Self {
        self.confirm_delay = delay;
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Next job for this worker.
    ///
    /// A job this worker already holds is returned first, so a restarted
    /// worker finishes its own work before taking new jobs.
    pub async fn claim_next(&self) -> Result<Option<Job>> {
        let own = JobFilter::in_progress_for(&self.worker_id);
        if let Some(job) = self.board.find_first(&own).await? {
            log::info!("Resuming unfinished job {}", job.key);
            return Ok(Some(job));
        }

        loop {
            let Some(candidate) = self.board.find_first(&JobFilter::unclaimed()).await? else {
                return Ok(None);
            };

            let claimed = self
                .board
                .update(candidate.id, &JobUpdate::claim(&self.worker_id))
                .await?;

            match self.confirm(claimed).await? {
                Some(job) => {
                    log::info!("Claimed job {} (id {})", job.key, job.id);
                    return Ok(Some(job));
                }
                None => continue,
            }
        }
    }

    async fn confirm(&self, claimed: Job) -> Result<Option<Job>> {
        let Some(delay) = self.confirm_delay else {
            return Ok(Some(claimed));
        };

        tokio::time::sleep(delay).await;
        match self.board.get(claimed.id).await? {
            Some(job) if job.is_owned_by(&self.worker_id) => Ok(Some(job)),
            Some(job) => {
                log::warn!(
                    "Lost claim on {} to {}",
                    job.key,
                    job.owner.as_deref().unwrap_or("nobody")
                );
                Ok(None)
            }
            None => {
                log::warn!("Job {} vanished from the board", claimed.key);
                Ok(None)
            }
        }
    }

    pub async fn mark_done(&self, job: &Job) -> Result<Job> {
        self.finish(job, JobState::Done).await
    }

    pub async fn mark_failed(&self, job: &Job) -> Result<Job> {
        self.finish(job, JobState::Failed).await
    }

    async fn finish(&self, job: &Job, state: JobState) -> Result<Job> {
        let updated = self.board.update(job.id, &JobUpdate::finish(state)).await?;
        log::info!("Job {} marked {}", updated.key, updated.state);
        Ok(updated)
    }
}

/// Add one job per non-empty line of `text`; returns how many were new.
pub async fn import_keys(board: &dyn JobBoard, text: &str) -> Result<usize> {
    let mut added = 0;
    for key in text.lines().map(str::trim).filter(|k| !k.is_empty()) {
        if board.insert(key).await?.is_some() {
            added += 1;
        }
    }
    Ok(added)
}
