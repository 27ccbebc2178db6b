//! In-process job board, used by tests and dry runs.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::coordination::JobBoard;
use crate::error::{AppError, Result};
use crate::models::{Job, JobFilter, JobUpdate};

#[derive(Debug)]
pub struct MemoryJobBoard {
    jobs: Mutex<Vec<Job>>,
    reachable: AtomicBool,
}

impl MemoryJobBoard {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            reachable: AtomicBool::new(true),
        }
    }

    /// Board pre-filled with unclaimed jobs, ids starting at 1.
    pub fn with_keys(keys: &[&str]) -> Self {
        let jobs = keys
            .iter()
            .enumerate()
            .map(|(i, key)| Job::new(i as u64 + 1, *key))
            .collect();
        Self {
            jobs: Mutex::new(jobs),
            reachable: AtomicBool::new(true),
        }
    }

    /// Simulate the board going offline or coming back.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(AppError::coordination("in-memory board is offline"))
        }
    }
}

impl Default for MemoryJobBoard {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobBoard for MemoryJobBoard {
    async fn find_first(&self, filter: &JobFilter) -> Result<Option<Job>> {
        self.check_reachable()?;
        let jobs = self.jobs.lock().await;
        Ok(jobs.iter().find(|job| filter.matches(job)).cloned())
    }

    async fn get(&self, id: u64) -> Result<Option<Job>> {
        self.check_reachable()?;
        let jobs = self.jobs.lock().await;
        Ok(jobs.iter().find(|job| job.id == id).cloned())
    }

    async fn update(&self, id: u64, update: &JobUpdate) -> Result<Job> {
        self.check_reachable()?;
        let mut jobs = self.jobs.lock().await;
        let job = jobs
            .iter_mut()
            .find(|job| job.id == id)
            .ok_or_else(|| AppError::coordination(format!("no job with id {id}")))?;
        update.apply(job);
        Ok(job.clone())
    }

    async fn list(&self) -> Result<Vec<Job>> {
        self.check_reachable()?;
        Ok(self.jobs.lock().await.clone())
    }

    async fn insert(&self, key: &str) -> Result<Option<Job>> {
        self.check_reachable()?;
        let mut jobs = self.jobs.lock().await;
        if jobs.iter().any(|job| job.key == key) {
            return Ok(None);
        }
        let id = jobs.iter().map(|job| job.id).max().unwrap_or(0) + 1;
        let job = Job::new(id, key);
        jobs.push(job.clone());
        Ok(Some(job))
    }
}
