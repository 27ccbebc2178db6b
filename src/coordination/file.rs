//! Job board kept as a JSON document on shared storage.
//!
//! Every operation re-reads the document so that several worker processes
//! pointed at the same file see each other's claims. Writes replace the file
//! atomically, but a read-modify-write from two processes can still
//! interleave; the last writer wins.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::coordination::JobBoard;
use crate::error::{AppError, Result};
use crate::models::{Job, JobFilter, JobUpdate};
use crate::utils::fs::{load_json, save_json};

/// On-disk layout of the board.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct BoardDocument {
    #[serde(default)]
    jobs: Vec<Job>,
}

pub struct FileJobBoard {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl FileJobBoard {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an empty board file if none exists yet.
    pub async fn create_if_missing(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self.read_optional().await?.is_none() {
            self.write(&BoardDocument::default()).await?;
            log::info!("Created job board at {}", self.path.display());
        }
        Ok(())
    }

    async fn read_optional(&self) -> Result<Option<BoardDocument>> {
        load_json(&self.path).await.map_err(|e| {
            AppError::coordination(format!("cannot read {}: {}", self.path.display(), e))
        })
    }

    async fn read(&self) -> Result<BoardDocument> {
        self.read_optional().await?.ok_or_else(|| {
            AppError::coordination(format!("job board {} does not exist", self.path.display()))
        })
    }

    async fn write(&self, document: &BoardDocument) -> Result<()> {
        save_json(&self.path, document).await.map_err(|e| {
            AppError::coordination(format!("cannot write {}: {}", self.path.display(), e))
        })
    }
}

#[async_trait]
impl JobBoard for FileJobBoard {
    async fn find_first(&self, filter: &JobFilter) -> Result<Option<Job>> {
        let document = self.read().await?;
        Ok(document
            .jobs
            .into_iter()
            .filter(|job| filter.matches(job))
            .min_by_key(|job| job.id))
    }

    async fn get(&self, id: u64) -> Result<Option<Job>> {
        let document = self.read().await?;
        Ok(document.jobs.into_iter().find(|job| job.id == id))
    }

    async fn update(&self, id: u64, update: &JobUpdate) -> Result<Job> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read().await?;
        let job = document
            .jobs
            .iter_mut()
            .find(|job| job.id == id)
            .ok_or_else(|| AppError::coordination(format!("no job with id {id}")))?;
        update.apply(job);
        let updated = job.clone();
        self.write(&document).await?;
        Ok(updated)
    }

    async fn list(&self) -> Result<Vec<Job>> {
        let mut jobs = self.read().await?.jobs;
        jobs.sort_by_key(|job| job.id);
        Ok(jobs)
    }

    async fn insert(&self, key: &str) -> Result<Option<Job>> {
        let _guard = self.write_lock.lock().await;
        let mut document = self.read_optional().await?.unwrap_or_default();
        if document.jobs.iter().any(|job| job.key == key) {
            return Ok(None);
        }
        let id = document.jobs.iter().map(|job| job.id).max().unwrap_or(0) + 1;
        let job = Job::new(id, key);
        document.jobs.push(job.clone());
        self.write(&document).await?;
        Ok(Some(job))
    }
}
