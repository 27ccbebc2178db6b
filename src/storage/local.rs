//! Local filesystem storage implementation.
//!
//! Every write goes through a temp file and a rename, so a reader never
//! observes a half-written checkpoint or item.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Checkpoint, Item};
use crate::storage::{CheckpointStore, ItemSink};
use crate::utils::fs::{load_json, remove_if_exists, sanitize_key, save_json};

/// Checkpoints stored as one JSON file per job key.
#[derive(Debug, Clone)]
pub struct LocalCheckpointStore {
    root_dir: PathBuf,
}

impl LocalCheckpointStore {
    /// Create a new store rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Get the file path for a job key.
    pub fn path(&self, job_key: &str) -> PathBuf {
        self.root_dir.join(format!("{}.json", sanitize_key(job_key)))
    }
}

#[async_trait]
impl CheckpointStore for LocalCheckpointStore {
    async fn load(&self, job_key: &str) -> Result<Option<Checkpoint>> {
        let checkpoint: Option<Checkpoint> = load_json(&self.path(job_key)).await?;
        Ok(checkpoint.filter(|c| !c.cursor.trim().is_empty()))
    }

    async fn save(&self, job_key: &str, cursor: &str) -> Result<()> {
        let checkpoint = Checkpoint::new(job_key, cursor);
        save_json(&self.path(job_key), &checkpoint).await?;
        log::debug!("Checkpoint for {} advanced to {}", job_key, cursor);
        Ok(())
    }

    async fn clear(&self, job_key: &str) -> Result<()> {
        remove_if_exists(&self.path(job_key)).await
    }
}

/// Items stored as `{root}/{job_key}/{item_id}.json`.
#[derive(Debug, Clone)]
pub struct LocalItemSink {
    root_dir: PathBuf,
}

impl LocalItemSink {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Directory holding all items of one job.
    pub fn namespace(&self, job_key: &str) -> PathBuf {
        self.root_dir.join(sanitize_key(job_key))
    }

    pub fn item_path(&self, job_key: &str, item_id: &str) -> PathBuf {
        self.namespace(job_key).join(format!("{}.json", sanitize_key(item_id)))
    }

    /// Number of stored items for a job.
    pub async fn count(&self, job_key: &str) -> Result<usize> {
        count_json_files(&self.namespace(job_key)).await
    }
}

async fn count_json_files(dir: &Path) -> Result<usize> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let mut count = 0;
    while let Some(entry) = entries.next_entry().await? {
        if entry.path().extension().is_some_and(|ext| ext == "json") {
            count += 1;
        }
    }
    Ok(count)
}

#[async_trait]
impl ItemSink for LocalItemSink {
    async fn write(&self, job_key: &str, item: &Item) -> Result<()> {
        // Namespace directory is created lazily by the atomic writer.
        save_json(&self.item_path(job_key, &item.id), item).await
    }
}
