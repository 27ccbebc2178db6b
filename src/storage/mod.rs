//! Durable state for harvesting: resume checkpoints and harvested items.
//!
//! ## Directory Structure
//!
//! ```text
//! {data_dir}/
//! ├── resume_files/          # One checkpoint per job key
//! │   └── {job_key}.json
//! └── downloads/             # One file per harvested item
//!     └── {job_key}/
//!         └── {item_id}.json
//! ```

pub mod local;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{Checkpoint, Item};

// Re-export for convenience
pub use local::{LocalCheckpointStore, LocalItemSink};

/// Durable per-job pagination cursor.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Latest saved checkpoint for a job, if any.
    async fn load(&self, job_key: &str) -> Result<Option<Checkpoint>>;

    /// Persist the cursor before returning; callers rely on it surviving a crash.
    async fn save(&self, job_key: &str, cursor: &str) -> Result<()>;

    /// Drop the checkpoint once the job is finished or abandoned.
    async fn clear(&self, job_key: &str) -> Result<()>;
}

/// Idempotent per-item persistence.
#[async_trait]
pub trait ItemSink: Send + Sync {
    /// Store an item under the job's namespace, overwriting any earlier copy.
    async fn write(&self, job_key: &str, item: &Item) -> Result<()>;
}
