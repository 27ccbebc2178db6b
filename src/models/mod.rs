// src/models/mod.rs

//! Domain models for the harvester.

mod config;
mod item;
mod job;

// Re-export all public types
pub use config::{
    BackoffConfig, Config, CooldownConfig, HarvestConfig, PathsConfig, RateLimitConfig,
    SourceConfig, WorkerConfig,
};
pub use item::{Checkpoint, Item, Placement, Window};
pub use job::{Job, JobFilter, JobState, JobUpdate};
