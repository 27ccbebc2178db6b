//! Harvest pipeline.
//!
//! - `RateLimiter`: sliding-window budget for source calls
//! - `BackoffController`: ban sleeps and inter-job cooldown
//! - `HarvestSession`: one job's walk through the item stream
//! - `Orchestrator`: the worker loop tying jobs to sessions

pub mod backoff;
pub mod orchestrator;
pub mod rate_limit;
pub mod session;

pub use backoff::{BackoffController, BackoffState};
pub use orchestrator::{JobOutcome, Orchestrator, RunSummary};
pub use rate_limit::RateLimiter;
pub use session::{Completion, HarvestSession, SessionOutcome, SessionReport};
