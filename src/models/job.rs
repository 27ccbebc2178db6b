//! Job board records.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle state of a job on the board.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    #[default]
    Unclaimed,
    InProgress,
    Done,
    Failed,
}

impl JobState {
    /// Check if the job is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Done | JobState::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Unclaimed => "unclaimed",
            JobState::InProgress => "in_progress",
            JobState::Done => "done",
            JobState::Failed => "failed",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// A unit of work: harvest one external group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Board-assigned identifier, also the insertion order.
    pub id: u64,

    /// Natural external group identifier
    pub key: String,

    #[serde(default)]
    pub state: JobState,

    /// Worker identity holding the job, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
}

impl Job {
    pub fn new(id: u64, key: impl Into<String>) -> Self {
        Self {
            id,
            key: key.into(),
            state: JobState::Unclaimed,
            owner: None,
        }
    }

    /// Whether `worker_id` currently holds this job.
    pub fn is_owned_by(&self, worker_id: &str) -> bool {
        self.state == JobState::InProgress && self.owner.as_deref() == Some(worker_id)
    }
}

/// Selection criteria for querying the board.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub state: Option<JobState>,
    pub owner: Option<String>,
}

impl JobFilter {
    pub fn unclaimed() -> Self {
        Self {
            state: Some(JobState::Unclaimed),
            owner: None,
        }
    }

    pub fn in_progress_for(worker_id: &str) -> Self {
        Self {
            state: Some(JobState::InProgress),
            owner: Some(worker_id.to_string()),
        }
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.state.is_none_or(|s| job.state == s)
            && self
                .owner
                .as_deref()
                .is_none_or(|o| job.owner.as_deref() == Some(o))
    }
}

/// Field changes applied by a board update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobUpdate {
    pub state: JobState,
    /// `None` leaves the owner untouched.
    pub owner: Option<String>,
}

impl JobUpdate {
    pub fn claim(worker_id: &str) -> Self {
        Self {
            state: JobState::InProgress,
            owner: Some(worker_id.to_string()),
        }
    }

    pub fn finish(state: JobState) -> Self {
        Self { state, owner: None }
    }

    pub fn apply(&self, job: &mut Job) {
        job.state = self.state;
        if let Some(owner) = &self.owner {
            job.owner = Some(owner.clone());
        }
    }
}
