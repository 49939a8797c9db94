//! Job request and status values exchanged between the controller and its transport.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Smallest accepted `count`.
pub const MIN_COUNT: u32 = 1;
/// Largest accepted `count`.
pub const MAX_COUNT: u32 = 50;

/// Parameters for one job submission. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub search_term: String,
    pub count: u32,
}

impl JobRequest {
    pub fn new(search_term: impl Into<String>, count: u32) -> Self {
        Self {
            search_term: search_term.into(),
            count,
        }
    }
}

/// Opaque identifier assigned by the remote side on submission.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        JobId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for JobId {
    fn from(value: String) -> Self {
        JobId(value)
    }
}

impl From<&str> for JobId {
    fn from(value: &str) -> Self {
        JobId(value.to_string())
    }
}

/// Remote job state as reported by a status poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot returned by one status poll. Only the latest one is retained.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub state: JobState,
    pub progress_count: u64,
    pub progress_total: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_location: Option<String>,
}

impl JobStatus {
    /// Builds a snapshot; `result_location` is kept only for completed jobs.
    pub fn new(
        state: JobState,
        progress_count: u64,
        progress_total: u64,
        result_location: Option<String>,
    ) -> Self {
        let result_location = if state == JobState::Completed {
            result_location
        } else {
            None
        };

        Self {
            state,
            progress_count,
            progress_total,
            result_location,
        }
    }

    pub fn running(progress_count: u64, progress_total: u64) -> Self {
        Self::new(JobState::Running, progress_count, progress_total, None)
    }

    /// Local snapshot recorded when the user cancels, keeping the last known progress.
    pub fn cancelled_from(previous: Option<&JobStatus>) -> Self {
        let (count, total) = previous
            .map(|s| (s.progress_count, s.progress_total))
            .unwrap_or((0, 0));
        Self::new(JobState::Cancelled, count, total, None)
    }

    /// Completion fraction in `[0, 1]`; zero when the total is unknown.
    pub fn progress(&self) -> f64 {
        if self.progress_total == 0 {
            return 0.0;
        }
        (self.progress_count as f64 / self.progress_total as f64).min(1.0)
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
