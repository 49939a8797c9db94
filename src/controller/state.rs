//! Observable controller state.
//!
//! [`ControllerState`] is the single value the presentation layer renders
//! from. The transition helpers here only touch fields; identity and
//! staleness checks live in [`super::machine`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::{ErrorInfo, ErrorKind};
use super::types::{JobId, JobStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Submitting,
    Active,
    Terminal,
}

impl Phase {
    /// Phases in which a job run is in progress.
    pub fn is_running(self) -> bool {
        matches!(self, Phase::Submitting | Phase::Active)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Submitting => "submitting",
            Phase::Active => "active",
            Phase::Terminal => "terminal",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControllerState {
    pub phase: Phase,
    pub current_job: Option<JobId>,
    pub last_status: Option<JobStatus>,
    pub last_error: Option<ErrorInfo>,
    pub updated_at: DateTime<Utc>,
}

impl Default for ControllerState {
    fn default() -> Self {
        Self::idle()
    }
}

impl ControllerState {
    pub fn idle() -> Self {
        Self {
            phase: Phase::Idle,
            current_job: None,
            last_status: None,
            last_error: None,
            updated_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.phase == Phase::Terminal
    }

    /// Progress of the latest snapshot, if any has been received.
    pub fn progress(&self) -> Option<f64> {
        self.last_status.as_ref().map(JobStatus::progress)
    }

    /// `current_job` may only be held while a run is in progress, and an
    /// active run always has one. During `Submitting` the id is not known yet.
    pub fn holds_invariants(&self) -> bool {
        let job_matches_phase = match self.phase {
            Phase::Active => self.current_job.is_some(),
            Phase::Submitting => true,
            Phase::Idle | Phase::Terminal => self.current_job.is_none(),
        };
        let terminal_status_matches_phase = self
            .last_status
            .as_ref()
            .is_none_or(|s| !s.is_terminal() || self.phase == Phase::Terminal);

        job_matches_phase && terminal_status_matches_phase
    }

    pub(crate) fn begin_submission(&mut self) {
        self.phase = Phase::Submitting;
        self.current_job = None;
        self.last_status = None;
        self.last_error = None;
        self.touch();
    }

    pub(crate) fn submission_accepted(&mut self, job_id: JobId) {
        self.phase = Phase::Active;
        self.current_job = Some(job_id);
        self.touch();
    }

    pub(crate) fn submission_failed(&mut self, message: impl Into<String>) {
        self.finish(Some(ErrorInfo::new(ErrorKind::SubmissionFailed, message)));
    }

    /// Records a poll snapshot. Returns `true` when it ended the run.
    pub(crate) fn apply_status(&mut self, status: JobStatus) -> bool {
        let terminal = status.is_terminal();
        self.last_status = Some(status);
        if terminal {
            self.finish(None);
        } else {
            self.touch();
        }
        terminal
    }

    pub(crate) fn polling_failed(&mut self, message: impl Into<String>) {
        self.finish(Some(ErrorInfo::new(ErrorKind::PollingFailed, message)));
    }

    pub(crate) fn cancelled(&mut self) {
        self.last_status = Some(JobStatus::cancelled_from(self.last_status.as_ref()));
        self.finish(None);
    }

    pub(crate) fn cancel_unconfirmed(&mut self, message: impl Into<String>) {
        self.last_error = Some(ErrorInfo::new(ErrorKind::CancelUnconfirmed, message));
        self.touch();
    }

    fn finish(&mut self, error: Option<ErrorInfo>) {
        self.phase = Phase::Terminal;
        self.current_job = None;
        if error.is_some() {
            self.last_error = error;
        }
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
