//! Reconciliation of asynchronous transport results against controller state.
//!
//! Every run gets a generation number. Results carry the generation (and job
//! id) they were issued for and are checked against the current state when
//! they are processed, not when they were requested. Anything that no longer
//! matches is discarded.

use tracing::debug;

use super::error::ControllerError;
use super::state::{ControllerState, Phase};
use super::types::{JobId, JobStatus};
use crate::transport::TransportError;

/// What applying an event did to the state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Reconciled {
    /// Stale or irrelevant result; state untouched.
    Ignored,
    /// State changed, run continues.
    Updated,
    /// Submission accepted; polling should begin for this job.
    Activated(JobId),
    /// Run reached the terminal phase.
    Finished,
}

/// Outcome of beginning a new run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Started {
    pub generation: u64,
    /// Whether a run still in progress was superseded.
    pub abandoned: bool,
    pub abandoned_job: Option<JobId>,
}

#[derive(Debug, Default)]
pub(crate) struct Machine {
    state: ControllerState,
    generation: u64,
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn start(&mut self) -> Started {
        let abandoned = self.state.phase.is_running();
        let abandoned_job = self.state.current_job.clone();

        self.generation += 1;
        self.state.begin_submission();

        Started {
            generation: self.generation,
            abandoned,
            abandoned_job,
        }
    }

    pub fn on_submitted(
        &mut self,
        generation: u64,
        result: Result<JobId, TransportError>,
    ) -> Reconciled {
        if generation != self.generation || self.state.phase != Phase::Submitting {
            debug!(generation, current = self.generation, "Discarding stale submission result");
            return Reconciled::Ignored;
        }

        match result {
            Ok(job_id) => {
                self.state.submission_accepted(job_id.clone());
                Reconciled::Activated(job_id)
            }
            Err(e) => {
                self.state.submission_failed(e.to_string());
                Reconciled::Finished
            }
        }
    }

    pub fn on_polled(
        &mut self,
        generation: u64,
        job_id: &JobId,
        result: Result<JobStatus, TransportError>,
    ) -> Reconciled {
        if !self.is_current(generation, job_id) {
            debug!(%job_id, generation, current = self.generation, "Discarding stale poll result");
            return Reconciled::Ignored;
        }

        match result {
            Ok(status) => {
                if self.state.apply_status(status) {
                    Reconciled::Finished
                } else {
                    Reconciled::Updated
                }
            }
            Err(e) => {
                self.state.polling_failed(e.to_string());
                Reconciled::Finished
            }
        }
    }

    /// Applies the local cancellation and returns the job to cancel remotely.
    pub fn cancel(&mut self) -> Result<JobId, ControllerError> {
        if !self.state.phase.is_running() {
            return Err(ControllerError::NotCancellable);
        }
        let job_id = self
            .state
            .current_job
            .clone()
            .ok_or(ControllerError::NotCancellable)?;

        self.state.cancelled();
        Ok(job_id)
    }

    pub fn on_cancel_settled(
        &mut self,
        generation: u64,
        result: Result<(), TransportError>,
    ) -> Reconciled {
        if generation != self.generation || self.state.phase != Phase::Terminal {
            debug!(generation, current = self.generation, "Discarding stale cancel result");
            return Reconciled::Ignored;
        }

        match result {
            Ok(()) => Reconciled::Ignored,
            Err(e) => {
                self.state.cancel_unconfirmed(e.to_string());
                Reconciled::Updated
            }
        }
    }

    fn is_current(&self, generation: u64, job_id: &JobId) -> bool {
        generation == self.generation
            && self.state.phase == Phase::Active
            && self.state.current_job.as_ref() == Some(job_id)
    }
}
