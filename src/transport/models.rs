//! Wire models for the HTTP job service.
//!
//! - `POST /jobs` accepts a [`SubmitJobBody`] and answers with [`JobAcceptedResponse`]
//! - `GET /jobs/{job_id}` returns a [`JobStatusResponse`]
//! - `POST /jobs/{job_id}/cancel` returns any 2xx status
//!
//! ```json
//! {
//!   "job_id": "0192f5c2-7d4e-7a51-9b1c-2f8e3c9d0a11",
//!   "state": "running",
//!   "progress_count": 3,
//!   "progress_total": 10,
//!   "result_location": null
//! }
//! ```

use serde::{Deserialize, Serialize};

use crate::controller::{JobRequest, JobState, JobStatus};

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SubmitJobBody {
    pub search_term: String,
    pub count: u32,
}

impl From<&JobRequest> for SubmitJobBody {
    fn from(request: &JobRequest) -> Self {
        Self {
            search_term: request.search_term.clone(),
            count: request.count,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobAcceptedResponse {
    pub job_id: String,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WireJobState {
    Queued,
    #[serde(alias = "in_progress")]
    Running,
    Completed,
    Failed,
    #[serde(alias = "canceled")]
    Cancelled,
}

impl From<WireJobState> for JobState {
    fn from(value: WireJobState) -> Self {
        match value {
            WireJobState::Queued => JobState::Queued,
            WireJobState::Running => JobState::Running,
            WireJobState::Completed => JobState::Completed,
            WireJobState::Failed => JobState::Failed,
            WireJobState::Cancelled => JobState::Cancelled,
        }
    }
}

impl From<JobState> for WireJobState {
    fn from(value: JobState) -> Self {
        match value {
            JobState::Queued => WireJobState::Queued,
            JobState::Running => WireJobState::Running,
            JobState::Completed => WireJobState::Completed,
            JobState::Failed => WireJobState::Failed,
            JobState::Cancelled => WireJobState::Cancelled,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct JobStatusResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub state: WireJobState,
    #[serde(default)]
    pub progress_count: u64,
    #[serde(default)]
    pub progress_total: u64,
    #[serde(default)]
    pub result_location: Option<String>,
}

impl From<JobStatusResponse> for JobStatus {
    fn from(value: JobStatusResponse) -> Self {
        JobStatus::new(
            value.state.into(),
            value.progress_count,
            value.progress_total,
            value.result_location,
        )
    }
}

impl From<&JobStatus> for JobStatusResponse {
    fn from(value: &JobStatus) -> Self {
        Self {
            job_id: None,
            state: value.state.into(),
            progress_count: value.progress_count,
            progress_total: value.progress_total,
            result_location: value.result_location.clone(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}
