//! Transport adapter contract
//!
//! The controller never talks to the network directly. It drives an
//! implementation of [`Transport`], which performs the three remote
//! operations and reports typed results.
//!
//! ## Key Components
//!
//! - [`Transport`] - trait the controller consumes
//! - [`TransportError`] - failure of a single remote call
//! - [`HttpTransport`] - `reqwest`-based adapter for a JSON job service
//! - [`models`] - wire DTOs used by the HTTP adapter

pub mod http;
pub mod models;

use async_trait::async_trait;
use thiserror::Error;

use crate::controller::{JobId, JobRequest, JobStatus};

pub use http::{HttpConfig, HttpTransport};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    RequestFailed(String),

    #[error("request timed out")]
    Timeout,

    #[error("HTTP {status}: {message}")]
    Status { status: u16, message: String },

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

pub type Result<T> = std::result::Result<T, TransportError>;

/// Remote job operations consumed by the controller.
///
/// Implementations must be cheap to share; the controller holds one behind
/// an `Arc` and calls it from spawned tasks.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Submit a new job and return its remote id
    async fn submit(&self, request: &JobRequest) -> Result<JobId>;

    /// Fetch the current status snapshot of a job
    async fn fetch_status(&self, job_id: &JobId) -> Result<JobStatus>;

    /// Ask the remote side to cancel a job
    async fn cancel(&self, job_id: &JobId) -> Result<()>;
}
