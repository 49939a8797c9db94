use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::validation::RequestValidationError;

/// Errors returned directly from controller commands.
///
/// Transport failures never surface here; they are recorded in
/// [`ControllerState::last_error`](super::ControllerState) instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControllerError {
    #[error("invalid request: {0}")]
    InvalidRequest(#[from] RequestValidationError),
    #[error("no active job to cancel")]
    NotCancellable,
    #[error("controller has shut down")]
    Closed,
}

impl ControllerError {
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ControllerError::InvalidRequest(_) => Some(ErrorKind::InvalidRequest),
            ControllerError::NotCancellable => Some(ErrorKind::NotCancellable),
            ControllerError::Closed => None,
        }
    }
}

/// Error taxonomy visible to the presentation layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    InvalidRequest,
    SubmissionFailed,
    PollingFailed,
    CancelUnconfirmed,
    NotCancellable,
}

impl ErrorKind {
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRequest => "INVALID_REQUEST",
            ErrorKind::SubmissionFailed => "SUBMISSION_FAILED",
            ErrorKind::PollingFailed => "POLLING_FAILED",
            ErrorKind::CancelUnconfirmed => "CANCEL_UNCONFIRMED",
            ErrorKind::NotCancellable => "NOT_CANCELLABLE",
        }
    }

    /// `CancelUnconfirmed` is informational: the local cancel already happened.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ErrorKind::CancelUnconfirmed)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Last error recorded in the controller state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorInfo {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}
