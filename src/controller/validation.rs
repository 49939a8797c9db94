use thiserror::Error;

use super::types::{JobRequest, MAX_COUNT, MIN_COUNT};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestValidationError {
    #[error("search term must not be empty")]
    EmptySearchTerm,
    #[error("count must be between 1 and 50, got {0}")]
    CountOutOfRange(u32),
}

/// Checked before any transport call is made.
pub fn validate_request(request: &JobRequest) -> Result<(), RequestValidationError> {
    if request.search_term.trim().is_empty() {
        return Err(RequestValidationError::EmptySearchTerm);
    }

    if !(MIN_COUNT..=MAX_COUNT).contains(&request.count) {
        return Err(RequestValidationError::CountOutOfRange(request.count));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_request_accepts_valid_payload() {
        assert!(validate_request(&JobRequest::new("cats", 10)).is_ok());
        assert!(validate_request(&JobRequest::new("cats", MIN_COUNT)).is_ok());
        assert!(validate_request(&JobRequest::new("cats", MAX_COUNT)).is_ok());
    }

    #[test]
    fn validate_request_rejects_empty_term() {
        let err = validate_request(&JobRequest::new("", 10)).unwrap_err();
        assert_eq!(err, RequestValidationError::EmptySearchTerm);

        let err = validate_request(&JobRequest::new("   ", 10)).unwrap_err();
        assert_eq!(err, RequestValidationError::EmptySearchTerm);
    }

    #[test]
    fn validate_request_limits_count() {
        let err = validate_request(&JobRequest::new("cats", 0)).unwrap_err();
        assert_eq!(err, RequestValidationError::CountOutOfRange(0));

        let err = validate_request(&JobRequest::new("cats", 51)).unwrap_err();
        assert_eq!(err, RequestValidationError::CountOutOfRange(51));
        assert_eq!(err.to_string(), "count must be between 1 and 50, got 51");
    }
}
