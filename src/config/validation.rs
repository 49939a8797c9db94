use super::models::Config;
use reqwest::Url;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid remote base_url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Duration must be positive: {field}")]
    ZeroDuration { field: &'static str },

    #[error("controller.event_buffer must be at least 1")]
    ZeroEventBuffer,

    #[error("http.user_agent must not be empty")]
    EmptyUserAgent,
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_remote(config)?;
    validate_http(config)?;
    validate_controller(config)?;
    Ok(())
}

/// The base URL must parse and use http or https
fn validate_remote(config: &Config) -> Result<(), ValidationError> {
    let raw = &config.remote.base_url;
    let url = Url::parse(raw).map_err(|e| ValidationError::InvalidBaseUrl {
        url: raw.clone(),
        reason: e.to_string(),
    })?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(ValidationError::InvalidBaseUrl {
            url: raw.clone(),
            reason: format!("expected http:// or https://, got {}://", url.scheme()),
        });
    }

    Ok(())
}

fn validate_http(config: &Config) -> Result<(), ValidationError> {
    if config.http.connect_timeout.is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "http.connect_timeout",
        });
    }

    if config.http.request_timeout.is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "http.request_timeout",
        });
    }

    if config.http.user_agent.trim().is_empty() {
        return Err(ValidationError::EmptyUserAgent);
    }

    Ok(())
}

/// `call_timeout` may be zero (disabled); the poll interval may not
fn validate_controller(config: &Config) -> Result<(), ValidationError> {
    if config.controller.poll_interval.is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "controller.poll_interval",
        });
    }

    if config.controller.event_buffer == 0 {
        return Err(ValidationError::ZeroEventBuffer);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::humanize::HumanDuration;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = Config::default();
        config.remote.base_url = "localhost:8080/jobs".to_string();

        let result = validate(&config);
        assert!(matches!(result, Err(ValidationError::InvalidBaseUrl { .. })));
    }

    #[test]
    fn test_unsupported_scheme() {
        let mut config = Config::default();
        config.remote.base_url = "ftp://jobs.example.com".to_string();

        let result = validate(&config);
        assert!(matches!(result, Err(ValidationError::InvalidBaseUrl { .. })));
    }

    #[test]
    fn test_zero_poll_interval() {
        let mut config = Config::default();
        config.controller.poll_interval = HumanDuration::from_millis(0);

        let result = validate(&config);
        assert!(matches!(
            result,
            Err(ValidationError::ZeroDuration {
                field: "controller.poll_interval"
            })
        ));
    }

    #[test]
    fn test_zero_call_timeout_is_allowed() {
        let mut config = Config::default();
        config.controller.call_timeout = HumanDuration::from_millis(0);
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_event_buffer() {
        let mut config = Config::default();
        config.controller.event_buffer = 0;
        assert!(matches!(validate(&config), Err(ValidationError::ZeroEventBuffer)));
    }

    #[test]
    fn test_zero_request_timeout() {
        let mut config = Config::default();
        config.http.request_timeout = HumanDuration::from_millis(0);
        assert!(matches!(
            validate(&config),
            Err(ValidationError::ZeroDuration { .. })
        ));
    }
}
