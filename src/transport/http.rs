//! HTTP transport for a JSON job service

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, HeaderValue};
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::models::{ErrorResponse, JobAcceptedResponse, JobStatusResponse, SubmitJobBody};
use super::{Result, Transport, TransportError};
use crate::config::Config;
use crate::controller::{JobId, JobRequest, JobStatus};

/// Header carrying a fresh key per submission so the server can drop duplicates
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub user_agent: String,
    pub api_token: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("jobwatch/", env!("CARGO_PKG_VERSION")).to_string(),
            api_token: None,
        }
    }
}

impl From<&Config> for HttpConfig {
    fn from(config: &Config) -> Self {
        Self {
            connect_timeout: config.http.connect_timeout.as_duration(),
            request_timeout: config.http.request_timeout.as_duration(),
            user_agent: config.http.user_agent.clone(),
            api_token: config.remote.api_token.clone(),
        }
    }
}

/// Job service client speaking JSON over HTTP
pub struct HttpTransport {
    client: Client,
    base_url: Url,
    config: HttpConfig,
}

impl HttpTransport {
    /// Create a new HTTP transport rooted at `base_url`
    pub fn new(base_url: &str, config: HttpConfig) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{}: {}", base_url, e)))?;

        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme: {}",
                base_url.scheme()
            )));
        }

        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| TransportError::RequestFailed(e.to_string()))?;

        Ok(Self {
            client,
            base_url,
            config,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(&config.remote.base_url, HttpConfig::from(config))
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build `{base}/seg/seg...`, escaping each segment
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| {
                TransportError::InvalidUrl(format!("cannot be a base: {}", self.base_url))
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response> {
        let request = match &self.config.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout
            } else {
                TransportError::RequestFailed(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let fallback = status.canonical_reason().unwrap_or("Unknown").to_string();
            let message = match response.bytes().await {
                Ok(body) => serde_json::from_slice::<ErrorResponse>(&body)
                    .map(|e| format!("{}: {}", e.code, e.message))
                    .unwrap_or(fallback),
                Err(_) => fallback,
            };
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response)
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T> {
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| TransportError::InvalidResponse("missing Content-Type header".into()))?;
        parse_content_type(content_type)?;

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::RequestFailed(format!("Failed to read body: {}", e)))?;

        serde_json::from_slice(&body).map_err(|e| TransportError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn submit(&self, request: &JobRequest) -> Result<JobId> {
        let url = self.endpoint(&["jobs"])?;
        let body = serde_json::to_vec(&SubmitJobBody::from(request))
            .map_err(|e| TransportError::RequestFailed(format!("Failed to encode body: {}", e)))?;
        let idempotency_key = Uuid::new_v4().to_string();

        debug!(%url, %idempotency_key, "Submitting job");

        let response = self
            .send(
                self.client
                    .post(url)
                    .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                    .header(IDEMPOTENCY_HEADER, &idempotency_key)
                    .body(body),
            )
            .await?;

        let accepted: JobAcceptedResponse = Self::read_json(response).await?;
        if accepted.job_id.trim().is_empty() {
            warn!("Job service accepted the submission without a job id");
            return Err(TransportError::InvalidResponse("empty job_id".into()));
        }

        Ok(JobId::new(accepted.job_id))
    }

    async fn fetch_status(&self, job_id: &JobId) -> Result<JobStatus> {
        let url = self.endpoint(&["jobs", job_id.as_str()])?;
        let response = self.send(self.client.get(url)).await?;
        let status: JobStatusResponse = Self::read_json(response).await?;

        debug!(%job_id, state = ?status.state, "Fetched job status");

        Ok(status.into())
    }

    async fn cancel(&self, job_id: &JobId) -> Result<()> {
        let url = self.endpoint(&["jobs", job_id.as_str(), "cancel"])?;
        self.send(self.client.post(url)).await?;

        debug!(%job_id, "Cancel request accepted");

        Ok(())
    }
}

/// Parses and validates a response Content-Type of application/json
///
/// Accepts `application/json` with optional parameters such as a charset,
/// rejects anything else (`application/jsonp`, `text/json`, malformed types).
pub fn parse_content_type(content_type: &str) -> Result<mime::Mime> {
    let media_type: mime::Mime = content_type.parse().map_err(|_| {
        TransportError::InvalidResponse(format!("invalid Content-Type: {}", content_type))
    })?;

    if media_type.type_() != mime::APPLICATION || media_type.subtype() != mime::JSON {
        return Err(TransportError::InvalidResponse(format!(
            "Content-Type must be application/json, got: {}/{}",
            media_type.type_(),
            media_type.subtype()
        )));
    }

    Ok(media_type)
}
