//! Generic typed caller for one external JSON API.
//!
//! Every call goes through [`ServiceClient::call`] (or [`ServiceClient::call_bytes`] for binary
//! payloads such as audio). The client injects the configured credential, applies the per-call
//! timeout, and turns every non-2xx response into a classified [`ServiceError`]:
//!
//! | upstream outcome            | error                               |
//! |-----------------------------|-------------------------------------|
//! | 401 / 403                   | [`ServiceError::Unauthorized`]      |
//! | 429                         | [`ServiceError::RateLimited`]       |
//! | network timeout             | [`ServiceError::Timeout`]           |
//! | other non-2xx, connect fail | [`ServiceError::ServiceUnavailable`]|
//! | body is not JSON            | [`ServiceError::MalformedResponse`] |
//!
//! One `tracing` event is emitted per call with the service name, status and latency.

use std::time::{Duration, Instant};

use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::ServiceError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const BODY_EXCERPT_CHARS: usize = 200;

/// How the credential is attached to outgoing requests.
#[derive(Debug, Clone, Default)]
pub enum Credential {
    #[default]
    None,
    /// `Authorization: Bearer <token>`
    Bearer(String),
    /// A vendor specific header, e.g. `xi-api-key`.
    Header { name: String, value: String },
}

/// Connection details for one external service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub name: String,
    pub base_url: String,
    pub credential: Credential,
    pub timeout: Duration,
}

impl ServiceConfig {
    pub fn new(name: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            credential: Credential::None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_bearer(mut self, token: impl Into<String>) -> Self {
        self.credential = Credential::Bearer(token.into());
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.credential = Credential::Header {
            name: name.into(),
            value: value.into(),
        };
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

/// A successful, already decoded JSON response.
#[derive(Debug, Clone)]
pub struct ServiceResponse {
    pub status: u16,
    pub body: Value,
    pub latency: Duration,
}

/// Thin wrapper over a shared `reqwest::Client`. Cheap to clone.
#[derive(Debug, Clone, Default)]
pub struct ServiceClient {
    http: Client,
}

impl ServiceClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(http: Client) -> Self {
        Self { http }
    }

    /// POST `payload` as JSON to `path` and decode the JSON response.
    pub async fn call(
        &self,
        config: &ServiceConfig,
        path: &str,
        payload: &Value,
    ) -> Result<ServiceResponse, ServiceError> {
        let started = Instant::now();
        let response = self.send(config, path, payload).await?;
        let status = response.status().as_u16();

        let text = response
            .text()
            .await
            .map_err(|e| classify_transport(&config.name, e))?;

        let body = serde_json::from_str::<Value>(&text).map_err(|e| {
            let err = ServiceError::MalformedResponse {
                service: config.name.clone(),
                message: format!("{e}; body starts with: {}", excerpt(&text)),
            };
            warn!(service = %config.name, error = %err, "service returned non-JSON body");
            err
        })?;

        Ok(ServiceResponse {
            status,
            body,
            latency: started.elapsed(),
        })
    }

    /// POST `payload` as JSON to `path` and return the raw response bytes.
    pub async fn call_bytes(
        &self,
        config: &ServiceConfig,
        path: &str,
        payload: &Value,
    ) -> Result<Vec<u8>, ServiceError> {
        let response = self.send(config, path, payload).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| classify_transport(&config.name, e))?;
        Ok(bytes.to_vec())
    }

    async fn send(
        &self,
        config: &ServiceConfig,
        path: &str,
        payload: &Value,
    ) -> Result<reqwest::Response, ServiceError> {
        let started = Instant::now();
        let mut request = self
            .http
            .post(config.endpoint(path))
            .timeout(config.timeout)
            .json(payload);

        request = match &config.credential {
            Credential::None => request,
            Credential::Bearer(token) => request.bearer_auth(token),
            Credential::Header { name, value } => request.header(name.as_str(), value.as_str()),
        };

        let response = request.send().await.map_err(|e| {
            let err = classify_transport(&config.name, e);
            warn!(
                service = %config.name,
                latency_ms = started.elapsed().as_millis() as u64,
                error = %err,
                "service call failed before a response arrived"
            );
            err
        })?;

        let status = response.status();
        info!(
            service = %config.name,
            status = status.as_u16(),
            latency_ms = started.elapsed().as_millis() as u64,
            "service call completed"
        );

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let err = classify_status(&config.name, status, &body);
        warn!(service = %config.name, status = status.as_u16(), error = %err, "service call rejected");
        Err(err)
    }
}

/// Map a non-2xx status to its error kind.
pub fn classify_status(service: &str, status: StatusCode, body: &str) -> ServiceError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ServiceError::Unauthorized {
            service: service.to_string(),
            status: status.as_u16(),
        },
        StatusCode::TOO_MANY_REQUESTS => ServiceError::RateLimited {
            service: service.to_string(),
        },
        _ => ServiceError::ServiceUnavailable {
            service: service.to_string(),
            status: Some(status.as_u16()),
            message: excerpt(body),
        },
    }
}

fn classify_transport(service: &str, err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout {
            service: service.to_string(),
        }
    } else if err.is_decode() {
        ServiceError::MalformedResponse {
            service: service.to_string(),
            message: err.to_string(),
        }
    } else {
        ServiceError::ServiceUnavailable {
            service: service.to_string(),
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

fn excerpt(text: &str) -> String {
    text.chars().take(BODY_EXCERPT_CHARS).collect()
}
