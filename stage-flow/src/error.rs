use thiserror::Error;

/// Failure of a single call to an external JSON service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{service}: credentials rejected (HTTP {status})")]
    Unauthorized { service: String, status: u16 },

    #[error("{service}: rate limit exceeded")]
    RateLimited { service: String },

    #[error("{service}: request timed out")]
    Timeout { service: String },

    #[error("{service}: service unavailable{}", status_suffix(.status))]
    ServiceUnavailable {
        service: String,
        status: Option<u16>,
        message: String,
    },

    #[error("{service}: malformed response: {message}")]
    MalformedResponse { service: String, message: String },
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl ServiceError {
    pub fn service(&self) -> &str {
        match self {
            ServiceError::Unauthorized { service, .. }
            | ServiceError::RateLimited { service }
            | ServiceError::Timeout { service }
            | ServiceError::ServiceUnavailable { service, .. }
            | ServiceError::MalformedResponse { service, .. } => service,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ServiceError::Unauthorized { .. } => ErrorKind::UpstreamAuthError,
            ServiceError::RateLimited { .. } => ErrorKind::UpstreamRateLimited,
            ServiceError::Timeout { .. }
            | ServiceError::ServiceUnavailable { .. }
            | ServiceError::MalformedResponse { .. } => ErrorKind::UpstreamUnavailable,
        }
    }
}

/// Failure of a structured extraction or synthesis attempt.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StageError {
    #[error("output violates schema '{schema}': {detail}")]
    SchemaViolation { schema: String, detail: String },

    #[error("upstream failure: {0}")]
    Upstream(#[from] ServiceError),
}

impl StageError {
    pub fn violation(schema: impl Into<String>, detail: impl Into<String>) -> Self {
        StageError::SchemaViolation {
            schema: schema.into(),
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            StageError::SchemaViolation { .. } => ErrorKind::SchemaViolation,
            StageError::Upstream(e) => e.kind(),
        }
    }
}

/// Coarse classification used at the HTTP boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InputError,
    UpstreamAuthError,
    UpstreamRateLimited,
    UpstreamUnavailable,
    SchemaViolation,
    PipelineAborted,
}

/// Errors surfaced by a whole pipeline run.
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("pipeline aborted at {stage}: {cause}")]
    Aborted { stage: String, cause: StageError },

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl FlowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FlowError::InvalidInput(_) => ErrorKind::InputError,
            FlowError::Aborted { .. } | FlowError::Configuration(_) => ErrorKind::PipelineAborted,
        }
    }

    /// The error kind that actually caused an abort, looking through the wrapper.
    pub fn root_kind(&self) -> ErrorKind {
        match self {
            FlowError::Aborted { cause, .. } => cause.kind(),
            other => other.kind(),
        }
    }
}

pub type Result<T, E = FlowError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_classified_by_kind_not_text() {
        let err = StageError::Upstream(ServiceError::ServiceUnavailable {
            service: "completion".into(),
            status: Some(503),
            message: "429 rate limit mentioned in body".into(),
        });
        assert_eq!(err.kind(), ErrorKind::UpstreamUnavailable);

        let aborted = FlowError::Aborted {
            stage: "extract".into(),
            cause: StageError::Upstream(ServiceError::RateLimited {
                service: "completion".into(),
            }),
        };
        assert_eq!(aborted.kind(), ErrorKind::PipelineAborted);
        assert_eq!(aborted.root_kind(), ErrorKind::UpstreamRateLimited);
    }

    #[test]
    fn unavailable_display_includes_status() {
        let err = ServiceError::ServiceUnavailable {
            service: "search".into(),
            status: Some(502),
            message: String::new(),
        };
        assert_eq!(err.to_string(), "search: service unavailable (HTTP 502)");
    }
}
