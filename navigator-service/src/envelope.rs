//! Turns a pipeline outcome into the wire-level response.
//!
//! Success bodies are the domain result only. Failure bodies are `{ "error": string }` with a
//! user-safe message; stage error detail goes to the log, never to the caller.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::{HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use stage_flow::{ErrorKind, FlowError, PipelineOutcome};
use tracing::{error, warn};

use crate::navigator::{PipelineKind, PipelineRequest, PipelineResult};

pub const DEGRADED_HEADER: &str = "x-pipeline-degraded";
pub const RATE_LIMITED_MESSAGE: &str = "Rate limit exceeded. Please try again in a moment.";

#[derive(Debug, Clone, PartialEq)]
pub struct ResponsePayload {
    pub status: StatusCode,
    pub body: Value,
    /// Set on successful pipeline responses only.
    pub degraded: Option<bool>,
}

impl ResponsePayload {
    pub fn error(status: StatusCode, message: &str) -> Self {
        Self {
            status,
            body: json!({ "error": message }),
            degraded: None,
        }
    }

    /// Unreadable request body. The framework's rejection text is logged, not returned.
    pub fn rejected(rejection: JsonRejection) -> Self {
        warn!(rejection = %rejection.body_text(), "rejected request body");
        Self::error(StatusCode::BAD_REQUEST, "Request body must be a JSON object")
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

impl IntoResponse for ResponsePayload {
    fn into_response(self) -> Response {
        let mut response = (self.status, Json(self.body)).into_response();
        if let Some(degraded) = self.degraded {
            response.headers_mut().insert(
                HeaderName::from_static(DEGRADED_HEADER),
                HeaderValue::from_static(if degraded { "true" } else { "false" }),
            );
        }
        response
    }
}

/// Build the response for one run.
pub fn build(
    outcome: Result<PipelineOutcome<PipelineResult>, FlowError>,
    request: &PipelineRequest,
) -> ResponsePayload {
    let outcome = match outcome {
        Ok(outcome) => outcome,
        Err(err) => return failure(&err, request.kind),
    };

    for stage_failure in &outcome.stage_errors {
        warn!(
            pipeline = %request.kind,
            stage = %stage_failure.stage,
            model = stage_failure.model.as_deref().unwrap_or("-"),
            error = %stage_failure.error,
            "stage error"
        );
    }

    match outcome.result {
        Some(result) => match serde_json::to_value(&result) {
            Ok(body) => ResponsePayload {
                status: StatusCode::OK,
                body,
                degraded: Some(outcome.degraded),
            },
            Err(e) => {
                error!(pipeline = %request.kind, error = %e, "failed to serialize result");
                ResponsePayload::error(StatusCode::INTERNAL_SERVER_ERROR, failure_message(request.kind))
            }
        },
        None => match outcome.abort_error() {
            Some(err) => failure(&err, request.kind),
            None => {
                error!(pipeline = %request.kind, "run ended without a result or a cause");
                ResponsePayload::error(StatusCode::INTERNAL_SERVER_ERROR, failure_message(request.kind))
            }
        },
    }
}

fn failure(err: &FlowError, kind: PipelineKind) -> ResponsePayload {
    let (status, message) = match err.root_kind() {
        // The reason is already user-facing; the Display prefix is for logs.
        ErrorKind::InputError => match err {
            FlowError::InvalidInput(reason) => (StatusCode::BAD_REQUEST, reason.clone()),
            other => (StatusCode::BAD_REQUEST, other.to_string()),
        },
        ErrorKind::UpstreamRateLimited => {
            (StatusCode::TOO_MANY_REQUESTS, RATE_LIMITED_MESSAGE.to_string())
        }
        _ => (
            StatusCode::INTERNAL_SERVER_ERROR,
            failure_message(kind).to_string(),
        ),
    };

    if status == StatusCode::BAD_REQUEST {
        warn!(pipeline = %kind, error = %err, "invalid request");
    } else {
        error!(pipeline = %kind, error = %err, kind = ?err.root_kind(), "pipeline failed");
    }
    ResponsePayload::error(status, &message)
}

fn failure_message(kind: PipelineKind) -> &'static str {
    match kind {
        PipelineKind::TrialMatch => "We couldn't match trials right now. Please try again later.",
        PipelineKind::RegimenGuide => {
            "We couldn't build your treatment guide right now. Please try again later."
        }
    }
}
