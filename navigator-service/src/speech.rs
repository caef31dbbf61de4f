//! On-demand narration of text the pipelines produced. Not part of any pipeline run.

use async_trait::async_trait;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use stage_flow::{ErrorKind, ServiceError};
use thiserror::Error;
use tracing::{error, info};

use crate::envelope::{RATE_LIMITED_MESSAGE, ResponsePayload};
use crate::models::SpeechResponse;

/// Longest text forwarded upstream, in characters.
pub const MAX_SPEECH_CHARS: usize = 2000;

#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Returns encoded audio bytes.
    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ServiceError>;
}

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Text is required")]
    MissingText,
    #[error("Speech synthesis is not configured")]
    NotConfigured,
    #[error(transparent)]
    Upstream(#[from] ServiceError),
}

impl SpeechError {
    pub fn status(&self) -> StatusCode {
        match self {
            SpeechError::MissingText => StatusCode::BAD_REQUEST,
            SpeechError::Upstream(e) if e.kind() == ErrorKind::UpstreamRateLimited => {
                StatusCode::TOO_MANY_REQUESTS
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn user_message(&self) -> String {
        match self {
            SpeechError::Upstream(e) if e.kind() == ErrorKind::UpstreamRateLimited => {
                RATE_LIMITED_MESSAGE.to_string()
            }
            SpeechError::Upstream(_) => "Speech synthesis failed".to_string(),
            other => other.to_string(),
        }
    }
}

impl IntoResponse for SpeechError {
    fn into_response(self) -> Response {
        if let SpeechError::Upstream(e) = &self {
            error!(error = %e, "speech synthesis failed");
        }
        ResponsePayload::error(self.status(), &self.user_message()).into_response()
    }
}

/// Truncate to [`MAX_SPEECH_CHARS`] characters without splitting a code point.
pub fn cap_text(text: &str) -> &str {
    match text.char_indices().nth(MAX_SPEECH_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

pub async fn narrate(
    service: Option<&dyn SpeechService>,
    text: Option<&str>,
) -> Result<SpeechResponse, SpeechError> {
    let text = text
        .filter(|t| !t.trim().is_empty())
        .ok_or(SpeechError::MissingText)?;
    let service = service.ok_or(SpeechError::NotConfigured)?;

    let capped = cap_text(text);
    info!(chars = capped.chars().count(), "generating speech");
    let audio = service.synthesize(capped).await?;

    Ok(SpeechResponse {
        audio_base64: STANDARD.encode(audio),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct RecordingSpeech {
        result: Result<Vec<u8>, ServiceError>,
        seen: Mutex<Vec<String>>,
    }

    impl RecordingSpeech {
        fn new(result: Result<Vec<u8>, ServiceError>) -> Self {
            Self {
                result,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SpeechService for RecordingSpeech {
        async fn synthesize(&self, text: &str) -> Result<Vec<u8>, ServiceError> {
            self.seen.lock().unwrap().push(text.to_string());
            self.result.clone()
        }
    }

    #[test]
    fn cap_respects_char_boundaries() {
        let long = "é".repeat(MAX_SPEECH_CHARS + 10);
        let capped = cap_text(&long);
        assert_eq!(capped.chars().count(), MAX_SPEECH_CHARS);
        assert_eq!(cap_text("short"), "short");
    }

    #[tokio::test]
    async fn encodes_audio_as_base64() {
        let speech = RecordingSpeech::new(Ok(b"ID3".to_vec()));
        let response = narrate(Some(&speech as &dyn SpeechService), Some("You are not alone."))
            .await
            .unwrap();
        assert_eq!(response.audio_base64, "SUQz");
        assert_eq!(speech.seen.lock().unwrap()[0], "You are not alone.");
    }

    #[tokio::test]
    async fn blank_text_is_rejected_before_any_call() {
        let speech = RecordingSpeech::new(Ok(Vec::new()));
        let err = narrate(Some(&speech as &dyn SpeechService), Some("   ")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Text is required");
        assert!(speech.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_credential_is_a_server_error() {
        let err = narrate(None, Some("hi")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "Speech synthesis is not configured");
    }

    #[tokio::test]
    async fn upstream_rate_limit_maps_to_429() {
        let speech = RecordingSpeech::new(Err(ServiceError::RateLimited {
            service: "speech".into(),
        }));
        let err = narrate(Some(&speech as &dyn SpeechService), Some("hi")).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
    }
}
