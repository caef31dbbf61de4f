use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use stage_flow::ServiceClient;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

use crate::{
    config::NavigatorConfig,
    envelope::{self, ResponsePayload},
    models::{RegimenGuideRequest, SpeechRequest, TrialMatchRequest},
    navigator::{Navigator, PipelineKind, PipelineRequest},
    providers::TextToSpeech,
    speech::{self, SpeechService},
};

#[derive(Clone)]
pub struct AppState {
    pub navigator: Navigator,
    pub speech: Option<Arc<dyn SpeechService>>,
}

impl AppState {
    pub fn from_config(config: &NavigatorConfig) -> Self {
        let client = ServiceClient::new();
        let speech = config.speech.as_ref().map(|settings| {
            Arc::new(TextToSpeech::new(client.clone(), settings.clone())) as Arc<dyn SpeechService>
        });

        Self {
            navigator: Navigator::from_config(config, &client),
            speech,
        }
    }
}

pub fn create_app(config: &NavigatorConfig) -> Router {
    build_router(AppState::from_config(config))
}

pub fn build_router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health_check))
        .route("/trial-match", post(trial_match).options(preflight))
        .route("/regimen-guide", post(regimen_guide).options(preflight))
        .route("/speech-synthesis", post(speech_synthesis).options(preflight))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

async fn root() -> Json<Value> {
    Json(json!({
        "service": "Oncology Navigator Service",
        "version": "1.0.0",
        "description": "Clinical trial matching and chemotherapy regimen guides from free-text input",
        "endpoints": {
            "POST /trial-match": "Match recruiting clinical trials to an oncology summary",
            "POST /regimen-guide": "Build a day-by-day guide for a chemotherapy regimen",
            "POST /speech-synthesis": "Narrate a piece of generated text",
            "GET /health": "Health check"
        }
    }))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn preflight() -> StatusCode {
    StatusCode::OK
}

async fn trial_match(
    State(state): State<AppState>,
    payload: Result<Json<TrialMatchRequest>, JsonRejection>,
) -> ResponsePayload {
    match payload {
        Ok(Json(body)) => {
            let request = PipelineRequest::new(PipelineKind::TrialMatch, body.summary.unwrap_or_default());
            run_pipeline(&state, request).await
        }
        Err(rejection) => ResponsePayload::rejected(rejection),
    }
}

async fn regimen_guide(
    State(state): State<AppState>,
    payload: Result<Json<RegimenGuideRequest>, JsonRejection>,
) -> ResponsePayload {
    match payload {
        Ok(Json(body)) => {
            let request =
                PipelineRequest::new(PipelineKind::RegimenGuide, body.regimen.unwrap_or_default());
            run_pipeline(&state, request).await
        }
        Err(rejection) => ResponsePayload::rejected(rejection),
    }
}

async fn run_pipeline(state: &AppState, request: PipelineRequest) -> ResponsePayload {
    info!(pipeline = %request.kind, chars = request.raw_text.len(), "pipeline request received");
    let outcome = state.navigator.run(&request).await;
    envelope::build(outcome, &request)
}

async fn speech_synthesis(
    State(state): State<AppState>,
    payload: Result<Json<SpeechRequest>, JsonRejection>,
) -> Response {
    let body = match payload {
        Ok(Json(body)) => body,
        Err(rejection) => return ResponsePayload::rejected(rejection).into_response(),
    };

    match speech::narrate(state.speech.as_deref(), body.text.as_deref()).await {
        Ok(audio) => Json(audio).into_response(),
        Err(e) => e.into_response(),
    }
}
