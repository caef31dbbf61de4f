//! End-to-end runs of both pipelines through the HTTP router, with stubbed upstream services.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use async_trait::async_trait;
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use navigator_service::{AppState, Navigator, build_router, envelope::DEGRADED_HEADER};
use serde_json::{Value, json};
use stage_flow::{
    CompletionReply, CompletionRequest, CompletionService, Evidence, ModelEndpoint, Orchestrator,
    RawEvidence, ResearchAssistant, ResearchPrompt, ResearchStage, SearchService, ServiceError,
};
use tower::ServiceExt;

type Script = dyn Fn(&str, &str) -> Result<CompletionReply, ServiceError> + Send + Sync;

/// Answers by `(model, tool name)` and records every call.
struct StubCompletion {
    script: Box<Script>,
    calls: Mutex<Vec<(String, String)>>,
}

impl StubCompletion {
    fn new(
        script: impl Fn(&str, &str) -> Result<CompletionReply, ServiceError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn tools_called(&self) -> Vec<String> {
        self.calls.lock().unwrap().iter().map(|(_, t)| t.clone()).collect()
    }
}

#[async_trait]
impl CompletionService for StubCompletion {
    async fn complete(&self, request: CompletionRequest) -> Result<CompletionReply, ServiceError> {
        let tool = request.tool.map(|t| t.name).unwrap_or_default();
        self.calls
            .lock()
            .unwrap()
            .push((request.model.clone(), tool.clone()));
        (self.script)(&request.model, &tool)
    }
}

struct StubSearch {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl SearchService for StubSearch {
    async fn search(&self, query: &str, limit: usize) -> Result<RawEvidence, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(ServiceError::Timeout {
                service: "web-search".into(),
            });
        }
        Ok((0..limit.min(2))
            .map(|i| {
                Evidence::search_hit(
                    format!("Result {i} for {query}"),
                    format!("https://clinicaltrials.gov/study/NCT0000000{i}"),
                    "Recruiting",
                )
            })
            .collect())
    }
}

struct StubAssistant;

#[async_trait]
impl ResearchAssistant for StubAssistant {
    async fn investigate(&self, _prompt: &ResearchPrompt) -> Result<String, ServiceError> {
        Ok("Ice chips during infusion can help with mouth sores.".into())
    }
}

fn profile_reply() -> CompletionReply {
    CompletionReply::tool_call(
        json!({
            "cancerType": "Non-small cell lung cancer",
            "stage": "Stage IIIB",
            "biomarkers": ["KRAS G12C", "kras g12c"],
            "age": 58,
            "sex": "male",
            "searchTerms": ["NSCLC KRAS G12C"]
        })
        .to_string(),
    )
}

fn trials_reply() -> CompletionReply {
    CompletionReply::tool_call(
        json!({
            "trials": [{
                "id": "NCT04303780",
                "title": "Sotorasib versus docetaxel in KRAS G12C NSCLC",
                "matchScore": 82.0,
                "eligibilitySummary": "KRAS G12C mutated, previously treated NSCLC",
                "requirements": ["Measurable disease", "ECOG 0-1"],
                "doctorQuestions": ["Would I qualify after chemoradiation?", "What are the visit requirements?"],
                "location": "Boston, MA"
            }],
            "summary": "One strong match for your KRAS G12C mutation.",
            "emotionalMessage": "You have real options, and you are not alone.",
            "nextSteps": ["Share this list with your oncologist", "Contact the trial coordinator"]
        })
        .to_string(),
    )
}

fn regimen_reply() -> CompletionReply {
    CompletionReply::tool_call(
        json!({
            "drugs": [
                { "name": "Oxaliplatin", "commonSideEffects": ["neuropathy", "nausea", "fatigue", "cold sensitivity"] },
                { "name": "Fluorouracil", "commonSideEffects": ["mouth sores"] }
            ],
            "cycleDays": 14.0,
            "considerations": ["Avoid cold drinks for several days after infusion", "Blood counts are checked before each cycle"]
        })
        .to_string(),
    )
}

fn timeline_reply() -> CompletionReply {
    // Free text with a bare array, the way some models answer.
    CompletionReply::text(
        "```json\n".to_string()
            + &json!([
                { "day": "8-14", "phase": "Recovery", "tips": ["Light walks"], "sideEffects": null, "alert": null },
                { "day": 1, "phase": "Infusion Day", "tips": ["Eat a light meal"], "sideEffects": ["nausea"], "alert": "Call if fever above 38C" },
                { "day": "2-7", "phase": "Home pump", "alert": null }
            ])
            .to_string()
            + "\n```",
    )
}

fn happy(_model: &str, tool: &str) -> Result<CompletionReply, ServiceError> {
    Ok(match tool {
        "extract_profile" => profile_reply(),
        "return_trials" => trials_reply(),
        "extract_regimen" => regimen_reply(),
        _ => timeline_reply(),
    })
}

struct Harness {
    completion: Arc<StubCompletion>,
    search: Arc<StubSearch>,
    app: Router,
}

fn harness(completion: Arc<StubCompletion>, search_fails: bool) -> Harness {
    let search = Arc::new(StubSearch {
        calls: AtomicUsize::new(0),
        fail: search_fails,
    });
    let orchestrator = Orchestrator::new(
        ModelEndpoint::new(completion.clone(), "primary-model"),
        Some(ModelEndpoint::new(completion.clone(), "secondary-model")),
        ResearchStage::new(
            Some(search.clone() as Arc<dyn SearchService>),
            Some(Arc::new(StubAssistant) as Arc<dyn ResearchAssistant>),
        ),
    );
    let app = build_router(AppState {
        navigator: Navigator::new(orchestrator),
        speech: None,
    });
    Harness {
        completion,
        search,
        app,
    }
}

async fn post(app: &Router, uri: &str, body: Value) -> (StatusCode, Option<String>, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let degraded = response
        .headers()
        .get(DEGRADED_HEADER)
        .map(|v| v.to_str().unwrap().to_string());
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, degraded, serde_json::from_slice(&bytes).unwrap())
}

/// Structure of a JSON value with all leaf values erased.
fn shape(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(map.iter().map(|(k, v)| (k.clone(), shape(v))).collect()),
        Value::Array(items) => Value::Array(items.iter().map(shape).collect()),
        Value::String(_) => json!("string"),
        Value::Number(_) => json!("number"),
        Value::Bool(_) => json!("bool"),
        Value::Null => Value::Null,
    }
}

#[tokio::test]
async fn trial_match_returns_scored_trials() {
    let h = harness(StubCompletion::new(happy), false);
    let (status, degraded, body) = post(
        &h.app,
        "/trial-match",
        json!({ "summary": "58-year-old male, Stage IIIB NSCLC, KRAS G12C positive" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(degraded.as_deref(), Some("false"));
    assert_eq!(body["trials"][0]["matchScore"], 82);
    assert_eq!(body["trials"][0]["id"], "NCT04303780");
    assert!(!body["summary"].as_str().unwrap().is_empty());
    assert_eq!(body["nextSteps"].as_array().unwrap().len(), 2);
    assert_eq!(body["profile"]["biomarkers"], json!(["KRAS G12C"]));
    assert!(body.get("error").is_none());

    assert_eq!(h.completion.tools_called(), vec!["extract_profile", "return_trials"]);
    assert_eq!(h.search.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn research_outage_degrades_but_still_answers() {
    let h = harness(StubCompletion::new(happy), true);
    let (status, degraded, body) =
        post(&h.app, "/trial-match", json!({ "summary": "Stage IV colon cancer" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(degraded.as_deref(), Some("true"));
    assert!(body["trials"].is_array());
}

#[tokio::test]
async fn secondary_model_recovers_from_schema_violation() {
    let completion = StubCompletion::new(|model, tool| {
        if model == "primary-model" && tool == "extract_profile" {
            // Missing the required `stage` and `searchTerms`.
            Ok(CompletionReply::tool_call(r#"{"cancerType":"NSCLC"}"#))
        } else {
            happy(model, tool)
        }
    });
    let h = harness(completion, false);
    let (status, _, body) =
        post(&h.app, "/trial-match", json!({ "summary": "Stage IIIB NSCLC" })).await;

    assert_eq!(status, StatusCode::OK);
    assert!(body.get("error").is_none());
    assert_eq!(
        h.completion.tools_called(),
        vec!["extract_profile", "extract_profile", "return_trials"]
    );
}

#[tokio::test]
async fn exhausted_extraction_returns_error_only() {
    let completion = StubCompletion::new(|_, _| Ok(CompletionReply::text("I cannot help with that.")));
    let h = harness(completion, false);
    let (status, degraded, body) =
        post(&h.app, "/trial-match", json!({ "summary": "Stage IIIB NSCLC" })).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(degraded.is_none());
    assert!(body.get("trials").is_none());
    assert!(body["error"].is_string());
    assert_eq!(body.as_object().unwrap().len(), 1);
    assert_eq!(h.search.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn rate_limited_synthesis_is_429() {
    let completion = StubCompletion::new(|model, tool| {
        if tool == "build_timeline" {
            Err(ServiceError::RateLimited {
                service: "completion".into(),
            })
        } else {
            happy(model, tool)
        }
    });
    let h = harness(completion, false);
    let (status, _, body) =
        post(&h.app, "/regimen-guide", json!({ "regimen": "FOLFOX every 14 days" })).await;

    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert!(body.get("timeline").is_none());
    assert_eq!(
        body["error"],
        "Rate limit exceeded. Please try again in a moment."
    );
}

#[tokio::test]
async fn regimen_guide_builds_ordered_timeline() {
    let h = harness(StubCompletion::new(happy), false);
    let (status, degraded, body) =
        post(&h.app, "/regimen-guide", json!({ "regimen": "FOLFOX every 14 days" })).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(degraded.as_deref(), Some("false"));

    let days: Vec<_> = body["timeline"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["day"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(days, vec!["1", "2-7", "8-14"]);
    for day in body["timeline"].as_array().unwrap() {
        assert!(day["tips"].is_array());
        assert!(day["sideEffects"].is_array());
    }

    let interactions = body["interactions"].as_array().unwrap();
    assert_eq!(interactions[0]["severity"], "warning");
    assert_eq!(
        interactions[2]["message"],
        "Oxaliplatin: Common side effects include neuropathy, nausea, fatigue."
    );
    assert_eq!(body["fdaResources"].as_array().unwrap().len(), 2);
    assert_eq!(
        body["managementTips"],
        "Ice chips during infusion can help with mouth sores."
    );
    assert_eq!(body["regimenData"]["cycleDays"], 14);
}

#[tokio::test]
async fn empty_regimen_never_reaches_upstream() {
    let h = harness(StubCompletion::new(happy), false);
    let (status, _, body) = post(&h.app, "/regimen-guide", json!({ "regimen": "" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body, json!({ "error": "Regimen is required" }));
    assert!(h.completion.tools_called().is_empty());
    assert_eq!(h.search.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn identical_input_gives_identically_shaped_envelopes() {
    let h = harness(StubCompletion::new(happy), false);
    let input = json!({ "summary": "58-year-old male, Stage IIIB NSCLC, KRAS G12C positive" });

    let (_, _, first) = post(&h.app, "/trial-match", input.clone()).await;
    let (_, _, second) = post(&h.app, "/trial-match", input).await;
    assert_eq!(shape(&first), shape(&second));

    let (_, _, first) = post(&h.app, "/regimen-guide", json!({ "regimen": "FOLFOX" })).await;
    let (_, _, second) = post(&h.app, "/regimen-guide", json!({ "regimen": "FOLFOX" })).await;
    assert_eq!(shape(&first), shape(&second));
}
