//! One entry point per pipeline, all sharing a single orchestrator.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use stage_flow::{
    FlowError, ModelEndpoint, Orchestrator, PipelineOutcome, ResearchAssistant, ResearchStage,
    SearchService, ServiceClient,
};
use tracing::info;

use crate::config::NavigatorConfig;
use crate::models::{RegimenGuideResult, TrialMatchResult};
use crate::pipelines::{RegimenGuidePipeline, TrialMatchPipeline};
use crate::providers::{ChatCompletions, ResearchChat, WebSearch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineKind {
    TrialMatch,
    RegimenGuide,
}

impl PipelineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineKind::TrialMatch => "trial-match",
            PipelineKind::RegimenGuide => "regimen-guide",
        }
    }

    /// Name of the request field, as shown in validation errors.
    pub fn input_label(self) -> &'static str {
        match self {
            PipelineKind::TrialMatch => "Summary",
            PipelineKind::RegimenGuide => "Regimen",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineKind {
    type Err = FlowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trial-match" => Ok(PipelineKind::TrialMatch),
            "regimen-guide" => Ok(PipelineKind::RegimenGuide),
            other => Err(FlowError::InvalidInput(format!(
                "unknown pipeline {other:?}, expected trial-match or regimen-guide"
            ))),
        }
    }
}

/// One invocation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRequest {
    pub kind: PipelineKind,
    pub raw_text: String,
}

impl PipelineRequest {
    pub fn new(kind: PipelineKind, raw_text: impl Into<String>) -> Self {
        Self {
            kind,
            raw_text: raw_text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum PipelineResult {
    TrialMatch(TrialMatchResult),
    RegimenGuide(RegimenGuideResult),
}

#[derive(Clone)]
pub struct Navigator {
    orchestrator: Orchestrator,
    trial_match: Arc<TrialMatchPipeline>,
    regimen_guide: Arc<RegimenGuidePipeline>,
}

impl Navigator {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self {
            orchestrator,
            trial_match: Arc::new(TrialMatchPipeline::new()),
            regimen_guide: Arc::new(RegimenGuidePipeline::new()),
        }
    }

    /// Wire the HTTP providers described by `config`.
    pub fn from_config(config: &NavigatorConfig, client: &ServiceClient) -> Self {
        let completion = Arc::new(ChatCompletions::new(client.clone(), config.completion.clone()));
        let primary = ModelEndpoint::new(completion.clone(), config.primary_model.clone());
        let secondary = config
            .fallback_model
            .as_ref()
            .map(|model| ModelEndpoint::new(completion.clone(), model.clone()));

        let search = config.search.as_ref().map(|service| {
            Arc::new(WebSearch::new(client.clone(), service.clone())) as Arc<dyn SearchService>
        });
        let assistant = config.research.as_ref().map(|research| {
            Arc::new(ResearchChat::new(
                client.clone(),
                research.service.clone(),
                research.model.clone(),
            )) as Arc<dyn ResearchAssistant>
        });

        info!(
            primary_model = %config.primary_model,
            fallback_model = ?config.fallback_model,
            web_search = search.is_some(),
            research_assistant = assistant.is_some(),
            "navigator configured"
        );

        Self::new(Orchestrator::new(
            primary,
            secondary,
            ResearchStage::new(search, assistant),
        ))
    }

    pub async fn trial_match(&self, summary: &str) -> PipelineOutcome<TrialMatchResult> {
        self.orchestrator.run(self.trial_match.as_ref(), summary).await
    }

    pub async fn regimen_guide(&self, regimen: &str) -> PipelineOutcome<RegimenGuideResult> {
        self.orchestrator.run(self.regimen_guide.as_ref(), regimen).await
    }

    /// Validate the request and run the matching pipeline.
    ///
    /// Blank input is rejected before any upstream service is contacted.
    pub async fn run(
        &self,
        request: &PipelineRequest,
    ) -> Result<PipelineOutcome<PipelineResult>, FlowError> {
        let input = request.raw_text.trim();
        if input.is_empty() {
            return Err(FlowError::InvalidInput(format!(
                "{} is required",
                request.kind.input_label()
            )));
        }

        Ok(match request.kind {
            PipelineKind::TrialMatch => self.trial_match(input).await.map(PipelineResult::TrialMatch),
            PipelineKind::RegimenGuide => self
                .regimen_guide(input)
                .await
                .map(PipelineResult::RegimenGuide),
        })
    }
}
