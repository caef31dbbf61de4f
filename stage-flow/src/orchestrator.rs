//! The per-run state machine.
//!
//! ```text
//! Extracting(Primary) ──ok──► Researching ──any──► Synthesizing(Primary) ──ok──► Done
//!        │ err                                            │ err
//!        ▼                                                ▼
//! Extracting(Secondary) ──ok──► Researching     Synthesizing(Secondary) ──ok──► Done
//!        │ err                                            │ err
//!        ▼                                                ▼
//!      Failed                                           Failed
//! ```
//!
//! The secondary tier only exists when a fallback model is configured. Every mandatory stage is
//! attempted at most twice; research is attempted once and never fails the run.
//!
//! A run owns all of its intermediate values. Dropping the future returned by
//! [`Orchestrator::run`] cancels the in-flight service call and no further stage is started.

use std::fmt;

use serde::Serialize;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::{
    error::{ErrorKind, FlowError, StageError},
    extraction::ModelEndpoint,
    pipeline::Pipeline,
    research::{ResearchFindings, ResearchStage},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelTier {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Extracting(ModelTier),
    Researching,
    Synthesizing(ModelTier),
    Done,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Succeeded,
    Failed,
}

impl Phase {
    pub const START: Phase = Phase::Extracting(ModelTier::Primary);

    /// The single transition function of the machine.
    pub fn advance(self, outcome: StepOutcome, fallback_available: bool) -> Phase {
        match (self, outcome) {
            (Phase::Extracting(_), StepOutcome::Succeeded) => Phase::Researching,
            (Phase::Extracting(ModelTier::Primary), StepOutcome::Failed) if fallback_available => {
                Phase::Extracting(ModelTier::Secondary)
            }
            (Phase::Extracting(_), StepOutcome::Failed) => Phase::Failed,
            (Phase::Researching, _) => Phase::Synthesizing(ModelTier::Primary),
            (Phase::Synthesizing(_), StepOutcome::Succeeded) => Phase::Done,
            (Phase::Synthesizing(ModelTier::Primary), StepOutcome::Failed) if fallback_available => {
                Phase::Synthesizing(ModelTier::Secondary)
            }
            (Phase::Synthesizing(_), StepOutcome::Failed) => Phase::Failed,
            (terminal @ (Phase::Done | Phase::Failed), _) => terminal,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StageName {
    Extract,
    Research,
    Synthesize,
}

impl StageName {
    pub fn is_mandatory(self) -> bool {
        !matches!(self, StageName::Research)
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageName::Extract => "extract",
            StageName::Research => "research",
            StageName::Synthesize => "synthesize",
        })
    }
}

/// One failed stage attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct StageFailure {
    pub stage: StageName,
    pub model: Option<String>,
    pub error: StageError,
}

/// Result of one run: the domain result if the mandatory stages succeeded, plus diagnostics.
#[derive(Debug, Clone)]
pub struct PipelineOutcome<T> {
    pub result: Option<T>,
    pub degraded: bool,
    pub stage_errors: Vec<StageFailure>,
}

impl<T> PipelineOutcome<T> {
    /// Why a run produced no result. `None` when it did.
    ///
    /// Rate limiting anywhere in a mandatory stage wins, so callers are told to back off even when
    /// the fallback model then failed for another reason.
    pub fn abort_error(&self) -> Option<FlowError> {
        if self.result.is_some() {
            return None;
        }
        let mandatory = || self.stage_errors.iter().filter(|f| f.stage.is_mandatory());
        let cause = mandatory()
            .find(|f| f.error.kind() == ErrorKind::UpstreamRateLimited)
            .or_else(|| mandatory().last())?;

        Some(FlowError::Aborted {
            stage: cause.stage.to_string(),
            cause: cause.error.clone(),
        })
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> PipelineOutcome<U> {
        PipelineOutcome {
            result: self.result.map(f),
            degraded: self.degraded,
            stage_errors: self.stage_errors,
        }
    }
}

/// Sequences the stages of any [`Pipeline`]. Holds no per-run state and is cheap to clone.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    primary: ModelEndpoint,
    secondary: Option<ModelEndpoint>,
    research: ResearchStage,
}

impl Orchestrator {
    pub fn new(
        primary: ModelEndpoint,
        secondary: Option<ModelEndpoint>,
        research: ResearchStage,
    ) -> Self {
        Self {
            primary,
            secondary,
            research,
        }
    }

    pub async fn run<P: Pipeline>(&self, pipeline: &P, input: &str) -> PipelineOutcome<P::Output> {
        let run_id = Uuid::new_v4();
        let span = info_span!("pipeline", pipeline = pipeline.name(), %run_id);
        self.drive(pipeline, input).instrument(span).await
    }

    fn endpoint(&self, tier: ModelTier) -> &ModelEndpoint {
        match tier {
            ModelTier::Primary => &self.primary,
            ModelTier::Secondary => self.secondary.as_ref().unwrap_or(&self.primary),
        }
    }

    async fn drive<P: Pipeline>(&self, pipeline: &P, input: &str) -> PipelineOutcome<P::Output> {
        let fallback_available = self.secondary.is_some();
        let mut stage_errors = Vec::new();
        let mut analysis: Option<P::Analysis> = None;
        let mut findings: Option<ResearchFindings> = None;
        let mut synthesis: Option<P::Synthesis> = None;

        let mut phase = Phase::START;
        info!("pipeline started");

        while !phase.is_terminal() {
            let outcome = match phase {
                Phase::Extracting(tier) => {
                    let endpoint = self.endpoint(tier);
                    match pipeline.extraction().run::<P::Analysis>(endpoint, input).await {
                        Ok(value) => {
                            analysis = Some(value);
                            StepOutcome::Succeeded
                        }
                        Err(error) => {
                            stage_errors.push(failure(StageName::Extract, endpoint, error));
                            StepOutcome::Failed
                        }
                    }
                }
                Phase::Researching => {
                    let Some(current) = analysis.as_ref() else {
                        phase = Phase::Failed;
                        continue;
                    };
                    let query = pipeline.research_query(input, current);
                    let gathered = self.research.research(&query).await;
                    stage_errors.extend(gathered.failures.iter().cloned().map(|error| {
                        StageFailure {
                            stage: StageName::Research,
                            model: None,
                            error: StageError::Upstream(error),
                        }
                    }));
                    findings = Some(gathered);
                    StepOutcome::Succeeded
                }
                Phase::Synthesizing(tier) => {
                    let (Some(current), Some(gathered)) = (analysis.as_ref(), findings.as_ref())
                    else {
                        phase = Phase::Failed;
                        continue;
                    };
                    let endpoint = self.endpoint(tier);
                    let attempt = match pipeline.synthesis_input(input, current, gathered) {
                        Ok(prompt) => {
                            pipeline.synthesis().run::<P::Synthesis>(endpoint, &prompt).await
                        }
                        Err(error) => Err(error),
                    };
                    match attempt {
                        Ok(value) => {
                            synthesis = Some(value);
                            StepOutcome::Succeeded
                        }
                        Err(error) => {
                            stage_errors.push(failure(StageName::Synthesize, endpoint, error));
                            StepOutcome::Failed
                        }
                    }
                }
                Phase::Done | Phase::Failed => break,
            };

            let next = phase.advance(outcome, fallback_available);
            info!(from = ?phase, to = ?next, "phase transition");
            phase = next;
        }

        let research_degraded = findings.as_ref().is_some_and(ResearchFindings::is_degraded);
        let result = match (phase, analysis, findings, synthesis) {
            (Phase::Done, Some(analysis), Some(findings), Some(synthesis)) => {
                Some(pipeline.assemble(analysis, findings, synthesis))
            }
            _ => None,
        };

        if result.is_none() {
            warn!(errors = stage_errors.len(), "pipeline failed");
        } else {
            info!(degraded = research_degraded, "pipeline completed");
        }

        PipelineOutcome {
            degraded: research_degraded || result.is_none(),
            result,
            stage_errors,
        }
    }
}

fn failure(stage: StageName, endpoint: &ModelEndpoint, error: StageError) -> StageFailure {
    warn!(%stage, model = endpoint.model(), %error, "stage attempt failed");
    StageFailure {
        stage,
        model: Some(endpoint.model().to_string()),
        error,
    }
}
