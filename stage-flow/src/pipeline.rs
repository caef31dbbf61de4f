use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::StageError,
    extraction::ExtractionGoal,
    research::{ResearchFindings, ResearchQuery},
};

/// A concrete extract → research → synthesize pipeline.
///
/// Implementors only describe *what* each stage asks for; the [`Orchestrator`] decides when
/// stages run, how often they are retried, and how failures are folded into the outcome.
///
/// [`Orchestrator`]: crate::orchestrator::Orchestrator
pub trait Pipeline: Send + Sync {
    /// First-stage structured output. Read-only once produced.
    type Analysis: DeserializeOwned + Serialize + Send + Sync;
    /// Decoded output of the synthesis call.
    type Synthesis: DeserializeOwned + Send;
    /// Final domain result handed to the envelope builder.
    type Output: Send;

    /// Short identifier used in logs, e.g. `trial-match`.
    fn name(&self) -> &'static str;

    fn extraction(&self) -> &ExtractionGoal;

    fn research_query(&self, input: &str, analysis: &Self::Analysis) -> ResearchQuery;

    fn synthesis(&self) -> &ExtractionGoal;

    /// Prompt body for synthesis: the serialized analysis plus the raw evidence.
    ///
    /// An error here counts as a failed synthesis attempt; no completion call is made.
    fn synthesis_input(
        &self,
        input: &str,
        analysis: &Self::Analysis,
        findings: &ResearchFindings,
    ) -> Result<String, StageError>;

    /// Merge everything into the final result. Must not fail.
    fn assemble(
        &self,
        analysis: Self::Analysis,
        findings: ResearchFindings,
        synthesis: Self::Synthesis,
    ) -> Self::Output;
}
