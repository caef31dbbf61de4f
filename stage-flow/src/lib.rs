pub mod client;
pub mod error;
pub mod extraction;
pub mod orchestrator;
pub mod pipeline;
pub mod research;
pub mod schema;

// Re-export commonly used types
pub use client::{Credential, ServiceClient, ServiceConfig, ServiceResponse};
pub use error::{ErrorKind, FlowError, Result, ServiceError, StageError};
pub use extraction::{
    CompletionReply, CompletionRequest, CompletionService, ExtractionGoal, ModelEndpoint,
};
pub use orchestrator::{
    ModelTier, Orchestrator, Phase, PipelineOutcome, StageFailure, StageName, StepOutcome,
};
pub use pipeline::Pipeline;
pub use research::{
    Evidence, EvidenceSource, RawEvidence, ResearchAssistant, ResearchFindings, ResearchPrompt,
    ResearchQuery, ResearchStage, SearchQuery, SearchService,
};
pub use schema::ExtractionSchema;
