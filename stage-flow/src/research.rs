//! Research stage: web search and a research assistant, both optional and both non-fatal.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::ServiceError;

/// Title of the synthetic evidence entry carrying the research assistant's narrative.
pub const RESEARCH_NOTES_TITLE: &str = "Research notes";

/// Which research service produced a piece of evidence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvidenceSource {
    #[default]
    Search,
    ResearchNotes,
}

/// One piece of raw material for synthesis. Not shown to end users as-is.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub title: String,
    pub url: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip)]
    pub source: EvidenceSource,
}

impl Evidence {
    /// A search-service document.
    pub fn search_hit(
        title: impl Into<String>,
        url: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            description: description.into(),
            body: None,
            source: EvidenceSource::Search,
        }
    }

    pub fn research_notes(narrative: impl Into<String>) -> Self {
        Self {
            title: RESEARCH_NOTES_TITLE.to_string(),
            url: String::new(),
            description: String::new(),
            body: Some(narrative.into()),
            source: EvidenceSource::ResearchNotes,
        }
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn is_research_notes(&self) -> bool {
        self.source == EvidenceSource::ResearchNotes
    }
}

pub type RawEvidence = Vec<Evidence>;

/// Keyword web search returning ranked documents.
#[async_trait]
pub trait SearchService: Send + Sync {
    async fn search(&self, query: &str, limit: usize) -> Result<RawEvidence, ServiceError>;
}

/// Free-form research assistant returning a narrative answer.
#[async_trait]
pub trait ResearchAssistant: Send + Sync {
    async fn investigate(&self, prompt: &ResearchPrompt) -> Result<String, ServiceError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query: String,
    pub limit: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResearchPrompt {
    pub system: String,
    pub question: String,
}

/// What a pipeline wants researched. Either half may be absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResearchQuery {
    pub search: Option<SearchQuery>,
    pub assistant: Option<ResearchPrompt>,
}

/// Evidence gathered plus the failures that were swallowed on the way.
#[derive(Debug, Clone, Default)]
pub struct ResearchFindings {
    pub evidence: RawEvidence,
    pub failures: Vec<ServiceError>,
}

impl ResearchFindings {
    pub fn is_degraded(&self) -> bool {
        !self.failures.is_empty() || self.evidence.is_empty()
    }

    /// Search-service results, without the research notes entry.
    pub fn search_results(&self) -> impl Iterator<Item = &Evidence> {
        self.evidence.iter().filter(|e| !e.is_research_notes())
    }

    pub fn notes(&self) -> Option<&str> {
        self.evidence
            .iter()
            .find(|e| e.is_research_notes())
            .and_then(|e| e.body.as_deref())
    }
}

/// Runs the configured research services. Missing services are skipped, failures are absorbed.
#[derive(Clone, Default)]
pub struct ResearchStage {
    search: Option<Arc<dyn SearchService>>,
    assistant: Option<Arc<dyn ResearchAssistant>>,
}

impl std::fmt::Debug for ResearchStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResearchStage")
            .field("search", &self.search.is_some())
            .field("assistant", &self.assistant.is_some())
            .finish()
    }
}

impl ResearchStage {
    pub fn new(
        search: Option<Arc<dyn SearchService>>,
        assistant: Option<Arc<dyn ResearchAssistant>>,
    ) -> Self {
        Self { search, assistant }
    }

    pub fn disabled() -> Self {
        Self::default()
    }

    /// Issue both sub-queries concurrently and join them.
    ///
    /// Search results come first, then the assistant narrative as a single
    /// [`RESEARCH_NOTES_TITLE`] entry.
    pub async fn research(&self, query: &ResearchQuery) -> ResearchFindings {
        let (search, notes) = tokio::join!(
            self.run_search(query.search.as_ref()),
            self.run_assistant(query.assistant.as_ref())
        );

        let mut findings = ResearchFindings::default();
        match search {
            Ok(results) => findings.evidence.extend(results),
            Err(e) => findings.failures.push(e),
        }
        match notes {
            Ok(Some(narrative)) => findings.evidence.push(Evidence::research_notes(narrative)),
            Ok(None) => {}
            Err(e) => findings.failures.push(e),
        }

        info!(
            evidence = findings.evidence.len(),
            failures = findings.failures.len(),
            "research stage finished"
        );
        findings
    }

    async fn run_search(&self, query: Option<&SearchQuery>) -> Result<RawEvidence, ServiceError> {
        let (Some(service), Some(query)) = (&self.search, query) else {
            debug!("web search skipped");
            return Ok(Vec::new());
        };

        service.search(&query.query, query.limit).await.map_err(|e| {
            warn!(error = %e, "web search failed, continuing without results");
            e
        })
    }

    async fn run_assistant(
        &self,
        prompt: Option<&ResearchPrompt>,
    ) -> Result<Option<String>, ServiceError> {
        let (Some(service), Some(prompt)) = (&self.assistant, prompt) else {
            debug!("research assistant skipped");
            return Ok(None);
        };

        match service.investigate(prompt).await {
            Ok(narrative) if narrative.trim().is_empty() => Ok(None),
            Ok(narrative) => Ok(Some(narrative)),
            Err(e) => {
                warn!(error = %e, "research assistant failed, continuing without notes");
                Err(e)
            }
        }
    }
}
