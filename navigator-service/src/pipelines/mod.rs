pub mod regimen_guide;
pub mod trial_match;

pub use regimen_guide::RegimenGuidePipeline;
pub use trial_match::TrialMatchPipeline;

use serde::Serialize;
use stage_flow::{ExtractionGoal, ResearchFindings, StageError};

/// Serialize the first-stage analysis for the synthesis prompt.
pub(crate) fn analysis_json<T: Serialize>(
    synthesis: &ExtractionGoal,
    analysis: &T,
) -> Result<String, StageError> {
    serde_json::to_string(analysis).map_err(|e| {
        StageError::violation(
            synthesis.schema.qualified_name(),
            format!("analysis could not be serialized: {e}"),
        )
    })
}

/// Render evidence as the plain-text section of a synthesis prompt.
pub(crate) fn evidence_section(heading: &str, findings: &ResearchFindings) -> String {
    let results: Vec<String> = findings
        .search_results()
        .map(|e| format!("- {}\n  URL: {}\n  {}", e.title, e.url, e.description))
        .collect();

    let mut section = format!("{heading}:\n");
    if results.is_empty() {
        section.push_str("(no search results)");
    } else {
        section.push_str(&results.join("\n\n"));
    }

    section.push_str("\n\nResearch notes:\n");
    section.push_str(findings.notes().unwrap_or("(none)"));
    section
}
