//! Regimen text → drugs and cycle → side-effect research → day-by-day guide.

use stage_flow::{
    ExtractionGoal, ExtractionSchema, Pipeline, ResearchFindings, ResearchPrompt, ResearchQuery,
    SearchQuery, StageError,
};

use super::{analysis_json, evidence_section};
use crate::models::{
    Interaction, RegimenAnalysis, RegimenGuideResult, Resource, Severity, TimelineDay,
    TimelineSynthesis,
};

const SEARCH_LIMIT: usize = 3;
const SIDE_EFFECTS_PER_DRUG: usize = 3;

const REGIMEN_INSTRUCTIONS: &str = "You are a medical AI assistant. Given a chemotherapy regimen, \
extract:
1. Drug names (generic)
2. Cycle length in days
3. Common side effects per drug
4. Key medical considerations";

const RESEARCH_SYSTEM: &str = "You are a medical research assistant. Provide evidence-based, \
patient-friendly side effect management strategies. Be concise and practical.";

const TIMELINE_INSTRUCTIONS: &str = "You are a compassionate oncology support AI. Given a chemo \
regimen analysis and reference material, create a patient-friendly day-by-day timeline.
Cover the full cycle. Group days where appropriate (e.g. \"4-7\"). Use warm, encouraging language. \
Include when to call the doctor in the alert field, or null when there is nothing urgent.";

pub fn regimen_schema() -> ExtractionSchema {
    ExtractionSchema::of::<RegimenAnalysis>("extract_regimen", "Extract structured regimen data")
}

pub fn timeline_schema() -> ExtractionSchema {
    ExtractionSchema::of::<TimelineSynthesis>(
        "build_timeline",
        "Return the day-by-day guide for one cycle",
    )
}

pub struct RegimenGuidePipeline {
    extraction: ExtractionGoal,
    synthesis: ExtractionGoal,
}

impl Default for RegimenGuidePipeline {
    fn default() -> Self {
        Self {
            extraction: ExtractionGoal::new(regimen_schema(), REGIMEN_INSTRUCTIONS),
            synthesis: ExtractionGoal::new(timeline_schema(), TIMELINE_INSTRUCTIONS),
        }
    }
}

impl RegimenGuidePipeline {
    pub fn new() -> Self {
        Self::default()
    }
}

/// `None` when no drug was extracted; there is nothing to search for.
pub fn search_query(analysis: &RegimenAnalysis) -> Option<String> {
    let names: Vec<&str> = analysis
        .drugs
        .iter()
        .map(|d| d.name.trim())
        .filter(|n| !n.is_empty())
        .collect();
    if names.is_empty() {
        return None;
    }
    Some(format!(
        "{} chemotherapy side effects management site:cancer.gov OR site:drugs.com",
        names.join(" ")
    ))
}

pub fn interactions(analysis: &RegimenAnalysis) -> Vec<Interaction> {
    let considerations = analysis
        .considerations
        .iter()
        .enumerate()
        .map(|(i, message)| Interaction {
            severity: if i == 0 {
                Severity::Warning
            } else {
                Severity::Info
            },
            message: message.clone(),
        });

    let side_effects = analysis
        .drugs
        .iter()
        .filter(|d| !d.common_side_effects.is_empty())
        .map(|d| Interaction {
            severity: Severity::Info,
            message: format!(
                "{}: Common side effects include {}.",
                d.name,
                d.common_side_effects
                    .iter()
                    .take(SIDE_EFFECTS_PER_DRUG)
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        });

    considerations.chain(side_effects).collect()
}

/// Stable order by leading day number; unnumbered labels keep their order after numbered ones.
pub fn order_timeline(timeline: &mut [TimelineDay]) {
    timeline.sort_by_key(|day| match day.start_day() {
        Some(n) => (false, n),
        None => (true, 0),
    });
}

impl Pipeline for RegimenGuidePipeline {
    type Analysis = RegimenAnalysis;
    type Synthesis = TimelineSynthesis;
    type Output = RegimenGuideResult;

    fn name(&self) -> &'static str {
        "regimen-guide"
    }

    fn extraction(&self) -> &ExtractionGoal {
        &self.extraction
    }

    fn research_query(&self, regimen: &str, analysis: &RegimenAnalysis) -> ResearchQuery {
        ResearchQuery {
            search: search_query(analysis).map(|query| SearchQuery {
                query,
                limit: SEARCH_LIMIT,
            }),
            assistant: Some(ResearchPrompt {
                system: RESEARCH_SYSTEM.to_string(),
                question: format!(
                    "What are the best evidence-based strategies for managing side effects of {regimen}? Include nutrition tips, when to seek emergency care, and practical daily advice."
                ),
            }),
        }
    }

    fn synthesis(&self) -> &ExtractionGoal {
        &self.synthesis
    }

    fn synthesis_input(
        &self,
        regimen: &str,
        analysis: &RegimenAnalysis,
        findings: &ResearchFindings,
    ) -> Result<String, StageError> {
        Ok(format!(
            "Regimen: {regimen}\nAnalysis: {}\n\n{}",
            analysis_json(&self.synthesis, analysis)?,
            evidence_section("Reference material", findings)
        ))
    }

    fn assemble(
        &self,
        analysis: RegimenAnalysis,
        findings: ResearchFindings,
        synthesis: TimelineSynthesis,
    ) -> RegimenGuideResult {
        let mut timeline = synthesis.timeline;
        order_timeline(&mut timeline);

        let fda_resources = findings
            .search_results()
            .map(|e| Resource {
                title: e.title.clone(),
                url: e.url.clone(),
                description: e.description.clone(),
            })
            .collect();

        let management_tips = findings
            .notes()
            .map(str::to_string)
            .or(synthesis.management_tips)
            .unwrap_or_default();

        RegimenGuideResult {
            timeline,
            interactions: interactions(&analysis),
            fda_resources,
            management_tips,
            regimen_data: analysis,
        }
    }
}
