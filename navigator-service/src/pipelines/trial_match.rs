//! Summary → patient profile → trial search → matched trials with doctor questions.

use stage_flow::{
    ExtractionGoal, ExtractionSchema, Pipeline, ResearchFindings, ResearchPrompt, ResearchQuery,
    SearchQuery, StageError,
};

use super::{analysis_json, evidence_section};
use crate::models::{PatientProfile, TrialMatchResult, TrialSynthesis};

const SEARCH_LIMIT: usize = 8;

const PROFILE_INSTRUCTIONS: &str = "You are a clinical trials matching AI. Extract a structured \
patient profile from the oncology summary. Be precise about cancer type, stage, biomarkers, and \
prior treatments.";

const RESEARCH_SYSTEM: &str = "You are a clinical trials research assistant. Find currently \
recruiting clinical trials and provide details including NCT IDs, locations, and eligibility \
criteria. Be specific and factual.";

const SYNTHESIS_INSTRUCTIONS: &str = "You are a clinical trials matching expert. Given a patient \
profile and search results, produce:
1. A list of best matching trials with eligibility assessment and a match score from 0 to 100
2. For EACH trial, write 2-3 specific questions the patient should ask their oncologist about that trial
3. Write an overall emotional support message (2-3 sentences, warm and encouraging)
4. Write a \"what to do next\" action plan (3-5 concrete steps)

Be compassionate and clear. If you can extract an NCT ID from the data, include it.";

pub fn profile_schema() -> ExtractionSchema {
    ExtractionSchema::of::<PatientProfile>(
        "extract_profile",
        "Extract structured patient profile for trial matching",
    )
}

pub fn trials_schema() -> ExtractionSchema {
    ExtractionSchema::of::<TrialSynthesis>(
        "return_trials",
        "Return matched clinical trials with enhanced data",
    )
}

pub struct TrialMatchPipeline {
    extraction: ExtractionGoal,
    synthesis: ExtractionGoal,
}

impl Default for TrialMatchPipeline {
    fn default() -> Self {
        Self {
            extraction: ExtractionGoal::new(profile_schema(), PROFILE_INSTRUCTIONS),
            synthesis: ExtractionGoal::new(trials_schema(), SYNTHESIS_INSTRUCTIONS),
        }
    }
}

impl TrialMatchPipeline {
    pub fn new() -> Self {
        Self::default()
    }
}

pub fn search_query(profile: &PatientProfile) -> String {
    let mut terms = vec![profile.cancer_type.as_str(), profile.stage.as_str()];
    terms.extend(profile.biomarkers.iter().map(String::as_str));
    terms.push("clinical trial recruiting site:clinicaltrials.gov");
    terms.retain(|t| !t.trim().is_empty());
    terms.join(" ")
}

fn research_question(profile: &PatientProfile) -> String {
    let biomarkers = if profile.biomarkers.is_empty() {
        String::new()
    } else {
        format!(", biomarkers: {}", profile.biomarkers.join(", "))
    };
    let age = profile
        .age
        .map(|a| a.to_string())
        .unwrap_or_else(|| "adult".to_string());
    let prior = if profile.prior_treatments.is_empty() {
        "none listed".to_string()
    } else {
        profile.prior_treatments.join(", ")
    };

    format!(
        "Find currently recruiting clinical trials for: {}, {}{biomarkers}. Patient is {age} years old. Prior treatments: {prior}.",
        profile.cancer_type, profile.stage
    )
}

impl Pipeline for TrialMatchPipeline {
    type Analysis = PatientProfile;
    type Synthesis = TrialSynthesis;
    type Output = TrialMatchResult;

    fn name(&self) -> &'static str {
        "trial-match"
    }

    fn extraction(&self) -> &ExtractionGoal {
        &self.extraction
    }

    fn research_query(&self, _input: &str, profile: &PatientProfile) -> ResearchQuery {
        ResearchQuery {
            search: Some(SearchQuery {
                query: search_query(profile),
                limit: SEARCH_LIMIT,
            }),
            assistant: Some(ResearchPrompt {
                system: RESEARCH_SYSTEM.to_string(),
                question: research_question(profile),
            }),
        }
    }

    fn synthesis(&self) -> &ExtractionGoal {
        &self.synthesis
    }

    fn synthesis_input(
        &self,
        _input: &str,
        profile: &PatientProfile,
        findings: &ResearchFindings,
    ) -> Result<String, StageError> {
        Ok(format!(
            "Patient Profile: {}\n\n{}",
            analysis_json(&self.synthesis, profile)?,
            evidence_section("Search Results (from ClinicalTrials.gov)", findings)
        ))
    }

    fn assemble(
        &self,
        profile: PatientProfile,
        _findings: ResearchFindings,
        synthesis: TrialSynthesis,
    ) -> TrialMatchResult {
        let summary = if synthesis.summary.trim().is_empty() && !synthesis.trials.is_empty() {
            let n = synthesis.trials.len();
            format!(
                "Found {n} potentially matching trial{}.",
                if n == 1 { "" } else { "s" }
            )
        } else {
            synthesis.summary
        };

        TrialMatchResult {
            trials: synthesis.trials,
            summary,
            emotional_message: synthesis.emotional_message,
            next_steps: synthesis.next_steps,
            profile,
        }
    }
}
