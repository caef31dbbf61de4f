use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};
use stage_flow::schema::{label, whole_number};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PatientProfile {
    pub cancer_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cancer_subtype: Option<String>,
    pub stage: String,
    /// Distinct markers; repeats differing only in case or spacing are dropped.
    #[serde(default, deserialize_with = "distinct")]
    pub biomarkers: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub prior_treatments: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sex: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_status: Option<String>,
    #[serde(deserialize_with = "null_as_empty")]
    pub search_terms: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Drug {
    pub name: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub common_side_effects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegimenAnalysis {
    pub drugs: Vec<Drug>,
    #[serde(deserialize_with = "whole_number")]
    pub cycle_days: u32,
    pub considerations: Vec<String>,
}

/// A matched clinical trial as shown to the patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Trial {
    pub id: String,
    pub title: String,
    /// Match score from 0 to 100.
    #[serde(deserialize_with = "clamped_score")]
    #[schemars(with = "f64")]
    pub match_score: u8,
    pub eligibility_summary: String,
    #[serde(deserialize_with = "null_as_empty")]
    pub requirements: Vec<String>,
    /// 2-3 questions to ask the oncologist about this trial.
    #[serde(deserialize_with = "null_as_empty")]
    pub doctor_questions: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// One entry of the day-by-day guide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimelineDay {
    /// Day number or range such as "4-7".
    #[serde(deserialize_with = "label")]
    pub day: String,
    pub phase: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tips: Vec<String>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub side_effects: Vec<String>,
    /// When to call the doctor, or null when there is nothing urgent.
    #[serde(default)]
    pub alert: Option<String>,
}

impl TimelineDay {
    /// Leading integer of the label, used for ordering only.
    pub fn start_day(&self) -> Option<u32> {
        let digits: String = self
            .day
            .trim_start()
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Info,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub severity: Severity,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resource {
    pub title: String,
    pub url: String,
    pub description: String,
}

/// Decoded output of the trial synthesis call.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TrialSynthesis {
    pub trials: Vec<Trial>,
    pub summary: String,
    /// Warm, empathetic message for the patient.
    pub emotional_message: String,
    /// Concrete action steps.
    #[serde(deserialize_with = "null_as_empty")]
    pub next_steps: Vec<String>,
}

/// Decoded output of the timeline synthesis call.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSynthesis {
    pub timeline: Vec<TimelineDay>,
    #[serde(default)]
    pub management_tips: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialMatchResult {
    pub trials: Vec<Trial>,
    pub summary: String,
    pub emotional_message: String,
    pub next_steps: Vec<String>,
    pub profile: PatientProfile,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegimenGuideResult {
    pub timeline: Vec<TimelineDay>,
    pub interactions: Vec<Interaction>,
    pub fda_resources: Vec<Resource>,
    pub management_tips: String,
    pub regimen_data: RegimenAnalysis,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct TrialMatchRequest {
    #[serde(default)]
    pub summary: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct RegimenGuideRequest {
    #[serde(default)]
    pub regimen: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SpeechRequest {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechResponse {
    pub audio_base64: String,
}

fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(Option::<Vec<T>>::deserialize(deserializer)?.unwrap_or_default())
}

fn distinct<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let mut items: Vec<String> = null_as_empty(deserializer)?;
    let mut seen = HashSet::new();
    items.retain(|item| seen.insert(item.trim().to_lowercase()));
    Ok(items)
}

fn clamped_score<'de, D>(deserializer: D) -> Result<u8, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f64::deserialize(deserializer)?;
    if raw.is_nan() {
        return Ok(0);
    }
    Ok(raw.clamp(0.0, 100.0).round() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn trial_scores_are_clamped_and_rounded() {
        let trial = |score: serde_json::Value| -> Trial {
            serde_json::from_value(json!({
                "id": "NCT01",
                "title": "t",
                "matchScore": score,
                "eligibilitySummary": "e",
                "requirements": [],
                "doctorQuestions": []
            }))
            .unwrap()
        };

        assert_eq!(trial(json!(82)).match_score, 82);
        assert_eq!(trial(json!(87.6)).match_score, 88);
        assert_eq!(trial(json!(140)).match_score, 100);
        assert_eq!(trial(json!(-3)).match_score, 0);
    }

    #[test]
    fn timeline_lists_are_never_null() {
        let day: TimelineDay = serde_json::from_value(json!({
            "day": "4-7",
            "phase": "Recovery",
            "tips": null,
            "alert": null
        }))
        .unwrap();

        assert!(day.tips.is_empty());
        assert!(day.side_effects.is_empty());
        assert_eq!(day.start_day(), Some(4));

        let wire = serde_json::to_value(&day).unwrap();
        assert_eq!(wire["sideEffects"], json!([]));
        assert_eq!(wire["alert"], json!(null));
    }

    #[test]
    fn start_day_ignores_labels_without_numbers() {
        let day = |label: &str| TimelineDay {
            day: label.to_string(),
            phase: String::new(),
            tips: vec![],
            side_effects: vec![],
            alert: None,
        };
        assert_eq!(day("Day 3").start_day(), None);
        assert_eq!(day("12").start_day(), Some(12));
        assert_eq!(day("Ongoing").start_day(), None);
    }

    #[test]
    fn biomarkers_decode_as_a_set() {
        let profile: PatientProfile = serde_json::from_value(json!({
            "cancerType": "NSCLC",
            "stage": "IV",
            "biomarkers": ["KRAS G12C", "PD-L1 50%", " kras g12c", "EGFR"],
            "searchTerms": []
        }))
        .unwrap();
        assert_eq!(profile.biomarkers, vec!["KRAS G12C", "PD-L1 50%", "EGFR"]);

        let nulled: PatientProfile = serde_json::from_value(json!({
            "cancerType": "NSCLC",
            "stage": "IV",
            "biomarkers": null,
            "searchTerms": ["NSCLC"]
        }))
        .unwrap();
        assert!(nulled.biomarkers.is_empty());
    }

    #[test]
    fn numeric_day_labels_become_text() {
        let day: TimelineDay =
            serde_json::from_value(json!({ "day": 3.0, "phase": "Rest" })).unwrap();
        assert_eq!(day.day, "3");
        let flag = serde_json::from_value::<TimelineDay>(json!({ "day": true, "phase": "x" }));
        assert!(flag.is_err());
    }

    #[test]
    fn profile_omits_absent_optionals_on_the_wire() {
        let profile: PatientProfile = serde_json::from_value(json!({
            "cancerType": "NSCLC",
            "stage": "IIIB",
            "searchTerms": ["KRAS G12C"]
        }))
        .unwrap();
        let wire = serde_json::to_value(&profile).unwrap();
        assert!(wire.get("age").is_none());
        assert_eq!(wire["biomarkers"], json!([]));
    }
}
