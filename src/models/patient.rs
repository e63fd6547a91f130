use serde::{Deserialize, Serialize};

use super::enums::{Gender, SeverityLevel};
use crate::pipeline::reconcile;
use crate::pipeline::summary::reconcile_summary;

pub const DEFAULT_SUMMARY_EN: &str = "Manual review required.";
pub const DEFAULT_SUMMARY_UR: &str = "اردو خلاصہ دستیاب نہیں ہے۔";
pub const DEFAULT_PATIENT_FRIENDLY: &str = "Our medical team will review your case shortly.";
pub const DEFAULT_ACTIONS: &[&str] = &["Initial nurse assessment", "Vital sign monitoring"];

/// Intake fields handed to the triage pipeline. Never mutated after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientIntake {
    pub name: String,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub symptoms: String,
    #[serde(default)]
    pub history: Vec<String>,
}

impl PatientIntake {
    /// History joined for prompts; empty history becomes an explicit token.
    pub fn history_text(&self) -> String {
        let entries: Vec<&str> = self
            .history
            .iter()
            .map(|h| h.trim())
            .filter(|h| !h.is_empty())
            .collect();
        if entries.is_empty() {
            "No significant history".to_string()
        } else {
            entries.join(", ")
        }
    }

    pub fn age_text(&self) -> String {
        self.age
            .map(|a| a.to_string())
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn gender_text(&self) -> &'static str {
        self.gender.map(|g| g.as_str()).unwrap_or("Unknown")
    }
}

/// Triage urgency. `level` always agrees with `score` under the urgency scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UrgencyAssessment {
    pub score: u8,
    pub level: SeverityLevel,
    pub wait_time: String,
    pub reasoning: String,
}

impl UrgencyAssessment {
    /// Urgency scale: Critical ≥ 81, High ≥ 56, Medium ≥ 26.
    pub fn level_for_score(score: u8) -> SeverityLevel {
        match score {
            81.. => SeverityLevel::Critical,
            56..=80 => SeverityLevel::High,
            26..=55 => SeverityLevel::Medium,
            _ => SeverityLevel::Low,
        }
    }

    pub fn wait_time_for_score(score: u8) -> &'static str {
        match score {
            81.. => "Immediate",
            56..=80 => "5 min",
            26..=55 => "20 min",
            _ => "45 min",
        }
    }

    /// Safe default used whenever the prioritization step fails.
    pub fn fallback(error: &str) -> Self {
        Self {
            score: 50,
            level: SeverityLevel::Medium,
            wait_time: "20 min".to_string(),
            reasoning: format!(
                "AI assessment unavailable, defaulting to Medium urgency. Error: {error}"
            ),
        }
    }
}

/// One candidate condition. `level` follows the risk scale, not the urgency scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskFinding {
    pub condition: String,
    pub score: u8,
    pub level: SeverityLevel,
    pub reason: String,
}

impl RiskFinding {
    /// Risk scale: Critical ≥ 81, High ≥ 61, Medium ≥ 31.
    pub fn level_for_score(score: u8) -> SeverityLevel {
        match score {
            81.. => SeverityLevel::Critical,
            61..=80 => SeverityLevel::High,
            31..=60 => SeverityLevel::Medium,
            _ => SeverityLevel::Low,
        }
    }

    /// Substituted when the analyzer yields nothing usable.
    pub fn general_assessment() -> Self {
        Self {
            condition: "General Health Assessment".to_string(),
            score: 30,
            level: SeverityLevel::Low,
            reason: "No specific risk could be identified automatically.".to_string(),
        }
    }

    /// `"condition: score/100 (level)"`
    pub fn prompt_line(&self) -> String {
        format!("{}: {}/100 ({})", self.condition, self.score, self.level)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClinicalSummary {
    pub clinical_summary_en: String,
    pub clinical_summary_ur: String,
    pub patient_friendly_summary: String,
    pub suggested_actions: Vec<String>,
}

impl ClinicalSummary {
    pub fn default_actions() -> Vec<String> {
        DEFAULT_ACTIONS.iter().map(|a| a.to_string()).collect()
    }

    /// Lift a pre-structured (single narrative) summary into the current shape.
    pub fn from_legacy_text(text: &str) -> Self {
        let text = text.trim();
        Self {
            clinical_summary_en: if text.is_empty() {
                DEFAULT_SUMMARY_EN.to_string()
            } else {
                text.to_string()
            },
            clinical_summary_ur: DEFAULT_SUMMARY_UR.to_string(),
            patient_friendly_summary: DEFAULT_PATIENT_FRIENDLY.to_string(),
            suggested_actions: Self::default_actions(),
        }
    }

    /// Read path for the `ai_summary` column. Accepts the structured object,
    /// the object serialized into a string, or a legacy free-text narrative.
    pub fn from_stored(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Object(map) => reconcile_summary(map),
            serde_json::Value::String(text) => {
                match serde_json::from_str::<serde_json::Value>(text) {
                    Ok(serde_json::Value::Object(map)) => reconcile_summary(&map),
                    _ => Self::from_legacy_text(text),
                }
            }
            _ => Self::from_legacy_text(""),
        }
    }
}

/// Two-letter initials: first letters of the first and last name tokens,
/// or the first two characters of a single token.
pub fn derive_avatar(name: &str) -> String {
    let parts: Vec<&str> = name.split_whitespace().collect();
    match parts.as_slice() {
        [] => "??".to_string(),
        [only] => only.chars().take(2).collect::<String>().to_uppercase(),
        [first, .., last] => {
            let mut initials = String::new();
            initials.extend(first.chars().next());
            initials.extend(last.chars().next());
            initials.to_uppercase()
        }
    }
}

/// Everything the pipeline produced, ready to be written once.
#[derive(Debug, Clone, PartialEq)]
pub struct NewPatientRecord {
    pub intake: PatientIntake,
    pub urgency: UrgencyAssessment,
    pub risk_scores: Vec<RiskFinding>,
    pub summary: ClinicalSummary,
    pub avatar: String,
    pub created_by: Option<String>,
}

/// Row shape of the `patients` table, as returned by either backend.
/// Loosely typed so that rows written by older versions still load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredPatient {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub gender: Option<String>,
    pub symptoms: String,
    pub urgency_score: i64,
    #[serde(default)]
    pub urgency_level: Option<String>,
    #[serde(default)]
    pub wait_time: Option<String>,
    #[serde(default)]
    pub urgency_reasoning: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub history: Option<Vec<String>>,
    #[serde(default)]
    pub risk_scores: serde_json::Value,
    #[serde(default)]
    pub ai_summary: serde_json::Value,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

/// API view of a persisted patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub id: String,
    pub name: String,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub symptoms: String,
    pub history: Vec<String>,
    pub urgency_score: u8,
    pub urgency_level: SeverityLevel,
    pub wait_time: String,
    pub urgency_reasoning: String,
    pub avatar: String,
    pub risk_scores: Vec<RiskFinding>,
    pub ai_summary: ClinicalSummary,
    pub created_by: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl PatientRecord {
    pub fn from_stored(row: StoredPatient) -> Self {
        let score = reconcile::clamp_score(row.urgency_score);
        let urgency_level = row
            .urgency_level
            .as_deref()
            .and_then(SeverityLevel::from_token)
            .unwrap_or_else(|| UrgencyAssessment::level_for_score(score));
        let wait_time = row
            .wait_time
            .filter(|w| !w.trim().is_empty())
            .unwrap_or_else(|| UrgencyAssessment::wait_time_for_score(score).to_string());
        let risk_scores = match &row.risk_scores {
            serde_json::Value::Array(items) => items
                .iter()
                .filter_map(|v| v.as_object())
                .map(reconcile::reconcile_risk_finding)
                .collect(),
            _ => Vec::new(),
        };
        let avatar = row
            .avatar
            .filter(|a| !a.is_empty())
            .unwrap_or_else(|| derive_avatar(&row.name));

        Self {
            id: row.id,
            age: row.age.and_then(|a| u32::try_from(a).ok()),
            gender: row.gender.as_deref().and_then(reconcile::parse_gender),
            symptoms: row.symptoms,
            history: row.history.unwrap_or_default(),
            urgency_score: score,
            urgency_level,
            wait_time,
            urgency_reasoning: row.urgency_reasoning.unwrap_or_default(),
            avatar,
            risk_scores,
            ai_summary: ClinicalSummary::from_stored(&row.ai_summary),
            created_by: row.created_by,
            created_at: row.created_at,
            updated_at: row.updated_at,
            name: row.name,
        }
    }
}
