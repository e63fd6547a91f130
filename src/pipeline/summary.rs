use super::llm::LlmClient;
use super::normalize::parse_model_json;
use super::prompt::build_summary_prompt;
use super::reconcile::{self, JsonMap};
use super::AgentError;
use crate::models::{
    ClinicalSummary, PatientIntake, RiskFinding, UrgencyAssessment, DEFAULT_PATIENT_FRIENDLY,
    DEFAULT_SUMMARY_EN, DEFAULT_SUMMARY_UR,
};

const FALLBACK_SUMMARY_UR: &str = "اے آئی کی خرابی - دستی جائزہ درکار ہے۔";
const FALLBACK_PATIENT_FRIENDLY: &str =
    "We are processing your data. A professional will assist you soon.";
const SYMPTOM_EXCERPT_CHARS: usize = 50;

/// Clinical summary conditioned on the upstream results. Never fails.
pub async fn generate_summary(
    llm: &dyn LlmClient,
    intake: &PatientIntake,
    urgency: &UrgencyAssessment,
    findings: &[RiskFinding],
) -> ClinicalSummary {
    match try_generate_summary(llm, intake, urgency, findings).await {
        Ok(summary) => {
            tracing::info!(actions = summary.suggested_actions.len(), "Summary complete");
            summary
        }
        Err(e) => {
            e.log("summary");
            fallback_summary(intake, urgency)
        }
    }
}

async fn try_generate_summary(
    llm: &dyn LlmClient,
    intake: &PatientIntake,
    urgency: &UrgencyAssessment,
    findings: &[RiskFinding],
) -> Result<ClinicalSummary, AgentError> {
    let prompt = build_summary_prompt(intake, urgency, findings);
    let raw = llm.generate(&prompt, None).await?;
    let map = parse_model_json(&raw)?;
    Ok(reconcile_summary(&map))
}

/// Four-field summary with per-field defaults. `suggested_actions` is never empty.
pub fn reconcile_summary(map: &JsonMap) -> ClinicalSummary {
    let mut actions = reconcile::pick_string_list(map, &["suggested_actions", "actions"]);
    if actions.is_empty() {
        actions = ClinicalSummary::default_actions();
    }
    ClinicalSummary {
        clinical_summary_en: reconcile::pick_str(map, &["clinical_summary_en", "clinical_summary", "summary"])
            .unwrap_or_else(|| DEFAULT_SUMMARY_EN.to_string()),
        clinical_summary_ur: reconcile::pick_str(map, &["clinical_summary_ur"])
            .unwrap_or_else(|| DEFAULT_SUMMARY_UR.to_string()),
        patient_friendly_summary: reconcile::pick_str(map, &["patient_friendly_summary"])
            .unwrap_or_else(|| DEFAULT_PATIENT_FRIENDLY.to_string()),
        suggested_actions: actions,
    }
}

/// Built only from the intake and urgency, without the model.
pub fn fallback_summary(intake: &PatientIntake, urgency: &UrgencyAssessment) -> ClinicalSummary {
    let symptoms = intake.symptoms.trim();
    let excerpt: String = symptoms.chars().take(SYMPTOM_EXCERPT_CHARS).collect();
    let ellipsis = if symptoms.chars().count() > SYMPTOM_EXCERPT_CHARS { "..." } else { "" };

    ClinicalSummary {
        clinical_summary_en: format!(
            "AI insight unavailable. Symptoms: {excerpt}{ellipsis} History: {}. Urgency: {} ({}/100).",
            intake.history_text(),
            urgency.level,
            urgency.score,
        ),
        clinical_summary_ur: FALLBACK_SUMMARY_UR.to_string(),
        patient_friendly_summary: FALLBACK_PATIENT_FRIENDLY.to_string(),
        suggested_actions: vec!["Manual triage required".to_string()],
    }
}
