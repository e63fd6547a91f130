use super::llm::LlmClient;
use super::normalize::parse_model_json;
use super::prompt::build_prioritization_prompt;
use super::reconcile::{self, JsonMap};
use super::AgentError;
use crate::models::{PatientIntake, UrgencyAssessment};

const DEFAULT_MODEL_SCORE: i64 = 50;

/// Urgency for one patient. Never fails: any error yields the Medium fallback.
pub async fn assess_priority(llm: &dyn LlmClient, intake: &PatientIntake) -> UrgencyAssessment {
    match try_assess_priority(llm, intake).await {
        Ok(urgency) => {
            tracing::info!(
                score = urgency.score,
                level = %urgency.level,
                wait_time = %urgency.wait_time,
                "Prioritization complete"
            );
            urgency
        }
        Err(e) => {
            e.log("prioritization");
            UrgencyAssessment::fallback(&e.to_string())
        }
    }
}

async fn try_assess_priority(
    llm: &dyn LlmClient,
    intake: &PatientIntake,
) -> Result<UrgencyAssessment, AgentError> {
    let prompt = build_prioritization_prompt(intake);
    let raw = llm.generate(&prompt, None).await?;
    let map = parse_model_json(&raw)?;
    Ok(reconcile_urgency(&map))
}

pub fn reconcile_urgency(map: &JsonMap) -> UrgencyAssessment {
    let score = reconcile::clamp_score(
        reconcile::pick_score(map, &["urgency_score", "score"]).unwrap_or(DEFAULT_MODEL_SCORE),
    );
    let derived = UrgencyAssessment::level_for_score(score);
    let token = reconcile::pick_str(map, &["urgency_level", "level"]);
    let level = reconcile::reconcile_level(token.as_deref(), derived, "prioritization");
    let wait_time = reconcile::pick_str(map, &["wait_time", "estimated_wait"])
        .unwrap_or_else(|| UrgencyAssessment::wait_time_for_score(score).to_string());

    UrgencyAssessment {
        score,
        level,
        wait_time,
        reasoning: reconcile::pick_str(map, &["reasoning", "reason"]).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::{Gender, SeverityLevel};
    use crate::pipeline::llm::MockLlmClient;

    fn intake() -> PatientIntake {
        PatientIntake {
            name: "Ahmed Khan".into(),
            age: Some(45),
            gender: Some(Gender::Male),
            symptoms: "crushing chest pain radiating to left arm".into(),
            history: vec!["Hypertension".into()],
        }
    }

    #[tokio::test]
    async fn critical_score_without_wait_time_is_immediate() {
        let llm = MockLlmClient::new(r#"{"urgency_score": 92, "urgency_level": "Critical", "reasoning": "Possible ACS."}"#);
        let urgency = assess_priority(&llm, &intake()).await;
        assert_eq!(urgency.score, 92);
        assert_eq!(urgency.level, SeverityLevel::Critical);
        assert_eq!(urgency.wait_time, "Immediate");
        assert_eq!(urgency.reasoning, "Possible ACS.");
    }

    #[tokio::test]
    async fn fenced_output_is_accepted() {
        let llm = MockLlmClient::new("```json\n{\"urgency_score\": 30, \"wait_time\": \"20 min\"}\n```");
        let urgency = assess_priority(&llm, &intake()).await;
        assert_eq!(urgency.score, 30);
        assert_eq!(urgency.level, SeverityLevel::Medium);
    }

    #[tokio::test]
    async fn out_of_range_score_is_clamped_and_relevelled() {
        let llm = MockLlmClient::new(r#"{"urgency_score": 150, "urgency_level": "Low"}"#);
        let urgency = assess_priority(&llm, &intake()).await;
        assert_eq!(urgency.score, 100);
        assert_eq!(urgency.level, SeverityLevel::Critical);
    }

    #[tokio::test]
    async fn invalid_level_token_is_recomputed() {
        let llm = MockLlmClient::new(r#"{"urgency_score": 60, "urgency_level": "Urgent"}"#);
        let urgency = assess_priority(&llm, &intake()).await;
        assert_eq!(urgency.level, SeverityLevel::High);
        assert_eq!(urgency.wait_time, "5 min");
    }

    #[tokio::test]
    async fn transport_failure_falls_back_to_medium() {
        let llm = MockLlmClient::failing("connection refused");
        let urgency = assess_priority(&llm, &intake()).await;
        assert_eq!(urgency.score, 50);
        assert_eq!(urgency.level, SeverityLevel::Medium);
        assert_eq!(urgency.wait_time, "20 min");
        assert!(urgency.reasoning.contains("connection refused"));
    }

    #[tokio::test]
    async fn malformed_output_falls_back_to_medium() {
        let llm = MockLlmClient::new("The patient seems fine.");
        let urgency = assess_priority(&llm, &intake()).await;
        assert_eq!(urgency.score, 50);
        assert_eq!(urgency.level, SeverityLevel::Medium);
    }

    #[test]
    fn missing_score_defaults_to_fifty() {
        let map = serde_json::from_str::<JsonMap>("{}").unwrap();
        let urgency = reconcile_urgency(&map);
        assert_eq!(urgency.score, 50);
        assert_eq!(urgency.level, SeverityLevel::Medium);
        assert_eq!(urgency.wait_time, "20 min");
    }
}
