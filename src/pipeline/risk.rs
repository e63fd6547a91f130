use super::llm::LlmClient;
use super::normalize::parse_model_json;
use super::prompt::build_risk_prompt;
use super::reconcile::{self, JsonMap};
use super::AgentError;
use crate::models::{PatientIntake, RiskFinding};

pub const MAX_RISK_FINDINGS: usize = 5;

/// 1–5 risk findings. Any failure, or an empty list, yields the single
/// general assessment finding.
pub async fn analyze_risks(llm: &dyn LlmClient, intake: &PatientIntake) -> Vec<RiskFinding> {
    match try_analyze_risks(llm, intake).await {
        Ok(findings) => {
            tracing::info!(count = findings.len(), "Risk analysis complete");
            findings
        }
        Err(e) => {
            e.log("risk");
            vec![RiskFinding::general_assessment()]
        }
    }
}

async fn try_analyze_risks(
    llm: &dyn LlmClient,
    intake: &PatientIntake,
) -> Result<Vec<RiskFinding>, AgentError> {
    let prompt = build_risk_prompt(intake);
    let raw = llm.generate(&prompt, None).await?;
    let map = parse_model_json(&raw)?;
    Ok(reconcile_risk_findings(&map))
}

pub fn reconcile_risk_findings(map: &JsonMap) -> Vec<RiskFinding> {
    let findings: Vec<RiskFinding> = match reconcile::pick_value(map, &["risk_scores", "risks"]) {
        Some(serde_json::Value::Array(entries)) => entries
            .iter()
            .filter_map(|e| e.as_object())
            .map(reconcile::reconcile_risk_finding)
            .take(MAX_RISK_FINDINGS)
            .collect(),
        _ => Vec::new(),
    };

    if findings.is_empty() {
        tracing::warn!("Risk analyzer returned no findings, substituting general assessment");
        return vec![RiskFinding::general_assessment()];
    }
    findings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::enums::SeverityLevel;
    use crate::pipeline::llm::MockLlmClient;

    fn intake() -> PatientIntake {
        PatientIntake {
            name: "Sara".into(),
            age: Some(62),
            gender: None,
            symptoms: "shortness of breath, ankle swelling".into(),
            history: vec!["COPD".into()],
        }
    }

    fn assert_general_assessment(findings: &[RiskFinding]) {
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].condition, "General Health Assessment");
        assert_eq!(findings[0].score, 30);
        assert_eq!(findings[0].level, SeverityLevel::Low);
    }

    #[tokio::test]
    async fn failing_model_yields_general_assessment() {
        let llm = MockLlmClient::failing("timeout");
        assert_general_assessment(&analyze_risks(&llm, &intake()).await);
    }

    #[tokio::test]
    async fn malformed_output_yields_general_assessment() {
        let llm = MockLlmClient::new("I think it's COPD.");
        assert_general_assessment(&analyze_risks(&llm, &intake()).await);
    }

    #[tokio::test]
    async fn empty_list_yields_general_assessment() {
        let llm = MockLlmClient::new(r#"{"risk_scores": []}"#);
        assert_general_assessment(&analyze_risks(&llm, &intake()).await);
    }

    #[tokio::test]
    async fn entries_are_clamped_and_relevelled_with_risk_scale() {
        let llm = MockLlmClient::new(
            r#"{"risk_scores": [
                {"condition": "COPD Exacerbation", "score": 60, "level": "High", "reason": "History of COPD."},
                {"condition": "Heart Failure", "score": 120}
            ]}"#,
        );
        let findings = analyze_risks(&llm, &intake()).await;
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].level, SeverityLevel::Medium);
        assert_eq!(findings[0].reason, "History of COPD.");
        assert_eq!(findings[1].score, 100);
        assert_eq!(findings[1].level, SeverityLevel::Critical);
        assert_eq!(findings[1].reason, reconcile::DEFAULT_RISK_REASON);
    }

    #[test]
    fn at_most_five_findings() {
        let entries: Vec<_> = (0..8)
            .map(|i| serde_json::json!({"condition": format!("C{i}"), "score": 40}))
            .collect();
        let map = serde_json::json!({ "risk_scores": entries });
        let findings = reconcile_risk_findings(map.as_object().unwrap());
        assert_eq!(findings.len(), MAX_RISK_FINDINGS);
        assert_eq!(findings[0].condition, "C0");
    }
}
