use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::Instrument;

use super::llm::LlmClient;
use super::prioritization::assess_priority;
use super::risk::analyze_risks;
use super::summary::{fallback_summary, generate_summary};
use crate::db::{DatabaseError, PatientStore};
use crate::models::{
    derive_avatar, ClinicalSummary, NewPatientRecord, PatientIntake, PatientRecord, RiskFinding,
    UrgencyAssessment,
};

#[derive(Error, Debug)]
pub enum TriageError {
    #[error("Failed to persist patient record: {0}")]
    Storage(#[from] DatabaseError),
}

/// AI output for one intake, before persistence.
#[derive(Debug, Clone, PartialEq)]
pub struct TriageAssessment {
    pub urgency: UrgencyAssessment,
    pub risk_scores: Vec<RiskFinding>,
    pub summary: ClinicalSummary,
}

/// Runs prioritization and risk analysis concurrently, then the summary,
/// then persists the assembled record. Each AI step is bounded by
/// `step_timeout` and degrades to its own fallback.
pub struct TriageOrchestrator {
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn PatientStore>,
    step_timeout: Duration,
}

impl TriageOrchestrator {
    pub fn new(llm: Arc<dyn LlmClient>, store: Arc<dyn PatientStore>, step_timeout: Duration) -> Self {
        Self {
            llm,
            store,
            step_timeout,
        }
    }

    pub async fn triage(
        &self,
        intake: PatientIntake,
        created_by: Option<String>,
    ) -> Result<PatientRecord, TriageError> {
        let span = tracing::info_span!("triage", patient = %intake.name);
        async move {
            let assessment = self.assess(&intake).await;
            let record = NewPatientRecord {
                avatar: derive_avatar(&intake.name),
                intake,
                urgency: assessment.urgency,
                risk_scores: assessment.risk_scores,
                summary: assessment.summary,
                created_by,
            };
            let stored = self.store.insert_patient(record).await.map_err(|e| {
                tracing::error!(error = %e, "Patient record could not be stored");
                TriageError::from(e)
            })?;
            tracing::info!(patient_id = %stored.id, score = stored.urgency_score, "Triage complete");
            Ok(stored)
        }
        .instrument(span)
        .await
    }

    pub async fn assess(&self, intake: &PatientIntake) -> TriageAssessment {
        let llm = self.llm.as_ref();
        let (urgency, risk_scores) = tokio::join!(
            self.bounded("prioritization", assess_priority(llm, intake), |reason| {
                UrgencyAssessment::fallback(&reason)
            }),
            self.bounded("risk", analyze_risks(llm, intake), |_| {
                vec![RiskFinding::general_assessment()]
            }),
        );
        let summary = self
            .bounded(
                "summary",
                generate_summary(llm, intake, &urgency, &risk_scores),
                |_| fallback_summary(intake, &urgency),
            )
            .await;

        TriageAssessment {
            urgency,
            risk_scores,
            summary,
        }
    }

    async fn bounded<T>(
        &self,
        step: &'static str,
        work: impl Future<Output = T>,
        fallback: impl FnOnce(String) -> T,
    ) -> T {
        match tokio::time::timeout(self.step_timeout, work).await {
            Ok(value) => value,
            Err(_) => {
                let reason = format!("{step} timed out after {}s", self.step_timeout.as_secs());
                tracing::warn!(step, timeout_ms = self.step_timeout.as_millis() as u64, "AI step timed out, using fallback");
                fallback(reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::SqliteStore;
    use crate::models::enums::{Gender, SeverityLevel};
    use crate::pipeline::llm::MockLlmClient;

    const URGENCY: &str = "clinical triage AI";
    const RISK: &str = "clinical risk analysis AI";
    const SUMMARY: &str = "clinical summary AI";

    fn ahmed() -> PatientIntake {
        PatientIntake {
            name: "Ahmed Khan".into(),
            age: Some(45),
            gender: Some(Gender::Male),
            symptoms: "crushing chest pain".into(),
            history: vec![],
        }
    }

    fn orchestrator(llm: MockLlmClient, timeout: Duration) -> (TriageOrchestrator, Arc<SqliteStore>) {
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let orch = TriageOrchestrator::new(Arc::new(llm), store.clone(), timeout);
        (orch, store)
    }

    #[tokio::test]
    async fn critical_patient_is_triaged_and_persisted() {
        let llm = MockLlmClient::new("unused")
            .route(URGENCY, r#"{"urgency_score": 92, "urgency_level": "Critical", "reasoning": "ACS suspected"}"#)
            .route(RISK, r#"{"risk_scores": [{"condition": "Cardiac Event", "score": 88}]}"#)
            .route(SUMMARY, r#"{"clinical_summary_en": "Suspected ACS.", "suggested_actions": ["ECG"]}"#);
        let (orch, store) = orchestrator(llm, Duration::from_secs(5));

        let record = orch.triage(ahmed(), Some("user-1".into())).await.unwrap();
        assert_eq!(record.urgency_level, SeverityLevel::Critical);
        assert_eq!(record.wait_time, "Immediate");
        assert_eq!(record.avatar, "AK");
        assert_eq!(record.risk_scores[0].condition, "Cardiac Event");
        assert_eq!(record.ai_summary.suggested_actions, vec!["ECG"]);
        assert_eq!(record.created_by.as_deref(), Some("user-1"));

        let fetched = store.get_patient(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test]
    async fn full_outage_still_yields_complete_record() {
        let llm = MockLlmClient::failing("model unavailable");
        let (orch, _store) = orchestrator(llm, Duration::from_secs(5));

        let record = orch.triage(ahmed(), None).await.unwrap();
        assert_eq!(record.urgency_score, 50);
        assert_eq!(record.urgency_level, SeverityLevel::Medium);
        assert_eq!(record.wait_time, "20 min");
        assert_eq!(record.risk_scores.len(), 1);
        assert!(!record.ai_summary.clinical_summary_en.is_empty());
        assert!(!record.ai_summary.suggested_actions.is_empty());
    }

    #[tokio::test]
    async fn summary_sees_upstream_results() {
        let llm = MockLlmClient::new("unused")
            .route(URGENCY, r#"{"urgency_score": 70}"#)
            .route(RISK, r#"{"risk_scores": [{"condition": "Stroke", "score": 75}]}"#)
            .route_error(SUMMARY, crate::pipeline::llm::LlmError::Timeout(1));
        let (orch, _store) = orchestrator(llm, Duration::from_secs(5));
        let assessment = orch.assess(&ahmed()).await;
        assert_eq!(assessment.urgency.level, SeverityLevel::High);
        assert!(assessment.summary.clinical_summary_en.contains("High (70/100)"));
    }

    #[tokio::test]
    async fn slow_steps_time_out_into_fallbacks() {
        let llm = MockLlmClient::new(r#"{"urgency_score": 99}"#).with_delay(Duration::from_secs(5));
        let (orch, _store) = orchestrator(llm, Duration::from_millis(50));
        let assessment = orch.assess(&ahmed()).await;
        assert_eq!(assessment.urgency.score, 50);
        assert!(assessment.urgency.reasoning.contains("timed out"));
        assert_eq!(assessment.risk_scores, vec![RiskFinding::general_assessment()]);
        assert_eq!(assessment.summary.suggested_actions, vec!["Manual triage required"]);
    }

    #[tokio::test]
    async fn each_step_calls_the_model_once() {
        let llm = Arc::new(MockLlmClient::failing("down"));
        let store = Arc::new(SqliteStore::open_in_memory().unwrap());
        let orch = TriageOrchestrator::new(llm.clone(), store, Duration::from_secs(5));
        orch.assess(&ahmed()).await;
        assert_eq!(llm.call_count(), 3);
    }
}
