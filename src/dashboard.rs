//! Dashboard statistics aggregated from patient and prescription rows.

use chrono::NaiveDate;
use serde_json::Value;

use crate::db::{DatabaseError, PatientStore, PrescriptionStore};
use crate::models::enums::{PrescriptionStatus, SeverityLevel};
use crate::models::{DashboardStats, PatientStatsRow, PrescriptionStatsRow};

/// Risk score at or above which a patient counts as a risk alert.
pub const RISK_ALERT_THRESHOLD: f64 = 70.0;

// ═══════════════════════════════════════════════════════════
// Loading
// ═══════════════════════════════════════════════════════════

/// Load both projections and aggregate them. Storage failures degrade to
/// [`DashboardStats::unavailable`].
pub async fn load_stats(
    patients: &dyn PatientStore,
    prescriptions: &dyn PrescriptionStore,
    today: NaiveDate,
) -> DashboardStats {
    match fetch_rows(patients, prescriptions).await {
        Ok((patient_rows, rx_rows)) => compute_stats(&patient_rows, &rx_rows, today),
        Err(e) => {
            tracing::error!(error = %e, "Dashboard stats unavailable");
            DashboardStats::unavailable()
        }
    }
}

async fn fetch_rows(
    patients: &dyn PatientStore,
    prescriptions: &dyn PrescriptionStore,
) -> Result<(Vec<PatientStatsRow>, Vec<PrescriptionStatsRow>), DatabaseError> {
    let (patient_rows, rx_rows) = tokio::join!(patients.patient_stats(), prescriptions.prescription_stats());
    Ok((patient_rows?, rx_rows?))
}

// ═══════════════════════════════════════════════════════════
// Aggregation
// ═══════════════════════════════════════════════════════════

pub fn compute_stats(
    patients: &[PatientStatsRow],
    prescriptions: &[PrescriptionStatsRow],
    today: NaiveDate,
) -> DashboardStats {
    let today = today.format("%Y-%m-%d").to_string();
    let critical = SeverityLevel::Critical.as_str();
    let pending = PrescriptionStatus::Pending.as_str();

    DashboardStats {
        total_patients: patients.len() as u64,
        critical_patients: patients
            .iter()
            .filter(|p| p.urgency_level.as_deref() == Some(critical))
            .count() as u64,
        pending_reviews: prescriptions
            .iter()
            .filter(|p| p.status.as_deref() == Some(pending))
            .count() as u64,
        avg_wait_time: average_wait(patients),
        prescriptions_today: prescriptions
            .iter()
            .filter(|p| p.date.as_deref().is_some_and(|d| d.starts_with(&today)))
            .count() as u64,
        risk_alerts: patients.iter().filter(|p| has_risk_alert(&p.risk_scores)).count() as u64,
    }
}

/// "Immediate" is 0 minutes; "N min" contributes N; anything else is skipped.
pub fn wait_minutes(wait_time: &str) -> Option<u32> {
    let wait_time = wait_time.trim();
    if wait_time.eq_ignore_ascii_case("immediate") {
        return Some(0);
    }
    if !wait_time.contains("min") {
        return None;
    }
    let digits: String = wait_time.chars().filter(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Rounded mean of the parseable wait times, half to even.
pub fn average_wait(patients: &[PatientStatsRow]) -> String {
    let minutes: Vec<u32> = patients
        .iter()
        .filter_map(|p| p.wait_time.as_deref().and_then(wait_minutes))
        .collect();
    if minutes.is_empty() {
        return "0 min".to_string();
    }
    let total: u64 = minutes.iter().map(|&m| u64::from(m)).sum();
    let avg = (total as f64 / minutes.len() as f64).round_ties_even();
    format!("{avg:.0} min")
}

/// Risk scores may arrive as a JSON array or as its text encoding.
fn has_risk_alert(risk_scores: &Value) -> bool {
    let parsed;
    let scores = match risk_scores {
        Value::String(text) => {
            parsed = serde_json::from_str::<Value>(text).unwrap_or(Value::Null);
            &parsed
        }
        other => other,
    };
    scores.as_array().is_some_and(|findings| {
        findings.iter().any(|finding| {
            finding
                .get("score")
                .and_then(Value::as_f64)
                .is_some_and(|score| score >= RISK_ALERT_THRESHOLD)
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn patient(level: &str, wait: &str, risks: Value) -> PatientStatsRow {
        PatientStatsRow {
            urgency_level: Some(level.into()),
            wait_time: Some(wait.into()),
            risk_scores: risks,
        }
    }

    fn rx(status: &str, date: &str) -> PrescriptionStatsRow {
        PrescriptionStatsRow {
            status: Some(status.into()),
            date: Some(date.into()),
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 3, 14).unwrap()
    }

    #[test]
    fn aggregates_counts() {
        let patients = vec![
            patient("Critical", "Immediate", json!([{"score": 92}, {"score": 40}])),
            patient("Medium", "20 min", json!([{"score": 30}])),
            patient("Low", "45 min", json!("[{\"score\": 75}]")),
        ];
        let prescriptions = vec![
            rx("Pending", "2026-03-14"),
            rx("Digitized", "2026-03-14"),
            rx("Pending", "2026-03-10"),
            rx("Verified", "2026-03-01"),
        ];
        let stats = compute_stats(&patients, &prescriptions, day());
        assert_eq!(stats.total_patients, 3);
        assert_eq!(stats.critical_patients, 1);
        assert_eq!(stats.pending_reviews, 2);
        assert_eq!(stats.prescriptions_today, 2);
        assert_eq!(stats.risk_alerts, 2);
        // (0 + 20 + 45) / 3 = 21.67
        assert_eq!(stats.avg_wait_time, "22 min");
    }

    #[test]
    fn each_patient_counts_once_for_risk_alerts() {
        let patients = vec![patient("High", "5 min", json!([{"score": 70}, {"score": 99}]))];
        assert_eq!(compute_stats(&patients, &[], day()).risk_alerts, 1);
    }

    #[test]
    fn no_data_means_zero_minutes() {
        let stats = compute_stats(&[], &[], day());
        assert_eq!(stats.avg_wait_time, "0 min");
        assert_eq!(stats.total_patients, 0);
    }

    #[test]
    fn unparseable_wait_times_are_skipped() {
        assert_eq!(wait_minutes("Immediate"), Some(0));
        assert_eq!(wait_minutes("5 min"), Some(5));
        assert_eq!(wait_minutes("soon"), None);
        assert_eq!(wait_minutes("min"), None);

        let patients = vec![patient("Low", "soon", json!([])), patient("Low", "45 min", json!([]))];
        assert_eq!(average_wait(&patients), "45 min");
    }

    #[test]
    fn halves_round_to_even() {
        let patients = vec![patient("Low", "5 min", json!([])), patient("Low", "20 min", json!([]))];
        // 12.5
        assert_eq!(average_wait(&patients), "12 min");
    }

    #[test]
    fn malformed_risk_scores_are_ignored() {
        assert!(!has_risk_alert(&json!("not json")));
        assert!(!has_risk_alert(&json!({"score": 99})));
        assert!(!has_risk_alert(&Value::Null));
    }

    #[tokio::test]
    async fn load_stats_reads_from_storage() {
        use crate::db::SqliteStore;
        let store = SqliteStore::open_in_memory().unwrap();
        let stats = load_stats(&store, &store, day()).await;
        assert_eq!(stats.total_patients, 0);
        assert_eq!(stats.avg_wait_time, "0 min");
    }

    struct DownStore;

    #[async_trait::async_trait]
    impl PatientStore for DownStore {
        async fn insert_patient(
            &self,
            _: crate::models::NewPatientRecord,
        ) -> Result<crate::models::PatientRecord, DatabaseError> {
            Err(DatabaseError::Transient("down".into()))
        }
        async fn get_patient(&self, _: &str) -> Result<Option<crate::models::PatientRecord>, DatabaseError> {
            Err(DatabaseError::Transient("down".into()))
        }
        async fn list_patients(
            &self,
            _: u32,
            _: u32,
        ) -> Result<crate::db::Page<crate::models::PatientRecord>, DatabaseError> {
            Err(DatabaseError::Transient("down".into()))
        }
        async fn delete_patient(&self, _: &str) -> Result<bool, DatabaseError> {
            Err(DatabaseError::Transient("down".into()))
        }
        async fn patient_stats(&self) -> Result<Vec<PatientStatsRow>, DatabaseError> {
            Err(DatabaseError::Transient("down".into()))
        }
    }

    #[tokio::test]
    async fn storage_failure_degrades_to_unavailable() {
        let rx = crate::db::SqliteStore::open_in_memory().unwrap();
        let stats = load_stats(&DownStore, &rx, day()).await;
        assert_eq!(stats, DashboardStats::unavailable());
    }
}
