use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardStats {
    pub total_patients: u64,
    pub critical_patients: u64,
    pub pending_reviews: u64,
    pub avg_wait_time: String,
    pub prescriptions_today: u64,
    pub risk_alerts: u64,
}

impl DashboardStats {
    /// Returned when the storage backend cannot be read.
    pub fn unavailable() -> Self {
        Self {
            total_patients: 0,
            critical_patients: 0,
            pending_reviews: 0,
            avg_wait_time: "N/A".to_string(),
            prescriptions_today: 0,
            risk_alerts: 0,
        }
    }
}

/// Minimal projection of a patient row used for statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientStatsRow {
    pub urgency_level: Option<String>,
    pub wait_time: Option<String>,
    #[serde(default)]
    pub risk_scores: serde_json::Value,
}

/// Minimal projection of a prescription row used for statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrescriptionStatsRow {
    pub status: Option<String>,
    pub date: Option<String>,
}
