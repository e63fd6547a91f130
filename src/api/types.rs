//! Shared types for the API layer.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::db::{ImageStore, PatientStore, PrescriptionStore};
use crate::identity::IdentityProvider;
use crate::models::{PatientRecord, PrescriptionRecord};
use crate::pipeline::{LlmClient, TriageOrchestrator};
use crate::session_cache::AuthCache;

pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 200;

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

/// Storage collaborators behind the API.
#[derive(Clone)]
pub struct Backends {
    pub patients: Arc<dyn PatientStore>,
    pub prescriptions: Arc<dyn PrescriptionStore>,
    pub images: Arc<dyn ImageStore>,
}

/// Shared context for all API routes and middleware.
#[derive(Clone)]
pub struct ApiContext {
    pub patients: Arc<dyn PatientStore>,
    pub prescriptions: Arc<dyn PrescriptionStore>,
    pub images: Arc<dyn ImageStore>,
    pub llm: Arc<dyn LlmClient>,
    pub orchestrator: Arc<TriageOrchestrator>,
    pub identity: Arc<dyn IdentityProvider>,
    pub auth_cache: Arc<Mutex<AuthCache>>,
}

impl ApiContext {
    pub fn new(
        backends: Backends,
        llm: Arc<dyn LlmClient>,
        identity: Arc<dyn IdentityProvider>,
        auth_cache: AuthCache,
        ai_timeout: Duration,
    ) -> Self {
        let orchestrator = TriageOrchestrator::new(llm.clone(), backends.patients.clone(), ai_timeout);
        Self {
            patients: backends.patients,
            prescriptions: backends.prescriptions,
            images: backends.images,
            llm,
            orchestrator: Arc::new(orchestrator),
            identity,
            auth_cache: Arc::new(Mutex::new(auth_cache)),
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Pagination
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    /// Validated `(limit, offset)`: limit in 1..=200 (default 50), offset ≥ 0.
    pub fn resolve(&self) -> Result<(u32, u32), ApiError> {
        let limit = self.limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(ApiError::BadRequest(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}"
            )));
        }
        let offset = self.offset.unwrap_or(0);
        let offset = u32::try_from(offset)
            .map_err(|_| ApiError::BadRequest("offset must be a non-negative integer".into()))?;
        Ok((limit as u32, offset))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PatientListResponse {
    pub patients: Vec<PatientRecord>,
    pub total: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PrescriptionListResponse {
    pub prescriptions: Vec<PrescriptionRecord>,
    pub total: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(limit: Option<i64>, offset: Option<i64>) -> PageQuery {
        PageQuery { limit, offset }
    }

    #[test]
    fn page_defaults() {
        assert_eq!(query(None, None).resolve().unwrap(), (50, 0));
    }

    #[test]
    fn page_bounds() {
        assert_eq!(query(Some(1), Some(0)).resolve().unwrap(), (1, 0));
        assert_eq!(query(Some(200), Some(10)).resolve().unwrap(), (200, 10));
        assert!(query(Some(0), None).resolve().is_err());
        assert!(query(Some(201), None).resolve().is_err());
        assert!(query(None, Some(-1)).resolve().is_err());
    }
}
