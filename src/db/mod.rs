pub mod images;
pub mod repository;
pub mod retry;
pub mod sqlite;
pub mod sqlite_store;
pub mod supabase;

pub use images::{LocalImageStore, SupabaseImageStore};
pub use retry::RetryPolicy;
pub use sqlite::*;
pub use sqlite_store::SqliteStore;
pub use supabase::{SupabaseClient, SupabaseStore};

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::models::enums::PrescriptionStatus;
use crate::models::{
    NewPatientRecord, NewPrescription, PatientRecord, PatientStatsRow, PrescriptionRecord,
    PrescriptionStatsRow,
};

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid enum value for {field}: {value}")]
    InvalidEnum { field: String, value: String },

    #[error("Migration failed at version {version}: {reason}")]
    MigrationFailed { version: i64, reason: String },

    #[error("Constraint violated: {0}")]
    ConstraintViolation(String),

    #[error("Database table '{0}' not found. Please run the SQL migration.")]
    NotProvisioned(String),

    #[error("Storage temporarily unreachable: {0}")]
    Transient(String),

    #[error("Storage backend error ({status}): {message}")]
    Backend { status: u16, message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(String),
}

impl DatabaseError {
    /// Connectivity problems worth retrying. Everything else is final.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transient(_) => true,
            Self::Sqlite(e) => matches!(
                e.sqlite_error_code(),
                Some(rusqlite::ErrorCode::DatabaseBusy) | Some(rusqlite::ErrorCode::DatabaseLocked)
            ),
            _ => false,
        }
    }
}

/// One page of rows plus the total row count.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// Result of a guarded status change.
#[derive(Debug, Clone, PartialEq)]
pub enum StatusChange {
    Updated(PrescriptionRecord),
    NotFound,
    /// The requested status would move the record backwards.
    Rejected { current: PrescriptionStatus },
}

#[async_trait]
pub trait PatientStore: Send + Sync {
    async fn insert_patient(&self, record: NewPatientRecord) -> Result<PatientRecord, DatabaseError>;

    /// `None` when absent, or when the table has not been provisioned yet.
    async fn get_patient(&self, id: &str) -> Result<Option<PatientRecord>, DatabaseError>;

    /// Ordered by urgency score, highest first.
    async fn list_patients(&self, limit: u32, offset: u32) -> Result<Page<PatientRecord>, DatabaseError>;

    /// `false` when no row matched.
    async fn delete_patient(&self, id: &str) -> Result<bool, DatabaseError>;

    async fn patient_stats(&self) -> Result<Vec<PatientStatsRow>, DatabaseError>;
}

#[async_trait]
pub trait PrescriptionStore: Send + Sync {
    async fn insert_prescription(
        &self,
        prescription: NewPrescription,
    ) -> Result<PrescriptionRecord, DatabaseError>;

    async fn get_prescription(&self, id: &str) -> Result<Option<PrescriptionRecord>, DatabaseError>;

    /// Newest first.
    async fn list_prescriptions(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Page<PrescriptionRecord>, DatabaseError>;

    /// Manual status change (`→ Verified` or unchanged), checked against the stored status.
    async fn update_prescription_status(
        &self,
        id: &str,
        status: PrescriptionStatus,
    ) -> Result<StatusChange, DatabaseError>;

    async fn prescription_stats(&self) -> Result<Vec<PrescriptionStatsRow>, DatabaseError>;
}

/// Binary storage for prescription photos. Returns a URL or path the client can fetch.
#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn upload_image(
        &self,
        data: Vec<u8>,
        extension: &str,
        content_type: &str,
    ) -> Result<String, DatabaseError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connectivity_errors_are_transient() {
        assert!(DatabaseError::Transient("reset".into()).is_transient());
        assert!(!DatabaseError::NotProvisioned("patients".into()).is_transient());
        assert!(!DatabaseError::Backend { status: 400, message: "bad".into() }.is_transient());
        let busy = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        assert!(DatabaseError::Sqlite(busy).is_transient());
    }

    #[test]
    fn not_provisioned_message_names_table() {
        let msg = DatabaseError::NotProvisioned("patients".into()).to_string();
        assert!(msg.contains("'patients'"));
    }
}
