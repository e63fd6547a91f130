use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rusqlite::Connection;
use uuid::Uuid;

use super::repository;
use super::retry::RetryPolicy;
use super::sqlite::{open_database, open_memory_database};
use super::{DatabaseError, Page, PatientStore, PrescriptionStore, StatusChange};
use crate::models::enums::PrescriptionStatus;
use crate::models::{
    NewPatientRecord, NewPrescription, PatientRecord, PatientStatsRow, PrescriptionRecord,
    PrescriptionStatsRow,
};

/// Local storage backend. Each call runs on the blocking pool against a
/// single shared connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    retry: RetryPolicy,
}

impl SqliteStore {
    pub fn open(path: &Path, retry: RetryPolicy) -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: Arc::new(Mutex::new(open_database(path)?)),
            retry,
        })
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        Ok(Self {
            conn: Arc::new(Mutex::new(open_memory_database()?)),
            retry: RetryPolicy::none(),
        })
    }

    async fn with_conn<T, F>(&self, operation: &'static str, f: F) -> Result<T, DatabaseError>
    where
        T: Send + 'static,
        F: Fn(&mut Connection) -> Result<T, DatabaseError> + Send + Sync + Clone + 'static,
    {
        self.retry
            .run(operation, || {
                let conn = Arc::clone(&self.conn);
                let f = f.clone();
                async move {
                    tokio::task::spawn_blocking(move || {
                        let mut guard = conn.lock().map_err(|_| DatabaseError::Backend {
                            status: 500,
                            message: "SQLite connection lock poisoned".into(),
                        })?;
                        f(&mut guard)
                    })
                    .await
                    .map_err(|e| DatabaseError::Io(format!("storage task failed: {e}")))?
                }
            })
            .await
    }
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Foreign key and CHECK failures are caller errors, not storage faults.
fn constraint_aware(e: DatabaseError) -> DatabaseError {
    match &e {
        DatabaseError::Sqlite(inner)
            if inner.sqlite_error_code() == Some(rusqlite::ErrorCode::ConstraintViolation) =>
        {
            DatabaseError::ConstraintViolation(inner.to_string())
        }
        _ => e,
    }
}

#[async_trait]
impl PatientStore for SqliteStore {
    async fn insert_patient(&self, record: NewPatientRecord) -> Result<PatientRecord, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let record = Arc::new(record);
        let stored = self
            .with_conn("insert_patient", move |conn| {
                repository::insert_patient(conn, &id, &record, &now()).map_err(constraint_aware)?;
                repository::get_patient(conn, &id)?.ok_or_else(|| DatabaseError::NotFound {
                    entity_type: "patient".into(),
                    id: id.clone(),
                })
            })
            .await?;
        Ok(PatientRecord::from_stored(stored))
    }

    async fn get_patient(&self, id: &str) -> Result<Option<PatientRecord>, DatabaseError> {
        let id = id.to_string();
        let row = self
            .with_conn("get_patient", move |conn| repository::get_patient(conn, &id))
            .await?;
        Ok(row.map(PatientRecord::from_stored))
    }

    async fn list_patients(&self, limit: u32, offset: u32) -> Result<Page<PatientRecord>, DatabaseError> {
        let (rows, total) = self
            .with_conn("list_patients", move |conn| {
                Ok((
                    repository::list_patients(conn, limit, offset)?,
                    repository::count_patients(conn)?,
                ))
            })
            .await?;
        Ok(Page {
            items: rows.into_iter().map(PatientRecord::from_stored).collect(),
            total,
        })
    }

    async fn delete_patient(&self, id: &str) -> Result<bool, DatabaseError> {
        let id = id.to_string();
        self.with_conn("delete_patient", move |conn| repository::delete_patient(conn, &id))
            .await
    }

    async fn patient_stats(&self) -> Result<Vec<PatientStatsRow>, DatabaseError> {
        self.with_conn("patient_stats", |conn| repository::patient_stats_rows(conn))
            .await
    }
}

#[async_trait]
impl PrescriptionStore for SqliteStore {
    async fn insert_prescription(
        &self,
        prescription: NewPrescription,
    ) -> Result<PrescriptionRecord, DatabaseError> {
        let id = Uuid::new_v4().to_string();
        let prescription = Arc::new(prescription);
        self.with_conn("insert_prescription", move |conn| {
            repository::insert_prescription(conn, &id, &prescription, &now())
                .map_err(constraint_aware)?;
            repository::get_prescription(conn, &id)?.ok_or_else(|| DatabaseError::NotFound {
                entity_type: "prescription".into(),
                id: id.clone(),
            })
        })
        .await
    }

    async fn get_prescription(&self, id: &str) -> Result<Option<PrescriptionRecord>, DatabaseError> {
        let id = id.to_string();
        self.with_conn("get_prescription", move |conn| repository::get_prescription(conn, &id))
            .await
    }

    async fn list_prescriptions(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Page<PrescriptionRecord>, DatabaseError> {
        let (items, total) = self
            .with_conn("list_prescriptions", move |conn| {
                Ok((
                    repository::list_prescriptions(conn, limit, offset)?,
                    repository::count_prescriptions(conn)?,
                ))
            })
            .await?;
        Ok(Page { items, total })
    }

    async fn update_prescription_status(
        &self,
        id: &str,
        status: PrescriptionStatus,
    ) -> Result<StatusChange, DatabaseError> {
        let id = id.to_string();
        self.with_conn("update_prescription_status", move |conn| {
            repository::update_prescription_status(conn, &id, status)
        })
        .await
    }

    async fn prescription_stats(&self) -> Result<Vec<PrescriptionStatsRow>, DatabaseError> {
        self.with_conn("prescription_stats", |conn| repository::prescription_stats_rows(conn))
            .await
    }
}
