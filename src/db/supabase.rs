//! Supabase backend: PostgREST tables over reqwest.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;

use super::retry::RetryPolicy;
use super::{DatabaseError, Page, PatientStore, PrescriptionStore, StatusChange};
use crate::models::enums::PrescriptionStatus;
use crate::models::{
    NewPatientRecord, NewPrescription, PatientRecord, PatientStatsRow, PrescriptionRecord,
    PrescriptionStatsRow, StoredPatient,
};

const PATIENTS: &str = "patients";
const PRESCRIPTIONS: &str = "prescriptions";

/// Shared HTTP handle for the Supabase REST, auth and storage APIs.
#[derive(Clone)]
pub struct SupabaseClient {
    base_url: String,
    service_key: String,
    http: reqwest::Client,
}

impl SupabaseClient {
    pub fn new(base_url: &str, service_key: &str, timeout_secs: u64) -> Result<Self, DatabaseError> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| DatabaseError::Io(e.to_string()))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Request authenticated with the service role key.
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
    }

    /// Request on behalf of an end user: service `apikey`, user bearer token.
    pub fn user_request(&self, method: Method, path: &str, user_token: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .header("apikey", &self.service_key)
            .bearer_auth(user_token)
    }

    fn table(&self, method: Method, table: &str) -> RequestBuilder {
        self.request(method, &format!("/rest/v1/{table}"))
    }
}

/// Map transport failures: connectivity is transient, the rest is final.
pub fn send_error(e: reqwest::Error) -> DatabaseError {
    if e.is_connect() || e.is_timeout() {
        DatabaseError::Transient(e.without_url().to_string())
    } else {
        DatabaseError::Io(e.without_url().to_string())
    }
}

/// Like [`send_error`], but an insert that timed out may already be committed,
/// so only a failed connect stays retryable for POST.
pub fn write_send_error(method: &Method, e: reqwest::Error) -> DatabaseError {
    if *method == Method::POST && !e.is_connect() {
        DatabaseError::Io(e.without_url().to_string())
    } else {
        send_error(e)
    }
}

pub fn is_table_missing(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("pgrst205") || lower.contains("could not find the table") || lower.contains("42p01")
}

/// Classify a non-success PostgREST response.
pub fn status_error(table: &str, status: StatusCode, body: String) -> DatabaseError {
    if is_table_missing(&body) {
        DatabaseError::NotProvisioned(table.to_string())
    } else if matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE | StatusCode::GATEWAY_TIMEOUT
    ) {
        DatabaseError::Transient(format!("{status}: {body}"))
    } else if status == StatusCode::CONFLICT || body.contains("23503") || body.contains("23505") {
        DatabaseError::ConstraintViolation(body)
    } else {
        DatabaseError::Backend {
            status: status.as_u16(),
            message: body,
        }
    }
}

async fn checked(table: &str, response: Response) -> Result<Response, DatabaseError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(table, status, body))
}

async fn rows<T: DeserializeOwned>(table: &str, response: Response) -> Result<Vec<T>, DatabaseError> {
    let response = checked(table, response).await?;
    let text = response.text().await.map_err(send_error)?;
    Ok(serde_json::from_str(&text)?)
}

/// Total from `Content-Range: 0-24/137` (or `*/0`).
pub fn parse_content_range_total(header: Option<&str>) -> Option<u64> {
    header?.rsplit('/').next()?.trim().parse().ok()
}

/// Reads treat a missing table as "no data yet".
fn absent_if_unprovisioned<T>(result: Result<T, DatabaseError>, empty: T) -> Result<T, DatabaseError> {
    match result {
        Err(DatabaseError::NotProvisioned(table)) => {
            tracing::warn!(table = %table, "Table not provisioned yet, returning empty result");
            Ok(empty)
        }
        other => other,
    }
}

fn first_row<T>(table: &str, mut rows: Vec<T>) -> Result<T, DatabaseError> {
    if rows.is_empty() {
        return Err(DatabaseError::Backend {
            status: 500,
            message: format!("{table} write returned no representation"),
        });
    }
    Ok(rows.swap_remove(0))
}

fn patient_payload(record: &NewPatientRecord) -> Result<serde_json::Value, DatabaseError> {
    Ok(json!({
        "name": record.intake.name,
        "age": record.intake.age,
        "gender": record.intake.gender.map(|g| g.as_str()),
        "symptoms": record.intake.symptoms,
        "history": record.intake.history,
        "urgency_score": record.urgency.score,
        "urgency_level": record.urgency.level.as_str(),
        "wait_time": record.urgency.wait_time,
        "urgency_reasoning": record.urgency.reasoning,
        "avatar": record.avatar,
        "risk_scores": record.risk_scores,
        // TEXT column: the summary object is stored serialized.
        "ai_summary": serde_json::to_string(&record.summary)?,
        "created_by": record.created_by,
    }))
}

fn prescription_payload(prescription: &NewPrescription) -> serde_json::Value {
    let mut payload = json!({
        "patient_name": prescription.patient_name,
        "date": prescription.date,
        "medications": prescription.medications,
        "status": prescription.status.as_str(),
    });
    for (key, value) in [
        ("image_url", &prescription.image_url),
        ("patient_id", &prescription.patient_id),
        ("created_by", &prescription.created_by),
    ] {
        if let Some(value) = value {
            payload[key] = json!(value);
        }
    }
    payload
}

/// Row storage in Supabase Postgres via PostgREST.
#[derive(Clone)]
pub struct SupabaseStore {
    client: SupabaseClient,
    retry: RetryPolicy,
}

impl SupabaseStore {
    pub fn new(client: SupabaseClient, retry: RetryPolicy) -> Self {
        Self { client, retry }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        table: &'static str,
        query: Vec<(&'static str, String)>,
    ) -> Result<Vec<T>, DatabaseError> {
        let (client, query) = (&self.client, &query);
        self.retry
            .run(operation, move || async move {
                let response = client
                    .table(Method::GET, table)
                    .query(query)
                    .send()
                    .await
                    .map_err(send_error)?;
                rows(table, response).await
            })
            .await
    }

    async fn write<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        method: Method,
        table: &'static str,
        query: Vec<(&'static str, String)>,
        body: Option<serde_json::Value>,
    ) -> Result<Vec<T>, DatabaseError> {
        let (client, method, query, body) = (&self.client, &method, &query, &body);
        self.retry
            .run(operation, move || async move {
                let mut request = client
                    .table(method.clone(), table)
                    .query(query)
                    .header("Prefer", "return=representation");
                if let Some(body) = body {
                    request = request.json(body);
                }
                let response = request
                    .send()
                    .await
                    .map_err(|e| write_send_error(method, e))?;
                if *method == Method::POST && response.status() == StatusCode::GATEWAY_TIMEOUT {
                    return Err(DatabaseError::Backend {
                        status: 504,
                        message: format!("{table} insert outcome unknown"),
                    });
                }
                rows(table, response).await
            })
            .await
    }

    async fn fetch_page<T: DeserializeOwned>(
        &self,
        operation: &'static str,
        table: &'static str,
        order: &'static str,
        limit: u32,
        offset: u32,
    ) -> Result<Page<T>, DatabaseError> {
        let query = vec![
            ("select", "*".to_string()),
            ("order", order.to_string()),
            ("limit", limit.to_string()),
            ("offset", offset.to_string()),
        ];
        let (client, query) = (&self.client, &query);
        self.retry
            .run(operation, move || async move {
                let response = client
                    .table(Method::GET, table)
                    .query(query)
                    .header("Prefer", "count=exact")
                    .send()
                    .await
                    .map_err(send_error)?;
                let response = checked(table, response).await?;
                let total = parse_content_range_total(
                    response
                        .headers()
                        .get("content-range")
                        .and_then(|v| v.to_str().ok()),
                );
                let items: Vec<T> = rows(table, response).await?;
                Ok(Page {
                    total: total.unwrap_or(items.len() as u64 + offset as u64),
                    items,
                })
            })
            .await
    }
}

fn by_id(id: &str) -> Vec<(&'static str, String)> {
    vec![("select", "*".to_string()), ("id", format!("eq.{id}"))]
}

#[async_trait]
impl PatientStore for SupabaseStore {
    async fn insert_patient(&self, record: NewPatientRecord) -> Result<PatientRecord, DatabaseError> {
        let payload = patient_payload(&record)?;
        let inserted: Vec<StoredPatient> = self
            .write("insert_patient", Method::POST, PATIENTS, Vec::new(), Some(payload))
            .await?;
        Ok(PatientRecord::from_stored(first_row(PATIENTS, inserted)?))
    }

    async fn get_patient(&self, id: &str) -> Result<Option<PatientRecord>, DatabaseError> {
        let found = self.fetch::<StoredPatient>("get_patient", PATIENTS, by_id(id)).await;
        let found = absent_if_unprovisioned(found, Vec::new())?;
        Ok(found.into_iter().next().map(PatientRecord::from_stored))
    }

    async fn list_patients(&self, limit: u32, offset: u32) -> Result<Page<PatientRecord>, DatabaseError> {
        let page = self
            .fetch_page::<StoredPatient>("list_patients", PATIENTS, "urgency_score.desc", limit, offset)
            .await;
        let page = absent_if_unprovisioned(page, Page { items: Vec::new(), total: 0 })?;
        Ok(Page {
            items: page.items.into_iter().map(PatientRecord::from_stored).collect(),
            total: page.total,
        })
    }

    async fn delete_patient(&self, id: &str) -> Result<bool, DatabaseError> {
        let deleted: Vec<serde_json::Value> = self
            .write(
                "delete_patient",
                Method::DELETE,
                PATIENTS,
                vec![("id", format!("eq.{id}"))],
                None,
            )
            .await?;
        Ok(!deleted.is_empty())
    }

    async fn patient_stats(&self) -> Result<Vec<PatientStatsRow>, DatabaseError> {
        let rows = self
            .fetch(
                "patient_stats",
                PATIENTS,
                vec![("select", "urgency_level,wait_time,risk_scores".to_string())],
            )
            .await;
        absent_if_unprovisioned(rows, Vec::new())
    }
}

#[async_trait]
impl PrescriptionStore for SupabaseStore {
    async fn insert_prescription(
        &self,
        prescription: NewPrescription,
    ) -> Result<PrescriptionRecord, DatabaseError> {
        let inserted: Vec<PrescriptionRecord> = self
            .write(
                "insert_prescription",
                Method::POST,
                PRESCRIPTIONS,
                Vec::new(),
                Some(prescription_payload(&prescription)),
            )
            .await?;
        first_row(PRESCRIPTIONS, inserted)
    }

    async fn get_prescription(&self, id: &str) -> Result<Option<PrescriptionRecord>, DatabaseError> {
        let found = self
            .fetch::<PrescriptionRecord>("get_prescription", PRESCRIPTIONS, by_id(id))
            .await;
        Ok(absent_if_unprovisioned(found, Vec::new())?.into_iter().next())
    }

    async fn list_prescriptions(
        &self,
        limit: u32,
        offset: u32,
    ) -> Result<Page<PrescriptionRecord>, DatabaseError> {
        let page = self
            .fetch_page("list_prescriptions", PRESCRIPTIONS, "created_at.desc", limit, offset)
            .await;
        absent_if_unprovisioned(page, Page { items: Vec::new(), total: 0 })
    }

    async fn update_prescription_status(
        &self,
        id: &str,
        status: PrescriptionStatus,
    ) -> Result<StatusChange, DatabaseError> {
        let Some(current) = self.get_prescription(id).await? else {
            return Ok(StatusChange::NotFound);
        };
        if !current.status.can_transition_to(status) {
            return Ok(StatusChange::Rejected { current: current.status });
        }

        // Guarded on the status we just read so a concurrent change cannot be overwritten.
        let updated: Vec<PrescriptionRecord> = self
            .write(
                "update_prescription_status",
                Method::PATCH,
                PRESCRIPTIONS,
                vec![
                    ("id", format!("eq.{id}")),
                    ("status", format!("eq.{}", current.status.as_str())),
                ],
                Some(json!({ "status": status.as_str() })),
            )
            .await?;
        match updated.into_iter().next() {
            Some(record) => Ok(StatusChange::Updated(record)),
            None => match self.get_prescription(id).await? {
                Some(latest) => Ok(StatusChange::Rejected { current: latest.status }),
                None => Ok(StatusChange::NotFound),
            },
        }
    }

    async fn prescription_stats(&self) -> Result<Vec<PrescriptionStatsRow>, DatabaseError> {
        let rows = self
            .fetch(
                "prescription_stats",
                PRESCRIPTIONS,
                vec![("select", "status,date".to_string())],
            )
            .await;
        absent_if_unprovisioned(rows, Vec::new())
    }
}
