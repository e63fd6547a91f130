//! Patient endpoints: triage intake, listing, lookup, deletion and voice
//! transcription.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::middleware::auth::require_staff;
use crate::api::types::{ApiContext, PageQuery, PatientListResponse};
use crate::identity::CallerIdentity;
use crate::models::enums::Gender;
use crate::models::{PatientIntake, PatientRecord};
use crate::pipeline::transcription::{self, IntakeDraft, TranscriptionMode, TranscriptionOutcome};

/// Largest accepted audio upload (25 MB).
pub const MAX_AUDIO_BYTES: usize = 25 * 1024 * 1024;
const MAX_AGE: i64 = 150;

// ═══════════════════════════════════════════════════════════
// Intake validation
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct PatientCreateRequest {
    pub name: String,
    #[serde(default)]
    pub age: Option<i64>,
    #[serde(default)]
    pub gender: Option<String>,
    pub symptoms: String,
    #[serde(default)]
    pub history: Vec<String>,
}

impl PatientCreateRequest {
    /// Reject bad input before any AI or storage call.
    pub fn into_intake(self) -> Result<PatientIntake, ApiError> {
        let name = self.name.trim().to_string();
        if name.is_empty() {
            return Err(ApiError::BadRequest("name is required".into()));
        }
        let symptoms = self.symptoms.trim().to_string();
        if symptoms.is_empty() {
            return Err(ApiError::BadRequest("symptoms are required".into()));
        }
        let age = match self.age {
            None => None,
            Some(age) if (0..=MAX_AGE).contains(&age) => Some(age as u32),
            Some(age) => {
                return Err(ApiError::BadRequest(format!(
                    "age must be between 0 and {MAX_AGE}, got {age}"
                )))
            }
        };
        let gender = match self.gender.as_deref() {
            None => None,
            Some(raw) => parse_gender_field(raw)?,
        };
        let history = self
            .history
            .into_iter()
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .collect();

        Ok(PatientIntake {
            name,
            age,
            gender,
            symptoms,
            history,
        })
    }
}

fn parse_gender_field(raw: &str) -> Result<Option<Gender>, ApiError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "" | "unknown" => Ok(None),
        "male" => Ok(Some(Gender::Male)),
        "female" => Ok(Some(Gender::Female)),
        "other" => Ok(Some(Gender::Other)),
        _ => Err(ApiError::BadRequest(format!(
            "gender must be one of Male, Female, Other, Unknown; got '{raw}'"
        ))),
    }
}

// ═══════════════════════════════════════════════════════════
// Handlers
// ═══════════════════════════════════════════════════════════

/// `POST /api/patients`: run the triage pipeline and store the result.
pub async fn create(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<CallerIdentity>,
    payload: Result<Json<PatientCreateRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<PatientRecord>), ApiError> {
    let Json(request) = payload?;
    let intake = request.into_intake()?;
    let record = ctx.orchestrator.triage(intake, Some(caller.user_id)).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// `GET /api/patients`: staff only, highest urgency first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<CallerIdentity>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<PatientListResponse>, ApiError> {
    require_staff(&caller)?;
    let Query(page) = query?;
    let (limit, offset) = page.resolve()?;
    let page = ctx.patients.list_patients(limit, offset).await?;
    Ok(Json(PatientListResponse {
        patients: page.items,
        total: page.total,
    }))
}

/// `GET /api/patients/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<PatientRecord>, ApiError> {
    ctx.patients
        .get_patient(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Patient not found".into()))
}

/// `DELETE /api/patients/:id`: staff only.
pub async fn delete(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    require_staff(&caller)?;
    if ctx.patients.delete_patient(&id).await? {
        tracing::info!(patient_id = %id, user_id = %caller.user_id, "Patient deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("Patient not found".into()))
    }
}

// ═══════════════════════════════════════════════════════════
// Voice transcription
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct TranscribeQuery {
    #[serde(default)]
    pub mode: TranscriptionMode,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptionResponse {
    pub status: String,
    pub text: String,
    pub draft: Option<IntakeDraft>,
}

impl From<TranscriptionOutcome> for TranscriptionResponse {
    fn from(outcome: TranscriptionOutcome) -> Self {
        let status = outcome.status().to_string();
        let text = outcome.message();
        let draft = match outcome {
            TranscriptionOutcome::Extracted(draft) => Some(draft),
            _ => None,
        };
        Self { status, text, draft }
    }
}

/// `POST /api/patients/transcribe-voice?mode=extract|plain`: multipart `file`.
///
/// Model failures are reported in the body with a soft message, never as an
/// HTTP error.
pub async fn transcribe_voice(
    State(ctx): State<ApiContext>,
    query: Result<Query<TranscribeQuery>, QueryRejection>,
    mut multipart: Multipart,
) -> Result<Json<TranscriptionResponse>, ApiError> {
    let Query(TranscribeQuery { mode }) = query?;

    let mut audio = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            let content_type = field.content_type().map(str::to_string);
            let data = field.bytes().await?;
            audio = Some((data, content_type));
        }
    }
    let (data, content_type) = audio.ok_or_else(|| ApiError::BadRequest("file is required".into()))?;
    if data.is_empty() {
        return Err(ApiError::BadRequest("Audio file is empty".into()));
    }
    if data.len() > MAX_AUDIO_BYTES {
        return Err(ApiError::PayloadTooLarge("Audio exceeds 25 MB".into()));
    }

    let outcome =
        transcription::transcribe(ctx.llm.as_ref(), data.to_vec(), content_type.as_deref(), mode).await;
    Ok(Json(outcome.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(name: &str, age: Option<i64>, gender: Option<&str>, symptoms: &str) -> PatientCreateRequest {
        PatientCreateRequest {
            name: name.into(),
            age,
            gender: gender.map(str::to_string),
            symptoms: symptoms.into(),
            history: vec!["  ".into(), " Diabetes ".into()],
        }
    }

    #[test]
    fn valid_request_becomes_intake() {
        let intake = request(" Ahmed Khan ", Some(45), Some("male"), "chest pain")
            .into_intake()
            .unwrap();
        assert_eq!(intake.name, "Ahmed Khan");
        assert_eq!(intake.age, Some(45));
        assert_eq!(intake.gender, Some(Gender::Male));
        assert_eq!(intake.history, vec!["Diabetes".to_string()]);
    }

    #[test]
    fn unknown_gender_and_age_are_allowed() {
        let intake = request("A", None, Some("Unknown"), "cough").into_intake().unwrap();
        assert_eq!(intake.age, None);
        assert_eq!(intake.gender, None);
    }

    #[test]
    fn invalid_input_is_rejected() {
        assert!(request("", None, None, "cough").into_intake().is_err());
        assert!(request("A", None, None, "   ").into_intake().is_err());
        assert!(request("A", Some(-1), None, "cough").into_intake().is_err());
        assert!(request("A", Some(200), None, "cough").into_intake().is_err());
        assert!(request("A", None, Some("robot"), "cough").into_intake().is_err());
    }

    #[test]
    fn transcription_response_shapes() {
        let r: TranscriptionResponse = TranscriptionOutcome::QuotaExceeded.into();
        assert_eq!(r.status, "quota_exceeded");
        assert!(r.text.contains("Quota"));
        assert!(r.draft.is_none());

        let r: TranscriptionResponse = TranscriptionOutcome::Transcribed("hello".into()).into();
        assert_eq!(r.text, "hello");
    }
}
