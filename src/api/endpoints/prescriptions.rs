//! Prescription endpoints: photo digitization, listing, lookup and status
//! changes.

use std::str::FromStr;

use axum::body::Bytes;
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::{Extension, Json};
use serde::Deserialize;

use crate::api::error::ApiError;
use crate::api::middleware::auth::require_staff;
use crate::api::types::{ApiContext, PageQuery, PrescriptionListResponse};
use crate::db::StatusChange;
use crate::identity::CallerIdentity;
use crate::models::enums::PrescriptionStatus;
use crate::models::{DigitizedPrescription, NewPrescription, PrescriptionRecord};
use crate::pipeline::prescription_ocr::digitize_prescription;

/// Largest accepted prescription photo (10 MB).
pub const MAX_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const ALLOWED_IMAGE_TYPES: &[&str] =
    &["image/jpeg", "image/png", "image/webp", "image/heic", "image/heif"];

// ═══════════════════════════════════════════════════════════
// Upload parsing
// ═══════════════════════════════════════════════════════════

struct PrescriptionUpload {
    image: Bytes,
    content_type: String,
    extension: &'static str,
    patient_name: String,
    patient_id: Option<String>,
}

/// Read the multipart form and validate it before any AI or storage call.
async fn read_upload(mut multipart: Multipart) -> Result<PrescriptionUpload, ApiError> {
    let mut file: Option<(Bytes, Option<String>, Option<String>)> = None;
    let mut patient_name = None;
    let mut patient_id = None;

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("file") => {
                let content_type = field.content_type().map(str::to_string);
                let file_name = field.file_name().map(str::to_string);
                file = Some((field.bytes().await?, content_type, file_name));
            }
            Some("patient_name") => patient_name = Some(field.text().await?),
            Some("patient_id") => patient_id = Some(field.text().await?),
            _ => {}
        }
    }

    let (image, declared_type, file_name) =
        file.ok_or_else(|| ApiError::BadRequest("file is required".into()))?;
    let patient_name = patient_name
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::BadRequest("patient_name is required".into()))?;
    let patient_id = patient_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty());

    let content_type = resolve_content_type(declared_type.as_deref(), file_name.as_deref());
    if !ALLOWED_IMAGE_TYPES.contains(&content_type.as_str()) {
        return Err(ApiError::UnsupportedMediaType(format!(
            "Invalid file type '{content_type}'. Allowed: JPEG, PNG, WebP, HEIC."
        )));
    }
    if image.is_empty() {
        return Err(ApiError::BadRequest("Image file is empty".into()));
    }
    if image.len() > MAX_IMAGE_BYTES {
        return Err(ApiError::PayloadTooLarge("File too large. Maximum size is 10MB.".into()));
    }

    Ok(PrescriptionUpload {
        extension: detect_extension(&image, &content_type),
        image,
        content_type,
        patient_name,
        patient_id,
    })
}

/// Declared part type without parameters, falling back to a guess from the
/// file name.
fn resolve_content_type(declared: Option<&str>, file_name: Option<&str>) -> String {
    let declared = declared
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty() && ct != "application/octet-stream");
    match declared {
        Some(ct) => ct,
        None => file_name
            .and_then(|name| mime_guess::from_path(name).first_raw())
            .unwrap_or("application/octet-stream")
            .to_string(),
    }
}

/// Extension from magic bytes, then from the content type.
fn detect_extension(bytes: &[u8], content_type: &str) -> &'static str {
    if bytes.len() >= 3 && bytes[0..3] == [0xFF, 0xD8, 0xFF] {
        "jpg"
    } else if bytes.len() >= 8 && bytes[0..8] == [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A] {
        "png"
    } else if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        "webp"
    } else {
        match content_type {
            "image/png" => "png",
            "image/webp" => "webp",
            "image/heic" => "heic",
            "image/heif" => "heif",
            _ => "jpg",
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Handlers
// ═══════════════════════════════════════════════════════════

/// `POST /api/prescriptions/digitize`: staff only.
///
/// Image upload and OCR run concurrently. A failed upload is logged and the
/// record is stored without an image reference.
pub async fn digitize(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<CallerIdentity>,
    multipart: Multipart,
) -> Result<(StatusCode, Json<DigitizedPrescription>), ApiError> {
    require_staff(&caller)?;
    let upload = read_upload(multipart).await?;

    let (image_url, extraction) = tokio::join!(
        ctx.images
            .upload_image(upload.image.to_vec(), upload.extension, &upload.content_type),
        digitize_prescription(ctx.llm.as_ref(), upload.image.to_vec(), &upload.content_type),
    );
    let image_url = match image_url {
        Ok(url) => Some(url),
        Err(e) => {
            tracing::warn!(error = %e, "Prescription image upload failed, continuing without image");
            None
        }
    };

    let status = PrescriptionStatus::from_ocr_count(extraction.medications.len());
    let record = ctx
        .prescriptions
        .insert_prescription(NewPrescription {
            patient_name: upload.patient_name,
            patient_id: upload.patient_id,
            date: chrono::Utc::now().date_naive().format("%Y-%m-%d").to_string(),
            medications: extraction.medications,
            status,
            image_url,
            created_by: Some(caller.user_id),
        })
        .await?;

    tracing::info!(
        prescription_id = %record.id,
        status = %record.status,
        medications = record.medications.len(),
        "Prescription stored"
    );

    Ok((
        StatusCode::CREATED,
        Json(DigitizedPrescription {
            record,
            extracted_age: extraction.age,
            extracted_gender: extraction.gender,
            notes: extraction.notes,
        }),
    ))
}

/// `GET /api/prescriptions`: staff only, newest first.
pub async fn list(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<CallerIdentity>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<PrescriptionListResponse>, ApiError> {
    require_staff(&caller)?;
    let Query(page) = query?;
    let (limit, offset) = page.resolve()?;
    let page = ctx.prescriptions.list_prescriptions(limit, offset).await?;
    Ok(Json(PrescriptionListResponse {
        prescriptions: page.items,
        total: page.total,
    }))
}

/// `GET /api/prescriptions/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(id): Path<String>,
) -> Result<Json<PrescriptionRecord>, ApiError> {
    ctx.prescriptions
        .get_prescription(&id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound("Prescription not found".into()))
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

/// `PATCH /api/prescriptions/:id/status`: staff only, confirm-only.
pub async fn update_status(
    State(ctx): State<ApiContext>,
    Extension(caller): Extension<CallerIdentity>,
    Path(id): Path<String>,
    payload: Result<Json<StatusUpdateRequest>, JsonRejection>,
) -> Result<Json<PrescriptionRecord>, ApiError> {
    require_staff(&caller)?;
    let Json(request) = payload?;
    let next = PrescriptionStatus::from_str(request.status.trim()).map_err(|_| {
        ApiError::BadRequest(format!(
            "Invalid status '{}'. Allowed: Pending, Digitized, Verified.",
            request.status
        ))
    })?;

    match ctx.prescriptions.update_prescription_status(&id, next).await? {
        StatusChange::Updated(record) => {
            tracing::info!(prescription_id = %id, status = %next, user_id = %caller.user_id, "Prescription status changed");
            Ok(Json(record))
        }
        StatusChange::NotFound => Err(ApiError::NotFound("Prescription not found".into())),
        StatusChange::Rejected { current } => Err(ApiError::Conflict(format!(
            "Cannot move prescription from {current} to {next}"
        ))),
    }
}
