use tracing::Instrument;

use super::llm::{LlmClient, MediaPart};
use super::normalize::parse_model_json;
use super::prompt::PRESCRIPTION_OCR_PROMPT;
use super::reconcile::{self, JsonMap};
use crate::models::{Medication, PrescriptionExtraction};

pub const UNPARSEABLE_NOTE: &str =
    "Failed to parse prescription. The image may be unclear or not a valid prescription.";
const NOT_AVAILABLE: &str = "N/A";

/// Read a prescription photo. Never fails: problems are reported in `notes`
/// with an empty medication list.
pub async fn digitize_prescription(
    llm: &dyn LlmClient,
    image: Vec<u8>,
    content_type: &str,
) -> PrescriptionExtraction {
    let span = tracing::info_span!("prescription_ocr", bytes = image.len(), content_type);
    read_prescription(llm, MediaPart::new(content_type, image))
        .instrument(span)
        .await
}

async fn read_prescription(llm: &dyn LlmClient, media: MediaPart) -> PrescriptionExtraction {
    let raw = match llm.generate(PRESCRIPTION_OCR_PROMPT, Some(&media)).await {
        Ok(raw) => raw,
        Err(e) => {
            tracing::error!(error = %e, "Prescription OCR request failed");
            return PrescriptionExtraction::empty_with_note(format!(
                "OCR processing failed: {e}. Please try uploading a clearer image."
            ));
        }
    };

    match parse_model_json(&raw) {
        Ok(map) => {
            let extraction = reconcile_prescription(&map);
            tracing::info!(medications = extraction.medications.len(), "Prescription digitized");
            extraction
        }
        Err(e) => {
            tracing::warn!(error = %e.reason, raw = %e.raw, "Prescription OCR output unparseable");
            PrescriptionExtraction::empty_with_note(UNPARSEABLE_NOTE)
        }
    }
}

pub fn reconcile_prescription(map: &JsonMap) -> PrescriptionExtraction {
    let medications = match reconcile::pick_value(map, &["medications", "Medications"]) {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|m| m.as_object())
            .map(reconcile_medication)
            .collect(),
        _ => Vec::new(),
    };

    PrescriptionExtraction {
        patient_name: reconcile::pick_str(map, &["patient_name", "name", "Patient Name"]),
        age: reconcile::pick_age(map, &["age", "Age"]),
        gender: reconcile::pick_gender(map, &["gender", "sex", "Sex"]),
        medications,
        notes: reconcile::pick_str(map, &["notes", "Notes"]),
    }
}

fn reconcile_medication(map: &JsonMap) -> Medication {
    let field = |keys: &[&str]| {
        reconcile::pick_str(map, keys).unwrap_or_else(|| NOT_AVAILABLE.to_string())
    };
    Medication {
        drug: reconcile::pick_str(map, &["drug", "name"]).unwrap_or_else(|| "Unknown".to_string()),
        dosage: field(&["dosage", "dose"]),
        frequency: field(&["frequency"]),
        duration: field(&["duration"]),
    }
}
