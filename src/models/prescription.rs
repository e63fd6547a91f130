use serde::{Deserialize, Serialize};

use super::enums::{Gender, PrescriptionStatus};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Medication {
    pub drug: String,
    pub dosage: String,
    pub frequency: String,
    pub duration: String,
}

/// Output of the prescription OCR agent. Never an error: failures surface
/// as an empty medication list with an explanatory note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionExtraction {
    pub patient_name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub medications: Vec<Medication>,
    pub notes: Option<String>,
}

impl PrescriptionExtraction {
    pub fn empty_with_note(note: impl Into<String>) -> Self {
        Self {
            patient_name: None,
            age: None,
            gender: None,
            medications: Vec::new(),
            notes: Some(note.into()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPrescription {
    pub patient_name: String,
    pub patient_id: Option<String>,
    pub date: String,
    pub medications: Vec<Medication>,
    pub status: PrescriptionStatus,
    pub image_url: Option<String>,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrescriptionRecord {
    pub id: String,
    pub patient_name: String,
    pub patient_id: Option<String>,
    pub date: String,
    pub medications: Vec<Medication>,
    pub status: PrescriptionStatus,
    pub image_url: Option<String>,
    pub created_by: Option<String>,
    pub created_at: Option<String>,
}

/// Response of the digitize endpoint: stored record plus OCR extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DigitizedPrescription {
    #[serde(flatten)]
    pub record: PrescriptionRecord,
    pub extracted_age: Option<u32>,
    pub extracted_gender: Option<Gender>,
    pub notes: Option<String>,
}
