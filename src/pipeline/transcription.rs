use serde::{Deserialize, Serialize};

use super::llm::{LlmClient, LlmError, MediaPart};
use super::normalize::parse_model_json;
use super::prompt::{EXTRACTION_PROMPT, TRANSCRIPTION_PROMPT};
use super::reconcile;
use crate::models::enums::Gender;

pub const DEFAULT_AUDIO_MIME: &str = "audio/wav";
pub const NO_SPEECH_MESSAGE: &str = "No audible speech detected. Please speak clearly and try again.";
pub const QUOTA_MESSAGE: &str =
    "AI Quota Exceeded. Please wait a few minutes or try again later today.";
const NO_SPEECH_MARKER: &str = "no audible speech";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TranscriptionMode {
    Plain,
    #[default]
    Extract,
}

/// Structured intake pre-filled from speech. Everything but the raw text may be absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeDraft {
    pub name: Option<String>,
    pub age: Option<u32>,
    pub gender: Option<Gender>,
    pub symptoms: Option<String>,
    pub raw_transcription: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptionOutcome {
    Transcribed(String),
    Extracted(IntakeDraft),
    NoSpeech,
    QuotaExceeded,
    Failed(String),
}

impl TranscriptionOutcome {
    pub fn status(&self) -> &'static str {
        match self {
            Self::Transcribed(_) => "transcribed",
            Self::Extracted(_) => "extracted",
            Self::NoSpeech => "no_speech",
            Self::QuotaExceeded => "quota_exceeded",
            Self::Failed(_) => "failed",
        }
    }

    /// User-facing text: the transcription itself or a soft message.
    pub fn message(&self) -> String {
        match self {
            Self::Transcribed(text) => text.clone(),
            Self::Extracted(draft) => draft.raw_transcription.clone(),
            Self::NoSpeech => NO_SPEECH_MESSAGE.to_string(),
            Self::QuotaExceeded => QUOTA_MESSAGE.to_string(),
            Self::Failed(error) => format!("Transcription failed: {error}"),
        }
    }
}

/// Drop codec parameters (`audio/webm;codecs=opus` → `audio/webm`).
pub fn normalize_mime_type(content_type: Option<&str>) -> String {
    let base = content_type
        .and_then(|ct| ct.split(';').next())
        .map(str::trim)
        .unwrap_or("");
    if base.is_empty() {
        DEFAULT_AUDIO_MIME.to_string()
    } else {
        base.to_ascii_lowercase()
    }
}

fn is_no_speech(text: &str) -> bool {
    text.trim().is_empty() || text.to_lowercase().contains(NO_SPEECH_MARKER)
}

fn classify_error(error: &LlmError) -> TranscriptionOutcome {
    if error.is_quota() {
        tracing::warn!(error = %error, "Transcription quota exceeded");
        TranscriptionOutcome::QuotaExceeded
    } else {
        tracing::error!(error = %error, "Transcription failed");
        TranscriptionOutcome::Failed(error.to_string())
    }
}

pub async fn transcribe(
    llm: &dyn LlmClient,
    audio: Vec<u8>,
    content_type: Option<&str>,
    mode: TranscriptionMode,
) -> TranscriptionOutcome {
    let media = MediaPart::new(normalize_mime_type(content_type), audio);
    let prompt = match mode {
        TranscriptionMode::Plain => TRANSCRIPTION_PROMPT,
        TranscriptionMode::Extract => EXTRACTION_PROMPT,
    };
    tracing::info!(mime = %media.mime_type, bytes = media.data.len(), ?mode, "Transcribing audio");

    let text = match llm.generate(prompt, Some(&media)).await {
        Ok(text) => text,
        Err(e) => return classify_error(&e),
    };
    let text = text.trim();
    if is_no_speech(text) {
        tracing::warn!("No speech detected in audio");
        return TranscriptionOutcome::NoSpeech;
    }

    match mode {
        TranscriptionMode::Plain => TranscriptionOutcome::Transcribed(text.to_string()),
        TranscriptionMode::Extract => TranscriptionOutcome::Extracted(extract_draft(text)),
    }
}

/// Parse the extraction JSON. On failure the whole response becomes the symptoms.
pub fn extract_draft(text: &str) -> IntakeDraft {
    match parse_model_json(text) {
        Ok(map) => {
            let raw_transcription = reconcile::pick_str(&map, &["raw_transcription", "transcription"])
                .unwrap_or_else(|| text.to_string());
            IntakeDraft {
                name: reconcile::pick_str(&map, &["name", "patient_name"]),
                age: reconcile::pick_age(&map, &["age", "Age"]),
                gender: reconcile::pick_gender(&map, &["gender", "sex"]),
                symptoms: reconcile::pick_str(&map, &["symptoms"]),
                raw_transcription,
            }
        }
        Err(e) => {
            tracing::warn!(error = %e.reason, raw = %e.raw, "Extraction output unparseable, keeping raw transcription");
            IntakeDraft {
                name: None,
                age: None,
                gender: None,
                symptoms: Some(text.to_string()),
                raw_transcription: text.to_string(),
            }
        }
    }
}
