pub mod gemini;
pub mod llm;
pub mod normalize;
pub mod orchestrator;
pub mod prescription_ocr;
pub mod prioritization;
pub mod prompt;
pub mod reconcile;
pub mod risk;
pub mod summary;
pub mod transcription;

pub use gemini::GeminiClient;
pub use llm::{LlmClient, LlmError, MediaPart, MockLlmClient};
pub use normalize::NormalizeError;
pub use orchestrator::{TriageAssessment, TriageError, TriageOrchestrator};

use thiserror::Error;

/// Why an agent fell back to its default output.
#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Malformed(#[from] NormalizeError),
}

impl AgentError {
    pub(crate) fn log(&self, step: &'static str) {
        match self {
            Self::Llm(e) => {
                tracing::error!(step, error = %e, "Model call failed, using fallback");
            }
            Self::Malformed(e) => {
                tracing::warn!(step, error = %e.reason, raw = %e.raw, "Model output malformed, using fallback");
            }
        }
    }
}
