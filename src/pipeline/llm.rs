use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("Cannot connect to model endpoint at {0}")]
    Connection(String),

    #[error("Model request timed out after {0}s")]
    Timeout(u64),

    #[error("Model API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),

    #[error("Unexpected model response shape: {0}")]
    ResponseParsing(String),
}

impl LlmError {
    /// Rate limit or exhausted quota on the provider side.
    pub fn is_quota(&self) -> bool {
        if let Self::Api { status: 429, .. } = self {
            return true;
        }
        let text = self.to_string().to_lowercase();
        text.contains("429") || text.contains("quota")
    }
}

/// Inline binary attachment (audio, image) sent alongside a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaPart {
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl MediaPart {
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }
}

/// Generative model: prompt plus optional media in, text out.
#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn generate(&self, prompt: &str, media: Option<&MediaPart>) -> Result<String, LlmError>;
}

enum MockReply {
    Text(String),
    Error(LlmError),
}

impl MockReply {
    fn produce(&self) -> Result<String, LlmError> {
        match self {
            Self::Text(t) => Ok(t.clone()),
            Self::Error(e) => Err(e.clone()),
        }
    }
}

/// Scriptable client for tests and offline runs.
///
/// Routes are matched in insertion order against the prompt text; the first
/// route whose marker is contained in the prompt answers. Unmatched prompts
/// get the default reply.
pub struct MockLlmClient {
    default: MockReply,
    routes: Vec<(String, MockReply)>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl MockLlmClient {
    pub fn new(response: &str) -> Self {
        Self {
            default: MockReply::Text(response.to_string()),
            routes: Vec::new(),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Every call fails with a connection error.
    pub fn failing(message: &str) -> Self {
        Self {
            default: MockReply::Error(LlmError::Connection(message.to_string())),
            ..Self::new("")
        }
    }

    pub fn quota_exceeded() -> Self {
        Self {
            default: MockReply::Error(LlmError::Api {
                status: 429,
                body: "RESOURCE_EXHAUSTED: quota exceeded".to_string(),
            }),
            ..Self::new("")
        }
    }

    pub fn route(mut self, marker: &str, response: &str) -> Self {
        self.routes
            .push((marker.to_string(), MockReply::Text(response.to_string())));
        self
    }

    pub fn route_error(mut self, marker: &str, error: LlmError) -> Self {
        self.routes.push((marker.to_string(), MockReply::Error(error)));
        self
    }

    /// Sleep before answering, for timeout tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn generate(&self, prompt: &str, _media: Option<&MediaPart>) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.routes
            .iter()
            .find(|(marker, _)| prompt.contains(marker.as_str()))
            .map(|(_, reply)| reply)
            .unwrap_or(&self.default)
            .produce()
    }
}
