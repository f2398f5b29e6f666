//! Text-generation backend abstraction and the Gemini client.
//!
//! The pipeline only sees [`GenerationBackend`]: one prompt in, one text out, no state across calls.

mod gemini;

pub use gemini::{GeminiClient, GenerateContentResponse};

use async_trait::async_trait;

/// Failure of one generation call. Scoped to the request that caused it.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("prompt is empty")]
    EmptyPrompt,
    #[error("generation credential is empty")]
    MissingCredential,
    #[error("generation request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("generation api error: {status} {body}")]
    Api { status: u16, body: String },
    #[error("generation returned no text{}", reason_suffix(.reason))]
    EmptyResponse { reason: Option<String> },
}

fn reason_suffix(reason: &Option<String>) -> String {
    reason.as_deref().map(|r| format!(" ({r})")).unwrap_or_default()
}

/// A remote text-generation service.
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate a response for `prompt`, authenticating with `credential`.
    async fn generate(&self, credential: &str, prompt: &str) -> Result<String, GenerationError>;
}
