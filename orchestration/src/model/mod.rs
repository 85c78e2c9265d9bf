//! Judge/model service abstraction.
//!
//! The orchestrator talks to exactly one external operation,
//! `complete(prompt) -> text`. Every caller parses structured output out of
//! free text and downgrades malformed or missing structure to a neutral
//! result instead of failing.

pub mod json;
pub mod scripted;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use json::{extract_json, parse_json};
pub use scripted::ScriptedModel;

/// Errors from a model completion.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Network or transport failure reaching the backend.
    #[error("Model request failed: {0}")]
    Request(String),

    /// Backend answered with a non-success status.
    #[error("Model backend returned {status}: {body}")]
    Status { status: u16, body: String },

    /// The call exceeded the caller's deadline.
    #[error("Model call timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered without any completion text.
    #[error("Model returned an empty completion")]
    EmptyResponse,

    /// Response envelope could not be decoded.
    #[error("Model response parse error: {0}")]
    Parse(String),

    #[error("Model error: {0}")]
    Other(#[from] anyhow::Error),
}

impl ModelError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Request(_) | Self::Timeout(_) => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::EmptyResponse | Self::Parse(_) | Self::Other(_) => false,
        }
    }
}

/// Result type for model operations
pub type ModelResult<T> = Result<T, ModelError>;

/// A text-completion backend used for every judgment and for reply
/// composition.
#[async_trait]
pub trait ModelService: Send + Sync {
    /// Complete a single prompt.
    async fn complete(&self, prompt: &str) -> ModelResult<String>;
}

/// Shared reference to a model service
pub type SharedModel = Arc<dyn ModelService>;

/// Run a completion under a deadline. Expiry surfaces as
/// [`ModelError::Timeout`] so callers apply their usual fail-soft default.
pub async fn complete_within(
    model: &dyn ModelService,
    prompt: &str,
    timeout: Duration,
) -> ModelResult<String> {
    match tokio::time::timeout(timeout, model.complete(prompt)).await {
        Ok(result) => result,
        Err(_) => Err(ModelError::Timeout(timeout)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ModelError::Request("connection reset".into()).is_transient());
        assert!(ModelError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(ModelError::Status {
            status: 503,
            body: String::new()
        }
        .is_transient());
        assert!(!ModelError::Status {
            status: 400,
            body: String::new()
        }
        .is_transient());
        assert!(!ModelError::EmptyResponse.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn test_complete_within_times_out() {
        let model = ScriptedModel::new().stall("slow judge");
        let err = complete_within(&model, "slow judge prompt", Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_complete_within_passes_result() {
        let model = ScriptedModel::new().respond("hello", "world");
        let text = complete_within(&model, "hello there", Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(text, "world");
    }
}
