use async_trait::async_trait;
use thiserror::Error;

/// Request sent to the inference capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutpaintingPrompt {
    /// User prompt.
    pub prompt: String,
    /// Source image reference.
    pub image_url: String,
}

/// Retry class of an inference failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferenceErrorKind {
    /// Transient; the job is retried through queue redelivery.
    Recoverable,
    /// Terminal; the job fails and its message is dead-lettered.
    Permanent,
}

/// Inference failure tagged with its retry class.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct InferenceError {
    /// Retry class.
    pub kind: InferenceErrorKind,
    /// Underlying cause.
    pub message: String,
}

impl InferenceError {
    /// Builds a recoverable error.
    #[must_use]
    pub fn recoverable(message: impl Into<String>) -> Self {
        Self {
            kind: InferenceErrorKind::Recoverable,
            message: message.into(),
        }
    }

    /// Builds a permanent error.
    #[must_use]
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: InferenceErrorKind::Permanent,
            message: message.into(),
        }
    }

    /// Builds an error classified from its text.
    #[must_use]
    pub fn classified(message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            kind: classify_error_text(&message),
            message,
        }
    }

    /// Returns whether the failure should be retried.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        self.kind == InferenceErrorKind::Recoverable
    }
}

const RECOVERABLE_PATTERNS: &[&str] = &[
    "connection refused",
    "connection reset",
    "no such host",
    "dns error",
    "timeout",
    "timed out",
    "api returned error: 5",
    "api returned error: 429",
    "api call failed",
];

const PERMANENT_PATTERNS: &[&str] = &[
    "api returned error: 4",
    "request encoding failed",
    "response parsing failed",
    "empty model result",
];

/// Classifies raw transport or HTTP error text.
///
/// Recoverable patterns are matched first so `429` wins over the generic
/// `4xx` rule. Unknown text is permanent.
#[must_use]
pub fn classify_error_text(text: &str) -> InferenceErrorKind {
    let text = text.to_ascii_lowercase();

    if RECOVERABLE_PATTERNS
        .iter()
        .any(|pattern| text.contains(pattern))
    {
        return InferenceErrorKind::Recoverable;
    }

    if PERMANENT_PATTERNS.iter().any(|pattern| text.contains(pattern)) {
        return InferenceErrorKind::Permanent;
    }

    InferenceErrorKind::Permanent
}

/// Inference capability used by the outpainting worker.
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// Sends the prompt and image and returns the model's free-text answer.
    async fn complete(&self, request: &OutpaintingPrompt) -> Result<String, InferenceError>;
}
