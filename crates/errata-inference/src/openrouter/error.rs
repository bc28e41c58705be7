//! OpenRouter error classification.

use errata_core::Error;

/// Coarse class of a failed OpenRouter call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenRouterErrorCode {
    /// Missing or invalid API key.
    AuthenticationError,
    /// Account has no credits left.
    InsufficientCredits,
    /// Rate limit exceeded.
    RateLimitExceeded,
    /// Model not found or not available.
    ModelNotFound,
    /// Prompt plus images exceed the model's context.
    ContextLengthExceeded,
    /// Upstream provider failure.
    ServerError,
    Unknown,
}

impl OpenRouterErrorCode {
    /// Determine error code from HTTP status and error type.
    pub fn from_response(status: u16, error_type: &str) -> Self {
        match (status, error_type) {
            (401, _) | (403, _) => Self::AuthenticationError,
            (402, _) => Self::InsufficientCredits,
            (429, _) => Self::RateLimitExceeded,
            (404, _) | (_, "model_not_found") => Self::ModelNotFound,
            (400, _) if error_type.contains("context_length") => Self::ContextLengthExceeded,
            (500..=599, _) => Self::ServerError,
            _ => Self::Unknown,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimitExceeded | Self::ServerError)
    }
}

/// Convert a classified failure into an inference error carrying the upstream message.
pub fn to_errata_error(code: OpenRouterErrorCode, status: u16, message: &str) -> Error {
    let detail = match code {
        OpenRouterErrorCode::AuthenticationError => format!("Authentication failed: {}", message),
        OpenRouterErrorCode::InsufficientCredits => format!("Insufficient credits: {}", message),
        OpenRouterErrorCode::RateLimitExceeded => format!("Rate limit exceeded: {}", message),
        OpenRouterErrorCode::ModelNotFound => format!("Model not found: {}", message),
        OpenRouterErrorCode::ContextLengthExceeded => format!("Context too long: {}", message),
        OpenRouterErrorCode::ServerError => format!("Server error: {}", message),
        OpenRouterErrorCode::Unknown => message.to_string(),
    };
    Error::Inference(format!("OpenRouter returned {}: {}", status, detail))
}
