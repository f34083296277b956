//! Error taxonomy for SnapFeedback.

use snapfeedback_state::StateError;

use crate::assets::AssetError;

/// Errors produced while checking untrusted model output.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    /// Response was not syntactically valid JSON.
    #[error("response is not valid JSON: {0}")]
    Parse(String),

    /// Response parsed but violated the expected shape.
    #[error("response violates schema at {location}: {reason}")]
    Schema { location: String, reason: String },
}

impl ValidationError {
    pub(crate) fn schema(location: impl Into<String>, reason: impl Into<String>) -> Self {
        ValidationError::Schema {
            location: location.into(),
            reason: reason.into(),
        }
    }
}

/// SnapFeedback errors.
#[derive(Debug, thiserror::Error)]
pub enum FeedbackError {
    /// Malformed or oversized submission input, rejected before any side effect.
    #[error("invalid input: {0}")]
    Input(String),

    /// The vision service could not be reached or failed at transport level.
    #[error("vision service error: {0}")]
    Service(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(#[from] StateError),

    #[error("asset error: {0}")]
    Asset(#[from] AssetError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl FeedbackError {
    pub fn is_parse(&self) -> bool {
        matches!(self, FeedbackError::Validation(ValidationError::Parse(_)))
    }

    pub fn is_schema(&self) -> bool {
        matches!(self, FeedbackError::Validation(ValidationError::Schema { .. }))
    }

    /// Short machine-readable classification, used in structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            FeedbackError::Input(_) => "input",
            FeedbackError::Service(_) => "service",
            FeedbackError::Validation(ValidationError::Parse(_)) => "parse",
            FeedbackError::Validation(ValidationError::Schema { .. }) => "schema",
            FeedbackError::NotFound(_) => "not_found",
            FeedbackError::Storage(_) => "storage",
            FeedbackError::Asset(_) => "asset",
            FeedbackError::Config(_) => "config",
        }
    }
}

/// Result type for SnapFeedback operations.
pub type Result<T> = std::result::Result<T, FeedbackError>;
