//! Boundary to the external vision model.
//!
//! The rest of the crate talks to the model only through [`VisionClient`],
//! so the orchestrator and suggestion generator can be driven by
//! [`crate::fakes::ScriptedVisionClient`] in tests.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use snapfeedback_state::Subject;

use crate::error::{FeedbackError, Result};

/// Media type assumed when a payload arrives without a data URL prefix.
pub const DEFAULT_MEDIA_TYPE: &str = "image/jpeg";

/// Image types accepted at input. The asset store keeps a file extension
/// for each, so the type survives a reload.
pub const SUPPORTED_MEDIA_TYPES: [&str; 4] = ["image/jpeg", "image/png", "image/webp", "image/gif"];

/// Canonical form of a supported media type; `image/jpg` is read as jpeg.
fn supported_media_type(raw: &str) -> Option<&'static str> {
    let lower = raw.trim().to_ascii_lowercase();
    let wanted = if lower == "image/jpg" { "image/jpeg" } else { lower.as_str() };
    SUPPORTED_MEDIA_TYPES.iter().copied().find(|t| *t == wanted)
}

/// A base64 encoded image plus its media type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodedImage {
    pub media_type: String,
    pub data_base64: String,
}

impl EncodedImage {
    /// Encode raw bytes.
    pub fn from_bytes(media_type: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            media_type: media_type.into(),
            data_base64: BASE64.encode(bytes),
        }
    }

    /// Parse `data:<mime>;base64,<payload>` or a bare base64 payload.
    ///
    /// The payload is decoded once to make sure it is usable; anything that
    /// does not decode is an [`FeedbackError::Input`].
    pub fn from_data_url(input: &str) -> Result<Self> {
        let input = input.trim();
        let (media_type, payload) = match input.strip_prefix("data:") {
            Some(rest) => {
                let (header, payload) = rest.split_once(',').ok_or_else(|| {
                    FeedbackError::Input("data URL is missing its payload".to_string())
                })?;
                let media_type = header.strip_suffix(";base64").ok_or_else(|| {
                    FeedbackError::Input("only base64 data URLs are supported".to_string())
                })?;
                let media_type = supported_media_type(media_type).ok_or_else(|| {
                    FeedbackError::Input(format!(
                        "unsupported media type: {media_type} (expected one of {})",
                        SUPPORTED_MEDIA_TYPES.join(", ")
                    ))
                })?;
                (media_type.to_string(), payload)
            }
            None => (DEFAULT_MEDIA_TYPE.to_string(), input),
        };

        if payload.is_empty() {
            return Err(FeedbackError::Input("image payload is empty".to_string()));
        }
        BASE64
            .decode(payload)
            .map_err(|e| FeedbackError::Input(format!("image is not valid base64: {e}")))?;

        Ok(Self {
            media_type,
            data_base64: payload.to_string(),
        })
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        BASE64
            .decode(&self.data_base64)
            .map_err(|e| FeedbackError::Input(format!("image is not valid base64: {e}")))
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.media_type, self.data_base64)
    }
}

/// What a vision request is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Evaluation,
    Suggestions,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Evaluation => "evaluation",
            RequestKind::Suggestions => "suggestions",
        }
    }
}

/// One call to the vision model. The response shape is always a JSON object.
#[derive(Debug, Clone)]
pub struct VisionRequest {
    pub kind: RequestKind,
    pub subject: Subject,
    pub prompt: String,
    pub context: Option<String>,
    pub images: Vec<EncodedImage>,
    pub max_output_tokens: u32,
}

impl VisionRequest {
    pub fn tag(&self) -> (RequestKind, Subject) {
        (self.kind, self.subject)
    }
}

/// A vision capable model that answers with raw text.
///
/// Implementations report transport, auth and rate-limit failures as
/// [`FeedbackError::Service`]. The returned text is untrusted and must go
/// through [`crate::validation`].
#[async_trait]
pub trait VisionClient: Send + Sync {
    async fn call(&self, request: VisionRequest) -> Result<String>;
}
