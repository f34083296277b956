//! Environment configuration.
//!
//! | Variable | Default |
//! |---|---|
//! | `OPENAI_API_KEY` | required |
//! | `OPENAI_MODEL` | `gpt-4.1-mini` |
//! | `OPENAI_BASE_URL` | `https://api.openai.com/v1` |
//! | `MAX_ACTIVITY_DESCRIPTION_LENGTH` | `240` |
//! | `MAX_OUTPUT_TOKENS` | `1500` |
//! | `UPLOAD_DIR` | `uploaded_images` |
//! | `FRONTEND_ORIGIN` | `http://localhost:3000` |
//! | `SINGLE_IMAGE_FAILURE_POLICY` | `isolated` |
//!
//! Database variables are read by `snapfeedback_state::StoreConfig::from_env`.

use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{FeedbackError, Result};
use crate::openai::{OpenAiConfig, DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::orchestrator::{FailurePolicy, DEFAULT_MAX_OUTPUT_TOKENS};
use crate::service::ServiceConfig;

pub const DEFAULT_MAX_ACTIVITY_DESCRIPTION_LENGTH: usize = 240;
pub const DEFAULT_UPLOAD_DIR: &str = "uploaded_images";
pub const DEFAULT_FRONTEND_ORIGIN: &str = "http://localhost:3000";

#[derive(Debug, Clone)]
pub struct Settings {
    pub openai: OpenAiConfig,
    pub max_activity_description_length: usize,
    pub max_output_tokens: u32,
    pub upload_dir: PathBuf,
    pub frontend_origin: String,
    pub single_image_failure_policy: FailurePolicy,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_key = get("OPENAI_API_KEY")
            .ok_or_else(|| FeedbackError::Config("OPENAI_API_KEY is not set".to_string()))?;
        let openai = OpenAiConfig::new(api_key)
            .with_model(get("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()))
            .with_base_url(get("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()));

        Ok(Self {
            openai,
            max_activity_description_length: parse_or(
                "MAX_ACTIVITY_DESCRIPTION_LENGTH",
                get("MAX_ACTIVITY_DESCRIPTION_LENGTH"),
                DEFAULT_MAX_ACTIVITY_DESCRIPTION_LENGTH,
            )?,
            max_output_tokens: parse_or(
                "MAX_OUTPUT_TOKENS",
                get("MAX_OUTPUT_TOKENS"),
                DEFAULT_MAX_OUTPUT_TOKENS,
            )?,
            upload_dir: get("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_UPLOAD_DIR)),
            frontend_origin: get("FRONTEND_ORIGIN")
                .unwrap_or_else(|| DEFAULT_FRONTEND_ORIGIN.to_string()),
            single_image_failure_policy: match get("SINGLE_IMAGE_FAILURE_POLICY") {
                Some(value) => value.parse()?,
                None => FailurePolicy::default(),
            },
        })
    }

    pub fn service_config(&self) -> ServiceConfig {
        ServiceConfig {
            max_activity_description_length: self.max_activity_description_length,
            max_output_tokens: self.max_output_tokens,
            single_image_policy: self.single_image_failure_policy,
            ..ServiceConfig::default()
        }
    }
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| FeedbackError::Config(format!("{key}={raw:?} is invalid: {e}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_key_is_set() {
        let s = settings(&[("OPENAI_API_KEY", "sk-test")]).unwrap();

        assert_eq!(s.openai.api_key, "sk-test");
        assert_eq!(s.openai.model, "gpt-4.1-mini");
        assert_eq!(s.openai.base_url, "https://api.openai.com/v1");
        assert_eq!(s.max_activity_description_length, 240);
        assert_eq!(s.max_output_tokens, 1500);
        assert_eq!(s.upload_dir, PathBuf::from("uploaded_images"));
        assert_eq!(s.frontend_origin, "http://localhost:3000");
        assert_eq!(s.single_image_failure_policy, FailurePolicy::Isolated);
    }

    #[test]
    fn missing_api_key_is_config_error() {
        assert!(matches!(settings(&[]), Err(FeedbackError::Config(_))));
        assert!(matches!(
            settings(&[("OPENAI_API_KEY", "  ")]),
            Err(FeedbackError::Config(_))
        ));
    }

    #[test]
    fn overrides_are_read() {
        let s = settings(&[
            ("OPENAI_API_KEY", "sk-test"),
            ("OPENAI_MODEL", "gpt-4o"),
            ("OPENAI_BASE_URL", "http://localhost:8080/v1/"),
            ("MAX_ACTIVITY_DESCRIPTION_LENGTH", "100"),
            ("MAX_OUTPUT_TOKENS", "800"),
            ("UPLOAD_DIR", "/var/lib/snapfeedback/images"),
            ("FRONTEND_ORIGIN", "https://app.example.com"),
            ("SINGLE_IMAGE_FAILURE_POLICY", "all_or_nothing"),
        ])
        .unwrap();

        assert_eq!(s.openai.model, "gpt-4o");
        assert_eq!(s.openai.base_url, "http://localhost:8080/v1");
        assert_eq!(s.max_activity_description_length, 100);
        assert_eq!(s.max_output_tokens, 800);
        assert_eq!(s.frontend_origin, "https://app.example.com");
        assert_eq!(s.single_image_failure_policy, FailurePolicy::AllOrNothing);

        let service = s.service_config();
        assert_eq!(service.max_activity_description_length, 100);
        assert_eq!(service.single_image_policy, FailurePolicy::AllOrNothing);
        assert_eq!(service.multi_image_policy, FailurePolicy::Isolated);
    }

    #[test]
    fn malformed_numbers_are_config_errors() {
        let err = settings(&[("OPENAI_API_KEY", "k"), ("MAX_OUTPUT_TOKENS", "lots")]).unwrap_err();
        assert!(err.to_string().contains("MAX_OUTPUT_TOKENS"));
    }
}
