//! SnapFeedback core library
//!
//! Evaluates playground and toy images against fixed rubrics using a vision
//! model, stores validated results, and derives improvement suggestions in
//! the background.

pub mod assets;
pub mod config;
pub mod error;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod openai;
pub mod orchestrator;
pub mod prompts;
pub mod service;
pub mod suggestions;
pub mod telemetry;
pub mod validation;
pub mod vision;

pub use assets::{AssetError, AssetRef, AssetStore, FsAssetStore};
pub use config::Settings;
pub use error::{FeedbackError, Result, ValidationError};
pub use openai::{OpenAiConfig, OpenAiVisionClient};
pub use orchestrator::{EvaluationOrchestrator, EvaluationReport, FailurePolicy, SubjectOutcome};
pub use service::{
    FeedbackService, MultiSubmission, ServiceConfig, SingleSubmission, SubmissionOutcome,
};
pub use suggestions::{SubjectMaterial, SuggestionGenerator, SuggestionJob, SuggestionRunState};
pub use telemetry::init_tracing;
pub use validation::{parse_suggestions, validate_evaluation};
pub use vision::{EncodedImage, RequestKind, VisionClient, VisionRequest};

pub use snapfeedback_state::{
    CriterionScore, EvaluationResult, Score, Subject, SubmissionId, SubmissionRecord,
    SuggestionMap, SuggestionRecord,
};
