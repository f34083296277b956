//! SnapFeedback-State: SurrealDB Backend for SnapFeedback
//!
//! This crate provides the persistence layer for submissions and their
//! improvement suggestions. It handles all I/O with SurrealDB behind two
//! async traits so the orchestration core can run against in-memory fakes.
//!
//! ## Key Components
//!
//! - `SurrealStore`: Manages the connection and implements both stores
//! - `SubmissionRecord`: Root document (image refs, context, evaluations)
//! - `SuggestionRecord`: Suggestion set addressed by submission identity

mod error;
pub mod fakes;
mod handle;
pub mod migrations;
mod schema;
pub mod storage_traits;

pub use error::StateError;
pub use handle::{StoreConfig, SurrealStore};
pub use schema::{
    CriterionScore, EvaluationResult, InvalidScore, NewSubmission, Score, Subject, SubmissionId,
    SubmissionRecord, SuggestionMap, SuggestionPatch, SuggestionRecord, SuggestionSetId,
};
pub use storage_traits::{StorageResult, SubmissionStore, SuggestionStore};

/// Result type for snapfeedback-state operations
pub type Result<T> = std::result::Result<T, StateError>;
