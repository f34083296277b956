//! Storage trait definitions for SnapFeedback
//!
//! These traits define the persistence seams used by the orchestration core:
//! - `SubmissionStore`: Submission drafts and per-subject evaluation updates
//! - `SuggestionStore`: Improvement suggestion sets keyed by submission
//!
//! All traits are async and backend-agnostic. In-memory fakes are provided
//! for testing via the `fakes` module.

use async_trait::async_trait;

use crate::error::StateError;
use crate::schema::{
    EvaluationResult, NewSubmission, Subject, SubmissionId, SubmissionRecord, SuggestionPatch,
    SuggestionRecord,
};

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StateError>;

/// Submission document store.
///
/// Guarantees:
/// - `create` persists the whole draft atomically and assigns its identity.
/// - `update_feedback` writes exactly one evaluation field plus `updated_at`;
///   the rest of the document is never rewritten. Updates for different
///   subjects touch disjoint fields and may run concurrently.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Create a new submission draft with both evaluations unset.
    async fn create(&self, submission: NewSubmission) -> StorageResult<SubmissionRecord>;

    /// Retrieve a submission by ID.
    async fn get(&self, id: &SubmissionId) -> StorageResult<Option<SubmissionRecord>>;

    /// Set one subject's evaluation. Returns `None` if no submission matches.
    async fn update_feedback(
        &self,
        id: &SubmissionId,
        subject: Subject,
        result: EvaluationResult,
    ) -> StorageResult<Option<SubmissionRecord>>;
}

/// Improvement suggestion store.
///
/// Semantics:
/// - At most one suggestion set exists per submission.
/// - `upsert_by_submission` creates the set on first use; afterwards it
///   replaces the subjects present in the patch and keeps the set identity.
#[async_trait]
pub trait SuggestionStore: Send + Sync {
    /// Get the suggestion set for a submission, if any.
    async fn get_by_submission(&self, id: &SubmissionId)
        -> StorageResult<Option<SuggestionRecord>>;

    /// Create or update the suggestion set for a submission.
    async fn upsert_by_submission(
        &self,
        id: &SubmissionId,
        patch: SuggestionPatch,
    ) -> StorageResult<SuggestionRecord>;
}
