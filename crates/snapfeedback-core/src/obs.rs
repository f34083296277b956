//! Structured lifecycle events for submissions.
//!
//! Every event is a single `info!`/`warn!` line with an `event` field so that
//! JSON log pipelines can filter on it:
//!
//! - `submission.created`
//! - `evaluation.completed` / `evaluation.failed`
//! - `suggestions.scheduled` / `suggestions.finished`

use snapfeedback_state::Subject;
use tracing::{info, warn};

/// RAII guard that enters a submission-scoped span.
///
/// ```ignore
/// let _span = SubmissionSpan::enter(&submission.id);
/// // every event below carries submission_id
/// ```
pub struct SubmissionSpan {
    _span: tracing::span::EnteredSpan,
}

impl SubmissionSpan {
    pub fn enter(submission_id: &str) -> Self {
        let span = tracing::info_span!("snapfeedback.submission", submission_id = %submission_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_submission_created(submission_id: &str, playground_images: usize, toy_images: usize) {
    info!(
        event = "submission.created",
        submission_id = %submission_id,
        playground_images = playground_images,
        toy_images = toy_images,
    );
}

pub fn emit_evaluation_completed(submission_id: &str, subject: Subject, criteria: usize, total_score: f64) {
    info!(
        event = "evaluation.completed",
        submission_id = %submission_id,
        subject = %subject,
        criteria = criteria,
        total_score = total_score,
    );
}

/// `kind` is the error classification from `FeedbackError::kind`.
pub fn emit_evaluation_failed(submission_id: &str, subject: Subject, kind: &str, error: &dyn std::fmt::Display) {
    warn!(
        event = "evaluation.failed",
        submission_id = %submission_id,
        subject = %subject,
        kind = kind,
        error = %error,
    );
}

pub fn emit_suggestions_scheduled(submission_id: &str, subjects: usize) {
    info!(event = "suggestions.scheduled", submission_id = %submission_id, subjects = subjects);
}

/// Terminal state of a background suggestion run.
pub fn emit_suggestions_finished(submission_id: &str, state: &str, duration_ms: u64) {
    info!(
        event = "suggestions.finished",
        submission_id = %submission_id,
        state = state,
        duration_ms = duration_ms,
    );
}
