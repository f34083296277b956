//! Evaluation orchestration.
//!
//! A submission has two independent subjects. Both are sent to the vision
//! model at the same time and each validated result is written to its own
//! feedback field. What happens when one subject fails is decided by
//! [`FailurePolicy`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use snapfeedback_state::{EvaluationResult, Subject, SubmissionId, SubmissionRecord, SubmissionStore};
use tracing::{debug, instrument, warn};

use crate::error::{FeedbackError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::prompts;
use crate::validation::validate_evaluation;
use crate::vision::{EncodedImage, RequestKind, VisionClient, VisionRequest};

pub const DEFAULT_MAX_OUTPUT_TOKENS: u32 = 1500;

/// How a failure in one subject affects the other.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Each subject is validated and stored on its own. Failures are logged
    /// and reported, never surfaced as an error.
    #[default]
    Isolated,
    /// Nothing is stored unless both subjects validate. The first failure is
    /// returned to the caller. Validated results are then written playground
    /// first; a failed toy write leaves the playground field stored.
    AllOrNothing,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::Isolated => "isolated",
            FailurePolicy::AllOrNothing => "all_or_nothing",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailurePolicy {
    type Err = FeedbackError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "isolated" => Ok(FailurePolicy::Isolated),
            "all_or_nothing" | "all-or-nothing" => Ok(FailurePolicy::AllOrNothing),
            other => Err(FeedbackError::Config(format!(
                "unknown failure policy {other:?} (expected isolated or all_or_nothing)"
            ))),
        }
    }
}

/// What happened to one subject of a submission.
#[derive(Debug, Clone, PartialEq)]
pub enum SubjectOutcome {
    Stored { criteria: usize, total_score: f64 },
    Failed { kind: &'static str, message: String },
}

impl SubjectOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, SubjectOutcome::Stored { .. })
    }

    fn failed(err: &FeedbackError) -> Self {
        SubjectOutcome::Failed {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

/// Result of evaluating both subjects of a submission.
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    /// The submission as stored after both evaluations resolved.
    pub submission: SubmissionRecord,
    pub playground: SubjectOutcome,
    pub toy: SubjectOutcome,
}

impl EvaluationReport {
    pub fn outcome(&self, subject: Subject) -> &SubjectOutcome {
        match subject {
            Subject::Playground => &self.playground,
            Subject::Toy => &self.toy,
        }
    }

    pub fn any_stored(&self) -> bool {
        self.playground.is_stored() || self.toy.is_stored()
    }
}

/// Dispatches evaluation requests and persists validated results.
#[derive(Clone)]
pub struct EvaluationOrchestrator {
    client: Arc<dyn VisionClient>,
    submissions: Arc<dyn SubmissionStore>,
    max_output_tokens: u32,
}

impl EvaluationOrchestrator {
    pub fn new(client: Arc<dyn VisionClient>, submissions: Arc<dyn SubmissionStore>) -> Self {
        Self {
            client,
            submissions,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// Evaluate one subject: one model call carrying every image, then
    /// strict validation. Nothing is persisted.
    #[instrument(skip(self, images, context), fields(subject = %subject, images = images.len()))]
    pub async fn evaluate_subject(
        &self,
        subject: Subject,
        images: &[EncodedImage],
        context: Option<&str>,
    ) -> Result<EvaluationResult> {
        if images.is_empty() {
            return Err(FeedbackError::Input(format!("no {subject} images to evaluate")));
        }

        let request = VisionRequest {
            kind: RequestKind::Evaluation,
            subject,
            prompt: prompts::evaluation_prompt(subject),
            context: context.map(str::to_string),
            images: images.to_vec(),
            max_output_tokens: self.max_output_tokens,
        };
        let raw = self.client.call(request).await?;
        debug!(bytes = raw.len(), "validating evaluation response");

        Ok(validate_evaluation(&raw)?)
    }

    /// Evaluate both subjects of an existing submission concurrently and
    /// persist the results according to `policy`.
    ///
    /// Returns once both subjects have resolved. Under
    /// [`FailurePolicy::Isolated`] this only fails when the submission can no
    /// longer be read back.
    #[instrument(
        skip(self, playground, toy, context),
        fields(submission_id = %submission_id, policy = %policy)
    )]
    pub async fn evaluate_submission(
        &self,
        submission_id: &SubmissionId,
        playground: &[EncodedImage],
        toy: &[EncodedImage],
        context: Option<&str>,
        policy: FailurePolicy,
    ) -> Result<EvaluationReport> {
        let (playground_outcome, toy_outcome) = match policy {
            FailurePolicy::Isolated => {
                let (p, t) = tokio::join!(
                    self.evaluate_and_store(submission_id, Subject::Playground, playground, context),
                    self.evaluate_and_store(submission_id, Subject::Toy, toy, context),
                );
                (p, t)
            }
            FailurePolicy::AllOrNothing => {
                let (p, t) = tokio::join!(
                    self.evaluate_subject(Subject::Playground, playground, context),
                    self.evaluate_subject(Subject::Toy, toy, context),
                );
                let (p, t) = match (p, t) {
                    (Ok(p), Ok(t)) => (p, t),
                    (Err(err), t) => {
                        record_failure(submission_id, Subject::Playground, &err);
                        if let Err(toy_err) = &t {
                            record_failure(submission_id, Subject::Toy, toy_err);
                        }
                        return Err(err);
                    }
                    (Ok(_), Err(err)) => {
                        record_failure(submission_id, Subject::Toy, &err);
                        return Err(err);
                    }
                };

                self.store_in_order(submission_id, p, t).await?
            }
        };

        let submission = self
            .submissions
            .get(submission_id)
            .await?
            .ok_or_else(|| FeedbackError::NotFound(format!("submission {submission_id}")))?;

        Ok(EvaluationReport {
            submission,
            playground: playground_outcome,
            toy: toy_outcome,
        })
    }

    /// Isolated path for one subject: any failure becomes an outcome.
    async fn evaluate_and_store(
        &self,
        submission_id: &SubmissionId,
        subject: Subject,
        images: &[EncodedImage],
        context: Option<&str>,
    ) -> SubjectOutcome {
        let result = match self.evaluate_subject(subject, images, context).await {
            Ok(evaluation) => self.store(submission_id, subject, evaluation).await,
            Err(err) => Err(err),
        };
        match result {
            Ok(outcome) => outcome,
            Err(err) => {
                record_failure(submission_id, subject, &err);
                SubjectOutcome::failed(&err)
            }
        }
    }

    /// All-or-nothing persistence: playground first, then toy.
    ///
    /// The store has no multi-field write, so a toy write failing after the
    /// playground write leaves playground feedback persisted. That case is
    /// logged as a partial write and returned as the toy error.
    async fn store_in_order(
        &self,
        submission_id: &SubmissionId,
        playground: EvaluationResult,
        toy: EvaluationResult,
    ) -> Result<(SubjectOutcome, SubjectOutcome)> {
        let playground = self
            .store(submission_id, Subject::Playground, playground)
            .await
            .inspect_err(|err| record_failure(submission_id, Subject::Playground, err))?;

        match self.store(submission_id, Subject::Toy, toy).await {
            Ok(toy) => Ok((playground, toy)),
            Err(err) => {
                record_failure(submission_id, Subject::Toy, &err);
                warn!(
                    submission_id = %submission_id,
                    persisted = %Subject::Playground,
                    "partial write: toy feedback failed after playground was stored"
                );
                Err(err)
            }
        }
    }

    /// Write one feedback field. Only that field and `updated_at` change.
    async fn store(
        &self,
        submission_id: &SubmissionId,
        subject: Subject,
        evaluation: EvaluationResult,
    ) -> Result<SubjectOutcome> {
        let criteria = evaluation.len();
        let total_score = evaluation.total_score();

        self.submissions
            .update_feedback(submission_id, subject, evaluation)
            .await?
            .ok_or_else(|| FeedbackError::NotFound(format!("submission {submission_id}")))?;

        obs::emit_evaluation_completed(submission_id.as_str(), subject, criteria, total_score);
        METRICS.inc_evaluations_succeeded();
        Ok(SubjectOutcome::Stored {
            criteria,
            total_score,
        })
    }
}

fn record_failure(submission_id: &SubmissionId, subject: Subject, err: &FeedbackError) {
    obs::emit_evaluation_failed(submission_id.as_str(), subject, err.kind(), err);
    METRICS.inc_evaluations_failed();
}
