//! Improvement suggestions derived from stored evaluations.
//!
//! Runs after both evaluations of a submission have resolved, detached from
//! the request that created it. A run moves through
//! `NotRequested -> Running -> {Stored, Failed}` and its outcome is only
//! ever logged; the caller has already received its response.

use std::sync::Arc;
use std::time::Instant;

use snapfeedback_state::{
    EvaluationResult, Subject, SubmissionId, SuggestionMap, SuggestionPatch, SuggestionRecord,
    SuggestionStore,
};
use tokio::task::JoinHandle;
use tracing::{debug, info_span, instrument, warn, Instrument};

use crate::error::{FeedbackError, Result};
use crate::metrics::METRICS;
use crate::obs;
use crate::orchestrator::DEFAULT_MAX_OUTPUT_TOKENS;
use crate::prompts;
use crate::validation::parse_suggestions;
use crate::vision::{EncodedImage, RequestKind, VisionClient, VisionRequest};

/// Terminal and intermediate states of one suggestion run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuggestionRunState {
    /// Nothing was eligible, so no run happened.
    NotRequested,
    Running,
    Stored,
    Failed,
}

impl SuggestionRunState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuggestionRunState::NotRequested => "not_requested",
            SuggestionRunState::Running => "running",
            SuggestionRunState::Stored => "stored",
            SuggestionRunState::Failed => "failed",
        }
    }
}

/// A subject's stored evaluation and the images it was made from.
#[derive(Debug, Clone)]
pub struct SubjectMaterial {
    pub evaluation: EvaluationResult,
    pub images: Vec<EncodedImage>,
}

/// Everything one suggestion run needs. A subject without an evaluation is
/// `None` and is skipped.
#[derive(Debug, Clone)]
pub struct SuggestionJob {
    pub submission_id: SubmissionId,
    pub context: Option<String>,
    pub playground: Option<SubjectMaterial>,
    pub toy: Option<SubjectMaterial>,
}

impl SuggestionJob {
    pub fn material(&self, subject: Subject) -> Option<&SubjectMaterial> {
        match subject {
            Subject::Playground => self.playground.as_ref(),
            Subject::Toy => self.toy.as_ref(),
        }
    }

    pub fn eligible_subjects(&self) -> usize {
        Subject::ALL
            .iter()
            .filter(|s| self.material(**s).is_some())
            .count()
    }
}

pub struct SuggestionGenerator {
    client: Arc<dyn VisionClient>,
    suggestions: Arc<dyn SuggestionStore>,
    max_output_tokens: u32,
}

impl SuggestionGenerator {
    pub fn new(client: Arc<dyn VisionClient>, suggestions: Arc<dyn SuggestionStore>) -> Self {
        Self {
            client,
            suggestions,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
        }
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    /// Generate and store suggestions for every eligible subject.
    ///
    /// Subjects run concurrently. Whatever succeeds is upserted in one write,
    /// replacing earlier suggestions for those subjects only. Returns
    /// `Ok(None)` when no subject is eligible, and an error only when every
    /// eligible subject failed.
    #[instrument(skip(self, job), fields(submission_id = %job.submission_id))]
    pub async fn generate(&self, job: &SuggestionJob) -> Result<Option<SuggestionRecord>> {
        if job.eligible_subjects() == 0 {
            debug!("no evaluated subjects, skipping suggestions");
            return Ok(None);
        }

        let (playground, toy) = tokio::join!(
            self.suggest_for(Subject::Playground, job),
            self.suggest_for(Subject::Toy, job),
        );

        let mut patch = SuggestionPatch::default();
        let mut first_error = None;
        for (subject, result) in [(Subject::Playground, playground), (Subject::Toy, toy)] {
            match result {
                None => {}
                Some(Ok(suggestions)) => patch.set(subject, suggestions),
                Some(Err(err)) => {
                    warn!(subject = %subject, kind = err.kind(), error = %err, "suggestions failed for subject");
                    first_error.get_or_insert(err);
                }
            }
        }

        if patch.is_empty() {
            return Err(first_error.unwrap_or_else(|| {
                FeedbackError::Service("no suggestions were produced".to_string())
            }));
        }

        let record = self
            .suggestions
            .upsert_by_submission(&job.submission_id, patch)
            .await?;
        Ok(Some(record))
    }

    /// Run [`generate`](Self::generate) on a detached task.
    ///
    /// The returned handle resolves to the terminal state; dropping it does
    /// not cancel the run. Errors are logged and never propagate.
    pub fn schedule(self: Arc<Self>, job: SuggestionJob) -> JoinHandle<SuggestionRunState> {
        let submission_id = job.submission_id.clone();
        obs::emit_suggestions_scheduled(submission_id.as_str(), job.eligible_subjects());

        let span = info_span!("snapfeedback.suggestions", submission_id = %submission_id);
        tokio::spawn(
            async move {
                let started = Instant::now();
                debug!(state = SuggestionRunState::Running.as_str(), "suggestion run started");

                let state = match self.generate(&job).await {
                    Ok(Some(_)) => {
                        METRICS.inc_suggestion_runs_stored();
                        SuggestionRunState::Stored
                    }
                    Ok(None) => SuggestionRunState::NotRequested,
                    Err(err) => {
                        warn!(kind = err.kind(), error = %err, "suggestion run failed");
                        METRICS.inc_suggestion_runs_failed();
                        SuggestionRunState::Failed
                    }
                };

                obs::emit_suggestions_finished(
                    submission_id.as_str(),
                    state.as_str(),
                    started.elapsed().as_millis() as u64,
                );
                state
            }
            .instrument(span),
        )
    }

    async fn suggest_for(&self, subject: Subject, job: &SuggestionJob) -> Option<Result<SuggestionMap>> {
        let material = job.material(subject)?;
        let request = VisionRequest {
            kind: RequestKind::Suggestions,
            subject,
            prompt: prompts::suggestions_prompt(subject, &material.evaluation),
            context: job.context.clone(),
            images: material.images.clone(),
            max_output_tokens: self.max_output_tokens,
        };

        let result = match self.client.call(request).await {
            Ok(raw) => parse_suggestions(&raw).map_err(FeedbackError::from),
            Err(err) => Err(err),
        };
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedVisionClient;
    use snapfeedback_state::fakes::MemorySuggestionStore;
    use snapfeedback_state::{CriterionScore, Score};

    fn material() -> SubjectMaterial {
        let mut evaluation = EvaluationResult::new();
        evaluation.insert(
            "Purpose",
            CriterionScore {
                score: Score::Half,
                what_went_well: "Materials out".to_string(),
                what_could_be_improved: "Goal unclear".to_string(),
            },
        );
        SubjectMaterial {
            evaluation,
            images: vec![EncodedImage::from_bytes("image/jpeg", b"toy")],
        }
    }

    fn job(playground: bool, toy: bool) -> SuggestionJob {
        SuggestionJob {
            submission_id: SubmissionId::new(),
            context: Some("Block area".to_string()),
            playground: playground.then(material),
            toy: toy.then(material),
        }
    }

    #[tokio::test]
    async fn nothing_eligible_is_not_requested() {
        let client = Arc::new(ScriptedVisionClient::new());
        let store = Arc::new(MemorySuggestionStore::new());
        let generator = Arc::new(SuggestionGenerator::new(client.clone(), store.clone()));

        assert!(generator.generate(&job(false, false)).await.unwrap().is_none());
        let state = generator.schedule(job(false, false)).await.unwrap();

        assert_eq!(state, SuggestionRunState::NotRequested);
        assert_eq!(client.call_count(), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn only_eligible_subjects_are_requested() {
        let client = Arc::new(ScriptedVisionClient::new().with_reply(
            RequestKind::Suggestions,
            Subject::Toy,
            r#"{"Purpose": ["Label the tray"]}"#,
        ));
        let store = Arc::new(MemorySuggestionStore::new());
        let generator = SuggestionGenerator::new(client.clone(), store);

        let record = generator.generate(&job(false, true)).await.unwrap().unwrap();

        assert!(record.playground_suggestions.is_none());
        assert_eq!(
            record.suggestions(Subject::Toy).unwrap()["Purpose"],
            vec!["Label the tray".to_string()]
        );
        let calls = client.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tag(), (RequestKind::Suggestions, Subject::Toy));
        assert!(calls[0].prompt.contains("Goal unclear"));
        assert_eq!(calls[0].context.as_deref(), Some("Block area"));
        assert_eq!(calls[0].images.len(), 1);
    }

    #[tokio::test]
    async fn one_failing_subject_does_not_block_the_other() {
        let client = Arc::new(
            ScriptedVisionClient::new()
                .with_failure(RequestKind::Suggestions, Subject::Playground, "timeout")
                .with_reply(RequestKind::Suggestions, Subject::Toy, r#"{"Purpose": ["Add labels"]}"#),
        );
        let generator = SuggestionGenerator::new(client, Arc::new(MemorySuggestionStore::new()));

        let record = generator.generate(&job(true, true)).await.unwrap().unwrap();
        assert!(record.playground_suggestions.is_none());
        assert!(record.toy_suggestions.is_some());
    }

    #[tokio::test]
    async fn all_subjects_failing_is_an_error_and_stores_nothing() {
        let client = Arc::new(
            ScriptedVisionClient::new()
                .with_reply(RequestKind::Suggestions, Subject::Playground, "not json")
                .with_failure(RequestKind::Suggestions, Subject::Toy, "rate limited"),
        );
        let store = Arc::new(MemorySuggestionStore::new());
        let generator = Arc::new(SuggestionGenerator::new(client, store.clone()));

        let err = generator.generate(&job(true, true)).await.unwrap_err();
        assert!(err.is_parse());

        let state = generator.schedule(job(true, true)).await.unwrap();
        assert_eq!(state, SuggestionRunState::Failed);
        assert!(store.is_empty());
    }
}
