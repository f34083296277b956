//! Caller-facing operations.
//!
//! Every submission goes through the same steps:
//!
//! 1. validate input (nothing is written if this fails)
//! 2. store the images
//! 3. create the draft submission
//! 4. evaluate both subjects concurrently
//! 5. schedule suggestions in the background when an evaluation was stored
//!
//! The returned [`SubmissionOutcome`] is ready as soon as step 4 resolves.

use std::sync::Arc;

use serde::Deserialize;
use snapfeedback_state::{
    NewSubmission, Subject, SubmissionId, SubmissionRecord, SubmissionStore, SuggestionRecord,
    SuggestionStore,
};
use tokio::task::JoinHandle;
use tracing::{debug, instrument};

use crate::assets::{AssetError, AssetRef, AssetResult, AssetStore};
use crate::config::DEFAULT_MAX_ACTIVITY_DESCRIPTION_LENGTH;
use crate::error::{FeedbackError, Result};
use crate::metrics::METRICS;
use crate::obs::{self, SubmissionSpan};
use crate::orchestrator::{EvaluationOrchestrator, FailurePolicy, DEFAULT_MAX_OUTPUT_TOKENS};
use crate::suggestions::{SubjectMaterial, SuggestionGenerator, SuggestionJob, SuggestionRunState};
use crate::vision::{EncodedImage, VisionClient};

pub const MAX_IMAGES_PER_SUBJECT: usize = 3;

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub max_activity_description_length: usize,
    pub max_images_per_subject: usize,
    pub max_output_tokens: u32,
    pub single_image_policy: FailurePolicy,
    pub multi_image_policy: FailurePolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            max_activity_description_length: DEFAULT_MAX_ACTIVITY_DESCRIPTION_LENGTH,
            max_images_per_subject: MAX_IMAGES_PER_SUBJECT,
            max_output_tokens: DEFAULT_MAX_OUTPUT_TOKENS,
            single_image_policy: FailurePolicy::Isolated,
            multi_image_policy: FailurePolicy::Isolated,
        }
    }
}

/// One image per subject.
#[derive(Debug, Clone, Deserialize)]
pub struct SingleSubmission {
    pub playground_image_data_base64: String,
    pub toy_image_data_base64: String,
    #[serde(default)]
    pub activity_description: Option<String>,
}

/// One to [`MAX_IMAGES_PER_SUBJECT`] images per subject.
#[derive(Debug, Clone, Deserialize)]
pub struct MultiSubmission {
    pub playground_images_data_base64: Vec<String>,
    pub toy_images_data_base64: Vec<String>,
    #[serde(default)]
    pub activity_description: Option<String>,
}

#[derive(Debug)]
pub struct SubmissionOutcome {
    /// The submission after both evaluations resolved.
    pub submission: SubmissionRecord,
    /// Background suggestion run, if one was scheduled. Dropping the handle
    /// does not cancel it.
    pub suggestion_task: Option<JoinHandle<SuggestionRunState>>,
}

pub struct FeedbackService {
    config: ServiceConfig,
    assets: Arc<dyn AssetStore>,
    submissions: Arc<dyn SubmissionStore>,
    suggestions: Arc<dyn SuggestionStore>,
    orchestrator: EvaluationOrchestrator,
    generator: Arc<SuggestionGenerator>,
}

impl FeedbackService {
    pub fn new(
        config: ServiceConfig,
        client: Arc<dyn VisionClient>,
        submissions: Arc<dyn SubmissionStore>,
        suggestions: Arc<dyn SuggestionStore>,
        assets: Arc<dyn AssetStore>,
    ) -> Self {
        let orchestrator = EvaluationOrchestrator::new(client.clone(), submissions.clone())
            .with_max_output_tokens(config.max_output_tokens);
        let generator = SuggestionGenerator::new(client, suggestions.clone())
            .with_max_output_tokens(config.max_output_tokens);

        Self {
            config,
            assets,
            submissions,
            suggestions,
            orchestrator,
            generator: Arc::new(generator),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    #[instrument(skip_all)]
    pub async fn submit_single(&self, request: SingleSubmission) -> Result<SubmissionOutcome> {
        let context = self.check_description(request.activity_description)?;
        let playground = vec![EncodedImage::from_data_url(&request.playground_image_data_base64)?];
        let toy = vec![EncodedImage::from_data_url(&request.toy_image_data_base64)?];

        self.submit(playground, toy, context, self.config.single_image_policy)
            .await
    }

    #[instrument(skip_all)]
    pub async fn submit_multi(&self, request: MultiSubmission) -> Result<SubmissionOutcome> {
        let context = self.check_description(request.activity_description)?;
        let playground = self.decode_images(Subject::Playground, &request.playground_images_data_base64)?;
        let toy = self.decode_images(Subject::Toy, &request.toy_images_data_base64)?;

        self.submit(playground, toy, context, self.config.multi_image_policy)
            .await
    }

    #[instrument(skip(self), fields(submission_id = %id))]
    pub async fn get_submission(&self, id: &SubmissionId) -> Result<SubmissionRecord> {
        self.submissions
            .get(id)
            .await?
            .ok_or_else(|| FeedbackError::NotFound(format!("submission {id}")))
    }

    #[instrument(skip(self), fields(submission_id = %id))]
    pub async fn get_suggestions(&self, id: &SubmissionId) -> Result<SuggestionRecord> {
        self.get_submission(id).await?;
        self.suggestions
            .get_by_submission(id)
            .await?
            .ok_or_else(|| FeedbackError::NotFound(format!("improvement suggestions for {id}")))
    }

    /// Schedule a fresh suggestion run for an evaluated submission.
    ///
    /// Images are reloaded from the asset store. The new run replaces the
    /// stored suggestions for every subject it succeeds on.
    #[instrument(skip(self), fields(submission_id = %id))]
    pub async fn regenerate_suggestions(
        &self,
        id: &SubmissionId,
    ) -> Result<JoinHandle<SuggestionRunState>> {
        let submission = self.get_submission(id).await?;
        if submission.playground_feedback.is_none() && submission.toy_feedback.is_none() {
            return Err(FeedbackError::Input(format!(
                "submission {id} has no evaluation to derive suggestions from"
            )));
        }

        let mut loaded = Vec::new();
        for subject in Subject::ALL {
            if submission.feedback(subject).is_some() {
                let refs = submission.image_urls(subject).to_vec();
                loaded.push((subject, self.load_images(refs).await?));
            }
        }

        let mut job = SuggestionJob {
            submission_id: submission.id.clone(),
            context: submission.activity_description.clone(),
            playground: None,
            toy: None,
        };
        for (subject, images) in loaded {
            attach_material(&mut job, &submission, subject, images);
        }

        Ok(Arc::clone(&self.generator).schedule(job))
    }

    async fn submit(
        &self,
        playground: Vec<EncodedImage>,
        toy: Vec<EncodedImage>,
        context: Option<String>,
        policy: FailurePolicy,
    ) -> Result<SubmissionOutcome> {
        let (playground_urls, toy_urls) = self.store_images(&playground, &toy).await?;

        let draft = self
            .submissions
            .create(NewSubmission {
                playground_image_urls: playground_urls,
                toy_image_urls: toy_urls,
                activity_description: context.clone(),
            })
            .await?;
        announce(&draft);

        let report = self
            .orchestrator
            .evaluate_submission(&draft.id, &playground, &toy, context.as_deref(), policy)
            .await?;
        let submission = report.submission;

        let mut job = SuggestionJob {
            submission_id: submission.id.clone(),
            context,
            playground: None,
            toy: None,
        };
        attach_material(&mut job, &submission, Subject::Playground, playground);
        attach_material(&mut job, &submission, Subject::Toy, toy);

        let suggestion_task = if job.eligible_subjects() > 0 {
            Some(Arc::clone(&self.generator).schedule(job))
        } else {
            debug!(submission_id = %submission.id, "no evaluation stored, suggestions not scheduled");
            None
        };

        Ok(SubmissionOutcome {
            submission,
            suggestion_task,
        })
    }

    /// Trim the description; blank means absent. Length is counted in
    /// characters, not bytes.
    fn check_description(&self, description: Option<String>) -> Result<Option<String>> {
        let Some(description) = description else {
            return Ok(None);
        };
        let trimmed = description.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }

        let max = self.config.max_activity_description_length;
        if trimmed.chars().count() > max {
            return Err(FeedbackError::Input(format!(
                "activity description exceeds max length of {max} characters"
            )));
        }
        Ok(Some(trimmed.to_string()))
    }

    fn decode_images(&self, subject: Subject, payloads: &[String]) -> Result<Vec<EncodedImage>> {
        let max = self.config.max_images_per_subject;
        if payloads.is_empty() || payloads.len() > max {
            return Err(FeedbackError::Input(format!(
                "{subject} needs between 1 and {max} images, got {}",
                payloads.len()
            )));
        }
        payloads
            .iter()
            .map(|payload| EncodedImage::from_data_url(payload))
            .collect()
    }

    async fn store_images(
        &self,
        playground: &[EncodedImage],
        toy: &[EncodedImage],
    ) -> Result<(Vec<String>, Vec<String>)> {
        let assets = Arc::clone(&self.assets);
        let playground = playground.to_vec();
        let toy = toy.to_vec();

        let stored = tokio::task::spawn_blocking(move || -> AssetResult<_> {
            let put_all = |images: &[EncodedImage]| {
                images
                    .iter()
                    .map(|image| assets.put(image).map(AssetRef::into_string))
                    .collect::<AssetResult<Vec<_>>>()
            };
            Ok((put_all(&playground)?, put_all(&toy)?))
        })
        .await
        .map_err(blocking_task_failed)??;
        Ok(stored)
    }

    async fn load_images(&self, refs: Vec<String>) -> Result<Vec<EncodedImage>> {
        let assets = Arc::clone(&self.assets);
        let images = tokio::task::spawn_blocking(move || {
            refs.into_iter()
                .map(|r| assets.get(&AssetRef::from(r)))
                .collect::<AssetResult<Vec<_>>>()
        })
        .await
        .map_err(blocking_task_failed)??;
        Ok(images)
    }
}

fn attach_material(
    job: &mut SuggestionJob,
    submission: &SubmissionRecord,
    subject: Subject,
    images: Vec<EncodedImage>,
) {
    let Some(evaluation) = submission.feedback(subject).cloned() else {
        return;
    };
    let material = Some(SubjectMaterial { evaluation, images });
    match subject {
        Subject::Playground => job.playground = material,
        Subject::Toy => job.toy = material,
    }
}

fn announce(draft: &SubmissionRecord) {
    let _span = SubmissionSpan::enter(draft.id.as_str());
    obs::emit_submission_created(
        draft.id.as_str(),
        draft.playground_image_urls.len(),
        draft.toy_image_urls.len(),
    );
    METRICS.inc_submissions();
}

fn blocking_task_failed(err: tokio::task::JoinError) -> FeedbackError {
    FeedbackError::Asset(AssetError::Io(std::io::Error::other(err)))
}
