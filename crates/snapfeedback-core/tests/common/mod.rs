//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use snapfeedback_core::fakes::ScriptedVisionClient;
use snapfeedback_core::{EncodedImage, FeedbackService, FsAssetStore, RequestKind, ServiceConfig};
use snapfeedback_state::fakes::{MemorySubmissionStore, MemorySuggestionStore};
use snapfeedback_state::{NewSubmission, Subject, SubmissionRecord, SubmissionStore};

pub const PLAYGROUND_EVALUATION: &str = r#"{
    "Narrative Setting": {"score": 0.5, "what_went_well": "Themed corners", "what_could_be_improved": "No story"},
    "Multi Sensory": {"score": 1, "what_went_well": "Sand and water", "what_could_be_improved": ""},
    "Boundary": {"score": 0, "what_went_well": "", "what_could_be_improved": "No rug or tape"},
    "Movement and Layout": {"score": 0.5, "what_went_well": "Clear path", "what_could_be_improved": "No seating"},
    "Clean up and Resetting": {"score": 1, "what_went_well": "Labelled bins", "what_could_be_improved": ""}
}"#;

pub const TOY_EVALUATION: &str = r#"{
    "Purpose": {"score": 1, "what_went_well": "Half-built tower", "what_could_be_improved": ""},
    "Anchor & Choice Materials": {"score": 0.5, "what_went_well": "Blocks", "what_could_be_improved": "Few extras"},
    "Spark Curiousity": {"score": 0, "what_went_well": "", "what_could_be_improved": "Nothing surprising"},
    "Challenge Adjustment": {"score": 0.5, "what_went_well": "Two sizes", "what_could_be_improved": "No harder option"},
    "Self-Served": {"score": 1, "what_went_well": "Light blocks", "what_could_be_improved": ""}
}"#;

pub const PLAYGROUND_SUGGESTIONS: &str =
    r#"{"Boundary": ["Lay a rug to mark the block area"], "Narrative Setting": ["Add a construction site sign"]}"#;

pub const TOY_SUGGESTIONS: &str = r#"{"Spark Curiousity": ["Hide a toy animal inside the tower"]}"#;

pub fn image(tag: &str) -> EncodedImage {
    EncodedImage::from_bytes("image/jpeg", tag.as_bytes())
}

pub fn payload(tag: &str) -> String {
    image(tag).to_data_url()
}

/// A client that answers every evaluation and suggestion call successfully.
pub fn happy_client() -> ScriptedVisionClient {
    ScriptedVisionClient::new()
        .with_reply(RequestKind::Evaluation, Subject::Playground, PLAYGROUND_EVALUATION)
        .with_reply(RequestKind::Evaluation, Subject::Toy, TOY_EVALUATION)
        .with_reply(RequestKind::Suggestions, Subject::Playground, PLAYGROUND_SUGGESTIONS)
        .with_reply(RequestKind::Suggestions, Subject::Toy, TOY_SUGGESTIONS)
}

pub async fn draft(store: &dyn SubmissionStore) -> SubmissionRecord {
    store
        .create(NewSubmission {
            playground_image_urls: vec!["/images/playground.jpeg".to_string()],
            toy_image_urls: vec!["/images/toy.jpeg".to_string()],
            activity_description: None,
        })
        .await
        .unwrap()
}

pub struct Harness {
    pub service: FeedbackService,
    pub client: Arc<ScriptedVisionClient>,
    pub submissions: Arc<MemorySubmissionStore>,
    pub suggestions: Arc<MemorySuggestionStore>,
    pub upload_dir: tempfile::TempDir,
}

pub fn harness(client: ScriptedVisionClient, config: ServiceConfig) -> Harness {
    let upload_dir = tempfile::tempdir().unwrap();
    let client = Arc::new(client);
    let submissions = Arc::new(MemorySubmissionStore::new());
    let suggestions = Arc::new(MemorySuggestionStore::new());
    let assets = Arc::new(FsAssetStore::new(upload_dir.path()).unwrap());

    let service = FeedbackService::new(
        config,
        client.clone(),
        submissions.clone(),
        suggestions.clone(),
        assets,
    );
    Harness {
        service,
        client,
        submissions,
        suggestions,
        upload_dir,
    }
}
