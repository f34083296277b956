//! Background suggestion runs: scheduling, isolation from the caller, and
//! regeneration.

mod common;

use std::time::Duration;

use common::{harness, happy_client, payload};
use snapfeedback_core::{RequestKind, ServiceConfig, SingleSubmission, SuggestionRunState};
use snapfeedback_state::{Subject, SuggestionStore};

fn submission() -> SingleSubmission {
    SingleSubmission {
        playground_image_data_base64: payload("room"),
        toy_image_data_base64: payload("blocks"),
        activity_description: Some("Block area".to_string()),
    }
}

#[tokio::test]
async fn caller_is_not_blocked_by_suggestion_generation() {
    let h = harness(happy_client().with_suggestion_gate(), ServiceConfig::default());

    // Suggestion calls are held open by the gate; the submission must still
    // come back.
    let outcome = tokio::time::timeout(Duration::from_secs(5), h.service.submit_single(submission()))
        .await
        .expect("submission waited for suggestions")
        .unwrap();

    assert!(outcome.submission.playground_feedback.is_some());
    assert!(outcome.submission.toy_feedback.is_some());

    let task = outcome.suggestion_task.expect("suggestions scheduled");
    assert!(!task.is_finished());
    assert!(h.suggestions.is_empty());

    h.client.open_gate();
    assert_eq!(task.await.unwrap(), SuggestionRunState::Stored);
    assert_eq!(h.suggestions.len(), 1);
}

#[tokio::test]
async fn suggestion_requests_carry_evaluation_images_and_context() {
    let h = harness(happy_client(), ServiceConfig::default());

    let outcome = h.service.submit_single(submission()).await.unwrap();
    outcome.suggestion_task.unwrap().await.unwrap();

    for subject in Subject::ALL {
        let calls = h.client.calls_for(RequestKind::Suggestions, subject);
        assert_eq!(calls.len(), 1);
        let call = &calls[0];
        assert_eq!(call.context.as_deref(), Some("Block area"));
        assert_eq!(call.images.len(), 1);

        let evaluation = outcome.submission.feedback(subject).unwrap();
        for criterion in evaluation.0.values() {
            assert!(call.prompt.contains(&criterion.what_could_be_improved));
        }
    }
}

#[tokio::test]
async fn regeneration_replaces_without_duplicating() {
    let h = harness(happy_client(), ServiceConfig::default());

    let outcome = h.service.submit_single(submission()).await.unwrap();
    let id = outcome.submission.id.clone();
    outcome.suggestion_task.unwrap().await.unwrap();
    let first = h.service.get_suggestions(&id).await.unwrap();

    h.client.push_reply(
        RequestKind::Suggestions,
        Subject::Playground,
        r#"{"Boundary": ["Use floor tape around the mat"]}"#,
    );
    h.client.push_reply(
        RequestKind::Suggestions,
        Subject::Toy,
        r#"{"Purpose": ["Leave a half-built example out"]}"#,
    );

    let task = h.service.regenerate_suggestions(&id).await.unwrap();
    assert_eq!(task.await.unwrap(), SuggestionRunState::Stored);

    let second = h.service.get_suggestions(&id).await.unwrap();
    assert_eq!(second.id, first.id);
    assert_eq!(second.created_at, first.created_at);
    assert!(second.updated_at >= first.updated_at);
    assert_eq!(
        second.suggestions(Subject::Playground).unwrap()["Boundary"],
        vec!["Use floor tape around the mat".to_string()]
    );
    assert!(!second
        .suggestions(Subject::Playground)
        .unwrap()
        .contains_key("Narrative Setting"));
    assert_eq!(h.suggestions.len(), 1);

    let by_submission = h.suggestions.get_by_submission(&id).await.unwrap().unwrap();
    assert_eq!(by_submission, second);
}

#[tokio::test]
async fn regeneration_reloads_images_from_the_asset_store() {
    let h = harness(happy_client(), ServiceConfig::default());

    let outcome = h.service.submit_single(submission()).await.unwrap();
    outcome.suggestion_task.unwrap().await.unwrap();
    let id = outcome.submission.id.clone();

    h.service.regenerate_suggestions(&id).await.unwrap().await.unwrap();

    let calls = h.client.calls_for(RequestKind::Suggestions, Subject::Toy);
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].images, calls[1].images);
}

#[tokio::test]
async fn failed_run_leaves_no_suggestions_and_does_not_touch_submission() {
    // The first run consumes the happy replies; the regeneration gets a
    // non-object for playground and a transport failure for toy.
    let client = happy_client()
        .with_reply(RequestKind::Suggestions, Subject::Playground, "[]")
        .with_failure(RequestKind::Suggestions, Subject::Toy, "unavailable");
    let h = harness(client, ServiceConfig::default());

    let outcome = h.service.submit_single(submission()).await.unwrap();
    assert_eq!(
        outcome.suggestion_task.unwrap().await.unwrap(),
        SuggestionRunState::Stored
    );
    let stored = h.service.get_suggestions(&outcome.submission.id).await.unwrap();

    let state = h
        .service
        .regenerate_suggestions(&outcome.submission.id)
        .await
        .unwrap()
        .await
        .unwrap();
    assert_eq!(state, SuggestionRunState::Failed);

    let after = h.service.get_suggestions(&outcome.submission.id).await.unwrap();
    assert_eq!(after, stored, "failed regeneration keeps previous suggestions");
    let submission = h.service.get_submission(&outcome.submission.id).await.unwrap();
    assert_eq!(submission, outcome.submission);
}
