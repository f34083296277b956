//! HTTP surface: routes, error mapping and static image hosting.

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::{DefaultBodyLimit, Path as UrlPath, State};
use axum::http::{header, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use snapfeedback_core::assets::PUBLIC_PREFIX;
use snapfeedback_core::{
    FeedbackError, FeedbackService, MultiSubmission, SingleSubmission, SubmissionId,
    SubmissionRecord, SuggestionRecord,
};
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

/// Largest accepted request body. Three base64 photos per subject fit
/// comfortably.
pub const MAX_BODY_SIZE: usize = 25 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<FeedbackService>,
}

pub fn router(
    state: AppState,
    upload_dir: &Path,
    frontend_origin: &str,
) -> anyhow::Result<Router> {
    let origin: HeaderValue = frontend_origin
        .parse()
        .with_context(|| format!("invalid frontend origin {frontend_origin:?}"))?;
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE]);

    let app = Router::new()
        .route("/", get(handle_root))
        .route("/submit-design", post(handle_submit_single))
        .route("/submit-design-multi", post(handle_submit_multi))
        .route("/feedback/{id}", get(handle_feedback))
        .route("/improvement-suggestions/{id}", get(handle_suggestions))
        .route(
            "/improvement-suggestions/{id}/regenerate",
            post(handle_regenerate),
        )
        .nest_service(PUBLIC_PREFIX, ServeDir::new(upload_dir))
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(app)
}

/// Maps service errors onto status codes with a `{"detail": ...}` body.
#[derive(Debug)]
pub struct ApiError(FeedbackError);

impl From<FeedbackError> for ApiError {
    fn from(err: FeedbackError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            FeedbackError::Input(_) => StatusCode::BAD_REQUEST,
            FeedbackError::NotFound(_) => StatusCode::NOT_FOUND,
            FeedbackError::Service(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.0.kind(), error = %self.0, "request failed");
        } else {
            tracing::debug!(kind = self.0.kind(), error = %self.0, "request rejected");
        }
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

async fn handle_root() -> Json<serde_json::Value> {
    Json(json!({ "message": "Welcome to the SnapFeedback API" }))
}

async fn handle_submit_single(
    State(state): State<AppState>,
    Json(body): Json<SingleSubmission>,
) -> ApiResult<SubmissionRecord> {
    // Dropping the handle detaches the suggestion run.
    let outcome = state.service.submit_single(body).await?;
    Ok(Json(outcome.submission))
}

async fn handle_submit_multi(
    State(state): State<AppState>,
    Json(body): Json<MultiSubmission>,
) -> ApiResult<SubmissionRecord> {
    let outcome = state.service.submit_multi(body).await?;
    Ok(Json(outcome.submission))
}

async fn handle_feedback(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> ApiResult<SubmissionRecord> {
    let record = state.service.get_submission(&SubmissionId(id)).await?;
    Ok(Json(record))
}

async fn handle_suggestions(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> ApiResult<SuggestionRecord> {
    let record = state.service.get_suggestions(&SubmissionId(id)).await?;
    Ok(Json(record))
}

async fn handle_regenerate(
    State(state): State<AppState>,
    UrlPath(id): UrlPath<String>,
) -> ApiResult<serde_json::Value> {
    let id = SubmissionId(id);
    // Detached; clients poll the suggestions endpoint.
    let _ = state.service.regenerate_suggestions(&id).await?;
    Ok(Json(json!({
        "message": format!("Regenerating improvement suggestions for submission {id}")
    })))
}
