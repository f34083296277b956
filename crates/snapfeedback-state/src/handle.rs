//! SurrealDB Handle - Connection and Operations
//!
//! Manages the connection and implements both storage traits:
//! - `SubmissionStore`: create / get / update_feedback
//! - `SuggestionStore`: get_by_submission / upsert_by_submission
//!
//! Supports in-memory, URL, authenticated remote, and local file connections.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::sql::Datetime as SurrealDatetime;
use surrealdb::Surreal;
use tracing::{debug, info, instrument, warn};

use crate::error::StateError;
use crate::migrations;
use crate::schema::{
    EvaluationResult, NewSubmission, Subject, SubmissionId, SubmissionRecord, SuggestionMap,
    SuggestionPatch, SuggestionRecord, SuggestionSetId,
};
use crate::storage_traits::{StorageResult, SubmissionStore, SuggestionStore};
use crate::Result;

const DEFAULT_NAMESPACE: &str = "snapfeedback";
const DEFAULT_DATABASE: &str = "main";
const LOCAL_DB_PATH: &str = ".snapfeedback/db";

/// Extra attempts for a write that lost an optimistic-concurrency race.
const MAX_CONFLICT_RETRIES: u32 = 10;
const CONFLICT_BACKOFF: Duration = Duration::from_millis(5);

/// Configuration for an authenticated SurrealDB connection
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Endpoint URL (e.g., "wss://xxx.aws-use1.surrealdb.cloud")
    pub endpoint: String,
    /// Database username
    pub username: String,
    /// Database password
    pub password: String,
    /// Namespace (default: "snapfeedback")
    pub namespace: String,
    /// Database name (default: "main")
    pub database: String,
    /// Whether this is a root user (true) or database user (false)
    pub is_root: bool,
}

impl StoreConfig {
    /// Create a new configuration for a database user
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            database: DEFAULT_DATABASE.to_string(),
            is_root: false,
        }
    }

    /// Set custom namespace
    pub fn with_namespace(mut self, ns: impl Into<String>) -> Self {
        self.namespace = ns.into();
        self
    }

    /// Set custom database
    pub fn with_database(mut self, db: impl Into<String>) -> Self {
        self.database = db.into();
        self
    }

    /// Set whether this is a root user
    pub fn with_root(mut self, is_root: bool) -> Self {
        self.is_root = is_root;
        self
    }

    /// Create from environment variables
    ///
    /// Reads:
    /// - SURREALDB_ENDPOINT (required)
    /// - SURREALDB_USERNAME (required)
    /// - SURREALDB_PASSWORD (required)
    /// - SURREALDB_NAMESPACE (optional, default: "snapfeedback")
    /// - SURREALDB_DATABASE (optional, default: "main")
    /// - SURREALDB_ROOT (optional, default: "false")
    pub fn from_env() -> std::result::Result<Self, String> {
        let endpoint =
            std::env::var("SURREALDB_ENDPOINT").map_err(|_| "SURREALDB_ENDPOINT not set")?;
        let username =
            std::env::var("SURREALDB_USERNAME").map_err(|_| "SURREALDB_USERNAME not set")?;
        let password =
            std::env::var("SURREALDB_PASSWORD").map_err(|_| "SURREALDB_PASSWORD not set")?;
        let namespace = std::env::var("SURREALDB_NAMESPACE")
            .unwrap_or_else(|_| DEFAULT_NAMESPACE.to_string());
        let database =
            std::env::var("SURREALDB_DATABASE").unwrap_or_else(|_| DEFAULT_DATABASE.to_string());
        let is_root = std::env::var("SURREALDB_ROOT")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        Ok(Self {
            endpoint,
            username,
            password,
            namespace,
            database,
            is_root,
        })
    }
}

/// Submission row as stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbSubmission {
    submission_id: String,
    playground_image_urls: Vec<String>,
    toy_image_urls: Vec<String>,
    activity_description: Option<String>,
    playground_feedback: Option<EvaluationResult>,
    toy_feedback: Option<EvaluationResult>,
    created_at: SurrealDatetime,
    updated_at: SurrealDatetime,
}

impl DbSubmission {
    fn from_record(record: &SubmissionRecord) -> Self {
        DbSubmission {
            submission_id: record.id.0.clone(),
            playground_image_urls: record.playground_image_urls.clone(),
            toy_image_urls: record.toy_image_urls.clone(),
            activity_description: record.activity_description.clone(),
            playground_feedback: record.playground_feedback.clone(),
            toy_feedback: record.toy_feedback.clone(),
            created_at: SurrealDatetime::from(record.created_at),
            updated_at: SurrealDatetime::from(record.updated_at),
        }
    }

    fn into_record(self) -> SubmissionRecord {
        SubmissionRecord {
            id: SubmissionId(self.submission_id),
            playground_image_urls: self.playground_image_urls,
            toy_image_urls: self.toy_image_urls,
            activity_description: self.activity_description,
            playground_feedback: self.playground_feedback,
            toy_feedback: self.toy_feedback,
            created_at: DateTime::<Utc>::from(self.created_at),
            updated_at: DateTime::<Utc>::from(self.updated_at),
        }
    }
}

/// Suggestion-set row as stored in SurrealDB
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DbSuggestionSet {
    suggestion_set_id: String,
    submission_id: String,
    playground_suggestions: Option<SuggestionMap>,
    toy_suggestions: Option<SuggestionMap>,
    created_at: SurrealDatetime,
    updated_at: SurrealDatetime,
}

impl DbSuggestionSet {
    fn from_record(record: &SuggestionRecord) -> Self {
        DbSuggestionSet {
            suggestion_set_id: record.id.0.clone(),
            submission_id: record.submission_id.0.clone(),
            playground_suggestions: record.playground_suggestions.clone(),
            toy_suggestions: record.toy_suggestions.clone(),
            created_at: SurrealDatetime::from(record.created_at),
            updated_at: SurrealDatetime::from(record.updated_at),
        }
    }

    fn into_record(self) -> SuggestionRecord {
        SuggestionRecord {
            id: SuggestionSetId(self.suggestion_set_id),
            submission_id: SubmissionId(self.submission_id),
            playground_suggestions: self.playground_suggestions,
            toy_suggestions: self.toy_suggestions,
            created_at: DateTime::<Utc>::from(self.created_at),
            updated_at: DateTime::<Utc>::from(self.updated_at),
        }
    }
}

/// SurrealDB-backed implementation of [`SubmissionStore`] and [`SuggestionStore`].
#[derive(Clone)]
pub struct SurrealStore {
    db: Surreal<Any>,
}

impl SurrealStore {
    /// Connect to SurrealDB in-memory and set up schema
    #[instrument(skip_all)]
    pub async fn in_memory() -> Result<Self> {
        info!("Connecting to SurrealDB (in-memory)");
        Self::connect_url("mem://").await
    }

    /// Connect to an authenticated SurrealDB endpoint
    #[instrument(skip(config), fields(endpoint = %config.endpoint, namespace = %config.namespace, database = %config.database))]
    pub async fn connect(config: StoreConfig) -> Result<Self> {
        info!("Connecting to SurrealDB (root={})", config.is_root);

        let db = surrealdb::engine::any::connect(&config.endpoint)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
            })?;

        if config.is_root {
            db.signin(Root {
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| StateError::Connection(format!("Root authentication failed: {}", e)))?;
        } else {
            db.signin(Database {
                namespace: &config.namespace,
                database: &config.database,
                username: &config.username,
                password: &config.password,
            })
            .await
            .map_err(|e| {
                StateError::Connection(format!("Database authentication failed: {}", e))
            })?;
        }

        db.use_ns(&config.namespace)
            .use_db(&config.database)
            .await
            .map_err(|e| {
                StateError::Connection(format!("Failed to select namespace/database: {}", e))
            })?;

        migrations::init_schema(&db).await?;
        info!("SurrealDB connected and schema initialized");
        Ok(Self { db })
    }

    /// Connect using environment variables
    ///
    /// If SURREALDB_ENDPOINT is set, connects with credentials.
    /// If SURREALDB_URL is set, connects to that URL.
    /// Otherwise, falls back to local persistence under `.snapfeedback/db`.
    #[instrument(skip_all)]
    pub async fn from_env() -> Result<Self> {
        if let Ok(config) = StoreConfig::from_env() {
            info!("Credentials found, connecting to {}", config.endpoint);
            return Self::connect(config).await;
        }

        if let Ok(url) = std::env::var("SURREALDB_URL") {
            info!("SURREALDB_URL found, connecting to {}", url);
            return Self::connect_url(&url).await;
        }

        std::fs::create_dir_all(LOCAL_DB_PATH).map_err(|e| {
            StateError::Connection(format!(
                "Failed to create database directory {}: {}",
                LOCAL_DB_PATH, e
            ))
        })?;
        let url = format!("surrealkv://{}", LOCAL_DB_PATH);
        info!("No SurrealDB config found, using local persistence: {}", url);
        Self::connect_url(&url).await
    }

    async fn connect_url(url: &str) -> Result<Self> {
        let db = surrealdb::engine::any::connect(url)
            .await
            .map_err(|e| StateError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

        db.use_ns(DEFAULT_NAMESPACE)
            .use_db(DEFAULT_DATABASE)
            .await
            .map_err(|e| StateError::Connection(e.to_string()))?;

        migrations::init_schema(&db).await?;
        Ok(Self { db })
    }

    // -- private helpers -----------------------------------------------------

    async fn fetch_suggestion_set(&self, sid: &str) -> StorageResult<Option<DbSuggestionSet>> {
        let mut res = self
            .db
            .query("SELECT * FROM type::thing('improvement_suggestions', $sid)")
            .bind(("sid", sid.to_string()))
            .await?;

        let rows: Vec<DbSuggestionSet> = res.take(0)?;
        Ok(rows.into_iter().next())
    }

    async fn write_feedback(
        &self,
        id: &SubmissionId,
        subject: Subject,
        result: EvaluationResult,
    ) -> StorageResult<Option<SubmissionRecord>> {
        // Field names cannot be bound as parameters; each subject has its own statement.
        let sql = match subject {
            Subject::Playground => {
                "UPDATE submissions SET playground_feedback = $value, updated_at = $now \
                 WHERE submission_id = $sid RETURN AFTER"
            }
            Subject::Toy => {
                "UPDATE submissions SET toy_feedback = $value, updated_at = $now \
                 WHERE submission_id = $sid RETURN AFTER"
            }
        };

        let mut res = self
            .db
            .query(sql)
            .bind(("value", result))
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .bind(("sid", id.0.clone()))
            .await?;

        let rows: Vec<DbSubmission> = res.take(0)?;
        Ok(rows.into_iter().next().map(DbSubmission::into_record))
    }

    async fn write_suggestions(
        &self,
        id: &SubmissionId,
        patch: SuggestionPatch,
    ) -> StorageResult<SuggestionRecord> {
        // Identity and creation time are only set when the row is new.
        let mut sql = String::from(
            "UPSERT type::thing('improvement_suggestions', $sid) SET \
             submission_id = $sid, \
             suggestion_set_id = suggestion_set_id ?? $set_id, \
             created_at = created_at ?? $now, \
             updated_at = $now",
        );
        if patch.playground_suggestions.is_some() {
            sql.push_str(", playground_suggestions = $playground");
        }
        if patch.toy_suggestions.is_some() {
            sql.push_str(", toy_suggestions = $toy");
        }
        sql.push_str(" RETURN AFTER");

        let mut res = self
            .db
            .query(sql)
            .bind(("sid", id.0.clone()))
            .bind(("set_id", SuggestionSetId::new().0))
            .bind(("now", SurrealDatetime::from(Utc::now())))
            .bind(("playground", patch.playground_suggestions))
            .bind(("toy", patch.toy_suggestions))
            .await?;

        let rows: Vec<DbSuggestionSet> = res.take(0)?;
        rows.into_iter()
            .next()
            .map(DbSuggestionSet::into_record)
            .ok_or_else(|| StateError::Transaction("Failed to upsert suggestion set".to_string()))
    }
}

/// Replay `attempt` while it fails with a write conflict, up to
/// [`MAX_CONFLICT_RETRIES`] extra times.
async fn retry_on_conflict<T, F, Fut>(operation: &str, mut attempt: F) -> StorageResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = StorageResult<T>>,
{
    let mut retries = 0;
    loop {
        match attempt().await {
            Err(err) if err.is_conflict() && retries < MAX_CONFLICT_RETRIES => {
                retries += 1;
                debug!(operation, retries, "write conflict, retrying");
                tokio::time::sleep(CONFLICT_BACKOFF * retries).await;
            }
            Err(err) if err.is_conflict() => {
                warn!(operation, retries, error = %err, "write conflict persisted");
                return Err(err);
            }
            other => return other,
        }
    }
}

#[async_trait]
impl SubmissionStore for SurrealStore {
    #[instrument(skip(self, submission))]
    async fn create(&self, submission: NewSubmission) -> StorageResult<SubmissionRecord> {
        let record = SubmissionRecord::new(submission);
        debug!(submission_id = %record.id, "creating submission");

        let created: Option<DbSubmission> = self
            .db
            .create("submissions")
            .content(DbSubmission::from_record(&record))
            .await?;

        created
            .map(DbSubmission::into_record)
            .ok_or_else(|| StateError::Transaction("Failed to create submission".to_string()))
    }

    #[instrument(skip(self), fields(submission_id = %id))]
    async fn get(&self, id: &SubmissionId) -> StorageResult<Option<SubmissionRecord>> {
        let sid_owned = id.0.clone();
        let mut res = self
            .db
            .query("SELECT * FROM submissions WHERE submission_id = $sid")
            .bind(("sid", sid_owned))
            .await?;

        let rows: Vec<DbSubmission> = res.take(0)?;
        Ok(rows.into_iter().next().map(DbSubmission::into_record))
    }

    #[instrument(skip(self, result), fields(submission_id = %id, subject = %subject))]
    async fn update_feedback(
        &self,
        id: &SubmissionId,
        subject: Subject,
        result: EvaluationResult,
    ) -> StorageResult<Option<SubmissionRecord>> {
        debug!(criteria = result.len(), "updating feedback field");
        retry_on_conflict("update_feedback", move || {
            self.write_feedback(id, subject, result.clone())
        })
        .await
    }
}

#[async_trait]
impl SuggestionStore for SurrealStore {
    #[instrument(skip(self), fields(submission_id = %id))]
    async fn get_by_submission(
        &self,
        id: &SubmissionId,
    ) -> StorageResult<Option<SuggestionRecord>> {
        Ok(self
            .fetch_suggestion_set(&id.0)
            .await?
            .map(DbSuggestionSet::into_record))
    }

    #[instrument(skip(self, patch), fields(submission_id = %id))]
    async fn upsert_by_submission(
        &self,
        id: &SubmissionId,
        patch: SuggestionPatch,
    ) -> StorageResult<SuggestionRecord> {
        retry_on_conflict("upsert_by_submission", move || {
            self.write_suggestions(id, patch.clone())
        })
        .await
    }
}
