//! SurrealDB schema migrations and initialization
//!
//! This module sets up the SnapFeedback tables with their identity indexes.

use crate::Result;
use surrealdb::engine::any::Any;
use surrealdb::Surreal;
use tracing::{debug, info};

/// Initialize all SnapFeedback tables in SurrealDB
///
/// This should be called once on first connection to set up the schema.
/// Safe to call multiple times (idempotent).
pub async fn init_schema(db: &Surreal<Any>) -> Result<()> {
    info!("Initializing SnapFeedback SurrealDB schema");

    init_submissions_table(db).await?;
    init_suggestions_table(db).await?;

    info!("SnapFeedback schema initialization complete");
    Ok(())
}

/// Initialize `submissions` table
///
/// Schema:
/// ```text
/// TABLE submissions {
///   submission_id:          STRING (unique)
///   playground_image_urls:  ARRAY<STRING>
///   toy_image_urls:         ARRAY<STRING>
///   activity_description:   STRING?
///   playground_feedback:    OBJECT? (criterion -> score object)
///   toy_feedback:           OBJECT?
///   created_at:             DATETIME
///   updated_at:             DATETIME
/// }
/// ```
///
/// Submissions are never deleted by the application.
async fn init_submissions_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing submissions table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS submissions
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_submission_id ON TABLE submissions COLUMNS submission_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_submission_created_at ON TABLE submissions COLUMNS created_at;
    "#;

    db.query(sql)
        .await
        .map_err(|e| crate::StateError::SchemaSetup(e.to_string()))?
        .check()
        .map_err(|e| crate::StateError::SchemaSetup(e.to_string()))?;
    info!("✓ submissions table initialized");
    Ok(())
}

/// Initialize `improvement_suggestions` table
///
/// Schema:
/// ```text
/// TABLE improvement_suggestions {
///   id:                      improvement_suggestions:<submission_id>
///   suggestion_set_id:       STRING (unique)
///   submission_id:           STRING (unique back-reference)
///   playground_suggestions:  OBJECT? (criterion -> array<string>)
///   toy_suggestions:         OBJECT?
///   created_at:              DATETIME
///   updated_at:              DATETIME
/// }
/// ```
///
/// Records are keyed by submission id, so an upsert addresses exactly one
/// row. The unique index on `submission_id` backs that up for rows written
/// by other clients.
async fn init_suggestions_table(db: &Surreal<Any>) -> Result<()> {
    debug!("Initializing improvement_suggestions table");

    let sql = r#"
        DEFINE TABLE IF NOT EXISTS improvement_suggestions
            SCHEMALESS
            PERMISSIONS
                FOR create FULL
                FOR select FULL
                FOR update FULL
                FOR delete NONE;

        DEFINE INDEX IF NOT EXISTS idx_suggestion_set_id ON TABLE improvement_suggestions COLUMNS suggestion_set_id UNIQUE;
        DEFINE INDEX IF NOT EXISTS idx_suggestion_submission ON TABLE improvement_suggestions COLUMNS submission_id UNIQUE;
    "#;

    db.query(sql)
        .await
        .map_err(|e| crate::StateError::SchemaSetup(e.to_string()))?
        .check()
        .map_err(|e| crate::StateError::SchemaSetup(e.to_string()))?;
    info!("✓ improvement_suggestions table initialized");
    Ok(())
}
