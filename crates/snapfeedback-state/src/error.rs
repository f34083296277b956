//! Error types for snapfeedback-state

use thiserror::Error;

/// Errors that can occur in the persistence layer
#[derive(Error, Debug)]
pub enum StateError {
    /// Database connection error
    #[error("Database connection failed: {0}")]
    Connection(String),

    /// Database query error
    #[error("Database query failed: {0}")]
    Query(String),

    /// Transaction failed
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Concurrent write conflict; the statement can be replayed
    #[error("Write conflict: {0}")]
    Conflict(String),

    /// Schema setup error
    #[error("Schema setup failed: {0}")]
    SchemaSetup(String),
}

impl StateError {
    /// A write lost an optimistic-concurrency race and may be replayed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, StateError::Conflict(_))
    }
}

impl From<surrealdb::Error> for StateError {
    fn from(err: surrealdb::Error) -> Self {
        let message = err.to_string();
        if message.contains("can be retried") || message.contains("read or write conflict") {
            StateError::Conflict(message)
        } else {
            StateError::Query(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_conflicts_are_retryable() {
        assert!(StateError::Conflict("busy".into()).is_conflict());
        assert!(!StateError::Query("syntax".into()).is_conflict());
        assert!(!StateError::Transaction("no row".into()).is_conflict());
    }

    #[test]
    fn conflict_display_keeps_cause() {
        let err = StateError::Conflict("read or write conflict".into());
        assert_eq!(err.to_string(), "Write conflict: read or write conflict");
    }
}
