//! In-memory fakes for storage traits (testing only)
//!
//! Provides `MemorySubmissionStore` and `MemorySuggestionStore` that satisfy
//! the trait contracts without any external dependencies.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::schema::{
    EvaluationResult, NewSubmission, Subject, SubmissionId, SubmissionRecord, SuggestionPatch,
    SuggestionRecord,
};
use crate::storage_traits::*;

// ---------------------------------------------------------------------------
// MemorySubmissionStore
// ---------------------------------------------------------------------------

/// In-memory submission store backed by a `HashMap<id, record>`.
#[derive(Debug, Default)]
pub struct MemorySubmissionStore {
    records: Mutex<HashMap<String, SubmissionRecord>>,
}

impl MemorySubmissionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored submissions.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SubmissionStore for MemorySubmissionStore {
    async fn create(&self, submission: NewSubmission) -> StorageResult<SubmissionRecord> {
        let record = SubmissionRecord::new(submission);
        let mut records = self.records.lock().unwrap();
        records.insert(record.id.0.clone(), record.clone());
        Ok(record)
    }

    async fn get(&self, id: &SubmissionId) -> StorageResult<Option<SubmissionRecord>> {
        let records = self.records.lock().unwrap();
        Ok(records.get(&id.0).cloned())
    }

    async fn update_feedback(
        &self,
        id: &SubmissionId,
        subject: Subject,
        result: EvaluationResult,
    ) -> StorageResult<Option<SubmissionRecord>> {
        let mut records = self.records.lock().unwrap();
        Ok(records.get_mut(&id.0).map(|record| {
            record.set_feedback(subject, result);
            record.clone()
        }))
    }
}

// ---------------------------------------------------------------------------
// MemorySuggestionStore
// ---------------------------------------------------------------------------

/// In-memory suggestion store backed by a `HashMap<submission_id, record>`.
#[derive(Debug, Default)]
pub struct MemorySuggestionStore {
    sets: Mutex<HashMap<String, SuggestionRecord>>,
}

impl MemorySuggestionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored suggestion sets.
    pub fn len(&self) -> usize {
        self.sets.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SuggestionStore for MemorySuggestionStore {
    async fn get_by_submission(
        &self,
        id: &SubmissionId,
    ) -> StorageResult<Option<SuggestionRecord>> {
        let sets = self.sets.lock().unwrap();
        Ok(sets.get(&id.0).cloned())
    }

    async fn upsert_by_submission(
        &self,
        id: &SubmissionId,
        patch: SuggestionPatch,
    ) -> StorageResult<SuggestionRecord> {
        let mut sets = self.sets.lock().unwrap();
        let record = match sets.get_mut(&id.0) {
            Some(existing) => {
                existing.apply(patch);
                existing.clone()
            }
            None => {
                let record = SuggestionRecord::new(id.clone(), patch);
                sets.insert(id.0.clone(), record.clone());
                record
            }
        };
        Ok(record)
    }
}
