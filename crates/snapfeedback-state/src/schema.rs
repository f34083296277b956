//! Record and value types persisted by SnapFeedback
//!
//! Tables:
//! - submissions: Uploaded image references, context, and per-subject evaluations
//! - improvement_suggestions: Suggestion sets keyed by submission identity

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the two independent evaluation targets of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Playground,
    Toy,
}

impl Subject {
    /// Both subjects, in dispatch order.
    pub const ALL: [Subject; 2] = [Subject::Playground, Subject::Toy];

    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Playground => "playground",
            Subject::Toy => "toy",
        }
    }

    /// Name of the submission field holding this subject's evaluation.
    pub fn feedback_field(&self) -> &'static str {
        match self {
            Subject::Playground => "playground_feedback",
            Subject::Toy => "toy_feedback",
        }
    }

    /// Name of the suggestion-set field holding this subject's suggestions.
    pub fn suggestions_field(&self) -> &'static str {
        match self {
            Subject::Playground => "playground_suggestions",
            Subject::Toy => "toy_suggestions",
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rubric score. Only `0`, `0.5` and `1` are representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub enum Score {
    Zero,
    Half,
    Full,
}

impl Score {
    pub fn value(&self) -> f64 {
        match self {
            Score::Zero => 0.0,
            Score::Half => 0.5,
            Score::Full => 1.0,
        }
    }
}

/// Rejected score value.
#[derive(Debug, Clone, PartialEq)]
pub struct InvalidScore(pub f64);

impl std::fmt::Display for InvalidScore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "score {} is not one of 0, 0.5, 1", self.0)
    }
}

impl std::error::Error for InvalidScore {}

impl TryFrom<f64> for Score {
    type Error = InvalidScore;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        if value == 0.0 {
            Ok(Score::Zero)
        } else if value == 0.5 {
            Ok(Score::Half)
        } else if value == 1.0 {
            Ok(Score::Full)
        } else {
            Err(InvalidScore(value))
        }
    }
}

impl From<Score> for f64 {
    fn from(score: Score) -> Self {
        score.value()
    }
}

/// Structured result for a single rubric criterion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub score: Score,
    pub what_went_well: String,
    pub what_could_be_improved: String,
}

/// Criterion name → score, for one subject.
///
/// Criterion names are defined by the rubric prompt, not by this type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EvaluationResult(pub BTreeMap<String, CriterionScore>);

impl EvaluationResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, criterion: impl Into<String>, score: CriterionScore) {
        self.0.insert(criterion.into(), score);
    }

    pub fn get(&self, criterion: &str) -> Option<&CriterionScore> {
        self.0.get(criterion)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn criteria(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Sum of all criterion scores.
    pub fn total_score(&self) -> f64 {
        self.0.values().map(|c| c.score.value()).sum()
    }
}

impl FromIterator<(String, CriterionScore)> for EvaluationResult {
    fn from_iter<T: IntoIterator<Item = (String, CriterionScore)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Criterion name → short actionable suggestions.
pub type SuggestionMap = BTreeMap<String, Vec<String>>;

/// Opaque submission identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub String);

impl SubmissionId {
    /// Generate a new random SubmissionId
    pub fn new() -> Self {
        SubmissionId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SubmissionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SubmissionId {
    fn from(s: &str) -> Self {
        SubmissionId(s.to_string())
    }
}

/// Opaque suggestion-set identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SuggestionSetId(pub String);

impl SuggestionSetId {
    pub fn new() -> Self {
        SuggestionSetId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for SuggestionSetId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SuggestionSetId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Input for creating a submission draft
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSubmission {
    pub playground_image_urls: Vec<String>,
    pub toy_image_urls: Vec<String>,
    pub activity_description: Option<String>,
}

/// A stored submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionRecord {
    pub id: SubmissionId,
    pub playground_image_urls: Vec<String>,
    pub toy_image_urls: Vec<String>,
    pub activity_description: Option<String>,
    pub playground_feedback: Option<EvaluationResult>,
    pub toy_feedback: Option<EvaluationResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SubmissionRecord {
    /// Create a fresh draft with no evaluations.
    pub fn new(submission: NewSubmission) -> Self {
        let now = Utc::now();
        SubmissionRecord {
            id: SubmissionId::new(),
            playground_image_urls: submission.playground_image_urls,
            toy_image_urls: submission.toy_image_urls,
            activity_description: submission.activity_description,
            playground_feedback: None,
            toy_feedback: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn feedback(&self, subject: Subject) -> Option<&EvaluationResult> {
        match subject {
            Subject::Playground => self.playground_feedback.as_ref(),
            Subject::Toy => self.toy_feedback.as_ref(),
        }
    }

    pub fn image_urls(&self, subject: Subject) -> &[String] {
        match subject {
            Subject::Playground => &self.playground_image_urls,
            Subject::Toy => &self.toy_image_urls,
        }
    }

    /// Set one subject's evaluation and refresh `updated_at`.
    pub fn set_feedback(&mut self, subject: Subject, result: EvaluationResult) {
        match subject {
            Subject::Playground => self.playground_feedback = Some(result),
            Subject::Toy => self.toy_feedback = Some(result),
        }
        self.updated_at = Utc::now();
    }
}

/// Per-subject suggestion replacement. `None` leaves that subject untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SuggestionPatch {
    pub playground_suggestions: Option<SuggestionMap>,
    pub toy_suggestions: Option<SuggestionMap>,
}

impl SuggestionPatch {
    pub fn set(&mut self, subject: Subject, suggestions: SuggestionMap) {
        match subject {
            Subject::Playground => self.playground_suggestions = Some(suggestions),
            Subject::Toy => self.toy_suggestions = Some(suggestions),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.playground_suggestions.is_none() && self.toy_suggestions.is_none()
    }
}

/// A stored improvement suggestion set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestionRecord {
    pub id: SuggestionSetId,
    pub submission_id: SubmissionId,
    pub playground_suggestions: Option<SuggestionMap>,
    pub toy_suggestions: Option<SuggestionMap>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SuggestionRecord {
    /// Create a new set from a patch.
    pub fn new(submission_id: SubmissionId, patch: SuggestionPatch) -> Self {
        let now = Utc::now();
        SuggestionRecord {
            id: SuggestionSetId::new(),
            submission_id,
            playground_suggestions: patch.playground_suggestions,
            toy_suggestions: patch.toy_suggestions,
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the subjects present in `patch` and refresh `updated_at`.
    pub fn apply(&mut self, patch: SuggestionPatch) {
        if let Some(p) = patch.playground_suggestions {
            self.playground_suggestions = Some(p);
        }
        if let Some(t) = patch.toy_suggestions {
            self.toy_suggestions = Some(t);
        }
        self.updated_at = Utc::now();
    }

    pub fn suggestions(&self, subject: Subject) -> Option<&SuggestionMap> {
        match subject {
            Subject::Playground => self.playground_suggestions.as_ref(),
            Subject::Toy => self.toy_suggestions.as_ref(),
        }
    }
}
