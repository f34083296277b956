//! Trust boundary for vision model output.
//!
//! The model returns free text that is supposed to be a JSON object. Nothing
//! leaves this module unless it has been parsed and checked entry by entry:
//!
//! - [`validate_evaluation`] is strict and all-or-nothing. One bad criterion
//!   rejects the whole subject.
//! - [`parse_suggestions`] is loose. Unusable entries are dropped and the
//!   rest is kept.
//!
//! Neither function knows the rubric's criterion names; the prompt defines
//! them and the validator only checks the shape of each entry.

use serde_json::{Map, Value};
use snapfeedback_state::{CriterionScore, EvaluationResult, SuggestionMap};
use tracing::warn;

use crate::error::ValidationError;

/// Validate a raw evaluation response.
///
/// Fails with [`ValidationError::Parse`] if `raw` is not JSON, and with
/// [`ValidationError::Schema`] if it is not a non-empty object whose every
/// value is a `{score, what_went_well, what_could_be_improved}` entry with a
/// score in {0, 0.5, 1}.
pub fn validate_evaluation(raw: &str) -> Result<EvaluationResult, ValidationError> {
    let entries = parse_object(raw)?;
    if entries.is_empty() {
        return Err(ValidationError::schema("$", "no criteria in response"));
    }

    let mut result = EvaluationResult::new();
    for (criterion, entry) in entries {
        if criterion.trim().is_empty() {
            return Err(ValidationError::schema("$", "criterion name is blank"));
        }
        if !entry.is_object() {
            return Err(ValidationError::schema(
                criterion,
                format!("expected an object, found {}", json_type(&entry)),
            ));
        }
        let score: CriterionScore = serde_json::from_value(entry)
            .map_err(|e| ValidationError::schema(criterion.as_str(), e.to_string()))?;
        result.insert(criterion, score);
    }

    Ok(result)
}

/// Parse a raw suggestions response, keeping every usable entry.
///
/// Entries that are not arrays of strings are dropped with a warning, as are
/// blank strings. Fails only when the text is not JSON, is not an object, or
/// leaves nothing usable.
pub fn parse_suggestions(raw: &str) -> Result<SuggestionMap, ValidationError> {
    let entries = parse_object(raw)?;

    let mut suggestions = SuggestionMap::new();
    for (criterion, entry) in entries {
        let Value::Array(items) = entry else {
            warn!(criterion = %criterion, found = json_type(&entry), "dropping non-array suggestions");
            continue;
        };

        let texts: Vec<String> = items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                _ => None,
            })
            .collect();

        if texts.is_empty() {
            warn!(criterion = %criterion, "dropping criterion with no usable suggestions");
            continue;
        }
        suggestions.insert(criterion, texts);
    }

    if suggestions.is_empty() {
        return Err(ValidationError::schema("$", "no usable suggestions in response"));
    }
    Ok(suggestions)
}

fn parse_object(raw: &str) -> Result<Map<String, Value>, ValidationError> {
    let value: Value =
        serde_json::from_str(raw.trim()).map_err(|e| ValidationError::Parse(e.to_string()))?;
    match value {
        Value::Object(map) => Ok(map),
        other => Err(ValidationError::schema(
            "$",
            format!("expected an object, found {}", json_type(&other)),
        )),
    }
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapfeedback_state::Score;

    const PLAYGROUND: &str = r#"{
        "Narrative Setting": {
            "score": 0.5,
            "what_went_well": "Themed play zones.",
            "what_could_be_improved": "No overarching story."
        },
        "Multi Sensory": {
            "score": 1,
            "what_went_well": "Visual and tactile materials.",
            "what_could_be_improved": ""
        },
        "Boundary": {
            "score": 0,
            "what_went_well": "",
            "what_could_be_improved": "No clear boundaries."
        }
    }"#;

    fn assert_schema(raw: &str) {
        match validate_evaluation(raw) {
            Err(ValidationError::Schema { .. }) => {}
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn accepts_well_formed_evaluation() {
        let result = validate_evaluation(PLAYGROUND).unwrap();

        assert_eq!(result.len(), 3);
        let narrative = result.get("Narrative Setting").unwrap();
        assert_eq!(narrative.score, Score::Half);
        assert_eq!(narrative.what_went_well, "Themed play zones.");
        assert_eq!(result.get("Multi Sensory").unwrap().score, Score::Full);
        assert_eq!(result.get("Boundary").unwrap().what_went_well, "");
        assert_eq!(result.total_score(), 1.5);
    }

    #[test]
    fn entries_round_trip_exactly() {
        let result = validate_evaluation(PLAYGROUND).unwrap();
        let reserialized = serde_json::to_string(&result).unwrap();
        assert_eq!(validate_evaluation(&reserialized).unwrap(), result);
    }

    #[test]
    fn accepts_any_criterion_names() {
        let raw = r#"{"Self-Served": {"score": 1, "what_went_well": "Light trays", "what_could_be_improved": ""}}"#;
        let result = validate_evaluation(raw).unwrap();
        assert_eq!(result.criteria().collect::<Vec<_>>(), vec!["Self-Served"]);
    }

    #[test]
    fn ignores_extra_keys_inside_entries() {
        let raw = r#"{"Purpose": {"score": 0, "what_went_well": "", "what_could_be_improved": "x", "confidence": 0.9}}"#;
        assert!(validate_evaluation(raw).is_ok());
    }

    #[test]
    fn non_json_is_parse_error() {
        for raw in ["", "   ", "not json", "{\"Boundary\": ", "```json\n{}\n```", "{'a': 1}"] {
            match validate_evaluation(raw) {
                Err(ValidationError::Parse(_)) => {}
                other => panic!("expected parse error for {raw:?}, got {other:?}"),
            }
        }
    }

    #[test]
    fn out_of_range_score_is_schema_error() {
        assert_schema(
            r#"{"Boundary": {"score": 0.75, "what_went_well": "", "what_could_be_improved": ""}}"#,
        );
        assert_schema(
            r#"{"Boundary": {"score": 2, "what_went_well": "", "what_could_be_improved": ""}}"#,
        );
    }

    #[test]
    fn one_bad_entry_rejects_the_whole_result() {
        let raw = r#"{
            "Narrative Setting": {"score": 1, "what_went_well": "a", "what_could_be_improved": "b"},
            "Boundary": {"score": 3, "what_went_well": "a", "what_could_be_improved": "b"}
        }"#;
        assert_schema(raw);
    }

    #[test]
    fn no_coercion_of_wrong_types() {
        assert_schema(
            r#"{"Boundary": {"score": "0.5", "what_went_well": "", "what_could_be_improved": ""}}"#,
        );
        assert_schema(
            r#"{"Boundary": {"score": true, "what_went_well": "", "what_could_be_improved": ""}}"#,
        );
        assert_schema(
            r#"{"Boundary": {"score": 1, "what_went_well": 5, "what_could_be_improved": ""}}"#,
        );
    }

    #[test]
    fn missing_fields_are_schema_errors() {
        assert_schema(r#"{"Boundary": {"score": 1, "what_went_well": ""}}"#);
        assert_schema(r#"{"Boundary": {"what_went_well": "", "what_could_be_improved": ""}}"#);
    }

    #[test]
    fn wrong_shapes_are_schema_errors() {
        assert_schema("[]");
        assert_schema("42");
        assert_schema("{}");
        assert_schema(r#"{"Boundary": 1}"#);
        assert_schema(r#"{"Boundary": [1, "a", "b"]}"#);
        assert_schema(r#"{"  ": {"score": 1, "what_went_well": "", "what_could_be_improved": ""}}"#);
    }

    #[test]
    fn schema_error_names_the_criterion() {
        let err = validate_evaluation(
            r#"{"Spark Curiousity": {"score": 0.3, "what_went_well": "", "what_could_be_improved": ""}}"#,
        )
        .unwrap_err();
        match err {
            ValidationError::Schema { location, .. } => assert_eq!(location, "Spark Curiousity"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn suggestions_keep_usable_entries() {
        let raw = r#"{
            "Boundary": ["Lay a rug to mark the area", "  ", 7],
            "Purpose": "not a list",
            "Self-Served": [],
            "Anchor & Choice Materials": ["Put the blocks at child height"]
        }"#;
        let suggestions = parse_suggestions(raw).unwrap();

        assert_eq!(suggestions.len(), 2);
        assert_eq!(
            suggestions["Boundary"],
            vec!["Lay a rug to mark the area".to_string()]
        );
        assert!(suggestions.contains_key("Anchor & Choice Materials"));
        assert!(!suggestions.contains_key("Purpose"));
    }

    #[test]
    fn suggestions_fail_when_nothing_usable() {
        assert!(matches!(
            parse_suggestions("nope"),
            Err(ValidationError::Parse(_))
        ));
        assert!(matches!(
            parse_suggestions(r#"["a"]"#),
            Err(ValidationError::Schema { .. })
        ));
        assert!(matches!(
            parse_suggestions(r#"{"Boundary": "x"}"#),
            Err(ValidationError::Schema { .. })
        ));
    }
}
