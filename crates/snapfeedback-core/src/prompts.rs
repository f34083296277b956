//! Rubric prompts.
//!
//! The rubric, not the validator, defines the criterion names. Changing a
//! criterion here changes what the model is asked for and nothing else.

use snapfeedback_state::{EvaluationResult, Subject};

/// Criteria scored for the playground (room) image.
pub const PLAYGROUND_CRITERIA: [&str; 5] = [
    "Narrative Setting",
    "Multi Sensory",
    "Boundary",
    "Movement and Layout",
    "Clean up and Resetting",
];

/// Criteria scored for the toy (activity) image.
pub const TOY_CRITERIA: [&str; 5] = [
    "Purpose",
    "Anchor & Choice Materials",
    "Spark Curiousity",
    "Challenge Adjustment",
    "Self-Served",
];

const PLAYGROUND_RUBRIC: &str = "\
Role: You are an expert in the play-based method for preschools.
Context: A preschool has asked you to evaluate its classroom environment for children aged 1-5 on these parameters:

1. **Narrative Setting:** The space experientially sets context for immersion.
2. **Multi Sensory:** The environment stimulates more than two senses of a child.
3. **Boundary:** The environment has clear boundaries of play.
4. **Movement and Layout:** Movement through the space, or designated seating, is intentional.
5. **Clean up and Resetting:** Children can return all items and reset the room without adult lifting or labeling help.
";

const TOY_RUBRIC: &str = "\
Role: You are an expert in the play-based method for preschools.
Context: A preschool has asked you to evaluate an activity setup for children aged 1-5 on these parameters:

1. **Purpose:** There is a clear agenda, labelled or visible through the setup, with cues such as half-done work or materials in use.
2. **Anchor & Choice Materials:** There is a clear hero \"anchor\" material and a variety of \"choice\" materials that lead to different outcomes.
3. **Spark Curiousity:** There is a wow element that invites wonder, questions or exploration.
4. **Challenge Adjustment:** The setup can change difficulty for an individual or a group.
5. **Self-Served:** Materials are safe, recognizable and light enough for children to manage alone.
";

const EVALUATION_TASK: &str = "
# Task

Evaluate the environment in the images against the parameters above. Be strict.
The litmus test: an adult entering the room should understand exactly what the children will do and how they will do it.

# Output Format

Respond with a single JSON object with one key per parameter, using the parameter names exactly as written above. Each value is an object with:
- \"score\": 0, 0.5 or 1 (1 = fully done, 0.5 = partially done, 0 = not done)
- \"what_went_well\": a short description of what went well (may be empty)
- \"what_could_be_improved\": a short description of what could be improved (may be empty)
";

const SUGGESTIONS_TASK: &str = "
# Task

You already evaluated the images against the parameters above. The evaluation is given below as JSON.
For every parameter that did not score 1, propose short, concrete changes the teacher can make to the setup shown in the images.

# Output Format

Respond with a single JSON object with one key per parameter, using the parameter names exactly as written above. Each value is an array of short actionable suggestion strings. Use an empty array when nothing needs to change.
";

fn rubric(subject: Subject) -> &'static str {
    match subject {
        Subject::Playground => PLAYGROUND_RUBRIC,
        Subject::Toy => TOY_RUBRIC,
    }
}

pub fn criteria(subject: Subject) -> &'static [&'static str] {
    match subject {
        Subject::Playground => &PLAYGROUND_CRITERIA,
        Subject::Toy => &TOY_CRITERIA,
    }
}

/// The full evaluation prompt for a subject.
pub fn evaluation_prompt(subject: Subject) -> String {
    format!("{}{}", rubric(subject), EVALUATION_TASK)
}

/// Suggestion prompt embedding the rubric and the stored evaluation verbatim.
pub fn suggestions_prompt(subject: Subject, evaluation: &EvaluationResult) -> String {
    // EvaluationResult is a map of plain strings and numbers, so this cannot fail
    // in practice; fall back to an empty object rather than dropping the call.
    let evaluation_json =
        serde_json::to_string_pretty(evaluation).unwrap_or_else(|_| "{}".to_string());
    format!(
        "{}{}\n# Evaluation\n\n{}\n",
        rubric(subject),
        SUGGESTIONS_TASK,
        evaluation_json
    )
}

/// Instruction added when a subject carries more than one image.
pub fn multi_image_instruction(count: usize) -> Option<String> {
    (count > 1).then(|| {
        format!(
            "You are shown {count} images of the same space from different angles. \
             Weigh them equally and return a single combined evaluation."
        )
    })
}

pub fn activity_context(description: &str) -> String {
    format!("Activity Description: {description}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use snapfeedback_state::{CriterionScore, Score};

    #[test]
    fn evaluation_prompts_name_every_criterion() {
        for subject in Subject::ALL {
            let prompt = evaluation_prompt(subject);
            for criterion in criteria(subject) {
                assert!(prompt.contains(criterion), "{subject} prompt lacks {criterion}");
            }
            assert!(prompt.contains("JSON object"));
        }
    }

    #[test]
    fn suggestions_prompt_embeds_evaluation() {
        let mut evaluation = EvaluationResult::new();
        evaluation.insert(
            "Boundary",
            CriterionScore {
                score: Score::Zero,
                what_went_well: String::new(),
                what_could_be_improved: "No visible boundaries".to_string(),
            },
        );

        let prompt = suggestions_prompt(Subject::Playground, &evaluation);
        assert!(prompt.contains("No visible boundaries"));
        assert!(prompt.contains("Clean up and Resetting"));
        assert!(prompt.contains("array"));
    }

    #[test]
    fn multi_image_instruction_only_for_several_images() {
        assert!(multi_image_instruction(0).is_none());
        assert!(multi_image_instruction(1).is_none());
        assert!(multi_image_instruction(3).unwrap().contains("shown 3 images"));
    }
}
