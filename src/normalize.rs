//! Pure mapping from a validated data payload to the artifact model.

use serde_json::Value;

use crate::extract::{ExercisePayload, ProgramPayload};
use crate::types::{Exercise, ExtractedProgram};

/// Map `payload` to an [`ExtractedProgram`] labelled `label`.
///
/// The program is named after the episode, then the program, then the label.
/// Exercise order is the payload's order. Dosage prefers the explicit
/// `program_exercise_attributes` over the `min_*` fields.
pub fn normalize(label: &str, payload: &ProgramPayload) -> ExtractedProgram {
    let name = payload
        .episode
        .as_ref()
        .and_then(|e| non_empty(e.name.as_deref()))
        .or_else(|| non_empty(payload.program.name.as_deref()))
        .unwrap_or(label)
        .to_string();

    ExtractedProgram {
        label: label.to_string(),
        name,
        exercises: payload
            .program
            .program_exercises
            .iter()
            .map(normalize_exercise)
            .collect(),
    }
}

fn normalize_exercise(exercise: &ExercisePayload) -> Exercise {
    let sets = exercise
        .attribute("sets")
        .and_then(as_count)
        .or_else(|| exercise.min_sets.as_ref().and_then(as_count));
    let reps = exercise
        .attribute("reps")
        .and_then(as_count)
        .or_else(|| exercise.min_reps.as_ref().and_then(as_count));

    Exercise {
        name: exercise.name.trim().to_string(),
        description: exercise
            .description
            .as_deref()
            .unwrap_or_default()
            .trim()
            .to_string(),
        sets,
        reps,
        hold: exercise.attribute("hold").and_then(as_text),
        note: non_empty(exercise.note.as_deref()).map(str::to_string),
    }
}

fn non_empty(text: Option<&str>) -> Option<&str> {
    text.map(str::trim).filter(|t| !t.is_empty())
}

/// Whole numbers, as JSON numbers or numeric strings.
fn as_count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
            .and_then(|n| u32::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_empty(Some(s.as_str())).map(str::to_string),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::parse_payload;
    use crate::types::WorkoutArtifact;
    use serde_json::json;

    fn payload(value: Value) -> ProgramPayload {
        parse_payload(&serde_json::to_vec(&value).unwrap())
            .unwrap()
            .payload
    }

    fn sample() -> ProgramPayload {
        payload(json!({
            "episode": { "id": 9, "name": "Knee rehab" },
            "program": {
                "id": 1,
                "name": "Program 1",
                "program_exercises": [
                    {
                        "name": " Quad set ",
                        "description": "  <p>Tighten the thigh.</p>\n",
                        "note": "  ",
                        "min_sets": 1,
                        "min_reps": 8,
                        "program_exercise_attributes": [
                            { "type": "sets", "value": "3" },
                            { "type": "reps", "value": 10 },
                            { "type": "hold", "value": "5 seconds" }
                        ]
                    },
                    {
                        "name": "Heel slide",
                        "description": null,
                        "note": "Go slow",
                        "min_sets": 2,
                        "min_reps": "15"
                    },
                    { "name": "Walk" }
                ]
            }
        }))
    }

    #[test]
    fn test_name_prefers_episode_then_program_then_label() {
        assert_eq!(normalize("knee", &sample()).name, "Knee rehab");

        let no_episode = payload(json!({
            "program": { "id": 1, "name": "Program 1", "program_exercises": [] }
        }));
        assert_eq!(normalize("knee", &no_episode).name, "Program 1");

        let nameless = payload(json!({
            "episode": { "name": "" },
            "program": { "id": 1, "program_exercises": [] }
        }));
        assert_eq!(normalize("knee", &nameless).name, "knee");
    }

    #[test]
    fn test_attributes_win_over_minimums() {
        let program = normalize("knee", &sample());
        let quad = &program.exercises[0];
        assert_eq!(quad.name, "Quad set");
        assert_eq!(quad.sets, Some(3));
        assert_eq!(quad.reps, Some(10));
        assert_eq!(quad.hold.as_deref(), Some("5 seconds"));
        assert_eq!(quad.description, "<p>Tighten the thigh.</p>");
        assert_eq!(quad.note, None);
    }

    #[test]
    fn test_minimums_are_the_fallback() {
        let program = normalize("knee", &sample());
        let slide = &program.exercises[1];
        assert_eq!(slide.sets, Some(2));
        assert_eq!(slide.reps, Some(15));
        assert_eq!(slide.hold, None);
        assert_eq!(slide.description, "");
        assert_eq!(slide.note.as_deref(), Some("Go slow"));
    }

    #[test]
    fn test_missing_dosage_stays_absent() {
        let program = normalize("knee", &sample());
        let walk = &program.exercises[2];
        assert_eq!((walk.sets, walk.reps), (None, None));
        assert_eq!(program.exercises.len(), 3);
    }

    #[test]
    fn test_same_payload_serializes_identically() {
        let first = serde_json::to_string_pretty(&WorkoutArtifact::from(&normalize("knee", &sample())))
            .unwrap();
        let second = serde_json::to_string_pretty(&WorkoutArtifact::from(&normalize("knee", &sample())))
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_as_count_edges() {
        assert_eq!(as_count(&json!(3.0)), Some(3));
        assert_eq!(as_count(&json!(2.5)), None);
        assert_eq!(as_count(&json!(-1)), None);
        assert_eq!(as_count(&json!("x")), None);
        assert_eq!(as_text(&json!(30)), Some("30".to_string()));
        assert_eq!(as_text(&json!("")), None);
    }
}
