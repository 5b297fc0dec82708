//! Decoding of raw model completions into step candidates.
//!
//! The parser distinguishes three outcomes the retry controller treats
//! differently: a located step object, a well-formed response with no step in
//! it, and text that does not decode at all. Locating the step follows the
//! acceptance rule: a non-empty `step` object field wins; otherwise a decoded
//! object that itself carries a non-empty `ability` object is the step.

use std::sync::LazyLock;

use serde_json::Value;

use crate::core::proposal::{JsonObject, Thoughts};

/// Outcome of decoding one model completion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParsedResponse {
    /// A step candidate was located. Validation has not happened yet.
    Step {
        step: JsonObject,
        thoughts: Option<Thoughts>,
    },
    /// The response decoded but contains no step (retryable, distinct from a
    /// decode failure).
    NoStep,
    /// The response did not decode as JSON; the reason feeds the corrective
    /// conversational turn.
    Invalid { reason: String },
}

/// Extract the body of the first fenced code block, if any.
///
/// Models routinely wrap JSON answers in ```json fences even when told not
/// to; abilities reuse this to strip fences from generated file contents.
pub fn fenced_block(raw: &str) -> Option<&str> {
    static FENCE_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"(?s)```[a-zA-Z0-9_-]*\s*\n(.*?)```").unwrap()
    });
    FENCE_RE
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Decode a raw completion into a step candidate.
pub fn parse_step_response(raw: &str) -> ParsedResponse {
    let candidate = fenced_block(raw).unwrap_or(raw).trim();

    let answer: Value = match serde_json::from_str(candidate) {
        Ok(value) => value,
        Err(err) => {
            return ParsedResponse::Invalid {
                reason: err.to_string(),
            };
        }
    };

    let thoughts = answer
        .get("thoughts")
        .and_then(|t| serde_json::from_value::<Thoughts>(t.clone()).ok());

    if let Some(step) = answer.get("step").and_then(Value::as_object)
        && !step.is_empty()
    {
        return ParsedResponse::Step {
            step: step.clone(),
            thoughts,
        };
    }

    if let Some(ability) = answer.get("ability").and_then(Value::as_object)
        && !ability.is_empty()
    {
        // The whole object is the step when the model skips the `step` wrapper.
        let step = answer
            .as_object()
            .expect("value with an ability field is an object")
            .clone();
        return ParsedResponse::Step { step, thoughts };
    }

    ParsedResponse::NoStep
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_wrapped_step() {
        let raw = r#"{"thoughts": {"speak": "writing the file"},
                      "step": {"name": "Write", "ability": {"name": "write_file", "args": {}}}}"#;
        match parse_step_response(raw) {
            ParsedResponse::Step { step, thoughts } => {
                assert_eq!(step["name"], "Write");
                assert_eq!(
                    thoughts.and_then(|t| t.speak).as_deref(),
                    Some("writing the file")
                );
            }
            other => panic!("expected step, got {other:?}"),
        }
    }

    #[test]
    fn top_level_ability_is_treated_as_the_step() {
        let raw = r#"{"name": "Fix", "ability": {"name": "fix_code", "args": {"file": "a.py"}}}"#;
        match parse_step_response(raw) {
            ParsedResponse::Step { step, .. } => {
                assert_eq!(step["ability"]["name"], "fix_code");
            }
            other => panic!("expected step, got {other:?}"),
        }
    }

    #[test]
    fn fenced_json_is_unwrapped() {
        let raw = "Here you go:\n```json\n{\"ability\": {\"name\": \"finish\", \"args\": {}}}\n```\n";
        assert!(matches!(
            parse_step_response(raw),
            ParsedResponse::Step { .. }
        ));
    }

    #[test]
    fn non_json_is_invalid_with_reason() {
        match parse_step_response("I will now write the file.") {
            ParsedResponse::Invalid { reason } => assert!(!reason.is_empty()),
            other => panic!("expected invalid, got {other:?}"),
        }
    }

    #[test]
    fn object_without_step_or_ability_is_no_step() {
        assert_eq!(
            parse_step_response(r#"{"thoughts": {"text": "hmm"}}"#),
            ParsedResponse::NoStep
        );
    }

    #[test]
    fn empty_or_non_object_step_falls_through() {
        assert_eq!(
            parse_step_response(r#"{"step": {}, "other": 1}"#),
            ParsedResponse::NoStep
        );
        assert_eq!(parse_step_response(r#"{"step": "soon"}"#), ParsedResponse::NoStep);
        assert_eq!(parse_step_response("[1, 2, 3]"), ParsedResponse::NoStep);
    }
}
