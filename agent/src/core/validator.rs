//! Structural validation of step candidates against the live ability set.

use serde_json::Value;

use crate::core::proposal::JsonObject;

/// Check a step candidate against the registered ability names.
///
/// Returns a list of violation descriptions; an empty list accepts the step.
/// A non-empty list causes the retry controller to re-send the conversation.
pub fn violations(step: &JsonObject, ability_names: &[String]) -> Vec<String> {
    let step_name = step
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("step");

    let mut violations = Vec::new();
    match step.get("ability") {
        None | Some(Value::Null) => {
            violations.push(format!("no ability found in step {step_name}"));
        }
        Some(Value::Object(ability)) if ability.is_empty() => {
            violations.push(format!("no ability found in step {step_name}"));
        }
        Some(Value::Object(ability)) => {
            match ability.get("name").and_then(Value::as_str) {
                None => violations.push(format!(
                    "the ability in step {step_name} is missing a name"
                )),
                Some(name) if !ability_names.iter().any(|known| known == name) => {
                    violations.push(format!(
                        "ability {name} in step {step_name} does not exist, valid abilities are: {}",
                        ability_names.join(", ")
                    ));
                }
                Some(_) => {}
            }
            if let Some(args) = ability.get("args")
                && !args.is_null()
                && !args.is_object()
            {
                violations.push(format!(
                    "the ability args in step {step_name} must be an object"
                ));
            }
        }
        Some(_) => {
            violations.push(format!(
                "the ability in step {step_name} is not a JSON object"
            ));
        }
    }
    violations
}
