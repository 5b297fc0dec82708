//! Shared types for model step proposals.
//!
//! These types define the stable contract between response parsing, step
//! validation, and the orchestrator. Ability arguments are opaque JSON: the
//! core never interprets them, only the registry does.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Opaque JSON object payload (ability args, step objects, wire contracts).
pub type JsonObject = Map<String, Value>;

/// A named operation the agent wants to perform, with opaque arguments.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct AbilityInvocation {
    pub name: String,
    #[serde(default)]
    pub args: JsonObject,
}

impl AbilityInvocation {
    pub fn new(name: impl Into<String>, args: JsonObject) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// The `additional_input` wire form: `{"ability": {"name": ..., "args": ...}}`.
    pub fn to_wire(&self) -> JsonObject {
        let mut wire = JsonObject::new();
        wire.insert(
            "ability".to_string(),
            serde_json::to_value(self).expect("invocation serializes to an object"),
        );
        wire
    }

    /// Parse the wire form back into an invocation. `None` when the `ability`
    /// key is absent (meaning: synthesize the next step via the model).
    pub fn from_wire(wire: &JsonObject) -> anyhow::Result<Option<Self>> {
        let Some(value) = wire.get("ability") else {
            return Ok(None);
        };
        let invocation = serde_json::from_value(value.clone())
            .map_err(|err| anyhow::anyhow!("malformed ability payload: {err}"))?;
        Ok(Some(invocation))
    }
}

/// Optional free-form commentary attached to a model proposal.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Thoughts {
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub criticism: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub speak: Option<String>,
}

/// A validated step proposal ready for the orchestrator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StepProposal {
    /// Display name for the step (defaults to "Step" when the model omits it).
    pub name: String,
    pub ability: AbilityInvocation,
    /// User-facing line from `thoughts.speak`, when provided.
    pub speak: Option<String>,
}

impl StepProposal {
    /// Convert a validated step object into a typed proposal.
    ///
    /// Callers must have run the validator first; a step that passed
    /// validation always converts.
    pub fn from_step(step: &JsonObject, thoughts: Option<Thoughts>) -> anyhow::Result<Self> {
        let name = step
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or("Step")
            .to_string();
        let ability_value = step
            .get("ability")
            .ok_or_else(|| anyhow::anyhow!("step has no ability field"))?;
        let ability: AbilityInvocation = serde_json::from_value(ability_value.clone())
            .map_err(|err| anyhow::anyhow!("malformed ability in step: {err}"))?;
        Ok(Self {
            name,
            ability,
            speak: thoughts.and_then(|t| t.speak),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> JsonObject {
        value.as_object().expect("object").clone()
    }

    #[test]
    fn wire_round_trips() {
        let invocation = AbilityInvocation::new(
            "write_file",
            object(json!({"file": "hi.py", "contents": "print('hi')"})),
        );
        let wire = invocation.to_wire();
        let parsed = AbilityInvocation::from_wire(&wire).expect("parse");
        assert_eq!(parsed, Some(invocation));
    }

    #[test]
    fn absent_ability_key_means_synthesize() {
        let wire = object(json!({"something_else": 1}));
        assert_eq!(AbilityInvocation::from_wire(&wire).expect("parse"), None);
    }

    #[test]
    fn malformed_ability_payload_is_an_error() {
        let wire = object(json!({"ability": "finish"}));
        assert!(AbilityInvocation::from_wire(&wire).is_err());
    }

    #[test]
    fn proposal_defaults_name_and_carries_speak() {
        let step = object(json!({"ability": {"name": "finish", "args": {}}}));
        let thoughts = Thoughts {
            speak: Some("done".to_string()),
            ..Thoughts::default()
        };
        let proposal = StepProposal::from_step(&step, Some(thoughts)).expect("proposal");
        assert_eq!(proposal.name, "Step");
        assert_eq!(proposal.ability.name, "finish");
        assert_eq!(proposal.speak.as_deref(), Some("done"));
    }
}
