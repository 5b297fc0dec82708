//! Ability registry: the dynamic capability set the agent can invoke.
//!
//! Abilities are looked up by name through one polymorphic entry point; the
//! loop never enumerates them at compile time. Arguments stay opaque JSON
//! until the ability itself interprets them.

use std::collections::BTreeMap;

use anyhow::{Result, anyhow};
use tracing::info;

use crate::core::proposal::JsonObject;
use crate::io::chat::ChatCompletion;
use crate::io::prompt::AbilityDoc;
use crate::io::store::TaskStore;
use crate::io::workspace::Workspace;

pub mod code;
pub mod files;

pub const WRITE_FILE: &str = "write_file";
pub const READ_FILE: &str = "read_file";
pub const WRITE_CODE: &str = "write_code";
pub const FIX_CODE: &str = "fix_code";
pub const FINISH: &str = "finish";

/// Abilities that produce code and therefore trigger verification.
pub const CODE_ABILITIES: [&str; 2] = [WRITE_CODE, FIX_CODE];

/// Everything an ability may touch while executing one step.
pub struct AbilityContext<'a> {
    pub task_id: &'a str,
    pub step_id: &'a str,
    /// The executing step's input text (e.g. failure reports for `fix_code`).
    pub input: &'a str,
    pub workspace: &'a Workspace,
    pub store: &'a dyn TaskStore,
    pub chat: &'a dyn ChatCompletion,
    pub model: &'a str,
}

/// A named, arguments-taking operation the agent can perform.
pub trait Ability {
    fn name(&self) -> &'static str;
    /// Call signature shown in the prompt catalogue.
    fn usage(&self) -> &'static str;
    fn description(&self) -> &'static str;
    fn call(&self, ctx: &AbilityContext<'_>, args: &JsonObject) -> Result<String>;
}

/// Name-ordered collection of abilities with one invocation entry point.
pub struct AbilityRegistry {
    abilities: BTreeMap<&'static str, Box<dyn Ability>>,
}

impl AbilityRegistry {
    pub fn new() -> Self {
        Self {
            abilities: BTreeMap::new(),
        }
    }

    /// Registry with the built-in ability set.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(files::WriteFile));
        registry.register(Box::new(files::ReadFile));
        registry.register(Box::new(code::WriteCode));
        registry.register(Box::new(code::FixCode));
        registry.register(Box::new(files::Finish));
        registry
    }

    pub fn register(&mut self, ability: Box<dyn Ability>) {
        self.abilities.insert(ability.name(), ability);
    }

    /// Registered ability names, in deterministic order.
    pub fn names(&self) -> Vec<String> {
        self.abilities.keys().map(ToString::to_string).collect()
    }

    /// Catalogue entries for the system prompt.
    pub fn catalogue(&self) -> Vec<AbilityDoc> {
        self.abilities
            .values()
            .map(|ability| AbilityDoc {
                name: ability.name().to_string(),
                usage: ability.usage().to_string(),
                description: ability.description().to_string(),
            })
            .collect()
    }

    /// Invoke an ability by name. Unknown names are an error; argument
    /// interpretation is left entirely to the ability.
    pub fn invoke(
        &self,
        ctx: &AbilityContext<'_>,
        name: &str,
        args: &JsonObject,
    ) -> Result<String> {
        let ability = self.abilities.get(name).ok_or_else(|| {
            anyhow!(
                "unknown ability {name}, valid abilities are: {}",
                self.names().join(", ")
            )
        })?;
        info!(task_id = ctx.task_id, step_id = ctx.step_id, ability = name, "invoking ability");
        ability.call(ctx, args)
    }
}

impl Default for AbilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Fetch a required string argument.
pub(crate) fn require_str<'v>(args: &'v JsonObject, key: &str, ability: &str) -> Result<&'v str> {
    args.get(key)
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| anyhow!("ability {ability} requires a string `{key}` argument"))
}
