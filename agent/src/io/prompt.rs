//! Prompt rendering for step synthesis.
//!
//! Templates are embedded at compile time and rendered with minijinja. The
//! system prompt carries the ability catalogue, the format prompt the output
//! shape, and the user prompt the task, workspace files, and step history.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::io::store::{Step, StepStatus};

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const SYSTEM_REASONING_TEMPLATE: &str = include_str!("prompts/system-reasoning.md");
const FORMAT_TEMPLATE: &str = include_str!("prompts/format.md");
const USER_TEMPLATE: &str = include_str!("prompts/user.md");

/// One ability's entry in the prompt catalogue.
#[derive(Debug, Clone, Serialize)]
pub struct AbilityDoc {
    pub name: String,
    /// Call signature, e.g. `write_file(file: string, contents: string)`.
    pub usage: String,
    pub description: String,
}

/// One workspace file decoded to text for the user prompt.
#[derive(Debug, Clone, Serialize)]
pub struct FileContext {
    pub file_path: String,
    pub content: String,
}

/// One prior step summarized for the user prompt.
#[derive(Debug, Clone, Serialize)]
pub struct StepContext {
    pub name: String,
    pub status: String,
    pub output: Option<String>,
}

impl StepContext {
    pub fn from_step(step: &Step) -> Self {
        let status = match step.status {
            StepStatus::Pending => "pending",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        };
        Self {
            name: step.name.clone(),
            status: status.to_string(),
            output: step.output.clone(),
        }
    }
}

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
    reasoning: bool,
}

impl PromptEngine {
    pub fn new(reasoning: bool) -> Self {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .expect("system template should be valid");
        env.add_template("system-reasoning", SYSTEM_REASONING_TEMPLATE)
            .expect("system-reasoning template should be valid");
        env.add_template("format", FORMAT_TEMPLATE)
            .expect("format template should be valid");
        env.add_template("user", USER_TEMPLATE)
            .expect("user template should be valid");
        Self { env, reasoning }
    }

    /// Render the system role prompt with the ability catalogue.
    pub fn render_system(&self, abilities: &[AbilityDoc]) -> Result<String> {
        let name = if self.reasoning {
            "system-reasoning"
        } else {
            "system"
        };
        let template = self.env.get_template(name)?;
        let rendered = template
            .render(context! { abilities => abilities })
            .context("render system prompt")?;
        Ok(rendered)
    }

    /// Render the step output-format instructions.
    pub fn render_format(&self) -> Result<String> {
        let template = self.env.get_template("format")?;
        let rendered = template.render(context! {}).context("render format prompt")?;
        Ok(rendered)
    }

    /// Render the user role prompt.
    ///
    /// `step_input` is included only when it deviates from the task input;
    /// the caller decides that.
    pub fn render_user(
        &self,
        task: &str,
        step_input: Option<&str>,
        files: &[FileContext],
        previous_steps: &[StepContext],
    ) -> Result<String> {
        let template = self.env.get_template("user")?;
        let rendered = template
            .render(context! {
                task => task,
                step_input => step_input,
                files => (!files.is_empty()).then_some(files),
                previous_steps => (!previous_steps.is_empty()).then_some(previous_steps),
            })
            .context("render user prompt")?;
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalogue() -> Vec<AbilityDoc> {
        vec![
            AbilityDoc {
                name: "write_file".to_string(),
                usage: "write_file(file: string, contents: string)".to_string(),
                description: "Write a file to the workspace".to_string(),
            },
            AbilityDoc {
                name: "finish".to_string(),
                usage: "finish(reason: string)".to_string(),
                description: "Declare the task complete".to_string(),
            },
        ]
    }

    #[test]
    fn system_prompt_lists_every_ability() {
        let engine = PromptEngine::new(false);
        let rendered = engine.render_system(&catalogue()).expect("render");
        assert!(rendered.contains("write_file(file: string, contents: string)"));
        assert!(rendered.contains("finish(reason: string)"));
        assert!(!rendered.contains("thoughts"));
    }

    #[test]
    fn reasoning_variant_asks_for_thoughts() {
        let engine = PromptEngine::new(true);
        let rendered = engine.render_system(&catalogue()).expect("render");
        assert!(rendered.contains("thoughts"));
    }

    #[test]
    fn user_prompt_includes_step_input_only_when_given() {
        let engine = PromptEngine::new(false);
        let with = engine
            .render_user("write hello.py", Some("2 tests failed"), &[], &[])
            .expect("render");
        assert!(with.contains("Step input:"));
        assert!(with.contains("2 tests failed"));

        let without = engine
            .render_user("write hello.py", None, &[], &[])
            .expect("render");
        assert!(!without.contains("Step input:"));
    }

    #[test]
    fn user_prompt_renders_files_and_history() {
        let engine = PromptEngine::new(false);
        let files = vec![FileContext {
            file_path: "hello.py".to_string(),
            content: "print('hi')".to_string(),
        }];
        let steps = vec![StepContext {
            name: "Write".to_string(),
            status: "completed".to_string(),
            output: Some("wrote hello.py".to_string()),
        }];
        let rendered = engine
            .render_user("write hello.py", None, &files, &steps)
            .expect("render");
        assert!(rendered.contains("### hello.py"));
        assert!(rendered.contains("- Write (completed): wrote hello.py"));
    }
}
