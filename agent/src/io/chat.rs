//! Completion transport abstraction for step synthesis.
//!
//! The [`ChatCompletion`] trait decouples the loop from the model backend.
//! The shipped implementation pipes the conversation to an external CLI;
//! tests use scripted transports that return predetermined responses.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::io::config::ChatConfig;
use crate::io::process::{command_from_argv, run_command_with_timeout};

/// Message author role.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One role-tagged turn in a model conversation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Abstraction over completion backends.
///
/// A failure here is a transport error: fatal to the current step synthesis,
/// never retried by the controller.
pub trait ChatCompletion {
    /// Obtain one completion for the conversation. The returned text is the
    /// raw model answer; parsing happens upstream.
    fn complete(&self, messages: &[Message], model: &str) -> Result<String>;
}

impl<T: ChatCompletion + ?Sized> ChatCompletion for &T {
    fn complete(&self, messages: &[Message], model: &str) -> Result<String> {
        (**self).complete(messages, model)
    }
}

/// Payload piped to the external completion command on stdin.
#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
}

/// Transport that pipes the conversation to an external CLI as JSON and
/// reads the completion from its stdout.
pub struct CommandChatCompletion {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl CommandChatCompletion {
    pub fn new(command: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            command,
            timeout,
            output_limit_bytes,
        }
    }

    pub fn from_config(config: &ChatConfig) -> Self {
        Self::new(
            config.command.clone(),
            Duration::from_secs(config.timeout_secs),
            config.output_limit_bytes,
        )
    }
}

impl ChatCompletion for CommandChatCompletion {
    fn complete(&self, messages: &[Message], model: &str) -> Result<String> {
        info!(model, turns = messages.len(), "requesting completion");

        let payload = serde_json::to_vec(&CompletionRequest { model, messages })
            .context("serialize completion request")?;
        let cmd = command_from_argv(&self.command)?;
        let output = run_command_with_timeout(
            cmd,
            Some(&payload),
            self.timeout,
            self.output_limit_bytes,
        )
        .context("run completion command")?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "completion timed out");
            return Err(anyhow!(
                "completion command timed out after {:?}",
                self.timeout
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "completion command failed");
            return Err(anyhow!(
                "completion command failed with status {:?}: {}",
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(bytes = text.len(), "completion received");
        Ok(text)
    }
}
