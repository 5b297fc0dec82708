//! Agent configuration stored under `.agent/config.toml`.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Agent configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Model identifier passed to the completion transport.
    pub model: String,

    /// Terminate as soon as verification passes (or right after a plain file
    /// write), skipping the explicit finish round-trip.
    pub fast_termination: bool,

    /// Ask the model for a reasoning preamble alongside each step.
    pub reasoning: bool,

    /// Give-up threshold: once a task has strictly more than this many
    /// recorded steps, the next step is a forced terminal "Giving up" step.
    pub max_task_steps: u32,

    /// Additional proposal attempts after the first completion call.
    pub proposal_retries: u32,

    pub chat: ChatConfig,
    pub verify: VerifyConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ChatConfig {
    /// Command that reads `{model, messages}` JSON on stdin and writes the
    /// completion text to stdout.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            command: vec!["llm-complete".to_string()],
            timeout_secs: 5 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VerifyConfig {
    /// Test-runner command executed in the task workspace directory.
    pub command: Vec<String>,
    pub timeout_secs: u64,
    pub output_limit_bytes: usize,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            command: vec![
                "python".to_string(),
                "-m".to_string(),
                "pytest".to_string(),
                "-q".to_string(),
            ],
            timeout_secs: 10 * 60,
            output_limit_bytes: 1_000_000,
        }
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4".to_string(),
            fast_termination: true,
            reasoning: false,
            max_task_steps: 3,
            proposal_retries: 2,
            chat: ChatConfig::default(),
            verify: VerifyConfig::default(),
        }
    }
}

impl AgentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            return Err(anyhow!("model must be non-empty"));
        }
        if self.max_task_steps == 0 {
            return Err(anyhow!("max_task_steps must be > 0"));
        }
        if self.chat.command.is_empty() || self.chat.command[0].trim().is_empty() {
            return Err(anyhow!("chat.command must be a non-empty array"));
        }
        if self.chat.timeout_secs == 0 {
            return Err(anyhow!("chat.timeout_secs must be > 0"));
        }
        if self.chat.output_limit_bytes == 0 {
            return Err(anyhow!("chat.output_limit_bytes must be > 0"));
        }
        if self.verify.command.is_empty() || self.verify.command[0].trim().is_empty() {
            return Err(anyhow!("verify.command must be a non-empty array"));
        }
        if self.verify.timeout_secs == 0 {
            return Err(anyhow!("verify.timeout_secs must be > 0"));
        }
        if self.verify.output_limit_bytes == 0 {
            return Err(anyhow!("verify.output_limit_bytes must be > 0"));
        }
        Ok(())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `AgentConfig::default()`.
pub fn load_config(path: &Path) -> Result<AgentConfig> {
    if !path.exists() {
        let cfg = AgentConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: AgentConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &AgentConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, &buf)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, AgentConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        let cfg = AgentConfig {
            reasoning: true,
            max_task_steps: 5,
            ..AgentConfig::default()
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn rejects_zero_timeouts_and_empty_commands() {
        let cfg = AgentConfig {
            chat: ChatConfig {
                timeout_secs: 0,
                ..ChatConfig::default()
            },
            ..AgentConfig::default()
        };
        assert!(cfg.validate().is_err());

        let cfg = AgentConfig {
            verify: VerifyConfig {
                command: Vec::new(),
                ..VerifyConfig::default()
            },
            ..AgentConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
