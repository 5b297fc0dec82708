//! Agent state layout and bootstrap.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::io::config::{AgentConfig, write_config};

/// Well-known paths under the agent state directory (`<root>/.agent`).
#[derive(Debug, Clone)]
pub struct AgentPaths {
    pub root: PathBuf,
    pub config_path: PathBuf,
    pub tasks_dir: PathBuf,
    pub workspace_dir: PathBuf,
}

impl AgentPaths {
    pub fn new(root: &Path) -> Self {
        let state_dir = root.join(".agent");
        Self {
            root: root.to_path_buf(),
            config_path: state_dir.join("config.toml"),
            tasks_dir: state_dir.join("tasks"),
            workspace_dir: state_dir.join("workspace"),
        }
    }
}

/// Options for `agent init`.
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Overwrite an existing config file.
    pub force: bool,
}

/// Create the `.agent/` scaffolding: directories plus a default config.
pub fn init_agent(root: &Path, options: &InitOptions) -> Result<AgentPaths> {
    let paths = AgentPaths::new(root);
    fs::create_dir_all(&paths.tasks_dir)
        .with_context(|| format!("create {}", paths.tasks_dir.display()))?;
    fs::create_dir_all(&paths.workspace_dir)
        .with_context(|| format!("create {}", paths.workspace_dir.display()))?;

    if options.force || !paths.config_path.exists() {
        write_config(&paths.config_path, &AgentConfig::default())?;
        info!(path = %paths.config_path.display(), "wrote default config");
    }

    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;

    #[test]
    fn init_creates_layout_and_default_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_agent(temp.path(), &InitOptions::default()).expect("init");

        assert!(paths.tasks_dir.is_dir());
        assert!(paths.workspace_dir.is_dir());
        let cfg = load_config(&paths.config_path).expect("load");
        assert_eq!(cfg, AgentConfig::default());
    }

    #[test]
    fn init_preserves_existing_config_without_force() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_agent(temp.path(), &InitOptions::default()).expect("init");

        let cfg = AgentConfig {
            model: "local-model".to_string(),
            ..AgentConfig::default()
        };
        write_config(&paths.config_path, &cfg).expect("write");

        init_agent(temp.path(), &InitOptions::default()).expect("re-init");
        assert_eq!(load_config(&paths.config_path).expect("load").model, "local-model");

        init_agent(temp.path(), &InitOptions { force: true }).expect("force init");
        assert_eq!(load_config(&paths.config_path).expect("load"), AgentConfig::default());
    }
}
