//! Per-task artifact file store.
//!
//! Each task owns a subtree under the workspace base directory; ability
//! implementations read and write files there, and the verification adapter
//! runs inside it. File names are validated so a task can never escape its
//! own subtree.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use tracing::debug;

/// Task-scoped file store rooted at a base directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    base: PathBuf,
}

impl Workspace {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Directory holding one task's files (also the verification workdir).
    pub fn task_dir(&self, task_id: &str) -> PathBuf {
        self.base.join(task_id)
    }

    /// Read a task file as bytes.
    pub fn read(&self, task_id: &str, file_name: &str) -> Result<Vec<u8>> {
        let path = self.resolve(task_id, file_name)?;
        fs::read(&path).with_context(|| format!("read workspace file {}", path.display()))
    }

    /// Write a task file, creating parent directories as needed.
    pub fn write(&self, task_id: &str, file_name: &str, contents: &[u8]) -> Result<PathBuf> {
        let path = self.resolve(task_id, file_name)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create workspace dir {}", parent.display()))?;
        }
        fs::write(&path, contents)
            .with_context(|| format!("write workspace file {}", path.display()))?;
        debug!(task_id, file_name, bytes = contents.len(), "wrote workspace file");
        Ok(path)
    }

    fn resolve(&self, task_id: &str, file_name: &str) -> Result<PathBuf> {
        let relative = Path::new(file_name);
        if relative.components().any(|component| {
            !matches!(component, Component::Normal(_) | Component::CurDir)
        }) {
            return Err(anyhow!(
                "workspace file name {file_name} must stay inside the task directory"
            ));
        }
        Ok(self.task_dir(task_id).join(relative))
    }
}
