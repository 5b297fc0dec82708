//! File abilities plus the terminal `finish` signal.

use anyhow::{Context, Result};

use crate::core::proposal::JsonObject;

use super::{Ability, AbilityContext, FINISH, READ_FILE, WRITE_FILE, require_str};

/// Write literal contents to a workspace file.
pub struct WriteFile;

impl Ability for WriteFile {
    fn name(&self) -> &'static str {
        WRITE_FILE
    }

    fn usage(&self) -> &'static str {
        "write_file(file: string, contents: string)"
    }

    fn description(&self) -> &'static str {
        "Write the given contents to a file in the workspace"
    }

    fn call(&self, ctx: &AbilityContext<'_>, args: &JsonObject) -> Result<String> {
        let file = require_str(args, "file", WRITE_FILE)?;
        let contents = require_str(args, "contents", WRITE_FILE)?;
        ctx.workspace
            .write(ctx.task_id, file, contents.as_bytes())
            .with_context(|| format!("write_file {file}"))?;
        ctx.store.create_artifact(ctx.task_id, file)?;
        Ok(format!("Wrote {} bytes to {file}", contents.len()))
    }
}

/// Read a workspace file as UTF-8 text.
pub struct ReadFile;

impl Ability for ReadFile {
    fn name(&self) -> &'static str {
        READ_FILE
    }

    fn usage(&self) -> &'static str {
        "read_file(file: string)"
    }

    fn description(&self) -> &'static str {
        "Read a file from the workspace and return its contents"
    }

    fn call(&self, ctx: &AbilityContext<'_>, args: &JsonObject) -> Result<String> {
        let file = require_str(args, "file", READ_FILE)?;
        let bytes = ctx
            .workspace
            .read(ctx.task_id, file)
            .with_context(|| format!("read_file {file}"))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Declare the task complete. Terminal by convention in the orchestrator.
pub struct Finish;

impl Ability for Finish {
    fn name(&self) -> &'static str {
        FINISH
    }

    fn usage(&self) -> &'static str {
        "finish(reason: string)"
    }

    fn description(&self) -> &'static str {
        "Declare the task complete, with a short reason"
    }

    fn call(&self, _ctx: &AbilityContext<'_>, args: &JsonObject) -> Result<String> {
        let reason = args
            .get("reason")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("Task complete.");
        Ok(reason.to_string())
    }
}
