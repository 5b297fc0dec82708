//! Code-producing abilities backed by the completion transport.
//!
//! Both abilities ask the model for complete file contents and write them to
//! the workspace. The orchestrator verifies their output afterwards, so they
//! never run tests themselves.

use anyhow::{Context, Result};

use crate::core::parser::fenced_block;
use crate::core::proposal::JsonObject;
use crate::io::chat::Message;

use super::{Ability, AbilityContext, FIX_CODE, WRITE_CODE, require_str};

const CODE_SYSTEM_PROMPT: &str = "You are an expert programmer. You answer with the complete, \
runnable contents of a single file and nothing else. No explanations, no surrounding prose.";

/// Strip an optional code fence and normalize the trailing newline.
fn clean_code(completion: &str) -> String {
    let body = fenced_block(completion).unwrap_or(completion).trim();
    let mut code = body.to_string();
    code.push('\n');
    code
}

fn generate(ctx: &AbilityContext<'_>, file: &str, request: String) -> Result<String> {
    let messages = [Message::system(CODE_SYSTEM_PROMPT), Message::user(request)];
    let completion = ctx
        .chat
        .complete(&messages, ctx.model)
        .with_context(|| format!("generate contents for {file}"))?;
    let code = clean_code(&completion);
    ctx.workspace.write(ctx.task_id, file, code.as_bytes())?;
    ctx.store.create_artifact(ctx.task_id, file)?;
    Ok(code)
}

/// Generate a file from the task description.
pub struct WriteCode;

impl Ability for WriteCode {
    fn name(&self) -> &'static str {
        WRITE_CODE
    }

    fn usage(&self) -> &'static str {
        "write_code(file: string)"
    }

    fn description(&self) -> &'static str {
        "Generate code for a file from the task description; the result is verified by tests"
    }

    fn call(&self, ctx: &AbilityContext<'_>, args: &JsonObject) -> Result<String> {
        let file = require_str(args, "file", WRITE_CODE)?;
        let task = ctx.store.get_task(ctx.task_id)?;

        let mut request = format!("Task: {}\n", task.input);
        if !ctx.input.trim().is_empty() && ctx.input.trim() != task.input.trim() {
            request.push_str(&format!("\nAdditional context:\n{}\n", ctx.input));
        }
        request.push_str(&format!("\nWrite the complete contents of `{file}`."));

        let code = generate(ctx, file, request)?;
        Ok(format!("Generated {file} ({} bytes)", code.len()))
    }
}

/// Regenerate a file from its current contents plus the failure report.
pub struct FixCode;

impl Ability for FixCode {
    fn name(&self) -> &'static str {
        FIX_CODE
    }

    fn usage(&self) -> &'static str {
        "fix_code(file: string)"
    }

    fn description(&self) -> &'static str {
        "Rewrite a file to fix the test failures reported in the step input"
    }

    fn call(&self, ctx: &AbilityContext<'_>, args: &JsonObject) -> Result<String> {
        let file = require_str(args, "file", FIX_CODE)?;
        let task = ctx.store.get_task(ctx.task_id)?;
        let current = ctx
            .workspace
            .read(ctx.task_id, file)
            .with_context(|| format!("fix_code {file}"))?;

        let request = format!(
            "Task: {}\n\nThe tests failed:\n{}\n\nCurrent contents of `{file}`:\n{}\n\n\
             Write the corrected complete contents of `{file}`.",
            task.input,
            ctx.input,
            String::from_utf8_lossy(&current)
        );

        let code = generate(ctx, file, request)?;
        Ok(format!("Rewrote {file} ({} bytes)", code.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::chat::ChatCompletion;
    use crate::io::store::{FsTaskStore, Task, TaskStore};
    use crate::io::workspace::Workspace;
    use serde_json::json;
    use std::sync::Mutex;

    struct FakeChat {
        completion: String,
        requests: Mutex<Vec<Vec<Message>>>,
    }

    impl FakeChat {
        fn new(completion: &str) -> Self {
            Self {
                completion: completion.to_string(),
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    impl ChatCompletion for FakeChat {
        fn complete(&self, messages: &[Message], _model: &str) -> Result<String> {
            self.requests.lock().unwrap().push(messages.to_vec());
            Ok(self.completion.clone())
        }
    }

    struct Fixture {
        _temp: tempfile::TempDir,
        store: FsTaskStore,
        workspace: Workspace,
        task: Task,
    }

    fn fixture(task_input: &str) -> Fixture {
        let temp = tempfile::tempdir().expect("tempdir");
        let store = FsTaskStore::new(temp.path().join("tasks"));
        let workspace = Workspace::new(temp.path().join("workspace"));
        let task = store.create_task(task_input).expect("task");
        Fixture {
            _temp: temp,
            store,
            workspace,
            task,
        }
    }

    fn args(value: serde_json::Value) -> JsonObject {
        value.as_object().expect("object").clone()
    }

    #[test]
    fn write_code_strips_fences_and_writes_the_file() {
        let f = fixture("Write hello.py that prints hi");
        let chat = FakeChat::new("```python\nprint('hi')\n```");
        let ctx = AbilityContext {
            task_id: &f.task.task_id,
            step_id: "step-0001",
            input: "Write hello.py that prints hi",
            workspace: &f.workspace,
            store: &f.store,
            chat: &chat,
            model: "test-model",
        };

        let output = WriteCode
            .call(&ctx, &args(json!({"file": "hello.py"})))
            .expect("call");
        assert!(output.contains("hello.py"));
        assert_eq!(
            f.workspace.read(&f.task.task_id, "hello.py").expect("read"),
            b"print('hi')\n"
        );

        let requests = chat.requests.lock().unwrap();
        let user = &requests[0][1].content;
        assert!(user.contains("Write hello.py that prints hi"));
        // The step input matches the task input, so it is not repeated.
        assert!(!user.contains("Additional context"));
    }

    #[test]
    fn fix_code_feeds_failures_and_current_contents() {
        let f = fixture("Write hello.py that prints hi");
        f.workspace
            .write(&f.task.task_id, "hello.py", b"print('oops')\n")
            .expect("seed");
        let chat = FakeChat::new("print('hi')\n");
        let ctx = AbilityContext {
            task_id: &f.task.task_id,
            step_id: "step-0002",
            input: "Test `tests/test_hello.py::test_hi` failed: expected hi",
            workspace: &f.workspace,
            store: &f.store,
            chat: &chat,
            model: "test-model",
        };

        FixCode
            .call(&ctx, &args(json!({"file": "hello.py"})))
            .expect("call");
        assert_eq!(
            f.workspace.read(&f.task.task_id, "hello.py").expect("read"),
            b"print('hi')\n"
        );

        let requests = chat.requests.lock().unwrap();
        let user = &requests[0][1].content;
        assert!(user.contains("expected hi"));
        assert!(user.contains("print('oops')"));
    }

    #[test]
    fn fix_code_requires_an_existing_file() {
        let f = fixture("task");
        let chat = FakeChat::new("x = 1\n");
        let ctx = AbilityContext {
            task_id: &f.task.task_id,
            step_id: "step-0001",
            input: "failure",
            workspace: &f.workspace,
            store: &f.store,
            chat: &chat,
            model: "test-model",
        };

        assert!(FixCode.call(&ctx, &args(json!({"file": "absent.py"}))).is_err());
    }
}
