//! Drive a task to completion by invoking `execute_step` repeatedly.

use anyhow::Result;

use crate::io::chat::ChatCompletion;
use crate::io::store::{Step, StepRequest, StepStatus, TaskStore};
use crate::io::verify::Verifier;
use crate::step::{GIVE_UP_STEP_NAME, TaskAgent};

/// Reason why [`run_task`] stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStop {
    /// The task reached a terminal step.
    Completed,
    /// The step budget forced a terminal give-up step.
    GaveUp,
    /// A step failed during ability execution; re-invoking may recover.
    Failed { step_id: String },
}

/// Summary of one [`run_task`] invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    pub task_id: String,
    pub steps_executed: u32,
    pub stop: TaskStop,
}

/// Advance the task step by step until it terminates or a step fails.
///
/// Stops immediately on orchestration errors (transport failure, retry
/// exhaustion, storage errors). A failed step is reported as an outcome, not
/// an error, because the caller may re-invoke to recover.
pub fn run_task<S, C, V, F>(
    agent: &TaskAgent<S, C, V>,
    task_id: &str,
    mut on_step: F,
) -> Result<TaskOutcome>
where
    S: TaskStore,
    C: ChatCompletion,
    V: Verifier,
    F: FnMut(&Step),
{
    let mut steps_executed = 0u32;
    loop {
        let step = agent.execute_step(task_id, StepRequest::default())?;
        steps_executed += 1;
        on_step(&step);

        if step.status == StepStatus::Failed {
            return Ok(TaskOutcome {
                task_id: task_id.to_string(),
                steps_executed,
                stop: TaskStop::Failed {
                    step_id: step.step_id,
                },
            });
        }
        if step.is_last {
            let stop = if step.name == GIVE_UP_STEP_NAME {
                TaskStop::GaveUp
            } else {
                TaskStop::Completed
            };
            return Ok(TaskOutcome {
                task_id: task_id.to_string(),
                steps_executed,
                stop,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::abilities::AbilityRegistry;
    use crate::io::config::AgentConfig;
    use crate::io::store::FsTaskStore;
    use crate::io::workspace::Workspace;
    use crate::test_support::{ScriptedChat, ScriptedVerifier, proposal_json};
    use serde_json::json;

    fn agent<'a>(
        temp: &tempfile::TempDir,
        chat: &'a ScriptedChat,
        verifier: &'a ScriptedVerifier,
    ) -> TaskAgent<FsTaskStore, &'a ScriptedChat, &'a ScriptedVerifier> {
        TaskAgent::new(
            FsTaskStore::new(temp.path().join("tasks")),
            Workspace::new(temp.path().join("workspace")),
            AbilityRegistry::builtin(),
            chat,
            verifier,
            AgentConfig::default(),
        )
    }

    #[test]
    fn stops_when_the_task_terminates() {
        let temp = tempfile::tempdir().expect("tempdir");
        let chat = ScriptedChat::with_responses([proposal_json(
            "Write hello",
            "write_file",
            json!({"file": "hello.py", "contents": "print('hi')\n"}),
        )]);
        let verifier = ScriptedVerifier::unused();
        let agent = agent(&temp, &chat, &verifier);

        let task = agent.create_task("Write hello.py").expect("task");
        let mut seen = Vec::new();
        let outcome = run_task(&agent, &task.task_id, |step| seen.push(step.step_id.clone()))
            .expect("run");

        assert_eq!(outcome.stop, TaskStop::Completed);
        assert_eq!(outcome.steps_executed, 1);
        assert_eq!(seen, vec!["step-0001"]);
    }

    #[test]
    fn reports_a_failed_step_without_erroring() {
        let temp = tempfile::tempdir().expect("tempdir");
        let chat = ScriptedChat::with_responses([proposal_json(
            "Fix code",
            "fix_code",
            json!({"file": "absent.py"}),
        )]);
        let verifier = ScriptedVerifier::unused();
        let agent = agent(&temp, &chat, &verifier);

        let task = agent.create_task("fix it").expect("task");
        let outcome = run_task(&agent, &task.task_id, |_| {}).expect("run");

        assert_eq!(
            outcome.stop,
            TaskStop::Failed {
                step_id: "step-0001".to_string()
            }
        );
    }
}
