//! Orchestration of the per-task step loop.
//!
//! One `execute_step` call advances a task by exactly one step: it resumes
//! the last incomplete step or synthesizes a new one, executes the chosen
//! ability, verifies code-producing output, and either schedules the
//! follow-up step or terminates the task.

use anyhow::{Context, Result, anyhow};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::abilities::{
    AbilityContext, AbilityRegistry, CODE_ABILITIES, FINISH, FIX_CODE, WRITE_FILE,
};
use crate::core::proposal::{AbilityInvocation, JsonObject};
use crate::io::chat::{ChatCompletion, Message};
use crate::io::config::AgentConfig;
use crate::io::prompt::{FileContext, PromptEngine, StepContext};
use crate::io::store::{Step, StepRequest, StepStatus, StepUpdate, Task, TaskStore};
use crate::io::verify::Verifier;
use crate::io::workspace::Workspace;
use crate::synthesis::request_proposal;

/// Page size when listing a task's steps.
const STEP_PAGE_SIZE: usize = 100;

/// Display name of the forced terminal step created past the give-up
/// threshold.
pub const GIVE_UP_STEP_NAME: &str = "Giving up";

/// The per-task loop driver.
///
/// A `TaskAgent` owns no per-task state; every invocation reloads the task
/// from the store, so tasks may be driven across process restarts. Callers
/// must not advance the same task concurrently: the resume-before-create
/// rule assumes a single in-flight invocation per task.
pub struct TaskAgent<S, C, V> {
    store: S,
    workspace: Workspace,
    registry: AbilityRegistry,
    chat: C,
    verifier: V,
    config: AgentConfig,
    prompts: PromptEngine,
}

impl<S: TaskStore, C: ChatCompletion, V: Verifier> TaskAgent<S, C, V> {
    pub fn new(
        store: S,
        workspace: Workspace,
        registry: AbilityRegistry,
        chat: C,
        verifier: V,
        config: AgentConfig,
    ) -> Self {
        let prompts = PromptEngine::new(config.reasoning);
        Self {
            store,
            workspace,
            registry,
            chat,
            verifier,
            config,
            prompts,
        }
    }

    pub fn create_task(&self, input: &str) -> Result<Task> {
        let task = self.store.create_task(input)?;
        info!(task_id = %task.task_id, input = %task.input, "task created");
        Ok(task)
    }

    /// Advance the task by one step.
    ///
    /// Returns the step that was executed (completed or failed). Calling this
    /// on a task whose last step is completed and terminal returns that step
    /// unchanged and creates nothing.
    pub fn execute_step(&self, task_id: &str, request: StepRequest) -> Result<Step> {
        let task = self.store.get_task(task_id)?;
        let (mut steps, _) = self.store.list_steps(task_id, STEP_PAGE_SIZE)?;

        if let Some(last) = steps.last()
            && last.status == StepStatus::Completed
            && last.is_last
        {
            debug!(task_id, "task already complete, nothing to do");
            return Ok(last.clone());
        }

        let step = match steps.pop().filter(|step| step.status != StepStatus::Completed) {
            Some(step) => {
                debug!(step_id = %step.step_id, "resuming incomplete step");
                step
            }
            None => self.next_step(&task, request)?,
        };

        let invocation = step
            .ability()?
            .ok_or_else(|| anyhow!("step {} has no ability attached", step.step_id))?;

        let ctx = AbilityContext {
            task_id,
            step_id: &step.step_id,
            input: &step.input,
            workspace: &self.workspace,
            store: &self.store,
            chat: &self.chat,
            model: &self.config.model,
        };
        let output = match self.registry.invoke(&ctx, &invocation.name, &invocation.args) {
            Ok(output) => output,
            Err(err) => {
                let failure = format!(
                    "Failed to run ability {} with arguments {}: {err:?}",
                    invocation.name,
                    Value::Object(invocation.args.clone())
                );
                warn!(step_id = %step.step_id, "step failed: {failure}");
                return self.store.update_step(
                    task_id,
                    &step.step_id,
                    StepUpdate {
                        status: StepStatus::Failed,
                        output: Some(failure),
                        additional_output: None,
                        is_last: false,
                    },
                );
            }
        };

        let mut is_last = step.is_last;
        let mut additional_output: Option<JsonObject> = None;
        let mut follow_up: Option<StepRequest> = None;

        if CODE_ABILITIES.contains(&invocation.name.as_str()) {
            let report = self
                .verifier
                .run_tests(&self.workspace.task_dir(task_id))
                .context("run verification")?;
            if !report.success {
                let mut input = report
                    .failures
                    .iter()
                    .map(|failure| failure.to_prompt())
                    .collect::<Vec<_>>()
                    .join("\n\n");
                input.push_str(&format!(
                    "\n\n{} out of {} tests failed!",
                    report.failures.len(),
                    report.verification_count
                ));
                let mut args = JsonObject::new();
                args.insert(
                    "file".to_string(),
                    invocation.args.get("file").cloned().unwrap_or(Value::Null),
                );
                let fix = AbilityInvocation::new(FIX_CODE, args);
                info!(
                    failures = report.failures.len(),
                    checks = report.verification_count,
                    "verification failed, scheduling fix"
                );
                follow_up = Some(StepRequest::with_ability("Fix code", Some(input), &fix));
            } else if self.config.fast_termination {
                debug!("tests passed, finishing without a wrap-up step");
                is_last = true;
            } else {
                follow_up = Some(StepRequest::with_input(format!(
                    "{} tests passed!",
                    report.verification_count
                )));
            }
        } else if self.config.fast_termination && invocation.name == WRITE_FILE {
            debug!("file written, finishing without a wrap-up step");
            is_last = true;
            let mut args = JsonObject::new();
            args.insert(
                "reason".to_string(),
                Value::String("The task is complete".to_string()),
            );
            additional_output = Some(AbilityInvocation::new(FINISH, args).to_wire());
        } else if !is_last {
            follow_up = Some(StepRequest::with_input(output.clone()));
        }

        let completed = self.store.update_step(
            task_id,
            &step.step_id,
            StepUpdate {
                status: StepStatus::Completed,
                output: Some(output),
                additional_output,
                is_last,
            },
        )?;
        info!(step_id = %completed.step_id, is_last = completed.is_last, "step completed");

        if completed.is_last {
            info!(task_id, "task completed");
        } else {
            let next = self.next_step(&task, follow_up.unwrap_or_default())?;
            debug!(step_id = %next.step_id, "created follow-up step");
        }

        Ok(completed)
    }

    /// Create the next pending step: forced give-up past the threshold, the
    /// pre-chosen ability when the request carries one, otherwise model
    /// synthesis.
    fn next_step(&self, task: &Task, request: StepRequest) -> Result<Step> {
        let (previous_steps, page) = self.store.list_steps(&task.task_id, STEP_PAGE_SIZE)?;

        // Hard upper bound on loop length, independent of model behavior.
        if page.total > self.config.max_task_steps as usize {
            info!(steps = page.total, "step budget exceeded, giving up");
            let mut args = JsonObject::new();
            args.insert(
                "reason".to_string(),
                Value::String("Giving up...".to_string()),
            );
            let give_up = StepRequest::with_ability(
                GIVE_UP_STEP_NAME,
                Some(GIVE_UP_STEP_NAME.to_string()),
                &AbilityInvocation::new(FINISH, args),
            );
            return self.store.create_step(&task.task_id, &give_up, true);
        }

        if let Some(invocation) = request.ability()? {
            let is_last = invocation.name == FINISH;
            debug!(ability = %invocation.name, is_last, "creating step with pre-chosen ability");
            return self.store.create_step(&task.task_id, &request, is_last);
        }

        let system = self.prompts.render_system(&self.registry.catalogue())?;
        let format = self.prompts.render_format()?;
        let mut messages = vec![Message::system(system), Message::system(format)];

        let (artifacts, _) = self.store.list_artifacts(&task.task_id)?;
        let mut files = Vec::new();
        for artifact in &artifacts {
            let bytes = self
                .workspace
                .read(&task.task_id, &artifact.file_name)
                .with_context(|| format!("read artifact {}", artifact.file_name))?;
            files.push(FileContext {
                file_path: artifact.file_name.clone(),
                content: String::from_utf8_lossy(&bytes).into_owned(),
            });
        }

        // Only surface the step input when it deviates from the task input.
        let step_input = request
            .input
            .as_deref()
            .map(str::trim)
            .filter(|input| !input.is_empty() && *input != task.input.trim());
        let history: Vec<StepContext> = previous_steps.iter().map(StepContext::from_step).collect();
        let user = self
            .prompts
            .render_user(&task.input, step_input, &files, &history)?;
        debug!(prompt = %user, "synthesis user prompt");
        messages.push(Message::user(user));

        let proposal = request_proposal(
            &self.chat,
            messages,
            &self.config.model,
            self.config.proposal_retries,
            &self.registry.names(),
        )?;
        let is_last = proposal.ability.name == FINISH;
        let created = StepRequest {
            name: Some(proposal.name),
            input: proposal.speak.or(request.input),
            additional_input: proposal.ability.to_wire(),
        };
        self.store.create_step(&task.task_id, &created, is_last)
    }
}
