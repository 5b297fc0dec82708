//! Task/step/artifact persistence.
//!
//! Each task is one JSON document on disk, written atomically (temp file +
//! rename) and validated against an embedded JSON Schema on load. Task and
//! step ids are deterministic; nothing in the store is ever deleted, steps
//! are append-only.

use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::proposal::{AbilityInvocation, JsonObject};

const TASK_RECORD_SCHEMA: &str = include_str!(concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../schemas/task_record/v1.schema.json"
));

/// Lifecycle state of a step.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Completed,
    Failed,
}

/// The unit of work described by a natural-language goal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub task_id: String,
    pub input: String,
}

/// One iteration of propose/execute/verify within a task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub step_id: String,
    pub task_id: String,
    pub name: String,
    pub input: String,
    #[serde(default)]
    pub output: Option<String>,
    /// Wire contract: `{"ability": {"name": ..., "args": ...}}`. Absence of
    /// the key means the next invocation synthesizes via the model.
    #[serde(default)]
    pub additional_input: JsonObject,
    /// Orchestrator-produced metadata, e.g. the synthetic finish invocation
    /// recorded by fast termination.
    #[serde(default)]
    pub additional_output: JsonObject,
    pub status: StepStatus,
    pub is_last: bool,
}

impl Step {
    /// The ability attached to this step, parsed from the wire contract.
    pub fn ability(&self) -> Result<Option<AbilityInvocation>> {
        AbilityInvocation::from_wire(&self.additional_input)
            .with_context(|| format!("step {} ability payload", self.step_id))
    }
}

/// A workspace file produced by an ability.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    pub file_name: String,
}

/// Pagination metadata for list operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Page {
    pub total: usize,
    pub page: usize,
    pub page_size: usize,
}

/// Inputs for creating a step.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StepRequest {
    pub name: Option<String>,
    pub input: Option<String>,
    pub additional_input: JsonObject,
}

impl StepRequest {
    pub fn with_input(input: impl Into<String>) -> Self {
        Self {
            input: Some(input.into()),
            ..Self::default()
        }
    }

    pub fn with_ability(
        name: impl Into<String>,
        input: Option<String>,
        invocation: &AbilityInvocation,
    ) -> Self {
        Self {
            name: Some(name.into()),
            input,
            additional_input: invocation.to_wire(),
        }
    }

    /// The pre-chosen ability, when the wire contract carries one.
    pub fn ability(&self) -> Result<Option<AbilityInvocation>> {
        AbilityInvocation::from_wire(&self.additional_input).context("step request ability payload")
    }
}

/// Mutation applied to a step after execution.
#[derive(Clone, Debug)]
pub struct StepUpdate {
    pub status: StepStatus,
    pub output: Option<String>,
    pub additional_output: Option<JsonObject>,
    pub is_last: bool,
}

/// Persistence boundary for tasks, steps, and artifact metadata.
pub trait TaskStore {
    fn create_task(&self, input: &str) -> Result<Task>;
    fn get_task(&self, task_id: &str) -> Result<Task>;
    fn list_steps(&self, task_id: &str, page_size: usize) -> Result<(Vec<Step>, Page)>;
    fn create_step(&self, task_id: &str, request: &StepRequest, is_last: bool) -> Result<Step>;
    fn update_step(&self, task_id: &str, step_id: &str, update: StepUpdate) -> Result<Step>;
    fn create_artifact(&self, task_id: &str, file_name: &str) -> Result<Artifact>;
    fn list_artifacts(&self, task_id: &str) -> Result<(Vec<Artifact>, Page)>;
}

/// On-disk task document: the task plus its append-only step history.
#[derive(Clone, Debug, Serialize, Deserialize)]
struct TaskRecord {
    task_id: String,
    input: String,
    steps: Vec<Step>,
    artifacts: Vec<Artifact>,
}

/// Filesystem-backed [`TaskStore`], one directory per task.
#[derive(Debug, Clone)]
pub struct FsTaskStore {
    root: PathBuf,
}

impl FsTaskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// All task ids present in the store, in id order.
    pub fn list_tasks(&self) -> Result<Vec<Task>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut tasks = Vec::new();
        for entry in fs::read_dir(&self.root)
            .with_context(|| format!("read store dir {}", self.root.display()))?
        {
            let entry = entry.context("read store dir entry")?;
            if entry.path().join("task.json").exists() {
                let record = self.load(&entry.file_name().to_string_lossy())?;
                tasks.push(Task {
                    task_id: record.task_id,
                    input: record.input,
                });
            }
        }
        tasks.sort_by(|a, b| a.task_id.cmp(&b.task_id));
        Ok(tasks)
    }

    fn record_path(&self, task_id: &str) -> PathBuf {
        self.root.join(task_id).join("task.json")
    }

    fn load(&self, task_id: &str) -> Result<TaskRecord> {
        let path = self.record_path(task_id);
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("read task record {}", path.display()))?;
        let value: Value = serde_json::from_str(&contents)
            .with_context(|| format!("parse task record {}", path.display()))?;
        validate_record_schema(&value)
            .with_context(|| format!("validate task record {}", path.display()))?;
        serde_json::from_value(value)
            .with_context(|| format!("deserialize task record {}", path.display()))
    }

    fn save(&self, record: &TaskRecord) -> Result<()> {
        let path = self.record_path(&record.task_id);
        let parent = path
            .parent()
            .ok_or_else(|| anyhow!("task record path missing parent"))?;
        fs::create_dir_all(parent)
            .with_context(|| format!("create task dir {}", parent.display()))?;
        let mut buf = serde_json::to_string_pretty(record)?;
        buf.push('\n');
        let tmp_path = path.with_extension("json.tmp");
        fs::write(&tmp_path, &buf)
            .with_context(|| format!("write temp task record {}", tmp_path.display()))?;
        fs::rename(&tmp_path, &path)
            .with_context(|| format!("replace task record {}", path.display()))?;
        Ok(())
    }

    fn next_task_id(&self) -> Result<String> {
        for n in 1..=9999u32 {
            let id = format!("task-{n:04}");
            if !self.root.join(&id).exists() {
                return Ok(id);
            }
        }
        Err(anyhow!("task id space exhausted"))
    }
}

impl TaskStore for FsTaskStore {
    fn create_task(&self, input: &str) -> Result<Task> {
        let task_id = self.next_task_id()?;
        let record = TaskRecord {
            task_id: task_id.clone(),
            input: input.to_string(),
            steps: Vec::new(),
            artifacts: Vec::new(),
        };
        self.save(&record)?;
        debug!(%task_id, "created task");
        Ok(Task {
            task_id,
            input: record.input,
        })
    }

    fn get_task(&self, task_id: &str) -> Result<Task> {
        let record = self.load(task_id)?;
        Ok(Task {
            task_id: record.task_id,
            input: record.input,
        })
    }

    fn list_steps(&self, task_id: &str, page_size: usize) -> Result<(Vec<Step>, Page)> {
        let record = self.load(task_id)?;
        let page = Page {
            total: record.steps.len(),
            page: 1,
            page_size,
        };
        let steps = record.steps.into_iter().take(page_size).collect();
        Ok((steps, page))
    }

    fn create_step(&self, task_id: &str, request: &StepRequest, is_last: bool) -> Result<Step> {
        let mut record = self.load(task_id)?;
        let step = Step {
            step_id: format!("step-{:04}", record.steps.len() + 1),
            task_id: task_id.to_string(),
            name: request.name.clone().unwrap_or_else(|| "Step".to_string()),
            input: request.input.clone().unwrap_or_default(),
            output: None,
            additional_input: request.additional_input.clone(),
            additional_output: JsonObject::new(),
            status: StepStatus::Pending,
            is_last,
        };
        record.steps.push(step.clone());
        self.save(&record)?;
        debug!(task_id, step_id = %step.step_id, is_last, "created step");
        Ok(step)
    }

    fn update_step(&self, task_id: &str, step_id: &str, update: StepUpdate) -> Result<Step> {
        let mut record = self.load(task_id)?;
        let step = record
            .steps
            .iter_mut()
            .find(|step| step.step_id == step_id)
            .ok_or_else(|| anyhow!("no step {step_id} in task {task_id}"))?;
        step.status = update.status;
        step.output = update.output;
        step.is_last = update.is_last;
        if let Some(additional_output) = update.additional_output {
            step.additional_output = additional_output;
        }
        let updated = step.clone();
        self.save(&record)?;
        debug!(task_id, step_id, status = ?updated.status, "updated step");
        Ok(updated)
    }

    fn create_artifact(&self, task_id: &str, file_name: &str) -> Result<Artifact> {
        let mut record = self.load(task_id)?;
        let artifact = Artifact {
            file_name: file_name.to_string(),
        };
        if !record.artifacts.iter().any(|a| a.file_name == file_name) {
            record.artifacts.push(artifact.clone());
            self.save(&record)?;
        }
        Ok(artifact)
    }

    fn list_artifacts(&self, task_id: &str) -> Result<(Vec<Artifact>, Page)> {
        let record = self.load(task_id)?;
        let page = Page {
            total: record.artifacts.len(),
            page: 1,
            page_size: record.artifacts.len(),
        };
        Ok((record.artifacts, page))
    }
}

fn validate_record_schema(record: &Value) -> Result<()> {
    static VALIDATOR: LazyLock<jsonschema::Validator> = LazyLock::new(|| {
        let schema: Value =
            serde_json::from_str(TASK_RECORD_SCHEMA).expect("embedded schema is valid JSON");
        jsonschema::validator_for(&schema).expect("embedded schema compiles")
    });
    let messages: Vec<String> = VALIDATOR
        .iter_errors(record)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(anyhow!("schema validation failed: {}", messages.join("; ")));
    }
    Ok(())
}
