//! Test-only scripted collaborators and fixture helpers.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Result, anyhow};
use serde_json::Value;

use crate::core::proposal::JsonObject;
use crate::core::report::VerificationResult;
use crate::io::chat::{ChatCompletion, Message};
use crate::io::verify::Verifier;

/// Chat transport that replays a fixed script and records every conversation
/// it was sent.
pub struct ScriptedChat {
    script: Mutex<VecDeque<Result<String, String>>>,
    conversations: Mutex<Vec<Vec<Message>>>,
}

impl ScriptedChat {
    pub fn with_responses<S: Into<String>>(responses: impl IntoIterator<Item = S>) -> Self {
        Self {
            script: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
            conversations: Mutex::new(Vec::new()),
        }
    }

    /// A transport whose single response is a transport-level failure.
    pub fn with_error(message: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::from([Err(message.to_string())])),
            conversations: Mutex::new(Vec::new()),
        }
    }

    /// Number of completion calls made so far.
    pub fn calls(&self) -> usize {
        self.conversations.lock().unwrap().len()
    }

    /// The conversation sent on the `index`-th call.
    pub fn conversation(&self, index: usize) -> Vec<Message> {
        self.conversations.lock().unwrap()[index].clone()
    }
}

impl ChatCompletion for ScriptedChat {
    fn complete(&self, messages: &[Message], _model: &str) -> Result<String> {
        self.conversations.lock().unwrap().push(messages.to_vec());
        match self.script.lock().unwrap().pop_front() {
            Some(Ok(response)) => Ok(response),
            Some(Err(message)) => Err(anyhow!("{message}")),
            None => Err(anyhow!("scripted chat exhausted")),
        }
    }
}

/// Verifier that replays fixed results and records the directories checked.
pub struct ScriptedVerifier {
    script: Mutex<VecDeque<VerificationResult>>,
    checked: Mutex<Vec<PathBuf>>,
}

impl ScriptedVerifier {
    pub fn with_results(results: impl IntoIterator<Item = VerificationResult>) -> Self {
        Self {
            script: Mutex::new(results.into_iter().collect()),
            checked: Mutex::new(Vec::new()),
        }
    }

    /// A verifier that must never be called; any call fails the test.
    pub fn unused() -> Self {
        Self::with_results([])
    }

    /// Number of verification runs so far.
    pub fn calls(&self) -> usize {
        self.checked.lock().unwrap().len()
    }
}

impl Verifier for ScriptedVerifier {
    fn run_tests(&self, working_dir: &Path) -> Result<VerificationResult> {
        self.checked.lock().unwrap().push(working_dir.to_path_buf());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow!("scripted verifier exhausted"))
    }
}

/// Build a model response proposing one ability step.
pub fn proposal_json(step_name: &str, ability: &str, args: Value) -> String {
    serde_json::json!({
        "step": {
            "name": step_name,
            "ability": {"name": ability, "args": args}
        }
    })
    .to_string()
}

/// Shorthand for a JSON object literal.
pub fn json_object(value: Value) -> JsonObject {
    value.as_object().expect("json object literal").clone()
}
