//! Verification adapter: runs the test suite against a task workspace.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::core::report::{FailureDetail, VerificationResult, parse_pytest_output};
use crate::io::config::VerifyConfig;
use crate::io::process::{command_from_argv, run_command_with_timeout};

/// Abstraction over verification backends.
pub trait Verifier {
    /// Run the check suite in `working_dir` and report structured results.
    fn run_tests(&self, working_dir: &Path) -> Result<VerificationResult>;
}

impl<T: Verifier + ?Sized> Verifier for &T {
    fn run_tests(&self, working_dir: &Path) -> Result<VerificationResult> {
        (**self).run_tests(working_dir)
    }
}

/// Verifier that spawns pytest (or a compatible command) in the workspace.
pub struct PytestVerifier {
    command: Vec<String>,
    timeout: Duration,
    output_limit_bytes: usize,
}

impl PytestVerifier {
    pub fn new(command: Vec<String>, timeout: Duration, output_limit_bytes: usize) -> Self {
        Self {
            command,
            timeout,
            output_limit_bytes,
        }
    }

    pub fn from_config(config: &VerifyConfig) -> Self {
        Self::new(
            config.command.clone(),
            Duration::from_secs(config.timeout_secs),
            config.output_limit_bytes,
        )
    }
}

impl Verifier for PytestVerifier {
    fn run_tests(&self, working_dir: &Path) -> Result<VerificationResult> {
        if !working_dir.exists() {
            // Nothing was produced yet, so there is nothing to check.
            debug!(dir = %working_dir.display(), "verification workdir missing, skipping");
            return Ok(VerificationResult::passed(0));
        }

        info!(dir = %working_dir.display(), "running verification");
        let mut cmd = command_from_argv(&self.command)?;
        cmd.current_dir(working_dir);
        let output = run_command_with_timeout(cmd, None, self.timeout, self.output_limit_bytes)
            .context("run verification command")?;

        if output.timed_out {
            warn!(timeout_secs = self.timeout.as_secs(), "verification timed out");
            return Ok(VerificationResult::failed(
                0,
                vec![FailureDetail::new(
                    "verification",
                    format!("test run timed out after {}s", self.timeout.as_secs()),
                )],
            ));
        }

        let report = output.combined_text();
        if let Some(result) = parse_pytest_output(&report) {
            debug!(
                success = result.success,
                checks = result.verification_count,
                failures = result.failures.len(),
                "verification finished"
            );
            return Ok(result);
        }

        // No recognizable summary; fall back on the exit status.
        if output.status.success() {
            Ok(VerificationResult::passed(0))
        } else {
            warn!(exit_code = ?output.status.code(), "verification produced no report");
            Ok(VerificationResult::failed(
                0,
                vec![FailureDetail::new(
                    "verification",
                    format!(
                        "test runner exited with {:?}: {}",
                        output.status.code(),
                        tail(&report, 2000)
                    ),
                )],
            ))
        }
    }
}

fn tail(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut start = text.len() - max_bytes;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}
