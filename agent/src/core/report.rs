//! Verification report types and the pytest terminal-output parser.
//!
//! Reports are produced fresh per verification call and never persisted; the
//! orchestrator only renders them into the next step's input.

use std::sync::LazyLock;

/// One failing check, renderable as a prompt fragment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FailureDetail {
    /// Test identifier, e.g. `tests/test_hi.py::test_prints_hi`.
    pub test_name: String,
    /// Failure message as reported by the test runner.
    pub message: String,
}

impl FailureDetail {
    pub fn new(test_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            message: message.into(),
        }
    }

    /// Render this failure for inclusion in a model prompt.
    pub fn to_prompt(&self) -> String {
        if self.message.is_empty() {
            format!("Test `{}` failed.", self.test_name)
        } else {
            format!("Test `{}` failed: {}", self.test_name, self.message)
        }
    }
}

/// Structured pass/fail outcome of one verification run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VerificationResult {
    pub success: bool,
    /// Total number of checks the runner executed.
    pub verification_count: u32,
    /// Failing checks in report order.
    pub failures: Vec<FailureDetail>,
}

impl VerificationResult {
    /// A run where every check passed (also used for "nothing to verify").
    pub fn passed(verification_count: u32) -> Self {
        Self {
            success: true,
            verification_count,
            failures: Vec::new(),
        }
    }

    pub fn failed(verification_count: u32, failures: Vec<FailureDetail>) -> Self {
        Self {
            success: false,
            verification_count,
            failures,
        }
    }
}

static FAILED_LINE_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?m)^FAILED (\S+)(?: - (.*))?$").unwrap());
static FAILED_COUNT_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(\d+) failed").unwrap());
static PASSED_COUNT_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(\d+) passed").unwrap());
static ERROR_COUNT_RE: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(\d+) errors?").unwrap());

fn count(re: &regex::Regex, report: &str) -> u32 {
    re.captures_iter(report)
        .last()
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

/// Parse pytest terminal output (`pytest -q`) into a structured result.
///
/// Returns `None` when the output carries no recognizable summary, leaving it
/// to the caller to fall back on the process exit status.
pub fn parse_pytest_output(report: &str) -> Option<VerificationResult> {
    if report.contains("no tests ran") {
        return Some(VerificationResult::passed(0));
    }

    let failed = count(&FAILED_COUNT_RE, report);
    let passed = count(&PASSED_COUNT_RE, report);
    let errored = count(&ERROR_COUNT_RE, report);
    if failed == 0 && passed == 0 && errored == 0 {
        return None;
    }

    let total = failed + passed + errored;
    if failed == 0 && errored == 0 {
        return Some(VerificationResult::passed(total));
    }

    let mut failures: Vec<FailureDetail> = FAILED_LINE_RE
        .captures_iter(report)
        .map(|caps| {
            FailureDetail::new(
                caps.get(1).map_or("", |m| m.as_str()),
                caps.get(2).map_or("", |m| m.as_str()),
            )
        })
        .collect();
    if failures.is_empty() {
        // Summary counted failures but no short summary lines were printed.
        failures.push(FailureDetail::new(
            "pytest",
            format!("{failed} test(s) failed, see runner output"),
        ));
    }
    Some(VerificationResult::failed(total, failures))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_failures_with_messages() {
        let report = "\
FAILED tests/test_hi.py::test_prints_hi - AssertionError: assert 'hi' in ''
FAILED tests/test_hi.py::test_exit_code
1 failed, 4 passed in 0.12s
";
        let result = parse_pytest_output(report).expect("result");
        assert!(!result.success);
        assert_eq!(result.verification_count, 5);
        assert_eq!(result.failures.len(), 2);
        assert_eq!(
            result.failures[0].to_prompt(),
            "Test `tests/test_hi.py::test_prints_hi` failed: AssertionError: assert 'hi' in ''"
        );
        assert_eq!(
            result.failures[1].to_prompt(),
            "Test `tests/test_hi.py::test_exit_code` failed."
        );
    }

    #[test]
    fn all_passed_is_success() {
        let result = parse_pytest_output("3 passed in 0.03s\n").expect("result");
        assert_eq!(result, VerificationResult::passed(3));
    }

    #[test]
    fn no_tests_ran_counts_as_success_with_zero_checks() {
        let result = parse_pytest_output("no tests ran in 0.01s\n").expect("result");
        assert_eq!(result, VerificationResult::passed(0));
    }

    #[test]
    fn unrecognizable_output_returns_none() {
        assert_eq!(parse_pytest_output("command not found: pytest\n"), None);
    }

    #[test]
    fn counted_failures_without_summary_lines_get_a_synthetic_detail() {
        let result = parse_pytest_output("2 failed in 0.50s\n").expect("result");
        assert!(!result.success);
        assert_eq!(result.failures.len(), 1);
        assert!(result.failures[0].message.contains("2 test(s) failed"));
    }
}
