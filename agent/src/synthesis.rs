//! Bounded-retry step synthesis over the completion transport.
//!
//! One call here yields exactly one accepted proposal or fails. Retries are
//! an explicit loop with an attempt counter and an accumulated message log;
//! transport errors are never retried, only parse and validation outcomes
//! consume attempts.

use std::fmt;

use anyhow::Result;
use tracing::{debug, warn};

use crate::core::parser::{ParsedResponse, parse_step_response};
use crate::core::proposal::StepProposal;
use crate::core::validator::violations;
use crate::io::chat::{ChatCompletion, Message};

/// Fixed default retry budget: attempts beyond the first completion call.
pub const DEFAULT_RETRY_BUDGET: u32 = 2;

/// The retry budget was exhausted without an acceptable proposal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryExhaustedError {
    /// Total completion attempts made.
    pub attempts: u32,
}

impl fmt::Display for RetryExhaustedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no acceptable step proposal after {} attempts",
            self.attempts
        )
    }
}

impl std::error::Error for RetryExhaustedError {}

/// Request one structured step proposal from the model.
///
/// Decode failures and missing steps append a corrective user turn before the
/// next attempt; validation failures re-send the conversation unmodified.
/// That asymmetry is inherited behavior, kept deliberately (the violations
/// are still logged for observability).
pub fn request_proposal(
    chat: &dyn ChatCompletion,
    mut messages: Vec<Message>,
    model: &str,
    retry_budget: u32,
    ability_names: &[String],
) -> Result<StepProposal> {
    let mut attempt: u32 = 0;

    loop {
        // Transport failures propagate immediately; they are not retryable.
        let response = chat.complete(&messages, model)?;

        let correction = match parse_step_response(&response) {
            ParsedResponse::Step { step, thoughts } => {
                let found = violations(&step, ability_names);
                if found.is_empty() {
                    if let Some(thoughts) = &thoughts {
                        debug!(
                            reasoning = thoughts.reasoning.as_deref(),
                            criticism = thoughts.criticism.as_deref(),
                            "proposal thoughts"
                        );
                    }
                    let proposal = StepProposal::from_step(&step, thoughts)?;
                    debug!(ability = %proposal.ability.name, "accepted step proposal");
                    return Ok(proposal);
                }
                warn!(violations = found.join("; "), "rejected step proposal");
                // Invalid-ability errors get no corrective message.
                None
            }
            ParsedResponse::NoStep => {
                warn!(attempt, "response contained no step");
                Some("You must provide a step.".to_string())
            }
            ParsedResponse::Invalid { reason } => {
                warn!(attempt, reason = %reason, "response did not decode");
                Some(format!("Invalid response: {reason}. Please try again."))
            }
        };

        if attempt >= retry_budget {
            warn!(attempts = attempt + 1, "retry budget exhausted, aborting");
            return Err(RetryExhaustedError {
                attempts: attempt + 1,
            }
            .into());
        }
        attempt += 1;
        if let Some(correction) = correction {
            messages.push(Message::user(correction));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedChat;

    fn names() -> Vec<String> {
        ["write_file", "finish"]
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    fn seed() -> Vec<Message> {
        vec![Message::system("system"), Message::user("task")]
    }

    const GOOD: &str =
        r#"{"step": {"name": "Write", "ability": {"name": "write_file", "args": {"file": "a"}}}}"#;

    #[test]
    fn accepts_a_valid_first_proposal() {
        let chat = ScriptedChat::with_responses([GOOD]);
        let proposal =
            request_proposal(&chat, seed(), "m", DEFAULT_RETRY_BUDGET, &names()).expect("proposal");
        assert_eq!(proposal.name, "Write");
        assert_eq!(proposal.ability.name, "write_file");
        assert_eq!(chat.calls(), 1);
    }

    #[test]
    fn decode_failure_appends_a_corrective_turn_then_retries() {
        let chat = ScriptedChat::with_responses(["not json", GOOD]);
        let proposal =
            request_proposal(&chat, seed(), "m", DEFAULT_RETRY_BUDGET, &names()).expect("proposal");
        assert_eq!(proposal.ability.name, "write_file");
        assert_eq!(chat.calls(), 2);

        let second = chat.conversation(1);
        assert_eq!(second.len(), 3);
        assert!(second[2].content.starts_with("Invalid response:"));
        assert!(second[2].content.ends_with("Please try again."));
    }

    #[test]
    fn missing_step_demands_one() {
        let chat = ScriptedChat::with_responses([r#"{"thoughts": {"text": "hmm"}}"#, GOOD]);
        request_proposal(&chat, seed(), "m", DEFAULT_RETRY_BUDGET, &names()).expect("proposal");
        let second = chat.conversation(1);
        assert_eq!(second[2].content, "You must provide a step.");
    }

    #[test]
    fn validation_failure_resends_the_unmodified_conversation() {
        let unknown =
            r#"{"step": {"name": "Deploy", "ability": {"name": "deploy", "args": {}}}}"#;
        let chat = ScriptedChat::with_responses([unknown, GOOD]);
        request_proposal(&chat, seed(), "m", DEFAULT_RETRY_BUDGET, &names()).expect("proposal");
        assert_eq!(chat.calls(), 2);
        // No corrective turn for invalid abilities.
        assert_eq!(chat.conversation(1), seed());
    }

    #[test]
    fn three_decode_failures_raise_retry_exhausted() {
        let chat = ScriptedChat::with_responses(["nope", "still nope", "never"]);
        let err = request_proposal(&chat, seed(), "m", DEFAULT_RETRY_BUDGET, &names()).unwrap_err();
        let exhausted = err
            .downcast_ref::<RetryExhaustedError>()
            .expect("retry exhausted");
        assert_eq!(exhausted.attempts, 3);
        assert_eq!(chat.calls(), 3);
    }

    #[test]
    fn transport_errors_are_fatal_without_retry() {
        let chat = ScriptedChat::with_error("rate limited");
        let err = request_proposal(&chat, seed(), "m", DEFAULT_RETRY_BUDGET, &names()).unwrap_err();
        assert!(err.downcast_ref::<RetryExhaustedError>().is_none());
        assert!(err.to_string().contains("rate limited"));
        assert_eq!(chat.calls(), 1);
    }

    #[test]
    fn unknown_ability_never_reaches_acceptance() {
        let unknown = r#"{"step": {"ability": {"name": "deploy", "args": {}}}}"#;
        let chat = ScriptedChat::with_responses([unknown, unknown, unknown]);
        let err = request_proposal(&chat, seed(), "m", DEFAULT_RETRY_BUDGET, &names()).unwrap_err();
        assert!(err.downcast_ref::<RetryExhaustedError>().is_some());
    }
}
