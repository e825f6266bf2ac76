//! Classification of agent responses.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::TurnVerdict;

/// Literal marker the agent prints when it considers the whole task list done.
pub const COMPLETION_SENTINEL: &str = "<promise>COMPLETE</promise>";

static UNSUPPORTED_MODEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)not supported|ModelNotFoundError|Make sure the model is enabled")
        .expect("unsupported-model pattern should be valid")
});

/// True when the response shows the agent rejected the requested model.
pub fn is_model_unsupported(response: &str) -> bool {
    UNSUPPORTED_MODEL_RE.is_match(response)
}

/// True when the response carries the completion sentinel.
pub fn signals_completion(response: &str) -> bool {
    response.contains(COMPLETION_SENTINEL)
}

/// Classify a finished turn.
///
/// The unsupported-model check wins over the exit code: some agent versions
/// exit 0 after printing the rejection. A watchdog kill is always a failure,
/// whatever code the platform reported.
pub fn classify_turn(exit_code: i32, timed_out: bool, response: &str) -> TurnVerdict {
    if is_model_unsupported(response) {
        return TurnVerdict::Unsupported;
    }
    if exit_code == 0 && !timed_out && !response.trim().is_empty() {
        return TurnVerdict::Success;
    }
    TurnVerdict::Failed
}
