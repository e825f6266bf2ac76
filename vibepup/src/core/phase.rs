//! Phase classification from the phase-signal file contents.

use crate::core::types::Phase;

/// Classify the phase from the signal file contents.
///
/// - `None` (file absent) is `PLAN`.
/// - Empty or whitespace-only contents are `PLAN`.
/// - Anything else is `BUILD`.
pub fn phase_from_signal(contents: Option<&str>) -> Phase {
    match contents {
        Some(text) if !text.trim().is_empty() => Phase::Build,
        _ => Phase::Plan,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_signal_is_plan() {
        assert_eq!(phase_from_signal(None), Phase::Plan);
    }

    #[test]
    fn whitespace_signal_is_plan() {
        assert_eq!(phase_from_signal(Some("")), Phase::Plan);
        assert_eq!(phase_from_signal(Some("  \n\t\r\n")), Phase::Plan);
    }

    #[test]
    fn any_content_is_build() {
        assert_eq!(phase_from_signal(Some("# Repo map\n")), Phase::Build);
        assert_eq!(phase_from_signal(Some("\n x \n")), Phase::Build);
    }
}
