//! Stable exit codes for the vibepup CLI.

/// Bounded run finished, completion sentinel seen, or a read-only command succeeded.
pub const OK: i32 = 0;
/// Fatal setup or loop error, or a failed architect step without its own code.
pub const FAILURE: i32 = 1;
/// The agent executable is missing or cannot be run.
pub const MISSING_AGENT: i32 = 127;
