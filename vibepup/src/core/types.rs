//! Shared types for the loop core.
//!
//! These types define stable contracts between the engine, the watchdog and
//! the iteration artifacts written under `.ralph/runs/`.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Iteration phase, derived from on-disk state before every pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    /// Exploration and mapping only; no implementation work.
    Plan,
    /// Implementation against the task checklist.
    Build,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Plan => "PLAN",
            Phase::Build => "BUILD",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Watchdog deadline that ended a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeoutKind {
    /// No byte arrived on stdout or stderr for longer than the hang threshold.
    NoOutput,
    /// The turn ran longer than the max-duration threshold.
    MaxDuration,
}

/// Interpretation of a single model attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnVerdict {
    /// Exit code 0, no watchdog kill, non-empty response.
    Success,
    /// The agent rejected the model; fall back without counting a failure.
    Unsupported,
    /// Anything else (non-zero exit, empty response, watchdog kill).
    Failed,
}

/// Overall result of one iteration pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IterationStatus {
    /// A model produced a usable response.
    Success,
    /// A model produced a usable response carrying the completion sentinel.
    Complete,
    /// Every candidate model was unsupported or failed.
    Failed,
}

/// Snapshot of one model attempt inside an iteration.
///
/// Lives only while the engine decides what to do next; it is persisted
/// through the files in `directory`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IterationRecord {
    pub index: u32,
    pub directory: PathBuf,
    pub phase: Phase,
    pub model: String,
    pub exit_code: i32,
    pub response_text: String,
}
