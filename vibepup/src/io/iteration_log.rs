//! `meta.json` for each iteration directory.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::types::{IterationStatus, Phase, TimeoutKind, TurnVerdict};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterationMeta {
    pub iteration: u32,
    pub phase: Phase,
    pub status: IterationStatus,
    pub duration_ms: u64,
    pub attempts: Vec<AttemptMeta>,
}

/// One model attempt. `timeout` is set only when the watchdog ended the turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptMeta {
    pub model: String,
    pub exit_code: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<TimeoutKind>,
    pub verdict: TurnVerdict,
}

pub fn write_iteration_meta(path: &Path, meta: &IterationMeta) -> Result<()> {
    let mut buf = serde_json::to_string_pretty(meta)?;
    buf.push('\n');
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))
}
