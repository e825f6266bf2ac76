//! Append-only progress log helpers.

use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::Path;

use anyhow::{Context, Result};

use crate::core::tail::tail_lines;

/// Line appended to `progress.log` when an external task edit restarts the loop.
pub const RESTART_MARKER: &str = "--- PRD CHANGED: RESTARTING LOOP ---";

pub fn append_restart_marker(path: &Path) -> Result<()> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    writeln!(file, "{RESTART_MARKER}").with_context(|| format!("append {}", path.display()))
}

/// Last `max_lines` lines of the progress log; empty when the log is missing.
pub fn read_progress_tail(path: &Path, max_lines: usize) -> Result<String> {
    match fs::read(path) {
        Ok(bytes) => Ok(tail_lines(&String::from_utf8_lossy(&bytes), max_lines)),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(err).with_context(|| format!("read {}", path.display())),
    }
}
