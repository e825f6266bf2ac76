//! Phase detection from `repo-map.md`.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, warn};

use crate::core::phase::phase_from_signal;
use crate::core::types::Phase;

/// Read the phase-signal file and classify the current phase.
///
/// Never cached: the agent may fill the file during any turn. A file that
/// exists but cannot be read counts as absent.
pub fn detect_phase(path: &Path) -> Phase {
    let phase = match fs::read_to_string(path) {
        Ok(contents) => phase_from_signal(Some(&contents)),
        Err(err) if err.kind() == ErrorKind::NotFound => phase_from_signal(None),
        Err(err) => {
            warn!(path = %path.display(), err = %err, "unreadable phase signal, assuming PLAN");
            phase_from_signal(None)
        }
    };
    debug!(path = %path.display(), %phase, "phase detected");
    phase
}
