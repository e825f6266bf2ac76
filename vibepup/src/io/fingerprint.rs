//! Content fingerprint of the task-definition file.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

/// Hex SHA-256 of the whole file.
///
/// Used as a change-detection signal only. The task file is mandatory, so an
/// unreadable file is an error.
pub fn fingerprint(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read task file {}", path.display()))?;
    Ok(digest(&contents))
}

pub fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}
