//! Per-iteration run directories under `.ralph/runs/`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, warn};

use super::init::ProjectPaths;
use super::progress::read_progress_tail;

/// Files belonging to one iteration.
#[derive(Debug, Clone)]
pub struct RunDir {
    pub index: u32,
    pub dir: PathBuf,
    pub progress_tail_path: PathBuf,
    pub response_path: PathBuf,
    pub meta_path: PathBuf,
}

impl RunDir {
    fn new(index: u32, dir: PathBuf) -> Self {
        Self {
            index,
            progress_tail_path: dir.join("progress.tail.log"),
            response_path: dir.join("agent_response.txt"),
            meta_path: dir.join("meta.json"),
            dir,
        }
    }
}

pub struct RunDirManager {
    paths: ProjectPaths,
    tail_lines: usize,
}

impl RunDirManager {
    pub fn new(paths: &ProjectPaths, tail_lines: usize) -> Self {
        Self {
            paths: paths.clone(),
            tail_lines,
        }
    }

    /// Create (or reuse) `iter-NNNN`, snapshot the progress tail and point
    /// `latest` at it.
    pub fn prepare(&self, index: u32) -> Result<RunDir> {
        let run = RunDir::new(index, self.paths.iteration_dir(index));
        fs::create_dir_all(&run.dir)
            .with_context(|| format!("create run dir {}", run.dir.display()))?;

        let tail = read_progress_tail(&self.paths.progress_log_path, self.tail_lines)?;
        fs::write(&run.progress_tail_path, tail)
            .with_context(|| format!("write {}", run.progress_tail_path.display()))?;

        if let Err(err) = repoint_latest(&self.paths.latest_link, &run.dir) {
            warn!(link = %self.paths.latest_link.display(), err = %err, "failed to update latest link");
        }
        debug!(dir = %run.dir.display(), "run dir prepared");
        Ok(run)
    }
}

/// Point `link` at `target`, replacing whatever is there.
///
/// The new link is built beside the old one and renamed over it, so readers
/// never observe a missing `latest`. Falls back to remove-then-create where
/// rename cannot replace the existing entry.
fn repoint_latest(link: &Path, target: &Path) -> io::Result<()> {
    let parent = link.parent().unwrap_or_else(|| Path::new("."));
    let relative = target
        .strip_prefix(parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| target.to_path_buf());

    let staging = parent.join(".latest.tmp");
    remove_entry(&staging)?;
    create_link(&relative, &staging)?;
    match fs::rename(&staging, link) {
        Ok(()) => Ok(()),
        Err(_) => {
            remove_entry(&staging)?;
            remove_entry(link)?;
            create_link(&relative, link)
        }
    }
}

fn remove_entry(path: &Path) -> io::Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if meta.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path).or_else(|err| {
            // Windows directory symlinks must be removed as directories.
            if cfg!(windows) { fs::remove_dir(path) } else { Err(err) }
        })
    }
}

#[cfg(unix)]
fn create_link(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_link(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

#[cfg(not(any(unix, windows)))]
fn create_link(_target: &Path, _link: &Path) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "symlinks are not supported on this platform",
    ))
}
