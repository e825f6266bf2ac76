//! Project scaffolding for the files the loop reads on every pass.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::info;

use super::prompt::{ARCHITECT_PROMPT, SYSTEM_PROMPT};

/// All canonical paths for a project root.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub ralph_dir: PathBuf,
    pub runs_dir: PathBuf,
    pub latest_link: PathBuf,
    pub config_path: PathBuf,
    pub system_prompt_path: PathBuf,
    pub architect_prompt_path: PathBuf,
    pub prd_path: PathBuf,
    pub legacy_prd_path: PathBuf,
    pub state_path: PathBuf,
    pub repo_map_path: PathBuf,
    pub progress_log_path: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let ralph_dir = root.join(".ralph");
        let runs_dir = ralph_dir.join("runs");
        Self {
            root: root.clone(),
            ralph_dir: ralph_dir.clone(),
            runs_dir: runs_dir.clone(),
            latest_link: runs_dir.join("latest"),
            config_path: ralph_dir.join("config.toml"),
            system_prompt_path: ralph_dir.join("prompt.md"),
            architect_prompt_path: ralph_dir.join("architect.md"),
            prd_path: root.join("prd.md"),
            legacy_prd_path: root.join("prd.json"),
            state_path: root.join("prd.state.json"),
            repo_map_path: root.join("repo-map.md"),
            progress_log_path: root.join("progress.log"),
        }
    }

    /// Directory for iteration `index`, e.g. `.ralph/runs/iter-0007`.
    pub fn iteration_dir(&self, index: u32) -> PathBuf {
        self.runs_dir.join(format!("iter-{index:04}"))
    }
}

/// What `scaffold_project` did, for the startup banner.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScaffoldReport {
    pub created: Vec<PathBuf>,
    pub migrated_legacy_prd: bool,
}

#[derive(Debug, Deserialize)]
struct LegacyTask {
    description: String,
}

/// Create every missing project file. Existing files are left untouched.
pub fn scaffold_project(paths: &ProjectPaths) -> Result<ScaffoldReport> {
    let mut report = ScaffoldReport::default();
    create_dir(&paths.runs_dir)?;

    if !paths.prd_path.exists() {
        if paths.legacy_prd_path.is_file() {
            migrate_legacy_prd(paths)?;
            report.migrated_legacy_prd = true;
            info!(path = %paths.legacy_prd_path.display(), "migrated legacy task list");
        } else {
            write_file(&paths.prd_path, DEFAULT_PRD)?;
        }
        report.created.push(paths.prd_path.clone());
    }

    let defaults: [(&Path, &str); 5] = [
        (&paths.repo_map_path, ""),
        (&paths.state_path, "{}"),
        (&paths.progress_log_path, ""),
        (&paths.system_prompt_path, SYSTEM_PROMPT),
        (&paths.architect_prompt_path, ARCHITECT_PROMPT),
    ];
    for (path, contents) in defaults {
        if !path.exists() {
            write_file(path, contents)?;
            report.created.push(path.to_path_buf());
        }
    }

    Ok(report)
}

fn migrate_legacy_prd(paths: &ProjectPaths) -> Result<()> {
    let raw = fs::read_to_string(&paths.legacy_prd_path)
        .with_context(|| format!("read {}", paths.legacy_prd_path.display()))?;
    let tasks: Vec<LegacyTask> = serde_json::from_str(&raw)
        .with_context(|| format!("parse {}", paths.legacy_prd_path.display()))?;

    let mut contents = String::new();
    for task in &tasks {
        contents.push_str("- [ ] ");
        contents.push_str(&task.description);
        contents.push('\n');
    }
    write_file(&paths.prd_path, &contents)?;

    let backup = paths.legacy_prd_path.with_extension("json.bak");
    fs::rename(&paths.legacy_prd_path, &backup).with_context(|| {
        format!(
            "rename {} -> {}",
            paths.legacy_prd_path.display(),
            backup.display()
        )
    })
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

pub(crate) fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        create_dir(parent)?;
    }
    fs::write(path, contents).with_context(|| format!("write file {}", path.display()))
}

const DEFAULT_PRD: &str = "# Product Requirements Document (PRD)\n\n- [ ] Initialize repo-map.md with project architecture\n- [ ] Setup initial project structure\n";

#[cfg(test)]
mod tests {
    use super::*;

    fn read_to_string(path: &Path) -> String {
        fs::read_to_string(path).expect("read file")
    }

    /// Verifies a fresh directory gets every project file with its default contents.
    #[test]
    fn scaffold_creates_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());

        let report = scaffold_project(&paths).expect("scaffold");

        assert!(paths.runs_dir.is_dir());
        assert!(!report.migrated_legacy_prd);
        assert_eq!(report.created.len(), 6);
        assert_eq!(read_to_string(&paths.prd_path), DEFAULT_PRD);
        assert_eq!(read_to_string(&paths.repo_map_path), "");
        assert_eq!(read_to_string(&paths.state_path), "{}");
        assert_eq!(read_to_string(&paths.progress_log_path), "");
        assert!(read_to_string(&paths.system_prompt_path).contains("<promise>COMPLETE</promise>"));
        assert!(paths.architect_prompt_path.is_file());
    }

    /// Verifies user-edited files survive a second scaffold untouched.
    #[test]
    fn scaffold_never_overwrites() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        fs::write(&paths.prd_path, "- [ ] mine\n").expect("seed prd");
        fs::write(&paths.repo_map_path, "# map\n").expect("seed map");

        scaffold_project(&paths).expect("first");
        let report = scaffold_project(&paths).expect("second");

        assert!(report.created.is_empty());
        assert_eq!(read_to_string(&paths.prd_path), "- [ ] mine\n");
        assert_eq!(read_to_string(&paths.repo_map_path), "# map\n");
    }

    /// Verifies a legacy `prd.json` becomes a checklist and is kept as a backup.
    #[test]
    fn scaffold_migrates_legacy_prd() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        fs::write(
            &paths.legacy_prd_path,
            r#"[{"description":"Build login"},{"description":"Add tests","passes":false}]"#,
        )
        .expect("seed legacy");

        let report = scaffold_project(&paths).expect("scaffold");

        assert!(report.migrated_legacy_prd);
        assert_eq!(
            read_to_string(&paths.prd_path),
            "- [ ] Build login\n- [ ] Add tests\n"
        );
        assert!(!paths.legacy_prd_path.exists());
        assert!(temp.path().join("prd.json.bak").is_file());
    }

    #[test]
    fn iteration_dirs_are_zero_padded() {
        let paths = ProjectPaths::new("/project");
        assert_eq!(
            paths.iteration_dir(7),
            PathBuf::from("/project/.ralph/runs/iter-0007")
        );
        assert_eq!(
            paths.iteration_dir(12345),
            PathBuf::from("/project/.ralph/runs/iter-12345")
        );
    }
}
