//! Agent backend abstraction.
//!
//! The [`AgentBackend`] trait decouples the loop from the actual agent CLI
//! (currently `opencode`). Tests use scripted agents that write predetermined
//! responses without spawning processes.

use std::ffi::OsString;
use std::io;
use std::path::PathBuf;
use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use tracing::{debug, info, instrument, warn};

use crate::core::watchdog::WatchdogPolicy;
use crate::io::config::VibepupConfig;
use crate::io::process::{SupervisedExit, SupervisedRun, run_captured, run_supervised};

/// Parameters for one supervised agent turn.
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub model: String,
    /// Single-line instruction passed as the first positional argument.
    pub instruction: String,
    /// Context files attached in order.
    pub files: Vec<PathBuf>,
    /// Passed through verbatim after the files.
    pub extra_args: Vec<String>,
    /// Turn log; its contents become the response text.
    pub log_path: PathBuf,
}

/// Parameters for the one-shot architect run behind `vibepup new`.
#[derive(Debug, Clone)]
pub struct ArchitectRequest {
    pub model: String,
    pub instruction: String,
    pub prompt_file: PathBuf,
}

/// Abstraction over agent CLIs.
pub trait AgentBackend {
    /// Version string, or `None` when the agent cannot be run at all.
    fn version(&self) -> Result<Option<String>>;

    /// Raw output of the model listing command. Errors when the command
    /// cannot be run or exits non-zero.
    fn list_models(&self) -> Result<String>;

    /// Run one turn under the watchdog. Never fails; failures are reported
    /// through the exit and the log contents.
    fn run_turn(&self, request: &TurnRequest) -> SupervisedExit;

    /// Run the architect with inherited stdio and return its exit code.
    fn run_architect(&self, request: &ArchitectRequest) -> Result<i32>;
}

/// Backend that spawns the `opencode` CLI.
#[derive(Debug, Clone)]
pub struct OpencodeAgent {
    command: String,
    workdir: PathBuf,
    policy: WatchdogPolicy,
    query_timeout: Duration,
    mirror_output: bool,
}

impl OpencodeAgent {
    pub fn from_config(cfg: &VibepupConfig, workdir: impl Into<PathBuf>) -> Self {
        Self {
            command: cfg.agent.command.clone(),
            workdir: workdir.into(),
            policy: cfg.watchdog.policy(),
            query_timeout: cfg.query_timeout(),
            mirror_output: true,
        }
    }

    pub fn command_name(&self) -> &str {
        &self.command
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.command);
        cmd.current_dir(&self.workdir);
        cmd
    }
}

impl AgentBackend for OpencodeAgent {
    #[instrument(skip_all, fields(command = %self.command))]
    fn version(&self) -> Result<Option<String>> {
        let mut cmd = self.command();
        cmd.arg("--version");
        let output = match run_captured(cmd, self.query_timeout) {
            Ok(output) => output,
            Err(err) if err.chain().any(|cause| cause.is::<io::Error>()) => {
                debug!(err = %format!("{err:#}"), "agent not runnable");
                return Ok(None);
            }
            Err(err) => return Err(err).context("query agent version"),
        };
        if !output.success() {
            debug!(exit_code = ?output.status.code(), "agent version check failed");
            return Ok(None);
        }
        Ok(Some(output.stdout_text().trim().to_string()))
    }

    #[instrument(skip_all, fields(command = %self.command))]
    fn list_models(&self) -> Result<String> {
        let mut cmd = self.command();
        cmd.arg("models").arg("--refresh");
        let output = run_captured(cmd, self.query_timeout)
            .with_context(|| format!("run `{} models --refresh`", self.command))?;
        if output.timed_out {
            bail!(
                "`{} models --refresh` timed out after {}s",
                self.command,
                self.query_timeout.as_secs()
            );
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "model listing failed");
            bail!(
                "`{} models --refresh` failed with status {:?}",
                self.command,
                output.status.code()
            );
        }
        Ok(output.stdout_text())
    }

    #[instrument(skip_all, fields(model = %request.model))]
    fn run_turn(&self, request: &TurnRequest) -> SupervisedExit {
        let mut cmd = self.command();
        cmd.args(turn_args(request));
        let run = SupervisedRun {
            log_path: request.log_path.clone(),
            policy: self.policy,
            mirror_output: self.mirror_output,
        };
        run_supervised(cmd, &run)
    }

    #[instrument(skip_all, fields(model = %request.model))]
    fn run_architect(&self, request: &ArchitectRequest) -> Result<i32> {
        info!("starting architect");
        let mut cmd = self.command();
        cmd.arg("run")
            .arg(&request.instruction)
            .arg("--file")
            .arg(&request.prompt_file)
            .arg("--agent")
            .arg("general")
            .arg("--model")
            .arg(&request.model);
        let status = cmd
            .status()
            .with_context(|| format!("run `{} run` for the architect", self.command))?;
        // Signal death has no code; treat it as a plain failure.
        Ok(status.code().unwrap_or(1))
    }
}

/// Argument vector for one turn, after the executable.
pub fn turn_args(request: &TurnRequest) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["run".into(), request.instruction.clone().into()];
    for file in &request.files {
        args.push("--file".into());
        args.push(file.clone().into_os_string());
    }
    args.extend(request.extra_args.iter().map(OsString::from));
    args.push("--model".into());
    args.push(request.model.clone().into());
    args
}
