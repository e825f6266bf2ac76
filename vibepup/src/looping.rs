//! The iteration engine behind `vibepup [N]` and `vibepup --watch`.
//!
//! Each pass runs CHECK_CHANGE, the iteration limit check, phase selection,
//! run directory preparation, the model attempts and evaluation. Loop state
//! lives in a [`LoopSession`] the caller owns, so a pass can be driven one
//! step at a time.

use std::fs;
use std::io::ErrorKind;
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::session::{LoopMode, LoopSession};
use crate::core::types::{IterationRecord, IterationStatus, Phase, TurnVerdict};
use crate::core::verdict::{classify_turn, signals_completion};
use crate::io::agent::{AgentBackend, TurnRequest};
use crate::io::config::VibepupConfig;
use crate::io::fingerprint::fingerprint;
use crate::io::init::ProjectPaths;
use crate::io::iteration_log::{AttemptMeta, IterationMeta, write_iteration_meta};
use crate::io::models::ModelCandidates;
use crate::io::phase_signal::detect_phase;
use crate::io::progress::append_restart_marker;
use crate::io::prompt::PromptEngine;
use crate::io::run_dir::{RunDir, RunDirManager};

/// Skill file attached to every turn in design mode, relative to `$HOME`.
pub const DESIGN_SKILL_PATH: &str = ".config/opencode/skills/frontend-design.md";

/// Reason why the loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopStop {
    /// The agent emitted the completion sentinel in bounded mode.
    Complete { iteration: u32 },
    /// The iteration counter passed the configured maximum.
    MaxIterations { max_iterations: u32 },
}

/// Summary of one finished pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassOutcome {
    pub iteration: u32,
    pub phase: Phase,
    pub status: IterationStatus,
    /// The attempt that produced a usable response, if any.
    pub record: Option<IterationRecord>,
}

/// Knobs that shape each pass.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub design: bool,
    /// Extra context file for design mode; `None` when `$HOME` is unknown.
    pub design_skill: Option<PathBuf>,
    pub extra_args: Vec<String>,
    pub iteration_delay: Duration,
    pub failure_pause: Duration,
    pub idle_poll: Duration,
    pub progress_tail_lines: usize,
}

impl LoopSettings {
    pub fn from_config(cfg: &VibepupConfig, home: Option<&Path>) -> Self {
        let design_skill = if cfg.run.design {
            home.map(|home| home.join(DESIGN_SKILL_PATH))
        } else {
            None
        };
        if cfg.run.design && design_skill.is_none() {
            warn!("design mode without a home directory, skill file not attached");
        }
        Self {
            design: cfg.run.design,
            design_skill,
            extra_args: cfg.agent.extra_args.clone(),
            iteration_delay: Duration::from_millis(cfg.pacing.iteration_delay_ms),
            failure_pause: Duration::from_millis(cfg.pacing.failure_pause_ms),
            idle_poll: Duration::from_millis(cfg.pacing.idle_poll_ms),
            progress_tail_lines: cfg.pacing.progress_tail_lines,
        }
    }
}

/// Loop mode from the effective configuration.
pub fn loop_mode(cfg: &VibepupConfig) -> LoopMode {
    if cfg.run.watch {
        LoopMode::Watch
    } else {
        LoopMode::Bounded {
            max_iterations: cfg.run.iterations,
        }
    }
}

pub struct Engine<'a, A: AgentBackend> {
    paths: &'a ProjectPaths,
    agent: &'a A,
    models: &'a ModelCandidates,
    run_dirs: RunDirManager,
    prompts: PromptEngine,
    settings: LoopSettings,
}

struct Attempts {
    status: IterationStatus,
    record: Option<IterationRecord>,
    meta: Vec<AttemptMeta>,
}

impl<'a, A: AgentBackend> Engine<'a, A> {
    pub fn new(
        paths: &'a ProjectPaths,
        agent: &'a A,
        models: &'a ModelCandidates,
        settings: LoopSettings,
    ) -> Self {
        Self {
            paths,
            agent,
            models,
            run_dirs: RunDirManager::new(paths, settings.progress_tail_lines),
            prompts: PromptEngine::new(),
            settings,
        }
    }

    /// Start a session against the task file as it is now.
    pub fn start_session(&self, mode: LoopMode) -> Result<LoopSession> {
        let current = fingerprint(&self.paths.prd_path)?;
        Ok(LoopSession::new(mode, current))
    }

    /// Run passes until the loop stops. Only watch mode without completion
    /// runs forever.
    pub fn run<F: FnMut(&PassOutcome)>(
        &self,
        session: &mut LoopSession,
        mut on_pass: F,
    ) -> Result<LoopStop> {
        loop {
            match self.step(session)? {
                ControlFlow::Break(stop) => return Ok(stop),
                ControlFlow::Continue(pass) => on_pass(&pass),
            }
        }
    }

    /// Run one pass.
    #[instrument(skip_all, fields(iteration = session.iteration))]
    pub fn step(&self, session: &mut LoopSession) -> Result<ControlFlow<LoopStop, PassOutcome>> {
        let current = fingerprint(&self.paths.prd_path)?;
        if session.observe(&current) {
            println!("PRD changed! Restarting loop...");
            info!(watch = session.is_watch(), "task file changed");
            append_restart_marker(&self.paths.progress_log_path)?;
        }

        if let LoopMode::Bounded { max_iterations } = session.mode
            && session.limit_reached()
        {
            println!("Max iterations reached.");
            return Ok(ControlFlow::Break(LoopStop::MaxIterations { max_iterations }));
        }

        let iteration = session.iteration;
        let phase = detect_phase(&self.paths.repo_map_path);
        let run = self.run_dirs.prepare(iteration)?;
        println!();
        println!("Loop {iteration} ({phase} phase)");
        println!("  Logs: {}", run.dir.display());

        let started = Instant::now();
        let instruction = self.prompts.render_turn_instruction(phase, self.settings.design)?;
        let attempts = self.try_models(&run, phase, &instruction);

        let meta = IterationMeta {
            iteration,
            phase,
            status: attempts.status,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            attempts: attempts.meta,
        };
        write_iteration_meta(&run.meta_path, &meta)?;

        let outcome = PassOutcome {
            iteration,
            phase,
            status: attempts.status,
            record: attempts.record,
        };

        match attempts.status {
            IterationStatus::Complete => {
                println!("Agent signaled completion.");
                if !session.is_watch() {
                    return Ok(ControlFlow::Break(LoopStop::Complete { iteration }));
                }
                println!("Project complete. Waiting for changes in prd.md...");
                session.absorb(fingerprint(&self.paths.prd_path)?);
                self.wait_for_change(session)?;
                println!("Change detected! Resuming...");
                // The next CHECK_CHANGE sees the edit and restarts the count.
                thread::sleep(self.settings.iteration_delay);
                return Ok(ControlFlow::Continue(outcome));
            }
            IterationStatus::Failed => {
                println!("All models failed this iteration.");
                thread::sleep(self.settings.failure_pause);
            }
            IterationStatus::Success => {}
        }

        session.finish_iteration(fingerprint(&self.paths.prd_path)?);
        thread::sleep(self.settings.iteration_delay);
        Ok(ControlFlow::Continue(outcome))
    }

    fn try_models(&self, run: &RunDir, phase: Phase, instruction: &str) -> Attempts {
        let candidates = self.models.for_phase(phase);
        let mut attempts = Attempts {
            status: IterationStatus::Failed,
            record: None,
            meta: Vec::with_capacity(candidates.len()),
        };
        if candidates.is_empty() {
            println!("  No {phase} models available. Run `vibepup doctor` to diagnose.");
            return attempts;
        }

        for model in candidates {
            println!("  Using: {model}");
            let request = TurnRequest {
                model: model.clone(),
                instruction: instruction.to_string(),
                files: self.turn_files(run),
                extra_args: self.settings.extra_args.clone(),
                log_path: run.response_path.clone(),
            };
            let exit = self.agent.run_turn(&request);
            let response = read_response(&run.response_path);
            let verdict = classify_turn(exit.code, exit.timeout.is_some(), &response);
            debug!(%model, code = exit.code, timeout = ?exit.timeout, ?verdict, "attempt finished");
            attempts.meta.push(AttemptMeta {
                model: model.clone(),
                exit_code: exit.code,
                timeout: exit.timeout,
                verdict,
            });

            match verdict {
                TurnVerdict::Unsupported => {
                    println!("  Model {model} not supported. Falling back...");
                }
                TurnVerdict::Failed => match exit.timeout {
                    Some(kind) => println!("  Model {model} stopped by watchdog ({kind:?}). Falling back..."),
                    None => println!("  Model {model} failed (exit: {}). Falling back...", exit.code),
                },
                TurnVerdict::Success => {
                    attempts.status = if signals_completion(&response) {
                        IterationStatus::Complete
                    } else {
                        IterationStatus::Success
                    };
                    attempts.record = Some(IterationRecord {
                        index: run.index,
                        directory: run.dir.clone(),
                        phase,
                        model: model.clone(),
                        exit_code: exit.code,
                        response_text: response,
                    });
                    break;
                }
            }
        }
        attempts
    }

    fn turn_files(&self, run: &RunDir) -> Vec<PathBuf> {
        let mut files = vec![
            self.paths.system_prompt_path.clone(),
            self.paths.prd_path.clone(),
            self.paths.state_path.clone(),
            self.paths.repo_map_path.clone(),
            run.progress_tail_path.clone(),
        ];
        if self.settings.design
            && let Some(skill) = &self.settings.design_skill
        {
            files.push(skill.clone());
        }
        files
    }

    fn wait_for_change(&self, session: &LoopSession) -> Result<()> {
        loop {
            thread::sleep(self.settings.idle_poll);
            let current = fingerprint(&self.paths.prd_path).context("poll task file")?;
            if current != session.fingerprint {
                return Ok(());
            }
        }
    }
}

/// Log contents of the turn; a missing log reads as an empty response.
fn read_response(path: &Path) -> String {
    match fs::read(path) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(err) => {
            if err.kind() != ErrorKind::NotFound {
                warn!(path = %path.display(), err = %err, "unreadable turn log");
            }
            String::new()
        }
    }
}
