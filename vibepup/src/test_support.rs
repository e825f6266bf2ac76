//! Test-only helpers: a scripted agent and throwaway projects.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::fs;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{Result, anyhow};

use crate::core::types::TimeoutKind;
use crate::io::agent::{AgentBackend, ArchitectRequest, TurnRequest};
use crate::io::init::{ProjectPaths, scaffold_project};
use crate::io::process::SupervisedExit;
use crate::io::progress::RESTART_MARKER;
use crate::looping::LoopSettings;

/// One scripted turn: what lands in the turn log and how the turn exits.
#[derive(Clone)]
pub struct ScriptedTurn {
    pub response: String,
    pub exit: SupervisedExit,
    effect: Option<Rc<dyn Fn()>>,
}

impl ScriptedTurn {
    pub fn ok(response: &str) -> Self {
        Self::exit(0, response)
    }

    pub fn exit(code: i32, response: &str) -> Self {
        Self {
            response: response.to_string(),
            exit: SupervisedExit::exited(code),
            effect: None,
        }
    }

    /// Turn ended by the watchdog; the platform reported no exit code.
    pub fn timed_out(kind: TimeoutKind, response: &str) -> Self {
        Self {
            response: response.to_string(),
            exit: SupervisedExit {
                code: 0,
                timeout: Some(kind),
            },
            effect: None,
        }
    }

    /// Side effect run during the turn, before the response is written.
    pub fn with_effect<F: Fn() + 'static>(mut self, effect: F) -> Self {
        self.effect = Some(Rc::new(effect));
        self
    }
}

/// Agent that replays scripted turns instead of spawning processes.
///
/// Turn lookup order: the one-shot queue, then the per-model script, then
/// the default turn.
pub struct ScriptedAgent {
    queue: RefCell<VecDeque<ScriptedTurn>>,
    by_model: HashMap<String, ScriptedTurn>,
    default_turn: ScriptedTurn,
    version: Option<String>,
    models: Option<String>,
    architect_code: i32,
    turns: RefCell<Vec<TurnRequest>>,
    architect_calls: RefCell<Vec<ArchitectRequest>>,
    list_calls: Cell<usize>,
}

impl ScriptedAgent {
    pub fn new() -> Self {
        Self {
            queue: RefCell::new(VecDeque::new()),
            by_model: HashMap::new(),
            default_turn: ScriptedTurn::exit(1, ""),
            version: Some("0.0.0-scripted".to_string()),
            models: Some(String::new()),
            architect_code: 0,
            turns: RefCell::new(Vec::new()),
            architect_calls: RefCell::new(Vec::new()),
            list_calls: Cell::new(0),
        }
    }

    pub fn with_default_turn(mut self, turn: ScriptedTurn) -> Self {
        self.default_turn = turn;
        self
    }

    pub fn with_model_turn(mut self, model: &str, turn: ScriptedTurn) -> Self {
        self.by_model.insert(model.to_string(), turn);
        self
    }

    pub fn with_queued_turn(self, turn: ScriptedTurn) -> Self {
        self.queue.borrow_mut().push_back(turn);
        self
    }

    pub fn with_models(mut self, listing: &str) -> Self {
        self.models = Some(listing.to_string());
        self
    }

    pub fn with_model_listing_error(mut self) -> Self {
        self.models = None;
        self
    }

    pub fn without_version(mut self) -> Self {
        self.version = None;
        self
    }

    pub fn with_architect_code(mut self, code: i32) -> Self {
        self.architect_code = code;
        self
    }

    pub fn turn_calls(&self) -> Vec<TurnRequest> {
        self.turns.borrow().clone()
    }

    /// Models tried, in call order.
    pub fn models_tried(&self) -> Vec<String> {
        self.turns.borrow().iter().map(|t| t.model.clone()).collect()
    }

    pub fn architect_calls(&self) -> Vec<ArchitectRequest> {
        self.architect_calls.borrow().clone()
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.get()
    }

    fn next_turn(&self, model: &str) -> ScriptedTurn {
        if let Some(turn) = self.queue.borrow_mut().pop_front() {
            return turn;
        }
        self.by_model
            .get(model)
            .unwrap_or(&self.default_turn)
            .clone()
    }
}

impl Default for ScriptedAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentBackend for ScriptedAgent {
    fn version(&self) -> Result<Option<String>> {
        Ok(self.version.clone())
    }

    fn list_models(&self) -> Result<String> {
        self.list_calls.set(self.list_calls.get() + 1);
        self.models
            .clone()
            .ok_or_else(|| anyhow!("scripted model listing failure"))
    }

    fn run_turn(&self, request: &TurnRequest) -> SupervisedExit {
        self.turns.borrow_mut().push(request.clone());
        let turn = self.next_turn(&request.model);
        if let Some(effect) = &turn.effect {
            effect();
        }
        if fs::write(&request.log_path, &turn.response).is_err() {
            return SupervisedExit::exited(1);
        }
        turn.exit
    }

    fn run_architect(&self, request: &ArchitectRequest) -> Result<i32> {
        self.architect_calls.borrow_mut().push(request.clone());
        Ok(self.architect_code)
    }
}

/// Scaffolded project in a temporary directory.
pub struct TestProject {
    pub paths: ProjectPaths,
    _temp: tempfile::TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = ProjectPaths::new(temp.path());
        scaffold_project(&paths).expect("scaffold project");
        Self { paths, _temp: temp }
    }

    pub fn write_prd(&self, contents: &str) {
        fs::write(&self.paths.prd_path, contents).expect("write prd.md");
    }

    pub fn write_repo_map(&self, contents: &str) {
        fs::write(&self.paths.repo_map_path, contents).expect("write repo-map.md");
    }

    pub fn progress_log(&self) -> String {
        fs::read_to_string(&self.paths.progress_log_path).expect("read progress.log")
    }

    pub fn restart_markers(&self) -> usize {
        self.progress_log().matches(RESTART_MARKER).count()
    }

    /// Names of the `iter-NNNN` directories, sorted.
    pub fn iteration_dirs(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(&self.paths.runs_dir)
            .expect("read runs dir")
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with("iter-"))
            .collect();
        names.sort();
        names
    }
}

impl Default for TestProject {
    fn default() -> Self {
        Self::new()
    }
}

/// Settings with no pacing delays.
pub fn fast_settings() -> LoopSettings {
    LoopSettings {
        design: false,
        design_skill: None,
        extra_args: Vec::new(),
        iteration_delay: Duration::ZERO,
        failure_pause: Duration::ZERO,
        idle_poll: Duration::from_millis(20),
        progress_tail_lines: 200,
    }
}
