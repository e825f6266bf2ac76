//! Loop configuration: defaults, `.ralph/config.toml`, environment overrides.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::models::ModelPreferences;
use crate::core::watchdog::WatchdogPolicy;

/// Loop configuration (TOML).
///
/// Every field is optional in the file; missing fields take the defaults
/// below. Environment variables are applied on top by [`apply_env_overrides`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct VibepupConfig {
    pub run: RunConfig,
    pub agent: AgentConfig,
    pub watchdog: WatchdogConfig,
    pub pacing: PacingConfig,
    pub models: ModelsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RunConfig {
    /// Iterations to run in bounded mode.
    pub iterations: u32,
    /// Run forever, restarting when `prd.md` changes.
    pub watch: bool,
    /// Inject the frontend-design skill into every turn.
    pub design: bool,
    /// Bypass model discovery and use this identifier for every phase.
    pub model_override: Option<String>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            iterations: 5,
            watch: false,
            design: false,
            model_override: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent executable.
    pub command: String,
    /// Extra arguments appended to every turn before `--model`.
    pub extra_args: Vec<String>,
    /// Timeout for short agent queries (`--version`, `models`).
    pub query_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            command: "opencode".to_string(),
            extra_args: Vec::new(),
            query_timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct WatchdogConfig {
    /// Max single-turn duration in seconds.
    pub max_turn_secs: u64,
    /// Hang threshold: seconds without any output.
    pub no_output_secs: u64,
    /// Deadline polling interval in milliseconds.
    pub poll_interval_ms: u64,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            max_turn_secs: 900,
            no_output_secs: 180,
            poll_interval_ms: 5_000,
        }
    }
}

impl WatchdogConfig {
    pub fn policy(&self) -> WatchdogPolicy {
        WatchdogPolicy {
            no_output_timeout: Duration::from_secs(self.no_output_secs),
            max_duration: Duration::from_secs(self.max_turn_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            ..WatchdogPolicy::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PacingConfig {
    /// Delay between iterations.
    pub iteration_delay_ms: u64,
    /// Extra pause after an iteration where every model failed.
    pub failure_pause_ms: u64,
    /// Poll interval while idle-waiting for `prd.md` edits in watch mode.
    pub idle_poll_ms: u64,
    /// Lines of `progress.log` copied into each run directory.
    pub progress_tail_lines: usize,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            iteration_delay_ms: 1_000,
            failure_pause_ms: 2_000,
            idle_poll_ms: 2_000,
            progress_tail_lines: 200,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ModelsConfig {
    /// PLAN-phase preferences, best first.
    pub plan: Vec<String>,
    /// BUILD-phase preferences, best first.
    pub build: Vec<String>,
    /// Substrings tried in order when no preferred model is available.
    pub generic_families: Vec<String>,
    pub plan_last_resort: Option<String>,
    pub build_last_resort: Option<String>,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            plan: strings(&[
                "github-copilot/claude-opus-4.5",
                "github-copilot/gemini-3-pro-preview",
                "github-copilot-enterprise/claude-opus-4.5",
                "github-copilot-enterprise/gemini-3-pro-preview",
                "openai/gpt-5.2",
                "google/antigravity-claude-opus-4-5-thinking",
                "google/gemini-3-pro-preview",
                "opencode/glm-4.7-free",
            ]),
            build: strings(&[
                "github-copilot/gpt-5.2-codex",
                "github-copilot/claude-sonnet-4.5",
                "github-copilot/gemini-3-pro-preview",
                "github-copilot-enterprise/gpt-5.2-codex",
                "github-copilot-enterprise/claude-sonnet-4.5",
                "github-copilot-enterprise/gemini-3-pro-preview",
                "openai/gpt-5.2-codex",
                "openai/gpt-5.1-codex-max",
                "google/gemini-3-pro-preview",
                "opencode/grok-code",
            ]),
            generic_families: strings(&["gpt-4o", "claude-sonnet"]),
            plan_last_resort: None,
            build_last_resort: Some("opencode/grok-code".to_string()),
        }
    }
}

impl ModelsConfig {
    pub fn plan_preferences(&self) -> ModelPreferences {
        ModelPreferences {
            preferred: self.plan.clone(),
            generic_families: self.generic_families.clone(),
            last_resort: self.plan_last_resort.clone(),
        }
    }

    pub fn build_preferences(&self) -> ModelPreferences {
        ModelPreferences {
            preferred: self.build.clone(),
            generic_families: self.generic_families.clone(),
            last_resort: self.build_last_resort.clone(),
        }
    }
}

impl Default for VibepupConfig {
    fn default() -> Self {
        Self {
            run: RunConfig::default(),
            agent: AgentConfig::default(),
            watchdog: WatchdogConfig::default(),
            pacing: PacingConfig::default(),
            models: ModelsConfig::default(),
        }
    }
}

impl VibepupConfig {
    pub fn validate(&self) -> Result<()> {
        if self.agent.command.trim().is_empty() {
            return Err(anyhow!("agent.command must be non-empty"));
        }
        if self.agent.query_timeout_secs == 0 {
            return Err(anyhow!("agent.query_timeout_secs must be > 0"));
        }
        if self.watchdog.max_turn_secs == 0 {
            return Err(anyhow!("watchdog.max_turn_secs must be > 0"));
        }
        if self.watchdog.no_output_secs == 0 {
            return Err(anyhow!("watchdog.no_output_secs must be > 0"));
        }
        if self.watchdog.poll_interval_ms == 0 {
            return Err(anyhow!("watchdog.poll_interval_ms must be > 0"));
        }
        if self.pacing.progress_tail_lines == 0 {
            return Err(anyhow!("pacing.progress_tail_lines must be > 0"));
        }
        if let Some(model) = &self.run.model_override
            && model.trim().is_empty()
        {
            return Err(anyhow!("run.model_override must be non-empty when set"));
        }
        Ok(())
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.agent.query_timeout_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `VibepupConfig::default()`.
pub fn load_config(path: &Path) -> Result<VibepupConfig> {
    if !path.exists() {
        debug!(path = %path.display(), "no config file, using defaults");
        let cfg = VibepupConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: VibepupConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Environment variables understood by [`apply_env_overrides`].
pub mod env_keys {
    pub const MAX_TURN_SECONDS: &str = "RALPH_MAX_TURN_SECONDS";
    pub const NO_OUTPUT_SECONDS: &str = "RALPH_NO_OUTPUT_SECONDS";
    pub const ITERATIONS: &str = "RALPH_ITERATIONS";
    pub const MODEL_OVERRIDE: &str = "RALPH_MODEL_OVERRIDE";
    pub const WATCH: &str = "RALPH_WATCH";
    pub const EXTRA_ARGS: &str = "RALPH_EXTRA_ARGS";
    pub const AGENT_BIN: &str = "RALPH_AGENT_BIN";
    pub const DESIGN_MODE: &str = "DESIGN_MODE";
}

/// Apply environment overrides on top of `cfg`.
///
/// `lookup` returns the value of a variable; tests pass a closure over a map
/// instead of touching the process environment. Empty values are ignored.
pub fn apply_env_overrides<F>(cfg: &mut VibepupConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(value) = get(env_keys::MAX_TURN_SECONDS) {
        cfg.watchdog.max_turn_secs = parse_number(env_keys::MAX_TURN_SECONDS, &value)?;
    }
    if let Some(value) = get(env_keys::NO_OUTPUT_SECONDS) {
        cfg.watchdog.no_output_secs = parse_number(env_keys::NO_OUTPUT_SECONDS, &value)?;
    }
    if let Some(value) = get(env_keys::ITERATIONS) {
        cfg.run.iterations = parse_number(env_keys::ITERATIONS, &value)?;
    }
    if let Some(value) = get(env_keys::MODEL_OVERRIDE) {
        cfg.run.model_override = Some(value.trim().to_string());
    }
    if let Some(value) = get(env_keys::WATCH) {
        cfg.run.watch = is_truthy(&value);
    }
    if let Some(value) = get(env_keys::DESIGN_MODE) {
        cfg.run.design = value.trim() == "true";
    }
    if let Some(value) = get(env_keys::EXTRA_ARGS) {
        cfg.agent
            .extra_args
            .extend(value.split_whitespace().map(str::to_string));
    }
    if let Some(value) = get(env_keys::AGENT_BIN) {
        cfg.agent.command = value.trim().to_string();
    }
    cfg.validate()
}

/// Load `.ralph/config.toml` and apply the process environment.
pub fn load_config_with_env(path: &Path) -> Result<VibepupConfig> {
    let mut cfg = load_config(path)?;
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;
    Ok(cfg)
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse::<T>()
        .with_context(|| format!("parse {key}={value}"))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}
