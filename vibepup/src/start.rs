//! Startup checks and the architect bootstrap for `vibepup new`.

use std::error::Error;
use std::fmt;

use anyhow::Result;
use tracing::{debug, info};

use crate::exit_codes;
use crate::io::agent::{AgentBackend, ArchitectRequest};
use crate::io::init::ProjectPaths;
use crate::io::models::ModelCandidates;
use crate::io::prompt::PromptEngine;

/// The agent executable cannot be run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingAgentError {
    pub command: String,
}

impl fmt::Display for MissingAgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} not found. vibepup requires {} to run.\n  Install with: npm install -g opencode-ai",
            self.command, self.command
        )
    }
}

impl Error for MissingAgentError {}

/// The architect step did not succeed; `code` is the process exit code to use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchitectFailedError {
    pub code: i32,
    pub reason: String,
}

impl fmt::Display for ArchitectFailedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "architect failed: {}", self.reason)
    }
}

impl Error for ArchitectFailedError {}

/// Confirm the agent runs and return its version string.
pub fn ensure_agent_installed<A: AgentBackend>(agent: &A, command: &str) -> Result<String> {
    match agent.version()? {
        Some(version) => {
            debug!(%version, "agent found");
            Ok(version)
        }
        None => Err(MissingAgentError {
            command: command.to_string(),
        }
        .into()),
    }
}

/// Run the architect once with the best PLAN model.
pub fn bootstrap_architect<A: AgentBackend>(
    agent: &A,
    paths: &ProjectPaths,
    models: &ModelCandidates,
    idea: &str,
) -> Result<()> {
    let Some(model) = models.plan.first() else {
        return Err(ArchitectFailedError {
            code: exit_codes::FAILURE,
            reason: "no available plan models. Run `vibepup doctor` to diagnose.".to_string(),
        }
        .into());
    };

    println!("Phase 0: The Architect");
    let instruction = PromptEngine::new().render_architect_instruction(idea)?;
    let request = ArchitectRequest {
        model: model.clone(),
        instruction,
        prompt_file: paths.architect_prompt_path.clone(),
    };
    let code = agent.run_architect(&request)?;
    if code != exit_codes::OK {
        return Err(ArchitectFailedError {
            code,
            reason: format!("agent exited with status {code}"),
        }
        .into());
    }
    info!(%model, "architect finished");
    println!("Architect initialization complete.");
    Ok(())
}
