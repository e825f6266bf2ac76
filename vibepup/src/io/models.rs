//! Model discovery against the agent's listing command.

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::core::models::{ModelPreferences, ResolutionSource, parse_model_listing, resolve_models};
use crate::core::types::Phase;
use crate::io::agent::AgentBackend;
use crate::io::config::ModelsConfig;

/// Candidate lists for both phases, resolved once per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelCandidates {
    pub plan: Vec<String>,
    pub build: Vec<String>,
}

impl ModelCandidates {
    pub fn for_phase(&self, phase: Phase) -> &[String] {
        match phase {
            Phase::Plan => &self.plan,
            Phase::Build => &self.build,
        }
    }
}

/// Resolve candidates for both phases.
///
/// An override replaces both lists and skips discovery. Otherwise the agent
/// is asked for its models once and both phases resolve against that
/// listing. Only a failing listing command is an error; empty lists are not.
pub fn resolve_candidates<A: AgentBackend>(
    agent: &A,
    models: &ModelsConfig,
    model_override: Option<&str>,
) -> Result<ModelCandidates> {
    if let Some(model) = model_override {
        eprintln!("Model override active: {model}");
        info!(model, "model override active");
        return Ok(ModelCandidates {
            plan: vec![model.to_string()],
            build: vec![model.to_string()],
        });
    }

    eprintln!("Verifying available models...");
    let listing = agent.list_models().context("discover available models")?;
    let available = parse_model_listing(&listing);
    debug!(count = available.len(), "models listed");

    Ok(ModelCandidates {
        plan: resolve_phase(Phase::Plan, &models.plan_preferences(), &available),
        build: resolve_phase(Phase::Build, &models.build_preferences(), &available),
    })
}

fn resolve_phase(phase: Phase, prefs: &ModelPreferences, available: &[String]) -> Vec<String> {
    let resolution = resolve_models(prefs, available);
    match resolution.source {
        ResolutionSource::Preferred => {}
        ResolutionSource::Generic => {
            eprintln!("No preferred {phase} models found. Falling back to generic discovery.");
        }
        ResolutionSource::LastResort => {
            eprintln!(
                "Using fallback {phase} model: {}",
                resolution.models.join(", ")
            );
        }
        ResolutionSource::Unresolved => {
            eprintln!("No {phase} models available.");
        }
    }
    info!(%phase, models = ?resolution.models, source = ?resolution.source, "models resolved");
    resolution.models
}
