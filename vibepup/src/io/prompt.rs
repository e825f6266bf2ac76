//! Turn instructions and the static prompt files installed into `.ralph/`.

use anyhow::Result;
use minijinja::{Environment, context};

use crate::core::types::Phase;

const TURN_TEMPLATE: &str = include_str!("prompts/turn.md");
const ARCHITECT_TEMPLATE: &str = include_str!("prompts/architect.md");

/// Loop-agent system prompt, written to `.ralph/prompt.md` when missing.
pub const SYSTEM_PROMPT: &str = include_str!("prompts/system.md");
/// Architect prompt, written to `.ralph/architect.md` when missing.
pub const ARCHITECT_PROMPT: &str = include_str!("prompts/architect_prompt.md");

/// Template engine wrapper around minijinja.
pub struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.add_template("turn", TURN_TEMPLATE)
            .expect("turn template should be valid");
        env.add_template("architect", ARCHITECT_TEMPLATE)
            .expect("architect template should be valid");
        Self { env }
    }

    /// Single-line instruction passed to the agent for one turn.
    ///
    /// Design mode replaces the phase-specific text.
    pub fn render_turn_instruction(&self, phase: Phase, design: bool) -> Result<String> {
        let template = self.env.get_template("turn")?;
        let rendered = template.render(context! {
            phase => phase.as_str(),
            design => design,
        })?;
        Ok(rendered.trim().to_string())
    }

    pub fn render_architect_instruction(&self, idea: &str) -> Result<String> {
        let template = self.env.get_template("architect")?;
        let rendered = template.render(context! { idea => idea.trim() })?;
        Ok(rendered.trim().to_string())
    }
}

impl Default for PromptEngine {
    fn default() -> Self {
        Self::new()
    }
}
