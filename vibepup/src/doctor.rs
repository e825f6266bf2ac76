//! `vibepup doctor`: report what the loop would see, change nothing.

use std::io::Write;

use anyhow::Result;
use tracing::debug;

use crate::core::models::parse_model_listing;
use crate::io::agent::AgentBackend;
use crate::io::init::ProjectPaths;

/// Print agent version, listed model count and project paths to `out`.
///
/// Agent failures are reported in the output, not as errors; only writes to
/// `out` can fail.
pub fn run_doctor<A: AgentBackend, W: Write>(
    agent: &A,
    command: &str,
    paths: &ProjectPaths,
    out: &mut W,
) -> Result<()> {
    writeln!(out, "Vibepup Doctor")?;

    match agent.version() {
        Ok(Some(version)) => writeln!(out, "- {command}: {version}")?,
        Ok(None) => writeln!(out, "- {command}: not found")?,
        Err(err) => {
            debug!(err = %format!("{err:#}"), "version check failed");
            writeln!(out, "- {command}: not found")?;
        }
    }

    match agent.list_models() {
        Ok(listing) => {
            let models = parse_model_listing(&listing);
            writeln!(out, "- models found: {}", models.len())?;
            if models.is_empty() {
                writeln!(out, "  No models available. Run:")?;
                writeln!(out, "     {command} auth login")?;
                writeln!(out, "     {command} models --refresh")?;
            }
        }
        Err(err) => {
            debug!(err = %format!("{err:#}"), "model listing failed");
            writeln!(out, "- models refresh: failed")?;
        }
    }

    writeln!(out, "- project: {}", paths.root.display())?;
    writeln!(out, "- task file: {}", paths.prd_path.display())?;
    writeln!(out, "- phase signal: {}", paths.repo_map_path.display())?;
    writeln!(out, "- runs: {}", paths.runs_dir.display())?;
    writeln!(out, "- config: {}", paths.config_path.display())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ScriptedAgent, TestProject};

    fn render<A: AgentBackend>(agent: &A, project: &TestProject) -> String {
        let mut out = Vec::new();
        run_doctor(agent, "opencode", &project.paths, &mut out).expect("doctor");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn reports_version_and_model_count() {
        let project = TestProject::new();
        let agent = ScriptedAgent::new().with_models("a/one\nb/two\nnoise line\n");

        let out = render(&agent, &project);

        assert!(out.contains("- opencode: 0.0.0-scripted"));
        assert!(out.contains("- models found: 2"));
        assert!(!out.contains("No models available"));
    }

    #[test]
    fn reports_missing_agent_and_failed_listing() {
        let project = TestProject::new();
        let agent = ScriptedAgent::new()
            .without_version()
            .with_model_listing_error();

        let out = render(&agent, &project);

        assert!(out.contains("- opencode: not found"));
        assert!(out.contains("- models refresh: failed"));
    }

    #[test]
    fn hints_when_no_models_are_listed() {
        let project = TestProject::new();
        let agent = ScriptedAgent::new().with_models("");

        let out = render(&agent, &project);

        assert!(out.contains("- models found: 0"));
        assert!(out.contains("models --refresh"));
    }
}
