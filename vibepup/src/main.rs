//! Supervised autonomous agent loop.
//!
//! Runs an external coding agent against `prd.md` one turn per iteration,
//! switching between PLAN and BUILD based on `repo-map.md`, until the agent
//! signals completion or the iteration limit is reached.

use std::env;
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use vibepup::exit_codes;
use vibepup::io::agent::OpencodeAgent;
use vibepup::io::config::{VibepupConfig, load_config_with_env};
use vibepup::io::init::{ProjectPaths, scaffold_project};
use vibepup::io::models::resolve_candidates;
use vibepup::looping::{Engine, LoopSettings, LoopStop, loop_mode};
use vibepup::start::{
    ArchitectFailedError, MissingAgentError, bootstrap_architect, ensure_agent_installed,
};

#[derive(Parser)]
#[command(
    name = "vibepup",
    version,
    about = "Supervised autonomous agent loop",
    args_conflicts_with_subcommands = true
)]
struct Cli {
    #[command(flatten)]
    loop_args: LoopArgs,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args, Debug, Default, PartialEq, Eq)]
struct LoopArgs {
    /// Maximum iterations in bounded mode.
    iterations: Option<u32>,
    /// Keep running and restart when prd.md changes.
    #[arg(long)]
    watch: bool,
    /// Attach the frontend-design skill to every turn.
    #[arg(long)]
    design: bool,
}

impl LoopArgs {
    fn apply(&self, cfg: &mut VibepupConfig) {
        if let Some(iterations) = self.iterations {
            cfg.run.iterations = iterations;
        }
        if self.watch {
            cfg.run.watch = true;
        }
        if self.design {
            cfg.run.design = true;
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Bootstrap a project from an idea with the architect, then run the loop.
    New {
        /// One-line project idea.
        idea: String,
        #[command(flatten)]
        loop_args: LoopArgs,
    },
    /// Report agent version, available models and project paths.
    Doctor,
    /// Create missing project files and exit.
    Init,
}

fn main() {
    vibepup::logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_code_for(&err));
    }
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    if err.downcast_ref::<MissingAgentError>().is_some() {
        return exit_codes::MISSING_AGENT;
    }
    if let Some(failed) = err.downcast_ref::<ArchitectFailedError>() {
        return failed.code;
    }
    exit_codes::FAILURE
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let root = env::current_dir().context("resolve working directory")?;
    let paths = ProjectPaths::new(root);
    match cli.command {
        Some(Command::Init) => cmd_init(&paths),
        Some(Command::Doctor) => cmd_doctor(&paths),
        Some(Command::New { idea, loop_args }) => cmd_loop(&paths, &loop_args, Some(&idea)),
        None => cmd_loop(&paths, &cli.loop_args, None),
    }
}

fn load_config(paths: &ProjectPaths) -> Result<VibepupConfig> {
    let cfg = load_config_with_env(&paths.config_path)?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", paths.config_path.display()))?;
    Ok(cfg)
}

fn scaffold(paths: &ProjectPaths) -> Result<()> {
    let report = scaffold_project(paths).context("scaffold project files")?;
    if report.migrated_legacy_prd {
        println!("Migrated legacy prd.json to prd.md");
    }
    for created in &report.created {
        info!(path = %created.display(), "created");
    }
    Ok(())
}

fn cmd_init(paths: &ProjectPaths) -> Result<()> {
    scaffold(paths)?;
    println!("Project files ready in {}", paths.root.display());
    Ok(())
}

fn cmd_doctor(paths: &ProjectPaths) -> Result<()> {
    let cfg = load_config(paths)?;
    scaffold(paths)?;
    let agent = OpencodeAgent::from_config(&cfg, &paths.root);
    let stdout = io::stdout();
    let mut out = stdout.lock();
    vibepup::doctor::run_doctor(&agent, agent.command_name(), paths, &mut out)
}

fn cmd_loop(paths: &ProjectPaths, args: &LoopArgs, idea: Option<&str>) -> Result<()> {
    let mut cfg = load_config(paths)?;
    args.apply(&mut cfg);
    cfg.validate()?;

    println!("Vibepup v{} (CLI Mode)", env!("CARGO_PKG_VERSION"));
    println!("  Context: {}", paths.root.display());

    scaffold(paths)?;

    let agent = OpencodeAgent::from_config(&cfg, &paths.root);
    ensure_agent_installed(&agent, agent.command_name())?;
    let models = resolve_candidates(&agent, &cfg.models, cfg.run.model_override.as_deref())?;

    if let Some(idea) = idea {
        bootstrap_architect(&agent, paths, &models, idea)?;
    }

    let home = env::var_os("HOME").map(PathBuf::from);
    let settings = LoopSettings::from_config(&cfg, home.as_deref());
    let engine = Engine::new(paths, &agent, &models, settings);
    let mut session = engine.start_session(loop_mode(&cfg))?;
    match engine.run(&mut session, |_| {})? {
        LoopStop::Complete { iteration } => {
            println!("Completed after iteration {iteration}.");
        }
        LoopStop::MaxIterations { max_iterations } => {
            println!("Stopped after {max_iterations} iterations.");
        }
    }
    Ok(())
}
