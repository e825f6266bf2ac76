//! Supervised autonomous agent loop.
//!
//! vibepup repeatedly hands a project's task checklist to an external coding
//! agent, one turn per iteration, until the agent reports completion or an
//! iteration limit is reached. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure logic (phase rules, model resolution, turn verdicts,
//!   watchdog schedule, session state). No I/O.
//! - **[`io`]**: Side-effecting operations (filesystem, process supervision,
//!   the agent CLI). Isolated behind [`io::agent::AgentBackend`] for tests.
//!
//! Orchestration modules ([`looping`], [`start`], [`doctor`]) coordinate core
//! logic with I/O to implement CLI commands.

pub mod core;
pub mod doctor;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod looping;
pub mod start;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
