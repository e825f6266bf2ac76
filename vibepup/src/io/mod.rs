//! I/O helpers for the loop engine.

pub mod agent;
pub mod config;
pub mod fingerprint;
pub mod init;
pub mod iteration_log;
pub mod models;
pub mod phase_signal;
pub mod process;
pub mod progress;
pub mod prompt;
pub mod run_dir;
