//! Deterministic, pure logic shared by the loop engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! values (file contents, durations, model listings) and return deterministic
//! outputs suitable for tests.

pub mod models;
pub mod phase;
pub mod session;
pub mod tail;
pub mod types;
pub mod verdict;
pub mod watchdog;
