//! Deterministic orchestration engine for The Last Algorithm.
//!
//! The orchestrator owns task state and hands an AI session one directive at
//! a time: which phase to enter, which agent to dispatch next, which command
//! to run when that is done. The architecture keeps a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (state machines, flow definitions,
//!   verification, completeness, decomposition review). No I/O.
//! - **[`io`]**: Side-effecting operations (state files, journal, memory files,
//!   prompt templates, config).
//!
//! Orchestration modules ([`route`], [`phase`], [`flow`], [`decompose`],
//! [`verify`], [`interview`], [`tdd`], [`scaffold`], [`questions`]) combine
//! core logic with I/O to implement CLI commands.

pub mod core;
pub mod decompose;
pub mod exit_codes;
pub mod flow;
pub mod interview;
pub mod io;
pub mod logging;
pub mod phase;
pub mod questions;
pub mod route;
pub mod scaffold;
pub mod tdd;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod verify;
