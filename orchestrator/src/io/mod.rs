//! I/O helpers for orchestrator commands.

pub mod atomic;
pub mod chain_store;
pub mod config;
pub mod content;
pub mod detect;
pub mod init;
pub mod journal;
pub mod memory;
pub mod prompt;
pub mod schema;
pub mod session_store;
