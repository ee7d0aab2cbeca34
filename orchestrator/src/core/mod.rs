//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules are free of I/O side effects. They operate on in-memory
//! state and return deterministic outputs suitable for tests.

pub mod agents;
pub mod algorithm;
pub mod chain_state;
pub mod completeness;
pub mod complexity;
pub mod decompose;
pub mod domain;
pub mod dynamic;
pub mod feedback;
pub mod flow;
pub mod flow_defs;
pub mod fsm;
pub mod ideal_state;
pub mod language;
pub mod questions;
pub mod scaffold;
pub mod tdd;
pub mod types;
pub mod verification;
