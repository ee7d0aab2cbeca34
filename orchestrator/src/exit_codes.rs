//! Stable exit codes for orchestrator CLI commands.

/// Command succeeded and its directive was printed.
pub const OK: i32 = 0;
/// Invalid input, illegal transition, missing artifact or any other error.
pub const INVALID: i32 = 1;
/// An agent asked for clarification; the chain waits for `flow resume`.
pub const HALTED: i32 = 2;
/// User review required: verification escalated or decompose retries ran out.
pub const ESCALATED: i32 = 3;
