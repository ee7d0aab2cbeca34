//! Shared deterministic types for orchestrator core logic.
//!
//! These types are stable contracts between modules and appear verbatim in
//! persisted state and printed directives.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Ordinal task complexity category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Trivial,
    Simple,
    Moderate,
    Complex,
    VeryComplex,
}

impl Complexity {
    pub const ALL: [Complexity; 5] = [
        Complexity::Trivial,
        Complexity::Simple,
        Complexity::Moderate,
        Complexity::Complex,
        Complexity::VeryComplex,
    ];

    /// Wire name (`very_complex`).
    pub fn as_str(self) -> &'static str {
        match self {
            Complexity::Trivial => "trivial",
            Complexity::Simple => "simple",
            Complexity::Moderate => "moderate",
            Complexity::Complex => "complex",
            Complexity::VeryComplex => "very_complex",
        }
    }

    /// Upper-case label for headers (`VERY COMPLEX`).
    pub fn display_upper(self) -> String {
        self.as_str().replace('_', " ").to_uppercase()
    }

    pub fn parse(raw: &str) -> Option<Complexity> {
        let wanted = raw.trim().to_lowercase();
        Complexity::ALL.into_iter().find(|c| c.as_str() == wanted)
    }
}

/// Verdict vocabulary emitted by validation-type steps.
///
/// Printed verbatim; downstream automation matches on these strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateVerdict {
    #[serde(rename = "GO")]
    Go,
    #[serde(rename = "NO-GO")]
    NoGo,
    #[serde(rename = "CONDITIONAL")]
    Conditional,
}

impl GateVerdict {
    pub fn as_str(self) -> &'static str {
        match self {
            GateVerdict::Go => "GO",
            GateVerdict::NoGo => "NO-GO",
            GateVerdict::Conditional => "CONDITIONAL",
        }
    }

    pub fn parse(raw: &str) -> Option<GateVerdict> {
        match raw.trim().to_uppercase().replace('_', "-").as_str() {
            "GO" => Some(GateVerdict::Go),
            "NO-GO" | "NOGO" => Some(GateVerdict::NoGo),
            "CONDITIONAL" => Some(GateVerdict::Conditional),
            _ => None,
        }
    }
}

/// Start/end timestamps for one phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PhaseTiming {
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}
