//! TDD cycle protocol: RED -> GREEN -> REFACTOR -> DOC, looping back to RED.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::fsm::{Protocol, StateError, transition};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TddPhase {
    Initialized,
    Red,
    Green,
    Refactor,
    Doc,
    Completed,
}

impl TddPhase {
    pub fn label(self) -> &'static str {
        match self {
            TddPhase::Initialized => "INITIALIZED",
            TddPhase::Red => "RED",
            TddPhase::Green => "GREEN",
            TddPhase::Refactor => "REFACTOR",
            TddPhase::Doc => "DOC",
            TddPhase::Completed => "COMPLETED",
        }
    }

    /// Forward step used by `tdd advance` (the DOC -> RED loop is opt-in).
    pub fn next(self) -> Option<TddPhase> {
        match self {
            TddPhase::Initialized => Some(TddPhase::Red),
            TddPhase::Red => Some(TddPhase::Green),
            TddPhase::Green => Some(TddPhase::Refactor),
            TddPhase::Refactor => Some(TddPhase::Doc),
            TddPhase::Doc => Some(TddPhase::Completed),
            TddPhase::Completed => None,
        }
    }
}

pub struct TddProtocol;

impl Protocol for TddProtocol {
    type Phase = TddPhase;
    const NAME: &'static str = "tdd";

    fn phases() -> &'static [TddPhase] {
        &[
            TddPhase::Initialized,
            TddPhase::Red,
            TddPhase::Green,
            TddPhase::Refactor,
            TddPhase::Doc,
            TddPhase::Completed,
        ]
    }

    fn successors(phase: TddPhase) -> &'static [TddPhase] {
        match phase {
            TddPhase::Initialized => &[TddPhase::Red],
            TddPhase::Red => &[TddPhase::Green],
            TddPhase::Green => &[TddPhase::Refactor],
            TddPhase::Refactor => &[TddPhase::Doc],
            TddPhase::Doc => &[TddPhase::Completed, TddPhase::Red],
            TddPhase::Completed => &[],
        }
    }

    fn label(phase: TddPhase) -> &'static str {
        phase.label()
    }
}

/// Persisted TDD session (`state/tdd/{id}.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TddState {
    pub session_id: String,
    pub current_phase: TddPhase,
    #[serde(default)]
    pub parent_algorithm_id: Option<String>,
    #[serde(default)]
    pub target_file: Option<String>,
    #[serde(default)]
    pub test_file: Option<String>,
    #[serde(default)]
    pub cycle_count: u32,
    #[serde(default)]
    pub phase_outputs: BTreeMap<TddPhase, Value>,
    #[serde(default)]
    pub history: Vec<TddPhase>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TddState {
    pub fn new(session_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            current_phase: TddPhase::Initialized,
            parent_algorithm_id: None,
            target_file: None,
            test_file: None,
            cycle_count: 0,
            phase_outputs: BTreeMap::new(),
            history: vec![TddPhase::Initialized],
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `target`; DOC -> RED starts a new cycle.
    pub fn advance_to(&mut self, target: TddPhase, now: DateTime<Utc>) -> Result<(), StateError> {
        if TddProtocol::is_terminal(self.current_phase) {
            return Err(StateError::Terminal {
                protocol: TddProtocol::NAME,
                id: self.session_id.clone(),
            });
        }
        transition::<TddProtocol>(self.current_phase, target)?;
        if self.current_phase == TddPhase::Doc && target == TddPhase::Red {
            self.cycle_count += 1;
        }
        self.current_phase = target;
        self.history.push(target);
        self.updated_at = now;
        Ok(())
    }

    pub fn record_phase_output(
        &mut self,
        phase: TddPhase,
        output: Value,
        now: DateTime<Utc>,
    ) -> Result<(), StateError> {
        if TddProtocol::is_terminal(self.current_phase) {
            return Err(StateError::Terminal {
                protocol: TddProtocol::NAME,
                id: self.session_id.clone(),
            });
        }
        self.phase_outputs.insert(phase, output);
        self.updated_at = now;
        Ok(())
    }
}
