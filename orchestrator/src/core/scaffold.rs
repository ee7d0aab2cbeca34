//! Scaffold-docs protocol.
//!
//! Scaffold mode walks the full chain; update mode enters at ANALYSIS because
//! an existing documentation tree needs no clarification round.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::fsm::{Protocol, StateError, transition};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScaffoldPhase {
    Initialized,
    Clarification,
    Analysis,
    Synthesis,
    Validation,
    Completed,
}

impl ScaffoldPhase {
    pub fn label(self) -> &'static str {
        match self {
            ScaffoldPhase::Initialized => "INITIALIZED",
            ScaffoldPhase::Clarification => "CLARIFICATION",
            ScaffoldPhase::Analysis => "ANALYSIS",
            ScaffoldPhase::Synthesis => "SYNTHESIS",
            ScaffoldPhase::Validation => "VALIDATION",
            ScaffoldPhase::Completed => "COMPLETED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ScaffoldMode {
    #[default]
    Scaffold,
    Update,
}

impl ScaffoldMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ScaffoldMode::Scaffold => "scaffold",
            ScaffoldMode::Update => "update",
        }
    }

    pub fn parse(raw: &str) -> Option<ScaffoldMode> {
        match raw.trim().to_lowercase().as_str() {
            "scaffold" => Some(ScaffoldMode::Scaffold),
            "update" => Some(ScaffoldMode::Update),
            _ => None,
        }
    }

    /// Phase entered by `scaffold start`.
    pub fn entry_phase(self) -> ScaffoldPhase {
        match self {
            ScaffoldMode::Scaffold => ScaffoldPhase::Clarification,
            ScaffoldMode::Update => ScaffoldPhase::Analysis,
        }
    }

    /// Agent flow that runs while the session sits in the entry phase.
    pub fn flow_id(self) -> &'static str {
        match self {
            ScaffoldMode::Scaffold => "scaffold-docs-scaffold",
            ScaffoldMode::Update => "scaffold-docs-update",
        }
    }
}

pub struct ScaffoldProtocol;

impl Protocol for ScaffoldProtocol {
    type Phase = ScaffoldPhase;
    const NAME: &'static str = "scaffold-docs";

    fn phases() -> &'static [ScaffoldPhase] {
        use ScaffoldPhase as P;
        &[
            P::Initialized,
            P::Clarification,
            P::Analysis,
            P::Synthesis,
            P::Validation,
            P::Completed,
        ]
    }

    fn successors(phase: ScaffoldPhase) -> &'static [ScaffoldPhase] {
        use ScaffoldPhase as P;
        match phase {
            P::Initialized => &[P::Clarification, P::Analysis],
            P::Clarification => &[P::Analysis],
            P::Analysis => &[P::Synthesis],
            P::Synthesis => &[P::Validation],
            P::Validation => &[P::Completed],
            P::Completed => &[],
        }
    }

    fn label(phase: ScaffoldPhase) -> &'static str {
        phase.label()
    }
}

/// Persisted scaffold-docs session (`state/scaffold/{id}.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScaffoldState {
    pub session_id: String,
    pub mode: ScaffoldMode,
    pub current_phase: ScaffoldPhase,
    #[serde(default)]
    pub detected_language: Option<String>,
    #[serde(default)]
    pub detected_frameworks: Vec<String>,
    #[serde(default)]
    pub created_files: Vec<String>,
    #[serde(default)]
    pub updated_files: Vec<String>,
    #[serde(default)]
    pub history: Vec<ScaffoldPhase>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScaffoldState {
    pub fn new(session_id: impl Into<String>, mode: ScaffoldMode, now: DateTime<Utc>) -> Self {
        Self {
            session_id: session_id.into(),
            mode,
            current_phase: ScaffoldPhase::Initialized,
            detected_language: None,
            detected_frameworks: Vec::new(),
            created_files: Vec::new(),
            updated_files: Vec::new(),
            history: vec![ScaffoldPhase::Initialized],
            created_at: now,
            updated_at: now,
        }
    }

    fn ensure_mutable(&self) -> Result<(), StateError> {
        if ScaffoldProtocol::is_terminal(self.current_phase) {
            return Err(StateError::Terminal {
                protocol: ScaffoldProtocol::NAME,
                id: self.session_id.clone(),
            });
        }
        Ok(())
    }

    /// Move to `target`. Leaving INITIALIZED must follow the mode's entry fork.
    pub fn advance_to(
        &mut self,
        target: ScaffoldPhase,
        now: DateTime<Utc>,
    ) -> Result<(), StateError> {
        self.ensure_mutable()?;
        transition::<ScaffoldProtocol>(self.current_phase, target)?;
        if self.current_phase == ScaffoldPhase::Initialized && target != self.mode.entry_phase() {
            return Err(StateError::Transition(crate::core::fsm::TransitionError {
                protocol: ScaffoldProtocol::NAME,
                from: self.current_phase.label(),
                to: target.label(),
            }));
        }
        self.current_phase = target;
        self.history.push(target);
        self.updated_at = now;
        Ok(())
    }

    /// Next phase along the forward chain.
    pub fn next_phase(&self) -> Option<ScaffoldPhase> {
        match self.current_phase {
            ScaffoldPhase::Initialized => Some(self.mode.entry_phase()),
            other => ScaffoldProtocol::successors(other).first().copied(),
        }
    }

    /// Record produced files; repeated paths are kept once.
    pub fn record_files(
        &mut self,
        created: &[String],
        updated: &[String],
        now: DateTime<Utc>,
    ) -> Result<(), StateError> {
        self.ensure_mutable()?;
        extend_unique(&mut self.created_files, created);
        extend_unique(&mut self.updated_files, updated);
        self.updated_at = now;
        Ok(())
    }
}

fn extend_unique(target: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !target.contains(item) {
            target.push(item.clone());
        }
    }
}
