//! `tdd start` / `tdd advance`: the perform-tdd skill session.
//!
//! Every phase from RED to DOC is backed by its own `perform-tdd-{phase}`
//! agent flow. When flows are in use, advancing requires the current phase's
//! flow to have finished.

use anyhow::{Result, anyhow};
use chrono::Utc;
use serde_json::Value;
use tracing::info;

use crate::core::chain_state::ChainContext;
use crate::core::tdd::{TddPhase, TddState};
use crate::flow::{NeverSkip, require_flow_complete, start_flow};
use crate::io::chain_store::resolve_flow;
use crate::io::config::OrchestratorConfig;
use crate::io::init::OrchestratorPaths;
use crate::io::session_store::{load_session, load_tdd, new_session_id, save_tdd};

pub const SKILL_NAME: &str = "perform-tdd";

/// Agent flow run while the session sits in `phase`.
pub fn flow_for(phase: TddPhase) -> Option<String> {
    match phase {
        TddPhase::Red | TddPhase::Green | TddPhase::Refactor | TddPhase::Doc => Some(format!(
            "{SKILL_NAME}-{}",
            phase.label().to_lowercase()
        )),
        TddPhase::Initialized | TddPhase::Completed => None,
    }
}

fn task_for(phase: TddPhase, state: &TddState) -> String {
    let target = state.target_file.as_deref().unwrap_or("the target");
    match phase {
        TddPhase::Red => format!("Write failing test for {target}"),
        TddPhase::Green => format!("Make the failing test pass in {target}"),
        TddPhase::Refactor => format!("Refactor {target} with tests green"),
        TddPhase::Doc => format!("Document {target}"),
        TddPhase::Initialized | TddPhase::Completed => String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TddOutcome {
    pub session_id: String,
    pub phase: TddPhase,
    pub cycle: u32,
    pub body: String,
}

impl TddOutcome {
    pub fn render(&self) -> String {
        format!(
            "## TDD: {}\n\nSession: {} (cycle {})\n\n{}",
            self.phase.label(),
            self.session_id,
            self.cycle + 1,
            self.body
        )
    }
}

/// Create a TDD session and enter RED.
pub fn start_tdd(
    paths: &OrchestratorPaths,
    config: &OrchestratorConfig,
    target_file: Option<String>,
    test_file: Option<String>,
    parent: Option<String>,
    use_flow: bool,
) -> Result<TddOutcome> {
    if let Some(parent) = parent.as_deref() {
        load_session(paths, parent)?;
    }
    let now = Utc::now();
    let mut state = TddState::new(new_session_id(), now);
    state.target_file = target_file;
    state.test_file = test_file;
    state.parent_algorithm_id = parent;
    state.advance_to(TddPhase::Red, now)?;
    save_tdd(paths, &state, "INITIALIZED -> RED")?;
    info!(session_id = %state.session_id, "tdd session started");
    let body = enter(paths, config, &state, use_flow)?;
    Ok(TddOutcome {
        session_id: state.session_id.clone(),
        phase: state.current_phase,
        cycle: state.cycle_count,
        body,
    })
}

/// Leave the current phase. `restart_cycle` turns DOC -> RED instead of DOC -> COMPLETED.
pub fn advance_tdd(
    paths: &OrchestratorPaths,
    config: &OrchestratorConfig,
    session_id: &str,
    output: Option<Value>,
    restart_cycle: bool,
    use_flow: bool,
) -> Result<TddOutcome> {
    let mut state = load_tdd(paths, session_id)?;
    let leaving = state.current_phase;
    if let Some(flow_id) = flow_for(leaving).filter(|_| use_flow) {
        require_flow_complete(paths, session_id, &flow_id)?;
    }
    let now = Utc::now();
    if let Some(output) = output {
        state.record_phase_output(leaving, output, now)?;
    }
    let target = if restart_cycle && leaving == TddPhase::Doc {
        TddPhase::Red
    } else {
        leaving
            .next()
            .ok_or_else(|| anyhow!("tdd session {session_id} is already COMPLETED"))?
    };
    state.advance_to(target, now)?;
    save_tdd(
        paths,
        &state,
        &format!("{} -> {}", leaving.label(), target.label()),
    )?;
    info!(session_id, from = leaving.label(), to = target.label(), "tdd transition");
    let body = enter(paths, config, &state, use_flow)?;
    Ok(TddOutcome {
        session_id: session_id.to_string(),
        phase: state.current_phase,
        cycle: state.cycle_count,
        body,
    })
}

fn enter(
    paths: &OrchestratorPaths,
    config: &OrchestratorConfig,
    state: &TddState,
    use_flow: bool,
) -> Result<String> {
    let phase = state.current_phase;
    let id = &state.session_id;
    if phase == TddPhase::Completed {
        let mut text = format!("TDD session {id} COMPLETED after {} cycle(s).", state.cycle_count + 1);
        if let Some(parent) = state.parent_algorithm_id.as_deref() {
            text.push_str(&format!("\n\nReturn to algorithm session {parent}."));
        }
        return Ok(text);
    }
    let advance = if phase == TddPhase::Doc {
        format!(
            "orchestrator tdd advance --state {id}\n# or start another cycle:\norchestrator tdd advance --state {id} --loop"
        )
    } else {
        format!("orchestrator tdd advance --state {id}")
    };
    let flow_id = flow_for(phase).filter(|_| use_flow);
    let Some(flow_id) = flow_id else {
        return Ok(format!(
            "**Task:** {}\n\nWhen this phase is done, run:\n\n```bash\n{advance}\n```",
            task_for(phase, state)
        ));
    };
    let flow = resolve_flow(paths, &flow_id)?;
    let context = ChainContext {
        skill_name: Some(SKILL_NAME.to_string()),
        phase_id: Some(phase.label().to_string()),
        domain: config.default_domain.clone(),
        task_description: task_for(phase, state),
    };
    let next = start_flow(paths, config, flow, id, context, &NeverSkip)?;
    Ok(format!(
        "{}\n\nAfter the flow completes, run:\n\n```bash\n{advance}\n```",
        next.render()
    ))
}
