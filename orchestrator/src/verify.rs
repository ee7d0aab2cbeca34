//! `verify`: score a session's phase outputs and act on the feedback decision.

use anyhow::{Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use crate::core::algorithm::AlgorithmPhase;
use crate::core::feedback::{FeedbackAction, FeedbackDecision, decide};
use crate::core::flow_defs::VERIFY_FLOW;
use crate::core::ideal_state::IdealState;
use crate::core::verification::{VerificationResult, verify};
use crate::exit_codes;
use crate::flow::is_flow_complete;
use crate::io::chain_store::load_chain;
use crate::io::init::OrchestratorPaths;
use crate::io::session_store::{load_session, save_session};
use crate::phase::{PhaseOutcome, render_static};

#[derive(Debug, Clone)]
pub struct VerifyOutcome {
    pub session_id: String,
    pub result: VerificationResult,
    pub decision: FeedbackDecision,
    /// Loop-backs taken so far, after this decision.
    pub verify_iteration: u32,
    pub max_verify_iterations: u32,
    /// What OBSERVE needs after a loop-back.
    pub observe: Option<PhaseOutcome>,
}

impl VerifyOutcome {
    pub fn render(&self) -> String {
        let mut out = format!(
            "## Verification: {}\n\n\
             - **Session:** {}\n\
             - **Score:** {:.2} (objective {:.2}, heuristic {:.2}, semantic {:.2})\n\
             - **Iteration:** {}/{}\n\
             - **Action:** {}\n\n{}",
            self.result.status.as_str(),
            self.session_id,
            self.result.overall_score,
            self.result.objective_score,
            self.result.heuristic_score,
            self.result.semantic_score,
            self.verify_iteration,
            self.max_verify_iterations,
            self.decision.action.as_str(),
            self.decision.message
        );
        if !self.decision.gaps.is_empty() {
            out.push_str("\n\n### Gaps\n");
            for gap in &self.decision.gaps {
                out.push_str(&format!("\n- {gap}"));
            }
        }
        match (self.decision.action, &self.observe) {
            (FeedbackAction::Proceed, _) => out.push_str(&format!(
                "\n\nNext:\n\n```bash\norchestrator phase learn --state {} --output '<json>'\n```",
                self.session_id
            )),
            (FeedbackAction::LoopBack, Some(observe)) => {
                out.push_str("\n\n---\n\n");
                out.push_str(&observe.render());
            }
            (FeedbackAction::LoopBack, None) => {}
            (FeedbackAction::Escalate, _) => {
                out.push_str("\n\nSTOP: user review required before this session continues.")
            }
        }
        out
    }

    pub fn exit_code(&self) -> i32 {
        match self.decision.action {
            FeedbackAction::Escalate => exit_codes::ESCALATED,
            _ => exit_codes::OK,
        }
    }
}

/// Verify the session at VERIFY. LOOP_BACK moves it to OBSERVE.
pub fn run_verify(paths: &OrchestratorPaths, session_id: &str) -> Result<VerifyOutcome> {
    let mut state = load_session(paths, session_id)?;
    if state.current_phase != AlgorithmPhase::Verify {
        bail!(
            "session {session_id} is at {}, not VERIFY; run `orchestrator phase verify --state {session_id}` first",
            state.current_phase.label()
        );
    }
    let verify_chain_running = load_chain(paths, session_id)?
        .is_some_and(|chain| chain.flow_id == VERIFY_FLOW);
    if verify_chain_running && !is_flow_complete(paths, session_id, VERIFY_FLOW)? {
        bail!(
            "flow {VERIFY_FLOW} for {session_id} is not complete; finish the agent chain before `verify`"
        );
    }

    let ideal = match state.ideal_state.clone() {
        Some(ideal) => ideal,
        None => {
            warn!(session_id, "no ideal state recorded; verifying against an empty one");
            IdealState::default()
        }
    };
    let now = Utc::now();
    let result = verify(&ideal, &state.phase_outputs, state.verify_iteration, now);
    let decision = decide(&result, state.verify_iteration, state.max_verify_iterations);
    state.add_verification_result(result.clone())?;
    if decision.action == FeedbackAction::LoopBack {
        state.loop_back(now)?;
    }
    save_session(
        paths,
        &state,
        &format!("verify {}", decision.action.as_str()),
    )?;
    info!(
        session_id,
        status = result.status.as_str(),
        score = result.overall_score,
        action = decision.action.as_str(),
        "verification recorded"
    );
    let observe = if decision.action == FeedbackAction::LoopBack {
        Some(PhaseOutcome {
            session_id: session_id.to_string(),
            phase: AlgorithmPhase::Observe,
            body: render_static(paths, &state, AlgorithmPhase::Observe)?,
            exit_code: exit_codes::OK,
        })
    } else {
        None
    };
    Ok(VerifyOutcome {
        session_id: session_id.to_string(),
        result,
        decision,
        verify_iteration: state.verify_iteration,
        max_verify_iterations: state.max_verify_iterations,
        observe,
    })
}
