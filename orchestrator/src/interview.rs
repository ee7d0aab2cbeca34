//! `interview`: score a proposed ideal state and decide whether INTERVIEW is done.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use tracing::info;

use crate::core::algorithm::AlgorithmPhase;
use crate::core::chain_state::ChainContext;
use crate::core::completeness::{CompletenessResult, evaluate};
use crate::core::flow_defs::INTERVIEW_REFINEMENT_FLOW;
use crate::core::ideal_state::{IdealState, InterviewIteration};
use crate::flow::{NeverSkip, start_flow};
use crate::io::chain_store::resolve_flow;
use crate::io::config::OrchestratorConfig;
use crate::io::init::OrchestratorPaths;
use crate::io::session_store::{load_session, save_session};

#[derive(Debug, Clone)]
pub struct InterviewOutcome {
    pub session_id: String,
    pub iteration: u32,
    pub completeness: CompletenessResult,
    pub ready: bool,
    /// Next directive: refinement flow or the OBSERVE command.
    pub next: String,
}

impl InterviewOutcome {
    pub fn render(&self) -> String {
        let mut out = format!(
            "## IDEAL STATE Assessment\n\n\
             - **Session:** {}\n\
             - **Iteration:** {}\n\
             - **Completeness:** {:.0}%\n",
            self.session_id,
            self.iteration,
            self.completeness.overall_score * 100.0
        );
        if !self.completeness.missing_elements.is_empty() {
            out.push_str("\n### Missing\n\n");
            for (missing, advice) in self
                .completeness
                .missing_elements
                .iter()
                .zip(&self.completeness.recommendations)
            {
                out.push_str(&format!("- {missing}: {advice}\n"));
            }
        }
        out.push('\n');
        out.push_str(&self.next);
        out
    }
}

/// Record `ideal_file` as the session's ideal state and evaluate it.
pub fn run_interview(
    paths: &OrchestratorPaths,
    config: &OrchestratorConfig,
    session_id: &str,
    ideal_file: &Path,
    use_flow: bool,
) -> Result<InterviewOutcome> {
    let mut state = load_session(paths, session_id)?;
    if state.current_phase != AlgorithmPhase::Interview {
        bail!(
            "session {session_id} is at {}, not INTERVIEW",
            state.current_phase.label()
        );
    }
    let raw = fs::read_to_string(ideal_file)
        .with_context(|| format!("read ideal state {}", ideal_file.display()))?;
    let ideal: IdealState = serde_json::from_str(&raw)
        .with_context(|| format!("parse ideal state {}", ideal_file.display()))?;

    let completeness = evaluate(Some(&ideal), config.completeness_threshold);
    let iteration = u32::try_from(state.interview_iterations.len()).unwrap_or(u32::MAX) + 1;
    let ready = completeness.ready_to_proceed || iteration >= config.max_interview_iterations;
    state.record_interview(
        ideal,
        InterviewIteration {
            iteration,
            completeness: completeness.overall_score,
            missing_elements: completeness.missing_elements.clone(),
        },
        Utc::now(),
    )?;
    save_session(paths, &state, &format!("interview iteration {iteration}"))?;
    info!(
        session_id,
        iteration,
        score = completeness.overall_score,
        ready,
        "ideal state evaluated"
    );

    let next = if ready {
        let mut text = String::new();
        if !completeness.ready_to_proceed {
            text.push_str(&format!(
                "**WARNING:** Interview limit ({}) reached below the {:.0}% threshold; proceeding.\n\n",
                config.max_interview_iterations,
                config.completeness_threshold * 100.0
            ));
        }
        text.push_str(&format!(
            "IDEAL STATE accepted. Run:\n\n```bash\norchestrator phase observe --state {session_id} --output '<json>'\n```"
        ));
        text
    } else if use_flow {
        let flow = resolve_flow(paths, INTERVIEW_REFINEMENT_FLOW)?;
        let context = ChainContext {
            skill_name: None,
            phase_id: Some(AlgorithmPhase::Interview.label().to_string()),
            domain: state.domain_label(&config.default_domain).to_string(),
            task_description: state.user_query.clone(),
        };
        start_flow(paths, config, flow, session_id, context, &NeverSkip)?.render()
    } else {
        format!(
            "Refine the ideal state, then run:\n\n```bash\n\
             orchestrator interview --state {session_id} --ideal <ideal-state.json>\n```"
        )
    };

    Ok(InterviewOutcome {
        session_id: session_id.to_string(),
        iteration,
        completeness,
        ready,
        next,
    })
}
