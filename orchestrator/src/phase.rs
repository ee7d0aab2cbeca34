//! Algorithm phase entry and session completion.
//!
//! `phase <name>` records the output of the phase being left, performs the
//! transition, persists the session, and only then prints what the new phase
//! needs: an agent flow directive or its static protocol content.

use anyhow::{Result, bail};
use chrono::Utc;
use serde_json::Value;
use tracing::info;

use crate::core::algorithm::{AlgorithmPhase, AlgorithmState};
use crate::core::chain_state::ChainContext;
use crate::core::flow_defs;
use crate::decompose::{SubtaskCompletion, on_subtask_complete};
use crate::flow::{NeverSkip, NextDirective, start_flow};
use crate::io::chain_store::resolve_flow;
use crate::io::config::OrchestratorConfig;
use crate::io::content::{load_content, substitute};
use crate::io::init::OrchestratorPaths;
use crate::io::session_store::{load_session, save_session};

/// Agent flow backing `phase`, if it has one.
pub fn flow_for_phase(phase: AlgorithmPhase, state: &AlgorithmState) -> Option<&'static str> {
    match phase {
        AlgorithmPhase::Gather => Some(flow_defs::GATHER_FLOW),
        AlgorithmPhase::Interview if state.interview_iterations.is_empty() => {
            Some(flow_defs::INTERVIEW_FLOW)
        }
        AlgorithmPhase::Interview => Some(flow_defs::INTERVIEW_REFINEMENT_FLOW),
        AlgorithmPhase::Verify => Some(flow_defs::VERIFY_FLOW),
        _ => None,
    }
}

/// Command that moves the session on once `phase` is done.
pub fn next_command(phase: AlgorithmPhase, session_id: &str) -> String {
    match phase {
        AlgorithmPhase::Interview => {
            format!("orchestrator interview --state {session_id} --ideal <ideal-state.json>")
        }
        AlgorithmPhase::Verify => format!("orchestrator verify --state {session_id}"),
        AlgorithmPhase::Learn => format!("orchestrator complete --state {session_id}"),
        other => match next_phase(other) {
            Some(next) => format!(
                "orchestrator phase {} --state {session_id} --output '<json>'",
                next.label().to_lowercase()
            ),
            None => String::new(),
        },
    }
}

fn next_phase(phase: AlgorithmPhase) -> Option<AlgorithmPhase> {
    use AlgorithmPhase as P;
    match phase {
        P::Initialized => Some(P::Gather),
        P::Gather => Some(P::Interview),
        P::Interview => Some(P::Observe),
        P::Observe => Some(P::Think),
        P::Think => Some(P::Plan),
        P::Plan => Some(P::Build),
        P::Build => Some(P::Execute),
        P::Execute => Some(P::Verify),
        P::Verify => Some(P::Learn),
        P::Learn => Some(P::Completed),
        P::Completed => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseOutcome {
    pub session_id: String,
    pub phase: AlgorithmPhase,
    pub body: String,
    pub exit_code: i32,
}

impl PhaseOutcome {
    pub fn render(&self) -> String {
        format!(
            "## Phase: {}\n\nSession: {}\n\n{}",
            self.phase.label(),
            self.session_id,
            self.body
        )
    }
}

/// Enter `target` for `session_id`.
pub fn enter_phase(
    paths: &OrchestratorPaths,
    config: &OrchestratorConfig,
    session_id: &str,
    target: AlgorithmPhase,
    output: Option<Value>,
    use_flow: bool,
) -> Result<PhaseOutcome> {
    let mut state = load_session(paths, session_id)?;
    if state.is_completed() {
        bail!("session {session_id} is COMPLETED; no further phases can run");
    }
    let now = Utc::now();
    let leaving = state.current_phase;
    if let Some(output) = output {
        state.record_phase_output(leaving, output, now)?;
    }
    state.start_phase(target, now)?;
    if target == AlgorithmPhase::Gather {
        let domain = state.ensure_domain();
        info!(session_id, domain = domain.as_str(), confidence = ?state.domain_confidence, "task domain");
    }
    save_session(
        paths,
        &state,
        &format!("{} -> {}", leaving.label(), target.label()),
    )?;
    info!(session_id, from = leaving.label(), to = target.label(), "phase transition");

    let domain = state.domain_label(&config.default_domain).to_string();
    let header = match state.task_domain.filter(|_| target == AlgorithmPhase::Gather) {
        Some(task_domain) => format!(
            "**Domain:** {} ({})\n\n",
            task_domain.as_str().to_uppercase(),
            task_domain.description()
        ),
        None => String::new(),
    };
    let flow_id = flow_for_phase(target, &state).filter(|_| use_flow);
    let (body, exit_code) = match flow_id {
        Some(flow_id) => {
            let flow = resolve_flow(paths, flow_id)?;
            let task_description = if target == AlgorithmPhase::Gather {
                format!("Gather current state for {domain} task")
            } else {
                state.user_query.clone()
            };
            let context = ChainContext {
                skill_name: None,
                phase_id: Some(target.label().to_string()),
                domain,
                task_description,
            };
            let next = start_flow(paths, config, flow, session_id, context, &NeverSkip)?;
            let mut body = header;
            body.push_str(&next.render());
            if matches!(next, NextDirective::FlowComplete { .. }) {
                body.push_str(&format!(
                    "\n\nNext: `{}`",
                    next_command(target, session_id)
                ));
            }
            (body, next.exit_code())
        }
        None => (
            header + &render_static(paths, &state, target)?,
            crate::exit_codes::OK,
        ),
    };
    Ok(PhaseOutcome {
        session_id: session_id.to_string(),
        phase: target,
        body,
        exit_code,
    })
}

/// `.claude/content/phases/{phase}.md` with placeholders filled in.
pub(crate) fn render_static(
    paths: &OrchestratorPaths,
    state: &AlgorithmState,
    phase: AlgorithmPhase,
) -> Result<String> {
    let relative = format!("phases/{}.md", phase.label().to_lowercase());
    let raw = load_content(paths, &relative)?;
    let iteration = state.verify_iteration.to_string();
    let content = substitute(
        &raw,
        &[
            ("session_id", &state.session_id),
            ("task_id", &state.session_id),
            ("user_query", &state.user_query),
            ("phase", phase.label()),
            ("iteration", &iteration),
        ],
    );
    let command = next_command(phase, &state.session_id);
    Ok(format!(
        "**Task:** {}\n\n{}\n\nWhen this phase is done, run:\n\n```bash\n{command}\n```",
        state.user_query.trim(),
        content.trim()
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteOutcome {
    pub session_id: String,
    pub subtask: SubtaskCompletion,
}

impl CompleteOutcome {
    pub fn render(&self) -> String {
        let mut out = format!("## Session Complete\n\nSession {} COMPLETED.", self.session_id);
        if let Some(text) = self.subtask.render() {
            out.push_str("\n\n");
            out.push_str(&text);
        }
        out
    }

    pub fn exit_code(&self) -> i32 {
        self.subtask.exit_code()
    }
}

/// LEARN -> COMPLETED, then notify a decomposed parent.
///
/// Rerunning it on a COMPLETED subtask repeats only the parent fan-in.
pub fn complete_session(
    paths: &OrchestratorPaths,
    config: &OrchestratorConfig,
    session_id: &str,
) -> Result<CompleteOutcome> {
    let mut state = load_session(paths, session_id)?;
    if state.is_completed() && state.is_subtask() {
        info!(session_id, "subtask already completed; repeating parent fan-in");
    } else {
        state.mark_completed(Utc::now())?;
        save_session(paths, &state, "LEARN -> COMPLETED")?;
        info!(session_id, "session completed");
    }
    let subtask = on_subtask_complete(paths, config, &state)?;
    Ok(CompleteOutcome {
        session_id: session_id.to_string(),
        subtask,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::domain::TaskDomain;
    use crate::core::types::Complexity;
    use crate::io::chain_store::load_chain;
    use crate::test_support::TestWorkspace;
    use serde_json::json;

    const ID: &str = "abc123def456";

    #[test]
    fn gather_starts_its_flow_after_saving() {
        let ws = TestWorkspace::new();
        ws.session(ID, "Build API", Complexity::Simple);
        let outcome =
            enter_phase(&ws.paths, &ws.config(), ID, AlgorithmPhase::Gather, None, true)
                .expect("gather");
        assert!(outcome.render().starts_with("## Phase: GATHER\n\nSession: abc123def456"));
        assert!(outcome.body.contains("- **subagent_type:** `research-agent`"));
        assert_eq!(
            load_session(&ws.paths, ID).expect("load").current_phase,
            AlgorithmPhase::Gather
        );
        let chain = load_chain(&ws.paths, ID).expect("load").expect("chain");
        assert_eq!(chain.flow_id, flow_defs::GATHER_FLOW);
        assert_eq!(chain.phase_id.as_deref(), Some("GATHER"));
    }

    /// GATHER classifies the query and hands the domain to its agents.
    #[test]
    fn gather_classifies_the_task_domain() {
        let ws = TestWorkspace::new();
        ws.session(ID, "Investigate alternatives to our message queue", Complexity::Moderate);
        let outcome =
            enter_phase(&ws.paths, &ws.config(), ID, AlgorithmPhase::Gather, None, true)
                .expect("gather");
        assert!(outcome.body.starts_with("**Domain:** RESEARCH (Information gathering and analysis)"));
        let state = load_session(&ws.paths, ID).expect("load");
        assert_eq!(state.task_domain, Some(TaskDomain::Research));
        assert!(state.domain_confidence.is_some());
        let chain = load_chain(&ws.paths, ID).expect("load").expect("chain");
        assert_eq!(chain.domain, "research");
        assert_eq!(chain.task_description, "Gather current state for research task");

        let interview =
            enter_phase(&ws.paths, &ws.config(), ID, AlgorithmPhase::Interview, None, true)
                .expect("interview");
        assert!(!interview.body.contains("**Domain:**"));
        let chain = load_chain(&ws.paths, ID).expect("load").expect("chain");
        assert_eq!(chain.domain, "research");
    }

    /// Output is stored against the phase being left, and static content is substituted.
    #[test]
    fn static_phase_records_output_and_substitutes() {
        let ws = TestWorkspace::new();
        ws.session(ID, "Build API", Complexity::Simple);
        ws.write_content("phases/gather.md", "Gather for {user_query} ({session_id}).");
        let outcome = enter_phase(
            &ws.paths,
            &ws.config(),
            ID,
            AlgorithmPhase::Gather,
            Some(json!({"note": "init"})),
            false,
        )
        .expect("gather");
        assert!(outcome.body.contains("Gather for Build API (abc123def456)."));
        assert!(outcome.body.contains("orchestrator phase interview --state abc123def456"));
        let state = load_session(&ws.paths, ID).expect("load");
        assert_eq!(
            state.phase_outputs[&AlgorithmPhase::Initialized],
            json!({"note": "init"})
        );
    }

    #[test]
    fn illegal_phase_jump_is_rejected_and_state_kept() {
        let ws = TestWorkspace::new();
        let saved = ws.session(ID, "Build API", Complexity::Simple);
        let err = enter_phase(&ws.paths, &ws.config(), ID, AlgorithmPhase::Build, None, false)
            .expect_err("illegal");
        assert!(err.to_string().contains("illegal algorithm transition INITIALIZED -> BUILD"));
        assert_eq!(load_session(&ws.paths, ID).expect("load"), saved);
    }

    #[test]
    fn complete_requires_learn() {
        let ws = TestWorkspace::new();
        ws.session(ID, "Build API", Complexity::Simple);
        assert!(complete_session(&ws.paths, &ws.config(), ID).is_err());

        let mut state = load_session(&ws.paths, ID).expect("load");
        for phase in [
            AlgorithmPhase::Gather,
            AlgorithmPhase::Interview,
            AlgorithmPhase::Observe,
            AlgorithmPhase::Think,
            AlgorithmPhase::Plan,
            AlgorithmPhase::Build,
            AlgorithmPhase::Execute,
            AlgorithmPhase::Verify,
            AlgorithmPhase::Learn,
        ] {
            state.start_phase(phase, Utc::now()).expect("advance");
        }
        save_session(&ws.paths, &state, "test").expect("save");
        let outcome = complete_session(&ws.paths, &ws.config(), ID).expect("complete");
        assert_eq!(outcome.subtask, SubtaskCompletion::NotSubtask);
        assert_eq!(outcome.render(), "## Session Complete\n\nSession abc123def456 COMPLETED.");
        assert!(
            enter_phase(&ws.paths, &ws.config(), ID, AlgorithmPhase::Gather, None, false).is_err()
        );
        assert!(complete_session(&ws.paths, &ws.config(), ID).is_err());
    }

    /// A subtask saved COMPLETED before its parent was updated can be
    /// completed again; only the fan-in runs.
    #[test]
    fn repeated_complete_on_subtask_redoes_fan_in() {
        let ws = TestWorkspace::new();
        let config = ws.config();
        const PARENT: &str = "parent000001";
        const SIBLING: &str = "feedfacecafe";
        let mut parent = ws.session(PARENT, "Build auth system", Complexity::Complex);
        let mut child = ws.session_at(ID, "Add user model", Complexity::Simple, AlgorithmPhase::Learn);
        let mut sibling = ws.session(SIBLING, "Add login endpoint", Complexity::Simple);
        child.parent_task_id = Some(PARENT.to_string());
        sibling.parent_task_id = Some(PARENT.to_string());
        save_session(&ws.paths, &sibling, "test").expect("save");
        parent.register_subtask(ID, Vec::new()).expect("register");
        parent.register_subtask(SIBLING, vec![ID.to_string()]).expect("register");
        parent.mark_subtasks_dispatched(&[ID.to_string()]).expect("dispatch");
        save_session(&ws.paths, &parent, "test").expect("save");
        child.mark_completed(Utc::now()).expect("complete");
        save_session(&ws.paths, &child, "LEARN -> COMPLETED").expect("save");

        let outcome = complete_session(&ws.paths, &config, ID).expect("rerun");
        assert!(matches!(outcome.subtask, SubtaskCompletion::Dispatched { .. }));
        assert!(outcome.render().contains("- **Subtask ID:** feedfacecafe"));
        let parent = load_session(&ws.paths, PARENT).expect("parent");
        assert!(parent.subtasks[0].completed);
        assert!(parent.subtasks[1].dispatched);

        let outcome = complete_session(&ws.paths, &config, ID).expect("third run");
        assert!(matches!(outcome.subtask, SubtaskCompletion::Waiting { .. }));
    }
}
