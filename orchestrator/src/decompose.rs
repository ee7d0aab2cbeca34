//! Decompose protocol handlers: start, GO/NO-GO completion, subtask fan-in.
//!
//! A COMPLEX or VERY_COMPLEX session is split by the `decompose-protocol`
//! agent flow into SIMPLE subtasks. Each subtask gets its own session and runs
//! the full algorithm; the parent tracks which are done and aggregates once
//! the last one finishes.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use crate::core::algorithm::{AlgorithmPhase, AlgorithmState};
use crate::core::chain_state::ChainContext;
use crate::core::decompose::{
    DecomposePhase, DecomposeProgress, DecompositionReview, SubtaskSpec, evaluate_decomposition,
};
use crate::core::flow_defs::{AGGREGATION_FLOW, DECOMPOSE_FLOW};
use crate::core::types::{Complexity, GateVerdict};
use crate::exit_codes;
use crate::flow::{ChainOrchestrator, NeverSkip, SkipAgents, SkipDecider, is_flow_complete, start_flow};
use crate::io::chain_store::{load_chain, resolve_flow};
use crate::io::config::OrchestratorConfig;
use crate::io::init::OrchestratorPaths;
use crate::io::memory::{DOWNSTREAM_SECTION, MemoryFile, extract_json_block, task_memory_files};
use crate::io::prompt::render_gather_subtask;
use crate::io::schema::{SUBTASKS_SCHEMA, parse_validated};
use crate::io::session_store::{load_session, new_session_id, save_session};

pub const AGGREGATION_TASK: &str = "Aggregate subtask results into final deliverable";

const WAITING_MESSAGE: &str =
    "WAITING: No subtasks ready. Waiting for dependent subtasks to complete.";

#[derive(Debug, Clone, Deserialize)]
struct SubtasksPayload {
    subtasks: Vec<SubtaskSpec>,
}

fn header(state: &AlgorithmState) -> String {
    format!(
        "## DECOMPOSE Protocol\n\n- **Complexity:** {}\n- **Session:** {}\n- **Query:** {}",
        state
            .complexity
            .map_or_else(|| "UNKNOWN".to_string(), Complexity::display_upper),
        state.session_id,
        state.user_query.trim()
    )
}

/// `decompose start`: print the header and the decompose flow directive.
pub fn start_decompose(
    paths: &OrchestratorPaths,
    config: &OrchestratorConfig,
    session_id: &str,
    use_flow: bool,
    skip_clarification: bool,
) -> Result<String> {
    let mut state = load_session(paths, session_id)?;
    if state.is_completed() {
        bail!("session {session_id} is COMPLETED; it cannot be decomposed");
    }
    if state.complexity.is_some_and(|c| c < Complexity::Complex) {
        warn!(session_id, "decomposing a task below COMPLEX");
    }
    let progress = state.decompose.get_or_insert_with(DecomposeProgress::default);
    if progress.phase == DecomposePhase::Go {
        bail!("session {session_id} was already decomposed (GO)");
    }
    save_session(paths, &state, "decompose start")?;
    let progress = state.decompose.clone().unwrap_or_default();

    let mut out = header(&state);
    if !use_flow {
        out.push_str(&format!(
            "\n\n**Decompose phase:** {} (attempt {} of {})\n\n\
             Write the subtask list, then run:\n\n\
             ```bash\norchestrator decompose complete --state {session_id} --subtasks <subtasks.json>\n```",
            progress.phase.label(),
            progress.attempts + 1,
            config.decompose_max_attempts
        ));
        return Ok(out);
    }

    let flow = resolve_flow(paths, DECOMPOSE_FLOW)?;
    let context = ChainContext {
        skill_name: Some("decompose".to_string()),
        phase_id: Some(progress.phase.label().to_string()),
        domain: state.domain_label(&config.default_domain).to_string(),
        task_description: state.user_query.clone(),
    };
    let skip = SkipAgents::new(&["clarification"]);
    let decider: &dyn SkipDecider = if skip_clarification { &skip } else { &NeverSkip };
    let next = start_flow(paths, config, flow, session_id, context, decider)?;
    out.push_str("\n\n");
    out.push_str(&next.render());
    Ok(out)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecomposeOutcome {
    Go { text: String },
    Retry { text: String },
    Escalated { text: String },
}

impl DecomposeOutcome {
    pub fn render(&self) -> String {
        match self {
            DecomposeOutcome::Go { text }
            | DecomposeOutcome::Retry { text }
            | DecomposeOutcome::Escalated { text } => text.clone(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            DecomposeOutcome::Escalated { .. } => exit_codes::ESCALATED,
            _ => exit_codes::OK,
        }
    }
}

/// `decompose complete`: judge the proposed subtasks and act on the verdict.
///
/// Without `subtasks_file` the decompose flow must have finished; subtasks are
/// then read from the synthesis agent's memory file.
pub fn complete_decompose(
    paths: &OrchestratorPaths,
    config: &OrchestratorConfig,
    session_id: &str,
    subtasks_file: Option<&Path>,
) -> Result<DecomposeOutcome> {
    let mut parent = load_session(paths, session_id)?;
    let Some(mut progress) = parent.decompose.clone() else {
        bail!("session {session_id} has no decomposition in progress; run `orchestrator decompose start --state {session_id}`");
    };

    let raw = match subtasks_file {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("read subtasks {}", path.display()))?,
        None => {
            if !is_flow_complete(paths, session_id, DECOMPOSE_FLOW)? {
                bail!(
                    "decompose flow for {session_id} is not complete; finish the agent chain before `decompose complete`"
                );
            }
            subtasks_from_memory(paths, session_id)?
        }
    };
    let validation = MemoryFile::new(paths, session_id, "validation");
    let agent_verdict = if validation.exists() {
        validation.verdict()?
    } else {
        None
    };
    let (review, subtasks) = match parse_validated::<SubtasksPayload>(SUBTASKS_SCHEMA, &raw, "subtasks") {
        Ok(payload) => (evaluate_decomposition(&payload.subtasks, agent_verdict), payload.subtasks),
        Err(err) => (
            DecompositionReview {
                verdict: GateVerdict::NoGo,
                agent_verdict,
                findings: vec![format!("{err:#}")],
            },
            Vec::new(),
        ),
    };

    progress.advance_through(DecomposePhase::Validation)?;
    let verdict_phase = if review.is_go() {
        DecomposePhase::Go
    } else {
        DecomposePhase::NoGo
    };
    progress.advance_to(verdict_phase)?;
    info!(
        session_id,
        verdict = review.verdict.as_str(),
        attempts = progress.attempts,
        "decomposition reviewed"
    );

    if review.is_go() {
        parent.decompose = Some(progress);
        return complete_go(paths, config, parent, &subtasks);
    }

    let findings = bullet_list(&review.remediation());
    if progress.attempts >= config.decompose_max_attempts {
        parent.decompose = Some(progress.clone());
        save_session(paths, &parent, "decompose NO-GO escalated")?;
        warn!(session_id, attempts = progress.attempts, "decompose retries exhausted");
        return Ok(DecomposeOutcome::Escalated {
            text: format!(
                "## DECOMPOSE: NO-GO (escalated)\n\nAttempts: {}/{}\n\nFindings:\n{findings}\n\n\
                 User review required before this task can continue.",
                progress.attempts, config.decompose_max_attempts
            ),
        });
    }

    progress.advance_to(DecomposePhase::Synthesis)?;
    let attempt = progress.attempts;
    parent.decompose = Some(progress);
    save_session(paths, &parent, "decompose NO-GO")?;

    let mut text = format!(
        "## DECOMPOSE: NO-GO (attempt {attempt} of {})\n\nRemediation:\n{findings}",
        config.decompose_max_attempts
    );
    let note = format!("### Remediation Required\n\n{findings}");
    if load_chain(paths, session_id)?.is_some_and(|chain| chain.flow_id == DECOMPOSE_FLOW) {
        let mut chain = ChainOrchestrator::load(paths, config, session_id)?;
        let directive = chain.rewind_to("synthesis", &note)?;
        text.push_str("\n\n");
        text.push_str(&directive.text);
    } else {
        text.push_str(&format!(
            "\n\nRevise the subtasks, then run:\n\n```bash\n\
             orchestrator decompose complete --state {session_id} --subtasks <subtasks.json>\n```"
        ));
    }
    Ok(DecomposeOutcome::Retry { text })
}

fn subtasks_from_memory(paths: &OrchestratorPaths, session_id: &str) -> Result<String> {
    let synthesis = MemoryFile::new(paths, session_id, "synthesis");
    if !synthesis.exists() {
        bail!(
            "memory file required but not found: {}",
            synthesis.path.display()
        );
    }
    if let Some(block) = synthesis.json_block(DOWNSTREAM_SECTION)? {
        return Ok(block);
    }
    extract_json_block(&synthesis.read()?).with_context(|| {
        format!(
            "no ```json subtask block in {}",
            synthesis.path.display()
        )
    })
}

fn bullet_list(items: &[String]) -> String {
    items
        .iter()
        .map(|item| format!("- {item}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Create one session per subtask, register them on the parent, and dispatch
/// every subtask whose dependencies are already satisfied.
fn complete_go(
    paths: &OrchestratorPaths,
    config: &OrchestratorConfig,
    mut parent: AlgorithmState,
    subtasks: &[SubtaskSpec],
) -> Result<DecomposeOutcome> {
    let now = Utc::now();
    let ids: BTreeMap<&str, String> = subtasks
        .iter()
        .map(|spec| (spec.subtask_id.as_str(), new_session_id()))
        .collect();

    let mut rows = Vec::with_capacity(subtasks.len());
    for (index, spec) in subtasks.iter().enumerate() {
        let session_id = ids[spec.subtask_id.as_str()].clone();
        let dependencies: Vec<String> = spec
            .dependencies
            .iter()
            .filter_map(|dep| ids.get(dep.as_str()).cloned())
            .collect();
        let mut child =
            AlgorithmState::new(&session_id, &spec.description, Some(Complexity::Simple), now);
        child.parent_task_id = Some(parent.session_id.clone());
        child.subtask_index = Some(index);
        child.dependencies = dependencies.clone();
        child.max_verify_iterations = config.max_verify_iterations;
        child.record_phase_output(
            AlgorithmPhase::Initialized,
            json!({
                "subtask_id": spec.subtask_id,
                "verification_criteria": spec.verification_criteria,
                "context": spec.context,
            }),
            now,
        )?;
        save_session(paths, &child, &format!("subtask {} created", spec.subtask_id))?;
        parent.register_subtask(&session_id, dependencies)?;
        rows.push(format!(
            "| {} | {} | {} |",
            spec.subtask_id,
            session_id,
            if spec.dependencies.is_empty() {
                "-".to_string()
            } else {
                spec.dependencies.join(", ")
            }
        ));
    }
    save_session(paths, &parent, "decompose GO")?;
    info!(session_id = %parent.session_id, subtasks = subtasks.len(), "subtasks registered");

    let dispatches = dispatch_ready(paths, &mut parent)?.unwrap_or_default();
    Ok(DecomposeOutcome::Go {
        text: format!(
            "## DECOMPOSE: GO\n\n{} subtasks created for session {}.\n\n\
             | Subtask | Session | Depends on |\n|---|---|---|\n{}\n\n{}",
            subtasks.len(),
            parent.session_id,
            rows.join("\n"),
            dispatches
        ),
    })
}

/// Route every ready subtask not yet handed out, then record the hand-out.
///
/// `None` when nothing new is ready.
fn dispatch_ready(paths: &OrchestratorPaths, parent: &mut AlgorithmState) -> Result<Option<String>> {
    let ready = parent.undispatched_subtasks();
    if ready.is_empty() {
        return Ok(None);
    }
    let text = dispatch_subtasks(paths, &parent.session_id, &ready)?;
    parent.mark_subtasks_dispatched(&ready)?;
    save_session(
        paths,
        parent,
        &format!("dispatched {} subtask(s)", ready.len()),
    )?;
    Ok(Some(text))
}

/// Planner id of a subtask session, falling back to its session id.
fn subtask_id_of(child: &AlgorithmState) -> String {
    child
        .phase_outputs
        .get(&AlgorithmPhase::Initialized)
        .and_then(|v| v.get("subtask_id"))
        .and_then(|v| v.as_str())
        .unwrap_or(child.session_id.as_str())
        .to_string()
}

fn dispatch_subtasks(
    paths: &OrchestratorPaths,
    parent_id: &str,
    session_ids: &[String],
) -> Result<String> {
    let mut parts = Vec::with_capacity(session_ids.len());
    for session_id in session_ids {
        let child = load_session(paths, session_id)?;
        let subtask_id = subtask_id_of(&child);
        info!(parent_id, session_id = %session_id, "dispatching subtask");
        parts.push(render_gather_subtask(
            &subtask_id,
            session_id,
            parent_id,
            &child.user_query,
            &format!("orchestrator phase gather --state {session_id}"),
        )?);
    }
    Ok(parts.join("\n\n---\n\n"))
}

/// What a finished subtask triggered on its parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubtaskCompletion {
    NotSubtask,
    Aggregation { parent_id: String, text: String },
    Dispatched { parent_id: String, text: String },
    Waiting { parent_id: String },
}

impl SubtaskCompletion {
    pub fn render(&self) -> Option<String> {
        match self {
            SubtaskCompletion::NotSubtask => None,
            SubtaskCompletion::Aggregation { parent_id, text } => Some(format!(
                "## All Subtasks Complete\n\nParent: {parent_id}\n\n{text}"
            )),
            SubtaskCompletion::Dispatched { text, .. } => Some(text.clone()),
            SubtaskCompletion::Waiting { .. } => Some(WAITING_MESSAGE.to_string()),
        }
    }

    pub fn exit_code(&self) -> i32 {
        exit_codes::OK
    }
}

/// Fan-in for a completed subtask session.
///
/// Safe to repeat: the parent is re-marked, undispatched ready subtasks are
/// routed, and a running aggregation flow is redelivered.
pub fn on_subtask_complete(
    paths: &OrchestratorPaths,
    config: &OrchestratorConfig,
    state: &AlgorithmState,
) -> Result<SubtaskCompletion> {
    let Some(parent_id) = state.parent_task_id.as_deref() else {
        return Ok(SubtaskCompletion::NotSubtask);
    };
    let mut parent = load_session(paths, parent_id)
        .with_context(|| format!("load parent of subtask {}", state.session_id))?;
    if !parent.mark_subtask_complete(&state.session_id)? {
        bail!(
            "subtask {} is not registered on parent {parent_id}",
            state.session_id
        );
    }
    save_session(
        paths,
        &parent,
        &format!("subtask {} complete", state.session_id),
    )?;

    if parent.all_subtasks_complete() {
        info!(parent_id, "all subtasks complete; aggregating");
        let text = trigger_aggregation(paths, config, &parent)?;
        return Ok(SubtaskCompletion::Aggregation {
            parent_id: parent_id.to_string(),
            text,
        });
    }

    Ok(match dispatch_ready(paths, &mut parent)? {
        Some(text) => SubtaskCompletion::Dispatched {
            parent_id: parent_id.to_string(),
            text,
        },
        None => SubtaskCompletion::Waiting {
            parent_id: parent_id.to_string(),
        },
    })
}

/// Start the aggregation flow on the parent session, or redeliver it.
pub fn trigger_aggregation(
    paths: &OrchestratorPaths,
    config: &OrchestratorConfig,
    parent: &AlgorithmState,
) -> Result<String> {
    if is_flow_complete(paths, &parent.session_id, AGGREGATION_FLOW)? {
        return Ok(format!(
            "Aggregation for {} is already complete; continue the parent session.",
            parent.session_id
        ));
    }
    let flow = resolve_flow(paths, AGGREGATION_FLOW)?;
    let context = ChainContext {
        skill_name: Some("decompose".to_string()),
        phase_id: Some("aggregation".to_string()),
        domain: parent.domain_label(&config.default_domain).to_string(),
        task_description: AGGREGATION_TASK.to_string(),
    };
    let note = subtask_results_note(paths, parent)?;
    let next = ChainOrchestrator::open(paths, config, flow, &parent.session_id, context)?
        .start_flow_with_note(Some(&note))?;
    Ok(next.render())
}

/// Session id and memory files of every subtask, for the aggregating agent.
fn subtask_results_note(paths: &OrchestratorPaths, parent: &AlgorithmState) -> Result<String> {
    let mut out = String::from(
        "### Subtask Results\n\nRead each subtask's memory files before merging its results.\n",
    );
    for entry in &parent.subtasks {
        let child = load_session(paths, &entry.session_id)?;
        out.push_str(&format!(
            "\n- **{}** (session `{}`)\n",
            subtask_id_of(&child),
            entry.session_id
        ));
        let files = task_memory_files(paths, &entry.session_id)?;
        if files.is_empty() {
            out.push_str("  - no memory files found\n");
        }
        for file in files {
            out.push_str(&format!("  - `{}`\n", file.display()));
        }
    }
    Ok(out)
}

/// Where one registered subtask stands.
fn subtask_status(parent: &AlgorithmState, index: usize) -> &'static str {
    let entry = &parent.subtasks[index];
    if entry.completed {
        "COMPLETED"
    } else if entry.dispatched {
        "DISPATCHED"
    } else if parent.ready_subtasks().contains(&entry.session_id) {
        "READY"
    } else {
        "BLOCKED"
    }
}

/// `decompose status`: rebuild the parent's fan-in from its child sessions
/// and redeliver whatever it is waiting on.
///
/// Children that reached COMPLETED without the parent noticing are marked
/// complete. Ready subtasks never routed are routed now; once every subtask is
/// done the aggregation directive is printed again.
pub fn decompose_status(
    paths: &OrchestratorPaths,
    config: &OrchestratorConfig,
    parent_id: &str,
) -> Result<String> {
    let mut parent = load_session(paths, parent_id)?;
    if parent.subtasks.is_empty() {
        bail!("session {parent_id} has no registered subtasks; run `orchestrator decompose complete --state {parent_id}` first");
    }
    let pending: Vec<String> = parent
        .subtasks
        .iter()
        .filter(|entry| !entry.completed)
        .map(|entry| entry.session_id.clone())
        .collect();
    let mut reconciled = Vec::new();
    for session_id in pending {
        if load_session(paths, &session_id)?.is_completed() {
            parent.mark_subtask_complete(&session_id)?;
            reconciled.push(session_id);
        }
    }
    if !reconciled.is_empty() {
        warn!(parent_id, count = reconciled.len(), "recovered unrecorded subtask completions");
        save_session(paths, &parent, "subtask completions reconciled")?;
    }

    let mut rows = Vec::with_capacity(parent.subtasks.len());
    for (index, entry) in parent.subtasks.iter().enumerate() {
        let child = load_session(paths, &entry.session_id)?;
        rows.push(format!(
            "| {} | {} | {} | {} |",
            subtask_id_of(&child),
            entry.session_id,
            child.current_phase.label(),
            subtask_status(&parent, index)
        ));
    }
    let done = parent.subtasks.iter().filter(|entry| entry.completed).count();
    let mut out = format!(
        "## DECOMPOSE Status\n\n- **Parent:** {parent_id}\n- **Progress:** {done}/{} subtasks complete\n\n\
         | Subtask | Session | Phase | Status |\n|---|---|---|---|\n{}",
        parent.subtasks.len(),
        rows.join("\n")
    );

    let action = if parent.all_subtasks_complete() {
        let text = trigger_aggregation(paths, config, &parent)?;
        format!("## All Subtasks Complete\n\nParent: {parent_id}\n\n{text}")
    } else {
        match dispatch_ready(paths, &mut parent)? {
            Some(text) => text,
            None => WAITING_MESSAGE.to_string(),
        }
    };
    out.push_str("\n\n");
    out.push_str(&action);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{TestWorkspace, memory_body};

    const PARENT: &str = "parent000001";

    const TWO_SUBTASKS: &str = r#"{"subtasks": [
        {"subtask_id": "ST-001", "description": "Add user model", "complexity": "simple",
         "verification_criteria": ["model tests pass"]},
        {"subtask_id": "ST-002", "description": "Add login endpoint", "complexity": "simple",
         "dependencies": ["ST-001"], "verification_criteria": ["endpoint tests pass"]}
    ]}"#;

    const CYCLE: &str = r#"{"subtasks": [
        {"subtask_id": "ST-001", "description": "A", "complexity": "simple",
         "dependencies": ["ST-002"], "verification_criteria": ["a"]},
        {"subtask_id": "ST-002", "description": "B", "complexity": "simple",
         "dependencies": ["ST-001"], "verification_criteria": ["b"]}
    ]}"#;

    fn started(ws: &TestWorkspace) {
        ws.session(PARENT, "Build auth system", Complexity::Complex);
        start_decompose(&ws.paths, &ws.config(), PARENT, false, false).expect("start");
    }

    fn finish_learn(ws: &TestWorkspace, session_id: &str) -> AlgorithmState {
        let mut state = load_session(&ws.paths, session_id).expect("child");
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
            AlgorithmPhase::Completed,
        ] {
            state.start_phase(phase, Utc::now()).expect("advance");
        }
        save_session(&ws.paths, &state, "test").expect("save");
        state
    }

    #[test]
    fn start_prints_header_and_first_agent() {
        let ws = TestWorkspace::new();
        ws.session(PARENT, "Rewrite core architecture", Complexity::VeryComplex);
        let text = start_decompose(&ws.paths, &ws.config(), PARENT, true, false).expect("start");
        assert!(text.starts_with("## DECOMPOSE Protocol\n\n- **Complexity:** VERY COMPLEX"));
        assert!(text.contains("`clarification-agent`"));

        let skipped = TestWorkspace::new();
        skipped.session(PARENT, "Rewrite core architecture", Complexity::VeryComplex);
        let text =
            start_decompose(&skipped.paths, &skipped.config(), PARENT, true, true).expect("start");
        assert!(text.contains("`analysis-agent`"));
    }

    /// GO creates a session per subtask and dispatches only those without pending dependencies.
    #[test]
    fn go_registers_and_dispatches_ready_subtasks() {
        let ws = TestWorkspace::new();
        started(&ws);
        let file = ws.write_file("subtasks.json", TWO_SUBTASKS);
        let outcome =
            complete_decompose(&ws.paths, &ws.config(), PARENT, Some(&file)).expect("complete");
        let text = outcome.render();
        assert!(text.starts_with("## DECOMPOSE: GO"));
        assert_eq!(text.matches("## Route Subtask to GATHER").count(), 1);
        assert!(text.contains("- **Subtask ID:** ST-001"));

        let parent = load_session(&ws.paths, PARENT).expect("parent");
        assert_eq!(parent.subtasks.len(), 2);
        assert_eq!(parent.decompose.as_ref().map(|p| p.phase), Some(DecomposePhase::Go));
        let second = &parent.subtasks[1];
        assert_eq!(second.dependencies, vec![parent.subtasks[0].session_id.clone()]);
        let child = load_session(&ws.paths, &second.session_id).expect("child");
        assert_eq!(child.parent_task_id.as_deref(), Some(PARENT));
        assert_eq!(child.complexity, Some(Complexity::Simple));
    }

    #[test]
    fn cycle_is_no_go_then_escalates() {
        let ws = TestWorkspace::new();
        started(&ws);
        let file = ws.write_file("subtasks.json", CYCLE);
        let config = ws.config();
        for attempt in 1..config.decompose_max_attempts {
            let outcome =
                complete_decompose(&ws.paths, &config, PARENT, Some(&file)).expect("review");
            let text = outcome.render();
            assert!(
                text.starts_with(&format!("## DECOMPOSE: NO-GO (attempt {attempt} of 3)")),
                "{text}"
            );
            assert!(text.contains("dependency cycle"));
            assert_eq!(outcome.exit_code(), exit_codes::OK);
        }
        let outcome = complete_decompose(&ws.paths, &config, PARENT, Some(&file)).expect("review");
        assert_eq!(outcome.exit_code(), exit_codes::ESCALATED);
        let parent = load_session(&ws.paths, PARENT).expect("parent");
        assert!(parent.subtasks.is_empty());
        assert_eq!(parent.decompose.map(|p| p.attempts), Some(3));
    }

    #[test]
    fn complete_without_file_requires_finished_flow() {
        let ws = TestWorkspace::new();
        ws.session(PARENT, "Build auth system", Complexity::Complex);
        start_decompose(&ws.paths, &ws.config(), PARENT, true, true).expect("start");
        let err = complete_decompose(&ws.paths, &ws.config(), PARENT, None).expect_err("gate");
        assert!(err.to_string().contains("decompose flow for parent000001 is not complete"));
    }

    /// A validation NO-GO rewinds the chain to synthesis with remediation appended.
    #[test]
    fn agent_no_go_rewinds_to_synthesis() {
        let ws = TestWorkspace::new();
        let config = ws.config();
        ws.session(PARENT, "Build auth system", Complexity::Complex);
        start_decompose(&ws.paths, &config, PARENT, true, true).expect("start");
        ws.write_memory(PARENT, "analysis", &memory_body("analysis", "split by layer"));
        let mut chain = ChainOrchestrator::load(&ws.paths, &config, PARENT).expect("chain");
        chain.get_next_directive("analysis").expect("analysis");
        ws.write_memory(
            PARENT,
            "synthesis",
            &memory_body("synthesis", &format!("```json\n{TWO_SUBTASKS}\n```")),
        );
        chain.get_next_directive("synthesis").expect("synthesis");
        ws.write_memory(PARENT, "validation", "**Verdict:** NO-GO\n");
        chain.get_next_directive("validation").expect("validation");

        let outcome = complete_decompose(&ws.paths, &config, PARENT, None).expect("review");
        let text = outcome.render();
        assert!(text.starts_with("## DECOMPOSE: NO-GO (attempt 1 of 3)"));
        assert!(text.contains("`synthesis-agent`"));
        assert!(text.contains("Validation agent returned NO-GO"));
        let chain = load_chain(&ws.paths, PARENT).expect("load").expect("chain");
        assert_eq!(chain.completed_agents, vec!["analysis"]);

        let mut chain = ChainOrchestrator::load(&ws.paths, &config, PARENT).expect("chain");
        let err = chain.get_next_directive("synthesis").expect_err("rejected subtasks");
        assert!(err.to_string().contains("was not rewritten since synthesis was dispatched"));
        ws.write_memory(
            PARENT,
            "synthesis",
            &memory_body("synthesis", &format!("revised\n```json\n{TWO_SUBTASKS}\n```")),
        );
        chain.get_next_directive("synthesis").expect("revised synthesis");
        assert!(chain.get_next_directive("validation").is_err());
    }

    #[test]
    fn subtask_fan_in_dispatches_then_aggregates() {
        let ws = TestWorkspace::new();
        started(&ws);
        let file = ws.write_file("subtasks.json", TWO_SUBTASKS);
        complete_decompose(&ws.paths, &ws.config(), PARENT, Some(&file)).expect("go");
        let parent = load_session(&ws.paths, PARENT).expect("parent");
        let first = parent.subtasks[0].session_id.clone();
        let second = parent.subtasks[1].session_id.clone();

        let done = finish_learn(&ws, &first);
        let outcome = on_subtask_complete(&ws.paths, &ws.config(), &done).expect("fan-in");
        let text = outcome.render().expect("text");
        assert!(text.contains("- **Subtask ID:** ST-002"));

        let done = finish_learn(&ws, &second);
        let outcome = on_subtask_complete(&ws.paths, &ws.config(), &done).expect("fan-in");
        let SubtaskCompletion::Aggregation { text, .. } = outcome else {
            panic!("expected aggregation");
        };
        assert!(text.contains(AGGREGATION_TASK));
        let chain = load_chain(&ws.paths, PARENT).expect("load").expect("chain");
        assert_eq!(chain.flow_id, AGGREGATION_FLOW);
    }

    /// The aggregation directive names every subtask session and its memory files.
    #[test]
    fn aggregation_lists_subtask_sessions_and_memory_files() {
        let ws = TestWorkspace::new();
        let config = ws.config();
        started(&ws);
        let file = ws.write_file("subtasks.json", TWO_SUBTASKS);
        complete_decompose(&ws.paths, &config, PARENT, Some(&file)).expect("go");
        let parent = load_session(&ws.paths, PARENT).expect("parent");
        let first = parent.subtasks[0].session_id.clone();
        let second = parent.subtasks[1].session_id.clone();
        let research = ws.write_memory(&first, "research", "user table exists");
        let validation = ws.write_memory(&first, "validation", "**Verdict:** PASS\n");

        on_subtask_complete(&ws.paths, &config, &finish_learn(&ws, &first)).expect("first");
        ws.write_memory(PARENT, "synthesis", "stale decomposition");
        let text = on_subtask_complete(&ws.paths, &config, &finish_learn(&ws, &second))
            .expect("second")
            .render()
            .expect("text");
        assert!(text.contains("### Subtask Results"));
        assert!(text.contains(&format!("- **ST-001** (session `{first}`)")));
        assert!(text.contains(&format!("- **ST-002** (session `{second}`)\n  - no memory files found")));
        assert!(text.contains(&format!("`{}`", research.display())));
        assert!(text.contains(&format!("`{}`", validation.display())));

        // The decomposition's synthesis file cannot stand in for the aggregate.
        let mut chain = ChainOrchestrator::load(&ws.paths, &config, PARENT).expect("chain");
        let err = chain.get_next_directive("synthesis").expect_err("stale");
        assert!(err.to_string().contains("was not rewritten"));
        let redelivered = chain.resume().expect("resume").render();
        assert!(redelivered.contains(&format!("(session `{second}`)")));
        ws.write_memory(PARENT, "synthesis", "merged deliverable for both subtasks");
        chain.get_next_directive("synthesis").expect("aggregated");
    }

    /// Completing the same subtask twice routes nothing twice.
    #[test]
    fn repeated_fan_in_is_idempotent() {
        let ws = TestWorkspace::new();
        let config = ws.config();
        started(&ws);
        let file = ws.write_file("subtasks.json", TWO_SUBTASKS);
        complete_decompose(&ws.paths, &config, PARENT, Some(&file)).expect("go");
        let parent = load_session(&ws.paths, PARENT).expect("parent");
        assert!(parent.subtasks[0].dispatched);
        assert!(!parent.subtasks[1].dispatched);

        let done = finish_learn(&ws, &parent.subtasks[0].session_id);
        let first = on_subtask_complete(&ws.paths, &config, &done).expect("fan-in");
        assert!(matches!(first, SubtaskCompletion::Dispatched { .. }));
        let again = on_subtask_complete(&ws.paths, &config, &done).expect("repeat");
        assert!(matches!(again, SubtaskCompletion::Waiting { .. }));
        let parent = load_session(&ws.paths, PARENT).expect("parent");
        assert!(parent.subtasks.iter().all(|entry| entry.dispatched));
    }

    /// A child saved COMPLETED whose parent never heard about it is picked up
    /// by `decompose status`, which then routes the unblocked subtask.
    #[test]
    fn status_recovers_lost_fan_in() {
        let ws = TestWorkspace::new();
        let config = ws.config();
        started(&ws);
        let file = ws.write_file("subtasks.json", TWO_SUBTASKS);
        complete_decompose(&ws.paths, &config, PARENT, Some(&file)).expect("go");
        let parent = load_session(&ws.paths, PARENT).expect("parent");
        let first = parent.subtasks[0].session_id.clone();
        let second = parent.subtasks[1].session_id.clone();
        finish_learn(&ws, &first);

        let text = decompose_status(&ws.paths, &config, PARENT).expect("status");
        assert!(text.starts_with("## DECOMPOSE Status"));
        assert!(text.contains("- **Progress:** 1/2 subtasks complete"));
        assert!(text.contains(&format!("| ST-001 | {first} | COMPLETED | COMPLETED |")));
        assert!(text.contains(&format!("| ST-002 | {second} | INITIALIZED | READY |")));
        assert!(text.contains("- **Subtask ID:** ST-002"));

        let text = decompose_status(&ws.paths, &config, PARENT).expect("status again");
        assert!(text.contains(&format!("| ST-002 | {second} | INITIALIZED | DISPATCHED |")));
        assert!(text.ends_with(WAITING_MESSAGE));

        finish_learn(&ws, &second);
        let text = decompose_status(&ws.paths, &config, PARENT).expect("status done");
        assert!(text.contains("## All Subtasks Complete"));
        assert!(text.contains(AGGREGATION_TASK));
        let again = decompose_status(&ws.paths, &config, PARENT).expect("redeliver");
        assert!(again.contains(AGGREGATION_TASK));
        assert_eq!(
            load_chain(&ws.paths, PARENT).expect("load").expect("chain").flow_id,
            AGGREGATION_FLOW
        );
    }

    #[test]
    fn status_needs_registered_subtasks() {
        let ws = TestWorkspace::new();
        started(&ws);
        let err = decompose_status(&ws.paths, &ws.config(), PARENT).expect_err("no subtasks");
        assert!(err.to_string().contains("has no registered subtasks"));
    }

    #[test]
    fn waiting_when_nothing_new_is_ready() {
        let ws = TestWorkspace::new();
        started(&ws);
        let file = ws.write_file(
            "subtasks.json",
            r#"{"subtasks": [
                {"subtask_id": "ST-001", "description": "A", "complexity": "simple",
                 "verification_criteria": ["a"]},
                {"subtask_id": "ST-002", "description": "B", "complexity": "simple",
                 "verification_criteria": ["b"]},
                {"subtask_id": "ST-003", "description": "C", "complexity": "simple",
                 "dependencies": ["ST-001", "ST-002"], "verification_criteria": ["c"]}
            ]}"#,
        );
        complete_decompose(&ws.paths, &ws.config(), PARENT, Some(&file)).expect("go");
        let parent = load_session(&ws.paths, PARENT).expect("parent");
        let done = finish_learn(&ws, &parent.subtasks[0].session_id);
        let outcome = on_subtask_complete(&ws.paths, &ws.config(), &done).expect("fan-in");
        assert_eq!(
            outcome.render().as_deref(),
            Some("WAITING: No subtasks ready. Waiting for dependent subtasks to complete.")
        );
    }
}
