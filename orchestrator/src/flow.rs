//! Chain orchestration: drives one task through an agent flow.
//!
//! A [`ChainOrchestrator`] pairs an immutable [`AgentFlow`] with the persisted
//! [`ChainState`] of one task. Each call hands out exactly one directive, and
//! the chain state is saved before the directive is returned, so the printed
//! output never runs ahead of what is on disk.

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::core::agents;
use crate::core::chain_state::{ChainContext, ChainState, MemoryBaseline};
use crate::core::flow::{AgentFlow, ContextPattern, FlowStep};
use crate::core::questions::{Question, render_questions};
use crate::exit_codes;
use crate::io::chain_store::{archive_chain, load_chain, resolve_flow, save_chain};
use crate::io::config::OrchestratorConfig;
use crate::io::content::{load_content, substitute};
use crate::io::init::OrchestratorPaths;
use crate::io::memory::{MemoryFile, NO_PREDECESSOR_CONTEXT, load_predecessor_context};
use crate::io::prompt::{
    InvocationInputs, TaskToolInputs, render_invocation, render_task_tool,
};

/// Decides whether a conditional step runs for this chain.
pub trait SkipDecider {
    fn should_skip(&self, chain: &ChainState, step: &FlowStep) -> bool;

    /// Agents to record on the chain so later invocations skip them too.
    fn persisted_agents(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Runs every conditional step.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverSkip;

impl SkipDecider for NeverSkip {
    fn should_skip(&self, _chain: &ChainState, _step: &FlowStep) -> bool {
        false
    }
}

/// Skips conditional steps whose agent is listed.
#[derive(Debug, Clone, Default)]
pub struct SkipAgents(pub Vec<String>);

impl SkipAgents {
    pub fn new<S: AsRef<str>>(agents: &[S]) -> Self {
        Self(
            agents
                .iter()
                .map(|a| agents::canonical_name(a.as_ref()).to_string())
                .collect(),
        )
    }
}

impl SkipDecider for SkipAgents {
    fn should_skip(&self, _chain: &ChainState, step: &FlowStep) -> bool {
        self.0.iter().any(|agent| agent == &step.agent_name)
    }

    fn persisted_agents(&self) -> Vec<String> {
        self.0.clone()
    }
}

/// One rendered Task-tool directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    pub agent: String,
    pub text: String,
}

/// What follows a completed agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextDirective {
    Agent(Directive),
    FlowComplete {
        flow_id: String,
        skill_name: Option<String>,
    },
    ClarificationRequired {
        task_id: String,
        agent: String,
        questions: Vec<Question>,
    },
}

impl NextDirective {
    pub fn render(&self) -> String {
        match self {
            NextDirective::Agent(directive) => directive.text.clone(),
            NextDirective::FlowComplete {
                flow_id,
                skill_name,
            } => {
                let mut out =
                    format!("**FLOW_COMPLETE: {flow_id}**\n\nAll agents in flow have completed.");
                if let Some(skill) = skill_name {
                    out.push_str(&format!("\nReady for {skill} phase advancement."));
                }
                out
            }
            NextDirective::ClarificationRequired {
                task_id,
                agent,
                questions,
            } => format!(
                "## HALTED: Clarification Required\n\n\
                 Agent `{agent}` needs answers before the flow can continue.\n\n\
                 {}\n\
                 Ask the user these questions, record the answers, then run:\n\n\
                 ```bash\norchestrator flow resume --state {task_id}\n```",
                render_questions(questions)
            ),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            NextDirective::ClarificationRequired { .. } => exit_codes::HALTED,
            _ => exit_codes::OK,
        }
    }
}

/// Liveness of a persisted chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowStatus {
    Running { agent: String, elapsed_secs: i64 },
    Stale { agent: String, elapsed_secs: i64 },
    Halted { agent: String },
    Complete,
}

impl FlowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStatus::Running { .. } => "RUNNING",
            FlowStatus::Stale { .. } => "STALE",
            FlowStatus::Halted { .. } => "HALTED",
            FlowStatus::Complete => "COMPLETE",
        }
    }
}

/// Sequencer for one task's agent flow.
pub struct ChainOrchestrator<'a> {
    paths: &'a OrchestratorPaths,
    config: &'a OrchestratorConfig,
    flow: AgentFlow,
    state: ChainState,
    skip: &'a dyn SkipDecider,
    /// Opened onto an unfinished chain of the same flow.
    resumed: bool,
}

impl<'a> ChainOrchestrator<'a> {
    /// Chain for `task_id` on `flow`.
    ///
    /// An unfinished chain for the same flow is resumed. A chain for another
    /// flow, or a finished run of this one, is archived and replaced.
    pub fn open(
        paths: &'a OrchestratorPaths,
        config: &'a OrchestratorConfig,
        flow: AgentFlow,
        task_id: &str,
        context: ChainContext,
    ) -> Result<Self> {
        let errors = flow.validate();
        if !errors.is_empty() {
            bail!("invalid flow {}: {}", flow.flow_id, errors.join("; "));
        }
        let existing = load_chain(paths, task_id)?;
        let (state, resumed) = match existing {
            Some(state)
                if state.flow_id == flow.flow_id && !state.is_complete(flow.steps.len()) =>
            {
                debug!(task_id, flow_id = %flow.flow_id, "resuming existing chain");
                (state, true)
            }
            Some(state) => {
                archive_chain(paths, &state)?;
                let fresh = ChainState::new(task_id, flow.flow_id.clone(), context, Utc::now());
                (fresh, false)
            }
            None => {
                let fresh = ChainState::new(task_id, flow.flow_id.clone(), context, Utc::now());
                (fresh, false)
            }
        };
        Ok(Self {
            paths,
            config,
            flow,
            state,
            skip: &NeverSkip,
            resumed,
        })
    }

    /// Persisted chain for `task_id`, with its flow resolved from the registry.
    pub fn load(
        paths: &'a OrchestratorPaths,
        config: &'a OrchestratorConfig,
        task_id: &str,
    ) -> Result<Self> {
        let state = load_chain(paths, task_id)?
            .ok_or_else(|| anyhow!("no chain state for task {task_id}"))?;
        let flow = resolve_flow(paths, &state.flow_id)
            .with_context(|| format!("resolve flow for task {task_id}"))?;
        Ok(Self {
            paths,
            config,
            flow,
            state,
            skip: &NeverSkip,
            resumed: true,
        })
    }

    pub fn with_skip_decider(mut self, skip: &'a dyn SkipDecider) -> Self {
        self.skip = skip;
        self
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn flow(&self) -> &AgentFlow {
        &self.flow
    }

    pub fn current_step(&self) -> Option<&FlowStep> {
        self.flow.steps.get(self.state.current_step_index)
    }

    pub fn is_complete(&self) -> bool {
        self.state.is_complete(self.flow.steps.len())
    }

    /// Directive for the first step that has not run yet.
    pub fn start_flow(&mut self) -> Result<NextDirective> {
        self.start_flow_with_note(None)
    }

    /// [`Self::start_flow`] with `note` appended to the first step's instructions.
    pub fn start_flow_with_note(&mut self, note: Option<&str>) -> Result<NextDirective> {
        info!(
            task_id = %self.state.task_id,
            flow_id = %self.flow.flow_id,
            "starting flow"
        );
        for agent in self.skip.persisted_agents() {
            if !self.state.skip_agents.contains(&agent) {
                self.state.skip_agents.push(agent);
            }
        }
        self.skip_conditional_steps();
        if self.is_complete() {
            save_chain(self.paths, &self.state, "flow complete")?;
            return Ok(self.flow_complete());
        }
        let redeliver = self.resumed;
        self.dispatch(note, redeliver).map(NextDirective::Agent)
    }

    /// Record `completed_agent` and hand out whatever comes next.
    ///
    /// The agent must be the current step and its memory file must have been
    /// written after the step was dispatched. On error nothing is persisted.
    pub fn get_next_directive(&mut self, completed_agent: &str) -> Result<NextDirective> {
        if self.state.halted_for_clarification {
            bail!(
                "chain for task {} is halted for clarification; run `orchestrator flow resume --state {}`",
                self.state.task_id,
                self.state.task_id
            );
        }
        let agent = agents::canonical_name(completed_agent).to_string();
        let Some(step) = self.current_step() else {
            bail!(
                "flow {} for task {} is already complete",
                self.flow.flow_id,
                self.state.task_id
            );
        };
        if step.agent_name != agent {
            bail!(
                "agent {agent} is not the current step of flow {} (expected {})",
                self.flow.flow_id,
                step.agent_name
            );
        }

        let memory = MemoryFile::new(self.paths, &self.state.task_id, &agent);
        if !memory.exists() {
            bail!(
                "memory file required but not found: {} (agent {agent} must write it before the flow continues)",
                memory.path.display()
            );
        }
        let baseline = self
            .state
            .dispatch_baseline
            .as_ref()
            .filter(|baseline| baseline.agent == agent);
        if let Some(baseline) = baseline {
            if !baseline.is_superseded_by(memory.stamp()?) {
                bail!(
                    "memory file {} was not rewritten since {agent} was dispatched; \
                     the agent must write a fresh artifact before the flow continues",
                    memory.path.display()
                );
            }
        }
        let questions = memory.open_questions()?;

        self.state
            .mark_agent_complete(&agent, &memory.path.display().to_string());
        self.state.advance_step();
        self.skip_conditional_steps();
        info!(task_id = %self.state.task_id, agent = %agent, "agent completed");

        if let Some(payload) = questions.filter(|p| p.clarification_required) {
            self.state.halted_for_clarification = true;
            save_chain(self.paths, &self.state, &format!("halted after {agent}"))?;
            warn!(task_id = %self.state.task_id, agent = %agent, "halted for clarification");
            return Ok(NextDirective::ClarificationRequired {
                task_id: self.state.task_id.clone(),
                agent,
                questions: payload.questions,
            });
        }

        save_chain(self.paths, &self.state, &format!("completed {agent}"))?;
        if self.is_complete() {
            info!(task_id = %self.state.task_id, flow_id = %self.flow.flow_id, "flow complete");
            return Ok(self.flow_complete());
        }
        self.dispatch(None, false).map(NextDirective::Agent)
    }

    /// Redeliver the current step and lift a clarification halt.
    pub fn resume(&mut self) -> Result<NextDirective> {
        if self.state.halted_for_clarification {
            info!(task_id = %self.state.task_id, "clearing clarification halt");
            self.state.halted_for_clarification = false;
        }
        if self.is_complete() {
            save_chain(self.paths, &self.state, "resume")?;
            return Ok(self.flow_complete());
        }
        self.dispatch(None, true).map(NextDirective::Agent)
    }

    /// Move the chain back so `agent` runs again, with `note` appended to its
    /// instructions. Agents after it run again too.
    pub fn rewind_to(&mut self, agent: &str, note: &str) -> Result<Directive> {
        let index = self
            .flow
            .step_index(agent)
            .ok_or_else(|| anyhow!("flow {} has no step {agent}", self.flow.flow_id))?;
        let rerun: Vec<String> = self.flow.steps[index..]
            .iter()
            .map(|step| step.agent_name.clone())
            .collect();
        self.state.forget_agents(&rerun);
        self.state.current_step_index = index;
        self.state.halted_for_clarification = false;
        info!(task_id = %self.state.task_id, agent, "rewound chain");
        self.dispatch(Some(note), false)
    }

    /// Liveness of the current step relative to `now`.
    pub fn status(&self, now: DateTime<Utc>) -> FlowStatus {
        let Some(step) = self.current_step() else {
            return FlowStatus::Complete;
        };
        let agent = step.agent_name.clone();
        if self.state.halted_for_clarification {
            return FlowStatus::Halted { agent };
        }
        let elapsed_secs = self
            .state
            .step_dispatched_at
            .map_or(0, |at| (now - at).num_seconds().max(0));
        let timeout = i64::try_from(self.config.agent_timeout_secs).unwrap_or(i64::MAX);
        if elapsed_secs > timeout {
            FlowStatus::Stale {
                agent,
                elapsed_secs,
            }
        } else {
            FlowStatus::Running {
                agent,
                elapsed_secs,
            }
        }
    }

    fn flow_complete(&self) -> NextDirective {
        NextDirective::FlowComplete {
            flow_id: self.flow.flow_id.clone(),
            skill_name: self.state.skill_name.clone(),
        }
    }

    fn skip_conditional_steps(&mut self) {
        while let Some(step) = self.flow.steps.get(self.state.current_step_index) {
            let skipped = self.state.skip_agents.contains(&step.agent_name)
                || self.skip.should_skip(&self.state, step);
            if !step.conditional || !skipped {
                break;
            }
            info!(task_id = %self.state.task_id, agent = %step.agent_name, "skipping conditional step");
            self.state.mark_agent_skipped(&step.agent_name);
            self.state.advance_step();
        }
    }

    /// Persist dispatch bookkeeping, then render the current step.
    fn dispatch(&mut self, note: Option<&str>, redeliver: bool) -> Result<Directive> {
        let step = self
            .current_step()
            .cloned()
            .ok_or_else(|| anyhow!("flow {} has no current step", self.flow.flow_id))?;
        let agent = step.agent_name.clone();
        let needs_learnings = self.state.needs_learnings_directive(&agent);
        let include_learnings =
            needs_learnings || (redeliver && !self.state.is_agent_completed(&agent));
        if needs_learnings {
            self.state.mark_learnings_injected(&agent);
        }
        let same_step = self
            .state
            .dispatch_baseline
            .as_ref()
            .is_some_and(|baseline| baseline.agent == agent);
        // A redelivered step keeps its original baseline.
        if !(redeliver && same_step) {
            let stamp = MemoryFile::new(self.paths, &self.state.task_id, &agent).stamp()?;
            self.state.dispatch_baseline = Some(MemoryBaseline {
                agent: agent.clone(),
                stamp,
            });
            self.state.step_note = note.map(str::to_string);
        }
        let note = self.state.step_note.clone();
        self.state.step_dispatched_at = Some(Utc::now());
        save_chain(self.paths, &self.state, &format!("dispatched {agent}"))?;
        info!(
            task_id = %self.state.task_id,
            flow_id = %self.flow.flow_id,
            agent = %agent,
            learnings = include_learnings,
            "dispatching agent"
        );
        let text = self.render_step(&step, include_learnings, note.as_deref())?;
        Ok(Directive { agent, text })
    }

    fn render_step(
        &self,
        step: &FlowStep,
        include_learnings: bool,
        note: Option<&str>,
    ) -> Result<String> {
        let state = &self.state;
        let agent = step.agent_name.as_str();
        let mut content = match step.content_file.as_deref() {
            Some(relative) => {
                let raw = load_content(self.paths, relative)?;
                substitute(
                    &raw,
                    &[
                        ("task_id", &state.task_id),
                        ("task_description", &state.task_description),
                        ("domain", &state.domain),
                        ("agent", agent),
                        ("flow_id", &self.flow.flow_id),
                    ],
                )
            }
            None => format!("Act as the {agent} agent for this task."),
        };
        if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
            content.push_str("\n\n");
            content.push_str(note.trim());
        }

        let predecessor_context = match step.context_pattern {
            ContextPattern::WorkflowOnly => NO_PREDECESSOR_CONTEXT.to_string(),
            ContextPattern::ImmediatePredecessors | ContextPattern::MultiplePredecessors => {
                load_predecessor_context(
                    state,
                    &step.predecessors,
                    self.config.predecessor_truncate_chars,
                )?
            }
        };
        let memory_path = self.paths.memory_path(&state.task_id, agent);
        let learnings_dir = self.paths.agent_learnings_dir(agent);
        let memory_path = memory_path.display().to_string();
        let learnings_dir = learnings_dir.display().to_string();

        let prompt = render_invocation(&InvocationInputs {
            agent,
            cognitive_function: agents::cognitive_function(agent),
            task_id: &state.task_id,
            flow_id: &self.flow.flow_id,
            flow_name: &self.flow.name,
            skill: state.skill_name.as_deref(),
            phase: state.phase_id.as_deref(),
            domain: &state.domain,
            task: &state.task_description,
            content: &content,
            predecessor_context: &predecessor_context,
            memory_path: &memory_path,
            learnings_dir: include_learnings.then_some(learnings_dir.as_str()),
        })?;

        let short_id: String = state.task_id.chars().take(8).collect();
        render_task_tool(&TaskToolInputs {
            subagent_type: &subagent_type(agent),
            description: &format!("{agent} {short_id}"),
            model: &self.config.model_for(agent),
            prompt: &prompt,
            continue_command: &format!(
                "orchestrator flow continue --state {} --completed {agent}",
                state.task_id
            ),
        })
    }
}

/// Task-tool agent type for a registry name.
pub fn subagent_type(agent: &str) -> String {
    match agents::canonical_name(agent) {
        "memory" => "goal-memory-agent".to_string(),
        other => format!("{other}-agent"),
    }
}

/// Start `flow` for `task_id` and return the first directive.
pub fn start_flow(
    paths: &OrchestratorPaths,
    config: &OrchestratorConfig,
    flow: AgentFlow,
    task_id: &str,
    context: ChainContext,
    skip: &dyn SkipDecider,
) -> Result<NextDirective> {
    ChainOrchestrator::open(paths, config, flow, task_id, context)?
        .with_skip_decider(skip)
        .start_flow()
}

/// True when the persisted chain for `task_id` ran `flow_id` to the end.
pub fn is_flow_complete(paths: &OrchestratorPaths, task_id: &str, flow_id: &str) -> Result<bool> {
    let Some(state) = load_chain(paths, task_id)? else {
        return Ok(false);
    };
    if state.flow_id != flow_id {
        return Ok(false);
    }
    let flow = resolve_flow(paths, flow_id)?;
    Ok(state.is_complete(flow.steps.len()))
}

/// Error unless the chain for `task_id` finished `flow_id`.
pub fn require_flow_complete(
    paths: &OrchestratorPaths,
    task_id: &str,
    flow_id: &str,
) -> Result<()> {
    if !is_flow_complete(paths, task_id, flow_id)? {
        bail!(
            "flow {flow_id} for {task_id} is not complete; finish the agent chain (`orchestrator flow status --state {task_id}`) before advancing"
        );
    }
    Ok(())
}

/// `orchestrator flow status` report.
pub fn render_status(chain: &ChainOrchestrator<'_>, now: DateTime<Utc>) -> String {
    let state = chain.state();
    let status = chain.status(now);
    let steps = chain.flow().steps.len();
    let mut out = format!(
        "## Flow Status: {}\n\n{}\n\n- **Task ID:** {}\n- **Progress:** {}/{} steps\n- **Completed:** {}\n",
        status.as_str(),
        chain.flow().display_info(),
        state.task_id,
        state.current_step_index.min(steps),
        steps,
        if state.completed_agents.is_empty() {
            "none".to_string()
        } else {
            state.completed_agents.join(", ")
        },
    );
    if !state.skipped_agents.is_empty() {
        out.push_str(&format!("- **Skipped:** {}\n", state.skipped_agents.join(", ")));
    }
    match &status {
        FlowStatus::Running {
            agent,
            elapsed_secs,
        } => out.push_str(&format!(
            "- **Current:** {agent} (dispatched {elapsed_secs}s ago)\n"
        )),
        FlowStatus::Stale {
            agent,
            elapsed_secs,
        } => out.push_str(&format!(
            "- **Current:** {agent} (no completion after {elapsed_secs}s)\n\n\
             Redeliver the directive with `orchestrator flow resume --state {}`.\n",
            state.task_id
        )),
        FlowStatus::Halted { agent } => out.push_str(&format!(
            "- **Current:** {agent} (waiting for user answers)\n\n\
             Run `orchestrator questions --state {}` to list them.\n",
            state.task_id
        )),
        FlowStatus::Complete => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::flow::FlowSource;
    use crate::core::flow_defs;
    use crate::io::chain_store::save_flow;
    use crate::test_support::{TestWorkspace, memory_body};
    use chrono::Duration;

    const TASK: &str = "abc123def456";

    fn context() -> ChainContext {
        ChainContext {
            skill_name: Some("perform-tdd".to_string()),
            phase_id: Some("RED".to_string()),
            domain: "technical".to_string(),
            task_description: "Add parser".to_string(),
        }
    }

    fn red_flow() -> AgentFlow {
        flow_defs::predefined("perform-tdd-red").expect("flow")
    }

    fn agent_of(next: &NextDirective) -> &str {
        match next {
            NextDirective::Agent(directive) => &directive.agent,
            other => panic!("expected agent directive, got {other:?}"),
        }
    }

    #[test]
    fn first_directive_carries_learnings_and_task_tool() {
        let ws = TestWorkspace::new();
        let config = OrchestratorConfig::default();
        let next = start_flow(&ws.paths, &config, red_flow(), TASK, context(), &NeverSkip)
            .expect("start");
        let text = next.render();
        assert_eq!(agent_of(&next), "clarification");
        assert!(text.starts_with("## MANDATORY: Invoke Task Tool"));
        assert!(text.contains("- **subagent_type:** `clarification-agent`"));
        assert!(text.contains("- **description:** `clarification abc123de`"));
        assert!(text.contains("## MANDATORY: Learnings Injection (clarification)"));
        assert!(text.contains("<!-- Protocol content not found: tdd/red/clarification.md -->"));
        assert!(text.contains(
            "orchestrator flow continue --state abc123def456 --completed clarification"
        ));

        let saved = load_chain(&ws.paths, TASK).expect("load").expect("chain");
        assert!(!saved.needs_learnings_directive("clarification"));
        assert!(saved.step_dispatched_at.is_some());
    }

    /// With the conditional clarification step skipped, research runs first
    /// and analysis follows it.
    #[test]
    fn skipped_clarification_is_recorded() {
        let ws = TestWorkspace::new();
        let config = OrchestratorConfig::default();
        let skip = SkipAgents::new(&["clarification"]);
        let next = start_flow(&ws.paths, &config, red_flow(), TASK, context(), &skip)
            .expect("start");
        assert_eq!(agent_of(&next), "research");

        ws.write_memory(TASK, "research", "## Section 3: Downstream Directives\nuse nom\n");
        let mut chain = ChainOrchestrator::load(&ws.paths, &config, TASK).expect("load");
        let next = chain.get_next_directive("research-agent").expect("next");
        assert_eq!(agent_of(&next), "analysis");
        let text = next.render();
        assert!(text.contains("### From research\n  use nom"));
        assert_eq!(chain.state().skipped_agents, vec!["clarification"]);
        assert_eq!(chain.state().completed_agents, vec!["research"]);
    }

    #[test]
    fn missing_memory_file_leaves_chain_untouched() {
        let ws = TestWorkspace::new();
        let config = OrchestratorConfig::default();
        start_flow(&ws.paths, &config, red_flow(), TASK, context(), &NeverSkip).expect("start");
        let before = load_chain(&ws.paths, TASK).expect("load");

        let mut chain = ChainOrchestrator::load(&ws.paths, &config, TASK).expect("load");
        let err = chain
            .get_next_directive("clarification")
            .expect_err("missing memory");
        assert!(err.to_string().contains("memory file required but not found"));
        assert_eq!(load_chain(&ws.paths, TASK).expect("reload"), before);
    }

    #[test]
    fn out_of_order_completion_is_rejected() {
        let ws = TestWorkspace::new();
        let config = OrchestratorConfig::default();
        start_flow(&ws.paths, &config, red_flow(), TASK, context(), &NeverSkip).expect("start");
        ws.write_memory(TASK, "analysis", "x");
        let mut chain = ChainOrchestrator::load(&ws.paths, &config, TASK).expect("load");
        let err = chain.get_next_directive("analysis").expect_err("wrong agent");
        assert!(err.to_string().contains("expected clarification"));
    }

    /// Walking every step ends in FLOW_COMPLETE.
    #[test]
    fn flow_runs_to_completion() {
        let ws = TestWorkspace::new();
        let config = OrchestratorConfig::default();
        let flow = flow_defs::predefined("perform-tdd-doc").expect("flow");
        let next = start_flow(&ws.paths, &config, flow, TASK, context(), &NeverSkip)
            .expect("start");
        assert_eq!(agent_of(&next), "analysis");

        ws.write_memory(TASK, "analysis", "## Section 3: Downstream Directives\ndocument it\n");
        let mut chain = ChainOrchestrator::load(&ws.paths, &config, TASK).expect("load");
        let next = chain.get_next_directive("analysis").expect("next");
        assert_eq!(agent_of(&next), "generation");

        ws.write_memory(TASK, "generation", "done");
        let mut chain = ChainOrchestrator::load(&ws.paths, &config, TASK).expect("load");
        let next = chain.get_next_directive("generation").expect("next");
        assert_eq!(
            next.render(),
            "**FLOW_COMPLETE: perform-tdd-doc**\n\nAll agents in flow have completed.\n\
             Ready for perform-tdd phase advancement."
        );
        assert!(is_flow_complete(&ws.paths, TASK, "perform-tdd-doc").expect("complete"));
        assert!(!is_flow_complete(&ws.paths, TASK, "perform-tdd-red").expect("other flow"));
    }

    #[test]
    fn clarification_request_halts_until_resume() {
        let ws = TestWorkspace::new();
        let config = OrchestratorConfig::default();
        start_flow(&ws.paths, &config, red_flow(), TASK, context(), &NeverSkip).expect("start");
        ws.write_memory(
            TASK,
            "clarification",
            "## Section 4: User Questions\n```json\n{\"clarification_required\": true, \
             \"questions\": [{\"id\": \"Q1\", \"priority\": \"P0\", \"question\": \"Which grammar?\"}]}\n```\n",
        );
        let mut chain = ChainOrchestrator::load(&ws.paths, &config, TASK).expect("load");
        let next = chain.get_next_directive("clarification").expect("next");
        assert_eq!(next.exit_code(), exit_codes::HALTED);
        assert!(next.render().contains("- **[P0] Q1** Which grammar?"));
        assert!(matches!(chain.status(Utc::now()), FlowStatus::Halted { .. }));

        let mut chain = ChainOrchestrator::load(&ws.paths, &config, TASK).expect("load");
        assert!(chain.get_next_directive("research").is_err());
        let resumed = chain.resume().expect("resume");
        assert_eq!(agent_of(&resumed), "research");
        assert!(resumed.render().contains("Learnings Injection (research)"));
        assert!(!chain.state().halted_for_clarification);
    }

    #[test]
    fn stale_agents_are_reported() {
        let ws = TestWorkspace::new();
        let config = OrchestratorConfig::default();
        start_flow(&ws.paths, &config, red_flow(), TASK, context(), &NeverSkip).expect("start");
        let chain = ChainOrchestrator::load(&ws.paths, &config, TASK).expect("load");
        assert!(matches!(chain.status(Utc::now()), FlowStatus::Running { .. }));
        let later = Utc::now() + Duration::seconds(3600);
        assert!(matches!(chain.status(later), FlowStatus::Stale { .. }));
        assert!(render_status(&chain, later).starts_with("## Flow Status: STALE"));
    }

    /// A different flow archives the old chain; a finished run of the same flow restarts.
    #[test]
    fn switching_flows_archives_previous_chain() {
        let ws = TestWorkspace::new();
        let config = OrchestratorConfig::default();
        start_flow(&ws.paths, &config, red_flow(), TASK, context(), &NeverSkip).expect("start");
        let verify = flow_defs::predefined(flow_defs::VERIFY_FLOW).expect("flow");
        start_flow(&ws.paths, &config, verify.clone(), TASK, context(), &NeverSkip)
            .expect("switch");
        assert!(
            ws.paths
                .chain_archive_path(TASK, "perform-tdd-red")
                .is_file()
        );

        ws.write_memory(TASK, "validation", "ok");
        let mut chain = ChainOrchestrator::load(&ws.paths, &config, TASK).expect("load");
        chain.get_next_directive("validation").expect("complete");
        let again = start_flow(&ws.paths, &config, verify, TASK, context(), &NeverSkip)
            .expect("restart");
        assert_eq!(agent_of(&again), "validation");
    }

    #[test]
    fn rewind_reruns_from_agent_with_note() {
        let ws = TestWorkspace::new();
        let config = OrchestratorConfig::default();
        let flow = flow_defs::predefined("perform-tdd-doc").expect("flow");
        start_flow(&ws.paths, &config, flow, TASK, context(), &NeverSkip).expect("start");
        ws.write_memory(TASK, "analysis", "a");
        let mut chain = ChainOrchestrator::load(&ws.paths, &config, TASK).expect("load");
        chain.get_next_directive("analysis").expect("analysis");
        ws.write_memory(TASK, "generation", "g");
        chain.get_next_directive("generation").expect("generation");

        let directive = chain
            .rewind_to("generation", "### Remediation Required\n\n- fix links")
            .expect("rewind");
        assert_eq!(directive.agent, "generation");
        assert!(directive.text.contains("- fix links"));
        assert!(!directive.text.contains("Learnings Injection"));
        assert_eq!(chain.state().completed_agents, vec!["analysis"]);
        let again = chain.resume().expect("redeliver");
        assert!(again.render().contains("- fix links"));

        let err = chain
            .get_next_directive("generation")
            .expect_err("old generation file");
        assert!(err.to_string().contains("was not rewritten since generation was dispatched"));
        ws.write_memory(TASK, "generation", "g with links fixed");
        chain.get_next_directive("generation").expect("fresh generation");
    }

    /// The next phase's flow reuses agent names; their files from the
    /// previous phase neither pass the gate nor reach later agents.
    #[test]
    fn previous_phase_artifacts_do_not_satisfy_next_flow() {
        let ws = TestWorkspace::new();
        let config = OrchestratorConfig::default();
        let doc = flow_defs::predefined("perform-tdd-doc").expect("flow");
        start_flow(&ws.paths, &config, doc, TASK, context(), &NeverSkip).expect("start");
        ws.write_memory(TASK, "analysis", &memory_body("analysis", "doc analysis"));
        let mut chain = ChainOrchestrator::load(&ws.paths, &config, TASK).expect("load");
        chain.get_next_directive("analysis").expect("analysis");
        ws.write_memory(TASK, "generation", "doc generation");
        chain.get_next_directive("generation").expect("generation");

        let green = flow_defs::predefined("perform-tdd-green").expect("flow");
        let next = start_flow(&ws.paths, &config, green, TASK, context(), &NeverSkip)
            .expect("green");
        assert_eq!(agent_of(&next), "analysis");
        let before = load_chain(&ws.paths, TASK).expect("load");

        let mut chain = ChainOrchestrator::load(&ws.paths, &config, TASK).expect("load");
        let err = chain.get_next_directive("analysis").expect_err("stale analysis");
        assert!(err.to_string().contains("was not rewritten since analysis was dispatched"));
        assert_eq!(load_chain(&ws.paths, TASK).expect("reload"), before);

        ws.write_memory(TASK, "analysis", &memory_body("analysis", "green analysis of the failing test"));
        let next = chain.get_next_directive("analysis").expect("fresh analysis");
        assert_eq!(agent_of(&next), "generation");
        let text = next.render();
        assert!(text.contains("green analysis of the failing test"));
        assert!(!text.contains("doc analysis"));
        assert!(chain.get_next_directive("generation").is_err());
    }

    /// Rerunning a finished flow, as a VERIFY loop-back does, needs a new artifact.
    #[test]
    fn rerun_of_finished_flow_needs_fresh_artifact() {
        let ws = TestWorkspace::new();
        let config = OrchestratorConfig::default();
        let verify = flow_defs::predefined(flow_defs::VERIFY_FLOW).expect("flow");
        start_flow(&ws.paths, &config, verify.clone(), TASK, context(), &NeverSkip)
            .expect("start");
        ws.write_memory(TASK, "validation", "**Verdict:** FAIL\n");
        let mut chain = ChainOrchestrator::load(&ws.paths, &config, TASK).expect("load");
        chain.get_next_directive("validation").expect("first pass");

        start_flow(&ws.paths, &config, verify, TASK, context(), &NeverSkip).expect("rerun");
        let mut chain = ChainOrchestrator::load(&ws.paths, &config, TASK).expect("load");
        assert!(chain.get_next_directive("validation").is_err());
        ws.write_memory(TASK, "validation", "**Verdict:** PASS after fixes\n");
        let next = chain.get_next_directive("validation").expect("second pass");
        assert!(matches!(next, NextDirective::FlowComplete { .. }));
    }

    /// Redelivering a step keeps its dispatch baseline, so a file the agent
    /// wrote before the redelivery still counts.
    #[test]
    fn redelivery_keeps_dispatch_baseline() {
        let ws = TestWorkspace::new();
        let config = OrchestratorConfig::default();
        start_flow(&ws.paths, &config, red_flow(), TASK, context(), &NeverSkip).expect("start");
        ws.write_memory(TASK, "clarification", "nothing to ask");
        let mut chain = ChainOrchestrator::load(&ws.paths, &config, TASK).expect("load");
        chain.resume().expect("redeliver");
        start_flow(&ws.paths, &config, red_flow(), TASK, context(), &NeverSkip)
            .expect("start again");
        let mut chain = ChainOrchestrator::load(&ws.paths, &config, TASK).expect("load");
        let next = chain.get_next_directive("clarification").expect("next");
        assert_eq!(agent_of(&next), "research");
    }

    /// A skip chosen at `flow start` still applies to a conditional step
    /// reached by a later `flow continue`.
    #[test]
    fn skip_list_survives_reload() {
        let ws = TestWorkspace::new();
        let config = OrchestratorConfig::default();
        let flow = AgentFlow {
            flow_id: "dynamic-5c1p0000".to_string(),
            name: "Research then clarify".to_string(),
            steps: vec![
                FlowStep::new("research", ContextPattern::WorkflowOnly, &[]),
                FlowStep::new("clarification", ContextPattern::ImmediatePredecessors, &["research"])
                    .conditional(),
                FlowStep::new("analysis", ContextPattern::ImmediatePredecessors, &["clarification"]),
            ],
            source: FlowSource::Dynamic,
        };
        save_flow(&ws.paths, &flow).expect("save flow");
        let skip = SkipAgents::new(&["clarification-agent"]);
        let next = start_flow(&ws.paths, &config, flow, TASK, context(), &skip).expect("start");
        assert_eq!(agent_of(&next), "research");
        assert_eq!(
            load_chain(&ws.paths, TASK).expect("load").expect("chain").skip_agents,
            vec!["clarification"]
        );

        ws.write_memory(TASK, "research", "found it");
        let mut chain = ChainOrchestrator::load(&ws.paths, &config, TASK).expect("load");
        let next = chain.get_next_directive("research").expect("next");
        assert_eq!(agent_of(&next), "analysis");
        assert!(next.render().contains("### clarification (skipped)"));
        assert_eq!(chain.state().skipped_agents, vec!["clarification"]);
    }

    #[test]
    fn memory_agent_maps_to_goal_memory_type() {
        assert_eq!(subagent_type("memory"), "goal-memory-agent");
        assert_eq!(subagent_type("research-agent"), "research-agent");
    }
}
