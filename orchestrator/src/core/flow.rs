//! Agent flow definitions: an ordered sequence of agent invocations.
//!
//! Flows are immutable once built and shared by every chain that runs them.

use serde::{Deserialize, Serialize};

/// How much predecessor output an agent receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextPattern {
    /// Only the workflow/task context, no predecessor memory.
    WorkflowOnly,
    /// At most one predecessor's memory.
    ImmediatePredecessors,
    /// Two or more predecessors' memory.
    MultiplePredecessors,
}

impl ContextPattern {
    pub fn as_str(self) -> &'static str {
        match self {
            ContextPattern::WorkflowOnly => "workflow_only",
            ContextPattern::ImmediatePredecessors => "immediate_predecessors",
            ContextPattern::MultiplePredecessors => "multiple_predecessors",
        }
    }

    fn accepts(self, predecessors: usize) -> bool {
        match self {
            ContextPattern::WorkflowOnly => predecessors == 0,
            ContextPattern::ImmediatePredecessors => predecessors <= 1,
            ContextPattern::MultiplePredecessors => predecessors >= 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FlowSource {
    #[default]
    Skill,
    Dynamic,
}

/// One agent invocation within a flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlowStep {
    pub agent_name: String,
    pub context_pattern: ContextPattern,
    #[serde(default)]
    pub predecessors: Vec<String>,
    /// Protocol content path relative to `.claude/content/`.
    #[serde(default)]
    pub content_file: Option<String>,
    /// May be skipped at runtime when the skip decider says so.
    #[serde(default)]
    pub conditional: bool,
}

impl FlowStep {
    pub fn new(agent_name: &str, context_pattern: ContextPattern, predecessors: &[&str]) -> Self {
        Self {
            agent_name: agent_name.to_string(),
            context_pattern,
            predecessors: predecessors.iter().map(|p| p.to_string()).collect(),
            content_file: None,
            conditional: false,
        }
    }

    pub fn with_content(mut self, content_file: &str) -> Self {
        self.content_file = Some(content_file.to_string());
        self
    }

    pub fn conditional(mut self) -> Self {
        self.conditional = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentFlow {
    pub flow_id: String,
    pub name: String,
    pub steps: Vec<FlowStep>,
    #[serde(default)]
    pub source: FlowSource,
}

impl AgentFlow {
    pub fn step_by_agent(&self, agent: &str) -> Option<&FlowStep> {
        self.steps.iter().find(|step| step.agent_name == agent)
    }

    pub fn step_index(&self, agent: &str) -> Option<usize> {
        self.steps.iter().position(|step| step.agent_name == agent)
    }

    /// Step following `agent`, if any.
    pub fn next_step(&self, agent: &str) -> Option<&FlowStep> {
        self.step_index(agent).and_then(|index| self.steps.get(index + 1))
    }

    pub fn is_last_step(&self, agent: &str) -> bool {
        self.step_index(agent)
            .is_some_and(|index| index + 1 == self.steps.len())
    }

    pub fn agent_names(&self) -> Vec<&str> {
        self.steps.iter().map(|step| step.agent_name.as_str()).collect()
    }

    pub fn display_info(&self) -> String {
        format!(
            "**Flow:** {} (`{}`)\n**Agents:** {}",
            self.name,
            self.flow_id,
            self.agent_names().join(" → ")
        )
    }

    /// Structural problems; an empty list means the flow is well formed.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.flow_id.trim().is_empty() {
            errors.push("flow_id is empty".to_string());
        }
        if self.steps.is_empty() {
            errors.push(format!("{}: flow has no steps", self.flow_id));
        }
        for (index, step) in self.steps.iter().enumerate() {
            if self.steps[..index]
                .iter()
                .any(|earlier| earlier.agent_name == step.agent_name)
            {
                errors.push(format!(
                    "{}: agent {} appears more than once",
                    self.flow_id, step.agent_name
                ));
            }
            if !step.context_pattern.accepts(step.predecessors.len()) {
                errors.push(format!(
                    "{}: {} has {} predecessors, incompatible with {}",
                    self.flow_id,
                    step.agent_name,
                    step.predecessors.len(),
                    step.context_pattern.as_str()
                ));
            }
            for predecessor in &step.predecessors {
                let earlier = self.steps[..index]
                    .iter()
                    .any(|s| &s.agent_name == predecessor);
                if !earlier {
                    errors.push(format!(
                        "{}: {} lists predecessor {predecessor} that does not run before it",
                        self.flow_id, step.agent_name
                    ));
                }
            }
        }
        errors
    }
}
