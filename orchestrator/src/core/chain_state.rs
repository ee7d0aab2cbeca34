//! Progress of one agent flow for one task.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainState {
    pub task_id: String,
    pub flow_id: String,
    #[serde(default)]
    pub skill_name: Option<String>,
    #[serde(default)]
    pub phase_id: Option<String>,
    pub domain: String,
    pub task_description: String,
    #[serde(default)]
    pub current_step_index: usize,
    /// Ordered set of agents that finished.
    #[serde(default)]
    pub completed_agents: Vec<String>,
    #[serde(default)]
    pub skipped_agents: Vec<String>,
    #[serde(default)]
    pub memory_files_created: BTreeMap<String, String>,
    /// Agents that already received the learnings directive in this flow.
    #[serde(default)]
    pub learnings_injected_for: BTreeMap<String, bool>,
    #[serde(default)]
    pub halted_for_clarification: bool,
    pub started_at: DateTime<Utc>,
    /// When the current step's directive was last handed out.
    #[serde(default)]
    pub step_dispatched_at: Option<DateTime<Utc>>,
    /// The current step's memory file as it stood at dispatch.
    #[serde(default)]
    pub dispatch_baseline: Option<MemoryBaseline>,
    /// Extra instructions appended to the current step, kept for redelivery.
    #[serde(default)]
    pub step_note: Option<String>,
    /// Conditional agents this chain skips whenever they come up.
    #[serde(default)]
    pub skip_agents: Vec<String>,
}

/// Modification time and size of a memory file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileStamp {
    pub modified: DateTime<Utc>,
    pub len: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryBaseline {
    pub agent: String,
    /// `None` when no file existed yet.
    #[serde(default)]
    pub stamp: Option<FileStamp>,
}

impl MemoryBaseline {
    /// True when `current` is a file written after this baseline was taken.
    pub fn is_superseded_by(&self, current: Option<FileStamp>) -> bool {
        match (self.stamp, current) {
            (_, None) => false,
            (None, Some(_)) => true,
            (Some(before), Some(now)) => now != before,
        }
    }
}

/// Chain labels that travel with a flow start.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ChainContext {
    pub skill_name: Option<String>,
    pub phase_id: Option<String>,
    pub domain: String,
    pub task_description: String,
}

impl ChainState {
    pub fn new(
        task_id: impl Into<String>,
        flow_id: impl Into<String>,
        context: ChainContext,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            flow_id: flow_id.into(),
            skill_name: context.skill_name,
            phase_id: context.phase_id,
            domain: context.domain,
            task_description: context.task_description,
            current_step_index: 0,
            completed_agents: Vec::new(),
            skipped_agents: Vec::new(),
            memory_files_created: BTreeMap::new(),
            learnings_injected_for: BTreeMap::new(),
            halted_for_clarification: false,
            started_at: now,
            step_dispatched_at: None,
            dispatch_baseline: None,
            step_note: None,
            skip_agents: Vec::new(),
        }
    }

    pub fn is_agent_completed(&self, agent: &str) -> bool {
        self.completed_agents.iter().any(|a| a == agent)
    }

    pub fn is_agent_skipped(&self, agent: &str) -> bool {
        self.skipped_agents.iter().any(|a| a == agent)
    }

    /// Idempotent.
    pub fn mark_agent_complete(&mut self, agent: &str, memory_path: &str) {
        if !self.is_agent_completed(agent) {
            self.completed_agents.push(agent.to_string());
        }
        self.memory_files_created
            .insert(agent.to_string(), memory_path.to_string());
    }

    pub fn mark_agent_skipped(&mut self, agent: &str) {
        if !self.is_agent_skipped(agent) {
            self.skipped_agents.push(agent.to_string());
        }
    }

    /// Forget that `agents` ran so they can produce fresh artifacts.
    pub fn forget_agents(&mut self, agents: &[String]) {
        self.completed_agents.retain(|done| !agents.contains(done));
        self.memory_files_created
            .retain(|agent, _| !agents.contains(agent));
    }

    /// Memory file `agent` wrote in this chain, if it completed here.
    pub fn produced_memory(&self, agent: &str) -> Option<&str> {
        self.memory_files_created.get(agent).map(String::as_str)
    }

    pub fn advance_step(&mut self) {
        self.current_step_index += 1;
    }

    pub fn needs_learnings_directive(&self, agent: &str) -> bool {
        !self
            .learnings_injected_for
            .get(agent)
            .copied()
            .unwrap_or(false)
    }

    pub fn mark_learnings_injected(&mut self, agent: &str) {
        self.learnings_injected_for.insert(agent.to_string(), true);
    }

    pub fn is_complete(&self, step_count: usize) -> bool {
        self.current_step_index >= step_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> ChainState {
        ChainState::new(
            "abc123def456",
            "outer-loop-gather",
            ChainContext {
                domain: "technical".to_string(),
                task_description: "Build API".to_string(),
                ..ChainContext::default()
            },
            Utc::now(),
        )
    }

    #[test]
    fn mark_complete_is_idempotent() {
        let mut state = chain();
        state.mark_agent_complete("research", "a.md");
        state.mark_agent_complete("research", "b.md");
        assert_eq!(state.completed_agents, vec!["research"]);
        assert_eq!(state.memory_files_created["research"], "b.md");
    }

    /// Once set, the learnings flag stays set for the rest of the flow.
    #[test]
    fn learnings_flag_is_sticky() {
        let mut state = chain();
        assert!(state.needs_learnings_directive("research"));
        state.mark_learnings_injected("research");
        state.mark_agent_complete("research", "a.md");
        state.advance_step();
        state.mark_learnings_injected("research");
        assert!(!state.needs_learnings_directive("research"));
        assert!(state.needs_learnings_directive("analysis"));
    }

    /// A baseline is superseded only by a file that appeared or changed.
    #[test]
    fn baseline_detects_rewritten_files() {
        let stamp = FileStamp {
            modified: Utc::now(),
            len: 10,
        };
        let absent = MemoryBaseline {
            agent: "analysis".to_string(),
            stamp: None,
        };
        assert!(!absent.is_superseded_by(None));
        assert!(absent.is_superseded_by(Some(stamp)));

        let existing = MemoryBaseline {
            agent: "analysis".to_string(),
            stamp: Some(stamp),
        };
        assert!(!existing.is_superseded_by(Some(stamp)));
        assert!(existing.is_superseded_by(Some(FileStamp { len: 11, ..stamp })));
        assert!(!existing.is_superseded_by(None));
    }

    #[test]
    fn forgotten_agents_lose_their_artifacts() {
        let mut state = chain();
        state.mark_agent_complete("analysis", "a.md");
        state.mark_agent_complete("synthesis", "s.md");
        state.forget_agents(&["synthesis".to_string()]);
        assert_eq!(state.completed_agents, vec!["analysis"]);
        assert_eq!(state.produced_memory("analysis"), Some("a.md"));
        assert_eq!(state.produced_memory("synthesis"), None);
    }

    #[test]
    fn completion_tracks_step_index() {
        let mut state = chain();
        assert!(!state.is_complete(2));
        state.advance_step();
        state.advance_step();
        assert!(state.is_complete(2));
    }
}
