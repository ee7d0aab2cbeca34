//! Main algorithm protocol and per-session state.
//!
//! Phases advance monotonically:
//!
//! ```text
//! INITIALIZED -> GATHER -> INTERVIEW -> OBSERVE -> THINK -> PLAN -> BUILD
//!   -> EXECUTE -> VERIFY -> LEARN -> COMPLETED
//! ```
//!
//! with one loop-back, VERIFY -> OBSERVE, bounded by `max_verify_iterations`.
//! COMPLETED is terminal: every mutator fails once it is reached.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::domain::{TaskDomain, classify_domain};
use crate::core::feedback::DEFAULT_MAX_ITERATIONS;
use crate::core::fsm::{Protocol, StateError, transition};
use crate::core::ideal_state::{IdealState, InterviewIteration};
use crate::core::types::{Complexity, PhaseTiming};
use crate::core::verification::VerificationResult;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlgorithmPhase {
    Initialized,
    Gather,
    Interview,
    Observe,
    Think,
    Plan,
    Build,
    Execute,
    Verify,
    Learn,
    Completed,
}

impl AlgorithmPhase {
    pub fn label(self) -> &'static str {
        match self {
            AlgorithmPhase::Initialized => "INITIALIZED",
            AlgorithmPhase::Gather => "GATHER",
            AlgorithmPhase::Interview => "INTERVIEW",
            AlgorithmPhase::Observe => "OBSERVE",
            AlgorithmPhase::Think => "THINK",
            AlgorithmPhase::Plan => "PLAN",
            AlgorithmPhase::Build => "BUILD",
            AlgorithmPhase::Execute => "EXECUTE",
            AlgorithmPhase::Verify => "VERIFY",
            AlgorithmPhase::Learn => "LEARN",
            AlgorithmPhase::Completed => "COMPLETED",
        }
    }

    /// Parse a CLI-style name (`observe`, `IDEAL`, `interview`).
    pub fn parse(raw: &str) -> Option<AlgorithmPhase> {
        let upper = raw.trim().to_uppercase();
        if upper == "IDEAL" || upper == "IDEAL_STATE" {
            return Some(AlgorithmPhase::Interview);
        }
        AlgorithmProtocol::phases()
            .iter()
            .copied()
            .find(|phase| phase.label() == upper)
    }
}

/// Legal-transition table for the main algorithm.
pub struct AlgorithmProtocol;

impl Protocol for AlgorithmProtocol {
    type Phase = AlgorithmPhase;
    const NAME: &'static str = "algorithm";

    fn phases() -> &'static [AlgorithmPhase] {
        use AlgorithmPhase as P;
        &[
            P::Initialized,
            P::Gather,
            P::Interview,
            P::Observe,
            P::Think,
            P::Plan,
            P::Build,
            P::Execute,
            P::Verify,
            P::Learn,
            P::Completed,
        ]
    }

    fn successors(phase: AlgorithmPhase) -> &'static [AlgorithmPhase] {
        use AlgorithmPhase as P;
        match phase {
            P::Initialized => &[P::Gather],
            P::Gather => &[P::Interview],
            P::Interview => &[P::Observe],
            P::Observe => &[P::Think],
            P::Think => &[P::Plan],
            P::Plan => &[P::Build],
            P::Build => &[P::Execute],
            P::Execute => &[P::Verify],
            P::Verify => &[P::Learn, P::Observe],
            P::Learn => &[P::Completed],
            P::Completed => &[],
        }
    }

    fn label(phase: AlgorithmPhase) -> &'static str {
        phase.label()
    }
}

/// Subtask bookkeeping on a decomposed parent, in registration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtaskEntry {
    pub session_id: String,
    pub dependencies: Vec<String>,
    pub completed: bool,
    /// The GATHER routing directive for this subtask has been printed.
    #[serde(default)]
    pub dispatched: bool,
}

fn default_max_verify_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

/// One run of the algorithm for a single task (`state/sessions/{id}.json`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmState {
    pub session_id: String,
    pub user_query: String,
    pub current_phase: AlgorithmPhase,
    pub complexity: Option<Complexity>,
    #[serde(default)]
    pub parent_task_id: Option<String>,
    #[serde(default)]
    pub subtask_index: Option<usize>,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub phase_outputs: BTreeMap<AlgorithmPhase, Value>,
    #[serde(default)]
    pub phase_history: Vec<AlgorithmPhase>,
    #[serde(default)]
    pub phase_timestamps: BTreeMap<AlgorithmPhase, PhaseTiming>,
    #[serde(default)]
    pub verify_iteration: u32,
    #[serde(default = "default_max_verify_iterations")]
    pub max_verify_iterations: u32,
    #[serde(default)]
    pub verification_results: Vec<VerificationResult>,
    #[serde(default)]
    pub ideal_state: Option<IdealState>,
    #[serde(default)]
    pub interview_iterations: Vec<InterviewIteration>,
    #[serde(default)]
    pub subtasks: Vec<SubtaskEntry>,
    #[serde(default)]
    pub decompose: Option<crate::core::decompose::DecomposeProgress>,
    /// Set by GATHER from the query unless already known.
    #[serde(default)]
    pub task_domain: Option<TaskDomain>,
    #[serde(default)]
    pub domain_confidence: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlgorithmState {
    pub fn new(
        session_id: impl Into<String>,
        user_query: impl Into<String>,
        complexity: Option<Complexity>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            user_query: user_query.into(),
            current_phase: AlgorithmPhase::Initialized,
            complexity,
            parent_task_id: None,
            subtask_index: None,
            dependencies: Vec::new(),
            phase_outputs: BTreeMap::new(),
            phase_history: vec![AlgorithmPhase::Initialized],
            phase_timestamps: BTreeMap::new(),
            verify_iteration: 0,
            max_verify_iterations: DEFAULT_MAX_ITERATIONS,
            verification_results: Vec::new(),
            ideal_state: None,
            interview_iterations: Vec::new(),
            subtasks: Vec::new(),
            decompose: None,
            task_domain: None,
            domain_confidence: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Classify the query once; a domain already on the session is kept.
    pub fn ensure_domain(&mut self) -> TaskDomain {
        if let Some(domain) = self.task_domain {
            return domain;
        }
        let classification = classify_domain(&self.user_query);
        self.task_domain = Some(classification.domain);
        self.domain_confidence = Some(classification.confidence);
        classification.domain
    }

    /// Domain label for agent prompts.
    pub fn domain_label<'a>(&self, fallback: &'a str) -> &'a str {
        self.task_domain.map_or(fallback, |domain| domain.as_str())
    }

    pub fn is_subtask(&self) -> bool {
        self.parent_task_id.is_some()
    }

    pub fn is_completed(&self) -> bool {
        self.current_phase == AlgorithmPhase::Completed
    }

    fn ensure_mutable(&self) -> Result<(), StateError> {
        if self.is_completed() {
            return Err(StateError::Terminal {
                protocol: AlgorithmProtocol::NAME,
                id: self.session_id.clone(),
            });
        }
        Ok(())
    }

    /// Move to `target`. VERIFY -> OBSERVE counts as a loop-back.
    ///
    /// On error the state is unchanged.
    pub fn start_phase(
        &mut self,
        target: AlgorithmPhase,
        now: DateTime<Utc>,
    ) -> Result<(), StateError> {
        self.ensure_mutable()?;
        transition::<AlgorithmProtocol>(self.current_phase, target)?;
        let looping_back =
            self.current_phase == AlgorithmPhase::Verify && target == AlgorithmPhase::Observe;
        if looping_back && self.verify_iteration >= self.max_verify_iterations {
            return Err(StateError::LoopBackLimit {
                protocol: AlgorithmProtocol::NAME,
                max: self.max_verify_iterations,
            });
        }
        if looping_back {
            self.verify_iteration += 1;
        }
        self.phase_timestamps
            .entry(self.current_phase)
            .or_default()
            .completed_at = Some(now);
        self.phase_timestamps.insert(
            target,
            PhaseTiming {
                started_at: Some(now),
                completed_at: None,
            },
        );
        self.current_phase = target;
        self.phase_history.push(target);
        self.updated_at = now;
        Ok(())
    }

    /// True if a VERIFY -> OBSERVE loop-back is currently allowed.
    pub fn can_loop_back(&self) -> bool {
        self.current_phase == AlgorithmPhase::Verify
            && self.verify_iteration < self.max_verify_iterations
    }

    pub fn loop_back(&mut self, now: DateTime<Utc>) -> Result<(), StateError> {
        self.start_phase(AlgorithmPhase::Observe, now)
    }

    /// LEARN -> COMPLETED.
    pub fn mark_completed(&mut self, now: DateTime<Utc>) -> Result<(), StateError> {
        self.start_phase(AlgorithmPhase::Completed, now)
    }

    pub fn record_phase_output(
        &mut self,
        phase: AlgorithmPhase,
        output: Value,
        now: DateTime<Utc>,
    ) -> Result<(), StateError> {
        self.ensure_mutable()?;
        self.phase_outputs.insert(phase, output);
        self.updated_at = now;
        Ok(())
    }

    pub fn add_verification_result(
        &mut self,
        result: VerificationResult,
    ) -> Result<(), StateError> {
        self.ensure_mutable()?;
        self.updated_at = result.timestamp;
        self.verification_results.push(result);
        Ok(())
    }

    pub fn record_interview(
        &mut self,
        ideal: IdealState,
        iteration: InterviewIteration,
        now: DateTime<Utc>,
    ) -> Result<(), StateError> {
        self.ensure_mutable()?;
        self.ideal_state = Some(ideal);
        self.interview_iterations.push(iteration);
        self.updated_at = now;
        Ok(())
    }

    pub fn register_subtask(
        &mut self,
        session_id: impl Into<String>,
        dependencies: Vec<String>,
    ) -> Result<(), StateError> {
        self.ensure_mutable()?;
        let session_id = session_id.into();
        if let Some(entry) = self
            .subtasks
            .iter_mut()
            .find(|entry| entry.session_id == session_id)
        {
            entry.dependencies = dependencies;
            return Ok(());
        }
        self.subtasks.push(SubtaskEntry {
            session_id,
            dependencies,
            completed: false,
            dispatched: false,
        });
        Ok(())
    }

    /// Mark a registered subtask complete. Returns false for unknown ids.
    pub fn mark_subtask_complete(&mut self, session_id: &str) -> Result<bool, StateError> {
        self.ensure_mutable()?;
        match self
            .subtasks
            .iter_mut()
            .find(|entry| entry.session_id == session_id)
        {
            Some(entry) => {
                entry.completed = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Pending subtasks whose dependencies are all complete, in registration order.
    pub fn ready_subtasks(&self) -> Vec<String> {
        self.subtasks
            .iter()
            .filter(|entry| !entry.completed)
            .filter(|entry| {
                entry.dependencies.iter().all(|dep| {
                    self.subtasks
                        .iter()
                        .any(|other| &other.session_id == dep && other.completed)
                })
            })
            .map(|entry| entry.session_id.clone())
            .collect()
    }

    /// Ready subtasks whose routing directive has not been handed out yet.
    pub fn undispatched_subtasks(&self) -> Vec<String> {
        self.ready_subtasks()
            .into_iter()
            .filter(|id| {
                self.subtasks
                    .iter()
                    .any(|entry| &entry.session_id == id && !entry.dispatched)
            })
            .collect()
    }

    pub fn mark_subtasks_dispatched(&mut self, session_ids: &[String]) -> Result<(), StateError> {
        self.ensure_mutable()?;
        for entry in self
            .subtasks
            .iter_mut()
            .filter(|entry| session_ids.contains(&entry.session_id))
        {
            entry.dispatched = true;
        }
        Ok(())
    }

    pub fn all_subtasks_complete(&self) -> bool {
        !self.subtasks.is_empty() && self.subtasks.iter().all(|entry| entry.completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fsm::illegal_pairs;
    use serde_json::json;

    fn state() -> AlgorithmState {
        AlgorithmState::new("abc123def456", "Build API", Some(Complexity::Simple), Utc::now())
    }

    fn advance_to(state: &mut AlgorithmState, target: AlgorithmPhase) {
        if state.current_phase == target {
            return;
        }
        for &phase in AlgorithmProtocol::phases() {
            if phase == AlgorithmPhase::Initialized {
                continue;
            }
            state.start_phase(phase, Utc::now()).expect("advance");
            if phase == target {
                return;
            }
        }
    }

    /// Every pair outside the table is rejected and leaves the state unchanged.
    #[test]
    fn illegal_transitions_leave_state_unchanged() {
        for (from, to) in illegal_pairs::<AlgorithmProtocol>() {
            if from == AlgorithmPhase::Completed {
                continue;
            }
            let mut s = state();
            advance_to(&mut s, from);
            assert_eq!(s.current_phase, from);
            let before = s.clone();
            assert!(s.start_phase(to, Utc::now()).is_err(), "{from:?} -> {to:?}");
            assert_eq!(s, before);
        }
    }

    #[test]
    fn phases_advance_in_order() {
        let mut s = state();
        advance_to(&mut s, AlgorithmPhase::Learn);
        assert_eq!(s.current_phase, AlgorithmPhase::Learn);
        assert_eq!(s.phase_history.len(), 10);
        assert!(s.phase_timestamps[&AlgorithmPhase::Gather].completed_at.is_some());
    }

    #[test]
    fn loop_back_increments_until_limit() {
        let mut s = state();
        advance_to(&mut s, AlgorithmPhase::Verify);
        for expected in 1..=3 {
            assert!(s.can_loop_back());
            s.loop_back(Utc::now()).expect("loop back");
            assert_eq!(s.verify_iteration, expected);
            for phase in [
                AlgorithmPhase::Think,
                AlgorithmPhase::Plan,
                AlgorithmPhase::Build,
                AlgorithmPhase::Execute,
                AlgorithmPhase::Verify,
            ] {
                s.start_phase(phase, Utc::now()).expect("advance");
            }
        }
        assert!(!s.can_loop_back());
        let err = s.loop_back(Utc::now()).expect_err("limit");
        assert!(matches!(err, StateError::LoopBackLimit { max: 3, .. }));
        assert_eq!(s.current_phase, AlgorithmPhase::Verify);
    }

    #[test]
    fn loop_back_only_from_verify() {
        let mut s = state();
        advance_to(&mut s, AlgorithmPhase::Execute);
        assert!(!s.can_loop_back());
        assert!(s.loop_back(Utc::now()).is_err());
    }

    #[test]
    fn completed_is_terminal() {
        let mut s = state();
        advance_to(&mut s, AlgorithmPhase::Learn);
        s.mark_completed(Utc::now()).expect("complete");
        let err = s
            .record_phase_output(AlgorithmPhase::Learn, json!({}), Utc::now())
            .expect_err("terminal");
        assert!(matches!(err, StateError::Terminal { .. }));
        assert!(s.register_subtask("x", Vec::new()).is_err());
    }

    #[test]
    fn mark_completed_requires_learn() {
        let mut s = state();
        advance_to(&mut s, AlgorithmPhase::Verify);
        assert!(s.mark_completed(Utc::now()).is_err());
    }

    #[test]
    fn ready_subtasks_follow_dependencies() {
        let mut parent = state();
        parent.register_subtask("a", Vec::new()).expect("a");
        parent.register_subtask("b", vec!["a".to_string()]).expect("b");
        parent.register_subtask("c", Vec::new()).expect("c");
        assert_eq!(parent.ready_subtasks(), vec!["a", "c"]);

        assert!(parent.mark_subtask_complete("a").expect("mark"));
        assert_eq!(parent.ready_subtasks(), vec!["b", "c"]);
        assert!(!parent.mark_subtask_complete("zzz").expect("unknown"));

        parent.mark_subtask_complete("b").expect("b");
        assert!(!parent.all_subtasks_complete());
        parent.mark_subtask_complete("c").expect("c");
        assert!(parent.all_subtasks_complete());
    }

    #[test]
    fn dispatched_subtasks_are_not_handed_out_twice() {
        let mut parent = state();
        parent.register_subtask("a", Vec::new()).expect("a");
        parent.register_subtask("b", vec!["a".to_string()]).expect("b");
        assert_eq!(parent.undispatched_subtasks(), vec!["a"]);
        parent.mark_subtasks_dispatched(&["a".to_string()]).expect("dispatch");
        assert!(parent.undispatched_subtasks().is_empty());

        parent.mark_subtask_complete("a").expect("a");
        assert!(parent.mark_subtask_complete("a").expect("again"));
        assert_eq!(parent.undispatched_subtasks(), vec!["b"]);
    }

    #[test]
    fn domain_is_classified_once() {
        let mut s = AlgorithmState::new("abc123def456", "draft a reply to the client", None, Utc::now());
        assert_eq!(s.domain_label("general"), "general");
        assert_eq!(s.ensure_domain(), TaskDomain::Correspondence);
        assert_eq!(s.domain_label("general"), "correspondence");
        s.user_query = "fix the failing parser test".to_string();
        assert_eq!(s.ensure_domain(), TaskDomain::Correspondence);
        assert!(s.domain_confidence.is_some_and(|c| c > 0.0 && c <= 1.0));
    }

    #[test]
    fn phase_names_parse() {
        assert_eq!(AlgorithmPhase::parse("observe"), Some(AlgorithmPhase::Observe));
        assert_eq!(AlgorithmPhase::parse("ideal"), Some(AlgorithmPhase::Interview));
        assert_eq!(AlgorithmPhase::parse("nope"), None);
    }
}
