//! Decompose protocol: phase table, subtask records and GO/NO-GO review.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::fsm::{Protocol, StateError, transition};
use crate::core::types::{Complexity, GateVerdict};

static SUBTASK_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ST-\d{3}$").expect("subtask id regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecomposePhase {
    Initialized,
    Clarification,
    Analysis,
    Synthesis,
    Validation,
    Go,
    NoGo,
}

impl DecomposePhase {
    pub fn label(self) -> &'static str {
        match self {
            DecomposePhase::Initialized => "INITIALIZED",
            DecomposePhase::Clarification => "CLARIFICATION",
            DecomposePhase::Analysis => "ANALYSIS",
            DecomposePhase::Synthesis => "SYNTHESIS",
            DecomposePhase::Validation => "VALIDATION",
            DecomposePhase::Go => "GO",
            DecomposePhase::NoGo => "NO_GO",
        }
    }
}

pub struct DecomposeProtocol;

impl Protocol for DecomposeProtocol {
    type Phase = DecomposePhase;
    const NAME: &'static str = "decompose";

    fn phases() -> &'static [DecomposePhase] {
        use DecomposePhase as P;
        &[
            P::Initialized,
            P::Clarification,
            P::Analysis,
            P::Synthesis,
            P::Validation,
            P::Go,
            P::NoGo,
        ]
    }

    fn successors(phase: DecomposePhase) -> &'static [DecomposePhase] {
        use DecomposePhase as P;
        match phase {
            P::Initialized => &[P::Clarification, P::Analysis],
            P::Clarification => &[P::Analysis],
            P::Analysis => &[P::Synthesis],
            P::Synthesis => &[P::Validation],
            P::Validation => &[P::Go, P::NoGo],
            P::NoGo => &[P::Synthesis],
            P::Go => &[],
        }
    }

    fn label(phase: DecomposePhase) -> &'static str {
        phase.label()
    }
}

/// Decompose progress kept on the parent session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecomposeProgress {
    pub phase: DecomposePhase,
    /// Completed validation rounds, GO or NO-GO.
    #[serde(default)]
    pub attempts: u32,
}

impl Default for DecomposeProgress {
    fn default() -> Self {
        Self {
            phase: DecomposePhase::Initialized,
            attempts: 0,
        }
    }
}

impl DecomposeProgress {
    pub fn advance_to(&mut self, target: DecomposePhase) -> Result<(), StateError> {
        if DecomposeProtocol::is_terminal(self.phase) {
            return Err(StateError::Terminal {
                protocol: DecomposeProtocol::NAME,
                id: self.phase.label().to_string(),
            });
        }
        transition::<DecomposeProtocol>(self.phase, target)?;
        if target == DecomposePhase::Go || target == DecomposePhase::NoGo {
            self.attempts += 1;
        }
        self.phase = target;
        Ok(())
    }

    /// Walk forward along the table until `target`, taking the first successor
    /// at each step. Used to catch up once the agent flow already ran.
    pub fn advance_through(&mut self, target: DecomposePhase) -> Result<(), StateError> {
        let mut guard = DecomposeProtocol::phases().len();
        while self.phase != target {
            if guard == 0 {
                break;
            }
            guard -= 1;
            let next = match self.phase {
                DecomposePhase::Initialized => DecomposePhase::Analysis,
                DecomposePhase::Validation => target,
                other => match DecomposeProtocol::successors(other).first() {
                    Some(next) => *next,
                    None => break,
                },
            };
            self.advance_to(next)?;
        }
        Ok(())
    }
}

/// One subtask proposed by the synthesis agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubtaskSpec {
    pub subtask_id: String,
    pub description: String,
    pub complexity: Complexity,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub verification_criteria: Vec<String>,
    #[serde(default)]
    pub context: Value,
}

/// Deterministic findings for a proposed decomposition; empty means valid.
pub fn validate_subtasks(subtasks: &[SubtaskSpec]) -> Vec<String> {
    let mut errors = Vec::new();
    if subtasks.len() < 2 {
        errors.push(format!(
            "decomposition must produce at least 2 subtasks (got {})",
            subtasks.len()
        ));
    }

    let mut ids = BTreeSet::new();
    let mut descriptions = BTreeSet::new();
    for subtask in subtasks {
        let id = subtask.subtask_id.as_str();
        if !SUBTASK_ID_RE.is_match(id) {
            errors.push(format!("{id}: id must match ST-NNN"));
        }
        if !ids.insert(id) {
            errors.push(format!("{id}: duplicate subtask id"));
        }
        if subtask.complexity != Complexity::Simple {
            errors.push(format!(
                "{id}: complexity must be simple (got {})",
                subtask.complexity.as_str()
            ));
        }
        let description = subtask.description.trim();
        if description.is_empty() {
            errors.push(format!("{id}: description is empty"));
        } else if !descriptions.insert(description.to_lowercase()) {
            errors.push(format!("{id}: description duplicates another subtask"));
        }
        if subtask.verification_criteria.iter().all(|c| c.trim().is_empty()) {
            errors.push(format!("{id}: at least one verification criterion is required"));
        }
    }

    let mut graph_ok = true;
    for subtask in subtasks {
        for dep in &subtask.dependencies {
            if dep == &subtask.subtask_id {
                errors.push(format!("{}: depends on itself", subtask.subtask_id));
                graph_ok = false;
            } else if !ids.contains(dep.as_str()) {
                errors.push(format!(
                    "{}: unknown dependency {dep}",
                    subtask.subtask_id
                ));
                graph_ok = false;
            }
        }
    }

    if !subtasks.is_empty() && subtasks.iter().all(|s| !s.dependencies.is_empty()) {
        errors.push("no entry point: every subtask has dependencies".to_string());
    }
    if graph_ok {
        if let Some(cycle) = find_cycle(subtasks) {
            errors.push(format!("dependency cycle: {}", cycle.join(" -> ")));
        }
    }
    errors
}

/// First cycle found by depth-first search, as a closed path of ids.
fn find_cycle(subtasks: &[SubtaskSpec]) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn visit<'a>(
        id: &'a str,
        edges: &BTreeMap<&'a str, Vec<&'a str>>,
        marks: &mut BTreeMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> Option<Vec<String>> {
        match marks.get(id) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|s| *s == id).unwrap_or(0);
                let mut cycle: Vec<String> = stack[start..].iter().map(|s| s.to_string()).collect();
                cycle.push(id.to_string());
                return Some(cycle);
            }
            None => {}
        }
        marks.insert(id, Mark::Visiting);
        stack.push(id);
        for dep in edges.get(id).into_iter().flatten() {
            if let Some(cycle) = visit(dep, edges, marks, stack) {
                return Some(cycle);
            }
        }
        stack.pop();
        marks.insert(id, Mark::Done);
        None
    }

    let edges: BTreeMap<&str, Vec<&str>> = subtasks
        .iter()
        .map(|s| {
            (
                s.subtask_id.as_str(),
                s.dependencies.iter().map(String::as_str).collect(),
            )
        })
        .collect();
    let mut marks = BTreeMap::new();
    for subtask in subtasks {
        let mut stack = Vec::new();
        if let Some(cycle) = visit(subtask.subtask_id.as_str(), &edges, &mut marks, &mut stack) {
            return Some(cycle);
        }
    }
    None
}

/// Combined GO/NO-GO outcome of a validation round.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecompositionReview {
    pub verdict: GateVerdict,
    pub agent_verdict: Option<GateVerdict>,
    pub findings: Vec<String>,
}

impl DecompositionReview {
    pub fn is_go(&self) -> bool {
        self.verdict == GateVerdict::Go
    }

    /// Items the synthesis agent must address on retry.
    pub fn remediation(&self) -> Vec<String> {
        let mut items = self.findings.clone();
        if self.agent_verdict == Some(GateVerdict::NoGo) {
            items.push("Validation agent returned NO-GO; address its findings".to_string());
        }
        items
    }
}

/// Merge deterministic findings with the validation agent's verdict.
///
/// Any finding or an agent NO-GO yields NO-GO. CONDITIONAL without findings
/// counts as GO, as does a missing verdict.
pub fn evaluate_decomposition(
    subtasks: &[SubtaskSpec],
    agent_verdict: Option<GateVerdict>,
) -> DecompositionReview {
    let findings = validate_subtasks(subtasks);
    let verdict = if !findings.is_empty() || agent_verdict == Some(GateVerdict::NoGo) {
        GateVerdict::NoGo
    } else {
        GateVerdict::Go
    };
    DecompositionReview {
        verdict,
        agent_verdict,
        findings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::fsm::illegal_pairs;

    fn spec(id: &str, deps: &[&str]) -> SubtaskSpec {
        SubtaskSpec {
            subtask_id: id.to_string(),
            description: format!("Implement {id}"),
            complexity: Complexity::Simple,
            dependencies: deps.iter().map(|d| d.to_string()).collect(),
            verification_criteria: vec!["tests pass".to_string()],
            context: Value::Null,
        }
    }

    #[test]
    fn valid_dag_has_no_findings() {
        let subtasks = vec![spec("ST-001", &[]), spec("ST-002", &["ST-001"])];
        assert!(validate_subtasks(&subtasks).is_empty());
        assert!(evaluate_decomposition(&subtasks, Some(GateVerdict::Go)).is_go());
    }

    /// A two-node cycle is caught and the review is NO-GO.
    #[test]
    fn mutual_dependency_is_no_go() {
        let subtasks = vec![
            spec("ST-001", &[]),
            spec("ST-002", &["ST-003"]),
            spec("ST-003", &["ST-002"]),
        ];
        let review = evaluate_decomposition(&subtasks, Some(GateVerdict::Go));
        assert_eq!(review.verdict, GateVerdict::NoGo);
        assert!(
            review.findings.iter().any(|f| f.starts_with("dependency cycle: ST-002")),
            "{:?}",
            review.findings
        );
    }

    #[test]
    fn cycle_without_entry_point_reports_both() {
        let subtasks = vec![spec("ST-001", &["ST-002"]), spec("ST-002", &["ST-001"])];
        let findings = validate_subtasks(&subtasks);
        assert!(findings.iter().any(|f| f.starts_with("no entry point")));
        assert!(findings.iter().any(|f| f.starts_with("dependency cycle")));
    }

    #[test]
    fn non_simple_subtask_fails() {
        let mut moderate = spec("ST-002", &[]);
        moderate.complexity = Complexity::Moderate;
        let findings = validate_subtasks(&[spec("ST-001", &[]), moderate]);
        assert_eq!(findings, vec!["ST-002: complexity must be simple (got moderate)"]);
    }

    #[test]
    fn structural_findings() {
        let mut dup = spec("ST-001", &["ST-001", "ST-009"]);
        dup.verification_criteria.clear();
        let findings = validate_subtasks(&[spec("ST-001", &[]), dup, spec("bad", &[])]);
        assert!(findings.contains(&"ST-001: duplicate subtask id".to_string()));
        assert!(findings.contains(&"ST-001: description duplicates another subtask".to_string()));
        assert!(findings.contains(&"ST-001: at least one verification criterion is required".to_string()));
        assert!(findings.contains(&"ST-001: depends on itself".to_string()));
        assert!(findings.contains(&"ST-001: unknown dependency ST-009".to_string()));
        assert!(findings.contains(&"bad: id must match ST-NNN".to_string()));
    }

    #[test]
    fn single_subtask_is_rejected() {
        let findings = validate_subtasks(&[spec("ST-001", &[])]);
        assert_eq!(findings, vec!["decomposition must produce at least 2 subtasks (got 1)"]);
    }

    #[test]
    fn conditional_without_findings_is_go_and_agent_no_go_wins() {
        let subtasks = vec![spec("ST-001", &[]), spec("ST-002", &[])];
        assert!(evaluate_decomposition(&subtasks, Some(GateVerdict::Conditional)).is_go());
        let review = evaluate_decomposition(&subtasks, Some(GateVerdict::NoGo));
        assert!(!review.is_go());
        assert_eq!(review.remediation().len(), 1);
    }

    #[test]
    fn illegal_transitions_are_rejected_without_mutation() {
        for (from, to) in illegal_pairs::<DecomposeProtocol>() {
            let mut progress = DecomposeProgress {
                phase: from,
                attempts: 0,
            };
            let before = progress.clone();
            assert!(progress.advance_to(to).is_err(), "{from:?} -> {to:?}");
            assert_eq!(progress, before);
        }
    }

    #[test]
    fn no_go_retries_through_synthesis() {
        let mut progress = DecomposeProgress::default();
        progress.advance_through(DecomposePhase::NoGo).expect("to no-go");
        assert_eq!(progress.phase, DecomposePhase::NoGo);
        assert_eq!(progress.attempts, 1);
        progress.advance_to(DecomposePhase::Synthesis).expect("retry");
        progress.advance_through(DecomposePhase::Go).expect("to go");
        assert_eq!(progress.attempts, 2);
        assert!(DecomposeProtocol::is_terminal(progress.phase));
    }
}
