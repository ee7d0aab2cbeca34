//! Ad-hoc flows composed from registered agents.

use anyhow::{Result, bail};

use crate::core::agents;
use crate::core::flow::{AgentFlow, ContextPattern, FlowSource, FlowStep};

/// Prefix of generated dynamic flow ids (`dynamic-1a2b3c4d`).
pub const DYNAMIC_PREFIX: &str = "dynamic-";

/// Linear flow: the first agent sees only the workflow, each later agent its
/// immediate predecessor.
pub fn create_dynamic_flow(name: &str, agent_names: &[&str], flow_id: &str) -> Result<AgentFlow> {
    let mut steps = Vec::with_capacity(agent_names.len());
    let mut previous: Option<&str> = None;
    for raw in agent_names {
        let agent = agents::canonical_name(raw);
        let step = match previous {
            None => FlowStep::new(agent, ContextPattern::WorkflowOnly, &[]),
            Some(prev) => FlowStep::new(agent, ContextPattern::ImmediatePredecessors, &[prev]),
        };
        steps.push(step);
        previous = Some(agent);
    }
    build(name, flow_id, steps)
}

/// Flow with explicit context patterns, `(agent, pattern, predecessors)`.
pub fn create_dynamic_flow_with_context(
    name: &str,
    specs: &[(&str, ContextPattern, &[&str])],
    flow_id: &str,
) -> Result<AgentFlow> {
    let steps = specs
        .iter()
        .map(|(agent, pattern, predecessors)| {
            let canonical: Vec<&str> = predecessors
                .iter()
                .map(|p| agents::canonical_name(p))
                .collect();
            FlowStep::new(agents::canonical_name(agent), *pattern, &canonical)
        })
        .collect();
    build(name, flow_id, steps)
}

fn build(name: &str, flow_id: &str, steps: Vec<FlowStep>) -> Result<AgentFlow> {
    if steps.is_empty() {
        bail!("dynamic flow {flow_id} needs at least one agent");
    }
    let unknown: Vec<&str> = steps
        .iter()
        .map(|step| step.agent_name.as_str())
        .filter(|agent| !agents::is_known(agent))
        .collect();
    if !unknown.is_empty() {
        let known: Vec<&str> = agents::AGENTS.iter().map(|a| a.name).collect();
        bail!(
            "unknown agent(s) {}; known agents: {}",
            unknown.join(", "),
            known.join(", ")
        );
    }
    let flow = AgentFlow {
        flow_id: flow_id.to_string(),
        name: name.to_string(),
        steps,
        source: FlowSource::Dynamic,
    };
    let errors = flow.validate();
    if !errors.is_empty() {
        bail!("invalid dynamic flow: {}", errors.join("; "));
    }
    Ok(flow)
}

pub const PRESETS: &[&str] = &[
    "clarify-generate",
    "research-synthesize",
    "full-cognitive",
    "analysis-flow",
];

/// Preset dynamic flow by name.
pub fn preset(name: &str, flow_id: &str) -> Result<AgentFlow> {
    use ContextPattern::{ImmediatePredecessors as I, MultiplePredecessors as M, WorkflowOnly as W};
    match name {
        "clarify-generate" => {
            create_dynamic_flow("Clarify and Generate", &["clarification", "generation"], flow_id)
        }
        "research-synthesize" => create_dynamic_flow(
            "Research and Synthesize",
            &["research", "analysis", "synthesis"],
            flow_id,
        ),
        "full-cognitive" => {
            let specs: [(&str, ContextPattern, &[&str]); 6] = [
                ("clarification", W, &[]),
                ("research", I, &["clarification"]),
                ("analysis", I, &["research"]),
                ("synthesis", M, &["clarification", "research", "analysis"]),
                ("generation", I, &["synthesis"]),
                ("validation", M, &["synthesis", "generation"]),
            ];
            create_dynamic_flow_with_context("Full Cognitive Chain", &specs, flow_id)
        }
        "analysis-flow" => create_dynamic_flow(
            "Analysis Flow",
            &["research", "analysis", "validation"],
            flow_id,
        ),
        other => bail!("unknown preset {other}; presets: {}", PRESETS.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linear_flow_chains_immediate_predecessors() {
        let flow =
            create_dynamic_flow("Adhoc", &["research-agent", "analysis"], "dynamic-0000abcd")
                .expect("flow");
        assert_eq!(flow.source, FlowSource::Dynamic);
        assert_eq!(flow.agent_names(), vec!["research", "analysis"]);
        assert_eq!(flow.steps[0].context_pattern, ContextPattern::WorkflowOnly);
        assert_eq!(flow.steps[1].predecessors, vec!["research"]);
    }

    #[test]
    fn unknown_agents_are_rejected() {
        let err = create_dynamic_flow("Adhoc", &["research", "oracle"], "dynamic-1")
            .expect_err("unknown");
        assert!(err.to_string().contains("unknown agent(s) oracle"));
        assert!(create_dynamic_flow("Empty", &[], "dynamic-2").is_err());
    }

    #[test]
    fn presets_build() {
        for name in PRESETS {
            let flow = preset(name, "dynamic-preset").expect("preset");
            assert!(flow.validate().is_empty());
        }
        let full = preset("full-cognitive", "dynamic-full").expect("full");
        assert_eq!(full.steps.len(), 6);
        assert_eq!(
            full.steps[5].context_pattern,
            ContextPattern::MultiplePredecessors
        );
        assert!(preset("nope", "dynamic-x").is_err());
    }
}
