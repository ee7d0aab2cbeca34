//! Predefined skill flows.

use crate::core::flow::{AgentFlow, FlowSource, FlowStep};

use crate::core::flow::ContextPattern::{
    ImmediatePredecessors as Immediate, MultiplePredecessors as Multiple, WorkflowOnly,
};

pub const DECOMPOSE_FLOW: &str = "decompose-protocol";
pub const AGGREGATION_FLOW: &str = "decompose-aggregation";
pub const GATHER_FLOW: &str = "outer-loop-gather";
pub const INTERVIEW_FLOW: &str = "outer-loop-interview";
pub const INTERVIEW_REFINEMENT_FLOW: &str = "outer-loop-interview-refinement";
pub const VERIFY_FLOW: &str = "outer-loop-verify";

pub const FLOW_IDS: &[&str] = &[
    DECOMPOSE_FLOW,
    AGGREGATION_FLOW,
    "perform-tdd-red",
    "perform-tdd-green",
    "perform-tdd-refactor",
    "perform-tdd-doc",
    "scaffold-docs-scaffold",
    "scaffold-docs-update",
    GATHER_FLOW,
    INTERVIEW_FLOW,
    INTERVIEW_REFINEMENT_FLOW,
    VERIFY_FLOW,
];

fn skill_flow(flow_id: &str, name: &str, steps: Vec<FlowStep>) -> AgentFlow {
    AgentFlow {
        flow_id: flow_id.to_string(),
        name: name.to_string(),
        steps,
        source: FlowSource::Skill,
    }
}

/// Predefined flow by id.
pub fn predefined(flow_id: &str) -> Option<AgentFlow> {
    let flow = match flow_id {
        DECOMPOSE_FLOW => skill_flow(
            flow_id,
            "Decompose Protocol",
            vec![
                FlowStep::new("clarification", WorkflowOnly, &[])
                    .with_content("decompose/clarification.md")
                    .conditional(),
                FlowStep::new("analysis", Immediate, &["clarification"])
                    .with_content("decompose/analysis.md"),
                FlowStep::new("synthesis", Immediate, &["analysis"])
                    .with_content("decompose/synthesis.md"),
                FlowStep::new("validation", Multiple, &["analysis", "synthesis"])
                    .with_content("decompose/validation.md"),
            ],
        ),
        AGGREGATION_FLOW => skill_flow(
            flow_id,
            "Decompose Aggregation",
            vec![
                FlowStep::new("synthesis", WorkflowOnly, &[])
                    .with_content("aggregation/synthesis.md"),
            ],
        ),
        "perform-tdd-red" => skill_flow(
            flow_id,
            "TDD RED",
            vec![
                FlowStep::new("clarification", WorkflowOnly, &[])
                    .with_content("tdd/red/clarification.md")
                    .conditional(),
                FlowStep::new("research", Immediate, &["clarification"])
                    .with_content("tdd/red/research.md"),
                FlowStep::new("analysis", Immediate, &["research"])
                    .with_content("tdd/red/analysis.md"),
                FlowStep::new(
                    "generation",
                    Multiple,
                    &["clarification", "research", "analysis"],
                )
                .with_content("tdd/red/generation.md"),
            ],
        ),
        "perform-tdd-green" => verify_cycle(flow_id, "TDD GREEN", "green"),
        "perform-tdd-refactor" => verify_cycle(flow_id, "TDD REFACTOR", "refactor"),
        "perform-tdd-doc" => skill_flow(
            flow_id,
            "TDD DOC",
            vec![
                FlowStep::new("analysis", WorkflowOnly, &[]).with_content("tdd/doc/analysis.md"),
                FlowStep::new("generation", Immediate, &["analysis"])
                    .with_content("tdd/doc/generation.md"),
            ],
        ),
        "scaffold-docs-scaffold" => skill_flow(
            flow_id,
            "Scaffold Docs (scaffold)",
            vec![
                FlowStep::new("clarification", WorkflowOnly, &[])
                    .with_content("scaffold/clarification.md"),
                FlowStep::new("analysis", Immediate, &["clarification"])
                    .with_content("scaffold/analysis.md"),
                FlowStep::new("synthesis", Multiple, &["clarification", "analysis"])
                    .with_content("scaffold/synthesis.md"),
                FlowStep::new(
                    "validation",
                    Multiple,
                    &["clarification", "analysis", "synthesis"],
                )
                .with_content("scaffold/validation.md"),
            ],
        ),
        "scaffold-docs-update" => skill_flow(
            flow_id,
            "Scaffold Docs (update)",
            vec![
                FlowStep::new("analysis", WorkflowOnly, &[]).with_content("scaffold/update-analysis.md"),
                FlowStep::new("synthesis", Immediate, &["analysis"])
                    .with_content("scaffold/update-synthesis.md"),
                FlowStep::new("validation", Multiple, &["analysis", "synthesis"])
                    .with_content("scaffold/update-validation.md"),
            ],
        ),
        GATHER_FLOW => skill_flow(
            flow_id,
            "Outer Loop GATHER",
            vec![
                FlowStep::new("research", WorkflowOnly, &[]).with_content("gather/research.md"),
                FlowStep::new("analysis", Immediate, &["research"])
                    .with_content("gather/analysis.md"),
            ],
        ),
        INTERVIEW_FLOW => skill_flow(
            flow_id,
            "Outer Loop INTERVIEW",
            vec![
                FlowStep::new("clarification", WorkflowOnly, &[])
                    .with_content("interview/clarification.md"),
                FlowStep::new("validation", Immediate, &["clarification"])
                    .with_content("interview/validation.md"),
            ],
        ),
        INTERVIEW_REFINEMENT_FLOW => skill_flow(
            flow_id,
            "Outer Loop INTERVIEW Refinement",
            vec![
                FlowStep::new("analysis", WorkflowOnly, &[])
                    .with_content("interview/refine-analysis.md"),
                FlowStep::new("clarification", Immediate, &["analysis"])
                    .with_content("interview/refine-clarification.md"),
                FlowStep::new("validation", Multiple, &["analysis", "clarification"])
                    .with_content("interview/refine-validation.md"),
            ],
        ),
        VERIFY_FLOW => skill_flow(
            flow_id,
            "Outer Loop VERIFY",
            vec![FlowStep::new("validation", WorkflowOnly, &[]).with_content("verify/validation.md")],
        ),
        _ => return None,
    };
    Some(flow)
}

fn verify_cycle(flow_id: &str, name: &str, phase: &str) -> AgentFlow {
    skill_flow(
        flow_id,
        name,
        vec![
            FlowStep::new("analysis", WorkflowOnly, &[])
                .with_content(&format!("tdd/{phase}/analysis.md")),
            FlowStep::new("generation", Immediate, &["analysis"])
                .with_content(&format!("tdd/{phase}/generation.md")),
            FlowStep::new("validation", Multiple, &["analysis", "generation"])
                .with_content(&format!("tdd/{phase}/validation.md")),
        ],
    )
}
