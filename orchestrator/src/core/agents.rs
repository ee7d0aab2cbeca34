//! Registry of cognitive agents that flows may invoke.

use serde::Serialize;

pub const DEFAULT_MODEL: &str = "sonnet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ContextBudget {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

const DEFAULT_BUDGET: ContextBudget = ContextBudget {
    input_tokens: 2500,
    output_tokens: 2000,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AgentSpec {
    pub name: &'static str,
    pub cognitive_function: &'static str,
    pub model: &'static str,
    pub description: &'static str,
    pub budget: ContextBudget,
}

const fn agent(
    name: &'static str,
    cognitive_function: &'static str,
    model: &'static str,
    description: &'static str,
    input_tokens: u32,
    output_tokens: u32,
) -> AgentSpec {
    AgentSpec {
        name,
        cognitive_function,
        model,
        description,
        budget: ContextBudget {
            input_tokens,
            output_tokens,
        },
    }
}

pub const AGENTS: &[AgentSpec] = &[
    agent(
        "clarification",
        "CLARIFICATION",
        "sonnet",
        "Transforms vague inputs into specific, actionable specifications",
        2000,
        1500,
    ),
    agent(
        "research",
        "RESEARCH",
        "sonnet",
        "Gathers information and evidence from the codebase and sources",
        3000,
        2500,
    ),
    agent(
        "analysis",
        "ANALYSIS",
        "opus",
        "Decomposes problems, maps dependencies and evaluates trade-offs",
        2500,
        2000,
    ),
    agent(
        "synthesis",
        "SYNTHESIS",
        "opus",
        "Integrates findings into coherent designs and plans",
        3000,
        2500,
    ),
    agent(
        "generation",
        "GENERATION",
        "sonnet",
        "Produces artifacts: code, tests and documentation",
        4000,
        8000,
    ),
    agent(
        "validation",
        "VALIDATION",
        "sonnet",
        "Checks artifacts against criteria and issues verdicts",
        2500,
        1500,
    ),
    agent(
        "memory",
        "METACOGNITION",
        "haiku",
        "Tracks progress and detects impasses",
        1500,
        800,
    ),
];

/// Resolve `X-agent` and `goal-memory-agent` aliases to registry names.
pub fn canonical_name(name: &str) -> &str {
    let name = name.trim();
    if name == "goal-memory-agent" {
        return "memory";
    }
    name.strip_suffix("-agent").unwrap_or(name)
}

pub fn lookup(name: &str) -> Option<&'static AgentSpec> {
    let canonical = canonical_name(name);
    AGENTS.iter().find(|spec| spec.name == canonical)
}

pub fn is_known(name: &str) -> bool {
    lookup(name).is_some()
}

pub fn model_for(name: &str) -> &'static str {
    lookup(name).map_or(DEFAULT_MODEL, |spec| spec.model)
}

pub fn budget_for(name: &str) -> ContextBudget {
    lookup(name).map_or(DEFAULT_BUDGET, |spec| spec.budget)
}

pub fn cognitive_function(name: &str) -> &'static str {
    lookup(name).map_or("UNKNOWN", |spec| spec.cognitive_function)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_resolve() {
        assert_eq!(canonical_name("research-agent"), "research");
        assert_eq!(canonical_name("goal-memory-agent"), "memory");
        assert!(is_known("synthesis-agent"));
        assert!(!is_known("oracle"));
    }

    #[test]
    fn unknown_agents_use_defaults() {
        assert_eq!(model_for("analysis"), "opus");
        assert_eq!(model_for("oracle"), DEFAULT_MODEL);
        assert_eq!(budget_for("oracle").input_tokens, 2500);
        assert_eq!(budget_for("generation").output_tokens, 8000);
        assert_eq!(cognitive_function("memory"), "METACOGNITION");
    }
}
