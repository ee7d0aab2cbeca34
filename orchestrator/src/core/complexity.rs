//! Task complexity classification.
//!
//! Classification is a judgment call; [`ComplexityJudge`] is the seam where a
//! caller (usually the invoking agent) plugs its decision in. [`RubricClassifier`]
//! is the bundled keyword rubric evaluated in cascading priority:
//! VERY_COMPLEX, COMPLEX, MODERATE, then TRIVIAL if the strict trivial
//! checklist holds, otherwise SIMPLE.

use crate::core::types::Complexity;

/// Decide the complexity category of a free-text task.
pub trait ComplexityJudge {
    fn classify(&self, task: &str) -> Classification;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub complexity: Complexity,
    /// Rubric trigger that matched.
    pub reason: String,
}

const VERY_COMPLEX_TRIGGERS: &[&str] = &[
    "rewrite",
    "re-architect",
    "rearchitect",
    "from scratch",
    "system-wide",
    "across the codebase",
    "entire codebase",
    "entire system",
    "core architecture",
    "platform migration",
];

const COMPLEX_TRIGGERS: &[&str] = &[
    "migrate",
    "migration",
    "integrate",
    "integration",
    "distributed",
    "multiple services",
    "authentication",
    "authorization",
    "database schema",
    "breaking change",
    "redesign",
];

const MODERATE_TRIGGERS: &[&str] = &[
    "implement",
    "add feature",
    "new feature",
    "endpoint",
    "refactor",
    "add support",
    "new module",
    "optimize",
    "build",
];

/// Nouns that name separate components; three or more means COMPLEX.
const COMPONENT_WORDS: &[&str] = &[
    "api", "database", "frontend", "backend", "ui", "service", "cache", "queue", "auth", "cli",
    "worker", "scheduler",
];

const TRIVIAL_MARKERS: &[&str] = &[
    "typo",
    "spelling",
    "whitespace",
    "comment",
    "bump version",
    "rename variable",
    "formatting",
];

const TRIVIAL_MAX_WORDS: usize = 8;

/// Deterministic keyword rubric.
#[derive(Debug, Clone, Copy, Default)]
pub struct RubricClassifier;

impl ComplexityJudge for RubricClassifier {
    fn classify(&self, task: &str) -> Classification {
        let text = normalize(task);
        if let Some(hit) = first_trigger(&text, VERY_COMPLEX_TRIGGERS) {
            return found(Complexity::VeryComplex, format!("system-wide change ({hit})"));
        }
        if let Some(hit) = first_trigger(&text, COMPLEX_TRIGGERS) {
            return found(Complexity::Complex, format!("cross-component change ({hit})"));
        }
        let components = component_count(&text);
        if components >= 3 {
            return found(
                Complexity::Complex,
                format!("touches {components} dependent components"),
            );
        }
        if let Some(hit) = first_trigger(&text, MODERATE_TRIGGERS) {
            return found(Complexity::Moderate, format!("feature-sized change ({hit})"));
        }
        if is_fully_trivial(&text, components) {
            return found(
                Complexity::Trivial,
                "single-file cosmetic change".to_string(),
            );
        }
        found(Complexity::Simple, "no higher trigger matched".to_string())
    }
}

fn found(complexity: Complexity, reason: String) -> Classification {
    Classification { complexity, reason }
}

fn normalize(task: &str) -> String {
    task.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn first_trigger(text: &str, triggers: &[&'static str]) -> Option<&'static str> {
    triggers.iter().copied().find(|t| text.contains(t))
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric() && c != '-')
        .filter(|w| !w.is_empty())
}

fn component_count(text: &str) -> usize {
    COMPONENT_WORDS
        .iter()
        .filter(|c| words(text).any(|w| w == **c || w.strip_suffix('s') == Some(**c)))
        .count()
}

/// Every item of the checklist must hold.
fn is_fully_trivial(text: &str, components: usize) -> bool {
    let short = words(text).count() <= TRIVIAL_MAX_WORDS;
    let cosmetic = TRIVIAL_MARKERS.iter().any(|m| text.contains(m));
    let isolated = components == 0;
    short && cosmetic && isolated
}

/// Parse an assessor's free-text answer. `None` means no category was named.
pub fn extract_complexity(response: &str) -> Option<Complexity> {
    let text = response.to_lowercase().replace(['-', '_'], " ");
    [
        ("very complex", Complexity::VeryComplex),
        ("complex", Complexity::Complex),
        ("moderate", Complexity::Moderate),
        ("simple", Complexity::Simple),
        ("trivial", Complexity::Trivial),
    ]
    .into_iter()
    .find(|(needle, _)| text.contains(needle))
    .map(|(_, complexity)| complexity)
}
