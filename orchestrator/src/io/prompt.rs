//! Directive rendering for agent invocations and routing output.

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

const TASK_TOOL_TEMPLATE: &str = include_str!("prompts/task_tool.md");
const LEARNINGS_TEMPLATE: &str = include_str!("prompts/learnings.md");
const INVOCATION_TEMPLATE: &str = include_str!("prompts/invocation.md");
const ROUTE_TEMPLATE: &str = include_str!("prompts/route.md");
const GATHER_SUBTASK_TEMPLATE: &str = include_str!("prompts/gather_subtask.md");
const COMPLEXITY_TEMPLATE: &str = include_str!("prompts/complexity_assessment.md");

/// Learnings files consulted before an agent acts, in reading order.
pub const LEARNINGS_KINDS: [&str; 3] = ["heuristics", "anti-patterns", "checklists"];

#[derive(Debug, Clone, Serialize)]
struct LearningsFile {
    kind: &'static str,
    path: String,
    prefix: String,
}

#[derive(Debug, Clone, Serialize)]
struct SectionSpec {
    number: u32,
    title: &'static str,
}

/// Everything shown in one `## Agent Invocation` block.
#[derive(Debug, Clone)]
pub struct InvocationInputs<'a> {
    pub agent: &'a str,
    pub cognitive_function: &'a str,
    pub task_id: &'a str,
    pub flow_id: &'a str,
    pub flow_name: &'a str,
    pub skill: Option<&'a str>,
    pub phase: Option<&'a str>,
    pub domain: &'a str,
    pub task: &'a str,
    pub content: &'a str,
    pub predecessor_context: &'a str,
    pub memory_path: &'a str,
    /// Directory holding this agent's learnings, when they must be injected.
    pub learnings_dir: Option<&'a str>,
}

/// Task-tool wrapper parameters.
#[derive(Debug, Clone)]
pub struct TaskToolInputs<'a> {
    pub subagent_type: &'a str,
    pub description: &'a str,
    pub model: &'a str,
    pub prompt: &'a str,
    pub continue_command: &'a str,
}

/// Template engine wrapper around minijinja.
struct PromptEngine {
    env: Environment<'static>,
}

impl PromptEngine {
    fn new() -> Result<Self> {
        let mut env = Environment::new();
        for (name, source) in [
            ("task_tool", TASK_TOOL_TEMPLATE),
            ("learnings", LEARNINGS_TEMPLATE),
            ("invocation", INVOCATION_TEMPLATE),
            ("route", ROUTE_TEMPLATE),
            ("gather_subtask", GATHER_SUBTASK_TEMPLATE),
            ("complexity_assessment", COMPLEXITY_TEMPLATE),
        ] {
            env.add_template(name, source)
                .with_context(|| format!("load template {name}"))?;
        }
        Ok(Self { env })
    }

    fn render(&self, name: &str, ctx: minijinja::Value) -> Result<String> {
        let template = self.env.get_template(name)?;
        template
            .render(ctx)
            .with_context(|| format!("render template {name}"))
    }
}

fn learnings_files(dir: &str) -> Vec<LearningsFile> {
    LEARNINGS_KINDS
        .iter()
        .map(|&kind| LearningsFile {
            kind,
            path: format!("{dir}/{kind}.md"),
            prefix: id_prefix(kind),
        })
        .collect()
}

/// First letter, uppercased (`anti-patterns` -> `A`).
fn id_prefix(kind: &str) -> String {
    kind.chars()
        .next()
        .map(|c| c.to_ascii_uppercase().to_string())
        .unwrap_or_default()
}

fn required_sections() -> Vec<SectionSpec> {
    crate::io::memory::REQUIRED_SECTIONS
        .iter()
        .map(|&(number, title)| SectionSpec { number, title })
        .collect()
}

pub fn render_learnings(agent: &str, learnings_dir: &str) -> Result<String> {
    PromptEngine::new()?.render(
        "learnings",
        context! {
            agent => agent,
            files => learnings_files(learnings_dir),
        },
    )
}

pub fn render_invocation(input: &InvocationInputs<'_>) -> Result<String> {
    let learnings = input
        .learnings_dir
        .map(|dir| render_learnings(input.agent, dir))
        .transpose()?;
    PromptEngine::new()?.render(
        "invocation",
        context! {
            learnings => learnings,
            agent => input.agent,
            cognitive_function => input.cognitive_function,
            task_id => input.task_id,
            flow_id => input.flow_id,
            flow_name => input.flow_name,
            skill => input.skill,
            phase => input.phase,
            domain => input.domain,
            task => input.task.trim(),
            content => input.content.trim(),
            predecessor_context => input.predecessor_context.trim(),
            memory_path => input.memory_path,
            sections => required_sections(),
        },
    )
}

pub fn render_task_tool(input: &TaskToolInputs<'_>) -> Result<String> {
    PromptEngine::new()?.render(
        "task_tool",
        context! {
            subagent_type => input.subagent_type,
            description => input.description,
            model => input.model,
            prompt => indent(input.prompt, "  "),
            continue_command => input.continue_command,
        },
    )
}

/// Which branch of the routing output to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteKind {
    Trivial,
    Algorithm,
    Decompose,
}

impl RouteKind {
    fn as_str(self) -> &'static str {
        match self {
            RouteKind::Trivial => "trivial",
            RouteKind::Algorithm => "algorithm",
            RouteKind::Decompose => "decompose",
        }
    }
}

pub fn render_route(
    kind: RouteKind,
    query: &str,
    complexity: &str,
    session_id: Option<&str>,
    command: Option<&str>,
) -> Result<String> {
    PromptEngine::new()?.render(
        "route",
        context! {
            route => kind.as_str(),
            query => query.trim(),
            complexity => complexity,
            session_id => session_id,
            command => command,
        },
    )
}

pub fn render_gather_subtask(
    subtask_id: &str,
    session_id: &str,
    parent_id: &str,
    description: &str,
    command: &str,
) -> Result<String> {
    PromptEngine::new()?.render(
        "gather_subtask",
        context! {
            subtask_id => subtask_id,
            session_id => session_id,
            parent_id => parent_id,
            description => description.trim(),
            command => command,
        },
    )
}

pub fn render_complexity_assessment(
    query: &str,
    suggestion: &str,
    reason: &str,
    command: &str,
) -> Result<String> {
    PromptEngine::new()?.render(
        "complexity_assessment",
        context! {
            query => query.trim(),
            suggestion => suggestion,
            reason => reason,
            command => command,
        },
    )
}

/// Command block that the driving session must run immediately.
pub fn mandatory_command(command: &str, note: &str) -> String {
    let mut out = format!(
        "**MANDATORY:** Execute the following command NOW. Do NOT respond with text first.\n\n```bash\n{command}\n```"
    );
    if !note.trim().is_empty() {
        out.push_str("\n\n");
        out.push_str(note.trim());
    }
    out
}

/// Prefix every non-empty line with `pad`.
pub fn indent(text: &str, pad: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
