//! Memory files: the handoff contract between agents.
//!
//! Each agent writes `.claude/memory/{task}-{agent}-memory.md` with numbered
//! sections. A section body runs from the line after its `## Section N:` header
//! to the next section header, a `---` rule, or end of file.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use tracing::debug;

use super::init::OrchestratorPaths;
use super::schema::{QUESTIONS_SCHEMA, parse_validated};
use crate::core::chain_state::{ChainState, FileStamp};
use crate::core::questions::QuestionsPayload;
use crate::core::types::GateVerdict;

static SECTION_HEADER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^## Section (\d+):.*$").expect("section header regex"));

static JSON_BLOCK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```json\s*\n(.*?)```").expect("json block regex"));

static VERDICT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*Verdict:\*\*\s*([A-Za-z][A-Za-z_-]*)").expect("verdict regex")
});

pub const CONTEXT_SECTION: u32 = 0;
pub const DOWNSTREAM_SECTION: u32 = 3;
pub const QUESTIONS_SECTION: u32 = 4;

/// Sections every agent must write.
pub const REQUIRED_SECTIONS: [(u32, &str); 4] = [
    (0, "Context Loaded"),
    (1, "Step Overview"),
    (2, "Johari Summary"),
    (3, "Downstream Directives"),
];

pub const NO_PREDECESSOR_CONTEXT: &str = "No predecessor context available.";

#[derive(Debug, Clone)]
pub struct MemoryFile {
    pub agent: String,
    pub path: PathBuf,
}

impl MemoryFile {
    pub fn new(paths: &OrchestratorPaths, task_id: &str, agent: &str) -> Self {
        Self {
            agent: agent.to_string(),
            path: paths.memory_path(task_id, agent),
        }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Modification time and size, or `None` when the file is absent.
    pub fn stamp(&self) -> Result<Option<FileStamp>> {
        if !self.exists() {
            return Ok(None);
        }
        let metadata = fs::metadata(&self.path)
            .with_context(|| format!("stat memory file {}", self.path.display()))?;
        let modified = metadata
            .modified()
            .with_context(|| format!("modification time of {}", self.path.display()))?;
        Ok(Some(FileStamp {
            modified: DateTime::<Utc>::from(modified),
            len: metadata.len(),
        }))
    }

    pub fn read(&self) -> Result<String> {
        fs::read_to_string(&self.path)
            .with_context(|| format!("read memory file {}", self.path.display()))
    }

    pub fn read_section(&self, number: u32) -> Result<Option<String>> {
        Ok(extract_section(&self.read()?, number))
    }

    /// Section 3, the part downstream agents consume.
    pub fn downstream_directives(&self) -> Result<Option<String>> {
        self.read_section(DOWNSTREAM_SECTION)
    }

    /// First ```json block inside section `number`.
    pub fn json_block(&self, number: u32) -> Result<Option<String>> {
        Ok(self
            .read_section(number)?
            .and_then(|body| extract_json_block(&body)))
    }

    /// Section 4 questions, schema-validated. Absent section means none.
    pub fn open_questions(&self) -> Result<Option<QuestionsPayload>> {
        let Some(raw) = self.json_block(QUESTIONS_SECTION)? else {
            return Ok(None);
        };
        let payload = parse_validated(QUESTIONS_SCHEMA, &raw, "memory questions")
            .with_context(|| format!("questions in {}", self.path.display()))?;
        Ok(Some(payload))
    }

    /// `**Verdict:** X` anywhere in the file.
    pub fn verdict(&self) -> Result<Option<GateVerdict>> {
        Ok(extract_verdict(&self.read()?))
    }
}

pub fn extract_section(text: &str, number: u32) -> Option<String> {
    let headers: Vec<_> = SECTION_HEADER_RE.captures_iter(text).collect();
    let index = headers
        .iter()
        .position(|caps| caps[1].parse::<u32>().ok() == Some(number))?;
    let start = headers[index].get(0)?.end();
    let end = headers
        .get(index + 1)
        .and_then(|caps| caps.get(0))
        .map_or(text.len(), |m| m.start());
    let body = &text[start..end];

    let mut kept = Vec::new();
    for line in body.lines() {
        if line.trim() == "---" {
            break;
        }
        kept.push(line);
    }
    Some(kept.join("\n").trim().to_string())
}

pub fn extract_json_block(text: &str) -> Option<String> {
    JSON_BLOCK_RE
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
}

pub fn extract_verdict(text: &str) -> Option<GateVerdict> {
    VERDICT_RE
        .captures(text)
        .and_then(|caps| GateVerdict::parse(&caps[1]))
}

/// Context block for an agent given its predecessors.
///
/// Only memory files recorded by this chain are read; a file left on disk by
/// an earlier flow for the same task is reported as not available.
pub fn load_predecessor_context(
    chain: &ChainState,
    predecessors: &[String],
    truncate_chars: usize,
) -> Result<String> {
    if predecessors.is_empty() {
        return Ok(NO_PREDECESSOR_CONTEXT.to_string());
    }
    let mut parts = Vec::with_capacity(predecessors.len());
    for agent in predecessors {
        if chain.is_agent_skipped(agent) {
            parts.push(format!("### {agent} (skipped)"));
            continue;
        }
        let Some(recorded) = chain.produced_memory(agent) else {
            parts.push(format!(
                "### {agent} (not available)\nNo memory file produced in flow {}",
                chain.flow_id
            ));
            continue;
        };
        let path = Path::new(recorded);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("read memory file {}", path.display()))?;
        let body = match extract_section(&contents, DOWNSTREAM_SECTION) {
            Some(section) if !section.is_empty() => section,
            _ => truncate(&contents, truncate_chars),
        };
        parts.push(format!("### From {agent}\n{body}"));
    }
    Ok(parts.join("\n\n"))
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("\n... (truncated)");
    out
}

/// Memory files written for `task_id`, sorted by file name.
pub fn task_memory_files(paths: &OrchestratorPaths, task_id: &str) -> Result<Vec<PathBuf>> {
    let dir = &paths.memory_dir;
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let prefix = format!("{task_id}-");
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read directory {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(&prefix) && name.ends_with("-memory.md") {
            files.push(entry.path());
        }
    }
    files.sort();
    debug!(task_id, count = files.len(), "found memory files");
    Ok(files)
}

/// Questions from a memory file at `path`.
pub fn questions_at(path: &Path) -> Result<Option<QuestionsPayload>> {
    let agent = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    MemoryFile {
        agent,
        path: path.to_path_buf(),
    }
    .open_questions()
}
