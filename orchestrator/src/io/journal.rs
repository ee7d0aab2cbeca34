//! Append-only audit trail of state writes (`.claude/state/journal.jsonl`).
//!
//! Each entry carries the record exactly as it was saved, so the history of
//! any session or chain can be read back in order. The entry is appended
//! before the state file is replaced. The orchestrator itself only reads the
//! state files and never replays the journal.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Session,
    Tdd,
    Scaffold,
    Chain,
    Flow,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: RecordKind,
    pub id: String,
    pub event: String,
    /// The saved record; absent in entries written before records were kept.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Value>,
}

pub fn append_entry(path: &Path, entry: &JournalEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let mut line = serde_json::to_string(entry).context("serialize journal entry")?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open journal {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("append journal {}", path.display()))?;
    Ok(())
}

/// Read every entry; a missing journal is empty.
pub fn read_entries(path: &Path) -> Result<Vec<JournalEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read journal {}", path.display()))?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(index, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("parse journal {} line {}", path.display(), index + 1))
        })
        .collect()
}
