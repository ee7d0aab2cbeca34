//! Session state storage: algorithm, TDD and scaffold-docs sessions.
//!
//! Each session owns one JSON file, so independent sessions never contend.
//! Every save appends the record to the journal first, then replaces the file
//! atomically.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use rand::Rng;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::atomic::write_json_atomic;
use super::init::OrchestratorPaths;
use super::journal::{JournalEntry, RecordKind, append_entry};
use crate::core::algorithm::AlgorithmState;
use crate::core::scaffold::ScaffoldState;
use crate::core::tdd::TddState;

pub const SESSION_ID_LEN: usize = 12;

/// Random lowercase hex token of `len` characters.
pub fn random_hex(len: usize) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..len)
        .map(|_| char::from(HEX[rng.gen_range(0..HEX.len())]))
        .collect()
}

pub fn new_session_id() -> String {
    random_hex(SESSION_ID_LEN)
}

/// Session ids end up in file names; reject anything that is not a plain token.
pub fn validate_id(id: &str) -> Result<()> {
    let ok = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !ok {
        bail!("invalid id {id:?}: expected letters, digits, '-' or '_'");
    }
    Ok(())
}

pub(crate) fn save_record<T: Serialize>(
    paths: &OrchestratorPaths,
    kind: RecordKind,
    id: &str,
    path: &Path,
    value: &T,
    event: &str,
) -> Result<()> {
    debug!(path = %path.display(), id, event, "saving state");
    let record = serde_json::to_value(value).context("serialize record for the journal")?;
    append_entry(
        &paths.journal_path,
        &JournalEntry {
            timestamp: Utc::now(),
            kind,
            id: id.to_string(),
            event: event.to_string(),
            record: Some(record),
        },
    )?;
    write_json_atomic(path, value)
}

pub(crate) fn load_record<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    debug!(path = %path.display(), what, "loading state");
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {what} {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {what} {}", path.display()))
}

fn require_exists(path: &Path, what: &str, id: &str) -> Result<()> {
    if !path.exists() {
        bail!("{what} {id} not found ({})", path.display());
    }
    Ok(())
}

pub fn save_session(paths: &OrchestratorPaths, state: &AlgorithmState, event: &str) -> Result<()> {
    save_record(
        paths,
        RecordKind::Session,
        &state.session_id,
        &paths.session_path(&state.session_id),
        state,
        event,
    )
}

pub fn load_session(paths: &OrchestratorPaths, session_id: &str) -> Result<AlgorithmState> {
    validate_id(session_id)?;
    let path = paths.session_path(session_id);
    require_exists(&path, "session", session_id)?;
    load_record(&path, "session")
}

pub fn save_tdd(paths: &OrchestratorPaths, state: &TddState, event: &str) -> Result<()> {
    save_record(
        paths,
        RecordKind::Tdd,
        &state.session_id,
        &paths.tdd_path(&state.session_id),
        state,
        event,
    )
}

pub fn load_tdd(paths: &OrchestratorPaths, session_id: &str) -> Result<TddState> {
    validate_id(session_id)?;
    let path = paths.tdd_path(session_id);
    require_exists(&path, "tdd session", session_id)?;
    load_record(&path, "tdd session")
}

pub fn save_scaffold(paths: &OrchestratorPaths, state: &ScaffoldState, event: &str) -> Result<()> {
    save_record(
        paths,
        RecordKind::Scaffold,
        &state.session_id,
        &paths.scaffold_path(&state.session_id),
        state,
        event,
    )
}

pub fn load_scaffold(paths: &OrchestratorPaths, session_id: &str) -> Result<ScaffoldState> {
    validate_id(session_id)?;
    let path = paths.scaffold_path(session_id);
    require_exists(&path, "scaffold session", session_id)?;
    load_record(&path, "scaffold session")
}
