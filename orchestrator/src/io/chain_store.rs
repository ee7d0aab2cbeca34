//! Chain state and dynamic flow storage.

use std::fs;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info};

use super::init::OrchestratorPaths;
use super::journal::RecordKind;
use super::session_store::{load_record, save_record, validate_id};
use crate::core::chain_state::ChainState;
use crate::core::flow::AgentFlow;
use crate::core::flow_defs;

/// Chain for `task_id`, if one was ever started.
pub fn load_chain(paths: &OrchestratorPaths, task_id: &str) -> Result<Option<ChainState>> {
    validate_id(task_id)?;
    let path = paths.chain_path(task_id);
    if !path.exists() {
        return Ok(None);
    }
    load_record(&path, "chain state").map(Some)
}

pub fn save_chain(paths: &OrchestratorPaths, chain: &ChainState, event: &str) -> Result<()> {
    save_record(
        paths,
        RecordKind::Chain,
        &chain.task_id,
        &paths.chain_path(&chain.task_id),
        chain,
        event,
    )
}

/// Move the live chain file aside as `chain-{task}.{flow}.json`.
pub fn archive_chain(paths: &OrchestratorPaths, chain: &ChainState) -> Result<()> {
    let from = paths.chain_path(&chain.task_id);
    if !from.exists() {
        return Ok(());
    }
    let to = paths.chain_archive_path(&chain.task_id, &chain.flow_id);
    fs::rename(&from, &to)
        .with_context(|| format!("archive chain {} -> {}", from.display(), to.display()))?;
    info!(task_id = %chain.task_id, flow_id = %chain.flow_id, "archived chain state");
    Ok(())
}

pub fn save_flow(paths: &OrchestratorPaths, flow: &AgentFlow) -> Result<()> {
    validate_id(&flow.flow_id)?;
    save_record(
        paths,
        RecordKind::Flow,
        &flow.flow_id,
        &paths.flow_path(&flow.flow_id),
        flow,
        "flow registered",
    )
}

/// Predefined flow, else a persisted dynamic flow.
pub fn resolve_flow(paths: &OrchestratorPaths, flow_id: &str) -> Result<AgentFlow> {
    if let Some(flow) = flow_defs::predefined(flow_id) {
        return Ok(flow);
    }
    validate_id(flow_id)?;
    let path = paths.flow_path(flow_id);
    if !path.exists() {
        return Err(anyhow!(
            "unknown flow {flow_id}; predefined flows: {}",
            flow_defs::FLOW_IDS.join(", ")
        ));
    }
    debug!(flow_id, "loading persisted flow");
    load_record(&path, "flow")
}

/// Dynamic flows persisted under `state/flows/`, sorted by id.
pub fn persisted_flows(paths: &OrchestratorPaths) -> Result<Vec<AgentFlow>> {
    let dir = &paths.flows_dir;
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut ids = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read directory {}", dir.display()))? {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(id) = name.strip_suffix(".json") {
            ids.push(id.to_string());
        }
    }
    ids.sort();
    ids.iter()
        .map(|id| load_record(&paths.flow_path(id), "flow"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::chain_state::ChainContext;
    use crate::core::dynamic::create_dynamic_flow;
    use chrono::Utc;

    fn chain(flow_id: &str) -> ChainState {
        ChainState::new(
            "abc123def456",
            flow_id,
            ChainContext {
                domain: "technical".to_string(),
                task_description: "Build API".to_string(),
                ..ChainContext::default()
            },
            Utc::now(),
        )
    }

    #[test]
    fn chain_round_trips_and_archives() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = OrchestratorPaths::new(temp.path());
        assert!(load_chain(&paths, "abc123def456").expect("none").is_none());

        let mut state = chain("outer-loop-gather");
        state.mark_learnings_injected("research");
        save_chain(&paths, &state, "start").expect("save");
        assert_eq!(load_chain(&paths, "abc123def456").expect("load"), Some(state.clone()));

        archive_chain(&paths, &state).expect("archive");
        assert!(load_chain(&paths, "abc123def456").expect("gone").is_none());
        assert!(
            paths
                .chain_archive_path("abc123def456", "outer-loop-gather")
                .is_file()
        );
    }

    /// Dynamic flows survive across processes via the flow directory.
    #[test]
    fn dynamic_flows_resolve_from_disk() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = OrchestratorPaths::new(temp.path());
        let flow = create_dynamic_flow("Adhoc", &["research", "synthesis"], "dynamic-0badf00d")
            .expect("flow");
        save_flow(&paths, &flow).expect("save");
        assert_eq!(resolve_flow(&paths, "dynamic-0badf00d").expect("resolve"), flow);
        assert_eq!(persisted_flows(&paths).expect("list"), vec![flow.clone()]);
        assert_eq!(
            resolve_flow(&paths, "outer-loop-verify").expect("predefined").steps.len(),
            1
        );
        assert!(resolve_flow(&paths, "dynamic-missing").is_err());
    }
}
