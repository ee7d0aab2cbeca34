//! Canonical `.claude/` layout and `orchestrator init` scaffolding.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};

use super::config::{OrchestratorConfig, write_config};

/// All canonical paths within `.claude/` for a project root.
#[derive(Debug, Clone)]
pub struct OrchestratorPaths {
    pub root: PathBuf,
    pub claude_dir: PathBuf,
    pub state_dir: PathBuf,
    pub sessions_dir: PathBuf,
    pub tdd_dir: PathBuf,
    pub scaffold_dir: PathBuf,
    pub chains_dir: PathBuf,
    pub flows_dir: PathBuf,
    pub journal_path: PathBuf,
    pub memory_dir: PathBuf,
    pub learnings_dir: PathBuf,
    pub content_dir: PathBuf,
    pub config_path: PathBuf,
}

impl OrchestratorPaths {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let claude_dir = root.join(".claude");
        let state_dir = claude_dir.join("state");
        Self {
            root: root.clone(),
            claude_dir: claude_dir.clone(),
            state_dir: state_dir.clone(),
            sessions_dir: state_dir.join("sessions"),
            tdd_dir: state_dir.join("tdd"),
            scaffold_dir: state_dir.join("scaffold"),
            chains_dir: state_dir.join("chains"),
            flows_dir: state_dir.join("flows"),
            journal_path: state_dir.join("journal.jsonl"),
            memory_dir: claude_dir.join("memory"),
            learnings_dir: claude_dir.join("learnings"),
            content_dir: claude_dir.join("content"),
            config_path: claude_dir.join("orchestrator.toml"),
        }
    }

    pub fn session_path(&self, session_id: &str) -> PathBuf {
        self.sessions_dir.join(format!("{session_id}.json"))
    }

    pub fn tdd_path(&self, session_id: &str) -> PathBuf {
        self.tdd_dir.join(format!("{session_id}.json"))
    }

    pub fn scaffold_path(&self, session_id: &str) -> PathBuf {
        self.scaffold_dir.join(format!("{session_id}.json"))
    }

    pub fn chain_path(&self, task_id: &str) -> PathBuf {
        self.chains_dir.join(format!("chain-{task_id}.json"))
    }

    /// Where a replaced chain for `flow_id` is kept.
    pub fn chain_archive_path(&self, task_id: &str, flow_id: &str) -> PathBuf {
        self.chains_dir.join(format!("chain-{task_id}.{flow_id}.json"))
    }

    pub fn flow_path(&self, flow_id: &str) -> PathBuf {
        self.flows_dir.join(format!("{flow_id}.json"))
    }

    pub fn memory_path(&self, task_id: &str, agent: &str) -> PathBuf {
        self.memory_dir.join(format!("{task_id}-{agent}-memory.md"))
    }

    pub fn agent_learnings_dir(&self, agent: &str) -> PathBuf {
        self.learnings_dir.join(agent)
    }

    pub fn content_path(&self, relative: &str) -> PathBuf {
        self.content_dir.join(relative)
    }
}

/// Options for `init_orchestrator`.
#[derive(Debug, Clone)]
pub struct InitOptions {
    /// If true, overwrite the existing config file.
    pub force: bool,
}

/// Create `.claude/` scaffolding in `root`.
///
/// Fails if the config already exists unless `options.force` is set. State,
/// memory and learnings that already exist are left alone.
pub fn init_orchestrator(root: &Path, options: &InitOptions) -> Result<OrchestratorPaths> {
    let paths = OrchestratorPaths::new(root);
    if paths.claude_dir.exists() && !paths.claude_dir.is_dir() {
        return Err(anyhow!(
            "orchestrator init: .claude exists but is not a directory"
        ));
    }
    if paths.config_path.exists() && !options.force {
        return Err(anyhow!(
            "orchestrator init: {} already exists (use --force to overwrite)",
            paths.config_path.display()
        ));
    }

    for dir in [
        &paths.sessions_dir,
        &paths.tdd_dir,
        &paths.scaffold_dir,
        &paths.chains_dir,
        &paths.flows_dir,
        &paths.memory_dir,
        &paths.learnings_dir,
        &paths.content_dir,
    ] {
        create_dir(dir)?;
    }
    write_config(&paths.config_path, &OrchestratorConfig::default())?;
    Ok(paths)
}

fn create_dir(path: &Path) -> Result<()> {
    fs::create_dir_all(path).with_context(|| format!("create directory {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::config::load_config;

    /// Verifies init creates every state directory and a loadable default config.
    #[test]
    fn init_creates_expected_layout() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = init_orchestrator(temp.path(), &InitOptions { force: false }).expect("init");

        assert!(paths.sessions_dir.is_dir());
        assert!(paths.chains_dir.is_dir());
        assert!(paths.flows_dir.is_dir());
        assert!(paths.memory_dir.is_dir());
        assert!(paths.learnings_dir.is_dir());
        assert!(paths.content_dir.is_dir());
        let cfg = load_config(&paths.config_path).expect("load");
        assert_eq!(cfg, OrchestratorConfig::default());
    }

    /// Verifies init refuses to overwrite the config without --force.
    #[test]
    fn init_without_force_refuses_existing_config() {
        let temp = tempfile::tempdir().expect("tempdir");
        init_orchestrator(temp.path(), &InitOptions { force: false }).expect("init");
        let err = init_orchestrator(temp.path(), &InitOptions { force: false }).unwrap_err();
        assert!(err.to_string().contains("already exists"));
        init_orchestrator(temp.path(), &InitOptions { force: true }).expect("force");
    }

    #[test]
    fn paths_follow_layout() {
        let paths = OrchestratorPaths::new("/repo");
        assert_eq!(
            paths.chain_path("abc"),
            Path::new("/repo/.claude/state/chains/chain-abc.json")
        );
        assert_eq!(
            paths.chain_archive_path("abc", "outer-loop-gather"),
            Path::new("/repo/.claude/state/chains/chain-abc.outer-loop-gather.json")
        );
        assert_eq!(
            paths.memory_path("abc", "research"),
            Path::new("/repo/.claude/memory/abc-research-memory.md")
        );
    }
}
