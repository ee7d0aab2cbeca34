//! Test-only helpers for building orchestrator workspaces.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tempfile::TempDir;

use crate::core::algorithm::{AlgorithmPhase, AlgorithmState};
use crate::core::types::Complexity;
use crate::io::config::OrchestratorConfig;
use crate::io::init::{InitOptions, OrchestratorPaths, init_orchestrator};
use crate::io::session_store::save_session;

/// Temporary project root with an initialized `.claude/` tree.
pub struct TestWorkspace {
    pub dir: TempDir,
    pub paths: OrchestratorPaths,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let paths = init_orchestrator(dir.path(), &InitOptions { force: false }).expect("init");
        Self { dir, paths }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn config(&self) -> OrchestratorConfig {
        OrchestratorConfig::default()
    }

    /// Write the memory file `agent` produces for `task_id`.
    pub fn write_memory(&self, task_id: &str, agent: &str, contents: &str) -> PathBuf {
        let path = self.paths.memory_path(task_id, agent);
        fs::write(&path, contents).expect("write memory file");
        path
    }

    /// Write protocol content under `.claude/content/`.
    pub fn write_content(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.paths.content_path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create content dir");
        }
        fs::write(&path, contents).expect("write content");
        path
    }

    /// Write an arbitrary file relative to the workspace root.
    pub fn write_file(&self, relative: &str, contents: &str) -> PathBuf {
        let path = self.root().join(relative);
        fs::write(&path, contents).expect("write file");
        path
    }

    /// Save a fresh algorithm session and return it.
    pub fn session(&self, id: &str, query: &str, complexity: Complexity) -> AlgorithmState {
        let state = AlgorithmState::new(id, query, Some(complexity), Utc::now());
        save_session(&self.paths, &state, "test session").expect("save session");
        state
    }

    /// Save a session walked forward from INITIALIZED to `phase`.
    pub fn session_at(
        &self,
        id: &str,
        query: &str,
        complexity: Complexity,
        phase: AlgorithmPhase,
    ) -> AlgorithmState {
        let mut state = AlgorithmState::new(id, query, Some(complexity), Utc::now());
        for step in FORWARD {
            if state.current_phase == phase {
                break;
            }
            state.start_phase(step, Utc::now()).expect("advance");
        }
        save_session(&self.paths, &state, "test session").expect("save session");
        state
    }
}

const FORWARD: [AlgorithmPhase; 10] = [
    AlgorithmPhase::Gather,
    AlgorithmPhase::Interview,
    AlgorithmPhase::Observe,
    AlgorithmPhase::Think,
    AlgorithmPhase::Plan,
    AlgorithmPhase::Build,
    AlgorithmPhase::Execute,
    AlgorithmPhase::Verify,
    AlgorithmPhase::Learn,
    AlgorithmPhase::Completed,
];

impl Default for TestWorkspace {
    fn default() -> Self {
        Self::new()
    }
}

/// Memory file body with the four required sections and `directives` in Section 3.
pub fn memory_body(agent: &str, directives: &str) -> String {
    format!(
        "# {agent} memory\n\n\
         ## Section 0: Context Loaded\nloaded\n\n\
         ## Section 1: Step Overview\n{agent} ran\n\n\
         ## Section 2: Johari Summary\nnothing unknown\n\n\
         ## Section 3: Downstream Directives\n{directives}\n"
    )
}
