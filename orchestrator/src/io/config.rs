//! Orchestrator configuration stored at `.claude/orchestrator.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use super::atomic::write_atomic;
use crate::core::agents;

/// Orchestrator configuration (TOML).
///
/// Edited by humans; missing fields fall back to the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// VERIFY -> OBSERVE loop-backs allowed before escalating.
    pub max_verify_iterations: u32,

    /// Decompose validation rounds allowed before escalating.
    pub decompose_max_attempts: u32,

    /// A dispatched agent older than this is reported as stale.
    pub agent_timeout_secs: u64,

    /// Fallback predecessor context is cut at this many characters.
    pub predecessor_truncate_chars: usize,

    pub max_interview_iterations: u32,

    /// Ideal-state completeness needed to leave INTERVIEW.
    pub completeness_threshold: f64,

    /// Domain label printed in agent invocations.
    pub default_domain: String,

    /// Per-agent model overrides (`research = "opus"`).
    pub models: BTreeMap<String, String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_verify_iterations: 3,
            decompose_max_attempts: 3,
            agent_timeout_secs: 30 * 60,
            predecessor_truncate_chars: 2000,
            max_interview_iterations: 5,
            completeness_threshold: 0.95,
            default_domain: "technical".to_string(),
            models: BTreeMap::new(),
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_verify_iterations == 0 {
            return Err(anyhow!("max_verify_iterations must be > 0"));
        }
        if self.decompose_max_attempts == 0 {
            return Err(anyhow!("decompose_max_attempts must be > 0"));
        }
        if self.agent_timeout_secs == 0 {
            return Err(anyhow!("agent_timeout_secs must be > 0"));
        }
        if self.predecessor_truncate_chars == 0 {
            return Err(anyhow!("predecessor_truncate_chars must be > 0"));
        }
        if self.max_interview_iterations == 0 {
            return Err(anyhow!("max_interview_iterations must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.completeness_threshold) {
            return Err(anyhow!("completeness_threshold must be within 0.0..=1.0"));
        }
        if self.default_domain.trim().is_empty() {
            return Err(anyhow!("default_domain must not be empty"));
        }
        for (agent, model) in &self.models {
            if !agents::is_known(agent) {
                return Err(anyhow!("models.{agent}: unknown agent"));
            }
            if model.trim().is_empty() {
                return Err(anyhow!("models.{agent}: model must not be empty"));
            }
        }
        Ok(())
    }

    /// Model for `agent`: config override, then registry, then default.
    pub fn model_for(&self, agent: &str) -> String {
        self.models
            .get(agents::canonical_name(agent))
            .cloned()
            .unwrap_or_else(|| agents::model_for(agent).to_string())
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `OrchestratorConfig::default()`.
pub fn load_config(path: &Path) -> Result<OrchestratorConfig> {
    if !path.exists() {
        let cfg = OrchestratorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: OrchestratorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &OrchestratorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, OrchestratorConfig::default());
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("orchestrator.toml");
        let mut cfg = OrchestratorConfig::default();
        cfg.models.insert("research".to_string(), "opus".to_string());
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
        assert_eq!(loaded.model_for("research-agent"), "opus");
        assert_eq!(loaded.model_for("memory"), "haiku");
    }

    /// Partial files keep defaults for every omitted field.
    #[test]
    fn partial_file_uses_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("orchestrator.toml");
        fs::write(&path, "decompose_max_attempts = 5\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.decompose_max_attempts, 5);
        assert_eq!(cfg.max_verify_iterations, 3);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("orchestrator.toml");
        fs::write(&path, "completeness_threshold = 1.5\n").expect("write");
        let err = load_config(&path).expect_err("invalid");
        assert!(format!("{err:#}").contains("completeness_threshold"));

        fs::write(&path, "[models]\noracle = \"opus\"\n").expect("write");
        assert!(load_config(&path).is_err());
    }
}
