//! `scaffold start` / `scaffold advance`: the scaffold-docs skill session.

use anyhow::{Result, anyhow, bail};
use chrono::Utc;
use tracing::info;

use crate::core::chain_state::ChainContext;
use crate::core::language::{language_defaults, supported_languages};
use crate::core::scaffold::{ScaffoldMode, ScaffoldPhase, ScaffoldState};
use crate::flow::{NeverSkip, start_flow};
use crate::io::chain_store::{load_chain, resolve_flow};
use crate::io::config::OrchestratorConfig;
use crate::io::detect::{LanguageInfo, detect_frameworks, detect_language};
use crate::io::init::OrchestratorPaths;
use crate::io::session_store::{load_scaffold, new_session_id, save_scaffold};

pub const SKILL_NAME: &str = "scaffold-docs";

fn phase_agent(phase: ScaffoldPhase) -> Option<String> {
    match phase {
        ScaffoldPhase::Initialized | ScaffoldPhase::Completed => None,
        other => Some(other.label().to_lowercase()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaffoldOutcome {
    pub session_id: String,
    pub phase: ScaffoldPhase,
    pub body: String,
}

impl ScaffoldOutcome {
    pub fn render(&self) -> String {
        format!(
            "## SCAFFOLD-DOCS: {}\n\nSession: {}\n\n{}",
            self.phase.label(),
            self.session_id,
            self.body
        )
    }
}

pub fn start_scaffold(
    paths: &OrchestratorPaths,
    config: &OrchestratorConfig,
    mode: ScaffoldMode,
    language: Option<String>,
    use_flow: bool,
) -> Result<ScaffoldOutcome> {
    let now = Utc::now();
    let mut state = ScaffoldState::new(new_session_id(), mode, now);
    let detected = detect_language(&paths.root)?;
    let language = language
        .map(|l| l.trim().to_lowercase())
        .unwrap_or_else(|| detected.language.clone());
    state.detected_frameworks = detect_frameworks(&paths.root, &language)?;
    state.detected_language = Some(language.clone());
    let entry = mode.entry_phase();
    state.advance_to(entry, now)?;
    save_scaffold(paths, &state, &format!("start {}", mode.as_str()))?;
    info!(
        session_id = %state.session_id,
        mode = mode.as_str(),
        language = %language,
        frameworks = state.detected_frameworks.len(),
        "scaffold session started"
    );

    let mut body = format!("- **Mode:** {}\n", mode.as_str());
    body.push_str(&project_summary(&language, &detected, &state.detected_frameworks));
    body.push_str("\n\n");
    if use_flow {
        let flow = resolve_flow(paths, mode.flow_id())?;
        let task = match mode {
            ScaffoldMode::Scaffold => "Scaffold project documentation",
            ScaffoldMode::Update => "Update project documentation to match the code",
        };
        let context = ChainContext {
            skill_name: Some(SKILL_NAME.to_string()),
            phase_id: Some(entry.label().to_string()),
            domain: config.default_domain.clone(),
            task_description: task.to_string(),
        };
        let next = start_flow(paths, config, flow, &state.session_id, context, &NeverSkip)?;
        body.push_str(&next.render());
        body.push_str("\n\n");
    }
    body.push_str(&advance_hint(&state.session_id));
    Ok(ScaffoldOutcome {
        session_id: state.session_id.clone(),
        phase: state.current_phase,
        body,
    })
}

fn project_summary(language: &str, detected: &LanguageInfo, frameworks: &[String]) -> String {
    let mut out = format!("- **Language:** {language}\n");
    if detected.language == language {
        if let Some(manager) = &detected.package_manager {
            out.push_str(&format!("- **Package manager:** {manager}\n"));
        }
        if let Some(manifest) = &detected.manifest_file {
            out.push_str(&format!("- **Manifest:** `{manifest}`\n"));
        }
        if let Some(framework) = &detected.framework {
            out.push_str(&format!("- **Build framework:** {framework}\n"));
        }
    }
    if !frameworks.is_empty() {
        out.push_str(&format!("- **Frameworks:** {}\n", frameworks.join(", ")));
    }
    let defaults = language_defaults(language);
    if defaults.language != language {
        out.push_str(&format!(
            "\nNo defaults for {language}; generic ones follow. Languages with defaults: {}.\n",
            supported_languages().join(", ")
        ));
    }
    out.push('\n');
    out.push_str(&defaults.render());
    out
}

fn advance_hint(session_id: &str) -> String {
    format!(
        "When this phase's agent has finished, run:\n\n```bash\n\
         orchestrator scaffold advance --state {session_id} [--created <file>]... [--updated <file>]...\n```"
    )
}

/// Record produced files and move to the next phase.
///
/// With flows in use the agent named after the current phase must have
/// completed in the mode's agent chain.
pub fn advance_scaffold(
    paths: &OrchestratorPaths,
    session_id: &str,
    created: &[String],
    updated: &[String],
    use_flow: bool,
) -> Result<ScaffoldOutcome> {
    let mut state = load_scaffold(paths, session_id)?;
    let leaving = state.current_phase;
    if let Some(agent) = phase_agent(leaving).filter(|_| use_flow) {
        let flow_id = state.mode.flow_id();
        let done = load_chain(paths, session_id)?
            .filter(|chain| chain.flow_id == flow_id)
            .is_some_and(|chain| chain.is_agent_completed(&agent));
        if !done {
            bail!(
                "agent {agent} has not completed in flow {flow_id} for {session_id}; \
                 finish it before `scaffold advance`"
            );
        }
    }
    let target = state
        .next_phase()
        .ok_or_else(|| anyhow!("scaffold session {session_id} is already COMPLETED"))?;
    let now = Utc::now();
    state.record_files(created, updated, now)?;
    state.advance_to(target, now)?;
    save_scaffold(
        paths,
        &state,
        &format!("{} -> {}", leaving.label(), target.label()),
    )?;
    info!(session_id, from = leaving.label(), to = target.label(), "scaffold transition");

    let body = if target == ScaffoldPhase::Completed {
        format!(
            "Documentation {} complete.\n\n- **Created:** {}\n- **Updated:** {}",
            state.mode.as_str(),
            file_list(&state.created_files),
            file_list(&state.updated_files)
        )
    } else {
        advance_hint(session_id)
    };
    Ok(ScaffoldOutcome {
        session_id: session_id.to_string(),
        phase: target,
        body,
    })
}

fn file_list(files: &[String]) -> String {
    if files.is_empty() {
        "none".to_string()
    } else {
        files.join(", ")
    }
}
