//! Task routing by complexity.
//!
//! TRIVIAL work is executed directly and leaves no state behind. SIMPLE and
//! MODERATE tasks enter The Last Algorithm at GATHER; COMPLEX and VERY_COMPLEX
//! tasks are decomposed first.

use anyhow::Result;
use chrono::Utc;
use tracing::{info, warn};

use crate::core::algorithm::AlgorithmState;
use crate::core::complexity::{ComplexityJudge, extract_complexity};
use crate::core::types::Complexity;
use crate::io::config::OrchestratorConfig;
use crate::io::init::OrchestratorPaths;
use crate::io::prompt::{RouteKind, render_complexity_assessment, render_route};
use crate::io::session_store::{new_session_id, save_session};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// Executed directly; no session.
    Trivial { text: String },
    /// Session created and pointed at GATHER.
    Algorithm { session_id: String, text: String },
    /// Session created and pointed at the decompose protocol.
    Decompose { session_id: String, text: String },
    /// No category given yet: the caller must classify first.
    NeedsAssessment { text: String },
}

impl RouteOutcome {
    pub fn render(&self) -> String {
        match self {
            RouteOutcome::Trivial { text }
            | RouteOutcome::Algorithm { text, .. }
            | RouteOutcome::Decompose { text, .. }
            | RouteOutcome::NeedsAssessment { text } => text.clone(),
        }
    }

    pub fn session_id(&self) -> Option<&str> {
        match self {
            RouteOutcome::Algorithm { session_id, .. }
            | RouteOutcome::Decompose { session_id, .. } => Some(session_id),
            _ => None,
        }
    }
}

/// Route `query` at a known complexity.
pub fn route(
    paths: &OrchestratorPaths,
    config: &OrchestratorConfig,
    query: &str,
    complexity: Complexity,
) -> Result<RouteOutcome> {
    let label = complexity.display_upper();
    if complexity == Complexity::Trivial {
        info!(complexity = complexity.as_str(), "routing to direct execution");
        let text = render_route(RouteKind::Trivial, query, &label, None, None)?;
        return Ok(RouteOutcome::Trivial { text });
    }

    let session_id = new_session_id();
    let mut state = AlgorithmState::new(&session_id, query, Some(complexity), Utc::now());
    state.max_verify_iterations = config.max_verify_iterations;
    save_session(paths, &state, &format!("routed {}", complexity.as_str()))?;

    if complexity >= Complexity::Complex {
        info!(session_id = %session_id, complexity = complexity.as_str(), "routing to decompose");
        let command = format!("orchestrator decompose start --state {session_id}");
        let text = render_route(
            RouteKind::Decompose,
            query,
            &label,
            Some(&session_id),
            Some(&command),
        )?;
        return Ok(RouteOutcome::Decompose { session_id, text });
    }

    info!(session_id = %session_id, complexity = complexity.as_str(), "routing to algorithm");
    let command = format!("orchestrator phase gather --state {session_id}");
    let text = render_route(
        RouteKind::Algorithm,
        query,
        &label,
        Some(&session_id),
        Some(&command),
    )?;
    Ok(RouteOutcome::Algorithm { session_id, text })
}

/// Route using an assessor's free-text answer. Unrecognized answers route as
/// MODERATE, with a warning line ahead of the directive.
pub fn route_from_assessment(
    paths: &OrchestratorPaths,
    config: &OrchestratorConfig,
    query: &str,
    assessment: &str,
) -> Result<RouteOutcome> {
    match extract_complexity(assessment) {
        Some(complexity) => route(paths, config, query, complexity),
        None => {
            warn!(assessment, "no complexity category in assessment; using moderate");
            let outcome = route(paths, config, query, Complexity::Moderate)?;
            let warning = "**WARNING:** Complexity assessment named no category; routing as MODERATE.\n\n";
            Ok(match outcome {
                RouteOutcome::Algorithm { session_id, text } => RouteOutcome::Algorithm {
                    session_id,
                    text: format!("{warning}{text}"),
                },
                other => other,
            })
        }
    }
}

/// Assessment prompt shown when no complexity was supplied.
pub fn assess(query: &str, judge: &dyn ComplexityJudge) -> Result<RouteOutcome> {
    let suggestion = judge.classify(query);
    let command = format!(
        "orchestrator route --complexity <category> {}",
        shell_quote(query)
    );
    let text = render_complexity_assessment(
        query,
        &suggestion.complexity.as_str().to_uppercase(),
        &suggestion.reason,
        &command,
    )?;
    Ok(RouteOutcome::NeedsAssessment { text })
}

fn shell_quote(text: &str) -> String {
    format!("'{}'", text.trim().replace('\'', r"'\''"))
}
