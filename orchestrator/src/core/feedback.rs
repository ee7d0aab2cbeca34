//! Turn a verification result into the next action.

use serde::{Deserialize, Serialize};

use crate::core::verification::{VerificationResult, VerificationStatus};

pub const DEFAULT_MAX_ITERATIONS: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedbackAction {
    /// Continue to LEARN.
    Proceed,
    /// Return to OBSERVE for another inner-loop pass.
    LoopBack,
    /// Stop and ask the user.
    Escalate,
}

impl FeedbackAction {
    pub fn as_str(self) -> &'static str {
        match self {
            FeedbackAction::Proceed => "PROCEED",
            FeedbackAction::LoopBack => "LOOP_BACK",
            FeedbackAction::Escalate => "ESCALATE",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackDecision {
    pub action: FeedbackAction,
    pub message: String,
    /// `LEARN`, `OBSERVE` or `USER_REVIEW`.
    pub next_phase: &'static str,
    pub gaps: Vec<String>,
}

/// Decide what follows `result` at outer-loop `iteration`.
///
/// - VERIFIED -> PROCEED
/// - CRITICAL_FAILURE -> ESCALATE
/// - GAPS_IDENTIFIED below `max_iterations` -> LOOP_BACK, else ESCALATE
pub fn decide(result: &VerificationResult, iteration: u32, max_iterations: u32) -> FeedbackDecision {
    match result.status {
        VerificationStatus::Verified => FeedbackDecision {
            action: FeedbackAction::Proceed,
            message: "All verification criteria met. Proceeding to LEARN phase.".to_string(),
            next_phase: "LEARN",
            gaps: Vec::new(),
        },
        VerificationStatus::CriticalFailure => FeedbackDecision {
            action: FeedbackAction::Escalate,
            message: "Critical failure detected. User intervention required to resolve \
                      anti-criteria violations."
                .to_string(),
            next_phase: "USER_REVIEW",
            gaps: result.gaps.clone(),
        },
        VerificationStatus::GapsIdentified if iteration >= max_iterations => FeedbackDecision {
            action: FeedbackAction::Escalate,
            message: format!(
                "Maximum iterations ({max_iterations}) reached. Gaps remain unresolved. \
                 User review required."
            ),
            next_phase: "USER_REVIEW",
            gaps: result.gaps.clone(),
        },
        VerificationStatus::GapsIdentified => {
            let summary = if result.gaps.is_empty() {
                "Gaps identified in verification".to_string()
            } else {
                result
                    .gaps
                    .iter()
                    .take(3)
                    .cloned()
                    .collect::<Vec<_>>()
                    .join("; ")
            };
            FeedbackDecision {
                action: FeedbackAction::LoopBack,
                message: format!(
                    "Gaps identified (iteration {iteration}/{max_iterations}): {summary}. \
                     Returning to OBSERVE for refinement."
                ),
                next_phase: "OBSERVE",
                gaps: result.gaps.clone(),
            }
        }
    }
}
