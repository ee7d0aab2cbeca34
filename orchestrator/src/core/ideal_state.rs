//! Ideal-state document captured during INTERVIEW.

use serde::{Deserialize, Serialize};

/// Explicit success and anti-success criteria for one task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct IdealState {
    pub objective: String,
    pub euphoric_surprise: Option<String>,
    pub success_criteria: Vec<SuccessCriterion>,
    pub anti_criteria: Vec<AntiCriterion>,
    pub success_metrics: Vec<SuccessMetric>,
    pub exit_conditions: Vec<String>,
    pub verification_method: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SuccessCriterion {
    pub id: String,
    pub description: String,
    pub verification_method: Option<String>,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AntiCriterion {
    pub id: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SuccessMetric {
    pub name: String,
    pub target_value: Option<f64>,
    pub unit: Option<String>,
}

/// One INTERVIEW pass and the completeness it reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterviewIteration {
    pub iteration: u32,
    pub completeness: f64,
    pub missing_elements: Vec<String>,
}

impl IdealState {
    /// Criteria not yet marked verified.
    pub fn unverified_criteria(&self) -> impl Iterator<Item = &SuccessCriterion> {
        self.success_criteria.iter().filter(|c| !c.verified)
    }
}
