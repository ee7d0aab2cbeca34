//! Weighted verification of phase outputs against the ideal state.
//!
//! Three scored layers feed one overall score:
//!
//! | Layer     | Weight | Source                                   |
//! |-----------|--------|------------------------------------------|
//! | objective | 0.5    | test ratios, execution status, all-met   |
//! | heuristic | 0.3    | lint, complexity, files created          |
//! | semantic  | 0.2    | explicit semantic score or intent match  |
//!
//! An anti-criteria violation reported by any phase forces
//! [`VerificationStatus::CriticalFailure`] regardless of score.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::algorithm::AlgorithmPhase;
use crate::core::ideal_state::IdealState;

pub const OBJECTIVE_WEIGHT: f64 = 0.5;
pub const HEURISTIC_WEIGHT: f64 = 0.3;
pub const SEMANTIC_WEIGHT: f64 = 0.2;

pub const VERIFIED_THRESHOLD: f64 = 0.9;
pub const GAPS_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationStatus {
    Verified,
    GapsIdentified,
    CriticalFailure,
}

impl VerificationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStatus::Verified => "VERIFIED",
            VerificationStatus::GapsIdentified => "GAPS_IDENTIFIED",
            VerificationStatus::CriticalFailure => "CRITICAL_FAILURE",
        }
    }
}

/// Outcome of one verification pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub iteration: u32,
    pub timestamp: DateTime<Utc>,
    pub status: VerificationStatus,
    pub objective_score: f64,
    pub heuristic_score: f64,
    pub semantic_score: f64,
    pub overall_score: f64,
    pub gaps: Vec<String>,
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TestResults {
    pub passed: u32,
    pub failed: u32,
}

/// Fields of a phase output that verification reads.
///
/// Phase outputs are free-form JSON; anything that is not an object, or whose
/// known fields have the wrong shape, contributes nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ExecutionReport {
    pub test_results: Option<TestResults>,
    pub status: Option<String>,
    pub all_criteria_met: bool,
    pub lint_score: Option<f64>,
    pub complexity_score: Option<f64>,
    pub files_created: Vec<String>,
    pub semantic_score: Option<f64>,
    pub intent_matched: bool,
    pub gaps: Vec<String>,
    pub anti_criteria_violations: Vec<String>,
}

impl ExecutionReport {
    pub fn from_value(value: &Value) -> Option<Self> {
        if !value.is_object() {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

/// Verify `outputs` against `ideal`.
pub fn verify(
    ideal: &IdealState,
    outputs: &BTreeMap<AlgorithmPhase, Value>,
    iteration: u32,
    now: DateTime<Utc>,
) -> VerificationResult {
    let reports: Vec<(AlgorithmPhase, ExecutionReport)> = outputs
        .iter()
        .filter_map(|(phase, value)| ExecutionReport::from_value(value).map(|r| (*phase, r)))
        .collect();
    let has_outputs = !outputs.is_empty();

    let violated = reports
        .iter()
        .any(|(_, report)| !report.anti_criteria_violations.is_empty());
    let objective_score = objective_layer(&reports);
    let heuristic_score = heuristic_layer(&reports, has_outputs);
    let semantic_score = semantic_layer(&reports, has_outputs);
    let overall_score = objective_score * OBJECTIVE_WEIGHT
        + heuristic_score * HEURISTIC_WEIGHT
        + semantic_score * SEMANTIC_WEIGHT;

    let status = if violated {
        VerificationStatus::CriticalFailure
    } else if overall_score >= VERIFIED_THRESHOLD {
        VerificationStatus::Verified
    } else if overall_score >= GAPS_THRESHOLD {
        VerificationStatus::GapsIdentified
    } else {
        VerificationStatus::CriticalFailure
    };

    let gaps = identify_gaps(ideal, &reports, overall_score);
    let recommendations = recommendations(&gaps, status);

    VerificationResult {
        iteration,
        timestamp: now,
        status,
        objective_score,
        heuristic_score,
        semantic_score,
        overall_score,
        gaps,
        recommendations,
    }
}

fn objective_layer(reports: &[(AlgorithmPhase, ExecutionReport)]) -> f64 {
    let mut scores = Vec::new();
    for (_, report) in reports {
        if let Some(tests) = report.test_results {
            let total = tests.passed + tests.failed;
            if total > 0 {
                scores.push(f64::from(tests.passed) / f64::from(total));
            }
        }
        match report.status.as_deref() {
            Some("completed") => scores.push(1.0),
            Some("failed") => scores.push(0.0),
            _ => {}
        }
        if report.all_criteria_met {
            scores.push(1.0);
        }
    }
    mean(&scores).unwrap_or(0.0)
}

fn heuristic_layer(reports: &[(AlgorithmPhase, ExecutionReport)], has_outputs: bool) -> f64 {
    if !has_outputs {
        return 0.5;
    }
    let mut scores = Vec::new();
    for (_, report) in reports {
        if let Some(lint) = report.lint_score {
            scores.push(lint / 10.0);
        }
        if let Some(complexity) = report.complexity_score {
            scores.push((1.0 - complexity / 100.0).max(0.0));
        }
        if !report.files_created.is_empty() {
            scores.push(0.8);
        }
    }
    mean(&scores).unwrap_or(0.7)
}

fn semantic_layer(reports: &[(AlgorithmPhase, ExecutionReport)], has_outputs: bool) -> f64 {
    if !has_outputs {
        return 0.5;
    }
    for (_, report) in reports {
        if let Some(score) = report.semantic_score {
            return score;
        }
        if report.intent_matched {
            return 0.9;
        }
    }
    0.7
}

fn identify_gaps(
    ideal: &IdealState,
    reports: &[(AlgorithmPhase, ExecutionReport)],
    overall_score: f64,
) -> Vec<String> {
    let mut gaps: Vec<String> = ideal
        .unverified_criteria()
        .map(|c| format!("Unverified: {}", c.description))
        .collect();
    for (phase, report) in reports {
        if let Some(tests) = report.test_results.filter(|t| t.failed > 0) {
            gaps.push(format!("{} tests failing in {}", tests.failed, phase.label()));
        }
        gaps.extend(report.gaps.iter().cloned());
    }
    if overall_score < GAPS_THRESHOLD {
        gaps.push(format!("Overall score ({overall_score:.2}) below threshold"));
    }
    gaps
}

fn recommendations(gaps: &[String], status: VerificationStatus) -> Vec<String> {
    let mut out = Vec::new();
    if status == VerificationStatus::CriticalFailure {
        out.push("Review anti-criteria violations immediately".to_string());
        out.push("Consider major refactoring or redesign".to_string());
    }
    for gap in gaps {
        let lower = gap.to_lowercase();
        if lower.contains("test") {
            out.push("Fix failing tests before proceeding".to_string());
        } else if lower.contains("unverified") {
            out.push(format!("Address: {gap}"));
        }
    }
    if out.is_empty() && status == VerificationStatus::GapsIdentified {
        out.push("Review and address identified gaps".to_string());
    }
    out
}

fn mean(scores: &[f64]) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    Some(scores.iter().sum::<f64>() / scores.len() as f64)
}
