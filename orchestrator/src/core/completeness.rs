//! Ideal-state completeness scoring for the INTERVIEW loop.

use crate::core::ideal_state::IdealState;

pub const COMPLETENESS_THRESHOLD: f64 = 0.95;
pub const MAX_INTERVIEW_ITERATIONS: u32 = 5;

/// Dimension weights; they sum to 1.0.
const WEIGHTS: [(&str, f64); 6] = [
    ("criteria_clarity", 0.25),
    ("metric_precision", 0.20),
    ("verification_feasibility", 0.20),
    ("anti_criteria_coverage", 0.15),
    ("exit_clarity", 0.10),
    ("intent_alignment", 0.10),
];

#[derive(Debug, Clone, PartialEq)]
pub struct CompletenessResult {
    pub overall_score: f64,
    pub dimension_scores: Vec<(&'static str, f64)>,
    pub missing_elements: Vec<String>,
    pub recommendations: Vec<String>,
    pub ready_to_proceed: bool,
}

impl CompletenessResult {
    pub fn dimension(&self, name: &str) -> Option<f64> {
        self.dimension_scores
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, score)| *score)
    }
}

/// Score `ideal` across the weighted dimensions.
pub fn evaluate(ideal: Option<&IdealState>, threshold: f64) -> CompletenessResult {
    let Some(ideal) = ideal else {
        return CompletenessResult {
            overall_score: 0.0,
            dimension_scores: Vec::new(),
            missing_elements: vec!["No IDEAL STATE defined".to_string()],
            recommendations: vec!["Define IDEAL STATE with objective and criteria".to_string()],
            ready_to_proceed: false,
        };
    };

    let scores = [
        criteria_clarity(ideal),
        metric_precision(ideal),
        verification_feasibility(ideal),
        anti_criteria_coverage(ideal),
        exit_clarity(ideal),
        intent_alignment(ideal),
    ];
    let dimension_scores: Vec<(&'static str, f64)> = WEIGHTS
        .iter()
        .zip(scores)
        .map(|((name, _), score)| (*name, score))
        .collect();
    let overall_score = WEIGHTS
        .iter()
        .zip(scores)
        .map(|((_, weight), score)| weight * score)
        .sum::<f64>();

    let mut missing_elements = Vec::new();
    let mut recommendations = Vec::new();
    let mut flag = |below: bool, missing: &str, advice: &str| {
        if below {
            missing_elements.push(missing.to_string());
            recommendations.push(advice.to_string());
        }
    };
    flag(
        scores[0] < 0.8,
        "Clear success criteria",
        "Define at least 2 success criteria with verification methods",
    );
    flag(
        scores[1] < 0.7,
        "Precise metrics",
        "Add quantifiable metrics with target values",
    );
    flag(
        scores[2] < 0.7,
        "Feasible verification",
        "Ensure criteria can be objectively verified",
    );
    flag(
        scores[3] < 0.5,
        "Anti-criteria",
        "Identify what should NOT happen",
    );
    flag(scores[4] < 0.5, "Exit conditions", "Define clear exit conditions");
    flag(
        scores[5] < 0.8,
        "Intent clarity",
        "Clarify objective and desired outcome",
    );

    CompletenessResult {
        overall_score,
        dimension_scores,
        missing_elements,
        recommendations,
        ready_to_proceed: overall_score >= threshold,
    }
}

fn criteria_clarity(ideal: &IdealState) -> f64 {
    let criteria = &ideal.success_criteria;
    match criteria.len() {
        0 => 0.0,
        1 => 0.5,
        n => {
            let total: f64 = criteria
                .iter()
                .map(|c| {
                    let mut score = 0.0;
                    if !c.description.trim().is_empty() {
                        score += 0.5;
                    }
                    if c.verification_method.is_some() {
                        score += 0.5;
                    }
                    score
                })
                .sum();
            total / n as f64
        }
    }
}

fn metric_precision(ideal: &IdealState) -> f64 {
    let metrics = &ideal.success_metrics;
    if metrics.is_empty() {
        return 0.3;
    }
    let total: f64 = metrics
        .iter()
        .map(|m| {
            let mut score = 0.0;
            if !m.name.trim().is_empty() {
                score += 0.3;
            }
            if m.target_value.is_some() {
                score += 0.5;
            }
            if m.unit.is_some() {
                score += 0.2;
            }
            score
        })
        .sum();
    total / metrics.len() as f64
}

fn verification_feasibility(ideal: &IdealState) -> f64 {
    if ideal.verification_method.as_deref().is_none_or(str::is_empty) {
        return 0.3;
    }
    let criteria = &ideal.success_criteria;
    if criteria.is_empty() {
        return 0.5;
    }
    let verifiable = criteria
        .iter()
        .filter(|c| c.verification_method.is_some())
        .count();
    0.5 + 0.5 * (verifiable as f64 / criteria.len() as f64)
}

fn anti_criteria_coverage(ideal: &IdealState) -> f64 {
    match ideal.anti_criteria.len() {
        0 => 0.5,
        1 => 0.75,
        _ => 1.0,
    }
}

fn exit_clarity(ideal: &IdealState) -> f64 {
    match ideal.exit_conditions.len() {
        0 => 0.3,
        1 => 0.7,
        _ => 1.0,
    }
}

fn intent_alignment(ideal: &IdealState) -> f64 {
    let mut score = 0.0;
    if !ideal.objective.trim().is_empty() {
        score += 0.6;
    }
    if ideal.euphoric_surprise.as_deref().is_some_and(|s| !s.trim().is_empty()) {
        score += 0.4;
    }
    score
}
