//! Risk score aggregation

use crate::config::ScoringWeights;
use crate::types::{Finding, HeuristicKind, RiskLevel};

/// Below this score a package is reported as dangerous rather than suspicious
const DANGER_LINE: u8 = 50;

/// Combine heuristic findings into a 0-100 score.
///
/// A detected typosquat forces the score to 0. Every other failed finding
/// deducts its configured weight; heuristics that did not report count as
/// passed.
pub fn calculate_score(findings: &[Finding], weights: &ScoringWeights) -> u8 {
    if findings
        .iter()
        .any(|f| f.kind == HeuristicKind::Typosquatting && f.failed())
    {
        return 0;
    }

    let deducted: i64 = findings
        .iter()
        .filter(|f| f.failed())
        .map(|f| i64::from(weights.weight_for(f.kind)))
        .sum();

    (100 - deducted).clamp(0, 100) as u8
}

/// Determine risk band from score
pub fn determine_risk(score: u8, pass_threshold: u8) -> RiskLevel {
    if score >= pass_threshold {
        RiskLevel::Safe
    } else if score >= DANGER_LINE {
        RiskLevel::Suspicious
    } else {
        RiskLevel::Dangerous
    }
}
