//! Core data types for findings, audit results and tree reports

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Free-form evidence attached to a finding. Always populated, even on a pass.
pub type Evidence = BTreeMap<String, serde_json::Value>;

/// The heuristic that produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeuristicKind {
    Typosquatting,
    Identity,
    Reputation,
    Velocity,
    Resurrection,
    Payload,
    Obfuscation,
}

impl std::fmt::Display for HeuristicKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Typosquatting => write!(f, "Typosquatting"),
            Self::Identity => write!(f, "Identity"),
            Self::Reputation => write!(f, "Reputation"),
            Self::Velocity => write!(f, "Velocity"),
            Self::Resurrection => write!(f, "Resurrection"),
            Self::Payload => write!(f, "Payload"),
            Self::Obfuscation => write!(f, "Obfuscation"),
        }
    }
}

/// Verdict of a single heuristic.
///
/// `Fail` always means "risk detected", including for typosquatting where a
/// detected squat is a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Pass,
    Fail,
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
        }
    }
}

/// Output of exactly one heuristic for one package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub kind: HeuristicKind,
    pub outcome: Outcome,
    pub evidence: Evidence,
}

impl Finding {
    pub fn new(kind: HeuristicKind, passed: bool, evidence: Evidence) -> Self {
        Self {
            kind,
            outcome: if passed { Outcome::Pass } else { Outcome::Fail },
            evidence,
        }
    }

    pub fn passed(&self) -> bool {
        self.outcome == Outcome::Pass
    }

    pub fn failed(&self) -> bool {
        self.outcome == Outcome::Fail
    }
}

/// Scored audit of one (package, version) pair
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditResult {
    pub package: String,
    pub version: String,
    /// Risk score, 0 (malicious) to 100 (clean)
    pub score: u8,
    pub findings: Vec<Finding>,
}

impl AuditResult {
    pub fn passes(&self, pass_threshold: u8) -> bool {
        self.score >= pass_threshold
    }

    pub fn finding(&self, kind: HeuristicKind) -> Option<&Finding> {
        self.findings.iter().find(|f| f.kind == kind)
    }
}

/// Coarse risk bands derived from a score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// At or above the pass line
    Safe,
    /// Below the pass line but not yet alarming
    Suspicious,
    /// Likely malicious
    Dangerous,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Safe => write!(f, "Safe"),
            Self::Suspicious => write!(f, "Suspicious"),
            Self::Dangerous => write!(f, "Dangerous"),
        }
    }
}

/// Score recorded for a package the operator trusts
pub const TRUSTED_SCORE: u8 = 100;

/// How a node of the dependency tree was resolved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum NodeStatus {
    /// Listed in the trust store; not scored, recorded at [`TRUSTED_SCORE`]
    Trusted { score: u8 },
    /// Reused from the audit cache
    Cached { result: AuditResult },
    /// Freshly scored
    Audited { result: AuditResult },
    /// Metadata could not be fetched (not found, network error, timeout)
    FetchFailed { reason: String },
}

/// One visited package in a tree audit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeReport {
    pub name: String,
    /// Distance from the root package
    pub depth: usize,
    pub status: NodeStatus,
}

impl NodeReport {
    pub fn result(&self) -> Option<&AuditResult> {
        match &self.status {
            NodeStatus::Cached { result } | NodeStatus::Audited { result } => Some(result),
            NodeStatus::Trusted { .. } | NodeStatus::FetchFailed { .. } => None,
        }
    }

    /// Scored or trusted nodes carry a score; unresolvable ones do not
    pub fn score(&self) -> Option<u8> {
        match &self.status {
            NodeStatus::Trusted { score } => Some(*score),
            NodeStatus::Cached { result } | NodeStatus::Audited { result } => Some(result.score),
            NodeStatus::FetchFailed { .. } => None,
        }
    }

    /// Unresolvable nodes never fail the tree on their own.
    pub fn passed(&self, pass_threshold: u8) -> bool {
        self.score().map(|s| s >= pass_threshold).unwrap_or(true)
    }
}

/// Result of a breadth-first audit of a package and its dependencies
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeReport {
    pub root: String,
    pub max_depth: usize,
    pub pass_threshold: u8,
    pub timestamp: DateTime<Utc>,
    /// Every visited package, keyed by name
    pub nodes: BTreeMap<String, NodeReport>,
    pub summary: TreeSummary,
}

/// Summary statistics for a tree report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TreeSummary {
    pub total_nodes: usize,
    pub trusted: usize,
    pub cached: usize,
    pub audited: usize,
    pub fetch_failed: usize,
    pub failing: usize,
}

impl TreeReport {
    pub fn new(root: String, max_depth: usize, pass_threshold: u8) -> Self {
        Self {
            root,
            max_depth,
            pass_threshold,
            timestamp: Utc::now(),
            nodes: BTreeMap::new(),
            summary: TreeSummary::default(),
        }
    }

    /// Logical AND of every node's verdict
    pub fn passed(&self) -> bool {
        self.nodes.values().all(|n| n.passed(self.pass_threshold))
    }

    pub fn root_node(&self) -> Option<&NodeReport> {
        self.nodes.get(&self.root)
    }

    /// Scored nodes only, keyed by package name
    pub fn results(&self) -> BTreeMap<&str, &AuditResult> {
        self.nodes
            .iter()
            .filter_map(|(name, node)| node.result().map(|r| (name.as_str(), r)))
            .collect()
    }

    /// Score of every scored or trusted node, keyed by package name
    pub fn scores(&self) -> BTreeMap<&str, u8> {
        self.nodes
            .iter()
            .filter_map(|(name, node)| node.score().map(|s| (name.as_str(), s)))
            .collect()
    }

    /// Nodes whose score fell below the pass line
    pub fn failing(&self) -> Vec<&NodeReport> {
        self.nodes
            .values()
            .filter(|n| !n.passed(self.pass_threshold))
            .collect()
    }

    /// Compute summary statistics from the visited nodes
    pub fn compute_summary(&mut self) {
        let mut summary = TreeSummary {
            total_nodes: self.nodes.len(),
            ..TreeSummary::default()
        };

        for node in self.nodes.values() {
            match node.status {
                NodeStatus::Trusted { .. } => summary.trusted += 1,
                NodeStatus::Cached { .. } => summary.cached += 1,
                NodeStatus::Audited { .. } => summary.audited += 1,
                NodeStatus::FetchFailed { .. } => summary.fetch_failed += 1,
            }
            if !node.passed(self.pass_threshold) {
                summary.failing += 1;
            }
        }

        self.summary = summary;
    }
}

/// Answer to "is this package safe to install?"
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditVerdict {
    /// Tree-wide verdict (the root alone for a non-recursive audit)
    pub passed: bool,
    /// Root score; [`TRUSTED_SCORE`] for a trusted root, `None` when the
    /// root could not be fetched
    pub score: Option<u8>,
    /// Root findings; empty when the root was not scored
    pub findings: Vec<Finding>,
    pub tree: TreeReport,
}
