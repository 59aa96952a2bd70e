//! Independent forensic heuristics over registry metadata
//!
//! Every heuristic is a pure function of the package name, its metadata and
//! the configuration. None of them can fail: a missing field is read as the
//! safest default, so a half-empty registry document never aborts an audit.

pub mod history;
pub mod identity;
pub mod payload;
pub mod typosquat;

pub use history::{check_reputation, check_resurrection, check_velocity};
pub use identity::check_identity;
pub use payload::{check_obfuscation, check_payload, shannon_entropy};
pub use typosquat::{check_typosquatting, levenshtein_distance, SquatKind, SquatMatch};

use crate::config::AuditConfig;
use crate::metadata::PackageMetadata;
use crate::types::Finding;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// The full set of heuristics, bound to one configuration
#[derive(Debug, Clone)]
pub struct HeuristicSuite {
    config: Arc<AuditConfig>,
}

impl HeuristicSuite {
    pub fn new(config: Arc<AuditConfig>) -> Self {
        Self { config }
    }

    /// Run every heuristic against `metadata` as of now
    pub fn run(&self, package_name: &str, metadata: &PackageMetadata) -> Vec<Finding> {
        self.run_at(package_name, metadata, Utc::now())
    }

    /// Run every heuristic, measuring package ages against `now`
    pub fn run_at(
        &self,
        package_name: &str,
        metadata: &PackageMetadata,
        now: DateTime<Utc>,
    ) -> Vec<Finding> {
        let config = &self.config;
        let thresholds = &config.thresholds;

        vec![
            typosquat::typosquat_finding(package_name, &config.typosquat),
            check_identity(package_name, metadata, &config.identity),
            check_reputation(metadata, thresholds, now),
            check_velocity(metadata, thresholds, now),
            check_resurrection(metadata, thresholds, now),
            check_payload(metadata, thresholds),
            check_obfuscation(metadata, thresholds),
        ]
    }
}
