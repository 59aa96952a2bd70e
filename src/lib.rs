//! # pkg_forensics
//!
//! Pre-install forensic audit of PyPI packages. Before a package (and,
//! optionally, its dependency tree) is installed, its registry metadata is
//! run through a set of independent heuristics:
//! - **Typosquatting**: names one edit away from, or stuffed around, a popular package
//! - **Identity**: anonymous maintainers and brand-jacked author emails
//! - **History**: inflated downloads, release spam and dormant projects that suddenly wake up
//! - **Payload**: executables shipped in distributions, skeleton sdists and random-looking filenames
//!
//! The findings are aggregated into a 0-100 security score. An operator
//! trust store (tamper-evident through a SHA-256 signature) short-circuits
//! audits for known-good packages, and results are cached per exact version.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pkg_forensics::{audit_package, AuditConfig};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let config = AuditConfig::load(None)?;
//! let verdict = audit_package("requests", true, 2, &config).await?;
//!
//! for (name, result) in verdict.tree.results() {
//!     println!("{} {}: score {}", name, result.version, result.score);
//! }
//! println!("safe to install: {}", verdict.passed);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod cache;
pub mod config;
pub mod error;
pub mod heuristics;
pub mod metadata;
pub mod parser;
pub mod scoring;
pub mod trust;
pub mod types;

// Re-export public API
pub use audit::{audit_package, TreeAuditor};
pub use cache::AuditCache;
pub use config::{
    default_config_path, AuditConfig, HeuristicThresholds, IdentityPolicy, NetworkConfig,
    ScoringWeights, StorageConfig, TraversalConfig, TyposquatConfig,
};
pub use error::{AuditError, Result};
pub use heuristics::HeuristicSuite;
pub use metadata::{MetadataSource, PackageMetadata, PypiClient};
pub use parser::{canonical_name, get_dependencies};
pub use scoring::{calculate_score, determine_risk};
pub use trust::TrustStore;
pub use types::{
    AuditResult, AuditVerdict, Finding, HeuristicKind, NodeReport, NodeStatus, Outcome, RiskLevel,
    TreeReport, TreeSummary, TRUSTED_SCORE,
};
