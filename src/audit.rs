//! Main audit orchestration logic
//!
//! [`TreeAuditor`] walks a package and its dependencies breadth first, one
//! depth level at a time. Within a level, siblings are fetched and scored
//! concurrently (bounded by `traversal.max_concurrency`); names are marked
//! as seen by the coordinating task before any work is dispatched, so no
//! package is audited twice.

use crate::cache::AuditCache;
use crate::config::AuditConfig;
use crate::error::{AuditError, Result};
use crate::heuristics::HeuristicSuite;
use crate::metadata::{MetadataSource, PackageMetadata, PypiClient};
use crate::parser::{canonical_name, get_dependencies};
use crate::scoring::calculate_score;
use crate::trust::TrustStore;
use crate::types::{AuditResult, AuditVerdict, NodeReport, NodeStatus, TreeReport, TRUSTED_SCORE};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeSet, HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// Audit `package` against the public registry using the configured trust
/// store and cache
pub async fn audit_package(
    package: &str,
    recursive: bool,
    max_depth: usize,
    config: &AuditConfig,
) -> Result<AuditVerdict> {
    let source = PypiClient::new(&config.network)?;
    let auditor = TreeAuditor::from_config(config.clone(), source);
    auditor.audit(package, recursive, max_depth).await
}

/// What visiting one node produced
struct Visit {
    status: NodeStatus,
    dependencies: BTreeSet<String>,
}

impl Visit {
    fn leaf(status: NodeStatus) -> Self {
        Self {
            status,
            dependencies: BTreeSet::new(),
        }
    }
}

pub struct TreeAuditor<S> {
    config: Arc<AuditConfig>,
    source: S,
    trust: TrustStore,
    cache: Mutex<AuditCache>,
    suite: HeuristicSuite,
}

impl<S: MetadataSource> TreeAuditor<S> {
    pub fn new(config: AuditConfig, source: S, trust: TrustStore, cache: AuditCache) -> Self {
        let config = Arc::new(config);
        Self {
            suite: HeuristicSuite::new(Arc::clone(&config)),
            config,
            source,
            trust,
            cache: Mutex::new(cache),
        }
    }

    /// Use the trust store and cache locations from `config.storage`
    pub fn from_config(config: AuditConfig, source: S) -> Self {
        let trust = TrustStore::new(config.storage.trust_store_path());
        let cache = AuditCache::open(config.storage.cache_path());
        Self::new(config, source, trust, cache)
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    pub fn trust_store(&self) -> &TrustStore {
        &self.trust
    }

    /// Audit one package, optionally with its dependency tree.
    ///
    /// The verdict passes when every visited node passes. A trusted root
    /// scores [`TRUSTED_SCORE`]; a root that cannot be fetched passes with no
    /// score (fail-open).
    pub async fn audit(&self, package: &str, recursive: bool, max_depth: usize) -> Result<AuditVerdict> {
        let depth = if recursive { max_depth } else { 0 };
        let tree = self.audit_tree(package, depth).await?;

        let root = tree.root_node();
        let score = root.and_then(NodeReport::score);
        let findings = root
            .and_then(NodeReport::result)
            .map(|r| r.findings.clone())
            .unwrap_or_default();

        Ok(AuditVerdict {
            passed: tree.passed(),
            score,
            findings,
            tree,
        })
    }

    /// Breadth-first audit of `package` and its dependencies down to
    /// `max_depth` (the root is depth 0).
    ///
    /// Fails only when the trust store does not match its signature; any
    /// per-package problem is recorded on that node instead.
    pub async fn audit_tree(&self, package: &str, max_depth: usize) -> Result<TreeReport> {
        if !self.trust.verify()? {
            return Err(AuditError::IntegrityBreach {
                path: self.trust.path().to_path_buf(),
            });
        }
        let trusted = self.trust.trusted_names()?;

        let root = canonical_name(package);
        info!("Starting audit of {} (max depth {})", root, max_depth);

        let mut report = TreeReport::new(root.clone(), max_depth, self.config.pass_threshold);
        let mut seen: HashSet<String> = HashSet::from([root.clone()]);
        let mut queue: VecDeque<(String, usize)> = VecDeque::from([(root, 0)]);

        while !queue.is_empty() {
            // Children are only enqueued once a level completes, so the
            // queue always holds exactly one level here.
            let level: Vec<(String, usize)> = queue
                .drain(..)
                .filter(|(_, depth)| *depth <= max_depth)
                .collect();

            let trusted = &trusted;
            let mut visits: Vec<(String, usize, Visit)> = stream::iter(level)
                .map(|(name, depth)| async move {
                    let visit = self.visit(&name, trusted, depth < max_depth).await;
                    (name, depth, visit)
                })
                .buffer_unordered(self.config.traversal.max_concurrency)
                .collect()
                .await;
            visits.sort_by(|a, b| a.0.cmp(&b.0));

            for (name, depth, visit) in visits {
                for dependency in visit.dependencies {
                    if seen.insert(dependency.clone()) {
                        queue.push_back((dependency, depth + 1));
                    }
                }
                report.nodes.insert(
                    name.clone(),
                    NodeReport {
                        name,
                        depth,
                        status: visit.status,
                    },
                );
            }
        }

        self.flush_cache();
        report.compute_summary();
        info!(
            "Audit of {} complete: {} packages, {} audited, {} cached, {} trusted, {} unresolved, {} failing",
            report.root,
            report.summary.total_nodes,
            report.summary.audited,
            report.summary.cached,
            report.summary.trusted,
            report.summary.fetch_failed,
            report.summary.failing,
        );

        Ok(report)
    }

    /// Resolve one node: trust store, then registry, then cache or heuristics
    async fn visit(&self, name: &str, trusted: &BTreeSet<String>, expand: bool) -> Visit {
        if trusted.contains(name) {
            debug!("{} is trusted, skipping forensic audit", name);
            let status = NodeStatus::Trusted {
                score: TRUSTED_SCORE,
            };
            if self.config.traversal.trust_is_transitive || !expand {
                return Visit::leaf(status);
            }
            let dependencies = match self.fetch(name).await {
                Ok(metadata) => get_dependencies(&metadata),
                Err(_) => BTreeSet::new(),
            };
            return Visit {
                status,
                dependencies,
            };
        }

        let metadata = match self.fetch(name).await {
            Ok(metadata) => metadata,
            Err(reason) => return Visit::leaf(NodeStatus::FetchFailed { reason }),
        };

        let status = self.score(name, &metadata);
        let dependencies = if expand {
            get_dependencies(&metadata)
        } else {
            BTreeSet::new()
        };

        Visit {
            status,
            dependencies,
        }
    }

    /// Fetch metadata under the per-node deadline. Errors come back as a
    /// human-readable reason: a missing package is unknown, not malicious.
    async fn fetch(&self, name: &str) -> std::result::Result<PackageMetadata, String> {
        let deadline = self.config.traversal.fetch_timeout();
        match tokio::time::timeout(deadline, self.source.fetch(name)).await {
            Ok(Ok(metadata)) => Ok(metadata),
            Ok(Err(e)) if e.is_not_found() => {
                warn!("{} was not found on the registry", name);
                Err(e.to_string())
            }
            Ok(Err(e)) => {
                warn!("Failed to fetch metadata for {}: {}", name, e);
                Err(e.to_string())
            }
            Err(_) => {
                warn!("Fetching {} timed out after {:?}", name, deadline);
                Err(format!("timed out after {:?}", deadline))
            }
        }
    }

    fn score(&self, name: &str, metadata: &PackageMetadata) -> NodeStatus {
        let Some(version) = metadata.version().map(String::from) else {
            // No version to key the cache on: score without caching.
            return NodeStatus::Audited {
                result: self.run_heuristics(name, "unknown", metadata),
            };
        };

        let cached = self.lock_cache().get(name, &version);
        if let Some((score, findings)) = cached {
            debug!("Cache hit for {} {}", name, version);
            return NodeStatus::Cached {
                result: AuditResult {
                    package: name.to_string(),
                    version,
                    score,
                    findings,
                },
            };
        }

        let result = self.run_heuristics(name, &version, metadata);
        self.lock_cache()
            .save(name, &version, result.score, &result.findings);
        NodeStatus::Audited { result }
    }

    fn run_heuristics(&self, name: &str, version: &str, metadata: &PackageMetadata) -> AuditResult {
        let findings = self.suite.run(name, metadata);
        let score = calculate_score(&findings, &self.config.scoring_weights);
        debug!("Scored {} {}: {}", name, version, score);
        AuditResult {
            package: name.to_string(),
            version: version.to_string(),
            score,
            findings,
        }
    }

    /// Persist results gathered during a traversal. Failure only costs
    /// future cache hits.
    fn flush_cache(&self) {
        if let Err(e) = self.lock_cache().flush() {
            warn!("Failed to persist audit cache: {}", e);
        }
    }

    fn lock_cache(&self) -> MutexGuard<'_, AuditCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Unreachable;

    #[async_trait]
    impl MetadataSource for Unreachable {
        async fn fetch(&self, _name: &str) -> Result<PackageMetadata> {
            Err(AuditError::network("connection refused"))
        }
    }

    #[tokio::test]
    async fn test_unreachable_registry_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let auditor = TreeAuditor::new(
            AuditConfig::default(),
            Unreachable,
            TrustStore::new(dir.path().join("trusted")),
            AuditCache::in_memory(),
        );

        let verdict = auditor.audit("left-pad", true, 2).await.unwrap();
        assert!(verdict.passed);
        assert_eq!(verdict.score, None);
        assert!(verdict.findings.is_empty());
        assert!(matches!(
            verdict.tree.root_node().unwrap().status,
            NodeStatus::FetchFailed { .. }
        ));
    }
}
