//! Persistent audit result cache
//!
//! Results are keyed by package name and the exact version the registry
//! reported. A published version never changes upstream, so entries never
//! expire; they only go away through [`AuditCache::invalidate`] or
//! [`AuditCache::clear`]. A corrupt cache file or entry is a cache miss.
//!
//! New results stay in memory until [`AuditCache::flush`]; the tree auditor
//! flushes once per traversal.

use crate::error::Result;
use crate::types::Finding;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CachedAudit {
    score: u8,
    findings: Vec<Finding>,
    cached_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct AuditCache {
    path: Option<PathBuf>,
    entries: BTreeMap<String, CachedAudit>,
    dirty: bool,
}

const MAX_SCORE: u8 = 100;

fn cache_key(package: &str, version: &str) -> String {
    format!("{}=={}", package, version)
}

impl AuditCache {
    /// A cache that lives only as long as this value
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Load the cache backed by `path`, starting empty if the file is
    /// missing or unreadable
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = load_entries(&path);
        debug!("Loaded {} cached audits from {}", entries.len(), path.display());
        Self {
            path: Some(path),
            entries,
            dirty: false,
        }
    }

    pub fn get(&self, package: &str, version: &str) -> Option<(u8, Vec<Finding>)> {
        self.entries
            .get(&cache_key(package, version))
            .map(|entry| (entry.score, entry.findings.clone()))
    }

    /// Remember an audit result. It reaches disk on the next [`flush`](Self::flush).
    pub fn save(&mut self, package: &str, version: &str, score: u8, findings: &[Finding]) {
        self.entries.insert(
            cache_key(package, version),
            CachedAudit {
                score,
                findings: findings.to_vec(),
                cached_at: Utc::now(),
            },
        );
        self.dirty = true;
    }

    /// Write pending results to disk, if there are any
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        self.persist()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Drop one entry. Returns whether it existed.
    pub fn invalidate(&mut self, package: &str, version: &str) -> Result<bool> {
        let existed = self.entries.remove(&cache_key(package, version)).is_some();
        if existed {
            self.persist()?;
        }
        Ok(existed)
    }

    pub fn clear(&mut self) -> Result<()> {
        self.entries.clear();
        self.persist()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn persist(&mut self) -> Result<()> {
        let Some(path) = &self.path else {
            self.dirty = false;
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, serde_json::to_vec_pretty(&self.entries)?)?;
        fs::rename(&tmp, path)?;
        debug!("Wrote {} cached audits to {}", self.entries.len(), path.display());
        self.dirty = false;
        Ok(())
    }
}

fn load_entries(path: &Path) -> BTreeMap<String, CachedAudit> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!("Cannot read audit cache {}: {}", path.display(), e);
            return BTreeMap::new();
        }
    };

    let raw: BTreeMap<String, serde_json::Value> = match serde_json::from_slice(&content) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Ignoring corrupt audit cache {}: {}", path.display(), e);
            return BTreeMap::new();
        }
    };

    raw.into_iter()
        .filter_map(|(key, value)| match serde_json::from_value::<CachedAudit>(value) {
            Ok(entry) if entry.score > MAX_SCORE => {
                warn!("Dropping cache entry {} with out-of-range score {}", key, entry.score);
                None
            }
            Ok(entry) => Some((key, entry)),
            Err(e) => {
                warn!("Dropping unreadable cache entry {}: {}", key, e);
                None
            }
        })
        .collect()
}
