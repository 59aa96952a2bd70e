//! Configuration for scoring weights, heuristic thresholds and traversal
//!
//! The configuration is loaded once and handed to the heuristic suite, the
//! aggregator and the tree auditor by value. A user file only needs to name
//! the keys it changes: it is deep-merged over [`AuditConfig::default`].

use crate::error::{AuditError, Result};
use crate::types::HeuristicKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = ".pkg-forensics";
const CONFIG_FILE: &str = "config.toml";
const TRUST_STORE_FILE: &str = "trusted-packages";
const CACHE_FILE: &str = "audit-cache.json";
const DEFAULT_REGISTRY_URL: &str = "https://pypi.org";

/// Main configuration for the audit engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Minimum score (0-100) for a package to count as safe
    pub pass_threshold: u8,
    /// Points deducted per failed heuristic
    pub scoring_weights: ScoringWeights,
    /// Protected names for typosquatting detection
    pub typosquat: TyposquatConfig,
    /// Numeric limits used by the metadata heuristics
    pub thresholds: HeuristicThresholds,
    /// Author identity policy
    pub identity: IdentityPolicy,
    /// Dependency tree crawl settings
    pub traversal: TraversalConfig,
    /// Registry access
    pub network: NetworkConfig,
    /// Where the trust store and the audit cache live
    pub storage: StorageConfig,
}

/// Deductions applied by the score aggregator. Typosquatting has no weight:
/// a squat forces the score to zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub payload: u32,
    pub resurrection: u32,
    pub obfuscation: u32,
    /// Bot-inflated downloads on a brand-new package
    pub reputation: u32,
    /// Hidden or mismatched author identity
    pub identity: u32,
    pub velocity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TyposquatConfig {
    /// Protected package name -> maximum edit distance that counts as a squat
    pub targets: BTreeMap<String, u32>,
    /// Extra characters tolerated around a protected name before a
    /// substring match stops counting as keyword stuffing
    pub keyword_extra_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicThresholds {
    /// Releases above which dormancy is never flagged
    pub giant_immunity_releases: usize,
    /// Largest tolerated gap between consecutive uploads (days)
    pub dormancy_gap_days: i64,
    /// A release younger than this after a long gap looks like a takeover (days)
    pub resurrection_window_days: i64,
    /// Monthly downloads that are implausible for a brand-new package
    pub inflation_downloads: i64,
    /// Package age (days) under which high downloads are suspicious
    pub inflation_max_age_days: i64,
    pub velocity_max_releases: usize,
    pub velocity_window_days: i64,
    /// Shannon entropy (bits/symbol) above which a filename looks randomized
    pub entropy_limit: f64,
    /// Source distributions smaller than this are treated as skeletons (bytes)
    pub skeleton_sdist_bytes: u64,
    pub payload_extensions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityPolicy {
    /// Releases above which missing author metadata is tolerated
    pub immunity_releases: usize,
    /// Cross-check brand tokens in the package name against the author email
    pub brand_check: bool,
    /// Brand token -> the email domain that brand publishes from
    pub brands: BTreeMap<String, String>,
    pub free_mail_domains: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalConfig {
    /// Deepest dependency level audited by a recursive crawl
    pub max_depth: usize,
    /// Sibling packages fetched and audited at the same time
    pub max_concurrency: usize,
    /// Skip the dependency subtree of an explicitly trusted package
    pub trust_is_transitive: bool,
    /// Deadline for one node's metadata fetch, retries included (seconds)
    pub fetch_timeout_secs: u64,
}

/// Network configuration for registry calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Base URL of the package registry JSON API
    pub registry_url: String,
    /// Request timeout in seconds
    pub timeout_secs: u64,
    /// Maximum number of retries for failed requests
    pub max_retries: u32,
    /// Initial backoff between retries (milliseconds)
    pub request_delay_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_store_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            pass_threshold: 80,
            scoring_weights: ScoringWeights::default(),
            typosquat: TyposquatConfig::default(),
            thresholds: HeuristicThresholds::default(),
            identity: IdentityPolicy::default(),
            traversal: TraversalConfig::default(),
            network: NetworkConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            payload: 50,
            resurrection: 40,
            obfuscation: 30,
            reputation: 20,
            identity: 10,
            velocity: 10,
        }
    }
}

impl ScoringWeights {
    /// Points deducted when the given heuristic fails
    pub fn weight_for(&self, kind: HeuristicKind) -> u32 {
        match kind {
            HeuristicKind::Typosquatting => 0,
            HeuristicKind::Payload => self.payload,
            HeuristicKind::Resurrection => self.resurrection,
            HeuristicKind::Obfuscation => self.obfuscation,
            HeuristicKind::Reputation => self.reputation,
            HeuristicKind::Identity => self.identity,
            HeuristicKind::Velocity => self.velocity,
        }
    }
}

impl Default for TyposquatConfig {
    fn default() -> Self {
        let targets = [
            ("ansible", 1),
            ("boto3", 1),
            ("botocore", 1),
            ("celery", 1),
            ("cryptography", 2),
            ("django", 1),
            ("flask", 1),
            ("jinja2", 1),
            ("matplotlib", 2),
            ("numpy", 1),
            ("openai", 1),
            ("pandas", 1),
            ("pillow", 1),
            ("pip", 1),
            ("psycopg2", 1),
            ("pydantic", 1),
            ("pyjwt", 1),
            ("pyyaml", 1),
            ("requests", 1),
            ("requests-oauthlib", 1),
            ("scipy", 1),
            ("selenium", 1),
            ("sqlalchemy", 1),
            ("tensorflow", 2),
            ("torch", 1),
            ("tqdm", 1),
            ("urllib3", 1),
        ]
        .into_iter()
        .map(|(name, distance)| (name.to_string(), distance))
        .collect();

        Self {
            targets,
            keyword_extra_chars: 8,
        }
    }
}

impl Default for HeuristicThresholds {
    fn default() -> Self {
        Self {
            giant_immunity_releases: 50,
            dormancy_gap_days: 730, // 2 years
            resurrection_window_days: 14,
            inflation_downloads: 10_000,
            inflation_max_age_days: 7,
            velocity_max_releases: 15,
            velocity_window_days: 3,
            entropy_limit: 5.0,
            skeleton_sdist_bytes: 2048,
            payload_extensions: [".exe", ".msi", ".sh", ".bat", ".bin"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl Default for IdentityPolicy {
    fn default() -> Self {
        let brands = ["google", "microsoft", "amazon", "apple", "adobe", "openai"]
            .into_iter()
            .map(|brand| (brand.to_string(), format!("{}.com", brand)))
            .collect();

        Self {
            immunity_releases: 30,
            brand_check: true,
            brands,
            free_mail_domains: [
                "gmail.com",
                "googlemail.com",
                "yahoo.com",
                "hotmail.com",
                "outlook.com",
                "live.com",
                "aol.com",
                "icloud.com",
                "proton.me",
                "protonmail.com",
                "mail.ru",
                "yandex.ru",
                "qq.com",
                "163.com",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl Default for TraversalConfig {
    fn default() -> Self {
        Self {
            max_depth: 2,
            max_concurrency: 8,
            trust_is_transitive: true,
            fetch_timeout_secs: 15,
        }
    }
}

impl TraversalConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            timeout_secs: 5,
            max_retries: 2,
            request_delay_ms: 200,
        }
    }
}

impl NetworkConfig {
    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Get retry backoff as Duration
    pub fn request_delay(&self) -> Duration {
        Duration::from_millis(self.request_delay_ms)
    }
}

impl StorageConfig {
    pub fn trust_store_path(&self) -> PathBuf {
        self.trust_store_path
            .clone()
            .unwrap_or_else(|| app_dir().join(TRUST_STORE_FILE))
    }

    pub fn cache_path(&self) -> PathBuf {
        self.cache_path
            .clone()
            .unwrap_or_else(|| app_dir().join(CACHE_FILE))
    }
}

fn app_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

/// Default location of the user configuration file
pub fn default_config_path() -> PathBuf {
    app_dir().join(CONFIG_FILE)
}

impl AuditConfig {
    /// Create a new builder for AuditConfig
    pub fn builder() -> AuditConfigBuilder {
        AuditConfigBuilder::default()
    }

    /// Load the configuration from `path` (or the default location).
    ///
    /// A missing file yields the defaults; a file that exists but does not
    /// parse is an error rather than a silent fallback.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// Parse user overrides and merge them over the defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let overrides: toml::Table = toml::from_str(content)?;

        let mut merged = match toml::Value::try_from(Self::default()) {
            Ok(toml::Value::Table(table)) => table,
            Ok(_) => return Err(AuditError::config("default configuration is not a table")),
            Err(e) => return Err(AuditError::config(format!("cannot serialize defaults: {}", e))),
        };
        deep_merge(&mut merged, overrides);

        let config: AuditConfig = toml::Value::Table(merged).try_into()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.pass_threshold > 100 {
            return Err(AuditError::config(format!(
                "pass_threshold must be within 0-100, got {}",
                self.pass_threshold
            )));
        }
        if self.traversal.max_concurrency == 0 {
            return Err(AuditError::config("traversal.max_concurrency must be at least 1"));
        }
        if self.traversal.fetch_timeout_secs == 0 {
            return Err(AuditError::config("traversal.fetch_timeout_secs must be at least 1"));
        }
        if self.network.timeout_secs == 0 {
            return Err(AuditError::config("network.timeout_secs must be at least 1"));
        }
        Ok(())
    }
}

fn deep_merge(base: &mut toml::Table, overrides: toml::Table) {
    for (key, value) in overrides {
        match value {
            toml::Value::Table(incoming) => match base.get_mut(&key) {
                Some(toml::Value::Table(existing)) => deep_merge(existing, incoming),
                _ => {
                    base.insert(key, toml::Value::Table(incoming));
                }
            },
            other => {
                base.insert(key, other);
            }
        }
    }
}

/// Builder for AuditConfig
#[derive(Default)]
pub struct AuditConfigBuilder {
    pass_threshold: Option<u8>,
    scoring_weights: Option<ScoringWeights>,
    typosquat: Option<TyposquatConfig>,
    thresholds: Option<HeuristicThresholds>,
    identity: Option<IdentityPolicy>,
    traversal: Option<TraversalConfig>,
    network: Option<NetworkConfig>,
    storage: Option<StorageConfig>,
}

impl AuditConfigBuilder {
    pub fn pass_threshold(mut self, threshold: u8) -> Self {
        self.pass_threshold = Some(threshold);
        self
    }

    pub fn scoring_weights(mut self, weights: ScoringWeights) -> Self {
        self.scoring_weights = Some(weights);
        self
    }

    pub fn typosquat(mut self, typosquat: TyposquatConfig) -> Self {
        self.typosquat = Some(typosquat);
        self
    }

    pub fn thresholds(mut self, thresholds: HeuristicThresholds) -> Self {
        self.thresholds = Some(thresholds);
        self
    }

    pub fn identity(mut self, identity: IdentityPolicy) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn traversal(mut self, traversal: TraversalConfig) -> Self {
        self.traversal = Some(traversal);
        self
    }

    pub fn network(mut self, network: NetworkConfig) -> Self {
        self.network = Some(network);
        self
    }

    pub fn storage(mut self, storage: StorageConfig) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn build(self) -> AuditConfig {
        AuditConfig {
            pass_threshold: self.pass_threshold.unwrap_or(80),
            scoring_weights: self.scoring_weights.unwrap_or_default(),
            typosquat: self.typosquat.unwrap_or_default(),
            thresholds: self.thresholds.unwrap_or_default(),
            identity: self.identity.unwrap_or_default(),
            traversal: self.traversal.unwrap_or_default(),
            network: self.network.unwrap_or_default(),
            storage: self.storage.unwrap_or_default(),
        }
    }
}
