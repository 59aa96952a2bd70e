//! Operator trust store with a tamper-evident signature
//!
//! The store is a newline-delimited list of package names (`#` starts a
//! comment line). Names are compared in canonical registry form, so
//! `PyYAML` in the file matches an audit of `pyyaml`. Next to it lives `<store>.sig`, holding the SHA-256 hex
//! digest of the store's raw bytes. Any mismatch between the two means the
//! list was edited behind the tool's back, and audits must stop until the
//! operator re-signs.

use crate::error::Result;
use crate::parser::canonical_name;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const HEADER: &str = "# Trusted packages - one name per line\n";

#[derive(Debug, Clone)]
pub struct TrustStore {
    path: PathBuf,
    signature_path: PathBuf,
}

/// SHA-256 hex digest of `bytes`
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

impl TrustStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut signature = path.clone().into_os_string();
        signature.push(".sig");
        Self {
            path,
            signature_path: PathBuf::from(signature),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn signature_path(&self) -> &Path {
        &self.signature_path
    }

    /// Create an empty, signed store if none exists yet
    pub fn ensure_exists(&self) -> Result<()> {
        if self.path.exists() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, HEADER)?;
        info!("Created trust store at {}", self.path.display());
        self.sign()?;
        Ok(())
    }

    /// Every trusted name in the store, in canonical form
    pub fn trusted_names(&self) -> Result<BTreeSet<String>> {
        if !self.path.exists() {
            return Ok(BTreeSet::new());
        }
        Ok(fs::read_to_string(&self.path)?
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(canonical_name)
            .collect())
    }

    pub fn is_trusted(&self, name: &str) -> Result<bool> {
        Ok(self.trusted_names()?.contains(&canonical_name(name)))
    }

    /// Append `name` (canonicalised) unless it is already trusted. Returns
    /// whether the file changed; the caller re-signs afterwards.
    pub fn add(&self, name: &str) -> Result<bool> {
        let name = canonical_name(name);
        if self.is_trusted(&name)? {
            debug!("{} is already trusted", name);
            return Ok(false);
        }
        self.ensure_exists()?;

        let existing = fs::read(&self.path)?;
        let mut file = fs::OpenOptions::new().append(true).open(&self.path)?;
        if !existing.is_empty() && !existing.ends_with(b"\n") {
            file.write_all(b"\n")?;
        }
        writeln!(file, "{}", name)?;
        info!("Added {} to trust store", name);
        Ok(true)
    }

    /// Recompute and persist the signature over the current file bytes
    pub fn sign(&self) -> Result<String> {
        let digest = content_hash(&fs::read(&self.path)?);
        fs::write(&self.signature_path, &digest)?;
        debug!("Trust store signature updated: {}", digest);
        Ok(digest)
    }

    /// Check the store against its signature.
    ///
    /// An absent store has nothing to verify. A store without a signature
    /// is signed on first use.
    pub fn verify(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(true);
        }
        if !self.signature_path.exists() {
            warn!(
                "No signature for {}, trusting current contents on first use",
                self.path.display()
            );
            self.sign()?;
            return Ok(true);
        }

        let current = content_hash(&fs::read(&self.path)?);
        let stored = fs::read_to_string(&self.signature_path)?;
        Ok(stored.trim().eq_ignore_ascii_case(&current))
    }
}
