//! Registry metadata document as served by the PyPI JSON API
//!
//! Every field is optional: heuristics read through the accessors below,
//! which fall back to the safest default when the registry omits a field or
//! sends `null`.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageMetadata {
    #[serde(default, deserialize_with = "null_as_default")]
    pub info: PackageInfo,
    /// Version string -> files uploaded for that version
    #[serde(default, deserialize_with = "null_as_default")]
    pub releases: BTreeMap<String, Vec<ReleaseFile>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackageInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub author_email: Option<String>,
    #[serde(default)]
    pub downloads: Option<Downloads>,
    #[serde(default)]
    pub requires_dist: Option<Vec<String>>,
}

/// Download counters. PyPI reports `-1` when statistics are unavailable.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Downloads {
    #[serde(default)]
    pub last_day: Option<i64>,
    #[serde(default)]
    pub last_week: Option<i64>,
    #[serde(default)]
    pub last_month: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReleaseFile {
    #[serde(default, deserialize_with = "null_as_default")]
    pub filename: String,
    /// `sdist`, `bdist_wheel`, ...
    #[serde(default)]
    pub packagetype: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
    #[serde(default)]
    pub upload_time: Option<String>,
    #[serde(default)]
    pub upload_time_iso_8601: Option<String>,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Parse a registry timestamp, with or without an explicit offset.
/// Naive timestamps are UTC.
pub fn parse_upload_time(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

impl ReleaseFile {
    pub fn uploaded_at(&self) -> Option<DateTime<Utc>> {
        self.upload_time_iso_8601
            .as_deref()
            .and_then(parse_upload_time)
            .or_else(|| self.upload_time.as_deref().and_then(parse_upload_time))
    }

    pub fn is_sdist(&self) -> bool {
        self.packagetype.as_deref() == Some("sdist")
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

impl PackageMetadata {
    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    /// Version the registry reports as current
    pub fn version(&self) -> Option<&str> {
        non_empty(self.info.version.as_ref())
    }

    pub fn author(&self) -> Option<&str> {
        non_empty(self.info.author.as_ref())
    }

    pub fn author_email(&self) -> Option<&str> {
        non_empty(self.info.author_email.as_ref())
    }

    /// Last-month downloads; unavailable statistics count as zero
    pub fn last_month_downloads(&self) -> i64 {
        self.info
            .downloads
            .as_ref()
            .and_then(|d| d.last_month)
            .unwrap_or(0)
            .max(0)
    }

    pub fn requires_dist(&self) -> &[String] {
        self.info.requires_dist.as_deref().unwrap_or(&[])
    }

    /// Number of published versions
    pub fn release_count(&self) -> usize {
        self.releases.len()
    }

    /// Every parseable upload timestamp across all releases, oldest first
    pub fn upload_times(&self) -> Vec<DateTime<Utc>> {
        let mut times: Vec<_> = self
            .releases
            .values()
            .flatten()
            .filter_map(ReleaseFile::uploaded_at)
            .collect();
        times.sort();
        times
    }

    /// Files uploaded for the current version
    pub fn current_release_files(&self) -> &[ReleaseFile] {
        self.version()
            .and_then(|v| self.releases.get(v))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}
