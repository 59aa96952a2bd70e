//! Parser for `requires_dist` requirement strings

use crate::metadata::PackageMetadata;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

fn name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z0-9][A-Za-z0-9._-]*)").expect("static requirement pattern")
    })
}

fn extra_marker() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\bextra\s*==").expect("static marker pattern"))
}

fn separator_run() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[-_.]+").expect("static separator pattern"))
}

/// Registry form of a project name: lower-cased, with every run of `-`, `_`
/// and `.` collapsed to a single `-`. `PyYAML`, `typing_extensions` and
/// `zope.interface` become `pyyaml`, `typing-extensions` and `zope-interface`.
pub fn canonical_name(name: &str) -> String {
    separator_run()
        .replace_all(name.trim(), "-")
        .to_lowercase()
}

/// Extract the canonical project name from one requirement string, e.g.
/// `"Requests[socks] (>=2.0) ; python_version > '3.7'"` -> `requests`.
///
/// Returns `None` for requirements that only apply to an optional extra.
pub fn parse_requirement(requirement: &str) -> Option<String> {
    if let Some((_, marker)) = requirement.split_once(';') {
        if extra_marker().is_match(marker) {
            return None;
        }
    }

    name_pattern()
        .captures(requirement)
        .and_then(|caps| caps.get(1))
        .map(|m| canonical_name(m.as_str()))
}

/// Unique lower-cased names of the direct, non-optional dependencies
pub fn get_dependencies(metadata: &PackageMetadata) -> BTreeSet<String> {
    metadata
        .requires_dist()
        .iter()
        .filter_map(|req| parse_requirement(req))
        .collect()
}
