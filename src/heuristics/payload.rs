//! Release file inspection: executable payloads, skeleton sdists and
//! randomized filenames

use crate::config::HeuristicThresholds;
use crate::metadata::PackageMetadata;
use crate::types::{Evidence, Finding, HeuristicKind};
use serde_json::json;
use std::collections::HashMap;

/// Shannon entropy in bits per symbol over the characters of `data`.
/// The empty string has zero entropy.
pub fn shannon_entropy(data: &str) -> f64 {
    let mut counts: HashMap<char, usize> = HashMap::new();
    let mut length = 0usize;
    for c in data.chars() {
        *counts.entry(c).or_insert(0) += 1;
        length += 1;
    }
    if length == 0 {
        return 0.0;
    }

    let length = length as f64;
    counts
        .values()
        .map(|&count| {
            let p = count as f64 / length;
            -p * p.log2()
        })
        .sum()
}

/// True when any dot-separated segment after the stem is a listed extension,
/// so `setup.sh.tar.gz` is caught as well as `setup.sh`.
fn has_executable_extension(filename: &str, extensions: &[String]) -> bool {
    let lower = filename.to_lowercase();
    lower.split('.').skip(1).any(|segment| {
        extensions
            .iter()
            .any(|ext| ext.trim_start_matches('.').eq_ignore_ascii_case(segment))
    })
}

/// Executable-style files or a skeleton source distribution in the current
/// release.
pub fn check_payload(meta: &PackageMetadata, thresholds: &HeuristicThresholds) -> Finding {
    let files = meta.current_release_files();

    let suspicious: Vec<&str> = files
        .iter()
        .filter(|f| has_executable_extension(&f.filename, &thresholds.payload_extensions))
        .map(|f| f.filename.as_str())
        .collect();

    let sdists: Vec<_> = files.iter().filter(|f| f.is_sdist()).collect();
    let skeleton = match sdists.as_slice() {
        [only] => only
            .size
            .filter(|size| *size < thresholds.skeleton_sdist_bytes)
            .map(|size| json!({ "filename": only.filename, "size": size })),
        _ => None,
    };

    let mut evidence = Evidence::new();
    evidence.insert("files_inspected".into(), json!(files.len()));
    evidence.insert(
        "suspicious".into(),
        if suspicious.is_empty() { json!("none") } else { json!(suspicious) },
    );
    let passed = suspicious.is_empty() && skeleton.is_none();
    evidence.insert("skeleton".into(), skeleton.unwrap_or(json!(null)));

    Finding::new(HeuristicKind::Payload, passed, evidence)
}

/// Release filenames with implausibly high character entropy
pub fn check_obfuscation(meta: &PackageMetadata, thresholds: &HeuristicThresholds) -> Finding {
    let files = meta.current_release_files();

    let high_entropy: Vec<_> = files
        .iter()
        .filter(|f| shannon_entropy(&f.filename) > thresholds.entropy_limit)
        .map(|f| json!({ "filename": f.filename, "entropy": shannon_entropy(&f.filename) }))
        .collect();

    let mut evidence = Evidence::new();
    evidence.insert("files_inspected".into(), json!(files.len()));
    evidence.insert("entropy_limit".into(), json!(thresholds.entropy_limit));
    let passed = high_entropy.is_empty();
    evidence.insert(
        "high_entropy".into(),
        if passed { json!("none") } else { json!(high_entropy) },
    );

    Finding::new(HeuristicKind::Obfuscation, passed, evidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ReleaseFile;

    fn release(files: Vec<ReleaseFile>) -> PackageMetadata {
        let mut meta = PackageMetadata::default();
        meta.info.version = Some("1.0.0".into());
        meta.releases.insert("1.0.0".into(), files);
        meta
    }

    fn file(name: &str, packagetype: &str, size: u64) -> ReleaseFile {
        ReleaseFile {
            filename: name.into(),
            packagetype: Some(packagetype.into()),
            size: Some(size),
            ..ReleaseFile::default()
        }
    }

    #[test]
    fn test_entropy_properties() {
        assert_eq!(shannon_entropy(""), 0.0);
        assert_eq!(shannon_entropy("aaaa"), 0.0);
        assert!((shannon_entropy("ab") - 1.0).abs() < 1e-12);
        assert!((shannon_entropy("abcd") - 2.0).abs() < 1e-12);
        assert!((shannon_entropy("abcdefghabcdefgh") - 3.0).abs() < 1e-12);
        assert!(shannon_entropy("abcABC123!") > 2.0);
    }

    #[test]
    fn test_executable_in_release() {
        let meta = release(vec![
            file("tool-1.0.0.tar.gz", "sdist", 50_000),
            file("installer.exe", "bdist_wheel", 900_000),
        ]);
        let finding = check_payload(&meta, &HeuristicThresholds::default());
        assert!(finding.failed());
        assert_eq!(finding.evidence["suspicious"][0], "installer.exe");
    }

    #[test]
    fn test_nested_extension_detected() {
        assert!(has_executable_extension("setup.SH.tar.gz", &[".sh".to_string()]));
        assert!(!has_executable_extension("shiny-1.0.tar.gz", &[".sh".to_string()]));
        assert!(!has_executable_extension("robin-0.1-py3-none-any.whl", &[".bin".to_string()]));
    }

    #[test]
    fn test_skeleton_sdist() {
        let meta = release(vec![file("tiny-1.0.0.tar.gz", "sdist", 900)]);
        let finding = check_payload(&meta, &HeuristicThresholds::default());
        assert!(finding.failed());
        assert_eq!(finding.evidence["skeleton"]["size"], 900);
    }

    #[test]
    fn test_regular_release_passes() {
        let meta = release(vec![
            file("requests-2.31.0.tar.gz", "sdist", 110_000),
            file("requests-2.31.0-py3-none-any.whl", "bdist_wheel", 62_000),
        ]);
        let thresholds = HeuristicThresholds::default();
        assert!(check_payload(&meta, &thresholds).passed());
        assert!(check_obfuscation(&meta, &thresholds).passed());
    }

    #[test]
    fn test_randomized_filename() {
        let name = "aB3xQ9zK7mW2pL5vR8tY1uN4cE6hJ0gD.whl";
        assert!(shannon_entropy(name) > 5.0);

        let meta = release(vec![file(name, "bdist_wheel", 30_000)]);
        let finding = check_obfuscation(&meta, &HeuristicThresholds::default());
        assert!(finding.failed());
    }

    #[test]
    fn test_no_files_is_safe() {
        let meta = PackageMetadata::default();
        let thresholds = HeuristicThresholds::default();
        assert!(check_payload(&meta, &thresholds).passed());
        assert!(check_obfuscation(&meta, &thresholds).passed());
    }
}
