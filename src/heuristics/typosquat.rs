//! Typosquatting and keyword-stuffing detection

use crate::config::TyposquatConfig;
use crate::types::{Evidence, Finding, HeuristicKind};
use serde_json::json;

/// How a candidate name imitates a protected one
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SquatKind {
    /// Within the target's edit-distance threshold
    EditDistance { distance: usize },
    /// Contains the target verbatim, padded by a few extra characters
    KeywordStuffing { extra_chars: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SquatMatch {
    pub target: String,
    pub kind: SquatKind,
}

/// Levenshtein edit distance over Unicode scalar values
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (long, short) = if a.len() >= b.len() { (&a, &b) } else { (&b, &a) };

    if short.is_empty() {
        return long.len();
    }

    let mut previous: Vec<usize> = (0..=short.len()).collect();
    let mut current = vec![0; short.len() + 1];

    for (i, lc) in long.iter().enumerate() {
        current[0] = i + 1;
        for (j, sc) in short.iter().enumerate() {
            let substitution = previous[j] + usize::from(lc != sc);
            let insertion = previous[j + 1] + 1;
            let deletion = current[j] + 1;
            current[j + 1] = substitution.min(insertion).min(deletion);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[short.len()]
}

/// Find the first protected name that `package_name` imitates.
///
/// Targets are visited in name order. An exact match with a target is never
/// a squat of that target.
pub fn check_typosquatting(package_name: &str, config: &TyposquatConfig) -> Option<SquatMatch> {
    let name = package_name.to_lowercase();
    let name_len = name.chars().count();

    for (target, threshold) in &config.targets {
        let target = target.to_lowercase();
        if name == target {
            continue;
        }

        let distance = levenshtein_distance(&name, &target);
        if distance <= *threshold as usize {
            return Some(SquatMatch {
                target,
                kind: SquatKind::EditDistance { distance },
            });
        }

        if name.contains(&target) {
            let extra_chars = name_len - target.chars().count();
            if extra_chars <= config.keyword_extra_chars {
                return Some(SquatMatch {
                    target,
                    kind: SquatKind::KeywordStuffing { extra_chars },
                });
            }
        }
    }

    None
}

pub(crate) fn typosquat_finding(package_name: &str, config: &TyposquatConfig) -> Finding {
    let mut evidence = Evidence::new();

    match check_typosquatting(package_name, config) {
        Some(squat) => {
            evidence.insert("target".into(), json!(squat.target));
            match squat.kind {
                SquatKind::EditDistance { distance } => {
                    evidence.insert("method".into(), json!("edit_distance"));
                    evidence.insert("distance".into(), json!(distance));
                }
                SquatKind::KeywordStuffing { extra_chars } => {
                    evidence.insert("method".into(), json!("keyword"));
                    evidence.insert("extra_chars".into(), json!(extra_chars));
                }
            }
            Finding::new(HeuristicKind::Typosquatting, false, evidence)
        }
        None => {
            evidence.insert("target".into(), json!(null));
            evidence.insert("targets_checked".into(), json!(config.targets.len()));
            Finding::new(HeuristicKind::Typosquatting, true, evidence)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn targets(entries: &[(&str, u32)]) -> TyposquatConfig {
        TyposquatConfig {
            targets: entries
                .iter()
                .map(|(name, d)| (name.to_string(), *d))
                .collect::<BTreeMap<_, _>>(),
            keyword_extra_chars: 8,
        }
    }

    #[test]
    fn test_levenshtein_known_values() {
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("flaw", "lawn"), 2);
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("requests", "reqeusts"), 2);
    }

    #[test]
    fn test_levenshtein_metric_properties() {
        let words = ["", "a", "pip", "pipx", "requests", "request", "numpy", "nunpy", "ñandú"];
        for a in words {
            assert_eq!(levenshtein_distance(a, a), 0);
            for b in words {
                let ab = levenshtein_distance(a, b);
                assert_eq!(ab, levenshtein_distance(b, a));
                for c in words {
                    assert!(ab <= levenshtein_distance(a, c) + levenshtein_distance(c, b));
                }
            }
        }
    }

    #[test]
    fn test_keyword_stuffing() {
        let squat = check_typosquatting("requests-ultra", &targets(&[("requests", 1)])).unwrap();
        assert_eq!(squat.target, "requests");
        assert_eq!(squat.kind, SquatKind::KeywordStuffing { extra_chars: 6 });
    }

    #[test]
    fn test_keyword_budget_exceeded() {
        assert!(check_typosquatting("requests-toolbelt-x", &targets(&[("requests", 1)])).is_none());
    }

    #[test]
    fn test_edit_distance_squat_is_case_folded() {
        let squat = check_typosquatting("Reqests", &targets(&[("requests", 1)])).unwrap();
        assert_eq!(squat.kind, SquatKind::EditDistance { distance: 1 });
    }

    #[test]
    fn test_exact_match_is_not_a_squat() {
        assert!(check_typosquatting("requests", &targets(&[("requests", 1)])).is_none());
        assert!(check_typosquatting("NumPy", &targets(&[("numpy", 1)])).is_none());
    }

    #[test]
    fn test_larger_threshold_for_long_names() {
        let config = targets(&[("tensorflow", 2)]);
        assert!(check_typosquatting("tensorflwo", &config).is_some());
        assert!(check_typosquatting("tnesorflwo", &config).is_none());
    }

    #[test]
    fn test_finding_polarity() {
        let config = targets(&[("requests", 1)]);
        let squat = typosquat_finding("requestz", &config);
        assert!(squat.failed());
        assert_eq!(squat.evidence["target"], "requests");

        let clean = typosquat_finding("httpx", &config);
        assert!(clean.passed());
    }

    #[test]
    fn test_popular_tooling_clears_default_targets() {
        let config = TyposquatConfig::default();
        for name in ["docker-compose", "setuptools-scm", "fastapi-users"] {
            assert!(check_typosquatting(name, &config).is_none(), "{} flagged", name);
        }
    }
}
