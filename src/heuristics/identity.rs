//! Author identity: hidden maintainers and brand-jacking

use crate::config::IdentityPolicy;
use crate::metadata::PackageMetadata;
use crate::types::{Evidence, Finding, HeuristicKind};
use serde_json::json;

/// Domains of every address in a (possibly comma separated) author email
/// field such as `"Jane <jane@example.org>, ops@example.org"`.
pub fn email_domains(field: &str) -> Vec<String> {
    field
        .split(',')
        .filter_map(|address| address.rsplit_once('@'))
        .map(|(_, domain)| {
            domain
                .trim()
                .trim_end_matches('>')
                .trim()
                .to_lowercase()
        })
        .filter(|domain| !domain.is_empty())
        .collect()
}

fn domain_matches(domain: &str, expected: &str) -> bool {
    domain == expected || domain.ends_with(&format!(".{}", expected))
}

pub fn check_identity(package_name: &str, meta: &PackageMetadata, policy: &IdentityPolicy) -> Finding {
    let releases = meta.release_count();
    let author = meta.author();
    let email = meta.author_email();

    let mut evidence = Evidence::new();
    evidence.insert("author".into(), json!(author));
    evidence.insert("email".into(), json!(email));

    if releases > policy.immunity_releases {
        evidence.insert("status".into(), json!("immune (giant)"));
        return Finding::new(HeuristicKind::Identity, true, evidence);
    }

    if author.is_none() && email.is_none() {
        evidence.insert("reason".into(), json!("no author name or contact email"));
        return Finding::new(HeuristicKind::Identity, false, evidence);
    }

    if policy.brand_check {
        let name = package_name.to_lowercase();
        let domains = email.map(email_domains).unwrap_or_default();

        for (brand, brand_domain) in &policy.brands {
            if !name.contains(brand.as_str()) {
                continue;
            }

            let official = domains.iter().any(|d| domain_matches(d, brand_domain));
            let free_mail = domains.iter().any(|d| {
                policy
                    .free_mail_domains
                    .iter()
                    .any(|free| domain_matches(d, free))
            });

            if !official || free_mail {
                evidence.insert("reason".into(), json!(format!("suspected {} brand-jacking", brand)));
                evidence.insert("expected_domain".into(), json!(brand_domain));
                evidence.insert("free_mail".into(), json!(free_mail));
                return Finding::new(HeuristicKind::Identity, false, evidence);
            }
        }
    }

    Finding::new(HeuristicKind::Identity, true, evidence)
}
