//! Release-history heuristics: resurrection, download inflation, velocity

use crate::config::HeuristicThresholds;
use crate::metadata::PackageMetadata;
use crate::types::{Evidence, Finding, HeuristicKind};
use chrono::{DateTime, Utc};
use serde_json::json;

/// Whole days between two instants, never negative
fn days_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> i64 {
    later.signed_duration_since(earlier).num_days().max(0)
}

/// Age in days of the oldest upload, counting a same-day package as one day old
fn package_age_days(meta: &PackageMetadata, now: DateTime<Utc>) -> Option<i64> {
    meta.upload_times()
        .first()
        .map(|first| days_between(*first, now).max(1))
}

/// A long-dormant project that suddenly ships a release looks like an
/// account takeover. Projects with a large release history are immune.
pub fn check_resurrection(
    meta: &PackageMetadata,
    thresholds: &HeuristicThresholds,
    now: DateTime<Utc>,
) -> Finding {
    let releases = meta.release_count();
    let mut evidence = Evidence::new();
    evidence.insert("releases".into(), json!(releases));

    if releases < 2 {
        evidence.insert("status".into(), json!("new"));
        return Finding::new(HeuristicKind::Resurrection, true, evidence);
    }

    if releases > thresholds.giant_immunity_releases {
        evidence.insert("status".into(), json!("immune (giant)"));
        return Finding::new(HeuristicKind::Resurrection, true, evidence);
    }

    let times = meta.upload_times();
    let max_gap = times
        .windows(2)
        .map(|pair| days_between(pair[0], pair[1]))
        .max()
        .unwrap_or(0);
    evidence.insert("max_gap_days".into(), json!(max_gap));

    let Some(last) = times.last() else {
        evidence.insert("status".into(), json!("no upload history"));
        return Finding::new(HeuristicKind::Resurrection, true, evidence);
    };
    let last_release_age = days_between(*last, now);
    evidence.insert("last_release_age_days".into(), json!(last_release_age));

    let resurrected = max_gap > thresholds.dormancy_gap_days
        && last_release_age < thresholds.resurrection_window_days;
    Finding::new(HeuristicKind::Resurrection, !resurrected, evidence)
}

/// Heavy download counts on a package that is only days old point at
/// bot-inflated trust signals.
pub fn check_reputation(
    meta: &PackageMetadata,
    thresholds: &HeuristicThresholds,
    now: DateTime<Utc>,
) -> Finding {
    let downloads = meta.last_month_downloads();
    let mut evidence = Evidence::new();
    evidence.insert("downloads".into(), json!(downloads));

    let Some(days_old) = package_age_days(meta, now) else {
        evidence.insert("days_old".into(), json!(0));
        return Finding::new(HeuristicKind::Reputation, true, evidence);
    };
    evidence.insert("days_old".into(), json!(days_old));

    let inflated = downloads > thresholds.inflation_downloads
        && days_old <= thresholds.inflation_max_age_days;
    Finding::new(HeuristicKind::Reputation, !inflated, evidence)
}

/// Many versions pushed within the first days of a package's life
pub fn check_velocity(
    meta: &PackageMetadata,
    thresholds: &HeuristicThresholds,
    now: DateTime<Utc>,
) -> Finding {
    let releases = meta.release_count();
    let mut evidence = Evidence::new();
    evidence.insert("releases".into(), json!(releases));

    let Some(days_old) = package_age_days(meta, now) else {
        evidence.insert("days_old".into(), json!(0));
        return Finding::new(HeuristicKind::Velocity, true, evidence);
    };
    evidence.insert("days_old".into(), json!(days_old));

    let flooding = releases > thresholds.velocity_max_releases
        && days_old < thresholds.velocity_window_days;
    Finding::new(HeuristicKind::Velocity, !flooding, evidence)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::ReleaseFile;
    use chrono::Duration;

    fn file_at(time: DateTime<Utc>) -> ReleaseFile {
        ReleaseFile {
            filename: "pkg.tar.gz".into(),
            upload_time: Some(time.format("%Y-%m-%dT%H:%M:%S").to_string()),
            ..ReleaseFile::default()
        }
    }

    /// One release per timestamp, versions 0.0.N in order
    fn with_releases(times: &[DateTime<Utc>]) -> PackageMetadata {
        let mut meta = PackageMetadata::default();
        for (i, time) in times.iter().enumerate() {
            meta.releases.insert(format!("0.0.{}", i), vec![file_at(*time)]);
        }
        meta
    }

    #[test]
    fn test_resurrection_flags_dormant_takeover() {
        let now = Utc::now();
        let meta = with_releases(&[now - Duration::days(805), now - Duration::days(5)]);

        let finding = check_resurrection(&meta, &HeuristicThresholds::default(), now);
        assert!(finding.failed());
        assert_eq!(finding.evidence["max_gap_days"], 800);
        assert_eq!(finding.evidence["last_release_age_days"], 5);
    }

    #[test]
    fn test_resurrection_giant_immunity() {
        let now = Utc::now();
        let mut times = vec![now - Duration::days(3000); 58];
        times.push(now - Duration::days(805));
        times.push(now - Duration::days(5));
        let meta = with_releases(&times);
        assert_eq!(meta.release_count(), 60);

        let finding = check_resurrection(&meta, &HeuristicThresholds::default(), now);
        assert!(finding.passed());
        assert_eq!(finding.evidence["status"], "immune (giant)");
    }

    #[test]
    fn test_resurrection_old_release_is_fine() {
        let now = Utc::now();
        let meta = with_releases(&[now - Duration::days(1200), now - Duration::days(100)]);
        assert!(check_resurrection(&meta, &HeuristicThresholds::default(), now).passed());
    }

    #[test]
    fn test_resurrection_single_release_is_new() {
        let now = Utc::now();
        let meta = with_releases(&[now]);
        let finding = check_resurrection(&meta, &HeuristicThresholds::default(), now);
        assert!(finding.passed());
        assert_eq!(finding.evidence["status"], "new");
    }

    #[test]
    fn test_reputation_inflated_downloads() {
        let now = Utc::now();
        let mut meta = with_releases(&[now]);
        meta.info.downloads = Some(crate::metadata::Downloads {
            last_month: Some(50_000),
            ..Default::default()
        });

        let finding = check_reputation(&meta, &HeuristicThresholds::default(), now);
        assert!(finding.failed());
        assert!(finding.evidence["days_old"].as_i64().unwrap() <= 7);
    }

    #[test]
    fn test_reputation_established_package() {
        let now = Utc::now();
        let mut meta = with_releases(&[now - Duration::days(400)]);
        meta.info.downloads = Some(crate::metadata::Downloads {
            last_month: Some(50_000),
            ..Default::default()
        });
        assert!(check_reputation(&meta, &HeuristicThresholds::default(), now).passed());
    }

    #[test]
    fn test_velocity_release_flood() {
        let now = Utc::now();
        let meta = with_releases(&vec![now - Duration::hours(2); 20]);

        let finding = check_velocity(&meta, &HeuristicThresholds::default(), now);
        assert!(finding.failed());
        assert_eq!(finding.evidence["releases"], 20);
    }

    #[test]
    fn test_missing_history_is_safe() {
        let now = Utc::now();
        let meta = PackageMetadata::default();
        let thresholds = HeuristicThresholds::default();

        assert!(check_resurrection(&meta, &thresholds, now).passed());
        assert!(check_reputation(&meta, &thresholds, now).passed());
        assert!(check_velocity(&meta, &thresholds, now).passed());
    }
}
