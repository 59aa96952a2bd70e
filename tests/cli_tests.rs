//! Integration tests for the CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write a config that keeps all state inside `dir` and talks to `registry`
fn write_config(dir: &Path, registry: &str) -> PathBuf {
    let path = dir.join("config.toml");
    let content = format!(
        "[network]\nregistry_url = '{}'\nmax_retries = 0\n\n\
         [storage]\ntrust_store_path = '{}'\ncache_path = '{}'\n",
        registry,
        dir.join("trusted").display(),
        dir.join("cache.json").display(),
    );
    fs::write(&path, content).unwrap();
    path
}

fn cli(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("pkg-forensics").unwrap();
    cmd.arg("--config").arg(config);
    cmd
}

fn offline() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), "http://127.0.0.1:9");
    (dir, config)
}

#[test]
fn test_cli_check_help() {
    let mut cmd = Command::cargo_bin("pkg-forensics").unwrap();
    cmd.arg("check").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Audit a package before installing it"))
        .stdout(predicate::str::contains("--recursive"));
}

#[test]
fn test_cli_trust_help() {
    let mut cmd = Command::cargo_bin("pkg-forensics").unwrap();
    cmd.arg("trust").arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Add a package to the trust store"));
}

#[test]
fn test_cli_verify_creates_signed_store() {
    let (dir, config) = offline();

    cli(&config)
        .arg("verify")
        .assert()
        .success()
        .stdout(predicate::str::contains("signature is valid"));

    assert!(dir.path().join("trusted").exists());
    assert!(dir.path().join("trusted.sig").exists());
}

#[test]
fn test_cli_verify_detects_tampering_and_sign_accepts() {
    let (dir, config) = offline();
    cli(&config).arg("trust").arg("Requests").assert().success();

    let store = dir.path().join("trusted");
    assert!(fs::read_to_string(&store).unwrap().contains("requests\n"));
    fs::write(&store, "requests\nevil-pkg\n").unwrap();

    cli(&config)
        .arg("verify")
        .assert()
        .failure()
        .stderr(predicate::str::contains("INTEGRITY BREACH"));

    cli(&config).arg("trust").arg("numpy").assert().failure();

    cli(&config).arg("sign").assert().success();
    cli(&config).arg("verify").assert().success();
}

#[test]
fn test_cli_check_trusted_package_skips_registry() {
    let (_dir, config) = offline();
    cli(&config).arg("trust").arg("requests").assert().success();

    cli(&config)
        .arg("check")
        .arg("requests")
        .assert()
        .success()
        .stdout(predicate::str::contains("trust store"));
}

#[test]
fn test_cli_check_unknown_package_fails_open() {
    let mut server = mockito::Server::new();
    let _m = server
        .mock("GET", "/pypi/no-such-package/json")
        .with_status(404)
        .create();

    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &server.url());

    cli(&config)
        .arg("check")
        .arg("no-such-package")
        .assert()
        .success()
        .stdout(predicate::str::contains("Warning:"));
}

#[test]
fn test_cli_check_typosquat_exits_nonzero() {
    let mut server = mockito::Server::new();
    let _m = server
        .mock("GET", "/pypi/reqests/json")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(
            r#"{"info": {"name": "reqests", "version": "0.1.0", "author": "x",
                         "author_email": "x@example.org", "requires_dist": null},
                "releases": {"0.1.0": []}}"#,
        )
        .create();

    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &server.url());

    cli(&config)
        .arg("check")
        .arg("reqests")
        .arg("--json")
        .assert()
        .failure()
        .stdout(predicate::str::contains("\"passed\": false"))
        .stdout(predicate::str::contains("\"score\": 0"));
}

#[test]
fn test_cli_invalid_config_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("config.toml");
    fs::write(&config, "pass_threshold = 150\n").unwrap();

    cli(&config)
        .arg("verify")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load config"));
}
