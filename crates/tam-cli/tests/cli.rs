//! CLI surface tests: exit codes and output files

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;

const SNAPSHOT: &str = r#"{
    "build_id": "b1",
    "accounts": [
        { "account_id": "a1", "name": "Acme", "is_parent": true,
          "is_customer": true, "arr": 300000.0,
          "territory": "West", "current_owner_id": "r1" },
        { "account_id": "a2", "name": "Globex", "is_parent": true,
          "is_customer": true, "arr": 500000.0,
          "territory": "Pac NW" }
    ],
    "reps": [
        { "rep_id": "r1", "name": "Jo", "region": "West",
          "is_active": true, "include_in_assignments": true },
        { "rep_id": "r2", "name": "Sam", "region": "West",
          "is_active": true, "include_in_assignments": true }
    ]
}"#;

const STRATEGIC_ONLY: &str = r#"{
    "build_id": "b1",
    "accounts": [
        { "account_id": "a1", "name": "Acme", "is_parent": true,
          "is_customer": true, "arr": 300000.0 }
    ],
    "reps": [
        { "rep_id": "s1", "name": "Strat", "region": "West",
          "is_active": true, "include_in_assignments": true,
          "is_strategic_rep": true }
    ]
}"#;

fn write_snapshot(dir: &Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join("snapshot.json");
    std::fs::write(&path, contents).unwrap();
    path
}

#[test]
fn assign_writes_proposals_and_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = write_snapshot(dir.path(), SNAPSHOT);
    let out = dir.path().join("out");

    Command::cargo_bin("tam")
        .unwrap()
        .args(["assign", "--build", "b1", "--cohort", "customer"])
        .arg("--snapshot")
        .arg(&snapshot)
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("proposals 2"));

    let proposals = std::fs::read_to_string(out.join("proposals.json")).unwrap();
    assert!(proposals.contains("\"a1\""));
    assert!(proposals.contains("\"a2\""));
    assert!(out.join("run_manifest.json").exists());
    assert!(out.join("warnings.json").exists());
    assert!(out.join("thresholds.json").exists());
}

#[test]
fn dry_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = write_snapshot(dir.path(), SNAPSHOT);
    let out = dir.path().join("out");

    Command::cargo_bin("tam")
        .unwrap()
        .args(["assign", "--build", "b1", "--cohort", "customer", "--dry-run"])
        .arg("--snapshot")
        .arg(&snapshot)
        .arg("--out")
        .arg(&out)
        .assert()
        .success();

    assert!(!out.exists());
}

#[test]
fn no_eligible_reps_exits_2() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = write_snapshot(dir.path(), STRATEGIC_ONLY);

    Command::cargo_bin("tam")
        .unwrap()
        .args(["assign", "--build", "b1", "--cohort", "customer"])
        .arg("--snapshot")
        .arg(&snapshot)
        .arg("--out")
        .arg(dir.path().join("out"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no eligible reps"));
}

#[test]
fn calibrate_prints_threshold_bands() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = write_snapshot(dir.path(), SNAPSHOT);

    Command::cargo_bin("tam")
        .unwrap()
        .args(["calibrate", "--build", "b1", "--cohort", "customer"])
        .arg("--snapshot")
        .arg(&snapshot)
        .assert()
        .success()
        .stdout(predicate::str::contains("DIMENSION"))
        .stdout(predicate::str::contains("ARR"));
}

#[test]
fn unknown_cohort_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let snapshot = write_snapshot(dir.path(), SNAPSHOT);

    Command::cargo_bin("tam")
        .unwrap()
        .args(["assign", "--build", "b1", "--cohort", "partner"])
        .arg("--snapshot")
        .arg(&snapshot)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("unknown cohort"));
}
