//! End-to-end tests for the `partsbin` binary.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

fn partsbin() -> Command {
    Command::cargo_bin("partsbin").unwrap()
}

#[test]
fn test_help() {
    partsbin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("create-user"));
}

#[test]
fn test_version() {
    partsbin()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("partsbin"));
}

#[test]
fn test_no_subcommand_fails() {
    partsbin()
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_init_creates_database() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("shop.db");

    partsbin()
        .current_dir(dir.path())
        .args(["init", "--db"])
        .arg(&db_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Initialized database"));

    assert!(db_path.exists());
}

#[test]
fn test_create_user() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("shop.db");

    partsbin()
        .current_dir(dir.path())
        .args(["create-user", "alice", "hunter22", "--db"])
        .arg(&db_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Created user 'alice'"));

    // Same username again is rejected.
    partsbin()
        .current_dir(dir.path())
        .args(["create-user", "alice", "hunter22", "--db"])
        .arg(&db_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("alice"));
}

#[test]
fn test_create_super_admin() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("shop.db");

    partsbin()
        .current_dir(dir.path())
        .args(["create-user", "root", "hunter22", "--super-admin", "--db"])
        .arg(&db_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("super admin"));
}

#[test]
fn test_create_user_short_password_rejected() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("shop.db");

    partsbin()
        .current_dir(dir.path())
        .args(["create-user", "bob", "abc", "--db"])
        .arg(&db_path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("at least 6 characters"));
}
