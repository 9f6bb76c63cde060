//! CLI tests for sqlite-clean: argument parsing, output and exit codes.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use rusqlite::Connection;
use tempfile::TempDir;

fn cmd() -> Command {
    Command::cargo_bin("sqlite-clean").unwrap()
}

fn create_db(dir: &TempDir, with_like_null: bool) -> PathBuf {
    let path = dir.path().join("cli.sqlite");
    let conn = Connection::open(&path).unwrap();
    conn.execute_batch(
        "CREATE TABLE tbl_a (col_integer INTEGER NOT NULL, col_text TEXT);
         INSERT INTO tbl_a VALUES (1, 'sample');",
    )
    .unwrap();
    if with_like_null {
        conn.execute("INSERT INTO tbl_a VALUES (2, 'None')", []).unwrap();
    }
    path
}

fn not_null(path: &Path) -> bool {
    let conn = Connection::open(path).unwrap();
    conn.query_row(
        "SELECT \"notnull\" FROM pragma_table_info('tbl_a') WHERE name = 'col_integer'",
        [],
        |r| r.get(0),
    )
    .unwrap()
}

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("lint"))
        .stdout(predicate::str::contains("fix"))
        .stdout(predicate::str::contains("catalog"))
        .stdout(predicate::str::contains("header"));
}

#[test]
fn test_fix_help_shows_options() {
    cmd()
        .args(["fix", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--db"))
        .stdout(predicate::str::contains("--dest-path"))
        .stdout(predicate::str::contains("--inplace"))
        .stdout(predicate::str::contains("--like-nulls"));
}

#[test]
fn test_lint_requires_db() {
    cmd()
        .arg("lint")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--db"));
}

#[test]
fn test_lint_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    cmd()
        .args(["lint", "--db"])
        .arg(dir.path().join("missing.sqlite"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_lint_clean_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_db(&dir, false);
    cmd()
        .args(["lint", "--db"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Database linted, no issues detected!"));
}

#[test]
fn test_lint_reports_like_nulls() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_db(&dir, true);
    cmd()
        .args(["lint", "--db"])
        .arg(&path)
        .assert()
        .code(1)
        .stdout(predicate::str::contains("L0002:"))
        .stdout(predicate::str::contains("L0001:").not());

    // A custom token list that does not cover the value finds nothing.
    cmd()
        .args(["lint", "--like-nulls", "missing,n/a", "--db"])
        .arg(&path)
        .assert()
        .success();
}

#[test]
fn test_fix_inplace() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_db(&dir, true);
    cmd()
        .args(["fix", "--db"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Database fixed at"));

    assert!(!not_null(&path));
    cmd().args(["lint", "--db"]).arg(&path).assert().success();
}

#[test]
fn test_fix_to_dest_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_db(&dir, true);
    let dest = dir.path().join("fixed.sqlite");
    cmd()
        .args(["fix", "--inplace", "false", "--dest-path"])
        .arg(&dest)
        .arg("--db")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("fixed.sqlite"));

    assert!(not_null(&path));
    assert!(!not_null(&dest));
}

#[test]
fn test_catalog_json() {
    let output = cmd().args(["catalog", "--json"]).assert().success();
    let stdout = String::from_utf8_lossy(&output.get_output().stdout).to_string();
    let v: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(v["lint"][0]["id"], "L0001");
    assert_eq!(v["lint"][1]["ref"], "contains_str_like_null");
    assert_eq!(v["fix"][0]["id"], "F0001");
}

#[test]
fn test_catalog_text() {
    cmd()
        .arg("catalog")
        .assert()
        .success()
        .stdout(predicate::str::contains("L0001\tlint"))
        .stdout(predicate::str::contains("F0001\tfix"));
}

#[test]
fn test_header() {
    let dir = tempfile::tempdir().unwrap();
    let path = create_db(&dir, false);
    cmd()
        .args(["header", "--db"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("page size:"))
        .stdout(predicate::str::contains("text encoding: UTF-8"));
}

#[test]
fn test_header_rejects_non_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("not_a_db.txt");
    std::fs::write(&path, vec![b'x'; 200]).unwrap();
    cmd()
        .args(["header", "--db"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("magic bytes"));
}
