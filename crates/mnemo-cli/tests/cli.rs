//! End-to-end CLI runs against a scratch chain directory.

use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
use tempfile::TempDir;

fn mnemo(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("mnemo").expect("binary builds");
    cmd.env_remove("CHAIN_DIR");
    cmd.env_remove("WRITER_KEY_PATH");
    cmd.arg("--chain-dir").arg(dir);
    cmd
}

fn init_chain(dir: &Path) {
    mnemo(dir).arg("init").assert().success();
}

fn add(dir: &Path, content: &str) {
    mnemo(dir).args(["add", content]).assert().success();
}

#[test]
fn init_add_recall_verify_stats() {
    let tmp = TempDir::new().unwrap();
    init_chain(tmp.path());

    mnemo(tmp.path())
        .args(["add", "user prefers dark mode", "--importance", "0.8"])
        .assert()
        .success()
        .stdout(predicate::str::contains("committed seq 0"));

    mnemo(tmp.path())
        .args(["recall", "dark"])
        .assert()
        .success()
        .stdout(predicate::str::contains("user prefers dark mode"));

    mnemo(tmp.path())
        .arg("verify")
        .assert()
        .success()
        .stdout(predicate::str::contains("ok: 1 entries verified"));

    mnemo(tmp.path())
        .arg("stats")
        .assert()
        .success()
        .stdout(predicate::str::contains("head seq: 0"))
        .stdout(predicate::str::contains("kind/memory: 1"));
}

#[test]
fn rethink_consolidates_and_filters() {
    let tmp = TempDir::new().unwrap();
    init_chain(tmp.path());
    add(tmp.path(), "fact A");
    add(tmp.path(), "fact B");

    mnemo(tmp.path())
        .args(["rethink", "--supersedes", "0,1", "facts A and B, unified"])
        .assert()
        .success()
        .stdout(predicate::str::contains("consolidated into seq 2"));

    mnemo(tmp.path())
        .args(["recall", "fact"])
        .assert()
        .success()
        .stdout(predicate::str::contains("unified"))
        .stdout(predicate::str::contains("fact A").not());

    mnemo(tmp.path())
        .args(["recall", "fact", "--include-superseded"])
        .assert()
        .success()
        .stdout(predicate::str::contains("fact A"))
        .stdout(predicate::str::contains("fact B"));
}

#[test]
fn block_set_versions() {
    let tmp = TempDir::new().unwrap();
    init_chain(tmp.path());

    mnemo(tmp.path())
        .args(["block-set", "persona", "I am a careful assistant"])
        .assert()
        .success()
        .stdout(predicate::str::contains("version 1"));

    mnemo(tmp.path())
        .args(["block-set", "persona", "I am a meticulous assistant"])
        .assert()
        .success()
        .stdout(predicate::str::contains("version 2"));
}

#[test]
fn verify_reports_tampering_with_stable_exit_code() {
    let tmp = TempDir::new().unwrap();
    init_chain(tmp.path());
    for text in ["one", "two", "three"] {
        add(tmp.path(), text);
    }

    let path = tmp.path().join("chain.jsonl");
    let text = std::fs::read_to_string(&path).unwrap();
    let mut lines: Vec<String> = text.lines().map(str::to_owned).collect();
    let marker = "\"signature\":\"";
    let at = lines[2].find(marker).unwrap() + marker.len();
    let mut bytes = lines[2].clone().into_bytes();
    bytes[at] = if bytes[at] == b'0' { b'1' } else { b'0' };
    lines[2] = String::from_utf8(bytes).unwrap();
    std::fs::write(&path, lines.join("\n") + "\n").unwrap();

    mnemo(tmp.path())
        .arg("verify")
        .assert()
        .code(7)
        .stdout(predicate::str::contains("verify: seq=2 invariant=signature"));
}

#[test]
fn error_tags_map_to_exit_codes() {
    let tmp = TempDir::new().unwrap();
    init_chain(tmp.path());
    add(tmp.path(), "only entry");

    mnemo(tmp.path())
        .args(["add", "too sure of itself", "--importance", "2.0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("error[invalid_input]"));

    mnemo(tmp.path())
        .args(["introspect", "99"])
        .assert()
        .code(3)
        .stderr(predicate::str::contains("error[unknown_seq]"));

    mnemo(tmp.path())
        .args(["anchor", "--provider", "nowhere"])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("error[backend_unavailable]"));
}

#[test]
fn anchor_lifecycle_through_the_mock_backend() {
    let tmp = TempDir::new().unwrap();
    init_chain(tmp.path());
    add(tmp.path(), "anchor me");

    mnemo(tmp.path())
        .args(["anchor", "--provider", "mock", "--estimate", "--count", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("estimated fee for 3 anchor(s)"));

    mnemo(tmp.path())
        .args(["anchor", "--provider", "mock"])
        .assert()
        .success()
        .stdout(predicate::str::contains("status=pending"));

    // The mock settles on the second upgrade pass; the attempt count rides
    // on the receipt, so separate CLI processes see it advance.
    mnemo(tmp.path())
        .args(["anchor-status", "--upgrade"])
        .assert()
        .success()
        .stdout(predicate::str::contains("pending"));
    mnemo(tmp.path())
        .args(["anchor-status", "--upgrade"])
        .assert()
        .success()
        .stdout(predicate::str::contains("confirmed"));

    // A further pass is a no-op.
    mnemo(tmp.path())
        .args(["anchor-status", "--upgrade"])
        .assert()
        .success()
        .stdout(predicate::str::contains("confirmed"));
}

#[test]
fn export_streams_every_entry() {
    let tmp = TempDir::new().unwrap();
    init_chain(tmp.path());
    add(tmp.path(), "first");
    add(tmp.path(), "second");

    let output = mnemo(tmp.path())
        .args(["export", "--format", "json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let lines: Vec<&str> = std::str::from_utf8(&output)
        .unwrap()
        .lines()
        .filter(|l| !l.is_empty())
        .collect();
    assert_eq!(lines.len(), 2);
    for line in lines {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert!(value.get("content").is_some());
        assert!(value.get("signature").is_some());
    }

    mnemo(tmp.path())
        .args(["export", "--format", "markdown"])
        .assert()
        .success()
        .stdout(predicate::str::contains("## seq 0"));
}

#[test]
fn rebuild_recovers_a_lost_index() {
    let tmp = TempDir::new().unwrap();
    init_chain(tmp.path());
    add(tmp.path(), "survives rebuild");

    std::fs::remove_file(tmp.path().join("memory.db")).unwrap();
    mnemo(tmp.path())
        .arg("rebuild")
        .assert()
        .success()
        .stdout(predicate::str::contains("index rebuilt (1 entries)"));

    mnemo(tmp.path())
        .args(["recall", "survives"])
        .assert()
        .success()
        .stdout(predicate::str::contains("survives rebuild"));
}
