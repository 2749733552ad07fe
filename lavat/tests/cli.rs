//! End-to-end CLI tests.

use assert_cmd::Command;
use predicates::prelude::*;

fn write_unit(dir: &tempfile::TempDir) -> std::path::PathBuf {
    // return 1.5 + 2.5
    let unit = serde_json::json!({
        "protos": [{
            "name": "main",
            "arg_count": 0,
            "code": {
                "code": [
                    { "LoadR": { "dst": 0, "cp": 0 } },
                    { "LoadR": { "dst": 1, "cp": 1 } },
                    { "Arith": { "op": "Add", "dst": 2, "lhs": 0, "rhs": 1 } },
                    { "Return": { "src": 2 } }
                ],
                "pool": { "reals": [1.5, 2.5], "strings": [] },
                "register_count": 3
            },
            "feedback": { "entries": [] }
        }],
        "main": 0
    });
    let path = dir.path().join("unit.json");
    std::fs::write(&path, serde_json::to_string_pretty(&unit).unwrap()).unwrap();
    path
}

#[test]
fn opt_prints_dot_graph_with_folded_constant() {
    let dir = tempfile::tempdir().unwrap();
    let unit = write_unit(&dir);
    Command::cargo_bin("lavat")
        .unwrap()
        .arg("opt")
        .arg(&unit)
        .assert()
        .success()
        .stdout(predicate::str::contains("digraph hir"))
        .stdout(predicate::str::contains("float64(4)"));
}

#[test]
fn opt_writes_dot_file() {
    let dir = tempfile::tempdir().unwrap();
    let unit = write_unit(&dir);
    let out = dir.path().join("graph.dot");
    Command::cargo_bin("lavat")
        .unwrap()
        .arg("opt")
        .arg(&unit)
        .arg("--dot")
        .arg(&out)
        .assert()
        .success();
    let text = std::fs::read_to_string(out).unwrap();
    assert!(text.contains("digraph hir"));
}

#[test]
fn summary_reports_node_count() {
    let dir = tempfile::tempdir().unwrap();
    let unit = write_unit(&dir);
    Command::cargo_bin("lavat")
        .unwrap()
        .arg("opt")
        .arg(&unit)
        .arg("--summary")
        .assert()
        .success()
        .stdout(predicate::str::contains("nodes:"));
}

#[test]
fn config_file_is_honored() {
    let dir = tempfile::tempdir().unwrap();
    let unit = write_unit(&dir);
    let config = dir.path().join("lavat.toml");
    std::fs::write(&config, "[compiler]\ndebug_passes = true\n").unwrap();
    Command::cargo_bin("lavat")
        .unwrap()
        .arg("--config")
        .arg(&config)
        .arg("opt")
        .arg(&unit)
        .assert()
        .success();
}

#[test]
fn malformed_unit_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.json");
    std::fs::write(&path, "{ not json").unwrap();
    Command::cargo_bin("lavat")
        .unwrap()
        .arg("opt")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("malformed unit"));
}
