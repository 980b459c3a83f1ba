use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

const POINT_ID: &str = "6c3a3f6e-8a3b-4f0e-9a57-3c0f5e1f2a10";
const LINE_ID: &str = "a1b2c3d4-e5f6-4a5b-8c7d-9e8f7a6b5c4d";

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../tests/fixtures").join(name)
}

fn stdout_json(output: &[u8]) -> Value {
    serde_json::from_slice(output).expect("stdout should contain valid json")
}

fn files_under(root: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        for entry in fs::read_dir(&dir).expect("directory should be readable") {
            let path = entry.expect("entry should be readable").path();
            if path.is_dir() {
                pending.push(path);
            } else {
                found.push(path);
            }
        }
    }
    found
}

#[test]
fn replicate_reports_copies_and_writes_points() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let points_root = temp.path().join("points");
    let document_path = temp.path().join("out/document.json");

    let output = cargo_bin_cmd!("regionmark")
        .arg("replicate")
        .arg("--document")
        .arg(fixture("point.json"))
        .arg("--frame")
        .arg(fixture("two-regions.json"))
        .arg("--points-root")
        .arg(&points_root)
        .arg("--output")
        .arg(&document_path)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let report = stdout_json(&output);
    assert_eq!(report["replicated"], 1);
    assert_eq!(report["replicasCreated"], 1);
    assert_eq!(report["groupsUpdated"], 0);
    assert_eq!(report["skipped"], 0);
    assert_eq!(report["graphicCount"], 2);

    let logs = files_under(&points_root);
    assert_eq!(logs.len(), 1, "one point log per region group");
    let log = &logs[0];
    assert!(log.starts_with(points_root.join("study-1.2.3/series-1.2.3.4/instance-1.2.3.4.5")));
    let name = log.file_name().and_then(|name| name.to_str()).expect("utf-8 file name");
    assert!(name.starts_with("frame-1_uid-"));
    assert!(name.ends_with(&format!("_point-{POINT_ID}.txt")));

    let contents = fs::read_to_string(log).expect("point log should be readable");
    let lines: Vec<&str> = contents.lines().collect();
    assert_eq!(lines, vec!["region,x,y", "0,50,50", "1,150,50"]);

    let saved: Value =
        serde_json::from_str(&fs::read_to_string(&document_path).expect("document should be written"))
            .expect("document should be valid json");
    let graphics = saved["graphics"].as_array().expect("graphics array");
    assert_eq!(graphics.len(), 2);
    let group = &graphics[0]["graphic"]["drag"]["regionGroup"];
    assert!(group.is_string());
    assert_eq!(&graphics[1]["graphic"]["drag"]["regionGroup"], group);
}

#[test]
fn replicate_skips_straddling_measurement() {
    cargo_bin_cmd!("regionmark")
        .arg("replicate")
        .arg("--document")
        .arg(fixture("straddling-line.json"))
        .arg("--frame")
        .arg(fixture("two-regions.json"))
        .arg("--no-points")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"skipped\": 1"))
        .stdout(predicate::str::contains("\"graphicCount\": 1"));
}

#[test]
fn replicate_honours_points_root_from_environment() {
    let temp = tempfile::tempdir().expect("temp dir should be created");

    cargo_bin_cmd!("regionmark")
        .arg("replicate")
        .arg("--document")
        .arg(fixture("point.json"))
        .arg("--frame")
        .arg(fixture("two-regions.json"))
        .env("REGIONMARK_POINTS_ROOT", temp.path())
        .assert()
        .success();

    assert_eq!(files_under(temp.path()).len(), 1);
}

#[test]
fn hit_returns_topmost_graphic() {
    let output = cargo_bin_cmd!("regionmark")
        .args(["hit", "--x", "50", "--y", "50", "--document"])
        .arg(fixture("mixed.json"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    assert_eq!(value["hit"]["id"], POINT_ID);
    assert_eq!(value["hit"]["shape"], "point");
}

#[test]
fn hit_reports_null_on_empty_space() {
    let output = cargo_bin_cmd!("regionmark")
        .args(["hit", "--x", "500", "--y", "500", "--document"])
        .arg(fixture("mixed.json"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    assert!(stdout_json(&output)["hit"].is_null());
}

#[test]
fn select_lists_graphics_topmost_first() {
    let output = cargo_bin_cmd!("regionmark")
        .args(["select", "--rect", "0,0,100,100", "--document"])
        .arg(fixture("mixed.json"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    let ids: Vec<&str> = value["selected"]
        .as_array()
        .expect("selected array")
        .iter()
        .map(|entry| entry["id"].as_str().expect("id string"))
        .collect();
    assert_eq!(ids, vec![LINE_ID, POINT_ID]);
}

#[test]
fn select_with_small_rect_only_finds_line() {
    let output = cargo_bin_cmd!("regionmark")
        .args(["select", "--rect", "0,70,100,20", "--front-only", "--document"])
        .arg(fixture("mixed.json"))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    let selected = value["selected"].as_array().expect("selected array");
    assert_eq!(selected.len(), 1);
    assert_eq!(selected[0]["shape"], "line");
}

#[test]
fn delete_selected_removes_replicas_and_marks_points_deleted() {
    let temp = tempfile::tempdir().expect("temp dir should be created");
    let points_root = temp.path().join("points");
    let replicated = temp.path().join("replicated.json");

    cargo_bin_cmd!("regionmark")
        .arg("replicate")
        .arg("--document")
        .arg(fixture("point.json"))
        .arg("--frame")
        .arg(fixture("two-regions.json"))
        .arg("--points-root")
        .arg(&points_root)
        .arg("--output")
        .arg(&replicated)
        .assert()
        .success();

    let output = cargo_bin_cmd!("regionmark")
        .arg("delete-selected")
        .arg("--document")
        .arg(&replicated)
        .args(["--id", POINT_ID])
        .arg("--points-root")
        .arg(&points_root)
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let value = stdout_json(&output);
    assert_eq!(value["deleted"], 2);
    assert_eq!(value["graphicCount"], 0);

    let logs = files_under(&points_root);
    assert_eq!(logs.len(), 1);
    assert!(logs[0].to_string_lossy().ends_with(".txt.deleted"));
}

#[test]
fn delete_selected_fails_for_unknown_id() {
    cargo_bin_cmd!("regionmark")
        .arg("delete-selected")
        .arg("--document")
        .arg(fixture("point.json"))
        .args(["--id", LINE_ID, "--no-points"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("no graphic with id"));
}

#[test]
fn replicate_fails_for_missing_document() {
    cargo_bin_cmd!("regionmark")
        .arg("replicate")
        .arg("--document")
        .arg(fixture("missing.json"))
        .arg("--frame")
        .arg(fixture("two-regions.json"))
        .arg("--no-points")
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to read document"));
}

#[test]
fn hit_fails_for_invalid_document() {
    cargo_bin_cmd!("regionmark")
        .args(["hit", "--x", "1", "--y", "1", "--document"])
        .arg(fixture("invalid.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("failed to parse document"));
}

#[test]
fn version_prints_package_version() {
    cargo_bin_cmd!("regionmark")
        .arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}
