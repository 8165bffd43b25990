use std::path::Path;
use std::process::{Command, Output};

fn clipscan(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_clipscan"))
        .args(args)
        .env("RUST_LOG", "off")
        .output()
        .expect("failed to spawn clipscan")
}

fn read_report(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn usage_error_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.json");

    let output = clipscan(&["--event-id", "E1", "--out", out.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));
    assert!(!out.exists());
}

#[test]
fn invalid_threshold_is_a_usage_error() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out.json");

    let output = clipscan(&[
        "--event-id", "E1", "--clip", "clip.mp4", "--out", out.to_str().unwrap(),
        "--model", "m.onnx", "--threshold", "7",
    ]);
    assert_eq!(output.status.code(), Some(2));
    assert!(!out.exists());
}

#[test]
fn unloadable_model_still_writes_error_report() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("nested").join("E42.result.json");
    let model = dir.path().join("missing.onnx");

    let output = clipscan(&[
        "--event-id", "E42", "--clip", "clip.mp4", "--out", out.to_str().unwrap(),
        "--model", model.to_str().unwrap(),
    ]);
    assert_eq!(output.status.code(), Some(1));

    let report = read_report(&out);
    assert_eq!(report["event_id"], "E42");
    assert_eq!(report["status"], "error");
    assert!(report["error"].as_str().unwrap().contains("failed to load model"));
    assert_eq!(report["detections"], serde_json::json!([]));
    assert_eq!(report["summary"], serde_json::json!({ "person": 0, "vehicle": 0 }));
}

#[test]
fn unwritable_destination_exits_three() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("file");
    std::fs::write(&blocker, "x").unwrap();
    let out = blocker.join("out.json");

    let output = clipscan(&[
        "--event-id", "E1", "--clip", "clip.mp4", "--out", out.to_str().unwrap(),
        "--model", "missing.onnx",
    ]);
    assert_eq!(output.status.code(), Some(3));
}
