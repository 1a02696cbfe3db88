#![cfg(feature = "cli")]

use std::process::Command;
use tempfile::tempdir;

fn bin() -> String {
    env!("CARGO_BIN_EXE_rser").to_string()
}

fn parse_lines(stdout: &[u8]) -> Vec<serde_json::Value> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

#[test]
fn cli_encode_decode_roundtrip() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("doc.json");
    let stream = dir.path().join("doc.rser");

    let doc = r#"{"name":"rser","tags":["a","b"],"nested":{"n":-1.5,"ok":true,"none":null}}"#;
    std::fs::write(&input, doc).unwrap();

    let st = Command::new(bin())
        .arg("encode")
        .arg(&input)
        .arg(&stream)
        .status()
        .unwrap();
    assert!(st.success());
    assert!(std::fs::metadata(&stream).unwrap().len() > 0);

    let out = Command::new(bin())
        .arg("decode")
        .arg(&stream)
        .output()
        .unwrap();
    assert!(out.status.success());
    let decoded = parse_lines(&out.stdout);
    assert_eq!(decoded.len(), 1);
    assert_eq!(decoded[0], serde_json::from_str::<serde_json::Value>(doc).unwrap());
}

#[test]
fn cli_json_lines_produce_one_message_each() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("events.jsonl");
    let stream = dir.path().join("events.rser");
    std::fs::write(&input, "{\"id\":1}\n\n{\"id\":2}\n[1,2,3]\n").unwrap();

    let st = Command::new(bin())
        .args(["encode", "--lines"])
        .arg(&input)
        .arg(&stream)
        .status()
        .unwrap();
    assert!(st.success());

    let out = Command::new(bin())
        .arg("decode")
        .arg(&stream)
        .output()
        .unwrap();
    assert!(out.status.success());
    let decoded = parse_lines(&out.stdout);
    assert_eq!(
        decoded,
        vec![
            serde_json::json!({"id": 1}),
            serde_json::json!({"id": 2}),
            serde_json::json!([1, 2, 3]),
        ]
    );
}

#[test]
fn cli_refuses_to_overwrite_without_force() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.json");
    let stream = dir.path().join("out.rser");
    std::fs::write(&input, "42").unwrap();
    std::fs::write(&stream, b"keep me").unwrap();

    let st = Command::new(bin())
        .arg("encode")
        .arg(&input)
        .arg(&stream)
        .status()
        .unwrap();
    assert!(!st.success());
    assert_eq!(std::fs::read(&stream).unwrap(), b"keep me");

    let st = Command::new(bin())
        .arg("-f")
        .arg("encode")
        .arg(&input)
        .arg(&stream)
        .status()
        .unwrap();
    assert!(st.success());
    assert_ne!(std::fs::read(&stream).unwrap(), b"keep me");
}

#[test]
fn cli_inspect_lists_headers() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.jsonl");
    let stream = dir.path().join("in.rser");
    std::fs::write(&input, "{\"a\":1}\n[true]\n").unwrap();

    let st = Command::new(bin())
        .args(["encode", "--lines"])
        .arg(&input)
        .arg(&stream)
        .status()
        .unwrap();
    assert!(st.success());

    let out = Command::new(bin())
        .args(["--json", "inspect"])
        .arg(&stream)
        .output()
        .unwrap();
    assert!(out.status.success());
    let records = parse_lines(&out.stdout);
    assert_eq!(records.len(), 3);
    assert_eq!(records[0]["kind"], "stream");
    assert_eq!(records[0]["version"], 1);
    assert_eq!(records[1]["kind"], "message");
    assert_eq!(records[1]["root"], "OBJECT");
    assert_eq!(records[1]["status"], "ok");
    assert_eq!(records[2]["root"], "ARRAY");
}

#[test]
fn cli_decode_rejects_truncated_stream() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("in.json");
    let stream = dir.path().join("in.rser");
    std::fs::write(&input, "\"hello world\"").unwrap();

    let st = Command::new(bin())
        .arg("encode")
        .arg(&input)
        .arg(&stream)
        .status()
        .unwrap();
    assert!(st.success());

    let mut bytes = std::fs::read(&stream).unwrap();
    bytes.truncate(bytes.len() - 3);
    std::fs::write(&stream, &bytes).unwrap();

    let out = Command::new(bin())
        .arg("decode")
        .arg(&stream)
        .output()
        .unwrap();
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("decode error"));
}

#[test]
fn cli_config_works() {
    let out = Command::new(bin()).arg("config").output().unwrap();
    assert!(out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("PROTOCOL_VERSION=1"));
    assert!(stderr.contains("TAGS=34"));
}

#[test]
fn cli_quiet_and_verbose_conflict() {
    let out = Command::new(bin())
        .args(["-q", "-v", "config"])
        .output()
        .unwrap();
    assert!(!out.status.success());
}
