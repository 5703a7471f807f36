use std::fs;
use std::path::Path;
use std::process::Command;

use serde_json::Value;

fn write_script(path: &Path) {
    let script = r#"{
        "steps": [
            {"at_ms": 0, "command": "/mine create pit 0 0 0 4 4 4"},
            {"at_ms": 0, "command": "/mine fill pit"},
            {"at_ms": 0, "command": "/tool 1 77 jackhammer:1"},
            {"at_ms": 10, "command": "/break 1 2 2 2"},
            {"at_ms": 20, "command": "/break 1 0 0 0"},
            {"at_ms": 30, "command": "/this is not a command"},
            {"at_ms": 40, "command": "/disconnect 1"}
        ]
    }"#;
    fs::write(path, script).expect("write script");
}

fn events(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .expect("event log exists")
        .lines()
        .map(|line| serde_json::from_str(line).expect("each line is JSON"))
        .collect()
}

#[test]
fn scripted_session_writes_events_and_state() {
    let dir = tempfile::tempdir().unwrap();
    let data = dir.path().join("data");
    let script = dir.path().join("script.json");
    let log = dir.path().join("events.jsonl");
    let config = dir.path().join("quarry.toml");
    fs::write(
        &config,
        "world = \"smoke\"\n\n[pipeline]\nchance_per_level = 1.0\nrng_seed = 7\n\n[mines]\nrng_seed = 7\n",
    )
    .unwrap();
    write_script(&script);

    let status = Command::new(env!("CARGO_BIN_EXE_quarry"))
        .arg("--config")
        .arg(&config)
        .arg("--data-dir")
        .arg(&data)
        .arg("--script")
        .arg(&script)
        .arg("--event-log")
        .arg(&log)
        .env("RUST_LOG", "warn")
        .status()
        .expect("driver runs");
    assert!(status.success());

    let events = events(&log);
    let enchant = events
        .iter()
        .find(|e| e["kind"] == "enchant_activated")
        .expect("enchant fired");
    assert_eq!(enchant["event"]["player"], 1);
    assert_eq!(enchant["event"]["enchant"], "Jackhammer");
    assert_eq!(enchant["event"]["removed"], 25);

    let summary = events
        .iter()
        .rev()
        .find(|e| e["kind"] == "mining_summary")
        .expect("disconnect emits a summary");
    assert_eq!(summary["event"]["summary"]["blocks"], 1);
    assert_eq!(summary["event"]["summary"]["enchant_blocks"], 25);

    assert!(data.join("smoke.regions.qr").exists());
    assert!(data.join("smoke.mines.qr").exists());
}

#[test]
fn missing_script_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let status = Command::new(env!("CARGO_BIN_EXE_quarry"))
        .arg("--data-dir")
        .arg(dir.path().join("data"))
        .arg("--script")
        .arg(dir.path().join("absent.json"))
        .env("RUST_LOG", "off")
        .status()
        .expect("driver runs");
    assert!(!status.success());
}
