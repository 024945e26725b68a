//! CLI contract tests: exit codes, JSON output shape, config handling.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

#[allow(deprecated)]
fn trafficarb() -> Command {
    let mut cmd = Command::cargo_bin("trafficarb").expect("trafficarb binary should be built");
    cmd.env_remove("TRAFFICARB_CONFIG");
    cmd.env("RUST_LOG", "warn");
    cmd
}

// =============================================================================
// classify / tick
// =============================================================================

#[test]
fn classify_prints_level() {
    trafficarb()
        .args(["classify", "150"])
        .assert()
        .success()
        .stdout("High\n");
    trafficarb()
        .args(["classify", "201"])
        .assert()
        .success()
        .stdout("Severe\n");
}

#[test]
fn tick_json_picks_busiest_lanes() {
    let output = trafficarb()
        .args(["tick", "--counts", "10,50,90,20", "--format", "json"])
        .output()
        .expect("tick should execute");
    assert!(output.status.success());

    let value: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(value["active_lanes"], serde_json::json!([1, 2]));
    assert_eq!(value["lane_times"], serde_json::json!([22.5, 92.5, 162.5, 40.0]));
    assert_eq!(value["decision"]["kind"], "auto");
}

#[test]
fn tick_plain_shows_emergency() {
    trafficarb()
        .args(["tick", "--counts", "0,0,0", "--emergencies", "0,0,1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("active [3]  (emergency lane 3)"))
        .stdout(predicate::str::contains("180.0s"));
}

#[test]
fn tick_rejects_non_numeric_counts() {
    trafficarb()
        .args(["tick", "--counts", "1,two,3"])
        .assert()
        .failure();
}

// =============================================================================
// config
// =============================================================================

#[test]
fn config_default_is_toml() {
    trafficarb()
        .args(["config", "--default"])
        .assert()
        .success()
        .stdout(predicate::str::contains("[engine]"))
        .stdout(predicate::str::contains("max_green = 180.0"));
}

#[test]
fn config_file_overrides_defaults() {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("trafficarb.toml");
    std::fs::write(&path, "[engine]\nnum_lanes = 6\nmin_green = 10.0\n").expect("write config");

    trafficarb()
        .args(["config", "--config"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("num_lanes = 6"))
        .stdout(predicate::str::contains("min_green = 10.0"));
}

#[test]
fn invalid_config_fails_with_message() {
    let dir = TempDir::new().expect("create temp dir");
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[engine]\nmin_green = 200.0\nmax_green = 100.0\n").expect("write config");

    trafficarb()
        .args(["config", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("min_green"));
}

#[test]
fn missing_config_file_fails() {
    trafficarb()
        .args(["config", "--config", "/nonexistent/trafficarb.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not found"));
}

// =============================================================================
// run
// =============================================================================

#[test]
fn run_json_emits_one_report_per_tick_then_summary() {
    let output = trafficarb()
        .args([
            "run",
            "--ticks",
            "3",
            "--seed",
            "7",
            "--interval-ms",
            "10",
            "--format",
            "json",
        ])
        .write_stdin("")
        .output()
        .expect("run should execute");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).expect("each line should be JSON"))
        .collect();
    assert_eq!(lines.len(), 4);
    for (i, report) in lines[..3].iter().enumerate() {
        assert_eq!(report["tick"], i as u64 + 1);
        assert_eq!(report["lanes"].as_array().map(Vec::len), Some(4));
    }
    assert_eq!(lines[3]["summary"]["ticks"], 3);
    assert_eq!(lines[3]["summary"]["clean"], true);
}

#[test]
fn run_applies_stdin_commands() {
    trafficarb()
        .args(["run", "--ticks", "30", "--seed", "1", "--interval-ms", "20", "--lanes", "3"])
        .write_stdin("green 2 15\nstatus\nbogus\n")
        .assert()
        .success()
        .stderr(predicate::str::contains("lane 2 forced GREEN for 15s"))
        .stderr(predicate::str::contains("unknown command 'bogus'"))
        .stdout(predicate::str::contains("tick 30"));
}

#[test]
fn run_rejects_zero_ticks() {
    trafficarb()
        .args(["run", "--ticks", "0", "--no-input"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--ticks"));
}
