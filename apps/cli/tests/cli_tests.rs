//! 命令行集成测试

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn sensorlog(config_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("sensorlog").unwrap();
    cmd.env("SENSORLOG_CONFIG", config_dir.path().join("config.toml"));
    cmd
}

#[test]
fn test_decode_gps_message() {
    let dir = TempDir::new().unwrap();
    sensorlog(&dir)
        .args(["decode", "gps", "--id", "0x302", "--data", "FF 43 9E B2 01 F4 23 28"])
        .assert()
        .success()
        .stdout(predicate::str::contains("302h"))
        .stdout(predicate::str::contains("Heading"));
}

#[test]
fn test_decode_gps_json() {
    let dir = TempDir::new().unwrap();
    let output = sensorlog(&dir)
        .args(["decode", "gps", "--id", "305", "--data", "00 00 27 10 00 64 03 E8", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(value.get("Distance").is_some());
}

#[test]
fn test_decode_gps_rejects_bad_id() {
    let dir = TempDir::new().unwrap();
    sensorlog(&dir)
        .args(["decode", "gps", "--id", "zz", "--data", "00"])
        .assert()
        .failure();
}

#[test]
fn test_decode_short_inertial_frame_fails() {
    let dir = TempDir::new().unwrap();
    sensorlog(&dir)
        .args(["decode", "inertial", "--data", "55 55 00 01"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("22"));
}

#[test]
fn test_decode_shutter_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("Shutter.txt");
    fs::write(&path, "1000\tStart\n2000\tON\n3000\tOFF\n").unwrap();

    sensorlog(&dir)
        .args(["decode", "file"])
        .arg(&path)
        .args(["-n", "2"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Start"))
        .stdout(predicate::str::contains("ON"))
        .stdout(predicate::str::contains("OFF").not());
}

#[test]
fn test_config_set_then_get() {
    let dir = TempDir::new().unwrap();

    sensorlog(&dir)
        .args(["config", "set", "--channel", "vcan0", "--subject", "s07"])
        .assert()
        .success();
    assert!(dir.path().join("config.toml").exists());

    sensorlog(&dir)
        .args(["config", "get", "channel"])
        .assert()
        .success()
        .stdout("vcan0\n");
    sensorlog(&dir)
        .args(["config", "get", "subject"])
        .assert()
        .success()
        .stdout("s07\n");
}

#[test]
fn test_config_get_defaults_without_file() {
    let dir = TempDir::new().unwrap();
    sensorlog(&dir)
        .args(["config", "get", "port"])
        .assert()
        .success()
        .stdout("55555\n");
}

#[test]
fn test_config_reset() {
    let dir = TempDir::new().unwrap();
    sensorlog(&dir).args(["config", "set", "--trial", "t09"]).assert().success();
    sensorlog(&dir).args(["config", "reset"]).assert().success();
    sensorlog(&dir)
        .args(["config", "get", "trial"])
        .assert()
        .success()
        .stdout("t01\n");
}
