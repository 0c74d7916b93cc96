#![cfg(not(target_arch = "wasm32"))]

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;

fn cli() -> Command {
    Command::cargo_bin("xhci-bar").expect("xhci-bar binary")
}

#[test]
fn runs_script_and_prints_read_responses() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("boot.txt");
    fs::write(
        &script,
        "reset\nread 0x0 0x1\nwrite 0x38 0x8\nexpect 0x38 0x8\nwrite 0x100 0\nexpect 0x38 0x8\n",
    )
    .unwrap();

    cli()
        .arg(&script)
        .assert()
        .success()
        .stdout(predicate::str::contains("tag=0x1 data=0x01000020"));
}

#[test]
fn failed_expectation_exits_non_zero() {
    cli()
        .arg("-")
        .write_stdin("expect 0x24 0x0\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("expected 0x24 = 0x00000000"));
}

#[test]
fn config_file_sets_microframe_period() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("xhci.json");
    fs::write(&config, r#"{ "clock_hz": 80000 }"#).unwrap();

    // 10 ticks per microframe: 20 idle ticks plus two before the read executes.
    cli()
        .arg("--config")
        .arg(&config)
        .arg("-")
        .write_stdin("tick 20\nexpect 0x600 2\n")
        .assert()
        .success();
}

#[test]
fn bad_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("xhci.json");
    fs::write(&config, r#"{ "clock_hz": 1 }"#).unwrap();

    cli()
        .arg("--config")
        .arg(&config)
        .arg("-")
        .write_stdin("tick\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("too slow"));
}

#[test]
fn snapshot_carries_state_between_runs() {
    let dir = tempfile::tempdir().unwrap();
    let snap = dir.path().join("xhci.snap");

    cli()
        .arg("--snapshot-save")
        .arg(&snap)
        .arg("-")
        .write_stdin("write 0x58 0x3\nwrite 0x438 0x0\nattach 2 3\n")
        .assert()
        .success();
    assert!(snap.exists());

    cli()
        .arg("--snapshot-load")
        .arg(&snap)
        .arg("-")
        .write_stdin("expect 0x58 0x3\nexpect 0x24 0x11\n")
        .assert()
        .success();
}

#[test]
fn parse_errors_point_at_the_line() {
    cli()
        .arg("-")
        .write_stdin("tick\nbogus 1\n")
        .assert()
        .failure()
        .stderr(predicate::str::contains("line 2"));
}
