//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

/// One data record at 0x0030 followed by EOF.
const VALID_HEX: &str = ":0300300002337A1E\n:00000001FF\n";

/// Same record with a wrong checksum byte.
const BAD_CHECKSUM_HEX: &str = ":0300300002337A1F\n:00000001FF\n";

fn cli_cmd() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("kbdfu")
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("kbdfu"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("kbdfu"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn subcommand_help_lists_file_argument() {
    let mut cmd = cli_cmd();
    cmd.args(["flash", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("<FILE>"));
}

#[test]
fn completions_bash_exits_zero() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .code(0)
        .stdout(predicate::str::contains("kbdfu"));
}

// ============================================================================
// Usage errors exit 1
// ============================================================================

#[test]
fn no_arguments_prints_usage_and_exits_one() {
    let mut cmd = cli_cmd();
    cmd.assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn unknown_command_exits_one() {
    let mut cmd = cli_cmd();
    cmd.arg("unknown-command-xyz")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("unrecognized"));
}

#[test]
fn missing_file_argument_exits_one() {
    let mut cmd = cli_cmd();
    cmd.arg("eeprom")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("<FILE>"));
}

#[test]
fn zero_attempts_is_rejected() {
    let dir = tempdir().expect("tempdir should be created");
    let hex = dir.path().join("fw.hex");
    fs::write(&hex, VALID_HEX).expect("write hex");

    let mut cmd = cli_cmd();
    cmd.args(["--attempts", "0", "flash"])
        .arg(&hex)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("--attempts"));
}

// ============================================================================
// Image loading
// ============================================================================

#[test]
fn info_reports_image_layout() {
    let dir = tempdir().expect("tempdir should be created");
    let hex = dir.path().join("fw.hex");
    fs::write(&hex, VALID_HEX).expect("write hex");

    let mut cmd = cli_cmd();
    cmd.arg("info")
        .arg(&hex)
        .assert()
        .success()
        .stderr(predicate::str::contains("0x0030").and(predicate::str::contains("128-byte")));
}

#[test]
fn info_json_returns_valid_json() {
    let dir = tempdir().expect("tempdir should be created");
    let hex = dir.path().join("fw.hex");
    fs::write(&hex, VALID_HEX).expect("write hex");

    let mut cmd = cli_cmd();
    let output = cmd
        .args(["info", "--json", "--region", "eeprom"])
        .arg(&hex)
        .output()
        .expect("command should execute");
    assert!(output.status.success());

    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("stdout should be JSON");
    assert_eq!(parsed["ok"], true);
    assert_eq!(parsed["data"]["region"], "eeprom");
    assert_eq!(parsed["data"]["image"]["start_address"], 0x30);
    assert_eq!(parsed["data"]["image"]["payload_len"], 3);
    assert_eq!(parsed["data"]["image"]["padded_len"], 4);
    assert_eq!(parsed["data"]["image"]["page_count"], 1);
}

#[test]
fn info_json_error_keeps_stdout_clean() {
    let dir = tempdir().expect("tempdir should be created");
    let nonexistent = dir.path().join("not_exists.hex");

    let mut cmd = cli_cmd();
    cmd.arg("info")
        .arg("--json")
        .arg(nonexistent.as_os_str())
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error"));
}

#[test]
fn flash_with_bad_checksum_fails_before_touching_usb() {
    let dir = tempdir().expect("tempdir should be created");
    let hex = dir.path().join("fw.hex");
    fs::write(&hex, BAD_CHECKSUM_HEX).expect("write hex");

    let mut cmd = cli_cmd();
    cmd.arg("flash")
        .arg(&hex)
        .assert()
        .failure()
        .code(1)
        .stderr(
            predicate::str::contains("Checksum error on line 1")
                .and(predicate::str::contains("Waiting").not()),
        );
}

#[test]
fn unknown_record_type_is_rejected() {
    let dir = tempdir().expect("tempdir should be created");
    let hex = dir.path().join("fw.hex");
    // Extended linear address record.
    fs::write(&hex, ":020000040000FA\n:00000001FF\n").expect("write hex");

    let mut cmd = cli_cmd();
    cmd.arg("info")
        .arg(&hex)
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("line 1"));
}

#[test]
fn invalid_config_file_is_a_warning() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(dir.path().join("kbdfu.toml"), "invalid toml [[[").expect("write config");
    let hex = dir.path().join("fw.hex");
    fs::write(&hex, BAD_CHECKSUM_HEX).expect("write hex");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .arg("flash")
        .arg(&hex)
        .assert()
        .failure()
        .code(1)
        .stderr(
            predicate::str::contains("Failed to parse config file")
                .and(predicate::str::contains("Checksum")),
        );
}

// ============================================================================
// Device discovery
// ============================================================================

#[test]
fn missing_device_exits_one() {
    let dir = tempdir().expect("tempdir should be created");
    let hex = dir.path().join("fw.hex");
    fs::write(&hex, VALID_HEX).expect("write hex");

    // No device with this ID is expected to be attached. Without USB access
    // libusb init fails instead, which must also exit 1 rather than panic.
    let mut cmd = cli_cmd();
    cmd.args(["--vid", "fffe", "--pid", "fffd", "--attempts", "1", "flash"])
        .arg(&hex)
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(
            predicate::str::contains("Error")
                .and(predicate::str::contains("panicked").not()),
        );
}
