use std::fs;
use std::process::Command;

use tempfile::tempdir;

fn mind_lower() -> Command {
    Command::new(env!("CARGO_BIN_EXE_mind-lower"))
}

#[test]
fn lowers_dynamic_tanh() {
    let output = mind_lower()
        .args(["lower", "--op", "aten.tanh.default"])
        .args(["--input", "1,1,1:1,2,3:3,3,3"])
        .output()
        .expect("spawn mind-lower");

    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("activation.tanh"), "{stdout}");
    assert!(stdout.contains("[1:1:3, 1:2:3, 1:3:3]"), "{stdout}");
}

#[test]
fn lowers_binary_op_with_two_inputs() {
    let output = mind_lower()
        .args(["lower", "--op", "aten.add.Tensor"])
        .args(["--input", "2,3", "--input", "3"])
        .output()
        .expect("spawn mind-lower");

    assert!(output.status.success(), "{output:?}");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("elementwise.sum"), "{stdout}");
}

#[test]
fn unsupported_op_exits_with_error() {
    let output = mind_lower()
        .args(["lower", "--op", "aten.erf.default", "--input", "4"])
        .output()
        .expect("spawn mind-lower");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("aten.erf.default"), "{stderr}");
}

#[test]
fn config_file_is_honoured() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("lower.toml");
    fs::write(&path, "[convert]\ndisallowed_ops = [\"aten.tanh.default\"]\n")
        .expect("write options");

    let output = mind_lower()
        .args(["lower", "--op", "aten.tanh.default", "--input", "1,10"])
        .arg("--config")
        .arg(&path)
        .output()
        .expect("spawn mind-lower");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("outside the engine"), "{stderr}");
}

#[test]
fn ops_lists_tanh() {
    let output = mind_lower().arg("ops").output().expect("spawn mind-lower");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("aten.tanh.default"));
}

#[test]
fn conformance_subcommand_passes() {
    let status = mind_lower()
        .args(["conformance", "--profile", "dynamic"])
        .status()
        .expect("spawn mind-lower");
    assert!(status.success());
}
