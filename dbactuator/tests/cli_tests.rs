// End-to-end tests driving the dbactuator binary

use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::process::{Command, Output};

fn actuator(dir: &tempfile::TempDir, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dbactuator"))
        .args(args)
        .current_dir(dir.path())
        .env("MODE", "dev")
        .env("RUST_LOG", "info")
        .env_remove("ACTUATOR_CRYPT_KEY")
        .output()
        .unwrap()
}

fn ctx_payload(stdout: &[u8]) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(stdout);
    let start = stdout.find("<ctx>").expect("no <ctx> output") + "<ctx>".len();
    let end = stdout[start..].find("</ctx>").expect("unterminated <ctx>") + start;
    serde_json::from_str(&stdout[start..end]).unwrap()
}

#[test]
fn helper_prints_layered_example_without_payload() {
    let dir = tempfile::tempdir().unwrap();
    let output = actuator(&dir, &["mysql", "dump", "--helper"]);

    assert!(output.status.success());
    let example: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(example["general"]["runtime_account"].is_object());
    assert_eq!(example["extend"]["databases"][0], "db1");
}

#[test]
fn helper_prints_flat_example() {
    let dir = tempfile::tempdir().unwrap();
    let output = actuator(&dir, &["sys", "os-cmd-run", "--helper"]);

    assert!(output.status.success());
    let example: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(example.get("extend").is_none());
    assert!(example["commands"].is_array());
}

#[test]
fn missing_payload_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = actuator(&dir, &["sys", "os-info"]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("payload need input"));
}

#[test]
fn os_cmd_run_with_base64_payload() {
    let dir = tempfile::tempdir().unwrap();
    let payload = STANDARD.encode(r#"{"commands":["echo from-actuator"]}"#);
    let output = actuator(
        &dir,
        &["sys", "os-cmd-run", "-u", "1", "-n", "node", "-p", &payload],
    );

    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let ctx = ctx_payload(&output.stdout);
    assert_eq!(ctx[0]["command"], "echo from-actuator");
    assert_eq!(ctx[0]["stdout"], "from-actuator\n");
}

#[test]
fn failing_step_gives_non_zero_exit() {
    let dir = tempfile::tempdir().unwrap();
    let output = actuator(
        &dir,
        &[
            "sys",
            "os-cmd-run",
            "-m",
            "raw",
            "-p",
            r#"{"commands":["exit 7","echo unreachable"]}"#,
        ],
    );

    assert!(!output.status.success());
    assert!(!String::from_utf8_lossy(&output.stdout).contains("unreachable\n"));
}

#[test]
fn invalid_payload_is_rejected_before_any_step() {
    let dir = tempfile::tempdir().unwrap();
    let output = actuator(&dir, &["sys", "os-info", "-m", "raw", "-p", r#"{"items":["gpu"]}"#]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("items[0]"));
}

#[test]
fn os_info_reports_requested_items() {
    let dir = tempfile::tempdir().unwrap();
    let output = actuator(&dir, &["sys", "os-info", "-m", "raw", "-p", r#"{"items":["os"]}"#]);

    assert!(output.status.success());
    let ctx = ctx_payload(&output.stdout);
    assert_eq!(ctx["os"], std::env::consts::OS);
    assert!(ctx.get("arch").is_none());
}

#[test]
fn crypt_round_trip_through_binary() {
    let dir = tempfile::tempdir().unwrap();
    let key = "0123456789abcdef";

    let encrypted = actuator(&dir, &["crypt", "encrypt", "secret", "--key", key]);
    assert!(encrypted.status.success());
    let ciphertext = String::from_utf8(encrypted.stdout).unwrap();

    let decrypted = actuator(&dir, &["crypt", "decrypt", ciphertext.trim(), "--key", key]);
    assert!(decrypted.status.success());
    assert_eq!(String::from_utf8(decrypted.stdout).unwrap().trim(), "secret");
}
