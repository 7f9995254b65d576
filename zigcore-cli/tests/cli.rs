//! Integration tests for the zigcore binary.
//!
//! Each test points HOME at a temporary directory so the real
//! `~/.zigcore/config.ini` is never touched.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn zigcore(home: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_zigcore"))
        .args(args)
        .env("HOME", home)
        .current_dir(home)
        .output()
        .expect("failed to run zigcore binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).to_string()
}

#[test]
fn test_config_path_under_home() {
    let home = TempDir::new().unwrap();
    let output = zigcore(home.path(), &["config", "path"]);

    assert!(output.status.success());
    let path = stdout(&output);
    assert!(path.trim().ends_with(".zigcore/config.ini"), "got {}", path);
}

#[test]
fn test_config_init_then_refuses_overwrite() {
    let home = TempDir::new().unwrap();

    let first = zigcore(home.path(), &["config", "init"]);
    assert!(first.status.success());
    let file = home.path().join(".zigcore").join("config.ini");
    assert!(file.exists());
    assert!(std::fs::read_to_string(&file).unwrap().contains("[channel_change]"));

    let second = zigcore(home.path(), &["config", "init"]);
    assert!(!second.status.success());

    let forced = zigcore(home.path(), &["config", "init", "--force"]);
    assert!(forced.status.success());
}

#[test]
fn test_config_show_defaults() {
    let home = TempDir::new().unwrap();
    let output = zigcore(home.path(), &["config", "show"]);

    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("showing defaults"));
    assert!(text.contains("[watchdog]"));
}

#[test]
fn test_config_show_rejects_invalid_value() {
    let home = TempDir::new().unwrap();
    let dir = home.path().join(".zigcore");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.ini"), "[watchdog]\nfailure_threshold = lots\n").unwrap();

    let output = zigcore(home.path(), &["config", "show"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("failure_threshold"));
}

#[test]
fn test_identity_uses_oui_and_system_id_tail() {
    let home = TempDir::new().unwrap();
    let output = zigcore(
        home.path(),
        &["identity", "--system-id", "SN-00A1B2C3", "--oui", "00:1C:2A"],
    );

    assert!(output.status.success());
    let text = stdout(&output);
    let identity = text.lines().next().unwrap().trim().to_string();
    assert_eq!(identity.len(), 16);
    assert!(identity.starts_with("001c2a"), "got {}", identity);
    assert!(identity.ends_with("a1b2c3"), "got {}", identity);
}

#[test]
fn test_identity_rejects_bad_oui() {
    let home = TempDir::new().unwrap();
    let output = zigcore(home.path(), &["identity", "--system-id", "1234", "--oui", "zz"]);
    assert!(!output.status.success());
}
