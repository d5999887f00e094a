//! CLI tests for `lifecycle` exit codes.
//!
//! Spawns the binary in a scratch directory with a scrubbed environment so
//! no real credential or repository URL leaks in.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use lifecycle::exit_codes;
use lifecycle::test_support::SourceRepo;

fn lifecycle(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_lifecycle"))
        .current_dir(dir)
        .args(args)
        .env_remove("DEEPSEEK_API_KEY")
        .env_remove("REPO_URL")
        .env_remove("repo_url")
        .env("RUST_LOG", "warn")
        .output()
        .expect("spawn lifecycle")
}

fn write_config(dir: &Path, body: &str) {
    fs::write(dir.join("lifecycle.toml"), body).expect("write config");
}

#[test]
fn cleanup_removes_checkout_and_exits_ok() {
    let temp = tempfile::tempdir().expect("tempdir");
    let checkout = temp.path().join("checkout");
    fs::create_dir_all(checkout.join(".git/objects")).expect("mkdir");
    write_config(
        temp.path(),
        "[repository]\npath = \"checkout\"\nsettle_delay_ms = 0\n",
    );

    let output = lifecycle(temp.path(), &["cleanup"]);
    assert_eq!(output.status.code(), Some(exit_codes::OK), "{output:?}");
    assert!(!checkout.exists());
}

#[test]
fn run_without_credential_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = lifecycle(
        temp.path(),
        &["run", "--repo-url", "https://example.com/app.git"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("credential is required"), "{stderr}");
}

#[test]
fn run_without_repository_url_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    let output = Command::new(env!("CARGO_BIN_EXE_lifecycle"))
        .current_dir(temp.path())
        .arg("run")
        .env("DEEPSEEK_API_KEY", "sk-test-key")
        .env_remove("REPO_URL")
        .env_remove("repo_url")
        .output()
        .expect("spawn lifecycle");
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(!temp.path().join("repository").exists());
}

#[test]
fn malformed_config_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_config(temp.path(), "[monitoring]\nmax_attempts = 0\n");
    let output = lifecycle(temp.path(), &["cleanup"]);
    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
}

#[test]
fn reset_clones_requested_branch() {
    let source = SourceRepo::new("main", &["release"]).expect("source");
    let temp = tempfile::tempdir().expect("tempdir");
    write_config(temp.path(), "[repository]\nsettle_delay_ms = 0\n");

    let url = source.url();
    let output = lifecycle(
        temp.path(),
        &["reset", "--repo-url", &url, "--branch", "release"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::OK), "{output:?}");
    assert!(temp.path().join("repository/release.txt").is_file());

    let output = lifecycle(
        temp.path(),
        &["reset", "--repo-url", &url, "--branch", "missing"],
    );
    assert_eq!(output.status.code(), Some(exit_codes::FAILURE));
    assert!(!temp.path().join("repository").exists());
}
