use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

/// Test context with an isolated GLIX_HOME.
struct TestContext {
    temp_dir: TempDir,
    glix_home: PathBuf,
}

impl TestContext {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temp dir");
        let glix_home = temp_dir.path().join(".glix");
        Self {
            temp_dir,
            glix_home,
        }
    }

    fn glix_cmd(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_glix"));
        cmd.env("HOME", self.temp_dir.path());
        cmd.env("GLIX_HOME", &self.glix_home);
        cmd.env_remove("GLIX_CONFIG");
        cmd
    }
}

#[test]
fn test_help_command() {
    let ctx = TestContext::new();
    let output = ctx.glix_cmd().arg("--help").output().expect("failed to run glix");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage:"));
    assert!(stdout.contains("install"));
    assert!(stdout.contains("patch"));
}

#[test]
fn test_version_command() {
    let ctx = TestContext::new();
    let output = ctx.glix_cmd().arg("--version").output().expect("failed to run glix");
    assert!(output.status.success());
}

#[test]
fn test_list_creates_registry() {
    let ctx = TestContext::new();
    let output = ctx.glix_cmd().arg("list").output().expect("failed to run glix");
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No glibc versions installed"));
    assert!(
        ctx.glix_home.join("glix.db").exists(),
        "glix.db should be created after running list"
    );
}

#[test]
fn test_remove_unknown_version_reports_failure_count() {
    let ctx = TestContext::new();
    let output = ctx
        .glix_cmd()
        .args(["remove", "2.31-0ubuntu9"])
        .output()
        .expect("failed to run glix");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("1 attempted, 0 succeeded, 1 failed"));
}

#[test]
fn test_invalid_version_is_rejected() {
    let ctx = TestContext::new();
    let output = ctx
        .glix_cmd()
        .args(["patch", "version", "/bin/true", "not-a-version"])
        .output()
        .expect("failed to run glix");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Invalid version"));
}

#[test]
fn test_config_show_uses_defaults() {
    let ctx = TestContext::new();
    let output = ctx
        .glix_cmd()
        .args(["config", "show"])
        .output()
        .expect("failed to run glix");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("[catalog]"));
    assert!(stdout.contains("source_package = \"glibc\""));
}

#[test]
fn test_completions() {
    let ctx = TestContext::new();
    let output = ctx
        .glix_cmd()
        .args(["completions", "bash"])
        .output()
        .expect("failed to run glix");
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains("glix"));
}

#[test]
fn test_settings_load_only_for_commands_that_need_them() {
    let ctx = TestContext::new();
    std::fs::create_dir_all(&ctx.glix_home).unwrap();
    std::fs::write(ctx.glix_home.join("config.toml"), "[download\n").unwrap();

    let output = ctx
        .glix_cmd()
        .args(["completions", "zsh"])
        .output()
        .expect("failed to run glix");
    assert!(output.status.success());

    let output = ctx.glix_cmd().arg("list").output().expect("failed to run glix");
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to load settings"));
}
