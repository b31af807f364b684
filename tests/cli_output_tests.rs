use std::fs;
use std::path::PathBuf;
use std::process::Command;
use std::time::{SystemTime, UNIX_EPOCH};

const MANIFEST: &str = r#"
[settings]
mode = "plain"

[jobs]
alpha = ["sh", "-c", "printf '\\033[32malpha ok\\033[0m\\n'"]

[jobs.beta]
command = "sh"
args = ["-c", "echo beta broke; exit 4"]
"#;

#[test]
fn cli_run_prints_summary_without_ansi_when_no_color() {
    let root = temp_workspace("cli-run");
    fs::write(root.join("jobmux.toml"), MANIFEST).expect("write manifest");

    let output = Command::new(env!("CARGO_BIN_EXE_jobmux"))
        .arg("run")
        .current_dir(&root)
        .env("NO_COLOR", "1")
        .env("JOBMUX_COLOR", "always")
        .env_remove("JOBMUX_LOG")
        .output()
        .expect("run jobmux");

    assert_eq!(
        output.status.code(),
        Some(0),
        "stdout={}\nstderr={}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    assert!(stdout.contains("Job Results"));
    assert!(stdout.contains("✓ alpha  completed"));
    assert!(stdout.contains("✗ beta  failed (exit code 4)"));
    assert!(stdout.contains("summary  jobs:2  completed:1  failed:1"));
    assert!(!stdout.contains("interrupted"));
    assert!(!stdout.contains('\u{1b}'));
}

#[test]
fn cli_run_json_reports_each_outcome() {
    let root = temp_workspace("cli-json");
    let manifest = root.join("custom.toml");
    fs::write(&manifest, MANIFEST).expect("write manifest");

    let output = Command::new(env!("CARGO_BIN_EXE_jobmux"))
        .arg("run")
        .arg("--manifest")
        .arg(&manifest)
        .arg("--only")
        .arg("beta")
        .arg("--json")
        .env("NO_COLOR", "1")
        .output()
        .expect("run jobmux");

    assert_eq!(output.status.code(), Some(0));
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json stdout");
    assert_eq!(value["interrupted"], false);
    let outcomes = value["outcomes"].as_array().expect("outcomes");
    assert_eq!(outcomes.len(), 1);
    assert_eq!(outcomes[0]["name"], "beta");
    assert_eq!(outcomes[0]["status"], "failed");
    assert_eq!(outcomes[0]["detail"], "exit code 4");
}

#[test]
fn cli_jobs_lists_manifest_entries() {
    let root = temp_workspace("cli-jobs");
    fs::write(root.join("jobmux.toml"), MANIFEST).expect("write manifest");

    let output = Command::new(env!("CARGO_BIN_EXE_jobmux"))
        .arg("jobs")
        .current_dir(&root)
        .env("NO_COLOR", "1")
        .output()
        .expect("run jobmux");

    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).expect("utf8 stdout");
    assert!(stdout.contains("mode: plain"));
    assert!(stdout.contains("jobs: 2"));
    assert!(stdout.contains("alpha"));
    assert!(stdout.contains("sh -c 'echo beta broke; exit 4'"));
    assert!(!stdout.contains('\u{1b}'));
}

#[test]
fn cli_missing_manifest_exits_with_one_and_hint() {
    let root = temp_workspace("cli-missing");
    let output = Command::new(env!("CARGO_BIN_EXE_jobmux"))
        .arg("run")
        .current_dir(&root)
        .env("NO_COLOR", "1")
        .output()
        .expect("run jobmux");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).expect("utf8 stderr");
    assert!(stderr.contains("[error] Manifest invalid"));
    assert!(stderr.contains("hint: Create `jobmux.toml`"));
}

#[test]
fn cli_unknown_only_name_lists_available_jobs() {
    let root = temp_workspace("cli-only");
    fs::write(root.join("jobmux.toml"), MANIFEST).expect("write manifest");
    let output = Command::new(env!("CARGO_BIN_EXE_jobmux"))
        .args(["run", "--only", "delta"])
        .current_dir(&root)
        .env("NO_COLOR", "1")
        .output()
        .expect("run jobmux");

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8(output.stderr).expect("utf8 stderr");
    assert!(stderr.contains("unknown job `delta` (available: alpha, beta)"));
}

#[test]
fn cli_parse_error_includes_usage_and_exit_code_two() {
    let output = Command::new(env!("CARGO_BIN_EXE_jobmux"))
        .args(["run", "--mode", "fancy"])
        .env("NO_COLOR", "1")
        .output()
        .expect("run jobmux");

    assert_eq!(output.status.code(), Some(2));
    let stderr = String::from_utf8(output.stderr).expect("utf8 stderr");
    assert!(stderr.contains("Invalid command arguments"));
    assert!(stderr.contains("unknown mode `fancy`"));
    assert!(stderr.contains("USAGE:"));
    assert!(!stderr.contains('\u{1b}'));
}

#[test]
fn cli_help_prints_usage() {
    let output = Command::new(env!("CARGO_BIN_EXE_jobmux"))
        .arg("--help")
        .output()
        .expect("run jobmux");
    assert!(output.status.success());
    let stderr = String::from_utf8(output.stderr).expect("utf8 stderr");
    assert!(stderr.contains("jobmux run"));
    assert!(stderr.contains("JOBMUX_COLOR"));
}

fn temp_workspace(name: &str) -> PathBuf {
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("time")
        .as_nanos();
    let root = std::env::temp_dir().join(format!("jobmux-{name}-{ts}"));
    fs::create_dir_all(&root).expect("mkdir workspace");
    root
}
