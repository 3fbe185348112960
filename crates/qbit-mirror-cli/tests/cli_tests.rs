use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn write_config(dir: &Path, log_file: &Path) -> PathBuf {
    let text = format!(
        r#"
database_file = "{db}"
log_file = "{log}"
verbose = 0
request_timeout_secs = 2

[source]
host = "127.0.0.1"
port = 1
use_https = false
username = "admin"
password = "adminadmin"

[destination]
host = "127.0.0.1"
port = 1
use_https = false
username = "admin"
password = "adminadmin"
"#,
        db = dir.join("state.db").display(),
        log = log_file.display(),
    );
    let path = dir.join("config.toml");
    fs::write(&path, text).unwrap();
    path
}

fn run_cli(dir: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_qbit-mirror"))
        .args(args)
        .current_dir(dir)
        .env_clear()
        .output()
        .unwrap()
}

#[test]
fn test_unreachable_source_is_logged_and_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let log_file = dir.path().join("logs").join("errors.log");
    let config = write_config(dir.path(), &log_file);

    let output = run_cli(dir.path(), &["--config", config.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));
    let logged = fs::read_to_string(&log_file).unwrap();
    assert!(!logged.is_empty());
    assert!(logged.contains("connecting to source"), "log was: {}", logged);
    assert!(!logged.contains('\u{1b}'));
}

#[test]
fn test_unusable_log_location_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    fs::write(&blocker, b"x").unwrap();
    let config = write_config(dir.path(), &blocker.join("errors.log"));

    let output = run_cli(dir.path(), &["--config", config.to_str().unwrap()]);

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_missing_config_exits_one() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");

    let output = run_cli(dir.path(), &["--config", missing.to_str().unwrap(), "stats"]);

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_stats_on_fresh_store_succeeds() {
    let dir = tempfile::tempdir().unwrap();
    let log_file = dir.path().join("errors.log");
    let config = write_config(dir.path(), &log_file);

    let output = run_cli(dir.path(), &["--config", config.to_str().unwrap(), "stats"]);

    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains("blacklisted"));
    assert_eq!(fs::read_to_string(&log_file).unwrap_or_default(), "");
}
