use anyhow::{Context, Result};
use qbit_mirror_core::AppConfig;
use std::env;
use std::fs;
use std::path::Path;
use tracing::debug;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

fn console_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "error",
        1 => "info",
        _ => "debug",
    }
}

/// Open the persistent error log. The appender writes straight to the file,
/// so a line logged right before `process::exit` is not lost.
fn error_log_appender(log_path: &Path) -> Result<RollingFileAppender> {
    let directory = log_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = log_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "qbit-mirror.log".to_string());

    fs::create_dir_all(directory)
        .with_context(|| format!("creating log directory {}", directory.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(directory)
        .with_context(|| format!("opening log file {}", log_path.display()))
}

/// Console output at the configured verbosity plus an error-only log file.
pub fn init_logger(config: &AppConfig) -> Result<()> {
    let error_log = error_log_appender(&config.log_file)?;

    let filter = env::var("TRACING_LEVEL")
        .unwrap_or_else(|_| console_level(config.verbose).to_string());
    let console_filter = EnvFilter::new(filter);

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stdout)
                .with_target(false)
                .without_time()
                .with_ansi(true)
                .with_filter(console_filter),
        )
        .with(
            fmt::layer()
                .with_writer(error_log)
                .with_ansi(false)
                .with_target(false)
                .with_filter(LevelFilter::ERROR),
        )
        .init();

    debug!("Errors are also written to {}", config.log_file.display());
    Ok(())
}

/// Logging for the paths that run before the error log is available.
pub fn init_console_only() {
    let filter = env::var("TRACING_LEVEL").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .without_time()
                .with_filter(EnvFilter::new(filter)),
        )
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_level_follows_verbosity() {
        assert_eq!(console_level(0), "error");
        assert_eq!(console_level(1), "info");
        assert_eq!(console_level(2), "debug");
        assert_eq!(console_level(7), "debug");
    }

    #[test]
    fn test_error_log_creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("errors.log");
        error_log_appender(&path).unwrap();
        assert!(path.parent().unwrap().is_dir());
    }

    #[test]
    fn test_error_log_under_a_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"x").unwrap();
        let result = error_log_appender(&blocker.join("errors.log"));
        assert!(result.is_err());
    }
}
