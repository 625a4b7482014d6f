//! Tracing setup: stdout plus a daily-rolling log file

use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

use crate::config::schema::LoggingConfig;

const LOG_FILE_PREFIX: &str = "expert-panel.log";
const LOG_RETENTION_DAYS: u64 = 7;

/// Build the level filter: `RUST_LOG` wins over the configured level, and
/// per-module overrides from the config are layered on top.
pub fn build_filter(config: &LoggingConfig) -> EnvFilter {
    let mut filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    for (module, level) in &config.overrides {
        match format!("{}={}", module, level).parse() {
            Ok(directive) => filter = filter.add_directive(directive),
            Err(_) => eprintln!("Invalid log directive: {}={}", module, level),
        }
    }

    filter
}

/// Initialize the logging system.
///
/// The returned guard flushes the file writer on drop and must be held for
/// the lifetime of the process.
pub fn init_logging(config: &LoggingConfig) -> WorkerGuard {
    let format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| config.format.clone());
    let is_json = format.eq_ignore_ascii_case("json");

    if let Err(e) = std::fs::create_dir_all(&config.dir) {
        eprintln!("Failed to create log directory {}: {}", config.dir, e);
    }

    // Produces expert-panel.log.YYYY-MM-DD
    let file_appender = tracing_appender::rolling::daily(&config.dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let stdout_layer = if is_json {
        fmt::layer().json().with_target(true).boxed()
    } else {
        fmt::layer().with_target(true).compact().boxed()
    };

    let file_layer = if is_json {
        fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };

    // try_init: a subscriber may already be installed (tests, embedding hosts)
    let _ = Registry::default()
        .with(build_filter(config))
        .with(stdout_layer)
        .with(file_layer)
        .try_init();

    if let Err(e) = cleanup_old_logs(Path::new(&config.dir), LOG_RETENTION_DAYS) {
        eprintln!("Failed to clean up old logs: {}", e);
    }

    guard
}

/// Remove rolled log files older than `days` days
fn cleanup_old_logs(dir: &Path, days: u64) -> std::io::Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }

    let now = SystemTime::now();
    let threshold = Duration::from_secs(days * 24 * 3600);
    let mut removed = 0;

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
        if !path.is_file() || !is_log {
            continue;
        }

        let age = entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if age.is_some_and(|age| age > threshold) {
            match std::fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => eprintln!("Failed to remove old log file {:?}: {}", path, e),
            }
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_cleanup_keeps_fresh_logs_and_foreign_files() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("expert-panel.log.2026-01-01"), "x").unwrap();
        std::fs::write(temp_dir.path().join("notes.txt"), "x").unwrap();

        let removed = cleanup_old_logs(temp_dir.path(), 7).unwrap();
        assert_eq!(removed, 0);
        assert_eq!(std::fs::read_dir(temp_dir.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_cleanup_missing_dir_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("absent");
        assert_eq!(cleanup_old_logs(&missing, 7).unwrap(), 0);
    }

    #[test]
    fn test_build_filter_accepts_overrides() {
        let mut config = LoggingConfig::default();
        config
            .overrides
            .insert("expert_panel_agent".to_string(), "debug".to_string());
        let filter = build_filter(&config);
        assert!(filter.to_string().contains("expert_panel_agent=debug"));
    }
}
