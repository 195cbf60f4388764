// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Logging initialisation
//!
//! Console logging is always available. With the `file-logging` feature a
//! timestamped run folder receives one JSON log per crate plus a combined log.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::CrateDebugFlags;

/// Keeps background log writers alive; logs are flushed when dropped
pub struct LoggingGuard {
    #[cfg(feature = "file-logging")]
    _file_guards: Vec<tracing_appender::non_blocking::WorkerGuard>,
    log_dir: Option<PathBuf>,
}

impl LoggingGuard {
    /// Run folder receiving file logs, if file logging is active
    pub fn log_dir(&self) -> Option<&Path> {
        self.log_dir.as_deref()
    }
}

/// Initialise console-only logging
///
/// `default_level` applies to every crate without a debug flag.
pub fn init_console_logging(debug_flags: &CrateDebugFlags, default_level: &str) -> Result<LoggingGuard> {
    let filter = EnvFilter::try_new(debug_flags.to_filter_string(default_level))
        .with_context(|| format!("Invalid log level '{}'", default_level))?;

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_filter(filter);

    Registry::default()
        .with(console_layer)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(LoggingGuard {
        #[cfg(feature = "file-logging")]
        _file_guards: Vec::new(),
        log_dir: None,
    })
}

/// Initialise console logging plus per-crate JSON log files
///
/// Creates `<log_dir>/run_<timestamp>/<crate>.log` and a combined
/// `synmatrix.log`; only the newest `retention_runs` run folders are kept.
#[cfg(feature = "file-logging")]
pub fn init_logging(
    debug_flags: &CrateDebugFlags,
    default_level: &str,
    log_dir: &Path,
    retention_runs: usize,
) -> Result<LoggingGuard> {
    use tracing_appender::rolling;

    let timestamp = chrono::Utc::now().format("%Y%m%d_%H%M%S");
    let run_folder = log_dir.join(format!("run_{}", timestamp));
    std::fs::create_dir_all(&run_folder)
        .with_context(|| format!("Failed to create log directory: {}", run_folder.display()))?;

    cleanup_old_runs(log_dir, retention_runs)?;

    let filter_string = debug_flags.to_filter_string(default_level);
    let console_filter = EnvFilter::try_new(&filter_string)
        .with_context(|| format!("Invalid log level '{}'", default_level))?;

    let mut layers = Vec::new();
    let mut file_guards = Vec::new();

    layers.push(
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_filter(console_filter)
            .boxed(),
    );

    for crate_name in crate::KNOWN_CRATES {
        let appender = rolling::never(&run_folder, format!("{}.log", crate_name));
        let (non_blocking, guard) = tracing_appender::non_blocking(appender);
        file_guards.push(guard);

        layers.push(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .json()
                .with_filter(EnvFilter::new(format!("{}=debug,off", crate_name)))
                .boxed(),
        );
    }

    let combined = rolling::never(&run_folder, "synmatrix.log");
    let (combined_non_blocking, combined_guard) = tracing_appender::non_blocking(combined);
    file_guards.push(combined_guard);
    layers.push(
        tracing_subscriber::fmt::layer()
            .with_writer(combined_non_blocking)
            .with_target(true)
            .json()
            .with_filter(EnvFilter::new(&filter_string))
            .boxed(),
    );

    Registry::default()
        .with(layers)
        .try_init()
        .context("A global tracing subscriber is already installed")?;

    Ok(LoggingGuard {
        _file_guards: file_guards,
        log_dir: Some(run_folder),
    })
}

/// Remove all but the newest `retention_runs` run folders
#[cfg_attr(not(feature = "file-logging"), allow(dead_code))]
fn cleanup_old_runs(base_log_dir: &Path, retention_runs: usize) -> Result<()> {
    if !base_log_dir.exists() {
        return Ok(());
    }

    let mut runs: Vec<(PathBuf, chrono::NaiveDateTime)> = Vec::new();
    for entry in std::fs::read_dir(base_log_dir)? {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let stamp = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix("run_"))
            .and_then(|s| chrono::NaiveDateTime::parse_from_str(s, "%Y%m%d_%H%M%S").ok());
        if let Some(stamp) = stamp {
            runs.push((path, stamp));
        }
    }

    runs.sort_by_key(|(_, stamp)| *stamp);
    let excess = runs.len().saturating_sub(retention_runs);
    for (path, _) in runs.into_iter().take(excess) {
        std::fs::remove_dir_all(&path)
            .with_context(|| format!("Failed to remove old log directory {}", path.display()))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanup_keeps_newest_runs() {
        let base = std::env::temp_dir().join(format!("synmatrix-log-test-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&base);
        for stamp in ["20250101_000000", "20250102_000000", "20250103_000000"] {
            std::fs::create_dir_all(base.join(format!("run_{}", stamp))).unwrap();
        }
        std::fs::create_dir_all(base.join("unrelated")).unwrap();

        cleanup_old_runs(&base, 2).unwrap();

        assert!(!base.join("run_20250101_000000").exists());
        assert!(base.join("run_20250102_000000").exists());
        assert!(base.join("run_20250103_000000").exists());
        assert!(base.join("unrelated").exists());
        std::fs::remove_dir_all(&base).unwrap();
    }

    #[test]
    fn test_missing_log_dir_is_not_an_error() {
        let base = Path::new("/nonexistent/synmatrix/logs");
        assert!(cleanup_old_runs(base, 1).is_ok());
    }
}
