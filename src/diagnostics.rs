//! Logging setup and log-file housekeeping.
//!
//! The engine itself only emits `tracing` events and never installs a
//! subscriber. Hosts that want the standard console-plus-rolling-file
//! setup call [`init_logging`] once at startup and keep the returned
//! guard alive for the life of the process; embedders with their own
//! subscriber skip this module entirely.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::error::{EngineError, Result};

/// Maximum number of log files to retain.
pub const MAX_LOG_FILES: usize = 10;

/// File name prefix for the daily rolling appender.
const LOG_FILE_PREFIX: &str = "tillkit";

/// Default log directory, for hosts without their own layout.
pub fn default_log_dir() -> PathBuf {
    let base = std::env::var("LOCALAPPDATA")
        .or_else(|_| std::env::var("XDG_DATA_HOME"))
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            #[cfg(target_os = "windows")]
            {
                PathBuf::from(std::env::var("USERPROFILE").unwrap_or_default())
                    .join("AppData")
                    .join("Local")
            }
            #[cfg(not(target_os = "windows"))]
            {
                PathBuf::from(std::env::var("HOME").unwrap_or_default())
                    .join(".local")
                    .join("share")
            }
        });
    base.join("tillkit").join("logs")
}

/// Install console plus daily-rolling-file logging.
///
/// Honors `RUST_LOG`; the fallback filter is `info` globally with engine
/// debug. Old log files are pruned first. The returned guard flushes the
/// file writer on drop, so the host must hold it until shutdown.
pub fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tillkit=debug"));

    prune_old_logs(log_dir);
    fs::create_dir_all(log_dir).map_err(|e| EngineError::storage("create log dir", e))?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);
    let console_layer = fmt::layer().with_target(true);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| EngineError::storage("install log subscriber", e))?;

    Ok(guard)
}

/// Prune old log files in `log_dir`, keeping only the most recent
/// `MAX_LOG_FILES`. Files without the engine's prefix are left alone.
pub fn prune_old_logs(log_dir: &Path) {
    if !log_dir.exists() {
        return;
    }

    let mut log_files: Vec<(PathBuf, std::time::SystemTime)> = Vec::new();
    if let Ok(entries) = fs::read_dir(log_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_file() {
                if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                    if name.starts_with("tillkit.") || name == "tillkit.log" {
                        let modified = entry
                            .metadata()
                            .ok()
                            .and_then(|m| m.modified().ok())
                            .unwrap_or(std::time::UNIX_EPOCH);
                        log_files.push((path, modified));
                    }
                }
            }
        }
    }

    // Sort newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    // Remove files beyond the limit
    for (path, _) in log_files.iter().skip(MAX_LOG_FILES) {
        if let Err(e) = fs::remove_file(path) {
            warn!("Failed to prune log file {}: {e}", path.display());
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
