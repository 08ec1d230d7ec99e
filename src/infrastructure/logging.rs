//! Logging system configuration and initialization
//!
//! This module provides the logging setup shared by every subcommand:
//! - Console output, plain or JSON
//! - Daily-rolling file output through a non-blocking writer
//! - `RUST_LOG` override, otherwise the configured level plus quieter
//!   directives for chatty dependencies
//! - Removal of old log files beyond `max_files`

#![allow(clippy::uninlined_format_args)]

use anyhow::{Result, anyhow};
use lazy_static::lazy_static;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt};

pub use crate::infrastructure::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "shelf-scout.log";

// Global guard to keep the log file writer alive
lazy_static! {
    static ref LOG_GUARDS: Mutex<Vec<tracing_appender::non_blocking::WorkerGuard>> = Mutex::new(Vec::new());
}

/// Get the log directory relative to the executable location
#[must_use]
pub fn get_log_directory() -> PathBuf {
    let exe_dir = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default());

    exe_dir.join("logs")
}

/// Build the filter: `RUST_LOG` wins, otherwise level plus module directives.
pub fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let mut directives = vec![config.level.clone()];
        // Dependencies stay quiet unless TRACE is requested explicitly
        if !config.level.eq_ignore_ascii_case("trace") {
            let mut modules: Vec<_> = config.module_filters.iter().collect();
            modules.sort();
            directives.extend(modules.into_iter().map(|(module, level)| format!("{module}={level}")));
        }
        EnvFilter::try_new(directives.join(",")).unwrap_or_else(|e| {
            eprintln!("Invalid log filter '{}': {}", directives.join(","), e);
            EnvFilter::new("info")
        })
    })
}

/// Initialize the logging system with default configuration
pub fn init_logging() -> Result<()> {
    init_logging_with_config(&LoggingConfig::default())
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    if !config.file_output && !config.console_output {
        return Err(anyhow!("No logging output configured"));
    }

    let log_dir = config.log_dir.clone().unwrap_or_else(get_log_directory);

    let file_layer = if config.file_output {
        std::fs::create_dir_all(&log_dir)
            .map_err(|e| anyhow!("Failed to create log directory {:?}: {}", log_dir, e))?;
        cleanup_old_logs(&log_dir, config.max_files)?;

        let (file_writer, file_guard) = non_blocking(rolling::daily(&log_dir, LOG_FILE_PREFIX));
        LOG_GUARDS
            .lock()
            .map_err(|_| anyhow!("Log guard registry poisoned"))?
            .push(file_guard);

        let layer = fmt::Layer::new().with_writer(file_writer).with_ansi(false);
        Some(if config.json_format {
            layer.json().with_target(true).with_file(true).with_line_number(true).boxed()
        } else {
            layer.with_target(false).boxed()
        })
    } else {
        None
    };

    let console_layer = config.console_output.then(|| {
        let layer = fmt::Layer::new().with_writer(std::io::stdout);
        if config.json_format {
            layer.json().boxed()
        } else {
            layer.with_target(false).boxed()
        }
    });

    Registry::default()
        .with(build_env_filter(config))
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))?;

    info!("Logging system initialized");
    info!("Log level: {}", config.level);
    if config.file_output {
        info!("Log directory: {:?}", log_dir);
    }

    Ok(())
}

/// Keep only the `max_files` most recently modified log files
fn cleanup_old_logs(log_dir: &Path, max_files: u32) -> Result<()> {
    if !log_dir.exists() {
        return Ok(());
    }

    let mut log_files = Vec::new();
    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
        if path.is_file() && is_log {
            if let Ok(modified) = entry.metadata().and_then(|m| m.modified()) {
                log_files.push((path, modified));
            }
        }
    }

    // Newest first
    log_files.sort_by(|a, b| b.1.cmp(&a.1));

    for (path, _) in log_files.iter().skip(max_files as usize) {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove old log file {:?}: {}", path, e);
        }
    }

    Ok(())
}
