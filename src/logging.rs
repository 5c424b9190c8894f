//! Tracing setup for the jobscout binary.
//!
//! Progress lines go to stdout, so diagnostics never share it: they go to
//! stderr, or with `logging.to_file` to `<state>/logs/jobscout-<utc>.log`.
//! Poll failures are only ever visible here.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;

/// Keeps the file writer alive; drop it last so buffered lines are flushed
pub struct LoggingHandle {
    pub _guard: Option<WorkerGuard>,

    /// Set only when logging to a file
    pub log_file_path: Option<PathBuf>,
}

#[derive(Debug, PartialEq, Eq)]
enum LogTarget {
    Stderr,
    File(PathBuf),
}

fn log_target(config: &Config) -> LogTarget {
    if config.logging.to_file {
        let name = format!("jobscout-{}.log", chrono::Utc::now().format("%Y%m%dT%H%M%SZ"));
        LogTarget::File(config.logs_path().join(name))
    } else {
        LogTarget::Stderr
    }
}

/// `RUST_LOG` wins, then `--debug`, then `logging.level`
fn filter_directive(config: &Config, debug: bool, rust_log: Option<String>) -> String {
    match rust_log {
        Some(directive) if !directive.trim().is_empty() => directive,
        _ if debug => "debug".to_string(),
        _ => config.logging.level.clone(),
    }
}

pub fn init_logging(config: &Config, debug: bool) -> Result<LoggingHandle> {
    let filter = EnvFilter::new(filter_directive(
        config,
        debug,
        std::env::var("RUST_LOG").ok(),
    ));

    match log_target(config) {
        LogTarget::Stderr => {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_writer(std::io::stderr),
                )
                .init();

            Ok(LoggingHandle {
                _guard: None,
                log_file_path: None,
            })
        }
        LogTarget::File(path) => {
            let (dir, name) = split_log_path(&path)?;
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;

            let (writer, guard) =
                tracing_appender::non_blocking(tracing_appender::rolling::never(dir, name));
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_target(false)
                        .with_ansi(false)
                        .with_writer(writer),
                )
                .init();

            Ok(LoggingHandle {
                _guard: Some(guard),
                log_file_path: Some(path),
            })
        }
    }
}

fn split_log_path(path: &Path) -> Result<(&Path, &std::ffi::OsStr)> {
    let dir = path.parent().context("Log file has no parent directory")?;
    let name = path.file_name().context("Log file has no name")?;
    Ok((dir, name))
}
