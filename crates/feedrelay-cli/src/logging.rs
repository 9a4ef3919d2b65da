//! Logging setup: console output plus append-only warning and error logs.

use std::fs::{self, File, OpenOptions};
use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use tracing::Level;
use tracing_subscriber::filter::{filter_fn, LevelFilter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use feedrelay_core::AppConfig;

pub const WARN_LOG: &str = "warn.log";
pub const ERROR_LOG: &str = "error.log";

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `general.log_level`. `warn.log` receives WARN events
/// only and `error.log` ERROR events only; both are opened for append.
pub fn init(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level));

    let log_dir = config.log_dir();
    let warn_file = Arc::new(open_append(&log_dir.join(WARN_LOG))?);
    let error_file = Arc::new(open_append(&log_dir.join(ERROR_LOG))?);

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(warn_file)
                .with_ansi(false)
                .with_filter(filter_fn(|meta| *meta.level() == Level::WARN)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(error_file)
                .with_ansi(false)
                .with_filter(LevelFilter::ERROR),
        )
        .init();

    Ok(())
}

fn open_append(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}
