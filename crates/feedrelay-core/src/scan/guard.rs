use std::fs::{self, File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};

use crate::config::AppConfig;
use crate::Result;

/// Whether a run may start
#[derive(Debug)]
pub enum Admission {
    /// The stop sentinel exists; nothing may run until it is cleared
    Stopped,
    /// Another run holds the lock
    Busy,
    Granted(RunLock),
}

/// Exclusive advisory lock on the lock file, released on drop
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            tracing::warn!("Failed to release {}: {}", self.path.display(), e);
        }
    }
}

/// Check the stop sentinel, then try the run lock without blocking
pub fn admit(config: &AppConfig) -> Result<Admission> {
    if is_stopped(config) {
        tracing::warn!(
            "Stop sentinel {} present, not running",
            config.stop_path().display()
        );
        return Ok(Admission::Stopped);
    }

    Ok(match try_lock(config)? {
        Some(lock) => Admission::Granted(lock),
        None => Admission::Busy,
    })
}

/// Take the run lock without consulting the stop sentinel; `None` when held elsewhere
pub fn try_lock(config: &AppConfig) -> Result<Option<RunLock>> {
    let path = config.lock_path();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(&path)?;

    match file.try_lock() {
        Ok(()) => {
            tracing::debug!("Acquired run lock {}", path.display());
            Ok(Some(RunLock { file, path }))
        }
        Err(TryLockError::WouldBlock) => {
            tracing::info!("Another run holds {}", path.display());
            Ok(None)
        }
        Err(TryLockError::Error(e)) => Err(e.into()),
    }
}

pub fn is_stopped(config: &AppConfig) -> bool {
    config.stop_path().exists()
}

pub fn create_stop_sentinel(config: &AppConfig) -> Result<()> {
    write_sentinel(&config.stop_path())
}

/// Remove the stop sentinel; returns whether one existed
pub fn clear_stop_sentinel(config: &AppConfig) -> Result<bool> {
    match fs::remove_file(config.stop_path()) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

fn write_sentinel(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    File::create(path)?;
    Ok(())
}
