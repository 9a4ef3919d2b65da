use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::feed::date;
use crate::Result;

/// Last feed-level update marker seen for one source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedCheckpoint {
    pub href: String,
    pub updated: String,
}

impl FeedCheckpoint {
    /// A checkpoint for a feed seen for the first time: history before `now` is never posted
    pub fn bootstrap(href: &str, now: DateTime<Utc>) -> Self {
        Self {
            href: href.to_string(),
            updated: date::format_marker(now),
        }
    }
}

/// JSON-file store of every feed's checkpoint.
///
/// Read once when a run starts and rewritten once when it ends.
pub struct CheckpointStore {
    path: PathBuf,
    checkpoints: Vec<FeedCheckpoint>,
}

impl CheckpointStore {
    /// Load the store; a missing or blank file is an empty store
    pub fn load(path: &Path) -> Result<Self> {
        let checkpoints = match std::fs::read_to_string(path) {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        tracing::debug!("Loaded {} checkpoints from {}", checkpoints.len(), path.display());

        Ok(Self {
            path: path.to_path_buf(),
            checkpoints,
        })
    }

    pub fn get(&self, source_url: &str) -> Option<&FeedCheckpoint> {
        self.checkpoints.iter().find(|c| c.href == source_url)
    }

    pub fn get_or_bootstrap(&self, source_url: &str, now: DateTime<Utc>) -> FeedCheckpoint {
        self.get(source_url)
            .cloned()
            .unwrap_or_else(|| FeedCheckpoint::bootstrap(source_url, now))
    }

    pub fn checkpoints(&self) -> &[FeedCheckpoint] {
        &self.checkpoints
    }

    /// Merge `updates` by `href` and rewrite the file atomically.
    /// Checkpoints of feeds absent from `updates` are kept.
    pub fn put_all(&mut self, updates: Vec<FeedCheckpoint>) -> Result<()> {
        for update in updates {
            match self.checkpoints.iter_mut().find(|c| c.href == update.href) {
                Some(existing) => *existing = update,
                None => self.checkpoints.push(update),
            }
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(&self.checkpoints)?;
        let tmp_path = self.path.with_extension("json.tmp");
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, &self.path)?;

        tracing::debug!("Wrote {} checkpoints to {}", self.checkpoints.len(), self.path.display());
        Ok(())
    }
}
