use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::{Error, Result};

/// A feed to watch, as listed in the feed list document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSubscription {
    pub url: String,
}

/// The feed list document: `{ "check_feeds": [ { "url": "..." } ] }`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeedList {
    #[serde(default)]
    pub check_feeds: Vec<FeedSubscription>,
}

impl FeedList {
    pub fn from_path(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read feed list {}: {}", path.display(), e))
        })?;
        Self::from_json(content.as_bytes())
    }

    pub fn from_json(content: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(content)?)
    }
}

/// A feed document reduced to what the scanner needs. Dates stay raw.
#[derive(Debug, Clone, Default)]
pub struct ParsedFeed {
    pub title: Option<String>,
    /// `lastBuildDate`, `atom:updated` or `dc:date`
    pub updated: Option<String>,
    /// `pubDate` or `atom:published`
    pub published: Option<String>,
    pub entries: Vec<ParsedEntry>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedEntry {
    pub link: Option<String>,
    pub title: Option<String>,
    pub updated: Option<String>,
    pub published: Option<String>,
}

impl ParsedFeed {
    /// The feed-level marker compared against the checkpoint.
    /// Falls back to the first entry's marker when the feed carries none.
    pub fn update_marker(&self) -> Option<&str> {
        self.updated
            .as_deref()
            .or(self.published.as_deref())
            .or_else(|| self.entries.first().and_then(|e| e.update_marker()))
    }
}

impl ParsedEntry {
    pub fn update_marker(&self) -> Option<&str> {
        self.updated.as_deref().or(self.published.as_deref())
    }
}

/// An entry that may be published during the current scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEntry {
    pub link: String,
    pub title: String,
    pub updated_marker: String,
    pub feed_title: String,
}

impl CandidateEntry {
    /// Entries without a link cannot be deduplicated or linked to, so they yield `None`.
    pub fn from_parsed(entry: &ParsedEntry, feed_title: &str) -> Option<Self> {
        let link = entry.link.as_deref().map(str::trim).filter(|l| !l.is_empty())?;

        Some(Self {
            link: link.to_string(),
            title: entry.title.clone().unwrap_or_else(|| link.to_string()),
            updated_marker: entry.update_marker().unwrap_or_default().to_string(),
            feed_title: feed_title.to_string(),
        })
    }
}
