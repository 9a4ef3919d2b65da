//! Stub collaborators shared by the scan tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::config::AppConfig;
use crate::feed::{parse_feed, FeedList, FeedSource, ParsedFeed, PreviewFetcher};
use crate::publish::{EntryPost, PreviewImage, PublicationSink};
use crate::storage::Database;
use crate::{Error, Result};

use super::RunContext;

/// Serves canned feed documents by URL. Unknown URLs fail like a dead host.
#[derive(Default)]
pub struct StubSource {
    documents: Mutex<HashMap<String, String>>,
    stalls: HashMap<String, Duration>,
    pub fetched: Mutex<Vec<String>>,
}

impl StubSource {
    pub fn with_feed(self, url: &str, xml: String) -> Self {
        self.set_feed(url, xml);
        self
    }

    /// Make fetches of `url` hang for `delay` first
    pub fn with_stall(mut self, url: &str, delay: Duration) -> Self {
        self.stalls.insert(url.to_string(), delay);
        self
    }

    pub fn set_feed(&self, url: &str, xml: String) {
        self.documents.lock().unwrap().insert(url.to_string(), xml);
    }
}

#[async_trait::async_trait]
impl FeedSource for StubSource {
    async fn fetch(&self, url: &str) -> Result<ParsedFeed> {
        self.fetched.lock().unwrap().push(url.to_string());

        if let Some(delay) = self.stalls.get(url) {
            tokio::time::sleep(*delay).await;
        }

        let xml = self.documents.lock().unwrap().get(url).cloned();
        match xml {
            Some(xml) => parse_feed(xml.as_bytes()),
            None => Err(Error::FeedParse(format!("HTTP 503 from {}", url))),
        }
    }

    async fn fetch_feed_list(&self, url: &str) -> Result<FeedList> {
        Err(Error::Other(format!("no remote feed list at {}", url)))
    }
}

/// Records every post; the `fail_on`-th attempt (1-based) fails
#[derive(Default)]
pub struct RecordingSink {
    pub posts: Mutex<Vec<EntryPost>>,
    pub announcements: Mutex<Vec<String>>,
    attempts: Mutex<usize>,
    fail_on: Option<usize>,
}

impl RecordingSink {
    pub fn failing_on(attempt: usize) -> Self {
        Self {
            fail_on: Some(attempt),
            ..Default::default()
        }
    }

    pub fn attempts(&self) -> usize {
        *self.attempts.lock().unwrap()
    }

    pub fn posted_links(&self) -> Vec<String> {
        self.posts.lock().unwrap().iter().map(|p| p.link.clone()).collect()
    }
}

#[async_trait::async_trait]
impl PublicationSink for RecordingSink {
    async fn post(&self, post: &EntryPost) -> Result<()> {
        let attempt = {
            let mut attempts = self.attempts.lock().unwrap();
            *attempts += 1;
            *attempts
        };

        if self.fail_on == Some(attempt) {
            return Err(Error::Publish("createRecord returned 502".to_string()));
        }

        self.posts.lock().unwrap().push(post.clone());
        Ok(())
    }

    async fn post_plain_text(&self, text: &str) -> Result<()> {
        self.announcements.lock().unwrap().push(text.to_string());
        Ok(())
    }
}

/// Forwards to a shared sink so a test can inspect it after handing the context a box
pub struct SharedSink(pub std::sync::Arc<RecordingSink>);

#[async_trait::async_trait]
impl PublicationSink for SharedSink {
    async fn post(&self, post: &EntryPost) -> Result<()> {
        self.0.post(post).await
    }

    async fn post_plain_text(&self, text: &str) -> Result<()> {
        self.0.post_plain_text(text).await
    }
}

/// Same for sources
pub struct SharedSource(pub std::sync::Arc<StubSource>);

#[async_trait::async_trait]
impl FeedSource for SharedSource {
    async fn fetch(&self, url: &str) -> Result<ParsedFeed> {
        self.0.fetch(url).await
    }

    async fn fetch_feed_list(&self, url: &str) -> Result<FeedList> {
        self.0.fetch_feed_list(url).await
    }
}

/// Returns the same image for every page
pub struct FixedPreview;

#[async_trait::async_trait]
impl PreviewFetcher for FixedPreview {
    async fn fetch_preview(&self, _page_url: &str) -> Option<PreviewImage> {
        Some(PreviewImage {
            bytes: bytes::Bytes::from_static(b"\x89PNG"),
            mime: "image/png".to_string(),
        })
    }
}

/// Pacing disabled; everything else at defaults
pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.scan.post_interval_secs = 0;
    config
}

pub async fn test_context(
    config: AppConfig,
    source: std::sync::Arc<StubSource>,
    sink: std::sync::Arc<RecordingSink>,
) -> RunContext {
    let db = Database::new_in_memory().await.unwrap();
    RunContext::new(
        config,
        db,
        Box::new(SharedSource(source)),
        Box::new(SharedSink(sink)),
    )
}

/// An RSS document with the given channel `lastBuildDate` and `(link, pubDate)` items
pub fn rss(build_date: &str, items: &[(&str, &str)]) -> String {
    let items: String = items
        .iter()
        .map(|(link, date)| {
            format!(
                "<item><title>Entry {link}</title><link>{link}</link><pubDate>{date}</pubDate></item>"
            )
        })
        .collect();

    format!(
        r#"<?xml version="1.0"?>
<rss version="2.0"><channel>
<title>Example News</title>
<link>https://news.example.com/</link>
<lastBuildDate>{build_date}</lastBuildDate>
{items}
</channel></rss>"#
    )
}
