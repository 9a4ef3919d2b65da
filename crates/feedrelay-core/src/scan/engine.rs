use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::feed::{date, CandidateEntry, FeedSubscription, ParsedFeed};
use crate::publish::EntryPost;
use crate::storage::FeedCheckpoint;
use crate::Result;

use super::RunContext;

/// What one feed's scan did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// The feed could not be fetched or parsed; its checkpoint is untouched
    Skipped,
    /// The feed-level marker matched the checkpoint; no entry was read
    Unchanged,
    /// Entries were evaluated and the checkpoint moved to the feed's marker
    Advanced(ScanReport),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanReport {
    /// Entries looked at, bounded by `max_check_entries`
    pub evaluated: u32,
    /// Entries not newer than the previous checkpoint
    pub stale: u32,
    /// Entries whose link was already in the ledger
    pub duplicates: u32,
    /// Entries without a link, which can be neither deduplicated nor posted
    pub unlinked: u32,
    /// Entries recorded and handed to the sink
    pub candidates: u32,
    pub published: u32,
    /// A publish failed and the remaining entries were left for the next run
    pub halted: bool,
}

/// Scans one feed against its checkpoint and publishes what is new.
///
/// # Write-ahead policy
///
/// An entry's link is recorded in the ledger *before* the sink is called, and
/// the record is kept when the post fails. A crash or failure between the two
/// steps therefore loses that entry instead of posting it twice. The ledger
/// batch for a feed is committed once the entry loop ends, whether or not it
/// halted on a publish failure.
pub struct ScanEngine<'a> {
    ctx: &'a RunContext,
}

impl<'a> ScanEngine<'a> {
    pub fn new(ctx: &'a RunContext) -> Self {
        Self { ctx }
    }

    pub async fn scan(
        &self,
        feed: &FeedSubscription,
        checkpoint: FeedCheckpoint,
    ) -> Result<(FeedCheckpoint, ScanOutcome)> {
        let parsed = match self.ctx.source().fetch(&feed.url).await {
            Ok(parsed) => parsed,
            Err(e) => {
                tracing::warn!("Failed to fetch feed {}: {}", feed.url, e);
                return Ok((checkpoint, ScanOutcome::Skipped));
            }
        };

        let marker = parsed
            .update_marker()
            .map(str::to_string)
            .unwrap_or_else(|| date::format_marker(Utc::now()));

        if !self.ctx.detector().has_changed(&checkpoint.updated, &marker) {
            tracing::debug!("Feed {} unchanged since {}", feed.url, checkpoint.updated);
            return Ok((checkpoint, ScanOutcome::Unchanged));
        }

        let since = date::parse(&checkpoint.updated);
        let report = self.publish_new_entries(feed, &parsed, since).await?;

        tracing::info!(
            feed = %feed.url,
            evaluated = report.evaluated,
            published = report.published,
            halted = report.halted,
            "Feed scanned"
        );

        let advanced = FeedCheckpoint {
            href: checkpoint.href,
            updated: marker,
        };
        Ok((advanced, ScanOutcome::Advanced(report)))
    }

    async fn publish_new_entries(
        &self,
        feed: &FeedSubscription,
        parsed: &ParsedFeed,
        since: DateTime<Utc>,
    ) -> Result<ScanReport> {
        let config = &self.ctx.config().scan;
        let feed_title = parsed
            .title
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .unwrap_or(feed.url.as_str());

        let mut report = ScanReport::default();
        let mut batch = self.ctx.ledger().begin().await?;

        for entry in parsed.entries.iter().take(config.max_check_entries) {
            report.evaluated += 1;

            let published_at = date::parse(entry.update_marker().unwrap_or_default());
            if published_at <= since {
                report.stale += 1;
                continue;
            }

            let Some(candidate) = CandidateEntry::from_parsed(entry, feed_title) else {
                report.unlinked += 1;
                continue;
            };

            if batch.is_posted(&candidate.link).await? {
                report.duplicates += 1;
                continue;
            }

            // Storage errors end the scan; only sink errors are fail-stop
            batch.record(&candidate.link, Utc::now()).await?;
            report.candidates += 1;

            match self.publish(&candidate).await {
                Ok(()) => {
                    report.published += 1;
                    if config.post_interval_secs > 0 {
                        tokio::time::sleep(Duration::from_secs(config.post_interval_secs)).await;
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to publish {} from {}: {}", candidate.link, feed.url, e);
                    report.halted = true;
                    break;
                }
            }
        }

        batch.commit().await?;
        Ok(report)
    }

    async fn publish(&self, candidate: &CandidateEntry) -> Result<()> {
        let image = match self.ctx.preview() {
            Some(preview) => preview.fetch_preview(&candidate.link).await,
            None => None,
        };

        let post = EntryPost {
            text: candidate.feed_title.clone(),
            link: candidate.link.clone(),
            title: candidate.title.clone(),
            image,
        };

        self.ctx.sink().post(&post).await?;
        tracing::info!("Published {}", candidate.link);
        Ok(())
    }
}
