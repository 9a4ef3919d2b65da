use std::time::Duration;

use chrono::Utc;

use crate::feed::FeedList;
use crate::storage::CheckpointStore;
use crate::{Error, Result};

use super::engine::{ScanEngine, ScanOutcome};
use super::RunContext;

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Prune the ledger by the retention window after scanning
    pub prune: bool,
}

#[derive(Debug, Clone)]
pub struct FeedResult {
    pub url: String,
    pub outcome: ScanOutcome,
}

/// Summary of a completed run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub feeds: Vec<FeedResult>,
    /// Ledger records removed, when pruning was requested
    pub pruned: Option<u64>,
}

impl RunSummary {
    pub fn published(&self) -> u32 {
        self.feeds
            .iter()
            .filter_map(|f| match &f.outcome {
                ScanOutcome::Advanced(report) => Some(report.published),
                _ => None,
            })
            .sum()
    }

    pub fn skipped(&self) -> usize {
        self.feeds
            .iter()
            .filter(|f| f.outcome == ScanOutcome::Skipped)
            .count()
    }
}

/// Run every configured feed once, bounded by `run_timeout_secs`.
///
/// On timeout the ledger commits of finished feeds stand and no checkpoint
/// is written, so the next run rescans every feed.
pub async fn execute(ctx: &RunContext, options: RunOptions) -> Result<RunSummary> {
    let limit = ctx.config().scan.run_timeout_secs;

    match tokio::time::timeout(Duration::from_secs(limit), run(ctx, options)).await {
        Ok(result) => result,
        Err(_) => {
            tracing::error!("Run exceeded {}s and was aborted", limit);
            Err(Error::Timeout(limit))
        }
    }
}

async fn run(ctx: &RunContext, options: RunOptions) -> Result<RunSummary> {
    let feeds = load_feed_list(ctx).await?;
    let mut store = CheckpointStore::load(&ctx.config().checkpoint_path())?;

    tracing::info!("Checking {} feeds", feeds.check_feeds.len());

    let engine = ScanEngine::new(ctx);
    let mut checkpoints = Vec::with_capacity(feeds.check_feeds.len());
    let mut summary = RunSummary::default();

    for feed in &feeds.check_feeds {
        let previous = store.get_or_bootstrap(&feed.url, Utc::now());
        let (checkpoint, outcome) = engine.scan(feed, previous).await?;

        checkpoints.push(checkpoint);
        summary.feeds.push(FeedResult {
            url: feed.url.clone(),
            outcome,
        });
    }

    // Only written once every feed has been scanned
    store.put_all(checkpoints)?;

    if options.prune {
        let retention = chrono::Duration::days(i64::from(ctx.config().ledger.retention_days));
        summary.pruned = Some(ctx.ledger().prune(retention).await?);
    }

    tracing::info!(
        feeds = summary.feeds.len(),
        published = summary.published(),
        skipped = summary.skipped(),
        "Run complete"
    );

    Ok(summary)
}

/// The remote list wins when configured
pub async fn load_feed_list(ctx: &RunContext) -> Result<FeedList> {
    match &ctx.config().feeds.remote_url {
        Some(url) => ctx.source().fetch_feed_list(url).await,
        None => FeedList::from_path(&ctx.config().feeds_path()),
    }
}
