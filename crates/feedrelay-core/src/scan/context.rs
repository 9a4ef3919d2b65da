use crate::config::AppConfig;
use crate::feed::{FeedFetcher, FeedSource, PageImageFetcher, PreviewFetcher};
use crate::publish::{BlueskySink, DryRunSink, PublicationSink};
use crate::storage::{Database, DedupLedger};
use crate::Result;

use super::detect::{detector_for, ChangeDetector};

/// Everything one invocation needs, built once and handed to every component
pub struct RunContext {
    config: AppConfig,
    db: Database,
    source: Box<dyn FeedSource>,
    sink: Box<dyn PublicationSink>,
    preview: Option<Box<dyn PreviewFetcher>>,
    detector: Box<dyn ChangeDetector>,
}

impl RunContext {
    /// Assemble a context from explicit collaborators.
    /// The change detector follows `config.scan.change_detection`; no preview fetcher is set.
    pub fn new(
        config: AppConfig,
        db: Database,
        source: Box<dyn FeedSource>,
        sink: Box<dyn PublicationSink>,
    ) -> Self {
        let detector = detector_for(config.scan.change_detection);
        Self {
            config,
            db,
            source,
            sink,
            preview: None,
            detector,
        }
    }

    pub fn with_preview(mut self, preview: Box<dyn PreviewFetcher>) -> Self {
        self.preview = Some(preview);
        self
    }

    pub fn with_detector(mut self, detector: Box<dyn ChangeDetector>) -> Self {
        self.detector = detector;
        self
    }

    /// Production wiring: HTTP fetchers, the Bluesky sink (or the dry-run
    /// sink) and the on-disk ledger.
    pub async fn open(config: AppConfig) -> Result<Self> {
        let sink: Box<dyn PublicationSink> = if config.publisher.dry_run {
            tracing::info!("Dry-run mode: posts are logged, not published");
            Box::new(DryRunSink)
        } else {
            Box::new(BlueskySink::login_from_env(&config).await?)
        };

        let source = Box::new(FeedFetcher::new(&config)?);
        let preview: Option<Box<dyn PreviewFetcher>> = if config.scan.thumbnails {
            Some(Box::new(PageImageFetcher::new(&config)?))
        } else {
            None
        };

        let db = Database::new(&config).await?;

        let mut ctx = Self::new(config, db, source, sink);
        ctx.preview = preview;
        Ok(ctx)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    pub fn ledger(&self) -> DedupLedger<'_> {
        DedupLedger::new(&self.db)
    }

    pub fn source(&self) -> &dyn FeedSource {
        self.source.as_ref()
    }

    pub fn sink(&self) -> &dyn PublicationSink {
        self.sink.as_ref()
    }

    pub fn preview(&self) -> Option<&dyn PreviewFetcher> {
        self.preview.as_deref()
    }

    pub fn detector(&self) -> &dyn ChangeDetector {
        self.detector.as_ref()
    }

    /// Release the ledger connection
    pub async fn close(&self) {
        self.db.close().await;
    }
}
