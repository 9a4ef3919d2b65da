mod bluesky;
mod dry_run;

pub use bluesky::BlueskySink;
pub use dry_run::DryRunSink;

use bytes::Bytes;

use crate::Result;

/// Image attached to a link card
#[derive(Debug, Clone)]
pub struct PreviewImage {
    pub bytes: Bytes,
    pub mime: String,
}

/// One entry rendered for publication
#[derive(Debug, Clone)]
pub struct EntryPost {
    /// Post body; the feed's display name
    pub text: String,
    pub link: String,
    pub title: String,
    pub image: Option<PreviewImage>,
}

/// The posting API boundary.
///
/// Each call is a single attempt. An `Err` means the post was not published.
#[async_trait::async_trait]
pub trait PublicationSink: Send + Sync {
    async fn post(&self, post: &EntryPost) -> Result<()>;

    /// Plain text post without a link card, used for operational announcements
    async fn post_plain_text(&self, text: &str) -> Result<()>;
}
