use super::{EntryPost, PublicationSink};
use crate::Result;

/// Logs posts instead of publishing them
#[derive(Debug, Default)]
pub struct DryRunSink;

#[async_trait::async_trait]
impl PublicationSink for DryRunSink {
    async fn post(&self, post: &EntryPost) -> Result<()> {
        tracing::info!(
            text = %post.text,
            link = %post.link,
            title = %post.title,
            thumbnail = post.image.is_some(),
            "[dry-run] would post entry"
        );
        Ok(())
    }

    async fn post_plain_text(&self, text: &str) -> Result<()> {
        tracing::info!(text, "[dry-run] would post text");
        Ok(())
    }
}
