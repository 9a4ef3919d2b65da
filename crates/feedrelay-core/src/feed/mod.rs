pub mod date;
mod fetcher;
mod models;
mod parser;
mod preview;

pub use fetcher::{build_http_client, FeedFetcher, FeedSource};
pub use models::{CandidateEntry, FeedList, FeedSubscription, ParsedEntry, ParsedFeed};
pub use parser::parse_feed;
pub use preview::{PageImageFetcher, PreviewFetcher};
