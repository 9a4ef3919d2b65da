use bytes::{Bytes, BytesMut};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::{Client, Response};
use std::time::Duration;
use url::Url;

use super::models::{FeedList, ParsedFeed};
use super::parser::parse_feed;
use crate::config::AppConfig;
use crate::{Error, Result};

const MAX_FEED_BYTES: usize = 5 * 1024 * 1024;
const CLIENT_USER_AGENT: &str = concat!("feedrelay/", env!("CARGO_PKG_VERSION"));

/// Where feed documents come from
#[async_trait::async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch and parse the feed at `url`. One attempt, no retries.
    async fn fetch(&self, url: &str) -> Result<ParsedFeed>;

    /// Fetch the remote feed list document
    async fn fetch_feed_list(&self, url: &str) -> Result<FeedList>;
}

/// Build the HTTP client shared by the fetchers
pub fn build_http_client(timeout_secs: u64) -> Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(CLIENT_USER_AGENT)
        .gzip(true)
        .deflate(true)
        .brotli(true)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(Error::Http)
}

/// A response body read up to a byte limit
pub(crate) struct CappedBody {
    pub bytes: Bytes,
    /// The body continued past the limit
    pub truncated: bool,
}

/// Read at most `limit` bytes of `response`, chunk by chunk.
/// Stops reading as soon as the limit is crossed, so an oversized body is never buffered whole.
pub(crate) async fn read_capped(
    mut response: Response,
    limit: usize,
) -> reqwest::Result<CappedBody> {
    let mut buf = BytesMut::new();

    while let Some(chunk) = response.chunk().await? {
        let room = limit - buf.len();
        if chunk.len() > room {
            buf.extend_from_slice(&chunk[..room]);
            return Ok(CappedBody {
                bytes: buf.freeze(),
                truncated: true,
            });
        }
        buf.extend_from_slice(&chunk);
    }

    Ok(CappedBody {
        bytes: buf.freeze(),
        truncated: false,
    })
}

/// Feed fetcher over HTTP
pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config.scan.request_timeout_secs)?,
        })
    }

    fn build_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "application/rss+xml,application/atom+xml,application/rdf+xml,application/xml;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(USER_AGENT, HeaderValue::from_static(CLIENT_USER_AGENT));
        headers
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Bytes> {
        Url::parse(url)?;

        tracing::debug!("Fetching {}", url);

        let response = self
            .client
            .get(url)
            .headers(Self::build_headers())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::FeedParse(format!("HTTP {} for URL: {}", status, url)));
        }

        if let Some(length) = response.content_length() {
            ensure_content_size(length as usize, url)?;
        }

        let body = read_capped(response, MAX_FEED_BYTES).await?;
        if body.truncated {
            return Err(Error::FeedParse(format!(
                "Feed too large (over {} bytes) for URL: {}",
                MAX_FEED_BYTES, url
            )));
        }

        Ok(body.bytes)
    }
}

#[async_trait::async_trait]
impl FeedSource for FeedFetcher {
    async fn fetch(&self, url: &str) -> Result<ParsedFeed> {
        let content = self.fetch_bytes(url).await?;
        parse_feed(&content)
    }

    async fn fetch_feed_list(&self, url: &str) -> Result<FeedList> {
        let content = self.fetch_bytes(url).await?;
        FeedList::from_json(&content)
    }
}

fn ensure_content_size(size: usize, url: &str) -> Result<()> {
    if size > MAX_FEED_BYTES {
        return Err(Error::FeedParse(format!(
            "Feed too large ({} bytes) for URL: {}",
            size, url
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const RSS: &str = r#"<rss version="2.0"><channel><title>Mock</title>
<lastBuildDate>Tue, 05 Mar 2024 09:30:00 GMT</lastBuildDate>
<item><title>One</title><link>https://mock.example/1</link></item>
</channel></rss>"#;

    fn fetcher() -> FeedFetcher {
        FeedFetcher::new(&AppConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_fetch_parses_feed() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed.xml"))
            .respond_with(ResponseTemplate::new(200).set_body_string(RSS))
            .expect(1)
            .mount(&server)
            .await;

        let feed = fetcher()
            .fetch(&format!("{}/feed.xml", server.uri()))
            .await
            .unwrap();

        assert_eq!(feed.title.as_deref(), Some("Mock"));
        assert_eq!(feed.entries.len(), 1);
    }

    #[tokio::test]
    async fn test_http_error_is_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone.xml"))
            .respond_with(ResponseTemplate::new(503))
            .expect(1)
            .mount(&server)
            .await;

        let result = fetcher().fetch(&format!("{}/gone.xml", server.uri())).await;
        assert!(matches!(result, Err(Error::FeedParse(_))));
    }

    #[tokio::test]
    async fn test_fetch_feed_list() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feeds.json"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string(r#"{"check_feeds":[{"url":"https://a.example/rss"}]}"#),
            )
            .mount(&server)
            .await;

        let list = fetcher()
            .fetch_feed_list(&format!("{}/feeds.json", server.uri()))
            .await
            .unwrap();

        assert_eq!(list.check_feeds[0].url, "https://a.example/rss");
    }

    #[tokio::test]
    async fn test_read_capped_stops_at_limit() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/big"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![b'x'; 64 * 1024]))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/small"))
            .respond_with(ResponseTemplate::new(200).set_body_string("tiny"))
            .mount(&server)
            .await;

        let client = build_http_client(5).unwrap();

        let response = client.get(format!("{}/big", server.uri())).send().await.unwrap();
        let body = read_capped(response, 1000).await.unwrap();
        assert!(body.truncated);
        assert_eq!(body.bytes.len(), 1000);

        let response = client.get(format!("{}/small", server.uri())).send().await.unwrap();
        let body = read_capped(response, 1000).await.unwrap();
        assert!(!body.truncated);
        assert_eq!(&body.bytes[..], b"tiny");
    }

    #[tokio::test]
    async fn test_invalid_url_is_rejected() {
        let result = fetcher().fetch("not a url").await;
        assert!(matches!(result, Err(Error::UrlParse(_))));
    }
}
