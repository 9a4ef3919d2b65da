use regex::Regex;
use reqwest::Client;
use std::sync::LazyLock;
use url::Url;

use super::fetcher::{build_http_client, read_capped};
use crate::config::AppConfig;
use crate::publish::PreviewImage;
use crate::Result;

/// Largest blob the posting service accepts for a link card thumbnail
const MAX_IMAGE_BYTES: usize = 1_000_000;
const MAX_PAGE_BYTES: usize = 2 * 1024 * 1024;

static META_PROPERTY_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<meta[^>]+(?:property|name)\s*=\s*["'](?:og:image|twitter:image)["'][^>]*?content\s*=\s*["']([^"']+)["']"#,
    )
    .expect("valid og:image regex")
});

static META_CONTENT_FIRST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?is)<meta[^>]+content\s*=\s*["']([^"']+)["'][^>]*?(?:property|name)\s*=\s*["'](?:og:image|twitter:image)["']"#,
    )
    .expect("valid og:image regex")
});

/// Best-effort lookup of a preview image for an entry page.
/// Every failure yields `None`; a missing preview never blocks a post.
#[async_trait::async_trait]
pub trait PreviewFetcher: Send + Sync {
    async fn fetch_preview(&self, page_url: &str) -> Option<PreviewImage>;
}

/// Reads the page's `og:image` (or `twitter:image`) and downloads it
pub struct PageImageFetcher {
    client: Client,
}

impl PageImageFetcher {
    pub fn new(config: &AppConfig) -> Result<Self> {
        Ok(Self {
            client: build_http_client(config.scan.request_timeout_secs)?,
        })
    }

    async fn try_fetch(&self, page_url: &str) -> std::result::Result<Option<PreviewImage>, String> {
        let base = Url::parse(page_url).map_err(|e| e.to_string())?;

        let response = self
            .client
            .get(base.as_str())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?;

        // The meta tags live in <head>; a prefix is enough
        let page = read_capped(response, MAX_PAGE_BYTES)
            .await
            .map_err(|e| e.to_string())?;

        let Some(image_ref) = find_image_url(&String::from_utf8_lossy(&page.bytes)) else {
            return Ok(None);
        };
        let image_url = base.join(&image_ref).map_err(|e| e.to_string())?;

        let response = self
            .client
            .get(image_url.as_str())
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| e.to_string())?;

        let mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string())
            .unwrap_or_default();

        if !mime.starts_with("image/") {
            return Err(format!("{} is not an image ({})", image_url, mime));
        }

        if response
            .content_length()
            .is_some_and(|len| len > MAX_IMAGE_BYTES as u64)
        {
            return Err(format!("{} is larger than {} bytes", image_url, MAX_IMAGE_BYTES));
        }

        let image = read_capped(response, MAX_IMAGE_BYTES)
            .await
            .map_err(|e| e.to_string())?;
        if image.truncated {
            return Err(format!("{} is larger than {} bytes", image_url, MAX_IMAGE_BYTES));
        }

        Ok(Some(PreviewImage {
            bytes: image.bytes,
            mime,
        }))
    }
}

#[async_trait::async_trait]
impl PreviewFetcher for PageImageFetcher {
    async fn fetch_preview(&self, page_url: &str) -> Option<PreviewImage> {
        match self.try_fetch(page_url).await {
            Ok(image) => image,
            Err(e) => {
                tracing::debug!("No preview image for {}: {}", page_url, e);
                None
            }
        }
    }
}

/// Find the `og:image` / `twitter:image` reference in an HTML document
fn find_image_url(html: &str) -> Option<String> {
    META_PROPERTY_FIRST
        .captures(html)
        .or_else(|| META_CONTENT_FIRST.captures(html))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().replace("&amp;", "&"))
        .filter(|u| !u.is_empty())
}
