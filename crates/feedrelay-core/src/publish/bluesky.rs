use chrono::{SecondsFormat, Utc};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{EntryPost, PreviewImage, PublicationSink};
use crate::config::AppConfig;
use crate::feed::build_http_client;
use crate::{Error, Result};

pub const ENV_IDENTIFIER: &str = "BSKY_USER_NAME";
pub const ENV_PASSWORD: &str = "BSKY_APP_PASS";

const POST_COLLECTION: &str = "app.bsky.feed.post";
const MAX_TEXT_CHARS: usize = 300;

#[derive(Serialize)]
struct CreateSessionRequest<'a> {
    identifier: &'a str,
    password: &'a str,
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Session {
    access_jwt: String,
    refresh_jwt: String,
    did: String,
}

impl Session {
    /// A missing or unreadable file means there is no stored session
    fn load(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(session) => Some(session),
            Err(e) => {
                tracing::debug!("Ignoring stored session {}: {}", path.display(), e);
                None
            }
        }
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, serde_json::to_vec(self)?)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }
}

#[derive(Deserialize)]
struct UploadBlobResponse {
    blob: serde_json::Value,
}

#[derive(Serialize)]
struct CreateRecordRequest<'a> {
    repo: &'a str,
    collection: &'static str,
    record: PostRecord<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PostRecord<'a> {
    #[serde(rename = "$type")]
    kind: &'static str,
    text: String,
    created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    embed: Option<ExternalEmbed<'a>>,
}

#[derive(Serialize)]
struct ExternalEmbed<'a> {
    #[serde(rename = "$type")]
    kind: &'static str,
    external: External<'a>,
}

#[derive(Serialize)]
struct External<'a> {
    uri: &'a str,
    title: &'a str,
    description: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    thumb: Option<serde_json::Value>,
}

/// Publishes to Bluesky through the AT Protocol XRPC API.
///
/// Session tokens are kept in `bsky_session.json` under the data dir. Login reuses
/// the stored session while it is valid, refreshes it once the access token has
/// expired, and only creates a new session when neither works.
pub struct BlueskySink {
    client: Client,
    service_url: String,
    session: Session,
}

impl BlueskySink {
    /// Log in with the credentials from `BSKY_USER_NAME` / `BSKY_APP_PASS`
    pub async fn login_from_env(config: &AppConfig) -> Result<Self> {
        let identifier = std::env::var(ENV_IDENTIFIER)
            .map_err(|_| Error::Config(format!("{} is not set", ENV_IDENTIFIER)))?;
        let password = std::env::var(ENV_PASSWORD)
            .map_err(|_| Error::Config(format!("{} is not set", ENV_PASSWORD)))?;

        Self::login(config, &identifier, &password).await
    }

    pub async fn login(config: &AppConfig, identifier: &str, password: &str) -> Result<Self> {
        let client = build_http_client(config.scan.request_timeout_secs)?;
        let service_url = config.publisher.service_url.trim_end_matches('/').to_string();
        let session_path = config.session_path();

        let resumed = match Session::load(&session_path) {
            Some(stored) => resume_session(&client, &service_url, stored).await,
            None => None,
        };

        let session = match resumed {
            Some(session) => session,
            None => create_session(&client, &service_url, identifier, password).await?,
        };

        if let Err(e) = session.save(&session_path) {
            tracing::warn!("Failed to store session in {}: {}", session_path.display(), e);
        }

        Ok(Self {
            client,
            service_url,
            session,
        })
    }

    fn xrpc(&self, method: &str) -> String {
        xrpc_url(&self.service_url, method)
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.session.access_jwt)
    }

    async fn upload_blob(&self, image: &PreviewImage) -> Result<serde_json::Value> {
        let response = self
            .client
            .post(self.xrpc("com.atproto.repo.uploadBlob"))
            .header(AUTHORIZATION, self.bearer())
            .header(CONTENT_TYPE, &image.mime)
            .body(image.bytes.clone())
            .send()
            .await?
            .error_for_status()?;

        let uploaded: UploadBlobResponse = response.json().await?;
        Ok(uploaded.blob)
    }

    async fn create_record(&self, record: PostRecord<'_>) -> Result<()> {
        let request = CreateRecordRequest {
            repo: &self.session.did,
            collection: POST_COLLECTION,
            record,
        };

        let response = self
            .client
            .post(self.xrpc("com.atproto.repo.createRecord"))
            .header(AUTHORIZATION, self.bearer())
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Publish(format!("createRecord request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Publish(format!("createRecord returned {}: {}", status, body)));
        }

        Ok(())
    }
}

fn xrpc_url(service_url: &str, method: &str) -> String {
    format!("{}/xrpc/{}", service_url, method)
}

/// Validate a stored session, refreshing it if the access token was rejected
async fn resume_session(client: &Client, service_url: &str, stored: Session) -> Option<Session> {
    let check = client
        .get(xrpc_url(service_url, "com.atproto.server.getSession"))
        .header(AUTHORIZATION, format!("Bearer {}", stored.access_jwt))
        .send()
        .await;

    match check {
        Ok(response) if response.status().is_success() => {
            tracing::info!(did = %stored.did, "Reusing stored Bluesky session");
            return Some(stored);
        }
        Ok(response) => tracing::debug!("getSession returned {}", response.status()),
        Err(e) => tracing::debug!("getSession failed: {}", e),
    }

    match refresh_session(client, service_url, &stored).await {
        Ok(session) => {
            tracing::info!(did = %session.did, "Bluesky session refreshed");
            Some(session)
        }
        Err(e) => {
            tracing::info!("Stored session could not be refreshed: {}", e);
            None
        }
    }
}

async fn refresh_session(client: &Client, service_url: &str, stored: &Session) -> Result<Session> {
    let response = client
        .post(xrpc_url(service_url, "com.atproto.server.refreshSession"))
        .header(AUTHORIZATION, format!("Bearer {}", stored.refresh_jwt))
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Publish(format!("refreshSession returned {}: {}", status, body)));
    }

    Ok(response.json().await?)
}

async fn create_session(
    client: &Client,
    service_url: &str,
    identifier: &str,
    password: &str,
) -> Result<Session> {
    let response = client
        .post(xrpc_url(service_url, "com.atproto.server.createSession"))
        .json(&CreateSessionRequest { identifier, password })
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Publish(format!("createSession returned {}: {}", status, body)));
    }

    let session: Session = response.json().await?;
    tracing::info!(did = %session.did, "Bluesky session created");
    Ok(session)
}

fn truncate_chars(input: &str, max_chars: usize) -> String {
    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => input[..idx].to_string(),
        None => input.to_string(),
    }
}

fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[async_trait::async_trait]
impl PublicationSink for BlueskySink {
    async fn post(&self, post: &EntryPost) -> Result<()> {
        // A failed upload only costs the thumbnail
        let thumb = match &post.image {
            Some(image) => match self.upload_blob(image).await {
                Ok(blob) => Some(blob),
                Err(e) => {
                    tracing::debug!("Thumbnail upload failed for {}: {}", post.link, e);
                    None
                }
            },
            None => None,
        };

        self.create_record(PostRecord {
            kind: POST_COLLECTION,
            text: truncate_chars(&post.text, MAX_TEXT_CHARS),
            created_at: now_timestamp(),
            embed: Some(ExternalEmbed {
                kind: "app.bsky.embed.external",
                external: External {
                    uri: &post.link,
                    title: &post.title,
                    description: "",
                    thumb,
                },
            }),
        })
        .await
    }

    async fn post_plain_text(&self, text: &str) -> Result<()> {
        self.create_record(PostRecord {
            kind: POST_COLLECTION,
            text: truncate_chars(text, MAX_TEXT_CHARS),
            created_at: now_timestamp(),
            embed: None,
        })
        .await
    }
}
