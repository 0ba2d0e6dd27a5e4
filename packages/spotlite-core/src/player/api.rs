//! HTTP client for the vendor's playback control API.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::DateTime;
use serde::Deserialize;
use serde_json::json;

use crate::auth::TokenSource;
use crate::config::Config;
use crate::error::{PlayerError, PlayerResult};
use crate::track::{RecentlyPlayedEntry, Track};

/// One item from the remote recently-played endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteHistoryItem {
    pub track: ApiTrack,
    /// RFC 3339 timestamp of the play.
    pub played_at: String,
}

/// Track shape as the Web API reports it.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiTrack {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<ApiArtist>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiArtist {
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct RecentlyPlayedResponse {
    items: Vec<RemoteHistoryItem>,
}

impl RemoteHistoryItem {
    /// Converts the wire item into a history entry. An unparseable
    /// timestamp maps to 0 so the entry sorts last rather than being lost.
    #[must_use]
    pub fn into_entry(self) -> RecentlyPlayedEntry {
        let played_at = DateTime::parse_from_rfc3339(&self.played_at)
            .map(|dt| dt.timestamp_millis().max(0) as u64)
            .unwrap_or(0);
        RecentlyPlayedEntry {
            track: Track {
                id: self.track.id.unwrap_or_default(),
                name: self.track.name,
                artists: self.track.artists.into_iter().map(|a| a.name).collect(),
                duration_ms: self.track.duration_ms,
                uri: self.track.uri,
            },
            played_at,
        }
    }
}

/// Remote playback control surface.
///
/// Every call requires a live bearer credential; commands are never
/// retried and failures map to the playback error taxonomy.
#[async_trait]
pub trait PlayerApi: Send + Sync {
    /// Starts playback of a track, optionally addressed to a device.
    async fn play(&self, uri: &str, device_id: Option<&str>) -> PlayerResult<()>;

    /// Suspends playback.
    async fn pause(&self) -> PlayerResult<()>;

    /// Resumes playback of whatever is current.
    async fn resume(&self) -> PlayerResult<()>;

    /// Moves the playhead to the given position.
    async fn seek(&self, position_ms: u64) -> PlayerResult<()>;

    /// Skips to the next track.
    async fn next(&self) -> PlayerResult<()>;

    /// Skips to the previous track.
    async fn previous(&self) -> PlayerResult<()>;

    /// Sets the device volume as a percentage.
    async fn set_volume(&self, percent: u8, device_id: &str) -> PlayerResult<()>;

    /// Fetches the remote recently-played history, newest first.
    async fn recently_played(&self, limit: usize) -> PlayerResult<Vec<RemoteHistoryItem>>;
}

/// [`PlayerApi`] backed by the vendor's Web API over reqwest.
pub struct HttpPlayerApi {
    client: reqwest::Client,
    config: Config,
    tokens: Arc<dyn TokenSource>,
}

impl HttpPlayerApi {
    pub fn new(client: reqwest::Client, config: Config, tokens: Arc<dyn TokenSource>) -> Self {
        Self {
            client,
            config,
            tokens,
        }
    }

    fn bearer(&self) -> PlayerResult<String> {
        self.tokens.bearer_token().ok_or(PlayerError::NotAuthenticated)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base_url, path)
    }

    /// Maps a control-endpoint response to the error taxonomy. 404 means no
    /// device is open, 403 means the account tier cannot be controlled.
    async fn check(response: reqwest::Response) -> PlayerResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        match status.as_u16() {
            404 => Err(PlayerError::NoActiveDevice),
            403 => Err(PlayerError::PremiumRequired),
            code => {
                let body = response.text().await.unwrap_or_default();
                Err(PlayerError::CommandFailed { status: code, body })
            }
        }
    }

    async fn put(&self, url: String, body: Option<serde_json::Value>) -> PlayerResult<()> {
        let token = self.bearer()?;
        let mut request = self.client.put(&url).bearer_auth(token);
        if let Some(body) = body {
            request = request.json(&body);
        } else {
            // The control endpoints reject a missing Content-Length.
            request = request.header(reqwest::header::CONTENT_LENGTH, 0);
        }
        Self::check(request.send().await?).await?;
        Ok(())
    }

    async fn post(&self, url: String) -> PlayerResult<()> {
        let token = self.bearer()?;
        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .header(reqwest::header::CONTENT_LENGTH, 0)
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl PlayerApi for HttpPlayerApi {
    async fn play(&self, uri: &str, device_id: Option<&str>) -> PlayerResult<()> {
        let mut url = self.url("/me/player/play");
        if let Some(device_id) = device_id {
            url = format!("{}?device_id={}", url, urlencoding::encode(device_id));
        }
        self.put(url, Some(json!({ "uris": [uri] }))).await
    }

    async fn pause(&self) -> PlayerResult<()> {
        self.put(self.url("/me/player/pause"), None).await
    }

    async fn resume(&self) -> PlayerResult<()> {
        self.put(self.url("/me/player/play"), None).await
    }

    async fn seek(&self, position_ms: u64) -> PlayerResult<()> {
        let url = format!("{}?position_ms={}", self.url("/me/player/seek"), position_ms);
        self.put(url, None).await
    }

    async fn next(&self) -> PlayerResult<()> {
        self.post(self.url("/me/player/next")).await
    }

    async fn previous(&self) -> PlayerResult<()> {
        self.post(self.url("/me/player/previous")).await
    }

    async fn set_volume(&self, percent: u8, device_id: &str) -> PlayerResult<()> {
        let url = format!(
            "{}?volume_percent={}&device_id={}",
            self.url("/me/player/volume"),
            percent.min(100),
            urlencoding::encode(device_id),
        );
        self.put(url, None).await
    }

    async fn recently_played(&self, limit: usize) -> PlayerResult<Vec<RemoteHistoryItem>> {
        let token = self.bearer()?;
        let url = format!("{}?limit={}", self.url("/me/player/recently-played"), limit);
        let response = self.client.get(&url).bearer_auth(token).send().await?;
        let response = Self::check(response).await?;
        let parsed: RecentlyPlayedResponse = response.json().await?;
        Ok(parsed.items)
    }
}
