//! Core configuration.
//!
//! All endpoint URLs default to the public Spotify service; the refresh URL
//! has no default because refreshing requires a confidential client secret
//! and must go through an operator-controlled intermediary, never the
//! browser-embeddable client itself.

use serde::{Deserialize, Serialize};

/// Configuration for the Spotlite core services.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    // Auth
    /// OAuth client id of the registered application.
    pub client_id: String,

    /// Redirect URI the authorization server sends the user agent back to.
    /// Must match the application registration exactly.
    pub redirect_uri: String,

    /// OAuth scopes requested at login (space-joined in the authorize URL).
    pub scopes: Vec<String>,

    /// Authorization endpoint (redirect-based).
    pub authorize_url: String,

    /// Token endpoint for the code-for-token exchange.
    pub token_url: String,

    /// Operator-controlled refresh intermediary. POST {refresh_token} ->
    /// JSON {access_token, expires_in?}.
    pub refresh_url: String,

    // Player
    /// Base URL of the playback control Web API.
    pub api_base_url: String,

    /// Maximum number of recently-played entries kept.
    pub history_cap: usize,

    /// Refresh the access token this many seconds before it expires.
    pub refresh_margin_secs: u64,

    /// Interval of the position-interpolation ticker (seconds).
    pub position_tick_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            redirect_uri: String::new(),
            scopes: vec![
                "streaming".into(),
                "user-read-email".into(),
                "user-read-private".into(),
                "user-read-playback-state".into(),
                "user-modify-playback-state".into(),
                "user-read-recently-played".into(),
            ],
            authorize_url: "https://accounts.spotify.com/authorize".into(),
            token_url: "https://accounts.spotify.com/api/token".into(),
            refresh_url: String::new(),
            api_base_url: "https://api.spotify.com/v1".into(),
            history_cap: 12,
            refresh_margin_secs: 60,
            position_tick_secs: 1,
        }
    }
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.client_id.is_empty() {
            return Err("client_id must be set".to_string());
        }
        if self.redirect_uri.is_empty() {
            return Err("redirect_uri must be set".to_string());
        }
        if self.refresh_url.is_empty() {
            return Err(
                "refresh_url must be set (token refresh requires the operator intermediary)"
                    .to_string(),
            );
        }
        if self.history_cap == 0 {
            return Err("history_cap must be >= 1".to_string());
        }
        if self.position_tick_secs == 0 {
            return Err("position_tick_secs must be >= 1".to_string());
        }
        Ok(())
    }
}
