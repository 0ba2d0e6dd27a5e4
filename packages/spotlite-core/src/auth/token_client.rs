//! Token endpoint clients.
//!
//! Two distinct endpoints exist: the vendor token endpoint for the
//! code-for-token exchange (public client, verifier instead of secret) and
//! the operator-controlled refresh intermediary (refreshing needs a
//! confidential client secret that must never reach this client, so an
//! operator service holds it and proxies the refresh).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::config::Config;
use crate::error::{AuthError, AuthResult};

/// Timeout for token endpoint calls.
const TOKEN_TIMEOUT_SECS: u64 = 10;

/// Assumed token lifetime when the refresh intermediary omits `expires_in`.
const DEFAULT_EXPIRES_IN_SECS: u64 = 3600;

fn default_expires_in() -> u64 {
    DEFAULT_EXPIRES_IN_SECS
}

/// Response of both token endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    /// The bearer credential.
    pub access_token: String,
    /// Rotated refresh token, when the endpoint issues one.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Lifetime of the access token in seconds.
    #[serde(default = "default_expires_in")]
    pub expires_in: u64,
}

/// Trait for the token endpoints, injectable for tests.
#[async_trait]
pub trait TokenApi: Send + Sync {
    /// Exchanges an authorization code + verifier for a credential.
    async fn exchange_code(&self, code: &str, verifier: &str) -> AuthResult<TokenResponse>;

    /// Exchanges a refresh token for a renewed credential via the
    /// operator intermediary.
    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenResponse>;
}

/// HTTP implementation of [`TokenApi`].
pub struct HttpTokenClient {
    client: Client,
    config: Config,
}

impl HttpTokenClient {
    /// Creates a client using the shared HTTP connection pool.
    #[must_use]
    pub fn new(client: Client, config: Config) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl TokenApi for HttpTokenClient {
    async fn exchange_code(&self, code: &str, verifier: &str) -> AuthResult<TokenResponse> {
        let params = [
            ("client_id", self.config.client_id.as_str()),
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("code_verifier", verifier),
        ];

        log::info!("[TokenClient] Exchanging authorization code");

        let response = self
            .client
            .post(&self.config.token_url)
            .form(&params)
            .timeout(Duration::from_secs(TOKEN_TIMEOUT_SECS))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("[TokenClient] Exchange failed: HTTP {}", status);
            return Err(AuthError::TokenExchangeFailed {
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json().await?)
    }

    async fn refresh(&self, refresh_token: &str) -> AuthResult<TokenResponse> {
        log::info!("[TokenClient] Refreshing access token via intermediary");

        let response = self
            .client
            .post(&self.config.refresh_url)
            .json(&serde_json::json!({ "refresh_token": refresh_token }))
            .timeout(Duration::from_secs(TOKEN_TIMEOUT_SECS))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!("[TokenClient] Refresh failed: HTTP {}", status);
            return Err(AuthError::RefreshFailed(format!("HTTP {status}: {body}")));
        }

        Ok(response.json().await?)
    }
}
