//! Agent configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Agent configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// OAuth client id of the registered application.
    /// Override: `SPOTLITE_CLIENT_ID`
    pub client_id: String,

    /// Redirect URI registered with the application.
    /// Override: `SPOTLITE_REDIRECT_URI`
    pub redirect_uri: String,

    /// Operator-controlled token refresh intermediary.
    /// Override: `SPOTLITE_REFRESH_URL`
    pub refresh_url: String,

    /// OAuth scopes to request. Defaults to the core scope set.
    pub scopes: Option<Vec<String>>,

    /// Directory for persistent session state.
    /// Override: `SPOTLITE_DATA_DIR`
    pub data_dir: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            redirect_uri: "http://127.0.0.1:8888/callback".to_string(),
            refresh_url: String::new(),
            scopes: None,
            data_dir: None,
        }
    }
}

impl AgentConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SPOTLITE_CLIENT_ID") {
            if !val.is_empty() {
                self.client_id = val;
            }
        }

        if let Ok(val) = std::env::var("SPOTLITE_REDIRECT_URI") {
            if !val.is_empty() {
                self.redirect_uri = val;
            }
        }

        if let Ok(val) = std::env::var("SPOTLITE_REFRESH_URL") {
            if !val.is_empty() {
                self.refresh_url = val;
            }
        }

        // Note: SPOTLITE_DATA_DIR is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to spotlite-core's Config type.
    pub fn to_core_config(&self) -> spotlite_core::Config {
        let mut config = spotlite_core::Config {
            client_id: self.client_id.clone(),
            redirect_uri: self.redirect_uri.clone(),
            refresh_url: self.refresh_url.clone(),
            ..Default::default()
        };
        if let Some(scopes) = &self.scopes {
            config.scopes = scopes.clone();
        }
        config
    }
}
