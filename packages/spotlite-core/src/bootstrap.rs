//! Service bootstrap and lifecycle.
//!
//! Wires the auth session and the playback coordinator over one shared
//! HTTP connection pool and one broadcast event channel, resumes any
//! persisted session, and owns the teardown path.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::auth::{AuthSession, HttpTokenClient, TokenSource};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::error::BootstrapError;
use crate::events::{BroadcastEvent, BroadcastEventBridge, EventEmitter};
use crate::player::{HttpPlayerApi, PlayerCoordinator};
use crate::runtime::TokioSpawner;
use crate::storage::SessionStore;

const HTTP_TIMEOUT_SECS: u64 = 30;
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Everything a shell needs to drive the core.
pub struct BootstrappedServices {
    pub config: Config,
    pub store: Arc<dyn SessionStore>,
    pub auth: Arc<AuthSession>,
    pub player: Arc<PlayerCoordinator>,
    pub events: Arc<BroadcastEventBridge>,
    pub http_client: reqwest::Client,
}

/// Builds the shared HTTP client used by both services.
pub fn create_http_client() -> Result<reqwest::Client, BootstrapError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .build()
        .map_err(|e| BootstrapError::Internal(format!("failed to build HTTP client: {e}")))
}

/// Validates the configuration and constructs the full service graph.
///
/// Resumes a persisted session (re-arming the refresh timer) and starts
/// the position ticker. Must run inside a Tokio runtime.
pub fn bootstrap(
    config: Config,
    store: Arc<dyn SessionStore>,
) -> Result<BootstrappedServices, BootstrapError> {
    config.validate().map_err(BootstrapError::Configuration)?;

    let http_client = create_http_client()?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let spawner = TokioSpawner::current();

    let (event_tx, _) = broadcast::channel::<BroadcastEvent>(EVENT_CHANNEL_CAPACITY);
    let events = Arc::new(BroadcastEventBridge::with_sender(event_tx));
    let emitter: Arc<dyn EventEmitter> = events.clone();

    let token_api = Arc::new(HttpTokenClient::new(http_client.clone(), config.clone()));
    let auth = Arc::new(AuthSession::new(
        config.clone(),
        store.clone(),
        token_api,
        clock.clone(),
        emitter.clone(),
        spawner.clone(),
    ));
    auth.resume();

    let tokens: Arc<dyn TokenSource> = auth.clone();
    let player_api = Arc::new(HttpPlayerApi::new(
        http_client.clone(),
        config.clone(),
        tokens,
    ));
    let player = Arc::new(PlayerCoordinator::new(
        player_api,
        config.clone(),
        clock,
        store.clone(),
        emitter,
        spawner,
    ));
    player.start();

    log::info!("[Bootstrap] Services initialized");

    Ok(BootstrappedServices {
        config,
        store,
        auth,
        player,
        events,
        http_client,
    })
}

impl BootstrappedServices {
    /// Tears down both services, cancelling every background task.
    pub fn shutdown(&self) {
        log::info!("[Bootstrap] Shutting down");
        self.player.dispose();
        self.auth.dispose();
    }
}
