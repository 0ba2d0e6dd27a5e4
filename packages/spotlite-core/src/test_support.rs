//! Shared test doubles: a manually advanced clock and mock API clients.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::auth::{TokenApi, TokenResponse};
use crate::clock::Clock;
use crate::error::{AuthError, AuthResult, PlayerError, PlayerResult};
use crate::player::{PlayerApi, RemoteHistoryItem};

/// Clock that only moves when a test tells it to.
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn arc(start_millis: u64) -> Arc<Self> {
        Arc::new(Self {
            now: AtomicU64::new(start_millis),
        })
    }

    pub fn advance(&self, delta_millis: u64) {
        self.now.fetch_add(delta_millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.now.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Scripted token endpoint.
pub struct MockTokenApi {
    exchanges: AtomicUsize,
    refreshes: AtomicUsize,
    fail_exchange: AtomicBool,
    fail_refresh: AtomicBool,
    expires_in: AtomicU64,
}

impl MockTokenApi {
    pub fn new() -> Self {
        Self {
            exchanges: AtomicUsize::new(0),
            refreshes: AtomicUsize::new(0),
            fail_exchange: AtomicBool::new(false),
            fail_refresh: AtomicBool::new(false),
            expires_in: AtomicU64::new(3600),
        }
    }

    pub fn exchange_count(&self) -> usize {
        self.exchanges.load(Ordering::SeqCst)
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    pub fn fail_exchange(&self, fail: bool) {
        self.fail_exchange.store(fail, Ordering::SeqCst);
    }

    pub fn fail_refresh(&self, fail: bool) {
        self.fail_refresh.store(fail, Ordering::SeqCst);
    }

    pub fn set_expires_in(&self, secs: u64) {
        self.expires_in.store(secs, Ordering::SeqCst);
    }
}

#[async_trait]
impl TokenApi for MockTokenApi {
    async fn exchange_code(&self, _code: &str, _verifier: &str) -> AuthResult<TokenResponse> {
        let n = self.exchanges.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_exchange.load(Ordering::SeqCst) {
            return Err(AuthError::TokenExchangeFailed {
                status: 400,
                body: "invalid_grant".into(),
            });
        }
        Ok(TokenResponse {
            access_token: format!("access-{n}"),
            refresh_token: Some(format!("refresh-{n}")),
            expires_in: self.expires_in.load(Ordering::SeqCst),
        })
    }

    async fn refresh(&self, _refresh_token: &str) -> AuthResult<TokenResponse> {
        let n = self.refreshes.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_refresh.load(Ordering::SeqCst) {
            return Err(AuthError::RefreshFailed("HTTP 401".into()));
        }
        Ok(TokenResponse {
            access_token: format!("refreshed-{n}"),
            refresh_token: None,
            expires_in: self.expires_in.load(Ordering::SeqCst),
        })
    }
}

/// Scripted playback control API.
///
/// Call logs are public so tests can assert on them directly. Play calls
/// consume an optional delay queue to simulate slow round trips.
pub struct MockPlayerApi {
    pub play_calls: Mutex<Vec<(String, Option<String>)>>,
    pub seek_calls: Mutex<Vec<u64>>,
    pub volume_calls: Mutex<Vec<(u8, String)>>,
    pub pause_count: AtomicUsize,
    pub resume_count: AtomicUsize,
    pub next_count: AtomicUsize,
    pub previous_count: AtomicUsize,
    fail_commands: AtomicBool,
    play_delays: Mutex<VecDeque<u64>>,
    pause_delays: Mutex<VecDeque<u64>>,
    history: Mutex<Vec<RemoteHistoryItem>>,
}

impl MockPlayerApi {
    pub fn new() -> Self {
        Self {
            play_calls: Mutex::new(Vec::new()),
            seek_calls: Mutex::new(Vec::new()),
            volume_calls: Mutex::new(Vec::new()),
            pause_count: AtomicUsize::new(0),
            resume_count: AtomicUsize::new(0),
            next_count: AtomicUsize::new(0),
            previous_count: AtomicUsize::new(0),
            fail_commands: AtomicBool::new(false),
            play_delays: Mutex::new(VecDeque::new()),
            pause_delays: Mutex::new(VecDeque::new()),
            history: Mutex::new(Vec::new()),
        }
    }

    /// Makes every subsequent command fail with `NoActiveDevice`.
    pub fn fail_commands(&self, fail: bool) {
        self.fail_commands.store(fail, Ordering::SeqCst);
    }

    /// Queues a delay for the next play call, in milliseconds.
    pub fn push_play_delay(&self, millis: u64) {
        self.play_delays.lock().push_back(millis);
    }

    /// Queues a delay for the next pause call, in milliseconds.
    pub fn push_pause_delay(&self, millis: u64) {
        self.pause_delays.lock().push_back(millis);
    }

    /// Scripts the remote recently-played response as
    /// (id, name, rfc3339 played_at) tuples.
    pub fn set_history(&self, items: Vec<(&str, &str, &str)>) {
        let parsed = items
            .into_iter()
            .map(|(id, name, played_at)| {
                serde_json::from_value(serde_json::json!({
                    "track": {
                        "id": id,
                        "name": name,
                        "artists": [{ "name": "Artist" }],
                        "duration_ms": 200_000,
                        "uri": format!("spotify:track:{id}")
                    },
                    "played_at": played_at
                }))
                .unwrap()
            })
            .collect();
        *self.history.lock() = parsed;
    }

    fn check(&self) -> PlayerResult<()> {
        if self.fail_commands.load(Ordering::SeqCst) {
            Err(PlayerError::NoActiveDevice)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PlayerApi for MockPlayerApi {
    async fn play(&self, uri: &str, device_id: Option<&str>) -> PlayerResult<()> {
        self.play_calls
            .lock()
            .push((uri.to_string(), device_id.map(str::to_string)));
        let delay = self.play_delays.lock().pop_front();
        if let Some(millis) = delay {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
        self.check()
    }

    async fn pause(&self) -> PlayerResult<()> {
        self.pause_count.fetch_add(1, Ordering::SeqCst);
        let delay = self.pause_delays.lock().pop_front();
        if let Some(millis) = delay {
            tokio::time::sleep(Duration::from_millis(millis)).await;
        }
        self.check()
    }

    async fn resume(&self) -> PlayerResult<()> {
        self.resume_count.fetch_add(1, Ordering::SeqCst);
        self.check()
    }

    async fn seek(&self, position_ms: u64) -> PlayerResult<()> {
        self.check()?;
        self.seek_calls.lock().push(position_ms);
        Ok(())
    }

    async fn next(&self) -> PlayerResult<()> {
        self.next_count.fetch_add(1, Ordering::SeqCst);
        self.check()
    }

    async fn previous(&self) -> PlayerResult<()> {
        self.previous_count.fetch_add(1, Ordering::SeqCst);
        self.check()
    }

    async fn set_volume(&self, percent: u8, device_id: &str) -> PlayerResult<()> {
        self.check()?;
        self.volume_calls
            .lock()
            .push((percent, device_id.to_string()));
        Ok(())
    }

    async fn recently_played(&self, _limit: usize) -> PlayerResult<Vec<RemoteHistoryItem>> {
        self.check()?;
        Ok(self.history.lock().clone())
    }
}
