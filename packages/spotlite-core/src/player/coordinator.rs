//! Playback session coordinator.
//!
//! Reconciles three inputs into one consistent [`PlaybackState`]:
//! user-issued commands (optimistic, rolled back on failure), authoritative
//! device events (always win), and a position-interpolation ticker for
//! smooth display between events. Also owns the recently-played history
//! and its persistence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use crate::clock::Clock;
use crate::config::Config;
use crate::error::PlayerResult;
use crate::events::{EventEmitter, PlayerEvent};
use crate::player::api::PlayerApi;
use crate::player::events::{RemoteEvent, RemotePlaybackState};
use crate::player::history::{PlaySource, RecentlyPlayed};
use crate::runtime::{TaskSpawner, TokioSpawner};
use crate::storage::SessionStore;
use crate::track::{same_track, RecentlyPlayedEntry, Track};

const KEY_RECENTLY_PLAYED: &str = "player.recently_played";

/// The simplified playback state UI collaborators subscribe to.
///
/// Invariants: `position_ms <= duration_ms`, and `is_playing` implies a
/// current track.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackState {
    pub current_track: Option<Track>,
    pub is_playing: bool,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub active_device_id: Option<String>,
}

/// State and history behind one lock; every mutation is a read-modify-write
/// and must not interleave.
struct Inner {
    state: PlaybackState,
    /// Last state confirmed by a successful command or a remote event.
    /// Failed commands roll back to this.
    confirmed: PlaybackState,
    history: RecentlyPlayed,
}

pub struct PlayerCoordinator {
    api: Arc<dyn PlayerApi>,
    config: Config,
    clock: Arc<dyn Clock>,
    store: Arc<dyn SessionStore>,
    emitter: Arc<dyn EventEmitter>,
    spawner: TokioSpawner,
    cancel_token: CancellationToken,
    inner: Mutex<Inner>,
    watch_tx: watch::Sender<PlaybackState>,
    // Keeps the channel alive with zero external subscribers.
    watch_rx: watch::Receiver<PlaybackState>,
    /// Sequence of the most recently issued command. A command only
    /// confirms or rolls back state if it is still the latest, so racing
    /// commands settle on the last one issued.
    issue_seq: AtomicU64,
}

impl PlayerCoordinator {
    /// Creates a coordinator, restoring the persisted history.
    pub fn new(
        api: Arc<dyn PlayerApi>,
        config: Config,
        clock: Arc<dyn Clock>,
        store: Arc<dyn SessionStore>,
        emitter: Arc<dyn EventEmitter>,
        spawner: TokioSpawner,
    ) -> Self {
        let history = match store.get(KEY_RECENTLY_PLAYED) {
            Some(raw) => match serde_json::from_str::<Vec<RecentlyPlayedEntry>>(&raw) {
                Ok(entries) => RecentlyPlayed::with_entries(entries, config.history_cap),
                Err(e) => {
                    log::warn!("[PlayerCoordinator] Discarding corrupt history: {}", e);
                    RecentlyPlayed::new(config.history_cap)
                }
            },
            None => RecentlyPlayed::new(config.history_cap),
        };

        let initial = PlaybackState::default();
        let (watch_tx, watch_rx) = watch::channel(initial.clone());

        Self {
            api,
            config,
            clock,
            store,
            emitter,
            spawner,
            cancel_token: CancellationToken::new(),
            inner: Mutex::new(Inner {
                state: initial.clone(),
                confirmed: initial,
                history,
            }),
            watch_tx,
            watch_rx,
            issue_seq: AtomicU64::new(0),
        }
    }

    /// Subscribes to the playback-state stream. The receiver immediately
    /// holds the current state.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.watch_rx.clone()
    }

    /// The playback state as an async stream. Yields the current state
    /// first, then every subsequent change.
    #[must_use]
    pub fn state_stream(&self) -> WatchStream<PlaybackState> {
        WatchStream::new(self.watch_rx.clone())
    }

    /// Current state snapshot.
    #[must_use]
    pub fn state(&self) -> PlaybackState {
        self.inner.lock().state.clone()
    }

    /// Current recently-played entries, most recent first.
    #[must_use]
    pub fn recently_played(&self) -> Vec<RecentlyPlayedEntry> {
        self.inner.lock().history.entries().to_vec()
    }

    /// Starts the position-interpolation ticker.
    ///
    /// While playing, the position advances by wall-clock time between
    /// authoritative events, clamped to the track duration. The ticker
    /// holds only a weak reference so a dropped coordinator stops it.
    pub fn start(self: &Arc<Self>) {
        let token = self.cancel_token.child_token();
        let tick = Duration::from_secs(self.config.position_tick_secs);
        let weak = Arc::downgrade(self);
        self.spawner.spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(tick) => {
                        let Some(coordinator) = weak.upgrade() else { break };
                        coordinator.advance_position(tick.as_millis() as u64);
                    }
                }
            }
        });
    }

    fn advance_position(&self, delta_ms: u64) {
        let mut inner = self.inner.lock();
        if !inner.state.is_playing || inner.state.current_track.is_none() {
            return;
        }
        inner.state.position_ms =
            (inner.state.position_ms + delta_ms).min(inner.state.duration_ms);
        self.publish(&inner.state);
    }

    /// Tears the coordinator down, stopping the ticker.
    pub fn dispose(&self) {
        self.cancel_token.cancel();
    }

    /// Resets in-memory playback state and history, e.g. on logout. The
    /// persisted history key is left alone; `clear_all` on the auth side
    /// wipes storage.
    pub fn reset(&self) {
        let mut inner = self.inner.lock();
        inner.state = PlaybackState::default();
        inner.confirmed = PlaybackState::default();
        inner.history.clear();
        self.publish(&inner.state);
    }

    // ── Commands ─────────────────────────────────────────────────────────

    /// Starts playback of a track.
    ///
    /// Local state is updated optimistically before the round trip so the
    /// UI responds without latency; a failed command restores the last
    /// confirmed state and the error is surfaced, never swallowed.
    pub async fn play(&self, track: Track) -> PlayerResult<()> {
        let seq = self.issue();
        let device_id;
        {
            let mut inner = self.inner.lock();
            device_id = inner.state.active_device_id.clone();
            inner.state.current_track = Some(track.clone());
            inner.state.is_playing = true;
            inner.state.position_ms = 0;
            inner.state.duration_ms = track.duration_ms;
            self.publish(&inner.state);
        }

        match self.api.play(&track.uri, device_id.as_deref()).await {
            Ok(()) => {
                self.confirm(seq);
                self.record_play(track, PlaySource::Player);
                Ok(())
            }
            Err(e) => {
                log::warn!("[PlayerCoordinator] play failed: {}", e);
                self.rollback(seq);
                Err(e)
            }
        }
    }

    /// Suspends playback. Local state changes only on confirmed success,
    /// and only while no newer command owns the optimistic state.
    pub async fn pause(&self) -> PlayerResult<()> {
        let seq = self.issue();
        self.api.pause().await?;
        let mut inner = self.inner.lock();
        if self.is_latest(seq) {
            inner.state.is_playing = false;
            inner.confirmed = inner.state.clone();
            self.publish(&inner.state);
        }
        Ok(())
    }

    /// Resumes playback. Local state changes only on confirmed success,
    /// and only while no newer command owns the optimistic state.
    pub async fn resume(&self) -> PlayerResult<()> {
        let seq = self.issue();
        self.api.resume().await?;
        let mut inner = self.inner.lock();
        if self.is_latest(seq) {
            if inner.state.current_track.is_some() {
                inner.state.is_playing = true;
            }
            inner.confirmed = inner.state.clone();
            self.publish(&inner.state);
        }
        Ok(())
    }

    /// Moves the playhead, clamped to `[0, duration]`. The local position
    /// updates optimistically and rolls back if the command fails.
    pub async fn seek(&self, position_ms: i64) -> PlayerResult<()> {
        let seq = self.issue();
        let clamped;
        {
            let mut inner = self.inner.lock();
            clamped = (position_ms.max(0) as u64).min(inner.state.duration_ms);
            inner.state.position_ms = clamped;
            self.publish(&inner.state);
        }

        match self.api.seek(clamped).await {
            Ok(()) => {
                self.confirm(seq);
                Ok(())
            }
            Err(e) => {
                self.rollback(seq);
                Err(e)
            }
        }
    }

    /// Skips forward. Track and position are not predicted locally; the
    /// next authoritative event carries the new state.
    pub async fn next(&self) -> PlayerResult<()> {
        self.api.next().await
    }

    /// Skips backward. Remote-only, like [`Self::next`].
    pub async fn previous(&self) -> PlayerResult<()> {
        self.api.previous().await
    }

    /// Sets the device volume, `volume` in `[0, 1]`. A volume command has
    /// no meaning without a target device, so this is a no-op until one is
    /// known.
    pub async fn set_volume(&self, volume: f32) -> PlayerResult<()> {
        let Some(device_id) = self.inner.lock().state.active_device_id.clone() else {
            log::debug!("[PlayerCoordinator] Ignoring volume command, no device known");
            return Ok(());
        };
        let percent = (volume.clamp(0.0, 1.0) * 100.0).round() as u8;
        self.api.set_volume(percent, &device_id).await
    }

    fn issue(&self) -> u64 {
        self.issue_seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn is_latest(&self, seq: u64) -> bool {
        self.issue_seq.load(Ordering::SeqCst) == seq
    }

    fn confirm(&self, seq: u64) {
        let mut inner = self.inner.lock();
        self.confirm_locked(seq, &mut inner);
    }

    fn confirm_locked(&self, seq: u64, inner: &mut Inner) {
        if self.is_latest(seq) {
            inner.confirmed = inner.state.clone();
        }
    }

    fn rollback(&self, seq: u64) {
        // A newer command owns the optimistic state now; leave it alone.
        if !self.is_latest(seq) {
            return;
        }
        let mut inner = self.inner.lock();
        inner.state = inner.confirmed.clone();
        self.publish(&inner.state);
    }

    // ── Event ingestion ──────────────────────────────────────────────────

    /// Applies an authoritative event from the device connection.
    ///
    /// A state change overwrites local state unconditionally; remote
    /// events always win over optimistic guesses.
    pub fn handle_remote_event(&self, event: RemoteEvent) {
        match event {
            RemoteEvent::Ready { device_id } => {
                log::info!("[PlayerCoordinator] Device ready: {}", device_id);
                {
                    let mut inner = self.inner.lock();
                    inner.state.active_device_id = Some(device_id.clone());
                    inner.confirmed = inner.state.clone();
                    self.publish(&inner.state);
                }
                self.emitter.emit_player(PlayerEvent::DeviceReady {
                    device_id,
                    timestamp: self.clock.now_millis(),
                });
            }
            RemoteEvent::NotReady { device_id } => {
                let was_active = {
                    let mut inner = self.inner.lock();
                    if inner.state.active_device_id.as_deref() == Some(device_id.as_str()) {
                        inner.state = PlaybackState::default();
                        inner.confirmed = PlaybackState::default();
                        self.publish(&inner.state);
                        true
                    } else {
                        false
                    }
                };
                if was_active {
                    log::info!("[PlayerCoordinator] Device lost: {}", device_id);
                    self.emitter.emit_player(PlayerEvent::DeviceLost {
                        device_id,
                        timestamp: self.clock.now_millis(),
                    });
                }
            }
            RemoteEvent::StateChanged(remote) => self.apply_remote_state(remote),
        }
    }

    fn apply_remote_state(&self, remote: RemotePlaybackState) {
        let track = remote.track_window.current_track.map(|t| t.into_track());
        let started = {
            let mut inner = self.inner.lock();
            let started = match (&track, &inner.state.current_track) {
                (Some(new), Some(old)) => !same_track(new, old),
                (Some(_), None) => true,
                (None, _) => false,
            };

            inner.state.current_track = track.clone();
            inner.state.duration_ms = remote.duration;
            inner.state.position_ms = remote.position.min(remote.duration);
            inner.state.is_playing = !remote.paused && inner.state.current_track.is_some();
            inner.confirmed = inner.state.clone();
            self.publish(&inner.state);
            started
        };

        if started {
            if let Some(track) = track {
                self.record_play(track.clone(), PlaySource::TrackChanged);
                self.emitter.emit_player(PlayerEvent::TrackStarted {
                    track,
                    timestamp: self.clock.now_millis(),
                });
            }
        }
    }

    // ── Recently played ──────────────────────────────────────────────────

    /// Pushes a play that did not originate from the coordinator itself
    /// (e.g. a page collaborator starting a search result, or an explicit
    /// replay from the history UI).
    pub fn notify_track_played(&self, track: Track, source: PlaySource) {
        self.record_play(track, source);
    }

    fn record_play(&self, track: Track, source: PlaySource) {
        let now = self.clock.now_millis();
        let mut inner = self.inner.lock();
        if inner.history.record(track, now, source) {
            self.persist_history(&inner);
        }
    }

    /// Pulls the remote history endpoint and merges it into the local
    /// list. Remote data only fills gaps; local entries stay put.
    pub async fn sync_remote_history(&self) -> PlayerResult<()> {
        let items = self.api.recently_played(self.config.history_cap).await?;
        let entries: Vec<RecentlyPlayedEntry> =
            items.into_iter().map(|i| i.into_entry()).collect();
        let mut inner = self.inner.lock();
        inner.history.merge_remote(entries);
        self.persist_history(&inner);
        Ok(())
    }

    fn persist_history(&self, inner: &Inner) {
        match serde_json::to_string(inner.history.entries()) {
            Ok(raw) => self.store.set(KEY_RECENTLY_PLAYED, &raw),
            Err(e) => log::warn!("[PlayerCoordinator] Failed to serialize history: {}", e),
        }
    }

    fn publish(&self, state: &PlaybackState) {
        let _ = self.watch_tx.send(state.clone());
    }
}
