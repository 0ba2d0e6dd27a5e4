//! Event system for real-time UI communication.
//!
//! Core services emit discrete domain events (login/logout, device
//! appearing and disappearing, a track starting) through the
//! [`EventEmitter`] trait. The continuous playback state has its own watch
//! channel on the coordinator; this module only carries the discrete edges.

use serde::Serialize;
use tokio::sync::broadcast;

use crate::track::Track;

/// Events broadcast to UI collaborators.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "category", rename_all = "camelCase")]
pub enum BroadcastEvent {
    /// Auth session lifecycle events.
    Session(SessionEvent),

    /// Playback device and track events.
    Player(PlayerEvent),
}

/// Auth session lifecycle events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SessionEvent {
    /// A login completed and a credential is available.
    LoggedIn {
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The session ended (explicit logout or irrecoverable refresh failure).
    LoggedOut {
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The access token was renewed by the scheduler.
    TokenRefreshed {
        /// New expiry, Unix milliseconds.
        #[serde(rename = "expiresAt")]
        expires_at: u64,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// A refresh attempt failed; a `LoggedOut` event follows.
    RefreshFailed {
        /// Short failure description for diagnostics.
        reason: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

/// Playback device and track events.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum PlayerEvent {
    /// A playback device connected and is ready to receive commands.
    DeviceReady {
        /// Vendor device id.
        #[serde(rename = "deviceId")]
        device_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The active playback device disconnected.
    DeviceLost {
        /// Vendor device id.
        #[serde(rename = "deviceId")]
        device_id: String,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
    /// The current track changed (confirmed by an authoritative event).
    TrackStarted {
        /// The track now playing.
        track: Track,
        /// Unix timestamp in milliseconds.
        timestamp: u64,
    },
}

impl From<SessionEvent> for BroadcastEvent {
    fn from(event: SessionEvent) -> Self {
        BroadcastEvent::Session(event)
    }
}

impl From<PlayerEvent> for BroadcastEvent {
    fn from(event: PlayerEvent) -> Self {
        BroadcastEvent::Player(event)
    }
}

/// Trait for emitting domain events without knowledge of transport.
///
/// Services depend on this trait rather than on a concrete channel, so a
/// desktop shell can forward events to its own frontend while tests count
/// them.
pub trait EventEmitter: Send + Sync {
    /// Emits an auth session event.
    fn emit_session(&self, event: SessionEvent);

    /// Emits a player event.
    fn emit_player(&self, event: PlayerEvent);
}

/// No-op emitter for embedding without an event surface, and for tests.
pub struct NoopEventEmitter;

impl EventEmitter for NoopEventEmitter {
    fn emit_session(&self, _event: SessionEvent) {
        // No-op
    }

    fn emit_player(&self, _event: PlayerEvent) {
        // No-op
    }
}

/// Logging emitter for debugging and development.
pub struct LoggingEventEmitter;

impl EventEmitter for LoggingEventEmitter {
    fn emit_session(&self, event: SessionEvent) {
        tracing::debug!(?event, "session_event");
    }

    fn emit_player(&self, event: PlayerEvent) {
        tracing::debug!(?event, "player_event");
    }
}

/// Bridge from the emitter trait onto a tokio broadcast channel.
///
/// Lagging or absent subscribers are fine; `send` errors (no receivers)
/// are ignored by design since emission must never fail a command path.
pub struct BroadcastEventBridge {
    tx: broadcast::Sender<BroadcastEvent>,
}

impl BroadcastEventBridge {
    /// Wraps an existing sender (shared with other publishers).
    #[must_use]
    pub fn with_sender(tx: broadcast::Sender<BroadcastEvent>) -> Self {
        Self { tx }
    }

    /// Subscribes a new receiver to the event stream.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<BroadcastEvent> {
        self.tx.subscribe()
    }
}

impl EventEmitter for BroadcastEventBridge {
    fn emit_session(&self, event: SessionEvent) {
        let _ = self.tx.send(event.into());
    }

    fn emit_player(&self, event: PlayerEvent) {
        let _ = self.tx.send(event.into());
    }
}
