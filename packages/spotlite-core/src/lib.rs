//! Spotlite Core - shared library for Spotlite clients.
//!
//! This crate provides the core of Spotlite, a lightweight Spotify client:
//! the OAuth PKCE auth session with timer-driven token renewal, and the
//! playback coordinator that reconciles commands, device events, and the
//! recently-played history. It is designed to be embedded by UI shells and
//! by the standalone headless agent.
//!
//! # Architecture
//!
//! - [`auth`]: PKCE login handshake, credential storage, refresh scheduler
//! - [`player`]: playback commands, event ingestion, recently-played history
//! - [`events`]: domain events for real-time client communication
//! - [`storage`]: durable key-value session storage
//! - [`runtime`]: task spawning abstraction for async runtime independence
//! - [`config`]: endpoint and behavior configuration
//! - [`error`]: centralized error types
//!
//! # Abstraction Traits
//!
//! Core logic is decoupled from its environment through a handful of
//! traits, each with a default implementation suitable for the headless
//! agent:
//!
//! - [`TokenApi`](auth::TokenApi): the token exchange/refresh endpoints
//! - [`PlayerApi`](player::PlayerApi): the remote playback control API
//! - [`SessionStore`](storage::SessionStore): durable key-value storage
//! - [`EventEmitter`](events::EventEmitter): emitting domain events
//! - [`Clock`](clock::Clock): wall-clock reads, injectable for tests
//! - [`TaskSpawner`](runtime::TaskSpawner): spawning background tasks

#![warn(clippy::all)]

pub mod auth;
pub mod bootstrap;
pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod player;
pub mod runtime;
pub mod storage;
pub mod track;

#[cfg(test)]
mod test_support;

// Re-export commonly used types at the crate root
pub use auth::{AuthPhase, AuthSession, AuthorizeRequest, TokenSource};
pub use bootstrap::{bootstrap, create_http_client, BootstrappedServices};
pub use clock::{Clock, SystemClock};
pub use config::Config;
pub use error::{
    AuthError, AuthResult, BootstrapError, ErrorCode, EventDecodeError, PlayerError, PlayerResult,
};
pub use events::{
    BroadcastEvent, BroadcastEventBridge, EventEmitter, LoggingEventEmitter, NoopEventEmitter,
    PlayerEvent, SessionEvent,
};
pub use player::events::RemoteEvent;
pub use player::{PlaySource, PlaybackState, PlayerCoordinator};
pub use runtime::{TaskSpawner, TokioSpawner};
pub use storage::{FileStore, MemoryStore, SessionStore};
pub use track::{RecentlyPlayedEntry, Track};
