//! Playback coordination: remote commands, authoritative device events,
//! position interpolation, and the recently-played history.

mod api;
mod coordinator;
mod history;

pub mod events;

pub use api::{ApiArtist, ApiTrack, HttpPlayerApi, PlayerApi, RemoteHistoryItem};
pub use coordinator::{PlaybackState, PlayerCoordinator};
pub use history::{PlaySource, RecentlyPlayed};
