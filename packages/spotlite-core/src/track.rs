//! Track types and the two-key track identity.
//!
//! Tracks arrive from three sources (search results, the live playback
//! state, and the remote history endpoint) that do not reliably share a
//! stable id representation. Deduplication therefore uses an explicit
//! two-key identity: the track id when both sides carry one, with
//! (lowercased name, primary artist name) as the fallback.

use serde::{Deserialize, Serialize};

/// A playable track as the core sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    /// Vendor track id. May be empty when the source payload carried none
    /// (e.g. local files in the playback state).
    #[serde(default)]
    pub id: String,
    /// Display name.
    pub name: String,
    /// Artist names, primary first.
    pub artists: Vec<String>,
    /// Track length in milliseconds.
    pub duration_ms: u64,
    /// Vendor URI used to start playback (`spotify:track:...`).
    #[serde(default)]
    pub uri: String,
}

impl Track {
    /// Returns the primary artist name, if any.
    #[must_use]
    pub fn primary_artist(&self) -> Option<&str> {
        self.artists.first().map(String::as_str)
    }
}

/// True when both tracks carry the same non-empty id.
#[must_use]
pub fn same_id(a: &Track, b: &Track) -> bool {
    !a.id.is_empty() && a.id == b.id
}

/// True when the (lowercased name, primary artist) pairs match.
#[must_use]
pub fn same_name_artist(a: &Track, b: &Track) -> bool {
    a.name.to_lowercase() == b.name.to_lowercase() && a.primary_artist() == b.primary_artist()
}

/// The two-key identity: id match first, name+artist fallback.
///
/// This is the single identity function used by the recently-played list;
/// every dedup decision goes through here so the heuristic stays in one
/// testable place.
#[must_use]
pub fn same_track(a: &Track, b: &Track) -> bool {
    same_id(a, b) || same_name_artist(a, b)
}

/// One entry of the recently-played history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentlyPlayedEntry {
    /// The track that was played.
    pub track: Track,
    /// Unix timestamp in milliseconds of the (most recent) play.
    pub played_at: u64,
}
