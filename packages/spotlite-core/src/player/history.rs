//! Deduplicated, bounded recently-played history.
//!
//! Candidates arrive from four places: the player's own state changes,
//! page-level plays (e.g. clicking a search result), explicit replays from
//! the history UI, and the remote history endpoint. The same physical play
//! often shows up through more than one of these within a couple of
//! seconds, so every addition runs through the suppression and dedup rules
//! in [`RecentlyPlayed::record`].

use std::collections::HashMap;

use crate::track::{same_track, RecentlyPlayedEntry, Track};

/// Window in which a repeated id from a non-privileged source is treated
/// as an echo of the same play.
const SUPPRESSION_WINDOW_MS: u64 = 2_000;

/// Where a candidate play came from. Determines which suppression rules
/// apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaySource {
    /// The coordinator confirmed a play it issued itself.
    Player,
    /// A page collaborator reported a play (search result, playlist row).
    Page,
    /// The user explicitly replayed an entry from the history UI.
    Replay,
    /// The device reported a new current track.
    TrackChanged,
}

impl PlaySource {
    fn bypasses_suppression(self) -> bool {
        matches!(self, Self::Replay | Self::TrackChanged)
    }
}

/// Insertion-ordered history, most recent first, no duplicate identities,
/// capped length.
#[derive(Debug)]
pub struct RecentlyPlayed {
    entries: Vec<RecentlyPlayedEntry>,
    cap: usize,
    /// Acceptance time per track id, for echo suppression. Pruned to the
    /// suppression window on every acceptance, so it stays small.
    recent_accepts: HashMap<String, u64>,
}

impl RecentlyPlayed {
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self {
            entries: Vec::new(),
            cap,
            recent_accepts: HashMap::new(),
        }
    }

    /// Restores a persisted history. Entries are deduplicated and truncated
    /// in case the stored data predates a cap or rule change.
    #[must_use]
    pub fn with_entries(mut entries: Vec<RecentlyPlayedEntry>, cap: usize) -> Self {
        dedup_in_place(&mut entries);
        entries.truncate(cap);
        Self {
            entries,
            cap,
            recent_accepts: HashMap::new(),
        }
    }

    /// Current entries, most recent first.
    #[must_use]
    pub fn entries(&self) -> &[RecentlyPlayedEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records a candidate play. Returns true when the list changed.
    ///
    /// Rejection rules:
    /// - the candidate matches the current head and the source is not an
    ///   explicit replay (the head is already the most recent play);
    /// - the same id was accepted within the last 2 seconds and the source
    ///   is neither a replay nor a track change (echo of the same action
    ///   arriving through a second path).
    pub fn record(&mut self, track: Track, played_at: u64, source: PlaySource) -> bool {
        if source != PlaySource::Replay {
            if let Some(head) = self.entries.first() {
                if same_track(&head.track, &track) {
                    return false;
                }
            }
        }

        if !source.bypasses_suppression() && !track.id.is_empty() {
            if let Some(last_at) = self.recent_accepts.get(&track.id) {
                if played_at.saturating_sub(*last_at) < SUPPRESSION_WINDOW_MS {
                    return false;
                }
            }
        }

        self.entries.retain(|e| !same_track(&e.track, &track));
        if !track.id.is_empty() {
            self.recent_accepts
                .retain(|_, at| played_at.saturating_sub(*at) < SUPPRESSION_WINDOW_MS);
            self.recent_accepts.insert(track.id.clone(), played_at);
        }
        self.entries.insert(0, RecentlyPlayedEntry { track, played_at });
        dedup_in_place(&mut self.entries);
        self.entries.truncate(self.cap);
        true
    }

    /// Merges a remote history fetch into the local list.
    ///
    /// Remote data only fills gaps: when the local list is empty the remote
    /// list is adopted wholesale; otherwise only remote entries whose
    /// identity is absent locally are appended, and the combined list is
    /// re-sorted by timestamp. Entries the local session produced are never
    /// reordered relative to each other or evicted by the merge (the sort
    /// is stable, the local list is already newest-first, and only as many
    /// remote entries are taken as the cap leaves room for).
    pub fn merge_remote(&mut self, mut remote: Vec<RecentlyPlayedEntry>) {
        if self.entries.is_empty() {
            dedup_in_place(&mut remote);
            remote.sort_by(|a, b| b.played_at.cmp(&a.played_at));
            remote.truncate(self.cap);
            self.entries = remote;
            return;
        }

        let room = self.cap.saturating_sub(self.entries.len());
        let mut absent: Vec<RecentlyPlayedEntry> = Vec::new();
        for candidate in remote {
            let known = self
                .entries
                .iter()
                .chain(absent.iter())
                .any(|e| same_track(&e.track, &candidate.track));
            if !known {
                absent.push(candidate);
            }
        }
        // The cap must never cost a local entry its place, so only the
        // newest remote entries that fit are taken.
        absent.sort_by(|a, b| b.played_at.cmp(&a.played_at));
        absent.truncate(room);

        self.entries.extend(absent);
        self.entries.sort_by(|a, b| b.played_at.cmp(&a.played_at));
    }

    /// Drops all entries and suppression state.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.recent_accepts.clear();
    }
}

/// Keeps the first occurrence of every identity, in place.
fn dedup_in_place(entries: &mut Vec<RecentlyPlayedEntry>) {
    let mut kept: Vec<RecentlyPlayedEntry> = Vec::with_capacity(entries.len());
    for entry in entries.drain(..) {
        if !kept.iter().any(|k| same_track(&k.track, &entry.track)) {
            kept.push(entry);
        }
    }
    *entries = kept;
}
