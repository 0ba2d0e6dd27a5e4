//! Typed boundary for the vendor SDK's event channel.
//!
//! The SDK delivers loosely structured JSON callbacks. They are decoded
//! into a tagged [`RemoteEvent`] here, at the edge, so the coordinator
//! never touches untyped payloads.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::track::Track;

/// Failure to decode an SDK callback payload.
#[derive(Debug, Error)]
pub enum EventDecodeError {
    /// The callback kind is not one the core understands.
    #[error("unknown event kind: {0}")]
    UnknownKind(String),

    /// The payload did not match the expected shape for its kind.
    #[error("invalid event payload: {0}")]
    Payload(String),
}

/// An authoritative event from the persistent device connection.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEvent {
    /// A device came online and can accept commands.
    Ready {
        /// Vendor device id to address commands to.
        device_id: String,
    },
    /// A device went offline.
    NotReady {
        /// The device that disconnected.
        device_id: String,
    },
    /// Full authoritative playback state. Always overrides local state.
    StateChanged(RemotePlaybackState),
}

/// The slice of the SDK's state payload the core consumes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemotePlaybackState {
    /// True when playback is suspended.
    pub paused: bool,
    /// Playhead position in milliseconds.
    pub position: u64,
    /// Track length in milliseconds.
    pub duration: u64,
    /// The track window around the playhead.
    pub track_window: TrackWindow,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TrackWindow {
    /// The track under the playhead, absent between tracks.
    pub current_track: Option<SdkTrack>,
}

/// Track shape as the SDK reports it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SdkTrack {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub artists: Vec<SdkArtist>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub uri: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SdkArtist {
    pub name: String,
}

impl SdkTrack {
    /// Converts into the core's track type. A null id becomes empty so the
    /// two-key identity falls back to name+artist.
    #[must_use]
    pub fn into_track(self) -> Track {
        Track {
            id: self.id.unwrap_or_default(),
            name: self.name,
            artists: self.artists.into_iter().map(|a| a.name).collect(),
            duration_ms: self.duration_ms,
            uri: self.uri,
        }
    }
}

#[derive(Debug, Deserialize)]
struct DevicePayload {
    device_id: String,
}

impl RemoteEvent {
    /// Decodes an SDK callback into a typed event.
    pub fn decode(kind: &str, payload: &Value) -> Result<Self, EventDecodeError> {
        match kind {
            "ready" => {
                let device: DevicePayload = serde_json::from_value(payload.clone())
                    .map_err(|e| EventDecodeError::Payload(e.to_string()))?;
                Ok(Self::Ready {
                    device_id: device.device_id,
                })
            }
            "not_ready" => {
                let device: DevicePayload = serde_json::from_value(payload.clone())
                    .map_err(|e| EventDecodeError::Payload(e.to_string()))?;
                Ok(Self::NotReady {
                    device_id: device.device_id,
                })
            }
            "player_state_changed" => {
                let state: RemotePlaybackState = serde_json::from_value(payload.clone())
                    .map_err(|e| EventDecodeError::Payload(e.to_string()))?;
                Ok(Self::StateChanged(state))
            }
            other => Err(EventDecodeError::UnknownKind(other.to_string())),
        }
    }
}
