//! Centralized error types for the Spotlite core library.
//!
//! Two failure domains exist: the auth session (login handshake, token
//! exchange, refresh) and the player (remote playback commands). Auth
//! failures are handled internally by resetting to the logged-out state;
//! player failures are always surfaced to the caller so a UI can present a
//! user-facing message. Nothing in this crate is fatal to the process.

use serde::Serialize;
use thiserror::Error;

/// Trait for error types that provide machine-readable error codes.
///
/// Implement this trait to provide consistent error codes across different
/// error conversion paths (UI messages, structured logs).
pub trait ErrorCode {
    /// Returns a machine-readable error code.
    fn code(&self) -> &'static str;
}

/// Errors from the auth session manager.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The callback's `state` did not match the persisted one, or no login
    /// was in progress. Signals a CSRF/retry risk - discard the attempt and
    /// return to login.
    #[error("authorization state mismatch")]
    AuthorizationMismatch,

    /// The code-for-token exchange returned a non-success HTTP status.
    #[error("token exchange failed with HTTP {status}: {body}")]
    TokenExchangeFailed {
        /// HTTP status returned by the token endpoint.
        status: u16,
        /// Response body text, kept for diagnostics.
        body: String,
    },

    /// The refresh intermediary rejected the refresh token. The session is
    /// reset to logged-out when this occurs.
    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    /// HTTP transport failure before any status was received.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Convenient Result alias for auth operations.
pub type AuthResult<T> = Result<T, AuthError>;

impl ErrorCode for AuthError {
    fn code(&self) -> &'static str {
        match self {
            Self::AuthorizationMismatch => "authorization_mismatch",
            Self::TokenExchangeFailed { .. } => "token_exchange_failed",
            Self::RefreshFailed(_) => "refresh_failed",
            Self::Http(_) => "http_request_failed",
        }
    }
}

/// Errors from remote playback commands.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// HTTP 404 from a playback command - no device is open/active.
    /// User-actionable: "open the app and start a device".
    #[error("no active playback device")]
    NoActiveDevice,

    /// HTTP 403 from a playback command - the account lacks the required
    /// subscription tier.
    #[error("premium subscription required for playback control")]
    PremiumRequired,

    /// Any other non-success status from a playback command.
    #[error("playback command failed with HTTP {status}: {body}")]
    CommandFailed {
        /// HTTP status returned by the control endpoint.
        status: u16,
        /// Response body text, kept for diagnostics.
        body: String,
    },

    /// A command was issued without a valid bearer credential.
    #[error("not authenticated")]
    NotAuthenticated,

    /// HTTP transport failure before any status was received.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
}

/// Convenient Result alias for player operations.
pub type PlayerResult<T> = Result<T, PlayerError>;

impl ErrorCode for PlayerError {
    fn code(&self) -> &'static str {
        match self {
            Self::NoActiveDevice => "no_active_device",
            Self::PremiumRequired => "premium_required",
            Self::CommandFailed { .. } => "playback_command_failed",
            Self::NotAuthenticated => "not_authenticated",
            Self::Http(_) => "http_request_failed",
        }
    }
}

/// Errors during service bootstrap.
#[derive(Debug, Error, Serialize)]
pub enum BootstrapError {
    /// Configuration failed validation before any service was built.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The shared HTTP client could not be constructed.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorCode for BootstrapError {
    fn code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration_error",
            Self::Internal(_) => "internal_error",
        }
    }
}

// The boundary-decode error lives next to its parser; re-exported here so
// callers have one import path for the whole taxonomy.
pub use crate::player::events::EventDecodeError;

impl ErrorCode for EventDecodeError {
    fn code(&self) -> &'static str {
        match self {
            EventDecodeError::UnknownKind(_) => "unknown_event_kind",
            EventDecodeError::Payload(_) => "event_payload_invalid",
        }
    }
}
