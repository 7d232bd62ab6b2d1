//! Error types for the Fitbit API client.
//!
//! # Design
//! One enum covers every failure the client can surface. Token-endpoint
//! failures (`Auth`) are kept apart from resource-endpoint failures (`Api`)
//! because callers handle them differently: an auth failure usually means
//! re-running the authorization flow, an API failure is per-request.
//! Resource failures carry the raw status and body for inspection.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by `FitbyteClient` and the build/parse helpers.
#[derive(Debug, Error)]
pub enum Error {
    /// Construction arguments were missing or malformed. Raised before any
    /// network activity.
    #[error("{0}")]
    InvalidArgument(String),

    /// The token endpoint rejected a code exchange or refresh, or returned a
    /// body that is not a valid token response.
    #[error("authorization failed{}: {message}", status_suffix(.status))]
    Auth { status: Option<u16>, message: String },

    /// A resource endpoint returned a client or server error.
    #[error("HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// A resource endpoint returned a success status with a body that is not
    /// valid JSON.
    #[error("invalid JSON in HTTP {status} response: {message}")]
    Decode {
        status: u16,
        body: String,
        message: String,
    },

    /// No token has been obtained yet; call `exchange_code` (or restore one
    /// with `with_token`) first.
    #[error("no access token available; complete the authorization flow first")]
    Unauthenticated,

    /// The request never produced an HTTP response.
    #[error("transport error: {0}")]
    Transport(String),

    /// The request payload could not be serialized to JSON.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" (HTTP {s})")).unwrap_or_default()
}

impl Error {
    /// HTTP status attached to the error, when the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Auth { status, .. } => *status,
            Error::Api { status, .. } | Error::Decode { status, .. } => Some(*status),
            _ => None,
        }
    }
}
