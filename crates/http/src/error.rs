//! Client error types

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Why a refresh-token exchange produced no new access token.
///
/// Cloned to every caller parked on the same refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// Nothing to exchange; the session has been cleared
    #[error("No refresh token available")]
    NoRefreshToken,

    /// The backend rejected the refresh token or could not be reached
    #[error("Token refresh failed: {message}")]
    Exchange {
        status: Option<u16>,
        message: String,
    },

    /// The refresh was dropped before it settled
    #[error("Token refresh was abandoned before completing")]
    Abandoned,
}

impl RefreshError {
    pub fn exchange(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Exchange {
            status,
            message: message.into(),
        }
    }
}

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or request error
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server returned an error status
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Authentication failed
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Conflict
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Session could not be refreshed; the user has been sent to log in
    #[error(transparent)]
    Refresh(#[from] RefreshError),

    /// No session is stored for a call that needs one
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Signed-in user lacks an admin role
    #[error("Admin access required")]
    AdminRequired,

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Create error from HTTP status code
    pub fn from_status(status: StatusCode, message: String) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest(message),
            401 => Self::AuthenticationFailed(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            409 => Self::Conflict(message),
            _ => Self::ServerError {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Create error from a failed response, preferring the backend's `message` field
    pub fn from_response(status: StatusCode, body: &[u8]) -> Self {
        Self::from_status(status, error_message(status, body))
    }

    /// Whether the error means the session is gone and the user must log in again
    pub const fn is_auth_expired(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailed(_) | Self::Refresh(_) | Self::NotAuthenticated
        )
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// Human-readable message for a failed response
pub(crate) fn error_message(status: StatusCode, body: &[u8]) -> String {
    if let Ok(ErrorBody { message }) = serde_json::from_slice(body) {
        return message;
    }

    match std::str::from_utf8(body).map(str::trim) {
        Ok(text) if !text.is_empty() => text.to_string(),
        _ => status.to_string(),
    }
}
