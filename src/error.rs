//! Error taxonomy shared by every component of the token client.
//!
//! Secret values (client secret, access tokens) never appear in the
//! formatted output of any variant.

use thiserror::Error;

use crate::manager::state::ManagerState;

/// Longest response body fragment kept in a [`ProtocolError::Status`].
const MAX_BODY_EXCERPT: usize = 256;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Missing or empty client id / secret, or a credential source that could not be resolved.
    #[error("credential error: {0}")]
    Credential(String),

    /// Connection refused, DNS failure, request timeout.
    #[error("network error: {message}")]
    Network { message: String, timeout: bool },

    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The endpoint answered with `active=false`; the token must not be used.
    #[error("token endpoint issued an inactive token")]
    InactiveToken,

    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Invalid endpoint URL or HTTP client that could not be built.
    #[error("configuration error: {0}")]
    Configuration(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("token endpoint returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed token response: {0}")]
    MalformedBody(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StateError {
    #[error("'{operation}' is not allowed while the manager is {state}")]
    IllegalState {
        operation: &'static str,
        state: ManagerState,
    },

    #[error("no valid token available")]
    NoValidToken,
}

impl TokenError {
    /// Stable label used by metrics and structured logs.
    pub fn kind(&self) -> &'static str {
        match self {
            TokenError::Credential(_) => "credential",
            TokenError::Network { timeout: true, .. } => "timeout",
            TokenError::Network { .. } => "network",
            TokenError::Protocol(ProtocolError::Status { .. }) => "status",
            TokenError::Protocol(ProtocolError::MalformedBody(_)) => "malformed_body",
            TokenError::InactiveToken => "inactive_token",
            TokenError::State(_) => "state",
            TokenError::Configuration(_) => "configuration",
        }
    }

    /// Transient failures worth another attempt later.
    pub fn is_retryable(&self) -> bool {
        match self {
            TokenError::Network { .. } => true,
            TokenError::Protocol(ProtocolError::Status { status, .. }) => {
                *status == 408 || *status == 429 || *status >= 500
            }
            TokenError::Protocol(ProtocolError::MalformedBody(_)) | TokenError::InactiveToken => true,
            TokenError::Credential(_) | TokenError::State(_) | TokenError::Configuration(_) => false,
        }
    }

    pub fn illegal_state(operation: &'static str, state: ManagerState) -> Self {
        TokenError::State(StateError::IllegalState { operation, state })
    }

    pub fn no_valid_token() -> Self {
        TokenError::State(StateError::NoValidToken)
    }

    pub fn status(status: u16, body: &str) -> Self {
        let body = match body.char_indices().nth(MAX_BODY_EXCERPT) {
            Some((idx, _)) => format!("{}...", &body[..idx]),
            None => body.to_owned(),
        };
        TokenError::Protocol(ProtocolError::Status { status, body })
    }
}

impl From<reqwest::Error> for TokenError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return TokenError::Protocol(ProtocolError::MalformedBody(err.to_string()));
        }
        if err.is_builder() {
            return TokenError::Configuration(err.to_string());
        }
        let timeout = err.is_timeout();
        TokenError::Network {
            message: err.without_url().to_string(),
            timeout,
        }
    }
}

impl From<serde_json::Error> for TokenError {
    fn from(err: serde_json::Error) -> Self {
        TokenError::Protocol(ProtocolError::MalformedBody(err.to_string()))
    }
}
