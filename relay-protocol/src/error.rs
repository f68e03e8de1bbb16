//! Shared error taxonomy.
//!
//! Every fallible operation in the protocol returns one of these variants
//! instead of a raw string. The Router's transport front-end maps a
//! `RelayError` to an HTTP status or a WebSocket close code; peers match
//! on `code()` to decide whether to retry or abort.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RelayError {
    #[error("malformed public key")]
    MalformedKey,
    #[error("peer is not registered")]
    NotRegistered,
    #[error("peer id does not match derive(public_key)")]
    IdKeyMismatch,
    #[error("no challenge in flight for this peer")]
    NoChallenge,
    #[error("challenge expired")]
    ChallengeExpired,
    #[error("challenge does not match the one on file")]
    ChallengeMismatch,
    #[error("signature verification failed")]
    SignatureInvalid,
    #[error("peer has not completed authentication")]
    NotAuthenticated,
    #[error("cardhost has no live connection")]
    CardhostOffline,
    #[error("session token is unknown or expired")]
    InvalidToken,
    #[error("no relay session bound for this key")]
    NoRelaySession,
    #[error("caller is not authorized for this operation")]
    NotAuthorized,
    #[error("operation timed out")]
    Timeout,
    #[error("internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Machine-readable code for the wire error frame / HTTP body.
    pub fn code(&self) -> &'static str {
        match self {
            RelayError::MalformedKey => "MALFORMED_KEY",
            RelayError::NotRegistered => "NOT_REGISTERED",
            RelayError::IdKeyMismatch => "ID_KEY_MISMATCH",
            RelayError::NoChallenge => "NO_CHALLENGE",
            RelayError::ChallengeExpired => "CHALLENGE_EXPIRED",
            RelayError::ChallengeMismatch => "CHALLENGE_MISMATCH",
            RelayError::SignatureInvalid => "SIGNATURE_INVALID",
            RelayError::NotAuthenticated => "NOT_AUTHENTICATED",
            RelayError::CardhostOffline => "CARDHOST_OFFLINE",
            RelayError::InvalidToken => "INVALID_TOKEN",
            RelayError::NoRelaySession => "NO_RELAY_SESSION",
            RelayError::NotAuthorized => "NOT_AUTHORIZED",
            RelayError::Timeout => "TIMEOUT",
            RelayError::Internal(_) => "INTERNAL",
        }
    }

    /// Coarse category, used to pick an HTTP status at the transport front-end.
    pub fn category(&self) -> ErrorCategory {
        match self {
            RelayError::MalformedKey => ErrorCategory::Input,
            RelayError::NotRegistered | RelayError::CardhostOffline | RelayError::InvalidToken => {
                ErrorCategory::State
            }
            RelayError::IdKeyMismatch
            | RelayError::NoChallenge
            | RelayError::ChallengeExpired
            | RelayError::ChallengeMismatch
            | RelayError::SignatureInvalid
            | RelayError::NotAuthenticated
            | RelayError::NotAuthorized => ErrorCategory::Auth,
            RelayError::Timeout => ErrorCategory::Transient,
            RelayError::NoRelaySession => ErrorCategory::State,
            RelayError::Internal(_) => ErrorCategory::Runtime,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Input,
    Auth,
    State,
    Runtime,
    Transient,
}
