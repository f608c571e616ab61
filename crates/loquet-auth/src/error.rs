//! Protocol error types for `loquet-auth`.
//!
//! The taxonomy deliberately mirrors what a caller can act on:
//! re-prompt for the password ([`AuthError::InvalidCredentials`]),
//! re-invoke with a one-time code ([`AuthError::SecondFactorRequired`]),
//! reload the derivation unit ([`AuthError::Derivation`]), or show the
//! server's message ([`AuthError::Transport`]). Nothing is retried
//! automatically and nothing fails silently into an empty credential.

use loquet_crypto_core::CryptoError;
use std::fmt;
use thiserror::Error;

/// Status codes reported by the isolated derivation unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HasherStatus {
    /// The unit's load step never completed (or the unit is gone).
    NotLoaded,
    /// The cost parameters or salt were rejected before hashing.
    BadParams,
    /// A request was issued while another was still in flight — a caller
    /// error; the unit does not pipeline.
    Busy,
    /// The hash primitive itself failed mid-derivation.
    Internal,
}

impl fmt::Display for HasherStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotLoaded => "not loaded",
            Self::BadParams => "invalid parameters",
            Self::Busy => "busy",
            Self::Internal => "internal failure",
        };
        f.write_str(s)
    }
}

/// Errors produced by authentication, registration, and key custody.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Cryptographic failure (delegated from crypto-core). Decryption and
    /// unwrap failures arrive here as the uniform
    /// [`CryptoError::Decryption`].
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// The isolated derivation unit failed. Fatal to the current attempt;
    /// a `NotLoaded` or `Internal` status means the unit must be
    /// discarded and a fresh one spawned before retrying.
    #[error("key derivation unit error ({status}): {detail}")]
    Derivation {
        /// Unit status code.
        status: HasherStatus,
        /// Human-readable detail, never key material.
        detail: String,
    },

    /// The server rejected the solved challenge (HTTP 401): the decrypted
    /// plaintext did not match, i.e. wrong password. Safe to report as
    /// "incorrect password" because it is the server's own signal.
    #[error("incorrect password")]
    InvalidCredentials,

    /// The server requires a one-time code before issuing a challenge
    /// (HTTP 412). A control-flow branch, not a failure: re-invoke the
    /// same operation with the code supplied.
    #[error("second factor required")]
    SecondFactorRequired,

    /// An operation that needs an active session was called logged out.
    #[error("no active session")]
    NotAuthenticated,

    /// Any other non-success server status or network failure, carrying
    /// the server-supplied message when present.
    #[error("server error{}: {message}", fmt_status(.status))]
    Transport {
        /// HTTP-like status when the server produced one.
        status: Option<u16>,
        /// Server-supplied message, or a generic fallback.
        message: String,
    },
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map_or_else(String::new, |s| format!(" ({s})"))
}
