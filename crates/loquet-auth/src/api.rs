//! Wire types and the server transport seam.
//!
//! The directory server exposes five operations (challenge request,
//! challenge submit, register, keys fetch, keys store). Network plumbing
//! is not this crate's business: the protocol talks to the server only
//! through the [`AuthTransport`] trait, and an implementation backed by
//! any HTTP client (or, in tests, an in-memory double) plugs in behind
//! it. Binary fields travel base64-encoded; every failure body is a
//! `{message}` object plus a status code.

use crate::error::AuthError;
use crate::session::Session;
use data_encoding::BASE64;
use loquet_crypto_core::kdf::HashParams;
use serde::{Deserialize, Serialize};

/// Status the server uses to demand a one-time code before issuing a
/// challenge.
pub const STATUS_SECOND_FACTOR_REQUIRED: u16 = 412;

/// Status the server uses to reject a solved challenge (wrong password).
pub const STATUS_BAD_CREDENTIALS: u16 = 401;

/// Fallback when the server gives no usable error body.
pub const GENERIC_FAILURE_MESSAGE: &str = "the server reported an unspecified error";

// ---------------------------------------------------------------------------
// Requests and responses
// ---------------------------------------------------------------------------

/// Body of `POST /challenge?action=request`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChallengeRequest {
    /// Account email.
    pub email: String,
    /// One-time code, when the account has a second factor enabled.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub totp: Option<String>,
}

/// A server-issued challenge (`201` response).
///
/// `data` decodes to `counter (16 bytes) || encrypted payload`; the cost
/// parameters are the server's and are adopted verbatim.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Challenge {
    /// Challenge identifier, echoed on submit.
    pub id: String,
    /// Base64 ciphertext.
    pub data: String,
    /// Base64 authentication salt.
    pub salt: String,
    /// Cost parameters the server derived the challenge key with.
    #[serde(rename = "hashParams")]
    pub hash_params: HashParams,
}

/// Body of `POST /challenge/{id}?action=submit`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SolvedChallenge {
    /// Base64 of the decrypted challenge payload.
    pub data: String,
}

/// Success body shared by challenge submit and register: the server's
/// identity assignment plus the session credential.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SessionGrant {
    /// Server-assigned user identifier.
    pub id: String,
    /// Session credential sent back on subsequent requests.
    #[serde(rename = "CSRFtoken")]
    pub csrf_token: String,
}

/// Body of `POST /register`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RegisterRequest {
    /// Account email.
    pub email: String,
    /// Base64 of `authSalt || authKey` — the verifier the server will
    /// encrypt future challenges under. Never the password itself.
    pub key: String,
    /// Cost parameters the auth key was derived with.
    #[serde(rename = "hashParams")]
    pub hash_params: HashParams,
}

/// Stored master-keypair record (`GET`/`POST /keys`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeysRecord {
    /// Base64 SPKI DER of the public half — stored unencrypted.
    #[serde(rename = "publicKey")]
    pub public_key: String,
    /// Base64 wire form of the wrapped private half — never plaintext.
    #[serde(rename = "privateKey")]
    pub private_key: String,
    /// Base64 wrap salt. Distinct from the authentication salt by
    /// protocol invariant.
    #[serde(rename = "hashSalt")]
    pub hash_salt: String,
    /// Cost parameters the temp key was derived with.
    #[serde(rename = "hashParams")]
    pub hash_params: HashParams,
}

// ---------------------------------------------------------------------------
// Failures
// ---------------------------------------------------------------------------

/// A non-success outcome from the server, as seen at the transport seam.
#[derive(Clone, Debug)]
pub struct ApiFailure {
    /// HTTP-like status, when one was produced.
    pub status: Option<u16>,
    /// The `{message}` body, or empty when the server sent none.
    pub message: String,
}

impl ApiFailure {
    /// A failure with a status code and server message.
    #[must_use]
    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// The server message, or the generic fallback when it is empty.
    #[must_use]
    pub fn message_or_fallback(&self) -> String {
        if self.message.is_empty() {
            GENERIC_FAILURE_MESSAGE.to_owned()
        } else {
            self.message.clone()
        }
    }
}

impl From<ApiFailure> for AuthError {
    /// Default mapping: any undocumented status is a generic transport
    /// failure. The authenticator intercepts the distinguished statuses
    /// (412, 401) *before* falling back to this.
    fn from(failure: ApiFailure) -> Self {
        Self::Transport {
            status: failure.status,
            message: failure.message_or_fallback(),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// The five server operations, free of any HTTP machinery.
///
/// Implementations must not retry, reorder, or swallow failures — the
/// protocol layer owns that policy.
pub trait AuthTransport {
    /// `POST /challenge?action=request`.
    ///
    /// # Errors
    ///
    /// `412` when a second factor is required; any other non-`201` as is.
    fn request_challenge(&self, request: &ChallengeRequest) -> Result<Challenge, ApiFailure>;

    /// `POST /challenge/{id}?action=submit`.
    ///
    /// # Errors
    ///
    /// `401` when the submitted plaintext does not match; any other
    /// non-`200` as is.
    fn submit_challenge(
        &self,
        challenge_id: &str,
        solved: &SolvedChallenge,
    ) -> Result<SessionGrant, ApiFailure>;

    /// `POST /register`.
    ///
    /// # Errors
    ///
    /// Any non-`201` status as is.
    fn register(&self, request: &RegisterRequest) -> Result<SessionGrant, ApiFailure>;

    /// `GET /keys`, authenticated by the session credential.
    ///
    /// # Errors
    ///
    /// Any non-`200` status as is.
    fn fetch_keys(&self, session: &Session) -> Result<KeysRecord, ApiFailure>;

    /// `POST /keys`, authenticated by the session credential.
    ///
    /// # Errors
    ///
    /// Any non-`201` status as is.
    fn store_keys(&self, session: &Session, record: &KeysRecord) -> Result<(), ApiFailure>;
}

// ---------------------------------------------------------------------------
// Base64 helpers
// ---------------------------------------------------------------------------

/// Encode bytes for a wire field.
#[must_use]
pub fn encode_field(bytes: &[u8]) -> String {
    BASE64.encode(bytes)
}

/// Decode a wire field.
///
/// # Errors
///
/// Returns [`AuthError::Transport`] — a payload the server sent that does
/// not decode is a malformed response, not a cryptographic failure.
pub fn decode_field(field: &str) -> Result<Vec<u8>, AuthError> {
    BASE64
        .decode(field.as_bytes())
        .map_err(|e| AuthError::Transport {
            status: None,
            message: format!("malformed base64 field in server response: {e}"),
        })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
