//! Challenge-response authenticator.
//!
//! Proves password knowledge without transmitting the password or any
//! password-equivalent secret: the server encrypts a random value under a
//! key it derived from `(password, salt)` at registration time, and the
//! client demonstrates it can decrypt that value by deriving the same key
//! locally. The wire only ever carries the challenge and its solution.
//!
//! The attempt walks an explicit state machine:
//!
//! ```text
//! Idle → ChallengeRequested → ChallengeReceived → KeyDerived
//!      → ChallengeSolved → Submitted → Authenticated | Failed
//!                 ↘ SecondFactorRequired (412; re-invoke with a code)
//! ```
//!
//! State advances only by consuming the server's reply to the previous
//! step; the current state is observable via [`Authenticator::state`] so
//! callers can report where an attempt stopped.

use crate::api::{
    decode_field, encode_field, AuthTransport, Challenge, ChallengeRequest, SolvedChallenge,
    STATUS_BAD_CREDENTIALS, STATUS_SECOND_FACTOR_REQUIRED,
};
use crate::error::AuthError;
use crate::hasher::Hasher;
use crate::session::{Session, SessionContext};
use loquet_crypto_core::cipher;
use loquet_crypto_core::memory::SecretBuffer;
use tracing::debug;

// ---------------------------------------------------------------------------
// States
// ---------------------------------------------------------------------------

/// Where an authentication attempt currently stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthState {
    /// No attempt started.
    Idle,
    /// Challenge requested from the server.
    ChallengeRequested,
    /// Challenge received; server's hash parameters adopted.
    ChallengeReceived,
    /// The server demands a one-time code before issuing a challenge.
    /// Re-invoke with the code; the attempt restarts from
    /// `ChallengeRequested`.
    SecondFactorRequired,
    /// Authentication key material is in memory.
    KeyDerived,
    /// Challenge payload decrypted.
    ChallengeSolved,
    /// Solution submitted, awaiting verdict.
    Submitted,
    /// Session granted. Terminal.
    Authenticated,
    /// Attempt failed. Terminal.
    Failed,
}

/// Source of the authentication key for one attempt.
///
/// The normal path derives from the password and the challenge's salt and
/// parameters. `Reuse` exists for exactly one flow — registration hands
/// its freshly derived key to the login round so the user is not hashed
/// (or prompted) twice.
pub enum AuthKeySource<'a> {
    /// Derive from the password using the challenge's salt and params.
    Password(&'a str),
    /// Reuse key material derived moments ago in the same flow.
    Reuse(&'a SecretBuffer),
}

// ---------------------------------------------------------------------------
// Authenticator
// ---------------------------------------------------------------------------

/// Drives one login flow against the directory server.
pub struct Authenticator<'a> {
    transport: &'a dyn AuthTransport,
    hasher: &'a Hasher,
    state: AuthState,
}

impl<'a> Authenticator<'a> {
    /// New authenticator in `Idle`.
    #[must_use]
    pub const fn new(transport: &'a dyn AuthTransport, hasher: &'a Hasher) -> Self {
        Self {
            transport,
            hasher,
            state: AuthState::Idle,
        }
    }

    /// Current protocol state.
    #[must_use]
    pub const fn state(&self) -> AuthState {
        self.state
    }

    /// Authenticate with a password, persisting the granted session into
    /// `ctx` on success.
    ///
    /// # Errors
    ///
    /// - [`AuthError::SecondFactorRequired`] — call again with `totp`
    /// - [`AuthError::InvalidCredentials`] — wrong password (server 401)
    /// - [`AuthError::Derivation`] / [`AuthError::Crypto`] /
    ///   [`AuthError::Transport`] — per their taxonomy; never retried here
    pub fn login(
        &mut self,
        ctx: &mut SessionContext,
        email: &str,
        password: &str,
        totp: Option<&str>,
    ) -> Result<Session, AuthError> {
        self.run(ctx, email, AuthKeySource::Password(password), totp)
    }

    /// Authenticate reusing already-derived key material (the
    /// registration hand-off). Valid only when the key was derived with
    /// the same salt and parameters the server holds for this account.
    ///
    /// # Errors
    ///
    /// As [`Authenticator::login`].
    pub fn login_with_key(
        &mut self,
        ctx: &mut SessionContext,
        email: &str,
        auth_key: &SecretBuffer,
        totp: Option<&str>,
    ) -> Result<Session, AuthError> {
        self.run(ctx, email, AuthKeySource::Reuse(auth_key), totp)
    }

    fn run(
        &mut self,
        ctx: &mut SessionContext,
        email: &str,
        key_source: AuthKeySource<'_>,
        totp: Option<&str>,
    ) -> Result<Session, AuthError> {
        match self.attempt(ctx, email, key_source, totp) {
            Ok(session) => {
                self.state = AuthState::Authenticated;
                Ok(session)
            }
            Err(AuthError::SecondFactorRequired) => {
                self.state = AuthState::SecondFactorRequired;
                Err(AuthError::SecondFactorRequired)
            }
            Err(other) => {
                self.state = AuthState::Failed;
                Err(other)
            }
        }
    }

    fn attempt(
        &mut self,
        ctx: &mut SessionContext,
        email: &str,
        key_source: AuthKeySource<'_>,
        totp: Option<&str>,
    ) -> Result<Session, AuthError> {
        // Step 1: request a challenge.
        self.state = AuthState::ChallengeRequested;
        debug!(email, "requesting challenge");
        let challenge = self.request_challenge(email, totp)?;

        // Step 2: the server's hash parameters are authoritative — they
        // are what the challenge key was derived with, so substituting
        // client defaults would compute a different key.
        self.state = AuthState::ChallengeReceived;
        debug!(challenge_id = %challenge.id, "challenge received");
        let salt = decode_field(&challenge.salt)?;
        let ciphertext = decode_field(&challenge.data)?;

        // Step 3: derive the authentication key, unless this flow already
        // holds one (registration hand-off).
        let derived;
        let auth_key: &SecretBuffer = match key_source {
            AuthKeySource::Password(password) => {
                derived = self
                    .hasher
                    .derive(password.as_bytes(), &salt, &challenge.hash_params)?;
                &derived
            }
            AuthKeySource::Reuse(key) => key,
        };
        self.state = AuthState::KeyDerived;

        // Step 4: solve. The key is used for this one decryption and
        // nothing else; `auth_key` (when derived here) drops at the end
        // of the attempt.
        let plaintext = cipher::decrypt_challenge(&ciphertext, auth_key.expose())?;
        self.state = AuthState::ChallengeSolved;
        debug!(challenge_id = %challenge.id, "challenge solved");

        // Steps 5–6: submit and adopt the granted session.
        let session = self.submit(&challenge.id, &plaintext)?;
        ctx.establish(session.clone());
        debug!(user_id = %session.user_id, "authenticated");
        Ok(session)
    }

    fn request_challenge(
        &self,
        email: &str,
        totp: Option<&str>,
    ) -> Result<Challenge, AuthError> {
        let request = ChallengeRequest {
            email: email.to_owned(),
            totp: totp.map(ToOwned::to_owned),
        };
        self.transport
            .request_challenge(&request)
            .map_err(|failure| {
                if failure.status == Some(STATUS_SECOND_FACTOR_REQUIRED) {
                    AuthError::SecondFactorRequired
                } else {
                    failure.into()
                }
            })
    }

    /// Steps 5–6 in isolation: submit a solved challenge and build the
    /// session from the grant. `pub(crate)` so the registration
    /// orchestrator composes with it.
    pub(crate) fn submit(
        &mut self,
        challenge_id: &str,
        plaintext: &SecretBuffer,
    ) -> Result<Session, AuthError> {
        let solved = SolvedChallenge {
            data: encode_field(plaintext.expose()),
        };
        self.state = AuthState::Submitted;

        let grant = self
            .transport
            .submit_challenge(challenge_id, &solved)
            .map_err(|failure| {
                if failure.status == Some(STATUS_BAD_CREDENTIALS) {
                    // The server's own verdict on the decrypted value:
                    // wrong password, distinct from transport trouble.
                    AuthError::InvalidCredentials
                } else {
                    failure.into()
                }
            })?;

        Ok(Session {
            token: grant.csrf_token,
            user_id: grant.id,
        })
    }
}
