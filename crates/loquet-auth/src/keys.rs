//! Master-keypair custody against the directory server.
//!
//! Upload happens once, at registration: the private half leaves the
//! process only as a wrapped blob under a temp key derived from the
//! password and a dedicated wrap salt. Recovery reverses it — fetch the
//! record, re-derive the temp key from the stored salt and parameters,
//! unwrap, and cache the plaintext keypair in the session context. The
//! plaintext private key is never re-sent to the server and never logged.

use crate::api::{decode_field, encode_field, AuthTransport, KeysRecord};
use crate::error::AuthError;
use crate::hasher::Hasher;
use crate::session::SessionContext;
use loquet_crypto_core::cipher::SealedField;
use loquet_crypto_core::custody::{self, KeyKind};
use loquet_crypto_core::kdf::{self, HashParams};
use tracing::debug;

/// Wrap-salt regeneration attempts before giving up. A collision with
/// the auth salt is a CSPRNG catastrophe, not a plausible event.
const SALT_RETRY_LIMIT: u32 = 4;

/// Uploads and recovers the master keypair.
pub struct KeyCustodian<'a> {
    transport: &'a dyn AuthTransport,
    hasher: &'a Hasher,
}

impl<'a> KeyCustodian<'a> {
    /// New custodian over the given transport and derivation unit.
    #[must_use]
    pub const fn new(transport: &'a dyn AuthTransport, hasher: &'a Hasher) -> Self {
        Self { transport, hasher }
    }

    /// Generate the master keypair, wrap its private half, upload the
    /// record, and cache the plaintext pair for the active session.
    ///
    /// The wrap salt is freshly generated and guaranteed distinct from
    /// `auth_salt`: reusing the authentication salt would let anyone who
    /// captures the authentication material also derive the unwrapping
    /// key, collapsing two independent secrets into one.
    ///
    /// # Errors
    ///
    /// [`AuthError::NotAuthenticated`] without an active session;
    /// otherwise per the derivation/crypto/transport taxonomy.
    pub fn generate_and_upload(
        &self,
        ctx: &mut SessionContext,
        password: &str,
        params: &HashParams,
        auth_salt: &[u8],
        kind: KeyKind,
    ) -> Result<(), AuthError> {
        let session = ctx.session().ok_or(AuthError::NotAuthenticated)?.clone();

        let wrap_salt = distinct_salt(params, auth_salt)?;
        // Second derivation of the flow: same cost parameters, its own
        // salt, used solely for key wrapping.
        let temp_key = self
            .hasher
            .derive(password.as_bytes(), &wrap_salt, params)?;

        let pair = custody::generate_keypair(kind)?;
        let wrapped = custody::wrap_private_key(&pair.private, temp_key.expose())?;
        let public_der = custody::export_public_key(&pair.public)?;

        let record = KeysRecord {
            public_key: encode_field(&public_der),
            private_key: encode_field(&wrapped.to_bytes()),
            hash_salt: encode_field(&wrap_salt),
            hash_params: params.clone(),
        };
        self.transport
            .store_keys(&session, &record)
            .map_err(AuthError::from)?;
        debug!(user_id = %session.user_id, "master keypair uploaded");

        ctx.cache_keypair(session.user_id, pair.public, pair.private);
        Ok(())
    }

    /// Fetch the stored record, re-derive the temp key from the stored
    /// wrap salt and parameters, unwrap the private half, and cache the
    /// keypair. A cache hit for the session's user skips the round trip
    /// and the derivation entirely.
    ///
    /// # Errors
    ///
    /// [`AuthError::NotAuthenticated`] without an active session; a wrong
    /// password surfaces as the uniform [`CryptoError::Decryption`]
    /// (there is no server verdict to lean on here).
    ///
    /// [`CryptoError::Decryption`]: loquet_crypto_core::CryptoError::Decryption
    pub fn recover(&self, ctx: &mut SessionContext, password: &str) -> Result<(), AuthError> {
        let session = ctx.session().ok_or(AuthError::NotAuthenticated)?.clone();
        if ctx.keypair_for(&session.user_id).is_some() {
            debug!(user_id = %session.user_id, "master keypair cache hit");
            return Ok(());
        }

        let record = self
            .transport
            .fetch_keys(&session)
            .map_err(AuthError::from)?;
        let wrap_salt = decode_field(&record.hash_salt)?;
        let temp_key = self
            .hasher
            .derive(password.as_bytes(), &wrap_salt, &record.hash_params)?;

        let wrapped = SealedField::from_bytes(&decode_field(&record.private_key)?)?;
        let private = custody::unwrap_private_key(&wrapped, temp_key.expose())?;
        let public = custody::import_public_key(&decode_field(&record.public_key)?)?;
        debug!(user_id = %session.user_id, "master keypair recovered");

        ctx.cache_keypair(session.user_id, public, private);
        Ok(())
    }
}

/// Fresh salt guaranteed to differ from `other` — the auth-salt /
/// wrap-salt separation invariant, enforced rather than assumed.
fn distinct_salt(params: &HashParams, other: &[u8]) -> Result<Vec<u8>, AuthError> {
    for _ in 0..SALT_RETRY_LIMIT {
        let salt = kdf::generate_salt(params)?;
        if salt != other {
            return Ok(salt);
        }
    }
    Err(AuthError::Derivation {
        status: crate::error::HasherStatus::Internal,
        detail: "CSPRNG produced colliding salts repeatedly".into(),
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
