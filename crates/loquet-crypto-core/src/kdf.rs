//! Password hashing for authentication and key wrapping.
//!
//! This module provides:
//! - [`derive`] — stretch `(password, salt)` into a 256-bit key with Argon2
//! - [`HashParams`] — serializable cost parameters that travel with the
//!   data they protected
//! - [`generate_salt`] — fresh random salt of the length `HashParams` asks for
//!
//! # Parameter authority
//!
//! Cost parameters are never implicit. For an authentication challenge the
//! *server* chose them and the client must use them verbatim, or it will
//! compute a different key than the one the challenge was encrypted under.
//! When the client mints a new secret (registration, key wrapping) it picks
//! [`HashParams::recommended`] and persists the parameters alongside the
//! ciphertext so a later derivation can match them.

use crate::error::CryptoError;
use crate::memory::SecretBuffer;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Derived key length in bytes (256 bits) — authentication keys and temp
/// keys are both this size.
pub const KEY_LEN: usize = 32;

/// Minimum salt length accepted, in bytes (argon2's own floor).
const MIN_SALT_LEN: usize = 8;

/// Salt length the client generates for fresh secrets, in bytes.
pub const DEFAULT_SALT_LEN: u32 = 16;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Argon2 variant selector.
///
/// The wire protocol uses Argon2i; the other variants are representable so
/// a parameter set received from the server round-trips without loss.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// Data-independent addressing — the protocol default.
    Argon2i,
    /// Data-dependent addressing.
    Argon2d,
    /// Hybrid.
    Argon2id,
}

impl From<HashAlgorithm> for argon2::Algorithm {
    fn from(alg: HashAlgorithm) -> Self {
        match alg {
            HashAlgorithm::Argon2i => Self::Argon2i,
            HashAlgorithm::Argon2d => Self::Argon2d,
            HashAlgorithm::Argon2id => Self::Argon2id,
        }
    }
}

/// Cost parameter set for one derivation.
///
/// Immutable once a challenge or registration round begins. Field names
/// follow the `argon2` crate convention (`m_cost` in KiB, `t_cost`
/// iterations, `p_cost` lanes); serde renames match the wire format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashParams {
    /// Argon2 variant.
    pub algorithm: HashAlgorithm,
    /// Number of iterations.
    #[serde(rename = "timeCost")]
    pub t_cost: u32,
    /// Memory cost in kibibytes.
    #[serde(rename = "memoryCost")]
    pub m_cost: u32,
    /// Degree of parallelism (lanes).
    #[serde(rename = "parallelism")]
    pub p_cost: u32,
    /// Salt length in bytes for fresh secrets minted under these params.
    #[serde(rename = "saltLength")]
    pub salt_len: u32,
}

impl HashParams {
    /// Client-side defaults for newly minted secrets (registration salt,
    /// key-wrapping salt): Argon2i, 64 MiB, 3 passes, 1 lane, 16-byte salt.
    #[must_use]
    pub const fn recommended() -> Self {
        Self {
            algorithm: HashAlgorithm::Argon2i,
            t_cost: 3,
            m_cost: 65_536,
            p_cost: 1,
            salt_len: DEFAULT_SALT_LEN,
        }
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// Check a salt/parameter pair without deriving.
///
/// Exposed separately so the derivation worker can classify a rejected
/// request as a parameter error before committing to the (expensive)
/// hash itself.
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivation`] if the salt is shorter than
/// 8 bytes or the cost parameters are rejected by argon2.
pub fn validate(salt: &[u8], params: &HashParams) -> Result<(), CryptoError> {
    if salt.len() < MIN_SALT_LEN {
        return Err(CryptoError::KeyDerivation(format!(
            "salt too short: {} bytes (minimum {MIN_SALT_LEN})",
            salt.len()
        )));
    }
    argon2::Params::new(params.m_cost, params.t_cost, params.p_cost, Some(KEY_LEN))
        .map_err(|e| CryptoError::KeyDerivation(format!("invalid argon2 params: {e}")))?;
    Ok(())
}

/// Derive a 256-bit key from a password and salt.
///
/// Deterministic: the same `(password, salt, params)` triple always yields
/// the same key. The intermediate output buffer is zeroized after copying
/// into the returned [`SecretBuffer`].
///
/// # Errors
///
/// Returns [`CryptoError::KeyDerivation`] if:
/// - the salt is shorter than 8 bytes
/// - the cost parameters are rejected by argon2
/// - the derivation itself fails (e.g., memory allocation)
pub fn derive(
    password: &[u8],
    salt: &[u8],
    params: &HashParams,
) -> Result<SecretBuffer, CryptoError> {
    validate(salt, params)?;

    let argon2_params =
        argon2::Params::new(params.m_cost, params.t_cost, params.p_cost, Some(KEY_LEN))
            .map_err(|e| CryptoError::KeyDerivation(format!("invalid argon2 params: {e}")))?;

    let argon2 = argon2::Argon2::new(
        params.algorithm.into(),
        argon2::Version::V0x13,
        argon2_params,
    );

    let mut output = [0u8; KEY_LEN];
    argon2
        .hash_password_into(password, salt, &mut output)
        .map_err(|e| CryptoError::KeyDerivation(format!("argon2 derivation failed: {e}")))?;

    let result = SecretBuffer::new(&output)
        .map_err(|e| CryptoError::SecureMemory(format!("secure buffer allocation failed: {e}")))?;
    output.zeroize();
    Ok(result)
}

/// Generate a fresh random salt of the length `params` specifies.
///
/// Salts are public — they travel unencrypted next to the data they
/// protect — so a plain `Vec<u8>` is fine here.
///
/// # Errors
///
/// Returns [`CryptoError::SecureMemory`] if the CSPRNG fails.
pub fn generate_salt(params: &HashParams) -> Result<Vec<u8>, CryptoError> {
    let mut salt = vec![0u8; params.salt_len as usize];
    OsRng
        .try_fill_bytes(&mut salt)
        .map_err(|e| CryptoError::SecureMemory(format!("CSPRNG fill failed: {e}")))?;
    Ok(salt)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
