//! Master-keypair custody.
//!
//! This module provides:
//! - [`generate_keypair`] — mint a fresh master keypair ([`KeyKind`] selects
//!   the algorithm; RSA-4096 today, the enum is open for future kinds)
//! - [`export_public_key`] / [`import_public_key`] — SPKI DER interchange,
//!   no secrecy requirement
//! - [`wrap_private_key`] / [`unwrap_private_key`] — PKCS#8 DER sealed
//!   under a temp key with AES-256-GCM
//!
//! # Custody invariant
//!
//! The private half never leaves this process in plaintext. Its only
//! plaintext representations are the in-memory [`MasterPrivateKey`] and
//! the transient PKCS#8 buffer inside wrap/unwrap, and both are zeroized
//! on drop (`rsa`'s key types implement `ZeroizeOnDrop`).

use crate::cipher::{self, SealedField};
use crate::error::CryptoError;
use rand::rngs::OsRng;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;

/// Default RSA modulus length in bits.
pub const DEFAULT_RSA_BITS: usize = 4096;

/// AAD tag binding wrapped blobs to master-key custody. A ciphertext
/// sealed in another context cannot be unwrapped as a master key.
const WRAP_AAD: &[u8] = b"loquet-master-key-v1";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Master-key algorithm selector.
///
/// Open variant set: non-RSA master keys are anticipated, so consumers
/// must not assume RSA and must match non-exhaustively.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind")]
pub enum KeyKind {
    /// RSA with the given modulus length in bits.
    Rsa {
        /// Modulus length in bits (default 4096).
        bits: usize,
    },
}

impl Default for KeyKind {
    fn default() -> Self {
        Self::Rsa {
            bits: DEFAULT_RSA_BITS,
        }
    }
}

/// Public half of a master keypair.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MasterPublicKey {
    /// RSA public key.
    Rsa(RsaPublicKey),
}

/// Private half of a master keypair. Zeroized on drop.
#[non_exhaustive]
#[derive(Clone)]
pub enum MasterPrivateKey {
    /// RSA private key.
    Rsa(RsaPrivateKey),
}

/// Masked like [`SecretBuffer`] — a derived `Debug` would print the
/// private exponent and primes.
///
/// [`SecretBuffer`]: crate::memory::SecretBuffer
impl fmt::Debug for MasterPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rsa(_) => f.write_str("MasterPrivateKey::Rsa(***)"),
        }
    }
}

/// A freshly generated master keypair, private half still in memory.
#[must_use = "the private half must be wrapped before it leaves memory"]
pub struct MasterKeypair {
    /// Public half (exportable, not secret).
    pub public: MasterPublicKey,
    /// Private half (plaintext, in-memory only).
    pub private: MasterPrivateKey,
}

// ---------------------------------------------------------------------------
// Generation and interchange
// ---------------------------------------------------------------------------

/// Generate a fresh master keypair of the given kind.
///
/// RSA-4096 generation is slow (seconds); callers run it off the hot path.
///
/// # Errors
///
/// Returns [`CryptoError::Keypair`] if generation fails (degenerate
/// modulus length, RNG failure).
pub fn generate_keypair(kind: KeyKind) -> Result<MasterKeypair, CryptoError> {
    match kind {
        KeyKind::Rsa { bits } => {
            let private = RsaPrivateKey::new(&mut OsRng, bits)
                .map_err(|e| CryptoError::Keypair(format!("RSA generation failed: {e}")))?;
            let public = RsaPublicKey::from(&private);
            Ok(MasterKeypair {
                public: MasterPublicKey::Rsa(public),
                private: MasterPrivateKey::Rsa(private),
            })
        }
    }
}

/// Export a public key as SPKI DER.
///
/// # Errors
///
/// Returns [`CryptoError::Keypair`] if DER encoding fails.
pub fn export_public_key(key: &MasterPublicKey) -> Result<Vec<u8>, CryptoError> {
    match key {
        MasterPublicKey::Rsa(rsa) => rsa
            .to_public_key_der()
            .map(|doc| doc.as_bytes().to_vec())
            .map_err(|e| CryptoError::Keypair(format!("public key export failed: {e}"))),
    }
}

/// Import a public key from SPKI DER.
///
/// # Errors
///
/// Returns [`CryptoError::Keypair`] if the bytes are not a valid encoding
/// of any supported key kind.
pub fn import_public_key(der: &[u8]) -> Result<MasterPublicKey, CryptoError> {
    RsaPublicKey::from_public_key_der(der)
        .map(MasterPublicKey::Rsa)
        .map_err(|e| CryptoError::Keypair(format!("public key import failed: {e}")))
}

// ---------------------------------------------------------------------------
// Wrap / unwrap
// ---------------------------------------------------------------------------

/// Wrap a private key under a temp key for storage or transport.
///
/// The key is encoded as PKCS#8 DER (the encoding buffer zeroizes itself
/// on drop) and sealed with AES-256-GCM under the custody AAD tag.
///
/// # Errors
///
/// Returns [`CryptoError::Keypair`] on encoding failure,
/// [`CryptoError::InvalidKeyMaterial`] if the temp key is not 32 bytes,
/// and [`CryptoError::Encryption`] on seal failure.
pub fn wrap_private_key(
    key: &MasterPrivateKey,
    temp_key: &[u8],
) -> Result<SealedField, CryptoError> {
    match key {
        MasterPrivateKey::Rsa(rsa) => {
            let der = rsa
                .to_pkcs8_der()
                .map_err(|e| CryptoError::Keypair(format!("private key encoding failed: {e}")))?;
            cipher::seal(der.as_bytes(), temp_key, WRAP_AAD)
        }
    }
}

/// Unwrap a private key previously produced by [`wrap_private_key`].
///
/// The recovered plaintext key must stay local — it is cached per user
/// for the session and never re-sent to the server.
///
/// # Errors
///
/// Returns [`CryptoError::Decryption`] uniformly when the temp key is
/// wrong or the blob is damaged, and [`CryptoError::Keypair`] if the
/// decrypted bytes fail to parse as PKCS#8.
pub fn unwrap_private_key(
    wrapped: &SealedField,
    temp_key: &[u8],
) -> Result<MasterPrivateKey, CryptoError> {
    let der = cipher::open(wrapped, temp_key, WRAP_AAD)?;
    let key = RsaPrivateKey::from_pkcs8_der(der.expose())
        .map_err(|e| CryptoError::Keypair(format!("private key decoding failed: {e}")))?;
    Ok(MasterPrivateKey::Rsa(key))
}

// ---------------------------------------------------------------------------
// Asymmetric encryption (RSA-OAEP-SHA256)
// ---------------------------------------------------------------------------

/// Encrypt a small payload to the holder of the master private key.
///
/// # Errors
///
/// Returns [`CryptoError::Keypair`] if the payload exceeds the OAEP
/// capacity for the modulus or encryption otherwise fails.
pub fn encrypt(key: &MasterPublicKey, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    match key {
        MasterPublicKey::Rsa(rsa) => rsa
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), plaintext)
            .map_err(|e| CryptoError::Keypair(format!("RSA-OAEP encryption failed: {e}"))),
    }
}

/// Decrypt a payload encrypted with [`encrypt`].
///
/// # Errors
///
/// Returns the uniform [`CryptoError::Decryption`] on any OAEP failure.
pub fn decrypt(key: &MasterPrivateKey, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    match key {
        MasterPrivateKey::Rsa(rsa) => rsa
            .decrypt(Oaep::new::<Sha256>(), ciphertext)
            .map_err(|_| CryptoError::Decryption),
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cipher::KEY_LEN;

    /// Small modulus to keep test keygen fast; production uses 4096.
    const TEST_KIND: KeyKind = KeyKind::Rsa { bits: 2048 };

    const TEMP_KEY: [u8; KEY_LEN] = [0x42; KEY_LEN];
    const OTHER_TEMP_KEY: [u8; KEY_LEN] = [0x24; KEY_LEN];

    #[test]
    fn default_kind_is_rsa_4096() {
        assert_eq!(KeyKind::default(), KeyKind::Rsa { bits: 4096 });
    }

    #[test]
    fn public_key_export_import_roundtrip() {
        let pair = generate_keypair(TEST_KIND).expect("keygen should succeed");
        let der = export_public_key(&pair.public).expect("export should succeed");
        let imported = import_public_key(&der).expect("import should succeed");
        assert_eq!(imported, pair.public);
    }

    #[test]
    fn import_rejects_garbage() {
        assert!(import_public_key(b"not a key").is_err());
    }

    #[test]
    fn wrap_unwrap_roundtrip_preserves_key() {
        let pair = generate_keypair(TEST_KIND).expect("keygen should succeed");
        let wrapped = wrap_private_key(&pair.private, &TEMP_KEY).expect("wrap should succeed");
        let unwrapped = unwrap_private_key(&wrapped, &TEMP_KEY).expect("unwrap should succeed");

        // The recovered key must actually work, not just parse.
        let ct = encrypt(&pair.public, b"custody check").expect("encrypt should succeed");
        let pt = decrypt(&unwrapped, &ct).expect("decrypt should succeed");
        assert_eq!(pt, b"custody check");
    }

    #[test]
    fn unwrap_with_wrong_temp_key_is_uniform_failure() {
        let pair = generate_keypair(TEST_KIND).expect("keygen should succeed");
        let wrapped = wrap_private_key(&pair.private, &TEMP_KEY).expect("wrap should succeed");
        let result = unwrap_private_key(&wrapped, &OTHER_TEMP_KEY);
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn unwrap_with_corrupted_blob_is_uniform_failure() {
        let pair = generate_keypair(TEST_KIND).expect("keygen should succeed");
        let mut wrapped = wrap_private_key(&pair.private, &TEMP_KEY).expect("wrap should succeed");
        if let Some(byte) = wrapped.data.first_mut() {
            *byte ^= 0xFF;
        }
        // Indistinguishable from the wrong-key case above.
        let result = unwrap_private_key(&wrapped, &TEMP_KEY);
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn oaep_decrypt_with_wrong_key_is_uniform_failure() {
        let pair_a = generate_keypair(TEST_KIND).expect("keygen should succeed");
        let pair_b = generate_keypair(TEST_KIND).expect("keygen should succeed");
        let ct = encrypt(&pair_a.public, b"payload").expect("encrypt should succeed");
        let result = decrypt(&pair_b.private, &ct);
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn private_key_debug_is_masked() {
        let pair = generate_keypair(KeyKind::Rsa { bits: 512 }).expect("keygen should succeed");
        let rendered = format!("{:?}", pair.private);
        assert_eq!(rendered, "MasterPrivateKey::Rsa(***)");
        assert!(!rendered.contains("d:"));
        assert!(!rendered.contains("primes"));
    }

    #[test]
    fn key_kind_serde_roundtrip() {
        let kind = KeyKind::Rsa { bits: 4096 };
        let json = serde_json::to_string(&kind).expect("serialize should succeed");
        let back: KeyKind = serde_json::from_str(&json).expect("deserialize should succeed");
        assert_eq!(kind, back);
    }
}
