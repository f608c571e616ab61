//! Symmetric cipher adapter.
//!
//! Two distinct jobs, two distinct modes:
//! - [`seal`] / [`open`] — AES-256-GCM for at-rest protection of fields
//!   and wrapped private keys. Authenticated; tampering is detected.
//! - [`decrypt_challenge`] — AES-256-CTR for server-issued login
//!   challenges. The server embeds the initial counter block as the first
//!   16 bytes of the ciphertext, so nothing beyond the challenge bytes
//!   themselves needs to travel.
//!
//! All decryption failures collapse into [`CryptoError::Decryption`] with
//! no cause attached. A caller (or an attacker watching a caller) must not
//! be able to tell a tag mismatch from a wrong key from a truncated input.

use crate::error::CryptoError;
use crate::memory::SecretBuffer;
use aes::cipher::{KeyIvInit, StreamCipher};
use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// AES-256-GCM nonce length in bytes (96 bits).
pub const NONCE_LEN: usize = 12;

/// AES-256-GCM authentication tag length in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// AES key length in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// CTR initial-counter-block length prefixed to a challenge ciphertext.
pub const CHALLENGE_IV_LEN: usize = 16;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Authenticated ciphertext container for one sealed field.
///
/// `data` holds `ciphertext || tag` — the layout ring's in-place AEAD API
/// produces. Wire form is `nonce || data` via [`SealedField::to_bytes`].
#[must_use = "sealed data must be stored or transmitted"]
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SealedField {
    /// 96-bit random nonce, unique per seal.
    pub nonce: [u8; NONCE_LEN],
    /// Ciphertext with the 16-byte authentication tag appended.
    pub data: Vec<u8>,
}

impl SealedField {
    /// Serialize to wire form: `nonce || ciphertext || tag`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_LEN.saturating_add(self.data.len()));
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.data);
        out
    }

    /// Parse wire form produced by [`SealedField::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Encryption`] if the input cannot hold a
    /// nonce plus a tag (minimum 28 bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        let min = NONCE_LEN.saturating_add(TAG_LEN);
        if bytes.len() < min {
            return Err(CryptoError::Encryption(format!(
                "sealed field too short: {} bytes (minimum {min})",
                bytes.len()
            )));
        }
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(&bytes[..NONCE_LEN]);
        Ok(Self {
            nonce,
            data: bytes[NONCE_LEN..].to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// AES-256-GCM — at-rest fields and wrapped keys
// ---------------------------------------------------------------------------

/// Seal a plaintext under AES-256-GCM with a fresh random nonce.
///
/// `aad` is authenticated but not encrypted; callers use it for domain
/// separation (e.g., the key-custody tag) so ciphertexts cannot be
/// replayed across contexts.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyMaterial`] if the key is not exactly
/// 32 bytes, [`CryptoError::Encryption`] if the seal operation fails.
pub fn seal(plaintext: &[u8], key: &[u8], aad: &[u8]) -> Result<SealedField, CryptoError> {
    let sealing_key = gcm_key(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = aead::Nonce::assume_unique_for_key(nonce_bytes);

    let mut in_out = plaintext.to_vec();
    if sealing_key
        .seal_in_place_append_tag(nonce, aead::Aad::from(aad), &mut in_out)
        .is_err()
    {
        in_out.zeroize();
        return Err(CryptoError::Encryption("AES-256-GCM seal failed".into()));
    }

    Ok(SealedField {
        nonce: nonce_bytes,
        data: in_out,
    })
}

/// Open a sealed field, verifying its authentication tag and AAD.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyMaterial`] if the key is not exactly
/// 32 bytes. Returns [`CryptoError::Decryption`] for every failed open —
/// wrong key, wrong AAD, tampered nonce, tampered data — uniformly.
pub fn open(sealed: &SealedField, key: &[u8], aad: &[u8]) -> Result<SecretBuffer, CryptoError> {
    let opening_key = gcm_key(key)?;
    let nonce = aead::Nonce::assume_unique_for_key(sealed.nonce);

    let mut in_out = sealed.data.clone();
    let plaintext = opening_key
        .open_in_place(nonce, aead::Aad::from(aad), &mut in_out)
        .map_err(|_| CryptoError::Decryption)?;

    let result = SecretBuffer::new(plaintext)
        .map_err(|e| CryptoError::SecureMemory(format!("secure buffer allocation failed: {e}")))?;
    in_out.zeroize();
    Ok(result)
}

fn gcm_key(key: &[u8]) -> Result<aead::LessSafeKey, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKeyMaterial(format!(
            "invalid key length: {} bytes (expected {KEY_LEN})",
            key.len()
        )));
    }
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| CryptoError::Encryption("failed to create AES-256-GCM key".into()))?;
    Ok(aead::LessSafeKey::new(unbound))
}

// ---------------------------------------------------------------------------
// AES-256-CTR — challenge decryption
// ---------------------------------------------------------------------------

/// Decrypt a server-issued challenge.
///
/// Layout: the first 16 bytes of `ciphertext` are the initial counter
/// block, the remainder is the encrypted payload. CTR mode carries no
/// authentication — a wrong key yields garbage plaintext, and it is the
/// *server* that decides whether the submitted plaintext matches.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyMaterial`] if the key is not exactly
/// 32 bytes. Returns [`CryptoError::Decryption`] if the ciphertext cannot
/// even hold the counter block (uniform with every other decryption
/// failure).
pub fn decrypt_challenge(ciphertext: &[u8], key: &[u8]) -> Result<SecretBuffer, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKeyMaterial(format!(
            "invalid key length: {} bytes (expected {KEY_LEN})",
            key.len()
        )));
    }
    if ciphertext.len() < CHALLENGE_IV_LEN {
        return Err(CryptoError::Decryption);
    }

    let (iv, payload) = ciphertext.split_at(CHALLENGE_IV_LEN);
    let mut cipher =
        Aes256Ctr::new_from_slices(key, iv).map_err(|_| CryptoError::Decryption)?;

    let mut plaintext = payload.to_vec();
    cipher.apply_keystream(&mut plaintext);

    let result = SecretBuffer::new(&plaintext)
        .map_err(|e| CryptoError::SecureMemory(format!("secure buffer allocation failed: {e}")))?;
    plaintext.zeroize();
    Ok(result)
}

/// Encrypt a challenge payload the way the server does: `iv || AES-256-CTR
/// keystream ⊕ plaintext`. The client never calls this in production; it
/// exists so tests (and a protocol simulator) can mint valid challenges.
///
/// # Errors
///
/// Returns [`CryptoError::InvalidKeyMaterial`] if the key is not exactly
/// 32 bytes, [`CryptoError::SecureMemory`] if the CSPRNG fails.
pub fn encrypt_challenge(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    if key.len() != KEY_LEN {
        return Err(CryptoError::InvalidKeyMaterial(format!(
            "invalid key length: {} bytes (expected {KEY_LEN})",
            key.len()
        )));
    }

    let mut iv = [0u8; CHALLENGE_IV_LEN];
    OsRng
        .try_fill_bytes(&mut iv)
        .map_err(|e| CryptoError::SecureMemory(format!("CSPRNG fill failed: {e}")))?;

    let mut cipher = Aes256Ctr::new_from_slices(key, &iv)
        .map_err(|_| CryptoError::Encryption("failed to create AES-256-CTR cipher".into()))?;

    let mut out = Vec::with_capacity(CHALLENGE_IV_LEN.saturating_add(plaintext.len()));
    out.extend_from_slice(&iv);
    let mut payload = plaintext.to_vec();
    cipher.apply_keystream(&mut payload);
    out.extend_from_slice(&payload);
    Ok(out)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: [u8; KEY_LEN] = [0xA5; KEY_LEN];
    const WRONG_KEY: [u8; KEY_LEN] = [0x5A; KEY_LEN];

    #[test]
    fn seal_open_roundtrip() {
        let sealed = seal(b"wrapped key bytes", &TEST_KEY, &[]).expect("seal should succeed");
        let opened = open(&sealed, &TEST_KEY, &[]).expect("open should succeed");
        assert_eq!(opened.expose(), b"wrapped key bytes");
    }

    #[test]
    fn seal_appends_tag() {
        let sealed = seal(b"abc", &TEST_KEY, &[]).expect("seal should succeed");
        assert_eq!(sealed.data.len(), 3 + TAG_LEN);
    }

    #[test]
    fn open_with_wrong_key_is_uniform_failure() {
        let sealed = seal(b"secret", &TEST_KEY, &[]).expect("seal should succeed");
        let result = open(&sealed, &WRONG_KEY, &[]);
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn open_with_tampered_data_is_uniform_failure() {
        let mut sealed = seal(b"secret", &TEST_KEY, &[]).expect("seal should succeed");
        if let Some(byte) = sealed.data.first_mut() {
            *byte ^= 0xFF;
        }
        let result = open(&sealed, &TEST_KEY, &[]);
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn open_with_tampered_nonce_is_uniform_failure() {
        let mut sealed = seal(b"secret", &TEST_KEY, &[]).expect("seal should succeed");
        sealed.nonce[0] ^= 0xFF;
        let result = open(&sealed, &TEST_KEY, &[]);
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn open_with_wrong_aad_is_uniform_failure() {
        let sealed = seal(b"secret", &TEST_KEY, b"context-a").expect("seal should succeed");
        let result = open(&sealed, &TEST_KEY, b"context-b");
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn seal_rejects_bad_key_length() {
        let result = seal(b"x", &[0u8; 16], &[]);
        assert!(matches!(result, Err(CryptoError::InvalidKeyMaterial(_))));
    }

    #[test]
    fn open_rejects_bad_key_length() {
        let sealed = seal(b"x", &TEST_KEY, &[]).expect("seal should succeed");
        let result = open(&sealed, &[0u8; 16], &[]);
        assert!(matches!(result, Err(CryptoError::InvalidKeyMaterial(_))));
    }

    #[test]
    fn challenge_rejects_bad_key_length() {
        assert!(matches!(
            decrypt_challenge(&[0u8; 32], &[0u8; 16]),
            Err(CryptoError::InvalidKeyMaterial(_))
        ));
        assert!(matches!(
            encrypt_challenge(b"x", &[0u8; 16]),
            Err(CryptoError::InvalidKeyMaterial(_))
        ));
    }

    #[test]
    fn two_seals_use_distinct_nonces() {
        let a = seal(b"same", &TEST_KEY, &[]).expect("seal should succeed");
        let b = seal(b"same", &TEST_KEY, &[]).expect("seal should succeed");
        assert_ne!(a.nonce, b.nonce);
    }

    #[test]
    fn sealed_field_wire_roundtrip() {
        let sealed = seal(b"wire test", &TEST_KEY, &[]).expect("seal should succeed");
        let bytes = sealed.to_bytes();
        let back = SealedField::from_bytes(&bytes).expect("from_bytes should succeed");
        assert_eq!(back.nonce, sealed.nonce);
        assert_eq!(back.data, sealed.data);
    }

    #[test]
    fn sealed_field_rejects_short_wire_input() {
        assert!(SealedField::from_bytes(&[0u8; 27]).is_err());
    }

    #[test]
    fn challenge_roundtrip() {
        let ct = encrypt_challenge(b"prove you hold the key", &TEST_KEY)
            .expect("encrypt should succeed");
        assert_eq!(ct.len(), CHALLENGE_IV_LEN + 22);
        let pt = decrypt_challenge(&ct, &TEST_KEY).expect("decrypt should succeed");
        assert_eq!(pt.expose(), b"prove you hold the key");
    }

    #[test]
    fn challenge_with_wrong_key_yields_garbage_not_error() {
        // CTR has no authentication: decryption "succeeds" and the server
        // is the arbiter of whether the plaintext matches.
        let ct = encrypt_challenge(b"expected plaintext", &TEST_KEY)
            .expect("encrypt should succeed");
        let pt = decrypt_challenge(&ct, &WRONG_KEY).expect("decrypt should succeed");
        assert_ne!(pt.expose(), b"expected plaintext");
    }

    #[test]
    fn challenge_shorter_than_counter_block_is_uniform_failure() {
        let result = decrypt_challenge(&[0u8; 15], &TEST_KEY);
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn empty_challenge_payload_decrypts_to_empty() {
        let ct = encrypt_challenge(b"", &TEST_KEY).expect("encrypt should succeed");
        let pt = decrypt_challenge(&ct, &TEST_KEY).expect("decrypt should succeed");
        assert!(pt.expose().is_empty());
    }
}
