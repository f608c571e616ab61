//! Cryptographic error types for `loquet-crypto-core`.

use thiserror::Error;

/// Errors produced by cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key derivation failed (Argon2 parameter validation, salt length,
    /// memory allocation).
    #[error("key derivation failed: {0}")]
    KeyDerivation(String),

    /// Symmetric encryption failure or malformed ciphertext container.
    #[error("encryption error: {0}")]
    Encryption(String),

    /// Decryption failed. Deliberately carries no cause: a tag mismatch,
    /// a wrong key, and a truncated challenge all surface identically so
    /// callers cannot be turned into a padding/format oracle.
    #[error("decryption failed")]
    Decryption,

    /// Asymmetric keypair generation, encoding, or decoding failure.
    #[error("keypair error: {0}")]
    Keypair(String),

    /// Invalid key material (wrong length, corrupted bytes).
    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(String),

    /// Secure memory allocation or CSPRNG failure.
    #[error("secure memory error: {0}")]
    SecureMemory(String),
}
