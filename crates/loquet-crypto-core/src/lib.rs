//! `loquet-crypto-core` — Pure cryptographic primitives for LOQUET.
//!
//! This crate is the audit target: zero network, zero async. It knows
//! nothing about the authentication protocol — it only derives keys,
//! seals and opens bytes, and custodies the master keypair. The protocol
//! lives in `loquet-auth`.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod error;
pub mod memory;

pub mod cipher;
pub mod custody;
pub mod kdf;

pub use cipher::{decrypt_challenge, encrypt_challenge, open, seal, SealedField};
pub use custody::{
    export_public_key, generate_keypair, import_public_key, unwrap_private_key, wrap_private_key,
    KeyKind, MasterKeypair, MasterPrivateKey, MasterPublicKey,
};
pub use error::CryptoError;
pub use kdf::{derive, generate_salt, validate, HashAlgorithm, HashParams, KEY_LEN};
pub use memory::{LockedRegion, SecretBuffer};
