//! `loquet-auth` — password-derived challenge-response authentication and
//! master-key custody for LOQUET.
//!
//! The password never crosses the wire. Registration uploads a derived
//! verifier; login proves possession by decrypting a server-issued
//! challenge; the long-lived master keypair travels only wrapped under a
//! second, independently salted derivation. Cryptographic primitives live
//! in `loquet-crypto-core`; this crate owns the protocol, the isolated
//! derivation worker, and the session state.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod api;
pub mod error;
pub mod hasher;
pub mod keys;
pub mod login;
pub mod register;
pub mod session;

pub use api::{
    ApiFailure, AuthTransport, Challenge, ChallengeRequest, KeysRecord, RegisterRequest,
    SessionGrant, SolvedChallenge,
};
pub use error::{AuthError, HasherStatus};
pub use hasher::Hasher;
pub use keys::KeyCustodian;
pub use login::{AuthKeySource, AuthState, Authenticator};
pub use register::{Registrar, RegistrationOutcome};
pub use session::{Session, SessionContext};
