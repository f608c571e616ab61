#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects, dead_code)]

//! In-memory directory server double.
//!
//! Behaves the way the real server does at the interface: stores the
//! registered `salt || authKey` verifier, issues AES-CTR challenges
//! encrypted under the stored key, compares submitted plaintexts, and
//! signals second-factor (412) and bad-credential (401) conditions with
//! the documented statuses. It never sees a password.

use std::cell::RefCell;
use std::collections::HashMap;

use loquet_auth::api::{
    encode_field, ApiFailure, AuthTransport, Challenge, ChallengeRequest, KeysRecord,
    RegisterRequest, SessionGrant, SolvedChallenge,
};
use loquet_auth::session::Session;
use loquet_crypto_core::cipher::encrypt_challenge;
use loquet_crypto_core::kdf::{self, HashAlgorithm, HashParams};
use rand::rngs::OsRng;
use rand::RngCore;

use data_encoding::BASE64;

/// Fast parameters for tests that pre-provision accounts directly.
pub const TEST_PARAMS: HashParams = HashParams {
    algorithm: HashAlgorithm::Argon2i,
    t_cost: 1,
    m_cost: 32,
    p_cost: 1,
    salt_len: 16,
};

struct Account {
    user_id: String,
    salt: Vec<u8>,
    auth_key: Vec<u8>,
    params: HashParams,
    totp: Option<String>,
}

struct PendingChallenge {
    email: String,
    expected: Vec<u8>,
}

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    pending: HashMap<String, PendingChallenge>,
    /// token -> user id, for session-credential validation.
    tokens: HashMap<String, String>,
    /// user id -> stored keypair record.
    keys: HashMap<String, KeysRecord>,
    counter: u64,
}

#[derive(Default)]
pub struct MockDirectory {
    state: RefCell<State>,
}

impl MockDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision an account server-side, the way a prior registration
    /// would have: derive the auth key here (the "server's copy") and
    /// store it with its salt and parameters.
    pub fn add_account(&self, email: &str, password: &str, totp: Option<&str>) {
        let salt = kdf::generate_salt(&TEST_PARAMS).expect("salt generation should succeed");
        let auth_key = kdf::derive(password.as_bytes(), &salt, &TEST_PARAMS)
            .expect("derive should succeed");
        let mut state = self.state.borrow_mut();
        let user_id = format!("user-{}", state.next());
        state.accounts.insert(
            email.to_owned(),
            Account {
                user_id,
                salt,
                auth_key: auth_key.expose().to_vec(),
                params: TEST_PARAMS,
                totp: totp.map(ToOwned::to_owned),
            },
        );
    }

    /// The authentication salt the server holds for `email`.
    pub fn auth_salt_of(&self, email: &str) -> Vec<u8> {
        self.state.borrow().accounts[email].salt.clone()
    }

    /// The stored keypair record for a user, if one was uploaded.
    pub fn stored_keys(&self, user_id: &str) -> Option<KeysRecord> {
        self.state.borrow().keys.get(user_id).cloned()
    }

    fn check_session(state: &State, session: &Session) -> Result<String, ApiFailure> {
        match state.tokens.get(&session.token) {
            Some(user_id) if *user_id == session.user_id => Ok(user_id.clone()),
            _ => Err(ApiFailure::status(403, "invalid session credential")),
        }
    }
}

impl State {
    fn next(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }

    fn grant_for(&mut self, user_id: &str) -> SessionGrant {
        let token = format!("csrf-{}", self.next());
        self.tokens.insert(token.clone(), user_id.to_owned());
        SessionGrant {
            id: user_id.to_owned(),
            csrf_token: token,
        }
    }
}

impl AuthTransport for MockDirectory {
    fn request_challenge(&self, request: &ChallengeRequest) -> Result<Challenge, ApiFailure> {
        let mut state = self.state.borrow_mut();
        let (auth_key, salt, params) = {
            let account = state
                .accounts
                .get(&request.email)
                .ok_or_else(|| ApiFailure::status(404, "no such account"))?;

            if let Some(expected_code) = &account.totp {
                if request.totp.as_ref() != Some(expected_code) {
                    return Err(ApiFailure::status(412, "second factor required"));
                }
            }
            (
                account.auth_key.clone(),
                account.salt.clone(),
                account.params.clone(),
            )
        };

        let mut expected = vec![0u8; 32];
        OsRng.fill_bytes(&mut expected);
        let ciphertext =
            encrypt_challenge(&expected, &auth_key).expect("challenge encryption should succeed");

        let id = format!("challenge-{}", state.next());
        state.pending.insert(
            id.clone(),
            PendingChallenge {
                email: request.email.clone(),
                expected,
            },
        );
        Ok(Challenge {
            id,
            data: encode_field(&ciphertext),
            salt: encode_field(&salt),
            hash_params: params,
        })
    }

    fn submit_challenge(
        &self,
        challenge_id: &str,
        solved: &SolvedChallenge,
    ) -> Result<SessionGrant, ApiFailure> {
        let mut state = self.state.borrow_mut();
        let pending = state
            .pending
            .remove(challenge_id)
            .ok_or_else(|| ApiFailure::status(404, "unknown challenge"))?;

        let submitted = BASE64
            .decode(solved.data.as_bytes())
            .map_err(|_| ApiFailure::status(400, "malformed submission"))?;
        if submitted != pending.expected {
            return Err(ApiFailure::status(401, "invalid credentials"));
        }

        let user_id = state.accounts[&pending.email].user_id.clone();
        Ok(state.grant_for(&user_id))
    }

    fn register(&self, request: &RegisterRequest) -> Result<SessionGrant, ApiFailure> {
        let mut state = self.state.borrow_mut();
        if state.accounts.contains_key(&request.email) {
            return Err(ApiFailure::status(400, "account already exists"));
        }

        let verifier = BASE64
            .decode(request.key.as_bytes())
            .map_err(|_| ApiFailure::status(400, "malformed key"))?;
        let salt_len = request.hash_params.salt_len as usize;
        if verifier.len() <= salt_len {
            return Err(ApiFailure::status(400, "verifier too short"));
        }
        let (salt, auth_key) = verifier.split_at(salt_len);

        let user_id = format!("user-{}", state.next());
        state.accounts.insert(
            request.email.clone(),
            Account {
                user_id: user_id.clone(),
                salt: salt.to_vec(),
                auth_key: auth_key.to_vec(),
                params: request.hash_params.clone(),
                totp: None,
            },
        );
        Ok(state.grant_for(&user_id))
    }

    fn fetch_keys(&self, session: &Session) -> Result<KeysRecord, ApiFailure> {
        let state = self.state.borrow();
        let user_id = Self::check_session(&state, session)?;
        state
            .keys
            .get(&user_id)
            .cloned()
            .ok_or_else(|| ApiFailure::status(404, "no keys stored"))
    }

    fn store_keys(&self, session: &Session, record: &KeysRecord) -> Result<(), ApiFailure> {
        let mut state = self.state.borrow_mut();
        let user_id = Self::check_session(&state, session)?;
        state.keys.insert(user_id, record.clone());
        Ok(())
    }
}
