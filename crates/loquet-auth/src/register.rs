//! Registration orchestrator.
//!
//! Bootstraps a new account in three movements, prompting for the
//! password exactly once:
//!
//! 1. derive an authentication key from a fresh client-generated salt and
//!    submit `salt || authKey` as the account verifier;
//! 2. complete a login round *reusing* that key (the server will issue a
//!    challenge under the salt just registered, so no re-derivation and
//!    no re-prompt);
//! 3. generate the master keypair and upload it wrapped under a temp key
//!    derived with a second, distinct salt.
//!
//! The orchestrator *uses* an [`Authenticator`] and a [`KeyCustodian`] —
//! registration performs a subset of the login protocol, it is not a kind
//! of login, so this is composition rather than inheritance of flows.

use crate::api::{encode_field, AuthTransport, RegisterRequest};
use crate::error::AuthError;
use crate::hasher::Hasher;
use crate::keys::KeyCustodian;
use crate::login::Authenticator;
use crate::session::{Session, SessionContext};
use loquet_crypto_core::custody::KeyKind;
use loquet_crypto_core::kdf::{self, HashParams};
use tracing::debug;
use zeroize::Zeroizing;

/// What a completed registration leaves behind (besides the session and
/// cached keypair in the context).
#[derive(Debug)]
pub struct RegistrationOutcome {
    /// The granted session (also installed in the context).
    pub session: Session,
    /// The authentication salt registered with the server. Public.
    pub auth_salt: Vec<u8>,
}

/// Drives account bootstrap.
pub struct Registrar<'a> {
    transport: &'a dyn AuthTransport,
    hasher: &'a Hasher,
}

impl<'a> Registrar<'a> {
    /// New registrar over the given transport and derivation unit.
    #[must_use]
    pub const fn new(transport: &'a dyn AuthTransport, hasher: &'a Hasher) -> Self {
        Self { transport, hasher }
    }

    /// Create the account, log in, and upload the master keypair.
    ///
    /// `kind` selects the master-key algorithm ([`KeyKind::default`] is
    /// RSA-4096). The client is authoritative for `params` here —
    /// [`HashParams::recommended`] unless the caller has reason to
    /// differ — and both derivations of this flow share them but use
    /// different salts.
    ///
    /// # Errors
    ///
    /// Per the protocol taxonomy; no step is retried. A failure after the
    /// account was created leaves the context authenticated but without
    /// an uploaded keypair — the caller decides whether to re-run the
    /// custody step.
    pub fn register(
        &self,
        ctx: &mut SessionContext,
        email: &str,
        password: &str,
        params: &HashParams,
        kind: KeyKind,
    ) -> Result<RegistrationOutcome, AuthError> {
        // One derivation serves both the verifier upload and the login
        // round below.
        let auth_salt = kdf::generate_salt(params)?;
        let auth_key = self
            .hasher
            .derive(password.as_bytes(), &auth_salt, params)?;

        // The verifier the server stores: salt || key, never the password.
        // Zeroizing because it embeds the auth key.
        let mut verifier = Zeroizing::new(Vec::with_capacity(
            auth_salt.len().saturating_add(auth_key.len()),
        ));
        verifier.extend_from_slice(&auth_salt);
        verifier.extend_from_slice(auth_key.expose());

        let request = RegisterRequest {
            email: email.to_owned(),
            key: encode_field(&verifier),
            hash_params: params.clone(),
        };
        let grant = self
            .transport
            .register(&request)
            .map_err(AuthError::from)?;
        debug!(user_id = %grant.id, "account created");

        ctx.establish(Session {
            token: grant.csrf_token,
            user_id: grant.id,
        });

        // Complete the login round with the key we already hold.
        let mut authenticator = Authenticator::new(self.transport, self.hasher);
        let session = authenticator.login_with_key(ctx, email, &auth_key, None)?;

        // Master keypair, wrapped under its own salt (never auth_salt).
        KeyCustodian::new(self.transport, self.hasher).generate_and_upload(
            ctx,
            password,
            params,
            &auth_salt,
            kind,
        )?;

        Ok(RegistrationOutcome { session, auth_salt })
    }
}
