//! Session and credential cache.
//!
//! All process-wide authentication state lives in one explicitly owned
//! [`SessionContext`] — there are no ambient globals. It is written only
//! by successful authentication/registration (the session) and key
//! custody (the unwrapped keypair), and cleared only by [`logout`].
//! Readers treat the contents as immutable snapshots.
//!
//! [`logout`]: SessionContext::logout

use loquet_crypto_core::custody::{MasterPrivateKey, MasterPublicKey};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Server-issued session credential plus local identity.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque session token, sent back on authenticated requests.
    pub token: String,
    /// Server-assigned user identifier.
    #[serde(rename = "userId")]
    pub user_id: String,
}

/// The unwrapped master keypair, cached for one user for one session.
struct CachedKeypair {
    user_id: String,
    public: MasterPublicKey,
    private: MasterPrivateKey,
}

/// Owned session state: `None` everywhere means logged out.
///
/// The plaintext private key is cache-only. It enters via
/// [`SessionContext::cache_keypair`] after an unwrap (or a fresh
/// generation during registration) and leaves memory on logout, when the
/// `rsa` key type zeroizes itself on drop.
#[derive(Default)]
pub struct SessionContext {
    session: Option<Session>,
    keypair: Option<CachedKeypair>,
}

impl SessionContext {
    /// Fresh, logged-out context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the session after a successful authentication or
    /// registration. Replaces any previous session; a keypair cached for
    /// a different user is evicted.
    pub fn establish(&mut self, session: Session) {
        if self
            .keypair
            .as_ref()
            .is_some_and(|cached| cached.user_id != session.user_id)
        {
            self.keypair = None;
        }
        debug!(user_id = %session.user_id, "session established");
        self.session = Some(session);
    }

    /// The active session, if any.
    #[must_use]
    pub const fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    /// Whether a session is active.
    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }

    /// Cache the unwrapped master keypair for `user_id`. The private key
    /// is never sent anywhere from here — it is only read back through
    /// [`SessionContext::keypair_for`].
    pub fn cache_keypair(
        &mut self,
        user_id: impl Into<String>,
        public: MasterPublicKey,
        private: MasterPrivateKey,
    ) {
        let user_id = user_id.into();
        debug!(%user_id, "master keypair cached");
        self.keypair = Some(CachedKeypair {
            user_id,
            public,
            private,
        });
    }

    /// The cached keypair for `user_id`, if present.
    #[must_use]
    pub fn keypair_for(&self, user_id: &str) -> Option<(&MasterPublicKey, &MasterPrivateKey)> {
        self.keypair
            .as_ref()
            .filter(|cached| cached.user_id == user_id)
            .map(|cached| (&cached.public, &cached.private))
    }

    /// Tear down: drop the session and the cached keypair. The private
    /// key material zeroizes as it drops.
    pub fn logout(&mut self) {
        debug!("session torn down");
        self.session = None;
        self.keypair = None;
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
