//! Isolated key-derivation unit.
//!
//! Argon2 derivation is CPU- and memory-bound, so it never runs on the
//! caller's thread. [`Hasher`] owns a dedicated worker thread and talks
//! to it over a strict message protocol:
//!
//! - the load step happens exactly once, at [`Hasher::spawn`], and must
//!   be acknowledged before the handle is handed out;
//! - every request carries a monotonically increasing id that the worker
//!   echoes in its reply, so a stale reply (from a request the caller
//!   abandoned) can never be matched to the wrong derivation;
//! - at most one request may be in flight — a second concurrent call is
//!   a caller error and is rejected with [`HasherStatus::Busy`] rather
//!   than queued, because the protocol does not pipeline;
//! - once the channel is broken the unit is in an indeterminate state
//!   and the handle must be discarded and respawned, never reused.
//!
//! There is no shared mutable state with the worker: passwords go in by
//! value (zeroized worker-side after hashing) and keys come back as
//! [`SecretBuffer`]s.

use crate::error::{AuthError, HasherStatus};
use loquet_crypto_core::kdf::{self, HashParams};
use loquet_crypto_core::memory::SecretBuffer;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, TryLockError};
use std::thread;
use tracing::{debug, warn};
use zeroize::Zeroizing;

// ---------------------------------------------------------------------------
// Message protocol
// ---------------------------------------------------------------------------

/// Request sent to the worker thread.
struct DeriveRequest {
    id: u64,
    password: Zeroizing<Vec<u8>>,
    salt: Vec<u8>,
    params: HashParams,
}

/// Reply from the worker thread, correlated by request id.
struct DeriveReply {
    id: u64,
    result: Result<SecretBuffer, (HasherStatus, String)>,
}

/// Caller-side channel state. Held behind a `Mutex` so a second caller
/// hitting the unit mid-derivation gets a clean `Busy` rejection.
struct Channel {
    tx: Sender<DeriveRequest>,
    rx: Receiver<DeriveReply>,
    next_id: u64,
    /// Set once the channel breaks; the handle is then permanently dead.
    poisoned: bool,
}

// ---------------------------------------------------------------------------
// Hasher handle
// ---------------------------------------------------------------------------

/// Handle to the isolated derivation unit.
///
/// Dropping the handle closes the request channel and the worker thread
/// exits on its own.
pub struct Hasher {
    inner: Mutex<Channel>,
}

impl Hasher {
    /// Spawn the worker thread and complete its load step.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Derivation`] with [`HasherStatus::NotLoaded`]
    /// if the thread cannot be spawned or never acknowledges the load.
    pub fn spawn() -> Result<Self, AuthError> {
        let (req_tx, req_rx) = mpsc::channel::<DeriveRequest>();
        let (reply_tx, reply_rx) = mpsc::channel::<DeriveReply>();
        let (loaded_tx, loaded_rx) = mpsc::channel::<()>();

        thread::Builder::new()
            .name("loquet-hasher".into())
            .spawn(move || worker_loop(&req_rx, &reply_tx, &loaded_tx))
            .map_err(|e| AuthError::Derivation {
                status: HasherStatus::NotLoaded,
                detail: format!("failed to spawn derivation thread: {e}"),
            })?;

        // The load step must complete exactly once before any request.
        loaded_rx.recv().map_err(|_| AuthError::Derivation {
            status: HasherStatus::NotLoaded,
            detail: "derivation unit exited before load completed".into(),
        })?;
        debug!("derivation unit loaded");

        Ok(Self {
            inner: Mutex::new(Channel {
                tx: req_tx,
                rx: reply_rx,
                next_id: 1,
                poisoned: false,
            }),
        })
    }

    /// Derive a 256-bit key on the worker thread, blocking the caller
    /// until the unit replies.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Derivation`] with:
    /// - [`HasherStatus::Busy`] if another request is already in flight
    /// - [`HasherStatus::BadParams`] if the salt or cost parameters are
    ///   rejected
    /// - [`HasherStatus::Internal`] if the hash primitive fails
    /// - [`HasherStatus::NotLoaded`] if the unit is gone; discard this
    ///   handle and spawn a fresh one
    pub fn derive(
        &self,
        password: &[u8],
        salt: &[u8],
        params: &HashParams,
    ) -> Result<SecretBuffer, AuthError> {
        let mut channel = match self.inner.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                return Err(AuthError::Derivation {
                    status: HasherStatus::Busy,
                    detail: "a derivation request is already in flight on this unit".into(),
                });
            }
            // A caller panicked mid-request; the unit is indeterminate,
            // not merely busy.
            Err(TryLockError::Poisoned(_)) => {
                return Err(AuthError::Derivation {
                    status: HasherStatus::NotLoaded,
                    detail: "derivation unit poisoned by a panicked caller; \
                             discard this handle and spawn a fresh one"
                        .into(),
                });
            }
        };

        if channel.poisoned {
            return Err(AuthError::Derivation {
                status: HasherStatus::NotLoaded,
                detail: "derivation unit was discarded after a channel failure".into(),
            });
        }

        let id = channel.next_id;
        channel.next_id = channel.next_id.wrapping_add(1);

        let request = DeriveRequest {
            id,
            password: Zeroizing::new(password.to_vec()),
            salt: salt.to_vec(),
            params: params.clone(),
        };
        debug!(request_id = id, "derivation request dispatched");

        if channel.tx.send(request).is_err() {
            channel.poisoned = true;
            return Err(AuthError::Derivation {
                status: HasherStatus::NotLoaded,
                detail: "derivation unit is gone; spawn a new one".into(),
            });
        }

        loop {
            match channel.rx.recv() {
                Ok(reply) if reply.id == id => {
                    return reply.result.map_err(|(status, detail)| {
                        warn!(request_id = id, %status, "derivation request failed");
                        AuthError::Derivation { status, detail }
                    });
                }
                // Reply to a request an earlier caller abandoned; drop it
                // and keep waiting for ours.
                Ok(stale) => {
                    debug!(request_id = stale.id, "dropping stale derivation reply");
                }
                Err(_) => {
                    channel.poisoned = true;
                    return Err(AuthError::Derivation {
                        status: HasherStatus::NotLoaded,
                        detail: "derivation unit disconnected mid-request".into(),
                    });
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Worker side
// ---------------------------------------------------------------------------

fn worker_loop(
    requests: &Receiver<DeriveRequest>,
    replies: &Sender<DeriveReply>,
    loaded: &Sender<()>,
) {
    // Load acknowledgement. If the parent already gave up, exit quietly.
    if loaded.send(()).is_err() {
        return;
    }

    while let Ok(request) = requests.recv() {
        let result = run_request(&request);
        // `request.password` zeroizes here when the request drops.
        if replies.send(DeriveReply {
            id: request.id,
            result,
        })
        .is_err()
        {
            // Caller side hung up; nothing left to serve.
            return;
        }
    }
}

/// Serialized per unit: one request is fully hashed before the next is
/// read off the channel.
fn run_request(request: &DeriveRequest) -> Result<SecretBuffer, (HasherStatus, String)> {
    // Classify parameter rejection before committing to the hash, so the
    // caller can distinguish a bad request from a failing primitive.
    kdf::validate(&request.salt, &request.params)
        .map_err(|e| (HasherStatus::BadParams, e.to_string()))?;

    kdf::derive(&request.password, &request.salt, &request.params)
        .map_err(|e| (HasherStatus::Internal, e.to_string()))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
