// src/coordinator.rs

//! Global exclusive lock with broadcast wake-up
//!
//! A monitor: the holder lives behind a mutex, and callers that find the lock
//! taken park on a condition variable until a release wakes them. Every
//! release wakes *all* parked callers; each re-checks the holder and exactly
//! one of them takes the lock while the rest park again.
//!
//! ```text
//!            Acquire(id)                Release(id)
//!   Unheld ─────────────► HeldBy(id) ─────────────► Unheld
//!                           │    ▲
//!                           └────┘ Release(other) -> NotHolder, no change
//! ```
//!
//! Acquire has no timeout. A holder that never releases blocks every other
//! caller forever; clients are trusted to release.

use crate::error::{Error, Result};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

/// Opaque caller identity supplied on every lock and append call
pub type ClientId = i32;

/// Ownership state of the global lock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LockState {
    /// Nobody holds the lock
    #[default]
    Unheld,
    /// Held by the given client
    HeldBy(ClientId),
}

impl LockState {
    /// Current holder, if any
    pub fn holder(&self) -> Option<ClientId> {
        match self {
            LockState::Unheld => None,
            LockState::HeldBy(id) => Some(*id),
        }
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: LockState,
    /// Callers currently parked in `acquire`
    waiting: usize,
}

/// The single global lock
///
/// Shared between handlers through an `Arc`. Never persisted: a restart
/// always begins `Unheld`.
#[derive(Debug, Default)]
pub struct LockCoordinator {
    inner: Mutex<Inner>,
    freed: Condvar,
}

impl LockCoordinator {
    /// Create an unheld lock
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until the lock is free, then take it for `client_id`
    ///
    /// Never fails. A client that already holds the lock and calls this again
    /// blocks until it is released, like any other caller.
    pub fn acquire(&self, client_id: ClientId) {
        let mut inner = self.inner.lock();

        if inner.state != LockState::Unheld {
            debug!(
                "Client {} waiting for lock held by {:?}",
                client_id,
                inner.state.holder()
            );
            inner.waiting += 1;
            while inner.state != LockState::Unheld {
                self.freed.wait(&mut inner);
            }
            inner.waiting -= 1;
        }

        inner.state = LockState::HeldBy(client_id);
        debug!("Lock granted to client {}", client_id);
    }

    /// Take the lock for `client_id` only if it is free right now
    ///
    /// Never parks. Returns whether the lock was granted.
    pub fn try_acquire(&self, client_id: ClientId) -> bool {
        let mut inner = self.inner.lock();
        if inner.state != LockState::Unheld {
            return false;
        }

        inner.state = LockState::HeldBy(client_id);
        debug!("Lock granted to client {}", client_id);
        true
    }

    /// Release the lock held by `client_id` and wake every waiter
    ///
    /// Returns `Error::NotHolder` without touching state when `client_id` is
    /// not the holder, including when the lock is unheld.
    pub fn release(&self, client_id: ClientId) -> Result<()> {
        let mut inner = self.inner.lock();

        if inner.state != LockState::HeldBy(client_id) {
            warn!(
                "Rejected release by client {} (holder: {:?})",
                client_id,
                inner.state.holder()
            );
            return Err(Error::NotHolder { client_id });
        }

        inner.state = LockState::Unheld;
        let waiters = inner.waiting;
        drop(inner);

        self.freed.notify_all();
        debug!("Lock released by client {}, woke {} waiter(s)", client_id, waiters);
        Ok(())
    }

    /// Snapshot of the current state
    pub fn state(&self) -> LockState {
        self.inner.lock().state
    }

    /// Snapshot of the current holder
    pub fn holder(&self) -> Option<ClientId> {
        self.state().holder()
    }

    /// Whether `client_id` holds the lock right now
    pub fn is_held_by(&self, client_id: ClientId) -> bool {
        self.state() == LockState::HeldBy(client_id)
    }

    /// Number of callers parked in `acquire`
    pub fn waiting(&self) -> usize {
        self.inner.lock().waiting
    }
}
