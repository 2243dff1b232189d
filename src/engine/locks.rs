//! Per-(account, symbol) advisory try-locks
//!
//! Try-then-skip semantics: a contending tick returns immediately instead
//! of queueing. Two independent instances guard entries and ladder
//! advances.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

/// A set of held (account, symbol) keys with non-blocking acquisition
#[derive(Default)]
pub struct KeyedTryLocks {
    held: Mutex<HashSet<(String, String)>>,
}

impl KeyedTryLocks {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Acquire the key if free; `None` when another holder is active.
    /// The guard releases on drop.
    pub fn try_acquire(self: &Arc<Self>, account: &str, symbol: &str) -> Option<KeyGuard> {
        let key = (account.to_string(), symbol.to_string());
        let mut held = self.held.lock().expect("lock set poisoned");
        if held.insert(key.clone()) {
            Some(KeyGuard {
                locks: Arc::clone(self),
                key,
            })
        } else {
            None
        }
    }

    #[cfg(test)]
    fn is_held(&self, account: &str, symbol: &str) -> bool {
        let held = self.held.lock().unwrap();
        held.contains(&(account.to_string(), symbol.to_string()))
    }
}

/// Releases its key when dropped
pub struct KeyGuard {
    locks: Arc<KeyedTryLocks>,
    key: (String, String),
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        let mut held = self.locks.held.lock().expect("lock set poisoned");
        held.remove(&self.key);
    }
}

/// Parking space for guards that must outlive the function that acquired
/// them.
///
/// The entry lock is held from `armed → entering` until the position
/// either opens or rolls back. The open transition happens asynchronously
/// on the user stream, so the entry engine stashes its guard here and the
/// reconciler releases it when the exchange settles the outcome.
#[derive(Default)]
pub struct HeldGuards {
    inner: Mutex<HashMap<(String, String), KeyGuard>>,
}

impl HeldGuards {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Park a guard under its key, keeping the lock held.
    ///
    /// No entry can already exist for the key: acquiring the guard being
    /// parked required the lock to be free, which means nothing was parked.
    pub fn stash(&self, account: &str, symbol: &str, guard: KeyGuard) {
        let mut inner = self.inner.lock().expect("guard map poisoned");
        inner.insert((account.to_string(), symbol.to_string()), guard);
    }

    /// Drop the parked guard for a key, releasing the lock. No-op when
    /// nothing is parked.
    pub fn release(&self, account: &str, symbol: &str) {
        let mut inner = self.inner.lock().expect("guard map poisoned");
        inner.remove(&(account.to_string(), symbol.to_string()));
    }
}
