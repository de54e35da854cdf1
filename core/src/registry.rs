//! In-flight request registry.
//!
//! # Design
//! The registry maps a `RequestKey` to the shared future of the call that is
//! currently in flight for it. It is an explicit context object: each
//! `StudioClient` gets one, and clients that should de-duplicate against each
//! other are built with clones of the same registry.
//!
//! The lock is only taken for synchronous map operations and is never held
//! across an await point.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use futures::future::{AbortHandle, BoxFuture, Shared};

use crate::error::ApiError;
use crate::http::HttpResponse;
use crate::key::RequestKey;

/// Settled result every waiter of a call observes.
pub type SharedResponse = Shared<BoxFuture<'static, Result<HttpResponse, ApiError>>>;

/// One dispatched call: its shared result and the handle that aborts it.
///
/// Clones share the waiter count. A new entry starts with one waiter, the
/// handle that dispatched it.
#[derive(Clone)]
pub struct PendingEntry {
    pub(crate) id: u64,
    pub(crate) response: SharedResponse,
    pub(crate) abort: AbortHandle,
    waiters: Arc<AtomicUsize>,
}

impl PendingEntry {
    pub fn new(id: u64, response: SharedResponse, abort: AbortHandle) -> Self {
        Self {
            id,
            response,
            abort,
            waiters: Arc::new(AtomicUsize::new(1)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Handles currently waiting on this call.
    pub fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }
}

impl fmt::Debug for PendingEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingEntry")
            .field("id", &self.id)
            .field("waiters", &self.waiters())
            .field("aborted", &self.abort.is_aborted())
            .finish()
    }
}

#[derive(Default)]
struct Inner {
    entries: HashMap<RequestKey, PendingEntry>,
    next_id: u64,
}

#[derive(Clone, Default)]
pub struct PendingRegistry {
    inner: Arc<Mutex<Inner>>,
}

impl PendingRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `entry` under `key`, replacing any previous entry.
    pub fn register(&self, key: RequestKey, entry: PendingEntry) {
        self.lock().entries.insert(key, entry);
    }

    pub fn lookup(&self, key: &RequestKey) -> Option<PendingEntry> {
        self.lock().entries.get(key).cloned()
    }

    /// Returns whether an entry was present.
    pub fn remove(&self, key: &RequestKey) -> bool {
        self.lock().entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.lock().entries.clear();
    }

    pub fn contains(&self, key: &RequestKey) -> bool {
        self.lock().entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up `key` and count the caller as one more waiter on it.
    pub(crate) fn join(&self, key: &RequestKey) -> Option<PendingEntry> {
        let inner = self.lock();
        let entry = inner.entries.get(key)?;
        entry.waiters.fetch_add(1, Ordering::SeqCst);
        Some(entry.clone())
    }

    /// Drop one waiter from `entry`. Returns true when it was the last one,
    /// in which case the entry is also removed if it is still current.
    pub(crate) fn release(&self, key: &RequestKey, entry: &PendingEntry) -> bool {
        let mut inner = self.lock();
        if entry.waiters.fetch_sub(1, Ordering::SeqCst) != 1 {
            return false;
        }
        if inner.entries.get(key).is_some_and(|current| current.id == entry.id) {
            inner.entries.remove(key);
        }
        true
    }

    pub(crate) fn next_id(&self) -> u64 {
        let mut inner = self.lock();
        inner.next_id += 1;
        inner.next_id
    }

    /// Remove `key` only while it still maps to the entry with `id`.
    pub(crate) fn remove_if_current(&self, key: &RequestKey, id: u64) -> bool {
        remove_if_current(&self.inner, key, id)
    }

    pub(crate) fn downgrade(&self) -> WeakRegistry {
        WeakRegistry(Arc::downgrade(&self.inner))
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        lock(&self.inner)
    }
}

impl fmt::Debug for PendingRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("PendingRegistry")
            .field("keys", &inner.entries.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Handle held by an in-flight call so that finishing does not keep the
/// registry alive.
#[derive(Clone)]
pub(crate) struct WeakRegistry(Weak<Mutex<Inner>>);

impl WeakRegistry {
    pub(crate) fn remove_if_current(&self, key: &RequestKey, id: u64) -> bool {
        match self.0.upgrade() {
            Some(inner) => remove_if_current(&inner, key, id),
            None => false,
        }
    }
}

fn remove_if_current(inner: &Mutex<Inner>, key: &RequestKey, id: u64) -> bool {
    let mut inner = lock(inner);
    if inner.entries.get(key).is_some_and(|entry| entry.id == id) {
        inner.entries.remove(key);
        true
    } else {
        false
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    // No invariant spans more than one map operation, so a poisoned map is
    // still consistent.
    inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
