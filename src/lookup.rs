//! Tracking and deduplication of in-flight lookups.
//!
//! A lookup is represented by a [`Promise`], a single-shot completion slot:
//! any number of clones may wait on it, the first completion wakes them all
//! and later completions are ignored. The [`LookupEngine`] maps every key
//! with an in-flight lookup to its promise, so concurrent requests for the
//! same key share a single operation on the wire.
//!
//! [`Promise`]: struct.Promise.html
//! [`LookupEngine`]: struct.LookupEngine.html

use crate::error::LookupError;
use crate::routing::identifier::{Identifier, NodeInfo};
use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A single-shot completion slot with any number of waiters
pub struct Promise<T> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    slot: Mutex<Option<T>>,
    completed: Condvar,
}

impl<T: Clone> Promise<T> {
    /// Creates an empty promise.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(None),
                completed: Condvar::new(),
            }),
        }
    }

    /// Completes the promise and wakes all waiters.
    ///
    /// Only the first completion takes effect; returns whether this call was
    /// the one that completed the promise.
    pub fn complete(&self, value: T) -> bool {
        let mut slot = self.inner.slot.lock();

        if slot.is_some() {
            return false;
        }

        *slot = Some(value);
        self.inner.completed.notify_all();

        true
    }

    /// Waits for the promise to complete.
    ///
    /// Returns `None` if the promise is still empty when the timeout
    /// expires.
    pub fn wait_for(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.inner.slot.lock();

        while slot.is_none() {
            if self
                .inner
                .completed
                .wait_until(&mut slot, deadline)
                .timed_out()
            {
                break;
            }
        }

        slot.clone()
    }
}

impl<T> Clone for Promise<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The shared handle for a lookup in flight
pub type LookupFuture = Promise<Result<NodeInfo, LookupError>>;

/// Bookkeeping of the lookups a node currently has in flight
///
/// At most one handle exists per key; checking for an existing handle and
/// installing a new one is a single atomic step.
pub struct LookupEngine {
    ongoing: Mutex<HashMap<Identifier, LookupFuture>>,
}

impl LookupEngine {
    pub fn new() -> Self {
        Self {
            ongoing: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the handle for a lookup of `key`.
    ///
    /// If a lookup for the key is already in flight its handle is shared.
    /// The second value reports whether the handle is new, in which case the
    /// caller is responsible for dispatching the lookup operation.
    pub fn begin(&self, key: Identifier) -> (LookupFuture, bool) {
        let mut ongoing = self.ongoing.lock();

        if let Some(existing) = ongoing.get(&key) {
            return (existing.clone(), false);
        }

        let future = LookupFuture::new();
        ongoing.insert(key, future.clone());

        (future, true)
    }

    /// Removes and returns the handle for `key`, if a lookup is in flight.
    pub fn take(&self, key: &Identifier) -> Option<LookupFuture> {
        self.ongoing.lock().remove(key)
    }

    /// Aborts the lookup for `key`.
    ///
    /// The handle is removed and every waiter sees a
    /// [`LookupError::KeyNotFound`].
    ///
    /// [`LookupError::KeyNotFound`]: ../error/enum.LookupError.html
    pub fn fail(&self, key: &Identifier) {
        if let Some(future) = self.take(key) {
            future.complete(Err(LookupError::KeyNotFound));
        }
    }

    /// Returns whether a lookup for `key` is currently in flight.
    pub fn is_ongoing(&self, key: &Identifier) -> bool {
        self.ongoing.lock().contains_key(key)
    }
}

impl Default for LookupEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn node(id: u64) -> NodeInfo {
        let addr = format!("127.0.0.1:{}", 42000 + id).parse().unwrap();

        NodeInfo::with_identifier(addr, Identifier::new(id))
    }

    #[test]
    fn promises_complete_only_once() {
        let promise = Promise::new();

        assert!(promise.complete(1));
        assert!(!promise.complete(2));

        assert_eq!(Some(1), promise.wait_for(Duration::from_millis(10)));
    }

    #[test]
    fn waiting_on_an_empty_promise_times_out() {
        let promise: Promise<u64> = Promise::new();

        assert_eq!(None, promise.wait_for(Duration::from_millis(10)));
    }

    #[test]
    fn all_clones_observe_the_completion() {
        let promise = Promise::new();
        let clone = promise.clone();

        let waiter = thread::spawn(move || clone.wait_for(Duration::from_secs(5)));

        promise.complete(7);

        assert_eq!(Some(7), waiter.join().unwrap());
    }

    #[test]
    fn concurrent_lookups_share_one_handle() {
        let engine = LookupEngine::new();
        let key = Identifier::new(6);

        let (first, created) = engine.begin(key);
        assert!(created);

        let (second, created) = engine.begin(key);
        assert!(!created);

        engine.take(&key).unwrap().complete(Ok(node(7)));

        assert_eq!(Some(Ok(node(7))), first.wait_for(Duration::from_millis(10)));
        assert_eq!(Some(Ok(node(7))), second.wait_for(Duration::from_millis(10)));
    }

    #[test]
    fn lookups_for_distinct_keys_are_independent() {
        let engine = LookupEngine::new();

        let (_, created) = engine.begin(Identifier::new(6));
        assert!(created);

        let (_, created) = engine.begin(Identifier::new(7));
        assert!(created);
    }

    #[test]
    fn failing_a_lookup_clears_it_and_reports_key_not_found() {
        let engine = LookupEngine::new();
        let key = Identifier::new(6);

        let (future, _) = engine.begin(key);
        engine.fail(&key);

        assert!(!engine.is_ongoing(&key));
        assert_eq!(
            Some(Err(LookupError::KeyNotFound)),
            future.wait_for(Duration::from_millis(10))
        );
    }

    #[test]
    fn failing_an_unknown_key_is_a_no_op() {
        let engine = LookupEngine::new();

        engine.fail(&Identifier::new(6));

        assert!(!engine.is_ongoing(&Identifier::new(6)));
    }
}
