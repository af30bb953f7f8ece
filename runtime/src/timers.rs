//! Keyed one-shot timers that can be canceled individually or all at once.
//!
//! Each scheduled timer is a tokio task racing a sleep against its own
//! [`CancellationToken`]. Tokens are children of a registry-wide root token, so
//! [`TimerRegistry::shutdown`] stops every pending timer deterministically.
//!
//! At most one timer exists per key. Scheduling a key that already has a
//! timer replaces it; the replaced timer is canceled if it has not fired yet.
//! A timer that fires may schedule its own key again, which is how retry
//! chains are built.

use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

struct TimerEntry {
    id: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

struct Inner<K> {
    timers: Mutex<HashMap<K, TimerEntry>>,
    next_id: AtomicU64,
    root: CancellationToken,
    gauge: &'static str,
}

impl<K: Eq + Hash> Inner<K> {
    fn remove_if_current(&self, key: &K, id: u64) {
        let mut timers = self.timers.lock().unwrap_or_else(PoisonError::into_inner);
        if timers.get(key).is_some_and(|entry| entry.id == id) {
            timers.remove(key);
        }
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(self.gauge).set(timers.len() as f64);
    }
}

/// Registry of keyed, individually cancelable one-shot timers.
pub struct TimerRegistry<K> {
    inner: Arc<Inner<K>>,
}

impl<K> Clone for TimerRegistry<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<K> TimerRegistry<K>
where
    K: Eq + Hash + Clone + Debug + Send + Sync + 'static,
{
    /// Create an empty registry reporting its size to the `gauge` metric.
    #[must_use]
    pub fn new(gauge: &'static str) -> Self {
        Self {
            inner: Arc::new(Inner {
                timers: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                root: CancellationToken::new(),
                gauge,
            }),
        }
    }

    /// Run `task` once after `delay` unless the timer is canceled first.
    ///
    /// Replaces any timer already registered for `key`. Returns `false` (and
    /// drops `task`) when the registry has been shut down.
    pub fn schedule<F>(&self, key: K, delay: Duration, task: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.inner.root.is_cancelled() {
            debug!(?key, "Timer registry shut down, not scheduling");
            return false;
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let token = self.inner.root.child_token();

        // Held across the spawn so the task cannot deregister before it is registered.
        let mut timers = self
            .inner
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let inner = Arc::clone(&self.inner);
        let task_token = token.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                () = task_token.cancelled() => {
                    debug!(key = ?task_key, "Timer canceled before firing");
                }
                () = tokio::time::sleep(delay) => {
                    task.await;
                }
            }
            inner.remove_if_current(&task_key, id);
        });

        if let Some(previous) = timers.insert(key, TimerEntry { id, token, handle }) {
            previous.token.cancel();
        }

        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(self.inner.gauge).set(timers.len() as f64);
        true
    }

    /// Cancel the timer registered for `key`.
    ///
    /// Returns `true` if a timer was registered. A timer whose task is already
    /// running is not interrupted; only its pending sleep is.
    pub fn cancel(&self, key: &K) -> bool {
        let mut timers = self
            .inner
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let removed = timers.remove(key);
        #[allow(clippy::cast_precision_loss)]
        metrics::gauge!(self.inner.gauge).set(timers.len() as f64);
        drop(timers);

        removed.is_some_and(|entry| {
            entry.token.cancel();
            true
        })
    }

    /// Whether a timer is registered for `key`.
    #[must_use]
    pub fn is_scheduled(&self, key: &K) -> bool {
        self.inner
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key)
    }

    /// Number of registered timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no timers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether [`shutdown`](Self::shutdown) has been called.
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.inner.root.is_cancelled()
    }

    /// Cancel every timer, refuse new ones, and wait for running tasks.
    ///
    /// Each task gets `timeout` to finish; stragglers are aborted. Returns
    /// the number of timers that were registered.
    pub async fn shutdown(&self, timeout: Duration) -> usize {
        self.inner.root.cancel();

        let entries: Vec<(K, TimerEntry)> = self
            .inner
            .timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();
        metrics::gauge!(self.inner.gauge).set(0.0);

        let count = entries.len();
        for (key, entry) in entries {
            let abort = entry.handle.abort_handle();
            match tokio::time::timeout(timeout, entry.handle).await {
                Ok(Ok(())) => debug!(?key, "Timer stopped"),
                Ok(Err(e)) => warn!(?key, error = %e, "Timer task failed"),
                Err(_) => {
                    warn!(?key, "Timer shutdown timed out, aborting");
                    abort.abort();
                }
            }
        }
        count
    }
}
