//! Thread-safe read-mostly cache.
//!
//! [`ConcurrentCache`] fronts expensive, repeatable lookups. It never holds
//! authoritative state: dropping or clearing it only costs recomputation.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use tracing::warn;

enum Command<K, V> {
    Set(K, V),
    Barrier(mpsc::Sender<()>),
}

/// Key/value cache with parallel readers and one writer at a time.
///
/// Synchronous writes ([`set`](Self::set)) are visible to every thread as soon
/// as they return. Deferred writes ([`set_async`](Self::set_async)) are applied
/// in order by a background writer thread started on first use.
pub struct ConcurrentCache<K, V> {
    entries: Arc<RwLock<HashMap<K, V>>>,
    writer: OnceCell<mpsc::Sender<Command<K, V>>>,
}

impl<K, V> Default for ConcurrentCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> std::fmt::Debug for ConcurrentCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentCache")
            .field("len", &self.entries.read().len())
            .finish_non_exhaustive()
    }
}

impl<K, V> ConcurrentCache<K, V>
where
    K: Eq + Hash + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Creates an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            writer: OnceCell::new(),
        }
    }

    /// Returns the value of the most recently completed write for `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    /// Stores `value`; visible to every subsequent `get` once this returns.
    pub fn set(&self, key: K, value: V) {
        self.entries.write().insert(key, value);
    }

    /// Queues `value` for the background writer and returns immediately.
    ///
    /// Falls back to a synchronous write if the writer thread is unavailable.
    pub fn set_async(&self, key: K, value: V) {
        let Some(writer) = self.writer() else {
            self.set(key, value);
            return;
        };
        if let Err(mpsc::SendError(Command::Set(key, value))) =
            writer.send(Command::Set(key, value))
        {
            self.set(key, value);
        }
    }

    /// Blocks until every write queued by [`set_async`](Self::set_async)
    /// before this call has been applied.
    pub fn sync(&self) {
        let Some(writer) = self.writer.get() else {
            return;
        };
        let (ack_tx, ack_rx) = mpsc::channel();
        if writer.send(Command::Barrier(ack_tx)).is_ok() {
            let _ = ack_rx.recv();
        }
    }

    /// Removes one entry, returning it.
    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.write().remove(key)
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    /// Number of cached entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns true if nothing is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Returns the cached value for `key`, computing and storing it with
    /// `init` on a miss. Concurrent callers for the same key observe a single
    /// stored value.
    ///
    /// # Errors
    ///
    /// Propagates the error from `init`; nothing is cached in that case.
    pub fn get_or_try_insert_with<E>(
        &self,
        key: K,
        init: impl FnOnce() -> Result<V, E>,
    ) -> Result<V, E> {
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }

        let mut entries = self.entries.write();
        if let Some(value) = entries.get(&key) {
            return Ok(value.clone());
        }
        let value = init()?;
        entries.insert(key, value.clone());
        Ok(value)
    }

    fn writer(&self) -> Option<&mpsc::Sender<Command<K, V>>> {
        self.writer
            .get_or_try_init(|| {
                let (tx, rx) = mpsc::channel::<Command<K, V>>();
                let entries = Arc::clone(&self.entries);
                thread::Builder::new()
                    .name("logkeep-cache-writer".to_string())
                    .spawn(move || {
                        for command in rx {
                            match command {
                                Command::Set(key, value) => {
                                    entries.write().insert(key, value);
                                }
                                Command::Barrier(ack) => {
                                    let _ = ack.send(());
                                }
                            }
                        }
                    })
                    .map(|_| tx)
            })
            .map_err(|e| warn!(error = %e, "failed to start cache writer thread"))
            .ok()
    }
}
