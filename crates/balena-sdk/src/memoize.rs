// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Auth-scoped memoization of remote lookups.
//!
//! A [`MemoizeRegistry`] is owned by the composition root and produces any
//! number of [`Memoized`] functions. Every entry remembers the
//! [`CacheEpoch`] it was filled under; once the registry's epoch moves on
//! (explicit [`MemoizeRegistry::invalidate_all`] or an auth identity change)
//! all entries of all functions are stale at once.
//!
//! Concurrent calls with the same key share one in-flight future. A failed
//! fetch is delivered to every waiter and then evicted, so the next call
//! fetches again.

use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::watch;
use tracing::{debug, trace};

use crate::auth::AuthEpoch;
use crate::error::Result;

/// The pair of counters an entry must match to be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEpoch {
    pub manual: u64,
    pub auth: AuthEpoch,
}

/// Shared invalidation source for a family of memoized functions.
#[derive(Debug)]
pub struct MemoizeRegistry {
    manual: AtomicU64,
    auth: Option<watch::Receiver<AuthEpoch>>,
}

impl MemoizeRegistry {
    /// A registry that only invalidates on [`invalidate_all`](Self::invalidate_all).
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            manual: AtomicU64::new(0),
            auth: None,
        })
    }

    /// A registry that also invalidates whenever the auth epoch changes.
    pub fn with_auth(auth: watch::Receiver<AuthEpoch>) -> Arc<Self> {
        Arc::new(Self {
            manual: AtomicU64::new(0),
            auth: Some(auth),
        })
    }

    /// Current epoch.
    pub fn epoch(&self) -> CacheEpoch {
        CacheEpoch {
            manual: self.manual.load(Ordering::Acquire),
            auth: self
                .auth
                .as_ref()
                .map(|rx| *rx.borrow())
                .unwrap_or_default(),
        }
    }

    /// Make every entry of every function created by this registry stale.
    pub fn invalidate_all(&self) {
        self.manual.fetch_add(1, Ordering::AcqRel);
    }

    /// Wrap an async fetch keyed by `K`. Use a tuple for several arguments.
    pub fn memoize<K, V, F, Fut>(self: &Arc<Self>, fetch: F) -> Memoized<K, V>
    where
        K: Hash + Eq + Clone + Send + Sync + 'static,
        V: Clone + Send + Sync + 'static,
        F: Fn(K) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V>> + Send + 'static,
    {
        let fetch: Arc<FetchFn<K, V>> = Arc::new(move |key: K| fetch(key).boxed());
        Memoized {
            registry: Arc::clone(self),
            fetch,
            entries: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }
}

type SharedFetch<V> = Shared<BoxFuture<'static, Result<V>>>;
type FetchFn<K, V> = dyn Fn(K) -> BoxFuture<'static, Result<V>> + Send + Sync;

struct CacheEntry<V> {
    id: u64,
    epoch: CacheEpoch,
    future: SharedFetch<V>,
}

/// A memoized async function. See the module docs for the caching policy.
pub struct Memoized<K, V> {
    registry: Arc<MemoizeRegistry>,
    fetch: Arc<FetchFn<K, V>>,
    entries: DashMap<K, CacheEntry<V>>,
    next_id: AtomicU64,
}

impl<K, V> Memoized<K, V>
where
    K: Hash + Eq + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Return the cached value for `key`, joining an in-flight fetch or
    /// starting a new one as needed.
    pub async fn call(&self, key: K) -> Result<V> {
        let epoch = self.registry.epoch();

        // The shard lock is released before awaiting.
        let (id, future) = match self.entries.entry(key.clone()) {
            Entry::Occupied(slot) if slot.get().epoch == epoch => {
                trace!("Memoized hit");
                (slot.get().id, slot.get().future.clone())
            }
            slot => {
                debug!("Memoized miss");
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let future = (self.fetch)(key.clone()).shared();
                let entry = CacheEntry {
                    id,
                    epoch,
                    future: future.clone(),
                };
                match slot {
                    Entry::Occupied(mut occupied) => {
                        occupied.insert(entry);
                    }
                    Entry::Vacant(vacant) => {
                        vacant.insert(entry);
                    }
                }
                (id, future)
            }
        };

        let result = future.await;
        if result.is_err() {
            // Only evict the entry this call waited on; a newer one may exist.
            self.entries.remove_if(&key, |_, entry| entry.id == id);
        }
        result
    }

    /// Drop this function's entries only.
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Number of entries held, stale ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
