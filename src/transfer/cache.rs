// CLASSIFICATION: COMMUNITY
// Filename: cache.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-18

//! Bounded LRU cache of open file handles with passive TTL expiry.
//!
//! An entry untouched for longer than the TTL is treated as absent and is
//! dropped (closing its handle) the next time it is looked up. There is no
//! background sweeper. Handles leave the cache by being dropped, so an
//! evicted file closes as soon as no session still holds a clone.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::debug;

/// Time source for expiry decisions.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

struct Entry<H> {
    handle: H,
    last_access: Instant,
    tick: u64,
}

struct Inner<H> {
    entries: HashMap<String, Entry<H>>,
    // Recency order: smallest tick is least recently used.
    order: BTreeMap<u64, String>,
    next_tick: u64,
}

impl<H> Inner<H> {
    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    fn take(&mut self, key: &str) -> Option<H> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.tick);
        Some(entry.handle)
    }
}

/// LRU + TTL cache keyed by resolved path.
pub struct FileHandleCache<H, C = SystemClock> {
    max_size: usize,
    ttl: Duration,
    clock: C,
    inner: Mutex<Inner<H>>,
}

impl<H: Clone> FileHandleCache<H, SystemClock> {
    /// Cache holding at most `max_size` handles, each living `ttl` past its
    /// last use.
    pub fn new(max_size: usize, ttl: Duration) -> Self {
        Self::with_clock(max_size, ttl, SystemClock)
    }
}

impl<H: Clone, C: Clock> FileHandleCache<H, C> {
    /// Same as [`FileHandleCache::new`] with an explicit clock.
    pub fn with_clock(max_size: usize, ttl: Duration, clock: C) -> Self {
        Self {
            max_size: max_size.max(1),
            ttl,
            clock,
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                order: BTreeMap::new(),
                next_tick: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<H>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Look up `key`, refreshing it on a hit and expiring it when stale.
    pub fn get(&self, key: &str) -> Option<H> {
        let now = self.clock.now();
        let mut inner = self.lock();
        let (last_access, old_tick) = {
            let entry = inner.entries.get(key)?;
            (entry.last_access, entry.tick)
        };
        if now.saturating_duration_since(last_access) > self.ttl {
            debug!("cached handle for {key} expired");
            drop(inner.take(key));
            return None;
        }
        let tick = inner.bump();
        inner.order.remove(&old_tick);
        inner.order.insert(tick, key.to_string());
        let entry = inner.entries.get_mut(key)?;
        entry.last_access = now;
        entry.tick = tick;
        Some(entry.handle.clone())
    }

    /// Insert `handle` under `key`, replacing any previous handle and
    /// evicting the least recently used entry when full.
    pub fn put(&self, key: impl Into<String>, handle: H) {
        let key = key.into();
        let now = self.clock.now();
        let mut inner = self.lock();
        if inner.take(&key).is_some() {
            debug!("replaced cached handle for {key}");
        } else if inner.entries.len() >= self.max_size {
            if let Some((_, victim)) = inner.order.pop_first() {
                inner.entries.remove(&victim);
                debug!("evicted cached handle for {victim}");
            }
        }
        let tick = inner.bump();
        inner.order.insert(tick, key.clone());
        inner.entries.insert(
            key,
            Entry {
                handle,
                last_access: now,
                tick,
            },
        );
    }

    /// Drop the handle for `key`. Returns whether one was cached.
    pub fn remove(&self, key: &str) -> bool {
        self.lock().take(key).is_some()
    }

    /// Drop every cached handle.
    pub fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Entries currently held, stale ones included.
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
