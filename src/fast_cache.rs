//! Recency-ordered cache engine
//!
//! Entries live in an index-based arena threaded onto a doubly-linked
//! recency list (head = most recently used, tail = least recently used).
//! Lookups go through the direct-mapped table first and fall back to the
//! ordered index, which is the source of truth. The engine never evicts on
//! its own: callers decide when to call [`FastCache::evict`].

use crate::direct_cache::DirectCache;
use crate::error::Result;
use crate::ordered_index::OrderedIndex;
use crate::stats::CacheStats;
use std::sync::Arc;
use tracing::{debug, trace};

/// Callbacks through which a cache materializes, persists and releases values
pub trait CacheHandler<V> {
    /// Produce the value for a key that is not resident
    fn on_fault(&mut self, key: u64) -> Result<V>;

    /// Persist a resident value; the entry stays in the cache
    fn on_flush(&mut self, key: u64, value: &mut V) -> Result<()>;

    /// Release a value that has left the cache
    fn on_remove(&mut self, key: u64, value: V) -> Result<()>;
}

struct Entry<V> {
    key: u64,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

pub struct FastCache<V> {
    entries: Vec<Option<Entry<V>>>,
    vacant: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    direct: DirectCache<usize>,
    index: OrderedIndex<usize>,
    count: usize,
    stats: Arc<CacheStats>,
}

impl<V> FastCache<V> {
    /// `fast_index_size` sizes the direct-mapped table and the arena
    pub fn new(fast_index_size: usize) -> Result<Self> {
        Ok(Self {
            entries: Vec::with_capacity(fast_index_size),
            vacant: Vec::new(),
            head: None,
            tail: None,
            direct: DirectCache::new(fast_index_size)?,
            index: OrderedIndex::new(),
            count: 0,
            stats: Arc::new(CacheStats::new()),
        })
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    /// Handle on the counters for callbacks that record their own events
    pub fn shared_stats(&self) -> Arc<CacheStats> {
        Arc::clone(&self.stats)
    }

    /// Get the value for `key`, faulting it in through `handler` on a miss
    ///
    /// Hits move the entry to the most-recently-used end and repopulate the
    /// direct-mapped table.
    pub fn get<H>(&mut self, key: u64, handler: &mut H) -> Result<&mut V>
    where
        H: CacheHandler<V>,
    {
        let slot = match self.direct.get(key) {
            Some(slot) => slot,
            None => match self.index.search(key) {
                Some(slot) => {
                    self.direct.set(key, slot);
                    slot
                }
                None => {
                    debug!("fault {}", key);
                    self.stats.record_miss();
                    let value = handler.on_fault(key)?;
                    let slot = self.insert_front(key, value);
                    return Ok(&mut self.node_mut(slot).value);
                }
            },
        };

        self.stats.record_hit();
        self.move_to_front(slot);
        Ok(&mut self.node_mut(slot).value)
    }

    /// Look up without faulting and without touching recency
    pub fn peek(&self, key: u64) -> Option<&V> {
        self.locate(key).map(|slot| &self.node(slot).value)
    }

    pub fn peek_mut(&mut self, key: u64) -> Option<&mut V> {
        let slot = self.locate(key)?;
        Some(&mut self.node_mut(slot).value)
    }

    pub fn contains(&self, key: u64) -> bool {
        self.locate(key).is_some()
    }

    /// Peek at the least recently used entry without removing it
    pub fn get_least_recently_used(&self) -> Option<(u64, &V)> {
        self.tail.map(|slot| {
            let entry = self.node(slot);
            (entry.key, &entry.value)
        })
    }

    /// Insert at the most-recently-used end
    ///
    /// If `key` is already resident its value is replaced in place and the
    /// previous value is handed back; no callbacks run.
    pub fn add(&mut self, key: u64, value: V) -> Option<V> {
        if let Some(slot) = self.locate(key) {
            self.move_to_front(slot);
            self.direct.set(key, slot);
            return Some(std::mem::replace(&mut self.node_mut(slot).value, value));
        }
        self.insert_front(key, value);
        None
    }

    /// Flush then release `key`; returns whether it was resident
    pub fn remove<H>(&mut self, key: u64, handler: &mut H) -> Result<bool>
    where
        H: CacheHandler<V>,
    {
        let slot = match self.locate(key) {
            Some(slot) => slot,
            None => return Ok(false),
        };

        handler.on_flush(key, &mut self.node_mut(slot).value)?;
        let entry = self.detach(slot);
        handler.on_remove(entry.key, entry.value)?;
        Ok(true)
    }

    /// Run `on_flush` on every entry, most recently used first
    pub fn flush_all<H>(&mut self, handler: &mut H) -> Result<()>
    where
        H: CacheHandler<V>,
    {
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            let entry = self.node_mut(slot);
            handler.on_flush(entry.key, &mut entry.value)?;
            cursor = entry.next;
        }
        Ok(())
    }

    /// Remove up to `n` entries from the least-recently-used end
    ///
    /// Returns how many entries were actually evicted.
    pub fn evict<H>(&mut self, n: usize, handler: &mut H) -> Result<usize>
    where
        H: CacheHandler<V>,
    {
        let mut evicted = 0;
        while evicted < n {
            let slot = match self.tail {
                Some(slot) => slot,
                None => break,
            };
            let entry = self.node_mut(slot);
            trace!("evicting {}", entry.key);
            handler.on_flush(entry.key, &mut entry.value)?;
            let entry = self.detach(slot);
            handler.on_remove(entry.key, entry.value)?;
            self.stats.record_eviction();
            evicted += 1;
        }
        Ok(evicted)
    }

    /// Evict everything
    pub fn clear<H>(&mut self, handler: &mut H) -> Result<usize>
    where
        H: CacheHandler<V>,
    {
        self.evict(self.count, handler)
    }

    /// Keys from most to least recently used
    pub fn keys_by_recency(&self) -> Vec<u64> {
        let mut keys = Vec::with_capacity(self.count);
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            let entry = self.node(slot);
            keys.push(entry.key);
            cursor = entry.next;
        }
        keys
    }

    fn locate(&self, key: u64) -> Option<usize> {
        self.direct.get(key).or_else(|| self.index.search(key))
    }

    fn node(&self, slot: usize) -> &Entry<V> {
        match &self.entries[slot] {
            Some(entry) => entry,
            None => unreachable!("vacant arena slot {} is still referenced", slot),
        }
    }

    fn node_mut(&mut self, slot: usize) -> &mut Entry<V> {
        match &mut self.entries[slot] {
            Some(entry) => entry,
            None => unreachable!("vacant arena slot {} is still referenced", slot),
        }
    }

    fn insert_front(&mut self, key: u64, value: V) -> usize {
        let entry = Entry {
            key,
            value,
            prev: None,
            next: None,
        };
        let slot = match self.vacant.pop() {
            Some(slot) => {
                self.entries[slot] = Some(entry);
                slot
            }
            None => {
                self.entries.push(Some(entry));
                self.entries.len() - 1
            }
        };

        self.push_front(slot);
        self.direct.set(key, slot);
        self.index.set(key, slot);
        self.count += 1;
        self.stats.record_insert();
        slot
    }

    /// Unlink `slot` from every structure and hand its entry back
    fn detach(&mut self, slot: usize) -> Entry<V> {
        self.unlink(slot);
        let entry = match self.entries[slot].take() {
            Some(entry) => entry,
            None => unreachable!("vacant arena slot {} is still referenced", slot),
        };
        self.vacant.push(slot);
        self.direct.remove(entry.key);
        self.index.remove(entry.key);
        self.count -= 1;
        entry
    }

    fn push_front(&mut self, slot: usize) {
        let old_head = self.head;
        {
            let entry = self.node_mut(slot);
            entry.prev = None;
            entry.next = old_head;
        }
        match old_head {
            Some(head) => self.node_mut(head).prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = {
            let entry = self.node(slot);
            (entry.prev, entry.next)
        };
        match prev {
            Some(prev) => self.node_mut(prev).next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.node_mut(next).prev = prev,
            None => self.tail = prev,
        }
        let entry = self.node_mut(slot);
        entry.prev = None;
        entry.next = None;
    }

    fn move_to_front(&mut self, slot: usize) {
        if self.head == Some(slot) {
            return;
        }
        self.unlink(slot);
        self.push_front(slot);
    }
}
