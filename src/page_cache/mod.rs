//! Dirty-tracking page cache
//!
//! A [`PageCache`] keeps up to `capacity` fixed-size pages of a lower
//! [`Backend`] resident, tracks one coalesced dirty range per page and writes
//! back exactly that range when the page is flushed or evicted. Page caches
//! implement [`Backend`] themselves, so tiers chain by ownership.

pub mod storage;

pub use storage::{BlockStorage, HeapStorage, PageStorage};

use crate::backend::{check_range, Backend};
use crate::error::{Error, Result};
use crate::fast_cache::{CacheHandler, FastCache};
use crate::himem::{HimemAccess, HimemAllocator, HimemProvider};
use crate::stats::CacheStats;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// Modified bytes of a page: `[start, start + len)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DirtyRange {
    pub start: usize,
    pub len: usize,
}

impl DirtyRange {
    pub fn new(start: usize, len: usize) -> Self {
        Self { start, len }
    }

    pub fn end(&self) -> usize {
        self.start + self.len
    }

    /// Smallest range covering both
    pub fn union(&self, start: usize, len: usize) -> Self {
        let lo = self.start.min(start);
        let hi = self.end().max(start + len);
        Self::new(lo, hi - lo)
    }
}

/// A resident page
pub struct Page<H> {
    handle: H,
    dirty: Option<DirtyRange>,
}

/// Cache callbacks that move pages between storage and the lower tier
struct Pager<S, B> {
    name: String,
    page_size: usize,
    storage: S,
    backend: B,
    scratch: Vec<u8>,
    stats: Arc<CacheStats>,
}

impl<S: PageStorage, B: Backend> Pager<S, B> {
    fn page_address(&self, page_number: u64) -> u64 {
        page_number * self.page_size as u64
    }

    /// Fill `handle` from the lower tier; bytes past its end read as zero
    fn load(&mut self, page_number: u64, handle: &mut S::Handle) -> Result<()> {
        let address = self.page_address(page_number);
        let readable = match self.backend.capacity_bytes() {
            Some(limit) => limit.saturating_sub(address).min(self.page_size as u64) as usize,
            None => self.page_size,
        };

        self.scratch.fill(0);
        if readable > 0 {
            self.backend.read_backend(address, &mut self.scratch[..readable])?;
        }
        self.storage.write_page(handle, 0, &self.scratch)
    }
}

impl<S: PageStorage, B: Backend> CacheHandler<Page<S::Handle>> for Pager<S, B> {
    fn on_fault(&mut self, page_number: u64) -> Result<Page<S::Handle>> {
        trace!("{}: loading page {}", self.name, page_number);
        let mut handle = self.storage.acquire()?;
        if let Err(e) = self.load(page_number, &mut handle) {
            error!("{}: failed to load page {}: {}", self.name, page_number, e);
            self.storage.release(handle)?;
            return Err(e);
        }
        Ok(Page {
            handle,
            dirty: None,
        })
    }

    fn on_flush(&mut self, page_number: u64, page: &mut Page<S::Handle>) -> Result<()> {
        let Some(dirty) = page.dirty else {
            return Ok(());
        };

        trace!(
            "{}: writing back page {} [{}, {})",
            self.name,
            page_number,
            dirty.start,
            dirty.end()
        );
        let address = self.page_address(page_number) + dirty.start as u64;
        let bytes = &mut self.scratch[..dirty.len];
        self.storage.read_page(&page.handle, dirty.start, bytes)?;
        self.backend.write_backend(address, bytes)?;

        page.dirty = None;
        self.stats.record_flush(dirty.len);
        Ok(())
    }

    fn on_remove(&mut self, page_number: u64, page: Page<S::Handle>) -> Result<()> {
        trace!("{}: releasing page {}", self.name, page_number);
        self.storage.release(page.handle)
    }
}

pub struct PageCache<S: PageStorage, B> {
    cache: FastCache<Page<S::Handle>>,
    pager: Pager<S, B>,
    capacity: usize,
}

/// Page cache holding pages in heap buffers
pub type HeapCache<B> = PageCache<HeapStorage, B>;

/// Page cache holding pages in allocator blocks
pub type HimemCache<A, B> = PageCache<BlockStorage<A>, B>;

impl<S: PageStorage, B: Backend> PageCache<S, B> {
    pub fn new(
        name: impl Into<String>,
        page_size: usize,
        capacity: usize,
        storage: S,
        backend: B,
    ) -> Result<Self> {
        let name = name.into();
        if page_size == 0 {
            error!("{}: page size must be non-zero", name);
            return Err(Error::InvalidCapacity(format!(
                "{}: page size must be non-zero",
                name
            )));
        }
        if capacity == 0 {
            error!("{}: capacity must be non-zero", name);
            return Err(Error::InvalidCapacity(format!(
                "{}: capacity must be non-zero",
                name
            )));
        }

        let cache = FastCache::new(capacity)?;
        debug!("{}: {} pages x {} bytes", name, capacity, page_size);
        let pager = Pager {
            name,
            page_size,
            storage,
            backend,
            scratch: vec![0; page_size],
            stats: cache.shared_stats(),
        };
        Ok(Self {
            cache,
            pager,
            capacity,
        })
    }

    pub fn name(&self) -> &str {
        &self.pager.name
    }

    pub fn page_size(&self) -> usize {
        self.pager.page_size
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn resident_pages(&self) -> usize {
        self.cache.count()
    }

    pub fn is_resident(&self, page_number: u64) -> bool {
        self.cache.contains(page_number)
    }

    /// Dirty range of a resident page, `None` if clean or not resident
    pub fn dirty_range(&self, page_number: u64) -> Option<DirtyRange> {
        self.cache.peek(page_number).and_then(|page| page.dirty)
    }

    pub fn stats(&self) -> &CacheStats {
        self.cache.stats()
    }

    pub fn backend(&self) -> &B {
        &self.pager.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.pager.backend
    }

    pub fn read(&mut self, address: u64, buf: &mut [u8]) -> Result<()> {
        check_range(address, buf.len(), self.pager.backend.capacity_bytes())?;
        let page_size = self.pager.page_size;

        let mut done = 0;
        while done < buf.len() {
            let at = address + done as u64;
            let page_number = at / page_size as u64;
            let offset = (at % page_size as u64) as usize;
            let chunk = (buf.len() - done).min(page_size - offset);

            let page =
                Self::fault_in(&mut self.cache, &mut self.pager, self.capacity, page_number)?;
            self.pager
                .storage
                .read_page(&page.handle, offset, &mut buf[done..done + chunk])?;
            done += chunk;
        }
        Ok(())
    }

    pub fn write(&mut self, address: u64, buf: &[u8]) -> Result<()> {
        check_range(address, buf.len(), self.pager.backend.capacity_bytes())?;
        let page_size = self.pager.page_size;

        let mut done = 0;
        while done < buf.len() {
            let at = address + done as u64;
            let page_number = at / page_size as u64;
            let offset = (at % page_size as u64) as usize;
            let chunk = (buf.len() - done).min(page_size - offset);

            let page =
                Self::fault_in(&mut self.cache, &mut self.pager, self.capacity, page_number)?;
            self.pager
                .storage
                .write_page(&mut page.handle, offset, &buf[done..done + chunk])?;
            page.dirty = Some(match page.dirty {
                Some(dirty) => dirty.union(offset, chunk),
                None => DirtyRange::new(offset, chunk),
            });
            done += chunk;
        }
        Ok(())
    }

    /// Write back every dirty page; pages stay resident
    pub fn flush(&mut self) -> Result<()> {
        debug!("{}: flushing {} pages", self.pager.name, self.cache.count());
        self.cache.flush_all(&mut self.pager)
    }

    /// Evict every page (writing back dirty ones) and hand back the lower tier
    pub fn deinit(mut self) -> Result<B> {
        let evicted = self.cache.clear(&mut self.pager)?;
        debug!("{}: released {} pages", self.pager.name, evicted);
        let Pager {
            storage, backend, ..
        } = self.pager;
        storage.close()?;
        Ok(backend)
    }

    /// Make `page_number` resident, evicting the least recently used page
    /// first when the cache is full
    fn fault_in<'c>(
        cache: &'c mut FastCache<Page<S::Handle>>,
        pager: &mut Pager<S, B>,
        capacity: usize,
        page_number: u64,
    ) -> Result<&'c mut Page<S::Handle>> {
        if !cache.contains(page_number) && cache.count() >= capacity {
            cache.evict(1, pager)?;
        }
        cache.get(page_number, pager)
    }
}

impl<B: Backend> PageCache<HeapStorage, B> {
    pub fn heap(
        name: impl Into<String>,
        page_size: usize,
        capacity: usize,
        backend: B,
    ) -> Result<Self> {
        Self::new(name, page_size, capacity, HeapStorage::new(page_size), backend)
    }
}

impl<A: HimemAccess, B: Backend> PageCache<BlockStorage<A>, B> {
    /// One block per page, initialized through `provider`
    pub fn himem<P>(
        name: impl Into<String>,
        page_size: usize,
        capacity: u16,
        provider: P,
        backend: B,
    ) -> Result<Self>
    where
        P: HimemProvider<Access = A>,
    {
        let allocator = HimemAllocator::init(provider, page_size, capacity)?;
        let storage = BlockStorage::new(allocator, page_size)?;
        Self::new(name, page_size, capacity as usize, storage, backend)
    }

    pub fn free_blocks(&self) -> usize {
        self.pager.storage.allocator().free_blocks()
    }

    pub fn allocator(&self) -> &HimemAllocator<A> {
        self.pager.storage.allocator()
    }
}

impl<S: PageStorage, B: Backend> Backend for PageCache<S, B> {
    fn read_backend(&mut self, address: u64, buf: &mut [u8]) -> Result<()> {
        self.read(address, buf)
    }

    fn write_backend(&mut self, address: u64, buf: &[u8]) -> Result<()> {
        self.write(address, buf)
    }

    fn flush_backend(&mut self) -> Result<()> {
        self.flush()?;
        self.pager.backend.flush_backend()
    }

    fn shutdown_backend(&mut self) -> Result<()> {
        let evicted = self.cache.clear(&mut self.pager)?;
        debug!("{}: shut down, released {} pages", self.pager.name, evicted);
        self.pager.backend.shutdown_backend()
    }

    fn capacity_bytes(&self) -> Option<u64> {
        self.pager.backend.capacity_bytes()
    }
}
