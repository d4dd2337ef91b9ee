//! Memory hierarchy manager
//!
//! Stacks three page caches over the page file:
//!
//! ```text
//! read/write -> ram (heap) -> psram (heap) -> himem (blocks) -> page file
//! ```
//!
//! Clients only ever talk to the RAM tier; lower tiers are reached through
//! misses and write-backs of the tier above.

use crate::backend::{check_range, Backend};
use crate::config::VmmConfig;
use crate::error::{Error, Result};
use crate::file_backend::FileBackend;
use crate::himem::{EmulatedHimem, EmulatedProvider, HimemAccess, HimemProvider};
use crate::page_cache::{HeapCache, HimemCache, PageCache};
use crate::stats::{AccessStats, VmmStats};
use tracing::{debug, error, info, warn};

pub type HimemTier<A> = HimemCache<A, FileBackend>;
pub type PsramTier<A> = HeapCache<HimemTier<A>>;
pub type RamTier<A> = HeapCache<PsramTier<A>>;

pub struct Vmm<A: HimemAccess = EmulatedHimem> {
    ram: RamTier<A>,
    config: VmmConfig,
    access: AccessStats,
    closed: bool,
}

impl Vmm<EmulatedHimem> {
    /// Build the hierarchy on the emulated block allocator
    pub fn create(config: VmmConfig) -> Result<Self> {
        Self::with_provider(config, EmulatedProvider::default())
    }
}

impl<A: HimemAccess> Vmm<A> {
    /// Build the hierarchy with the himem tier initialized through `provider`
    pub fn with_provider<P>(config: VmmConfig, provider: P) -> Result<Self>
    where
        P: HimemProvider<Access = A>,
    {
        config.validate()?;

        let himem_pages = config.himem.pages as u16;
        // 0 means the provider rejects the block size; init reports why
        let available = provider.maximum_blocks(config.himem.page_size);
        if available > 0 && himem_pages > available {
            error!(
                "himem tier wants {} pages of {} bytes, provider has room for {}",
                himem_pages, config.himem.page_size, available
            );
            return Err(Error::InsufficientMemory {
                requested: himem_pages,
                available,
            });
        }

        let file = FileBackend::open(&config.pagefile, config.maximum_size, config.sync_on_flush)?;
        let himem = PageCache::himem(
            "himem",
            config.himem.page_size,
            himem_pages,
            provider,
            file,
        )?;
        let psram = PageCache::heap("psram", config.psram.page_size, config.psram.pages, himem)?;
        let ram = PageCache::heap("ram", config.ram.page_size, config.ram.pages, psram)?;

        info!(
            "vmm ready: {} bytes at {}, ram {}x{}, psram {}x{}, himem {}x{}",
            config.maximum_size,
            config.pagefile.display(),
            config.ram.pages,
            config.ram.page_size,
            config.psram.pages,
            config.psram.page_size,
            config.himem.pages,
            config.himem.page_size
        );

        Ok(Self {
            ram,
            config,
            access: AccessStats::default(),
            closed: false,
        })
    }

    pub fn config(&self) -> &VmmConfig {
        &self.config
    }

    pub fn maximum_size(&self) -> u64 {
        self.config.maximum_size
    }

    pub fn read(&mut self, address: u64, buf: &mut [u8]) -> Result<()> {
        check_range(address, buf.len(), Some(self.config.maximum_size))?;
        self.ram.read(address, buf)?;
        self.access.record_read(buf.len());
        Ok(())
    }

    pub fn write(&mut self, address: u64, buf: &[u8]) -> Result<()> {
        check_range(address, buf.len(), Some(self.config.maximum_size))?;
        self.ram.write(address, buf)?;
        self.access.record_write(buf.len());
        Ok(())
    }

    /// Write back every tier top to bottom, then flush the page file
    pub fn flush(&mut self) -> Result<()> {
        debug!("flushing all tiers");
        self.ram.flush_backend()
    }

    /// Flush, release every tier and close the page file
    pub fn destroy(mut self) -> Result<()> {
        self.shutdown()
    }

    pub fn ram(&self) -> &RamTier<A> {
        &self.ram
    }

    pub fn psram(&self) -> &PsramTier<A> {
        self.ram.backend()
    }

    pub fn himem(&self) -> &HimemTier<A> {
        self.psram().backend()
    }

    pub fn file(&self) -> &FileBackend {
        self.himem().backend()
    }

    pub fn stats(&self) -> VmmStats {
        VmmStats {
            reads: self.access.get_reads(),
            bytes_read: self.access.get_bytes_read(),
            writes: self.access.get_writes(),
            bytes_written: self.access.get_bytes_written(),
            ram: self.ram.stats().snapshot(),
            psram: self.psram().stats().snapshot(),
            himem: self.himem().stats().snapshot(),
            file: self.file().stats().snapshot(),
        }
    }

    fn shutdown(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.ram.flush_backend()?;
        self.ram.shutdown_backend()?;
        info!("vmm closed {}", self.config.pagefile.display());
        Ok(())
    }
}

impl<A: HimemAccess> Drop for Vmm<A> {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.shutdown() {
            warn!("vmm dropped without destroy, write-back failed: {}", e);
        }
    }
}
