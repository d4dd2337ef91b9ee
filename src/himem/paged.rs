//! Bank-switched external RAM
//!
//! Physical memory is split into superblocks; only one superblock at a time
//! is visible through a fixed virtual window. Every access maps the
//! superblock holding the target block first, so block sizes must divide the
//! superblock size and no block ever straddles two superblocks.

use super::{check_access, BlockId, HimemAccess, HimemProvider};
use crate::error::{Error, Result};
use tracing::{debug, error, trace, warn};

/// Size of one mappable physical unit (32KiB)
pub const SUPERBLOCK_SIZE: usize = 32 * 1024;

/// Block sizes must be a multiple of this
pub const BLOCK_ALIGNMENT: usize = 1024;

/// Driver primitives for a bank-switched memory region
pub trait BankSwitch {
    /// Total physical bytes behind the window
    fn physical_size(&self) -> usize;

    /// Physical bytes not yet allocated
    fn free_size(&self) -> usize;

    /// Address space reserved for the mapping window
    fn reserved_area_size(&self) -> usize;

    fn alloc(&mut self, bytes: usize) -> Result<()>;

    fn free(&mut self) -> Result<()>;

    /// Map `SUPERBLOCK_SIZE` bytes starting at `physical_offset` into the window
    fn map(&mut self, physical_offset: usize) -> Result<()>;

    fn unmap(&mut self) -> Result<()>;

    fn window(&self) -> &[u8];

    fn window_mut(&mut self) -> &mut [u8];
}

fn validate_block_size(block_size: usize) -> Result<()> {
    if block_size == 0 || block_size % BLOCK_ALIGNMENT != 0 {
        error!("block size must be {} bytes aligned", BLOCK_ALIGNMENT);
        return Err(Error::InvalidBlockSize(format!(
            "{} is not a non-zero multiple of {}",
            block_size, BLOCK_ALIGNMENT
        )));
    }
    if block_size > SUPERBLOCK_SIZE {
        error!("block size can be at most {} bytes", SUPERBLOCK_SIZE);
        return Err(Error::InvalidBlockSize(format!(
            "{} exceeds superblock size {}",
            block_size, SUPERBLOCK_SIZE
        )));
    }
    if SUPERBLOCK_SIZE % block_size != 0 {
        error!("block size {} does not divide the superblock", block_size);
        return Err(Error::InvalidBlockSize(format!(
            "{} does not divide superblock size {}",
            block_size, SUPERBLOCK_SIZE
        )));
    }
    Ok(())
}

fn superblocks_needed(block_size: usize, blocks: u16) -> usize {
    (block_size * blocks as usize).div_ceil(SUPERBLOCK_SIZE)
}

pub struct PagedProvider<D> {
    driver: D,
}

impl<D: BankSwitch> PagedProvider<D> {
    pub fn new(driver: D) -> Self {
        Self { driver }
    }
}

impl<D: BankSwitch> HimemProvider for PagedProvider<D> {
    type Access = PagedHimem<D>;

    fn maximum_blocks(&self, block_size: usize) -> u16 {
        if validate_block_size(block_size).is_err() {
            return 0;
        }
        let free = self.driver.free_size();
        let maximum_blocks = (free / block_size).min(u16::MAX as usize) as u16;
        debug!(
            "himem has {}KiB of memory, {}KiB free, can allocate {} blocks of {} bytes",
            self.driver.physical_size() / 1024,
            free / 1024,
            maximum_blocks,
            block_size
        );
        maximum_blocks
    }

    fn init(self, block_size: usize, blocks: u16) -> Result<PagedHimem<D>> {
        validate_block_size(block_size)?;

        let available = self.maximum_blocks(block_size);
        if blocks > available {
            error!(
                "too many blocks, requested {} but can only allocate {}",
                blocks, available
            );
            return Err(Error::InsufficientMemory {
                requested: blocks,
                available,
            });
        }

        let reserved = self.driver.reserved_area_size();
        if reserved < SUPERBLOCK_SIZE {
            error!("himem could not find a minimum of reserved memory for bank switching");
            return Err(Error::ReservedSpaceTooSmall {
                reserved,
                required: SUPERBLOCK_SIZE,
            });
        }

        let superblocks = superblocks_needed(block_size, blocks);
        debug!(
            "himem will use {}KiB for {} superblocks hosting {} blocks",
            superblocks * SUPERBLOCK_SIZE / 1024,
            superblocks,
            blocks
        );

        let mut driver = self.driver;
        driver.alloc(superblocks * SUPERBLOCK_SIZE)?;

        let mut himem = PagedHimem {
            driver,
            block_size,
            max_blocks: blocks,
            mapped: None,
            remaps: 0,
            released: false,
        };
        for superblock in 0..superblocks {
            himem.map_superblock(superblock)?;
            himem.driver.window_mut().fill(0);
        }
        Ok(himem)
    }
}

pub struct PagedHimem<D: BankSwitch> {
    driver: D,
    block_size: usize,
    max_blocks: u16,
    mapped: Option<usize>,
    remaps: u64,
    released: bool,
}

impl<D: BankSwitch> PagedHimem<D> {
    /// Number of times a superblock was mapped into the window
    pub fn remap_count(&self) -> u64 {
        self.remaps
    }

    pub fn mapped_superblock(&self) -> Option<usize> {
        self.mapped
    }

    fn map_superblock(&mut self, superblock: usize) -> Result<()> {
        if let Some(current) = self.mapped {
            if current == superblock {
                return Ok(());
            }
            trace!("unmapping superblock {}", current);
            self.driver.unmap()?;
            self.mapped = None;
        }

        trace!(
            "mapping superblock {} at {}",
            superblock,
            superblock * SUPERBLOCK_SIZE
        );
        self.driver.map(superblock * SUPERBLOCK_SIZE)?;
        self.mapped = Some(superblock);
        self.remaps += 1;
        Ok(())
    }

    /// Map the superblock holding `block_id`, returning the block's window offset
    fn locate(&mut self, block_id: BlockId) -> Result<usize> {
        let position = block_id as usize * self.block_size;
        self.map_superblock(position / SUPERBLOCK_SIZE)?;
        Ok(position % SUPERBLOCK_SIZE)
    }

    fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        if self.mapped.take().is_some() {
            self.driver.unmap()?;
        }
        self.driver.free()
    }
}

impl<D: BankSwitch> HimemAccess for PagedHimem<D> {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn max_blocks(&self) -> u16 {
        self.max_blocks
    }

    fn read(&mut self, block_id: BlockId, offset: usize, buf: &mut [u8]) -> Result<usize> {
        check_access(block_id, self.max_blocks, self.block_size, offset, buf.len())?;
        let start = self.locate(block_id)? + offset;
        buf.copy_from_slice(&self.driver.window()[start..start + buf.len()]);
        Ok(buf.len())
    }

    fn write(&mut self, block_id: BlockId, offset: usize, buf: &[u8]) -> Result<usize> {
        check_access(block_id, self.max_blocks, self.block_size, offset, buf.len())?;
        let start = self.locate(block_id)? + offset;
        self.driver.window_mut()[start..start + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }

    fn deinit(mut self) -> Result<()> {
        self.release()
    }
}

impl<D: BankSwitch> Drop for PagedHimem<D> {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            warn!("failed to release himem: {}", e);
        }
    }
}

/// In-memory bank-switch driver
///
/// Mapping copies a superblock into the window and unmapping copies it
/// back, so data only survives a remap if the window logic is right.
pub struct SimulatedBanks {
    physical_size: usize,
    reserved_area: usize,
    physical: Vec<u8>,
    window: Vec<u8>,
    mapped_at: Option<usize>,
}

impl SimulatedBanks {
    pub fn new(physical_size: usize, reserved_area: usize) -> Self {
        Self {
            physical_size,
            reserved_area,
            physical: Vec::new(),
            window: vec![0; SUPERBLOCK_SIZE],
            mapped_at: None,
        }
    }
}

impl BankSwitch for SimulatedBanks {
    fn physical_size(&self) -> usize {
        self.physical_size
    }

    fn free_size(&self) -> usize {
        self.physical_size - self.physical.len()
    }

    fn reserved_area_size(&self) -> usize {
        self.reserved_area
    }

    fn alloc(&mut self, bytes: usize) -> Result<()> {
        if !self.physical.is_empty() {
            return Err(Error::BankSwitch("physical memory already allocated".to_string()));
        }
        if bytes > self.physical_size {
            return Err(Error::BankSwitch(format!(
                "cannot allocate {} of {} bytes",
                bytes, self.physical_size
            )));
        }
        self.physical = vec![0xa5; bytes];
        Ok(())
    }

    fn free(&mut self) -> Result<()> {
        if self.mapped_at.is_some() {
            return Err(Error::BankSwitch("freeing while window is mapped".to_string()));
        }
        self.physical = Vec::new();
        Ok(())
    }

    fn map(&mut self, physical_offset: usize) -> Result<()> {
        if self.mapped_at.is_some() {
            return Err(Error::BankSwitch("window already mapped".to_string()));
        }
        let end = physical_offset + SUPERBLOCK_SIZE;
        if end > self.physical.len() {
            return Err(Error::BankSwitch(format!(
                "mapping {}..{} outside {} allocated bytes",
                physical_offset,
                end,
                self.physical.len()
            )));
        }
        self.window
            .copy_from_slice(&self.physical[physical_offset..end]);
        self.mapped_at = Some(physical_offset);
        Ok(())
    }

    fn unmap(&mut self) -> Result<()> {
        let offset = self
            .mapped_at
            .take()
            .ok_or_else(|| Error::BankSwitch("window not mapped".to_string()))?;
        self.physical[offset..offset + SUPERBLOCK_SIZE].copy_from_slice(&self.window);
        Ok(())
    }

    fn window(&self) -> &[u8] {
        &self.window
    }

    fn window_mut(&mut self) -> &mut [u8] {
        &mut self.window
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: usize = 1024 * 1024;

    fn provider() -> PagedProvider<SimulatedBanks> {
        PagedProvider::new(SimulatedBanks::new(4 * MIB, SUPERBLOCK_SIZE))
    }

    fn pattern(seed: usize, len: usize) -> Vec<u8> {
        (0..len).map(|i| ((i * 13 + seed * 101) % 253) as u8).collect()
    }

    #[test]
    fn test_block_size_validation() {
        let provider = provider();
        assert_eq!(provider.maximum_blocks(1000), 0);
        assert_eq!(provider.maximum_blocks(3072), 0);
        assert_eq!(provider.maximum_blocks(64 * 1024), 0);
        assert_eq!(provider.maximum_blocks(1024), 4096);
        assert!(matches!(
            provider.init(3072, 1),
            Err(Error::InvalidBlockSize(_))
        ));
    }

    #[test]
    fn test_too_many_blocks_rejected() {
        let provider = PagedProvider::new(SimulatedBanks::new(SUPERBLOCK_SIZE, SUPERBLOCK_SIZE));
        assert!(matches!(
            provider.init(1024, 33),
            Err(Error::InsufficientMemory { .. })
        ));
    }

    #[test]
    fn test_reserved_window_required() {
        let provider = PagedProvider::new(SimulatedBanks::new(MIB, 16 * 1024));
        assert!(matches!(
            provider.init(1024, 8),
            Err(Error::ReservedSpaceTooSmall { .. })
        ));
    }

    #[test]
    fn test_init_zeroes_memory() {
        let mut himem = provider().init(1024, 40).unwrap();
        let mut buf = vec![0xffu8; 1024];
        for block in [0u16, 31, 32, 39] {
            himem.read(block, 0, &mut buf).unwrap();
            assert!(buf.iter().all(|&b| b == 0), "block {} not zeroed", block);
        }
    }

    #[test]
    fn test_write_read_across_superblocks() {
        for block_size in [1024usize, 4096, 16 * 1024] {
            let blocks = 200u16;
            let mut himem = provider().init(block_size, blocks).unwrap();
            for block in 0..blocks {
                himem
                    .write(block, 0, &pattern(block as usize, block_size))
                    .unwrap();
            }
            let mut buf = vec![0u8; block_size];
            for block in 0..blocks {
                himem.read(block, 0, &mut buf).unwrap();
                assert_eq!(buf, pattern(block as usize, block_size));
            }
        }
    }

    #[test]
    fn test_remaps_only_when_crossing_superblocks() {
        let mut himem = provider().init(1024, 64).unwrap();
        let after_init = himem.remap_count();

        // blocks 0..32 share superblock 0
        himem.write(0, 0, &[1]).unwrap();
        let first = himem.remap_count();
        for block in 1..32u16 {
            himem.write(block, 0, &[2]).unwrap();
        }
        assert_eq!(himem.remap_count(), first);
        assert!(first <= after_init + 1);

        himem.write(32, 0, &[3]).unwrap();
        assert_eq!(himem.remap_count(), first + 1);
        assert_eq!(himem.mapped_superblock(), Some(1));
    }

    #[test]
    fn test_bounds_violations() {
        let mut himem = provider().init(1024, 4).unwrap();
        let mut buf = [0u8; 16];
        assert!(matches!(
            himem.read(4, 0, &mut buf),
            Err(Error::BlockOutOfRange { .. })
        ));
        assert!(matches!(
            himem.write(0, 1020, &buf),
            Err(Error::OffsetOutOfBounds { .. })
        ));
    }

    #[test]
    fn test_deinit_unmaps_and_frees() {
        let himem = provider().init(1024, 4).unwrap();
        assert!(himem.deinit().is_ok());
    }
}
