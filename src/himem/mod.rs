//! Block allocator ("himem")
//!
//! A fixed number of fixed-size blocks sits behind the [`HimemAccess`]
//! capability; [`HimemProvider`] picks and initializes an implementation at
//! construction time. [`HimemAllocator`] layers a LIFO free list on top so
//! callers can hand blocks out and take them back.

pub mod emulated;
pub mod paged;

pub use emulated::{EmulatedHimem, EmulatedProvider};
pub use paged::{BankSwitch, PagedHimem, PagedProvider, SimulatedBanks, SUPERBLOCK_SIZE};

use crate::error::{Error, Result};
use tracing::{error, trace};

pub type BlockId = u16;

/// Raw block read/write access
pub trait HimemAccess {
    fn block_size(&self) -> usize;

    fn max_blocks(&self) -> u16;

    /// Copy `buf.len()` bytes out of `block_id` starting at `offset`
    fn read(&mut self, block_id: BlockId, offset: usize, buf: &mut [u8]) -> Result<usize>;

    /// Copy `buf` into `block_id` starting at `offset`
    fn write(&mut self, block_id: BlockId, offset: usize, buf: &[u8]) -> Result<usize>;

    /// Release the underlying memory
    fn deinit(self) -> Result<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

/// Sizing and construction of a [`HimemAccess`] implementation
pub trait HimemProvider {
    type Access: HimemAccess;

    /// How many blocks of `block_size` could be initialized (0 if the size is unusable)
    fn maximum_blocks(&self, block_size: usize) -> u16;

    fn init(self, block_size: usize, blocks: u16) -> Result<Self::Access>;
}

/// Shared bounds check for every block access
pub(crate) fn check_access(
    block_id: BlockId,
    max_blocks: u16,
    block_size: usize,
    offset: usize,
    len: usize,
) -> Result<()> {
    if block_id >= max_blocks {
        error!("block {} out of range, max {}", block_id, max_blocks);
        return Err(Error::BlockOutOfRange {
            block_id,
            max_blocks,
        });
    }
    if len > block_size {
        error!("length {} exceeds block size {}", len, block_size);
        return Err(Error::LengthExceedsBlock { len, block_size });
    }
    if offset.checked_add(len).map_or(true, |end| end > block_size) {
        error!("range {}+{} exceeds block size {}", offset, len, block_size);
        return Err(Error::OffsetOutOfBounds {
            offset,
            len,
            block_size,
        });
    }
    Ok(())
}

/// Free-list allocator over a block device
///
/// Blocks are handed out from the free list (most recently freed first) and
/// otherwise issued sequentially until `max_blocks` is reached.
pub struct HimemAllocator<A> {
    access: A,
    free_list: Vec<BlockId>,
    next_unused: usize,
}

impl<A: HimemAccess> HimemAllocator<A> {
    pub fn new(access: A) -> Self {
        Self {
            access,
            free_list: Vec::new(),
            next_unused: 0,
        }
    }

    /// Initialize `blocks` blocks of `block_size` through `provider`
    pub fn init<P>(provider: P, block_size: usize, blocks: u16) -> Result<Self>
    where
        P: HimemProvider<Access = A>,
    {
        Ok(Self::new(provider.init(block_size, blocks)?))
    }

    pub fn allocate_block(&mut self) -> Result<BlockId> {
        if let Some(block_id) = self.free_list.pop() {
            trace!("reusing block {}", block_id);
            return Ok(block_id);
        }
        if self.next_unused < self.access.max_blocks() as usize {
            let block_id = self.next_unused as BlockId;
            self.next_unused += 1;
            trace!("issuing new block {}", block_id);
            return Ok(block_id);
        }
        error!("no free himem blocks ({} total)", self.access.max_blocks());
        Err(Error::NoSpace)
    }

    pub fn free_block(&mut self, block_id: BlockId) -> Result<()> {
        if block_id as usize >= self.next_unused {
            error!("freeing block {} that was never issued", block_id);
            return Err(Error::BlockOutOfRange {
                block_id,
                max_blocks: self.access.max_blocks(),
            });
        }
        debug_assert!(
            !self.free_list.contains(&block_id),
            "block {} freed twice",
            block_id
        );
        self.free_list.push(block_id);
        Ok(())
    }

    pub fn free_blocks(&self) -> usize {
        self.free_list.len() + (self.access.max_blocks() as usize - self.next_unused)
    }

    pub fn block_size(&self) -> usize {
        self.access.block_size()
    }

    pub fn max_blocks(&self) -> u16 {
        self.access.max_blocks()
    }

    pub fn read(&mut self, block_id: BlockId, offset: usize, buf: &mut [u8]) -> Result<usize> {
        self.access.read(block_id, offset, buf)
    }

    pub fn write(&mut self, block_id: BlockId, offset: usize, buf: &[u8]) -> Result<usize> {
        self.access.write(block_id, offset, buf)
    }

    pub fn access(&self) -> &A {
        &self.access
    }

    pub fn deinit(self) -> Result<()> {
        self.access.deinit()
    }
}
