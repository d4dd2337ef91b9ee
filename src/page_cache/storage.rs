//! Where resident page bytes live

use crate::error::{Error, Result};
use crate::himem::{BlockId, HimemAccess, HimemAllocator};
use tracing::{debug, error};

/// Owner of the memory behind resident pages
///
/// Every handle returned by `acquire` is exclusively owned by one resident
/// page until it is handed back through `release`.
pub trait PageStorage {
    type Handle;

    fn acquire(&mut self) -> Result<Self::Handle>;

    fn release(&mut self, handle: Self::Handle) -> Result<()>;

    /// Copy `buf.len()` bytes out of the page starting at `offset`
    fn read_page(&mut self, handle: &Self::Handle, offset: usize, buf: &mut [u8]) -> Result<()>;

    /// Copy `data` into the page starting at `offset`
    fn write_page(&mut self, handle: &mut Self::Handle, offset: usize, data: &[u8]) -> Result<()>;

    /// Tear down once every handle has been released
    fn close(self) -> Result<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

fn page_bounds(offset: usize, len: usize, page_size: usize) -> Result<std::ops::Range<usize>> {
    match offset.checked_add(len) {
        Some(end) if end <= page_size => Ok(offset..end),
        _ => {
            error!("page range {}+{} exceeds page size {}", offset, len, page_size);
            Err(Error::OffsetOutOfBounds {
                offset,
                len,
                block_size: page_size,
            })
        }
    }
}

/// One heap buffer per resident page
#[derive(Debug, Clone)]
pub struct HeapStorage {
    page_size: usize,
}

impl HeapStorage {
    pub fn new(page_size: usize) -> Self {
        Self { page_size }
    }
}

impl PageStorage for HeapStorage {
    type Handle = Box<[u8]>;

    fn acquire(&mut self) -> Result<Self::Handle> {
        Ok(vec![0; self.page_size].into_boxed_slice())
    }

    fn release(&mut self, _handle: Self::Handle) -> Result<()> {
        Ok(())
    }

    fn read_page(&mut self, handle: &Self::Handle, offset: usize, buf: &mut [u8]) -> Result<()> {
        let range = page_bounds(offset, buf.len(), self.page_size)?;
        buf.copy_from_slice(&handle[range]);
        Ok(())
    }

    fn write_page(&mut self, handle: &mut Self::Handle, offset: usize, data: &[u8]) -> Result<()> {
        let range = page_bounds(offset, data.len(), self.page_size)?;
        handle[range].copy_from_slice(data);
        Ok(())
    }
}

/// Resident pages held in blocks handed out by a [`HimemAllocator`]
pub struct BlockStorage<A> {
    allocator: HimemAllocator<A>,
}

impl<A: HimemAccess> BlockStorage<A> {
    /// Blocks must be at least `page_size` bytes
    pub fn new(allocator: HimemAllocator<A>, page_size: usize) -> Result<Self> {
        if allocator.block_size() < page_size {
            error!("block size {} smaller than page size {}", allocator.block_size(), page_size);
            return Err(Error::InvalidBlockSize(format!(
                "block size {} cannot hold {}-byte pages",
                allocator.block_size(),
                page_size
            )));
        }
        Ok(Self { allocator })
    }

    pub fn allocator(&self) -> &HimemAllocator<A> {
        &self.allocator
    }

    fn expect_full(transferred: usize, requested: usize) -> Result<()> {
        if transferred != requested {
            error!("short block transfer: {} of {} bytes", transferred, requested);
            return Err(Error::ShortTransfer {
                transferred,
                requested,
            });
        }
        Ok(())
    }
}

impl<A: HimemAccess> PageStorage for BlockStorage<A> {
    type Handle = BlockId;

    fn acquire(&mut self) -> Result<BlockId> {
        self.allocator.allocate_block()
    }

    fn release(&mut self, handle: BlockId) -> Result<()> {
        self.allocator.free_block(handle)
    }

    fn read_page(&mut self, handle: &BlockId, offset: usize, buf: &mut [u8]) -> Result<()> {
        let transferred = self.allocator.read(*handle, offset, buf)?;
        Self::expect_full(transferred, buf.len())
    }

    fn write_page(&mut self, handle: &mut BlockId, offset: usize, data: &[u8]) -> Result<()> {
        let transferred = self.allocator.write(*handle, offset, data)?;
        Self::expect_full(transferred, data.len())
    }

    fn close(self) -> Result<()> {
        debug!("releasing block storage, {} blocks free", self.allocator.free_blocks());
        self.allocator.deinit()
    }
}
