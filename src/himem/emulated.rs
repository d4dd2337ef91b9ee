//! Flat heap buffer standing in for external RAM

use super::{check_access, BlockId, HimemAccess, HimemProvider};
use crate::error::{Error, Result};
use tracing::{debug, error, trace};

/// Default emulated memory size (4MB)
pub const DEFAULT_MAXIMUM_MEMORY: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct EmulatedProvider {
    maximum_memory: usize,
}

impl EmulatedProvider {
    pub fn new(maximum_memory: usize) -> Self {
        Self { maximum_memory }
    }
}

impl Default for EmulatedProvider {
    fn default() -> Self {
        Self::new(DEFAULT_MAXIMUM_MEMORY)
    }
}

impl HimemProvider for EmulatedProvider {
    type Access = EmulatedHimem;

    fn maximum_blocks(&self, block_size: usize) -> u16 {
        if block_size == 0 {
            return 0;
        }
        (self.maximum_memory / block_size).min(u16::MAX as usize) as u16
    }

    fn init(self, block_size: usize, blocks: u16) -> Result<EmulatedHimem> {
        if block_size == 0 {
            error!("emulated himem block size must be non-zero");
            return Err(Error::InvalidBlockSize(
                "block size must be non-zero".to_string(),
            ));
        }
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

        debug!("emulated himem {} blocks x {} bytes", blocks, block_size);
        Ok(EmulatedHimem {
            container: vec![0; block_size * blocks as usize],
            block_size,
            max_blocks: blocks,
        })
    }
}

pub struct EmulatedHimem {
    container: Vec<u8>,
    block_size: usize,
    max_blocks: u16,
}

impl EmulatedHimem {
    #[inline]
    fn position(&self, block_id: BlockId, offset: usize) -> usize {
        block_id as usize * self.block_size + offset
    }
}

impl HimemAccess for EmulatedHimem {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn max_blocks(&self) -> u16 {
        self.max_blocks
    }

    fn read(&mut self, block_id: BlockId, offset: usize, buf: &mut [u8]) -> Result<usize> {
        check_access(block_id, self.max_blocks, self.block_size, offset, buf.len())?;
        let start = self.position(block_id, offset);
        trace!("reading offset {} ({} bytes)", start, buf.len());
        buf.copy_from_slice(&self.container[start..start + buf.len()]);
        Ok(buf.len())
    }

    fn write(&mut self, block_id: BlockId, offset: usize, buf: &[u8]) -> Result<usize> {
        check_access(block_id, self.max_blocks, self.block_size, offset, buf.len())?;
        let start = self.position(block_id, offset);
        trace!("writing offset {} ({} bytes)", start, buf.len());
        self.container[start..start + buf.len()].copy_from_slice(buf);
        Ok(buf.len())
    }
}
