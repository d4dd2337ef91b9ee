//! Lower-tier contract shared by every cache tier and the backing file

use crate::error::{Error, Result};
use tracing::error;

/// Byte-addressed storage one level below a cache tier
///
/// Transfers are all-or-nothing: an implementation either moves exactly
/// `buf.len()` bytes or returns an error.
pub trait Backend {
    fn read_backend(&mut self, address: u64, buf: &mut [u8]) -> Result<()>;

    fn write_backend(&mut self, address: u64, buf: &[u8]) -> Result<()>;

    /// Push everything buffered at this level and below down to stable storage
    fn flush_backend(&mut self) -> Result<()>;

    /// Write back and release everything held at this level and below
    fn shutdown_backend(&mut self) -> Result<()>;

    /// Addressable size, if bounded
    fn capacity_bytes(&self) -> Option<u64> {
        None
    }
}

/// Reject `[address, address + len)` if it does not fit in `limit` bytes
pub(crate) fn check_range(address: u64, len: usize, limit: Option<u64>) -> Result<()> {
    let Some(limit) = limit else {
        return Ok(());
    };
    let fits = address
        .checked_add(len as u64)
        .is_some_and(|end| end <= limit);
    if !fits {
        error!("address range 0x{:x}+{} exceeds {} bytes", address, len, limit);
        return Err(Error::AddressOutOfRange {
            address,
            len,
            limit,
        });
    }
    Ok(())
}

/// Flat in-memory backend that records every transfer
///
/// Handy as the bottom of a tier when no file is wanted, and in tests that
/// need to see exactly which ranges a cache wrote back.
#[derive(Debug, Clone, Default)]
pub struct MemoryBackend {
    bytes: Vec<u8>,
    reads: Vec<(u64, usize)>,
    writes: Vec<(u64, usize)>,
    flushes: usize,
}

impl MemoryBackend {
    pub fn new(size: usize) -> Self {
        Self {
            bytes: vec![0; size],
            ..Self::default()
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// `(address, length)` of every read, oldest first
    pub fn reads(&self) -> &[(u64, usize)] {
        &self.reads
    }

    /// `(address, length)` of every write, oldest first
    pub fn writes(&self) -> &[(u64, usize)] {
        &self.writes
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }
}

impl Backend for MemoryBackend {
    fn read_backend(&mut self, address: u64, buf: &mut [u8]) -> Result<()> {
        check_range(address, buf.len(), self.capacity_bytes())?;
        let start = address as usize;
        buf.copy_from_slice(&self.bytes[start..start + buf.len()]);
        self.reads.push((address, buf.len()));
        Ok(())
    }

    fn write_backend(&mut self, address: u64, buf: &[u8]) -> Result<()> {
        check_range(address, buf.len(), self.capacity_bytes())?;
        let start = address as usize;
        self.bytes[start..start + buf.len()].copy_from_slice(buf);
        self.writes.push((address, buf.len()));
        Ok(())
    }

    fn flush_backend(&mut self) -> Result<()> {
        self.flushes += 1;
        Ok(())
    }

    fn shutdown_backend(&mut self) -> Result<()> {
        Ok(())
    }

    fn capacity_bytes(&self) -> Option<u64> {
        Some(self.bytes.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_backend_records_transfers() {
        let mut backend = MemoryBackend::new(64);
        backend.write_backend(8, b"abc").unwrap();

        let mut buf = [0u8; 3];
        backend.read_backend(8, &mut buf).unwrap();

        assert_eq!(&buf, b"abc");
        assert_eq!(backend.writes(), &[(8, 3)]);
        assert_eq!(backend.reads(), &[(8, 3)]);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut backend = MemoryBackend::new(16);
        assert!(matches!(
            backend.write_backend(14, b"abc"),
            Err(Error::AddressOutOfRange { .. })
        ));
        assert!(backend
            .read_backend(u64::MAX, &mut [0u8; 2])
            .is_err());
        assert!(backend.writes().is_empty());
    }

    #[test]
    fn test_check_range_unbounded() {
        assert!(check_range(u64::MAX - 1, 1, None).is_ok());
        assert!(check_range(0, 16, Some(16)).is_ok());
        assert!(check_range(1, 16, Some(16)).is_err());
    }
}
