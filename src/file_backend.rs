//! Pre-sized backing file at the bottom of the hierarchy

use crate::backend::{check_range, Backend};
use crate::error::{Error, Result};
use crate::stats::FileStats;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Flat file of exactly `maximum_size` bytes, addressed by byte offset
pub struct FileBackend {
    file: File,
    path: PathBuf,
    maximum_size: u64,
    sync_on_flush: bool,
    stats: FileStats,
}

impl FileBackend {
    /// Create (or truncate) `path` and size it to `maximum_size` bytes
    pub fn open<P: AsRef<Path>>(path: P, maximum_size: u64, sync_on_flush: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if maximum_size == 0 {
            error!("page file {} must have a non-zero size", path.display());
            return Err(Error::InvalidCapacity(
                "page file size must be non-zero".to_string(),
            ));
        }

        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)?;
            file.seek(SeekFrom::Start(maximum_size - 1))?;
            file.write_all(&[0])?;
        }

        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        info!("opened page file {} ({} bytes)", path.display(), maximum_size);

        Ok(Self {
            file,
            path,
            maximum_size,
            sync_on_flush,
            stats: FileStats::default(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn maximum_size(&self) -> u64 {
        self.maximum_size
    }

    pub fn stats(&self) -> &FileStats {
        &self.stats
    }

    pub fn read(&mut self, address: u64, buf: &mut [u8]) -> Result<()> {
        check_range(address, buf.len(), Some(self.maximum_size))?;
        self.file.seek(SeekFrom::Start(address))?;
        self.file.read_exact(buf).map_err(|e| {
            error!("read of {} bytes at 0x{:x} failed: {}", buf.len(), address, e);
            e
        })?;
        self.stats.record_read(buf.len());
        Ok(())
    }

    pub fn write(&mut self, address: u64, buf: &[u8]) -> Result<()> {
        check_range(address, buf.len(), Some(self.maximum_size))?;
        self.file.seek(SeekFrom::Start(address))?;
        self.file.write_all(buf).map_err(|e| {
            error!("write of {} bytes at 0x{:x} failed: {}", buf.len(), address, e);
            e
        })?;
        self.stats.record_write(buf.len());
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.file.flush()?;
        if self.sync_on_flush {
            self.file.sync_all()?;
        }
        Ok(())
    }
}

impl Backend for FileBackend {
    fn read_backend(&mut self, address: u64, buf: &mut [u8]) -> Result<()> {
        self.read(address, buf)
    }

    fn write_backend(&mut self, address: u64, buf: &[u8]) -> Result<()> {
        self.write(address, buf)
    }

    fn flush_backend(&mut self) -> Result<()> {
        self.flush()
    }

    fn shutdown_backend(&mut self) -> Result<()> {
        debug!("closing page file {}", self.path.display());
        self.flush()
    }

    fn capacity_bytes(&self) -> Option<u64> {
        Some(self.maximum_size)
    }
}
