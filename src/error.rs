use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Block {block_id} out of range (max {max_blocks})")]
    BlockOutOfRange { block_id: u16, max_blocks: u16 },

    #[error("Length {len} exceeds block size {block_size}")]
    LengthExceedsBlock { len: usize, block_size: usize },

    #[error("Range {offset}+{len} exceeds block size {block_size}")]
    OffsetOutOfBounds {
        offset: usize,
        len: usize,
        block_size: usize,
    },

    #[error("Address range 0x{address:x}+{len} exceeds {limit} bytes")]
    AddressOutOfRange { address: u64, len: usize, limit: u64 },

    #[error("No free block available")]
    NoSpace,

    #[error("Invalid block size: {0}")]
    InvalidBlockSize(String),

    #[error("Insufficient memory: requested {requested} blocks, {available} available")]
    InsufficientMemory { requested: u16, available: u16 },

    #[error("Reserved window area too small: {reserved} bytes, need {required}")]
    ReservedSpaceTooSmall { reserved: usize, required: usize },

    #[error("Invalid capacity: {0}")]
    InvalidCapacity(String),

    #[error("Short transfer: {transferred} of {requested} bytes")]
    ShortTransfer { transferred: usize, requested: usize },

    #[error("Bank switch error: {0}")]
    BankSwitch(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid handle: {0}")]
    InvalidHandle(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
