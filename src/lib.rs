//! tiermem: tiered virtual memory over a page file
//!
//! Byte-addressed reads and writes go through a stack of page caches (RAM,
//! PSRAM, block-allocated himem) before reaching a pre-sized file. Each tier
//! keeps pages resident with recency ordering and writes back only the bytes
//! that changed.

#![allow(clippy::missing_safety_doc)]

pub mod backend;
pub mod config;
pub mod direct_cache;
pub mod error;
pub mod fast_cache;
pub mod ffi;
pub mod file_backend;
pub mod himem;
pub mod ordered_index;
pub mod page_cache;
pub mod stats;
pub mod vmm;

pub use backend::{Backend, MemoryBackend};
pub use config::{ConfigBuilder, Profile, TierConfig, VmmConfig};
pub use direct_cache::DirectCache;
pub use error::{Error, Result};
pub use fast_cache::{CacheHandler, FastCache};
pub use file_backend::FileBackend;
pub use himem::{HimemAccess, HimemAllocator, HimemProvider};
pub use ordered_index::OrderedIndex;
pub use page_cache::{DirtyRange, HeapCache, HimemCache, PageCache};
pub use stats::VmmStats;
pub use vmm::Vmm;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

/// Get version information
#[no_mangle]
pub extern "C" fn tiermem_version() -> *const libc::c_char {
    concat!(env!("CARGO_PKG_VERSION"), "\0").as_ptr() as *const libc::c_char
}
