//! C ABI over the memory hierarchy.
//!
//! Callers get opaque integer handles instead of pointers; the handle->VMM
//! mapping lives in a Rust-owned registry. Functions return 0 on success and
//! -1 on failure, and constructors return handle 0 on failure.
use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int};
use std::path::PathBuf;
use std::slice;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{error, warn};

use crate::config::{TierConfig, VmmConfig};
use crate::error::{Error, Result};
use crate::vmm::Vmm;

// Registry lock is only held to look a handle up; each VMM has its own lock
// so a long transfer on one handle does not block the others.
lazy_static::lazy_static! {
    static ref VMM_HANDLES: Mutex<HashMap<usize, Arc<Mutex<Vmm>>>> = Mutex::new(HashMap::new());
    static ref NEXT_HANDLE: Mutex<usize> = Mutex::new(1);
}

// Handles are never reused, so a stale handle can't reach a newer VMM.
fn next_handle() -> usize {
    let mut handle = NEXT_HANDLE.lock();
    let id = *handle;
    *handle += 1;
    id
}

fn lookup(handle: usize) -> Result<Arc<Mutex<Vmm>>> {
    match VMM_HANDLES.lock().get(&handle) {
        Some(vmm) => Ok(Arc::clone(vmm)),
        None => {
            error!("unknown vmm handle {}", handle);
            Err(Error::InvalidHandle(handle))
        }
    }
}

fn with_vmm<T>(handle: usize, f: impl FnOnce(&mut Vmm) -> Result<T>) -> Result<T> {
    let vmm = lookup(handle)?;
    let mut guard = vmm.lock();
    f(&mut guard)
}

fn status(result: Result<()>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(e) => {
            error!("vmm call failed: {}", e);
            -1
        }
    }
}

/// Create a VMM backed by the page file at `path`
///
/// Returns 0 on failure.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub extern "C" fn tiermem_vmm_create(
    path: *const c_char,
    maximum_size: u64,
    himem_page_size: usize,
    himem_pages: usize,
    psram_page_size: usize,
    psram_pages: usize,
    ram_page_size: usize,
    ram_pages: usize,
) -> usize {
    if path.is_null() {
        return 0;
    }

    let path = match unsafe { CStr::from_ptr(path) }.to_str() {
        Ok(s) => PathBuf::from(s),
        Err(_) => return 0,
    };

    let config = VmmConfig {
        pagefile: path,
        maximum_size,
        ram: TierConfig::new(ram_page_size, ram_pages),
        psram: TierConfig::new(psram_page_size, psram_pages),
        himem: TierConfig::new(himem_page_size, himem_pages),
        sync_on_flush: false,
    };

    let vmm = match Vmm::create(config) {
        Ok(vmm) => vmm,
        Err(e) => {
            error!("tiermem_vmm_create failed: {}", e);
            return 0;
        }
    };

    let handle = next_handle();
    VMM_HANDLES.lock().insert(handle, Arc::new(Mutex::new(vmm)));
    handle
}

/// Read `len` bytes at `address` into `buf`
#[no_mangle]
pub extern "C" fn tiermem_vmm_read(handle: usize, address: u64, buf: *mut u8, len: usize) -> c_int {
    if buf.is_null() {
        return -1;
    }

    // The caller guarantees `buf` is valid for `len` bytes.
    let buf = unsafe { slice::from_raw_parts_mut(buf, len) };
    status(with_vmm(handle, |vmm| vmm.read(address, buf)))
}

/// Write `len` bytes from `buf` at `address`
#[no_mangle]
pub extern "C" fn tiermem_vmm_write(
    handle: usize,
    address: u64,
    buf: *const u8,
    len: usize,
) -> c_int {
    if buf.is_null() {
        return -1;
    }

    let buf = unsafe { slice::from_raw_parts(buf, len) };
    status(with_vmm(handle, |vmm| vmm.write(address, buf)))
}

#[no_mangle]
pub extern "C" fn tiermem_vmm_flush(handle: usize) -> c_int {
    status(with_vmm(handle, |vmm| vmm.flush()))
}

/// Flush and tear down; the handle is invalid afterwards
#[no_mangle]
pub extern "C" fn tiermem_vmm_destroy(handle: usize) -> c_int {
    let vmm = match VMM_HANDLES.lock().remove(&handle) {
        Some(vmm) => vmm,
        None => return -1,
    };

    match Arc::try_unwrap(vmm) {
        Ok(vmm) => status(vmm.into_inner().destroy()),
        Err(_) => {
            // Still borrowed by an in-flight call; the last drop writes back.
            warn!("vmm handle {} destroyed while in use", handle);
            0
        }
    }
}
