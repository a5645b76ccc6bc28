//! C ABI for the script backend.
//!
//! Four symbols mirror the backend lifecycle: `backend_init` once per
//! process, then `backend_new`/`backend_run_js`/`backend_drop` per
//! isolate. Handles are opaque; a handle may only be used by one thread
//! at a time.

use std::ptr;
use std::slice;
use std::str;

use crate::ScriptBackend;

/// Process-wide engine initialization.
///
/// Call once before any [`backend_new`]; concurrent first calls are
/// serialized internally.
#[no_mangle]
pub extern "C" fn backend_init() {
    crate::init();
}

/// Create a backend. Returns null if creation failed.
#[no_mangle]
pub extern "C" fn backend_new() -> *mut ScriptBackend {
    match ScriptBackend::new() {
        Some(backend) => Box::into_raw(Box::new(backend)),
        None => ptr::null_mut(),
    }
}

/// Compile and evaluate `source_len` bytes of UTF-8 source. Returns
/// `false` on any failure; the result value is discarded.
///
/// # Safety
///
/// `backend` must be a live handle from [`backend_new`], used by no other
/// thread; `source_ptr` must point to `source_len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn backend_run_js(
    backend: *mut ScriptBackend,
    source_ptr: *const u8,
    source_len: usize,
) -> bool {
    // SAFETY: the caller guarantees the handle is live and exclusive and
    // the source range readable.
    let backend = unsafe { &mut *backend };
    let source = unsafe { slice::from_raw_parts(source_ptr, source_len) };

    let Ok(source) = str::from_utf8(source) else {
        return false;
    };
    backend.run_js_no_unwind(source)
}

/// Release a backend and everything it owns. Null is ignored.
///
/// # Safety
///
/// `backend` must be null or a live handle from [`backend_new`], and must
/// not be used afterwards.
#[no_mangle]
pub unsafe extern "C" fn backend_drop(backend: *mut ScriptBackend) {
    if !backend.is_null() {
        // SAFETY: the handle came from Box::into_raw in backend_new.
        drop(unsafe { Box::from_raw(backend) });
    }
}
