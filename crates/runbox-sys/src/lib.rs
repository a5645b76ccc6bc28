//! Low-level Linux syscall wrappers for process sandboxing.
//!
//! This crate provides thin wrappers around Linux-specific syscalls that are
//! not available in rustix or libc. For standard syscalls, use rustix.
//!
//! ## Modules
//!
//! - **clone3** - The `clone3` system call and its argument struct
//!
//! ## Kernel requirements
//!
//! `clone3` with `CLONE_PIDFD` requires Linux 5.3+. There is deliberately no
//! `fork`/`unshare` fallback: the caller combines a pidfd with a poll-based
//! timeout, and only `clone3` can create the pidfd atomically with the child.

pub mod clone3;

pub use clone3::{clone3, CloneArgs, SANDBOX_NAMESPACES};

#[inline]
pub fn last_errno() -> rustix::io::Errno {
    // SAFETY: __errno_location always returns a valid thread-local pointer.
    rustix::io::Errno::from_raw_os_error(unsafe { *libc::__errno_location() })
}
