//! The `clone3` system call.
//!
//! libc exposes the `SYS_clone3` number but neither a wrapper function nor
//! the argument struct, so both live here. See clone3(2).

use std::mem::size_of;

/// Arguments to the `clone3` system call.
///
/// Layout matches `struct clone_args` in `linux/sched.h`. Every field is a
/// `u64` regardless of its logical type; pointers are cast in.
#[repr(C)]
#[derive(Debug, Default)]
pub struct CloneArgs {
    pub flags: u64,
    pub pidfd: u64,
    pub child_tid: u64,
    pub parent_tid: u64,
    pub exit_signal: u64,
    pub stack: u64,
    pub stack_size: u64,
    pub tls: u64,
    pub set_tid: u64,
    pub set_tid_size: u64,
    pub cgroup: u64,
}

/// The namespace set for a fully isolated sandbox child.
///
/// Covers cgroup, IPC, network, mount, PID, user, and UTS. The user
/// namespace is what lets an unprivileged caller create all the others.
pub const SANDBOX_NAMESPACES: u64 = (libc::CLONE_NEWCGROUP
    | libc::CLONE_NEWIPC
    | libc::CLONE_NEWNET
    | libc::CLONE_NEWNS
    | libc::CLONE_NEWPID
    | libc::CLONE_NEWUSER
    | libc::CLONE_NEWUTS) as u64;

/// Invoke `clone3`.
///
/// Like `fork`: returns 0 in the child, the child's pid in the parent, and
/// -1 with errno set on failure. If `CLONE_PIDFD` is set, the fd is stored
/// through the pointer in `args.pidfd` before the call returns in the
/// parent.
///
/// # Safety
///
/// Pointer-valued fields in `args` must point to valid memory. In the
/// child, the caller must restrict itself to async-signal-safe operations
/// until `execve` or `_exit`.
pub unsafe fn clone3(args: &mut CloneArgs) -> libc::c_long {
    // syscall(2) is variadic, so be explicit about argument types.
    libc::syscall(
        libc::SYS_clone3,
        args as *mut CloneArgs,
        size_of::<CloneArgs>() as libc::size_t,
    )
}
