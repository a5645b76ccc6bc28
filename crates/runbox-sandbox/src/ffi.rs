//! Flat C ABI for embedding the runner outside Rust.

use std::ffi::CStr;
use std::os::fd::BorrowedFd;
use std::slice;

use crate::outcome::RunOutcome;
use crate::runner::{run_raw, RawRequest};

/// Result codes for [`run_command`].
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunCommandStatus {
    ChildTerminated,
    FailurePipeCreate,
    FailureClone,
    FailureRead,
    FailurePreExecve,
    FailurePoll,
    FailureTimeout,
    FailureWait,
}

/// Run a program inside a fresh namespace set; C-callable.
///
/// On `ChildTerminated`, `*wait_status_out` receives the raw wait-status
/// word for the `WIFEXITED`/`WIFSIGNALED` family. On `FailurePreExecve`,
/// the child's report is left in `error_buffer` and `*wait_status_out`
/// receives the payload length. `log_file` must stay open for the
/// duration of the call.
///
/// # Safety
///
/// `wait_status_out` must be a valid writable int. `error_buffer` must
/// point to `error_buffer_len` writable bytes, or be null with a zero
/// length. `execve_pathname` must be NUL-terminated; `execve_argv` and
/// `execve_envp` must be NULL-terminated arrays of NUL-terminated
/// strings. `log_file` must be an open, writable descriptor.
#[no_mangle]
pub unsafe extern "C" fn run_command(
    wait_status_out: *mut libc::c_int,
    error_buffer: *mut u8,
    error_buffer_len: usize,
    log_file: libc::c_int,
    execve_pathname: *const libc::c_char,
    execve_argv: *const *const libc::c_char,
    execve_envp: *const *const libc::c_char,
    timeout: libc::timespec,
) -> RunCommandStatus {
    // SAFETY: the caller guarantees pathname validity and that log_file is
    // open for the duration of the call.
    let request = RawRequest {
        pathname: unsafe { CStr::from_ptr(execve_pathname) },
        argv: execve_argv,
        envp: execve_envp,
        log_file: unsafe { BorrowedFd::borrow_raw(log_file) },
        timeout,
    };

    let mut empty: [u8; 0] = [];
    let buffer = if error_buffer.is_null() {
        &mut empty[..]
    } else {
        // SAFETY: the caller guarantees the buffer spans error_buffer_len
        // writable bytes.
        unsafe { slice::from_raw_parts_mut(error_buffer, error_buffer_len) }
    };

    // SAFETY: argv/envp validity is the caller's contract, forwarded.
    let outcome = unsafe { run_raw(&request, buffer) };

    match outcome {
        RunOutcome::ChildTerminated { wait_status } => {
            // SAFETY: wait_status_out is a valid writable int.
            unsafe { *wait_status_out = wait_status };
            RunCommandStatus::ChildTerminated
        }
        RunOutcome::FailurePreExecve { len } => {
            // SAFETY: as above.
            unsafe { *wait_status_out = len as libc::c_int };
            RunCommandStatus::FailurePreExecve
        }
        RunOutcome::FailurePipeCreate { .. } => RunCommandStatus::FailurePipeCreate,
        RunOutcome::FailureClone { .. } => RunCommandStatus::FailureClone,
        RunOutcome::FailureRead { .. } => RunCommandStatus::FailureRead,
        RunOutcome::FailurePoll { .. } => RunCommandStatus::FailurePoll,
        RunOutcome::FailureTimeout => RunCommandStatus::FailureTimeout,
        RunOutcome::FailureWait => RunCommandStatus::FailureWait,
    }
}
