//! The sandbox run loop.
//!
//! One blocking call per run, in strict phase order:
//!
//! 1. Pre-clone preparation: identity-map strings and execve pointer
//!    arrays, built while allocation is still safe.
//! 2. Error pipe creation (`O_CLOEXEC` on both ends).
//! 3. `clone3` with the full namespace set plus `CLONE_PIDFD`.
//! 4. Child: identity maps, stdio redirection, `execve`. Parent: arm the
//!    kill-and-reap guard.
//! 5. Pipe handshake: one read that distinguishes "execve happened" (EOF)
//!    from a pre-exec failure report.
//! 6. Bounded wait: `ppoll` on the pidfd with the caller's timeout.
//! 7. Reap: `waitpid`, disarm the guard, return the wait-status word.
//!
//! Everything the child touches after `clone3` is async-signal-safe:
//! direct syscalls on buffers prepared in phase 1. The parent's heap may
//! be mid-mutation on sibling threads at clone time, so the child must
//! never allocate.

use std::ffi::{CStr, CString};
use std::os::fd::{AsRawFd, BorrowedFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;
use std::ptr::{addr_of_mut, copy_nonoverlapping, null};
use std::time::Duration;

use rustix::io::Errno;
use rustix::process::{getgid, getuid};

use runbox_sys::{clone3, last_errno, CloneArgs, SANDBOX_NAMESPACES};

use crate::guard::ChildGuard;
use crate::outcome::{RunError, RunOutcome};
use crate::report;
use crate::request::RunRequest;

/// Run the request's program inside a fresh namespace set and wait for it.
///
/// Blocks the calling thread until the child terminates or the timeout
/// expires. Reentrant across threads, provided each call has its own log
/// descriptor.
pub fn run(request: &RunRequest<'_>) -> Result<ExitStatus, RunError> {
    let argv = nul_terminated_ptrs(&request.argv);
    let envp = nul_terminated_ptrs(&request.envp);
    let raw = RawRequest {
        pathname: &request.program,
        argv: argv.as_ptr(),
        envp: envp.as_ptr(),
        log_file: request.log_file,
        timeout: timespec_from(request.timeout),
    };

    let mut error_buffer = [0u8; report::MAX_PAYLOAD];
    // SAFETY: the pointer arrays are NULL-terminated and live across the
    // call; the strings they point into belong to `request`.
    let outcome = unsafe { run_raw(&raw, &mut error_buffer) };

    match outcome {
        RunOutcome::ChildTerminated { wait_status } => Ok(ExitStatus::from_raw(wait_status)),
        RunOutcome::FailurePipeCreate { errno } => Err(RunError::PipeCreate(errno)),
        RunOutcome::FailureClone { errno } => Err(RunError::Clone(errno)),
        RunOutcome::FailureRead { errno } => Err(RunError::Read(errno)),
        RunOutcome::FailurePreExecve { len } => {
            // The child sends the whole report in one atomic write, so the
            // payload always carries at least the errno word.
            let decoded = report::PreExecReport::decode(&error_buffer[..len])
                .ok_or(RunError::Read(Errno::IO))?;
            Err(RunError::PreExec(decoded.into()))
        }
        RunOutcome::FailurePoll { errno } => Err(RunError::Poll(errno)),
        RunOutcome::FailureTimeout => Err(RunError::Timeout(request.timeout)),
        RunOutcome::FailureWait => Err(RunError::Wait),
    }
}

/// A run request lowered to what the child zone can consume: raw pointers
/// and a timespec, nothing that needs conversion after `clone3`.
pub(crate) struct RawRequest<'a> {
    pub pathname: &'a CStr,
    pub argv: *const *const libc::c_char,
    pub envp: *const *const libc::c_char,
    pub log_file: BorrowedFd<'a>,
    pub timeout: libc::timespec,
}

/// The error pipe.
///
/// Close-on-exec on both ends: the write end held by the child evaporates
/// on a successful `execve`, which is what turns the parent's read into
/// EOF.
struct Pipe {
    read: OwnedFd,
    write: OwnedFd,
}

impl Pipe {
    fn new() -> Result<Self, Errno> {
        let mut fds = [0i32; 2];
        // SAFETY: pipe2 writes into the valid two-element array.
        if unsafe { libc::pipe2(fds.as_mut_ptr(), libc::O_CLOEXEC) } != 0 {
            return Err(last_errno());
        }
        // SAFETY: on success both fds are valid and owned by us.
        Ok(Self {
            read: unsafe { OwnedFd::from_raw_fd(fds[0]) },
            write: unsafe { OwnedFd::from_raw_fd(fds[1]) },
        })
    }
}

/// The core of [`run`]: everything between pipe creation and the final
/// reap. On [`RunOutcome::FailurePreExecve`], the child's report is left
/// in `error_buffer`; at most [`report::MAX_PAYLOAD`] bytes are used.
///
/// # Safety
///
/// `request.argv` and `request.envp` must be NULL-terminated arrays of
/// pointers to NUL-terminated strings, valid for the duration of the call.
/// `request.log_file` must be open and writable.
pub(crate) unsafe fn run_raw(request: &RawRequest<'_>, error_buffer: &mut [u8]) -> RunOutcome {
    // Identity maps for the new user namespace: uid 0 inside is the
    // invoker's real uid outside. Formatted here, while allocation is
    // still safe.
    let uid_map = format!("0 {} 1\n", getuid().as_raw());
    let gid_map = format!("0 {} 1\n", getgid().as_raw());

    let pipe = match Pipe::new() {
        Ok(pipe) => pipe,
        Err(errno) => return RunOutcome::FailurePipeCreate { errno },
    };

    // Cap at the atomic-write limit; see the report module.
    let buffer_len = error_buffer.len().min(report::MAX_PAYLOAD);
    let error_buffer = &mut error_buffer[..buffer_len];

    let mut pidfd_slot: RawFd = -1;
    let mut cl_args = CloneArgs {
        flags: SANDBOX_NAMESPACES | libc::CLONE_PIDFD as u64,
        pidfd: addr_of_mut!(pidfd_slot) as u64,
        // Without an exit signal, waitpid fails with ECHILD.
        exit_signal: libc::SIGCHLD as u64,
        ..CloneArgs::default()
    };

    // SAFETY: cl_args points at valid memory; the child branch below
    // stays async-signal-safe until execve or _exit.
    let pid = unsafe { clone3(&mut cl_args) } as libc::pid_t;

    if pid == 0 {
        // Child. Nothing below this line may allocate, lock, or unwind.
        drop(pipe.read);
        child_after_clone(
            pipe.write.as_raw_fd(),
            request.log_file.as_raw_fd(),
            uid_map.as_bytes(),
            gid_map.as_bytes(),
            request.pathname.as_ptr(),
            request.argv,
            request.envp,
        )
    }

    if pid == -1 {
        // Both pipe ends close on drop.
        return RunOutcome::FailureClone { errno: last_errno() };
    }

    // From here on, every early return kills and reaps the child.
    let guard = ChildGuard::new(pid);

    // SAFETY: clone3 stored a valid descriptor for the parent.
    let pidfd = unsafe { OwnedFd::from_raw_fd(pidfd_slot) };

    tracing::debug!(pid, pidfd = pidfd.as_raw_fd(), "spawned sandbox child");

    // Give up our copy of the write end before reading; otherwise the
    // read below would never see EOF.
    drop(pipe.write);

    // A successful execve closes the child's write end via O_CLOEXEC and
    // the read returns 0. A pre-exec failure arrives as a payload.
    // SAFETY: the buffer is valid for buffer_len writable bytes.
    let nread = unsafe {
        libc::read(
            pipe.read.as_raw_fd(),
            error_buffer.as_mut_ptr().cast(),
            error_buffer.len(),
        )
    };
    if nread == -1 {
        return RunOutcome::FailureRead { errno: last_errno() };
    }
    if nread > 0 {
        // The child has already _exit(1)ed; the guard still reaps it.
        tracing::debug!(pid, len = nread, "child reported pre-exec failure");
        return RunOutcome::FailurePreExecve { len: nread as usize };
    }
    drop(pipe.read);

    // The pidfd polls readable once the child terminates. Unlike a pid
    // number, it cannot be confused by pid reuse.
    let mut pollfd = libc::pollfd {
        fd: pidfd.as_raw_fd(),
        events: libc::POLLIN,
        revents: 0,
    };
    // SAFETY: pollfd and the timespec are valid; no signal mask is passed
    // because this program installs no signal handlers.
    let rc = unsafe { libc::ppoll(&mut pollfd, 1, &request.timeout, null()) };
    if rc == -1 {
        return RunOutcome::FailurePoll { errno: last_errno() };
    }
    if rc == 0 {
        tracing::warn!(pid, "sandbox child timed out");
        return RunOutcome::FailureTimeout;
    }

    let mut wait_status: libc::c_int = 0;
    // SAFETY: pid is our unreaped child; wait_status is a valid out slot.
    if unsafe { libc::waitpid(pid, &mut wait_status, 0) } != pid {
        return RunOutcome::FailureWait;
    }
    guard.disarm();

    tracing::debug!(pid, wait_status, "reaped sandbox child");
    RunOutcome::ChildTerminated { wait_status }
}

/// The child side, from `clone3` returning 0 to `execve`.
///
/// This is the async-signal-safe zone: direct syscalls on pre-built
/// buffers only, no code path back out.
fn child_after_clone(
    pipe_w: RawFd,
    log_file: RawFd,
    uid_map: &[u8],
    gid_map: &[u8],
    pathname: *const libc::c_char,
    argv: *const *const libc::c_char,
    envp: *const *const libc::c_char,
) -> ! {
    // Kernels 3.19+ require setgroups to be denied before an unprivileged
    // process may write its gid_map.
    write_proc_file(pipe_w, b"/proc/self/setgroups\0", b"deny\n");
    write_proc_file(pipe_w, b"/proc/self/uid_map\0", uid_map);
    write_proc_file(pipe_w, b"/proc/self/gid_map\0", gid_map);

    // No input is piped in; stdout and stderr both go to the log sink.
    // dup2 clears O_CLOEXEC on the copies, which is exactly what the
    // exec'd program needs.
    // SAFETY: close and dup2 are async-signal-safe.
    unsafe {
        if libc::close(0) == -1 {
            fail(pipe_w, report::TAG_CLOSE);
        }
        if libc::dup2(log_file, 1) == -1 {
            fail(pipe_w, report::TAG_DUP2);
        }
        if libc::dup2(log_file, 2) == -1 {
            fail(pipe_w, report::TAG_DUP2);
        }
    }

    // SAFETY: pathname, argv, and envp were lowered by the parent and are
    // still alive; execve only returns on failure.
    unsafe {
        libc::execve(pathname, argv, envp);
    }
    fail(pipe_w, report::TAG_EXECVE)
}

/// Child-side open/write/close of one `/proc/self` identity-map file.
fn write_proc_file(pipe_w: RawFd, pathname: &'static [u8], data: &[u8]) {
    // SAFETY: open, write, and close are async-signal-safe; pathname is
    // NUL-terminated by construction.
    unsafe {
        let fd = libc::open(pathname.as_ptr().cast(), libc::O_WRONLY);
        if fd == -1 {
            fail(pipe_w, report::TAG_OPEN);
        }
        if libc::write(fd, data.as_ptr().cast(), data.len()) != data.len() as isize {
            fail(pipe_w, report::TAG_WRITE);
        }
        libc::close(fd);
    }
}

/// Child-side failure report: errno word plus site tag in one atomic
/// write, then immediate termination.
fn fail(pipe_w: RawFd, tag: &'static str) -> ! {
    let mut payload = [0u8; 4 + report::MAX_TAG];
    let tag_len = tag.len().min(report::MAX_TAG);
    // SAFETY: the errno read and the copies stay within the local buffer;
    // write and _exit are async-signal-safe.
    unsafe {
        let errnum = (*libc::__errno_location()).to_le_bytes();
        copy_nonoverlapping(errnum.as_ptr(), payload.as_mut_ptr(), 4);
        copy_nonoverlapping(tag.as_ptr(), payload.as_mut_ptr().add(4), tag_len);
        libc::write(pipe_w, payload.as_ptr().cast(), 4 + tag_len);
        libc::_exit(1)
    }
}

/// Lower CStrings to the NULL-terminated pointer array `execve` expects.
///
/// The pointers borrow from `strings`; the array must not outlive it.
fn nul_terminated_ptrs(strings: &[CString]) -> Vec<*const libc::c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(null()))
        .collect()
}

fn timespec_from(timeout: Duration) -> libc::timespec {
    libc::timespec {
        tv_sec: timeout.as_secs().try_into().unwrap_or(libc::time_t::MAX),
        tv_nsec: timeout.subsec_nanos() as libc::c_long,
    }
}
