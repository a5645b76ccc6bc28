//! Wire format of the pre-exec error report.
//!
//! When the child fails between `clone3` and `execve` it sends a single
//! report on the error pipe: a little-endian `i32` errno captured right
//! after the failing syscall, followed by an ASCII tag naming the syscall
//! site. There is no framing; the parent reads once and EOF delimits the
//! payload.

use rustix::io::Errno;

/// Largest payload the parent will accept.
///
/// A pipe write of at most `PIPE_BUF` bytes is atomic, so capping the read
/// here means the parent's single read sees the whole report or nothing.
pub const MAX_PAYLOAD: usize = libc::PIPE_BUF;

/// Longest site tag the child will ever write.
pub const MAX_TAG: usize = 16;

/// Site tag: opening a `/proc/self` identity-map file failed.
pub const TAG_OPEN: &str = "open";
/// Site tag: writing an identity-map file failed.
pub const TAG_WRITE: &str = "write";
/// Site tag: closing stdin failed.
pub const TAG_CLOSE: &str = "close";
/// Site tag: redirecting stdout/stderr to the log sink failed.
pub const TAG_DUP2: &str = "dup2";
/// Site tag: `execve` itself failed.
pub const TAG_EXECVE: &str = "execve";

/// A decoded pre-exec report, borrowing the received payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreExecReport<'a> {
    /// errno of the failed syscall.
    pub errno: Errno,
    /// Syscall site; one of the `TAG_*` constants for a well-known site.
    pub site: &'a str,
}

impl<'a> PreExecReport<'a> {
    /// Decode a payload received on the error pipe.
    ///
    /// Returns [`None`] if the payload is shorter than the errno word or
    /// the tag is not valid ASCII.
    pub fn decode(payload: &'a [u8]) -> Option<Self> {
        if payload.len() < 4 {
            return None;
        }
        let (errno, site) = payload.split_at(4);
        let errno = i32::from_le_bytes(errno.try_into().ok()?);
        let site = std::str::from_utf8(site).ok()?;
        Some(Self {
            errno: Errno::from_raw_os_error(errno),
            site,
        })
    }
}
