//! Kill-and-reap guard for the sandbox child.

use std::ptr::null_mut;

/// Owned obligation to leave no child behind.
///
/// From the moment `clone3` succeeds in the parent until the normal
/// `waitpid` completes, every early return must SIGKILL the child and reap
/// it; a run may never return with the child alive or zombied. Dropping an
/// armed guard does both. [`disarm`](Self::disarm) dismisses it once the
/// normal reap has happened.
pub(crate) struct ChildGuard {
    pid: libc::pid_t,
    armed: bool,
}

impl ChildGuard {
    pub fn new(pid: libc::pid_t) -> Self {
        Self { pid, armed: true }
    }

    /// Dismiss the guard; the child has been reaped normally.
    pub fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ChildGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // The child is sandboxed and opaque; there is nothing for it to
        // clean up, so no SIGTERM courtesy round. SIGKILL cannot be
        // blocked, so the blocking waitpid returns promptly.
        //
        // SAFETY: pid came from clone3 and has not been reaped, so it
        // cannot have been reused by another process.
        unsafe {
            libc::kill(self.pid, libc::SIGKILL);
            libc::waitpid(self.pid, null_mut(), 0);
        }
        tracing::debug!(pid = self.pid, "killed and reaped sandbox child");
    }
}
