//! Termination statuses of a sandbox run.

use std::time::Duration;

use rustix::io::Errno;
use thiserror::Error;

use crate::report::PreExecReport;

/// Wire-level outcome of a run.
///
/// One variant per status code of the flat ABI; [`run`](crate::run) folds
/// this into `Result<ExitStatus, RunError>` for Rust callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The child ran and terminated; `wait_status` is the raw kernel
    /// wait-status word.
    ChildTerminated { wait_status: libc::c_int },
    /// Creating the error pipe failed; nothing was launched.
    FailurePipeCreate { errno: Errno },
    /// `clone3` refused the namespace request.
    FailureClone { errno: Errno },
    /// Reading the error pipe failed.
    FailureRead { errno: Errno },
    /// The child failed before `execve`; `len` payload bytes were written
    /// into the error buffer.
    FailurePreExecve { len: usize },
    /// Polling the pidfd failed.
    FailurePoll { errno: Errno },
    /// The child outlived its wall-clock budget and was killed.
    FailureTimeout,
    /// `waitpid` did not return the child's pid.
    FailureWait,
}

/// Failure returned by [`run`](crate::run).
#[derive(Debug, Error)]
pub enum RunError {
    #[error("create error pipe: {0}")]
    PipeCreate(Errno),

    #[error("clone sandbox child: {0}")]
    Clone(Errno),

    #[error("read from error pipe: {0}")]
    Read(Errno),

    #[error("pre-exec setup: {0}")]
    PreExec(PreExecError),

    #[error("poll sandbox child: {0}")]
    Poll(Errno),

    #[error("sandbox child exceeded timeout of {0:?}")]
    Timeout(Duration),

    #[error("wait status did not come from the sandbox child")]
    Wait,
}

/// A failure in the child between `clone3` and `execve`.
///
/// `site` names the syscall that failed, `errno` is the error it reported.
/// Suitable for surfacing verbatim in an action log.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{site}: {errno}")]
pub struct PreExecError {
    pub errno: Errno,
    pub site: String,
}

impl From<PreExecReport<'_>> for PreExecError {
    fn from(report: PreExecReport<'_>) -> Self {
        Self {
            errno: report.errno,
            site: report.site.to_owned(),
        }
    }
}
