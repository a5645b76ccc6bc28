//! Sandbox run requests.
//!
//! A [`RunRequest`] describes one command execution: the program, its
//! argument and environment vectors, the log sink, and the wall-clock
//! timeout.
//!
//! ## Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `argv` | empty; callers push argv\[0\] themselves |
//! | `envp` | empty; the environment is exact, nothing is inherited |
//! | `timeout` | 30 seconds |

use std::ffi::CString;
use std::os::fd::BorrowedFd;
use std::time::Duration;

/// Default wall-clock budget for a run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Everything needed to run one command in the sandbox.
#[derive(Debug)]
pub struct RunRequest<'a> {
    /// Absolute path to the program to run.
    pub(crate) program: CString,

    /// Arguments to the program.
    ///
    /// This includes the zeroth argument, which is normally equal to the
    /// program path.
    pub(crate) argv: Vec<CString>,

    /// The *exact* environment of the program, as `KEY=value` entries.
    /// The runner adds nothing and inherits nothing.
    pub(crate) envp: Vec<CString>,

    /// Becomes the child's stdout and stderr.
    ///
    /// Borrowed, not duplicated: the caller must keep the descriptor open
    /// until [`run`](crate::run) returns.
    pub(crate) log_file: BorrowedFd<'a>,

    /// How much wall-clock time the program may spend.
    ///
    /// If the program spends more than this, it is killed and the run
    /// fails with [`RunError::Timeout`](crate::RunError::Timeout).
    pub(crate) timeout: Duration,
}

impl<'a> RunRequest<'a> {
    pub fn new(program: CString, log_file: BorrowedFd<'a>) -> Self {
        Self {
            program,
            argv: Vec::new(),
            envp: Vec::new(),
            log_file,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: CString) -> Self {
        self.argv.push(arg);
        self
    }

    /// Append one `KEY=value` environment entry.
    pub fn env(mut self, var: CString) -> Self {
        self.envp.push(var);
        self
    }

    /// Replace the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
