//! runbox-sandbox: namespace-isolated command execution for action
//! runners.
//!
//! Spawns a program in a fresh set of Linux namespaces (cgroup, IPC,
//! network, mount, PID, user, UTS), supervises it against a wall-clock
//! timeout, and reports a structured termination status. Failures in the
//! child before `execve` travel back over a close-on-exec pipe, so "the
//! program could not be started" is always distinguishable from "the
//! program ran and failed".
//!
//! ## Quick start
//!
//! ```ignore
//! use std::os::fd::AsFd;
//! use runbox_sandbox::{run, RunRequest};
//!
//! let log = tempfile::tempfile()?;
//! let request = RunRequest::new(c"/bin/true".into(), log.as_fd())
//!     .arg(c"true".into());
//! let status = run(&request)?;
//! assert!(status.success());
//! ```
//!
//! ## Requirements
//!
//! - Linux 5.3+ (`clone3` with `CLONE_PIDFD`)
//! - Unprivileged user namespaces enabled
//!
//! The runner is strictly synchronous: one blocking call per invocation;
//! callers that want concurrency run on multiple threads. There is no
//! EINTR handling because the embedding program installs no signal
//! handlers.

#![warn(unsafe_op_in_unsafe_fn)]

pub mod ffi;
mod guard;
pub mod outcome;
pub mod report;
pub mod request;
pub mod runner;

pub use outcome::{PreExecError, RunError, RunOutcome};
pub use request::{RunRequest, DEFAULT_TIMEOUT};
pub use runner::run;
