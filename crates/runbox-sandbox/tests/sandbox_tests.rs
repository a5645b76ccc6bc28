//! End-to-end tests for the sandbox runner.
//!
//! These run real commands inside the namespace sandbox and therefore
//! require a kernel with `clone3` and unprivileged user namespaces
//! enabled.

use std::ffi::CString;
use std::fs::File;
use std::io::{Read, Seek};
use std::os::fd::{AsFd, AsRawFd};
use std::path::Path;
use std::time::{Duration, Instant};

use runbox_sandbox::ffi::{run_command, RunCommandStatus};
use runbox_sandbox::{run, RunError, RunRequest};

fn cstr(s: &str) -> CString {
    CString::new(s).unwrap()
}

/// Run `sh -c <script>` in the sandbox and return the result plus
/// whatever the child wrote to the log.
fn run_sh(
    script: &str,
    timeout: Duration,
) -> (Result<std::process::ExitStatus, RunError>, String) {
    let mut log = tempfile::tempfile().unwrap();
    let request = RunRequest::new(cstr("/bin/sh"), log.as_fd())
        .arg(cstr("sh"))
        .arg(cstr("-c"))
        .arg(cstr(script))
        .env(cstr("PATH=/usr/bin:/bin"))
        .timeout(timeout);
    let result = run(&request);

    log.rewind().unwrap();
    let mut output = String::new();
    log.read_to_string(&mut output).unwrap();
    (result, output)
}

fn tool_available(name: &str) -> bool {
    [format!("/usr/bin/{name}"), format!("/bin/{name}")]
        .iter()
        .any(|p| Path::new(p).exists())
}

#[test]
fn true_exits_zero() {
    let log = tempfile::tempfile().unwrap();
    let request = RunRequest::new(cstr("/bin/true"), log.as_fd())
        .arg(cstr("true"))
        .timeout(Duration::from_secs(5));
    let status = run(&request).unwrap();
    assert_eq!(status.code(), Some(0));
}

#[test]
fn false_exits_one() {
    let log = tempfile::tempfile().unwrap();
    let request = RunRequest::new(cstr("/bin/false"), log.as_fd())
        .arg(cstr("false"))
        .timeout(Duration::from_secs(5));
    let status = run(&request).unwrap();
    assert_eq!(status.code(), Some(1));
}

#[test]
fn timeout_kills_the_child() {
    let log = tempfile::tempfile().unwrap();
    let request = RunRequest::new(cstr("/bin/sleep"), log.as_fd())
        .arg(cstr("sleep"))
        .arg(cstr("10"))
        .timeout(Duration::from_millis(500));

    let start = Instant::now();
    let result = run(&request);
    let elapsed = start.elapsed();

    assert!(matches!(result, Err(RunError::Timeout(_))));
    assert!(elapsed < Duration::from_secs(5), "kill was not prompt: {elapsed:?}");
    assert_eq!(zombie_sleep_children(), 0, "timed-out child was not reaped");
}

/// Count zombie children of this process whose command is `sleep`.
fn zombie_sleep_children() -> usize {
    let my_pid = std::process::id().to_string();
    let mut count = 0;
    for entry in std::fs::read_dir("/proc").unwrap().flatten() {
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }
        let Ok(stat) = std::fs::read_to_string(entry.path().join("stat")) else {
            continue;
        };
        // Fields: pid (comm) state ppid ...; comm may itself contain
        // parentheses, so split at the last closing one.
        let Some(close) = stat.rfind(')') else { continue };
        let open = stat.find('(').map(|i| i + 1).unwrap_or(0);
        let comm = &stat[open..close];
        let rest: Vec<&str> = stat[close + 1..].split_whitespace().collect();
        if comm == "sleep" && rest.first() == Some(&"Z") && rest.get(1) == Some(&my_pid.as_str())
        {
            count += 1;
        }
    }
    count
}

#[test]
fn missing_program_reports_pre_exec_enoent() {
    let log = tempfile::tempfile().unwrap();
    let request = RunRequest::new(cstr("/nonexistent/binary"), log.as_fd())
        .arg(cstr("binary"))
        .timeout(Duration::from_secs(5));

    match run(&request) {
        Err(RunError::PreExec(error)) => {
            assert_eq!(error.errno.raw_os_error(), libc::ENOENT);
            assert_eq!(error.site, "execve");
        }
        other => panic!("expected pre-exec failure, got {other:?}"),
    }
}

#[test]
fn stderr_is_captured_in_the_log() {
    let (result, output) = run_sh("echo hi 1>&2", Duration::from_secs(5));
    assert_eq!(result.unwrap().code(), Some(0));
    assert_eq!(output, "hi\n");
}

#[test]
fn child_is_pid_1_and_root() {
    if !tool_available("id") {
        eprintln!("Skipping: id not found");
        return;
    }
    let (result, output) = run_sh("echo $$; id -u; id -g", Duration::from_secs(5));
    assert_eq!(result.unwrap().code(), Some(0));
    assert_eq!(output, "1\n0\n0\n");
}

#[test]
fn hostname_changes_stay_inside() {
    if !tool_available("hostname") {
        eprintln!("Skipping: hostname not found");
        return;
    }
    let host_before = std::fs::read_to_string("/proc/sys/kernel/hostname").unwrap();

    let (result, output) = run_sh("hostname sandbox && hostname", Duration::from_secs(5));
    assert_eq!(result.unwrap().code(), Some(0));
    assert_eq!(output, "sandbox\n");

    let host_after = std::fs::read_to_string("/proc/sys/kernel/hostname").unwrap();
    assert_eq!(host_before, host_after);
}

#[test]
fn network_namespace_has_only_loopback() {
    let (result, output) = run_sh("cat /proc/net/dev", Duration::from_secs(5));
    assert_eq!(result.unwrap().code(), Some(0));

    // Two header lines, then one line per interface.
    let interfaces: Vec<&str> = output.lines().skip(2).collect();
    assert_eq!(interfaces.len(), 1, "expected loopback only: {output}");
    assert!(interfaces[0].trim_start().starts_with("lo:"));
}

#[test]
fn no_descriptors_leak() {
    let before = open_fds();

    let log = tempfile::tempfile().unwrap();
    let request = RunRequest::new(cstr("/bin/true"), log.as_fd())
        .arg(cstr("true"))
        .timeout(Duration::from_secs(5));
    run(&request).unwrap();
    drop(log);

    assert_eq!(before, open_fds());
}

fn open_fds() -> Vec<String> {
    let mut fds: Vec<String> = std::fs::read_dir("/proc/self/fd")
        .unwrap()
        .flatten()
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    fds.sort();
    fds
}

#[test]
fn concurrent_runs_do_not_interfere() {
    let handles: Vec<_> = (0..10)
        .map(|_| {
            std::thread::spawn(|| {
                let log = tempfile::tempfile().unwrap();
                let request = RunRequest::new(cstr("/bin/true"), log.as_fd())
                    .arg(cstr("true"))
                    .timeout(Duration::from_secs(10));
                run(&request).unwrap()
            })
        })
        .collect();

    for handle in handles {
        let status = handle.join().unwrap();
        assert_eq!(status.code(), Some(0));
    }
}

#[test]
fn ffi_reports_pre_exec_payload() {
    let log = tempfile::tempfile().unwrap();
    let pathname = cstr("/nonexistent/binary");
    let argv = [pathname.as_ptr(), std::ptr::null()];
    let envp = [std::ptr::null::<libc::c_char>()];
    let mut wait_status = -1;
    let mut buffer = [0u8; 128];

    let status = unsafe {
        run_command(
            &mut wait_status,
            buffer.as_mut_ptr(),
            buffer.len(),
            log.as_raw_fd(),
            pathname.as_ptr(),
            argv.as_ptr(),
            envp.as_ptr(),
            libc::timespec { tv_sec: 5, tv_nsec: 0 },
        )
    };

    assert_eq!(status, RunCommandStatus::FailurePreExecve);
    let len = wait_status as usize;
    assert_eq!(&buffer[..4], &libc::ENOENT.to_le_bytes());
    assert_eq!(&buffer[4..len], b"execve");
}

#[test]
fn ffi_reports_wait_status() {
    let log = tempfile::tempfile().unwrap();
    let pathname = cstr("/bin/false");
    let argv0 = cstr("false");
    let argv = [argv0.as_ptr(), std::ptr::null()];
    let envp = [std::ptr::null::<libc::c_char>()];
    let mut wait_status = -1;
    let mut buffer = [0u8; 128];

    let status = unsafe {
        run_command(
            &mut wait_status,
            buffer.as_mut_ptr(),
            buffer.len(),
            log.as_raw_fd(),
            pathname.as_ptr(),
            argv.as_ptr(),
            envp.as_ptr(),
            libc::timespec { tv_sec: 5, tv_nsec: 0 },
        )
    };

    assert_eq!(status, RunCommandStatus::ChildTerminated);
    assert!(libc::WIFEXITED(wait_status));
    assert_eq!(libc::WEXITSTATUS(wait_status), 1);
}

#[test]
fn log_writes_append_after_existing_content() {
    use std::io::Write;

    let mut log: File = tempfile::tempfile().unwrap();
    write!(log, "before\n").unwrap();

    let request = RunRequest::new(cstr("/bin/sh"), log.as_fd())
        .arg(cstr("sh"))
        .arg(cstr("-c"))
        .arg(cstr("echo during"))
        .timeout(Duration::from_secs(5));
    run(&request).unwrap();

    log.rewind().unwrap();
    let mut output = String::new();
    log.read_to_string(&mut output).unwrap();
    assert_eq!(output, "before\nduring\n");
}
