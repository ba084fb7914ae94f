//! The launch / drain / wait / terminate protocol.
//!
//! One [`ProcessExecutor::execute`] call runs exactly one process to
//! completion or forced termination. Both output pipes are drained in
//! their own tasks for the entire lifetime of the process, so a child
//! producing large output on either stream never blocks on a full pipe,
//! and natural exit is raced against the configured wall-clock limit.

use std::process::Stdio;
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::LaunchError;
use crate::invocation::Invocation;
use crate::result::{ExecutionResult, TIMED_OUT_EXIT_CODE};

/// Runs external processes described by [`Invocation`]s.
///
/// Stateless: every call owns its process handle and pipes exclusively, so
/// one executor can serve any number of concurrent callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessExecutor;

impl ProcessExecutor {
    pub fn new() -> Self {
        Self
    }

    /// Run `invocation` and return the complete outcome.
    ///
    /// Returns only after the process has exited (or been killed) and both
    /// output streams have reached end-of-stream, so no late bytes are
    /// dropped; output captured before a timeout kill is preserved on the
    /// result.
    ///
    /// # Errors
    ///
    /// [`LaunchError::WorkingDirectoryNotFound`] if the configured working
    /// directory is missing (checked before anything is spawned), and
    /// [`LaunchError::Spawn`] if the OS cannot create the process. A
    /// process that runs but exits non-zero or times out is *not* an
    /// error; see [`ExecutionResult::succeeded`] and
    /// [`ExecutionResult::timed_out`].
    ///
    /// # Platform notes
    ///
    /// On Unix the child is made its own process-group leader and a
    /// timeout SIGKILLs the whole group, taking out descendants the child
    /// spawned. Elsewhere only the direct child handle can be killed, so
    /// tree termination is best-effort.
    pub async fn execute(&self, invocation: &Invocation) -> Result<ExecutionResult, LaunchError> {
        if let Some(dir) = invocation.working_directory() {
            if !dir.is_dir() {
                return Err(LaunchError::WorkingDirectoryNotFound {
                    path: dir.to_path_buf(),
                });
            }
        }

        let started = Instant::now();
        let mut child = spawn_child(invocation)?;
        debug!(program = invocation.program(), pid = child.id(), "process spawned");

        // Drains must be running before stdin is written: a child that is
        // already producing output could otherwise fill a pipe and deadlock
        // against the write below.
        let stdout_task = drain(child.stdout.take());
        let stderr_task = drain(child.stderr.take());

        if let Some(mut stdin) = child.stdin.take() {
            if let Some(payload) = invocation.stdin_payload() {
                // Best-effort: the child may close stdin before reading it all.
                let _ = stdin.write_all(payload.as_bytes()).await;
            }
            drop(stdin); // signals end-of-input
        }

        let (exit_code, timed_out) = wait_or_kill(invocation, &mut child).await?;

        // The pipes hit EOF once every writer is gone, so joining here
        // guarantees drain completion happens before the result is built.
        let stdout = text(stdout_task.await.unwrap_or_default());
        let stderr = text(stderr_task.await.unwrap_or_default());

        let duration = started.elapsed();
        debug!(
            program = invocation.program(),
            exit_code,
            timed_out,
            duration_ms = duration.as_millis() as u64,
            stdout_len = stdout.len(),
            stderr_len = stderr.len(),
            "process finished"
        );

        Ok(if timed_out {
            ExecutionResult::terminated(stdout, stderr, duration)
        } else {
            ExecutionResult::completed(exit_code, stdout, stderr, duration)
        })
    }
}

/// Build and spawn the child with piped stdio and the invocation's
/// environment, working directory, and (Unix) its own process group.
fn spawn_child(invocation: &Invocation) -> Result<Child, LaunchError> {
    let mut cmd = Command::new(invocation.program());
    cmd.args(invocation.arguments())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if !invocation.inherits_env() {
        cmd.env_clear();
    }
    for (key, value) in invocation.env_overrides() {
        cmd.env(key, value);
    }
    if let Some(dir) = invocation.working_directory() {
        cmd.current_dir(dir);
    }

    // Own process group so a timeout can take out spawned descendants too.
    #[cfg(unix)]
    cmd.process_group(0);

    cmd.spawn().map_err(|source| LaunchError::Spawn {
        program: invocation.program().to_string(),
        source,
    })
}

/// Race natural exit against the configured time limit. Returns the exit
/// code and whether the process was killed on timeout.
async fn wait_or_kill(
    invocation: &Invocation,
    child: &mut Child,
) -> Result<(i32, bool), LaunchError> {
    let Some(limit) = invocation.time_limit() else {
        let status = child.wait().await.map_err(|source| LaunchError::Wait {
            program: invocation.program().to_string(),
            source,
        })?;
        return Ok((exit_code_of(&status), false));
    };

    match tokio::time::timeout(limit, child.wait()).await {
        Ok(Ok(status)) => Ok((exit_code_of(&status), false)),
        Ok(Err(source)) => Err(LaunchError::Wait {
            program: invocation.program().to_string(),
            source,
        }),
        Err(_elapsed) => {
            warn!(
                program = invocation.program(),
                pid = child.id(),
                timeout_ms = limit.as_millis() as u64,
                "time limit elapsed; killing process"
            );
            terminate(child).await;
            Ok((TIMED_OUT_EXIT_CODE, true))
        }
    }
}

/// Forcibly terminate the child. On Unix the whole process group is
/// SIGKILLed so descendants die with it; elsewhere only the direct child
/// handle can be killed. The child is reaped before returning.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        // The child is its own group leader; a negative pid addresses the
        // entire group.
        unsafe {
            libc::kill(-(pid as i32), libc::SIGKILL);
        }
    }

    // kill() also reaps the child, releasing the pid.
    if let Err(err) = child.kill().await {
        warn!(pid = child.id(), error = %err, "failed to kill timed-out process");
    }
}

/// Map an exit status to the result's exit code. Unix signal deaths use
/// the `128 + signal` shell convention, keeping [`TIMED_OUT_EXIT_CODE`]
/// unambiguous.
fn exit_code_of(status: &std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    status.code().unwrap_or(TIMED_OUT_EXIT_CODE)
}

/// Read an output pipe to end-of-stream into an owned buffer. Capture is
/// unbounded; whatever arrives before exit or termination is kept.
fn drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            // A read error means the pipe is gone; keep what was captured.
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

fn text(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes).into_owned()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert_matches::assert_matches;

    use super::*;
    use crate::result::SUCCESSFUL_EXIT_CODE;

    /// Build an invocation running `script` through `sh -c`.
    fn sh(script: &str) -> Invocation {
        Invocation::new("sh").args(["-c", script])
    }

    async fn run(invocation: &Invocation) -> ExecutionResult {
        ProcessExecutor::new()
            .execute(invocation)
            .await
            .expect("execute")
    }

    #[tokio::test]
    async fn echo_through_stdout() {
        let result = run(&sh("echo Hello World")).await;
        assert_eq!(result.stdout().trim(), "Hello World");
        assert_eq!(result.exit_code(), SUCCESSFUL_EXIT_CODE);
        assert!(result.succeeded());
        assert!(!result.timed_out());
        assert!(!result.has_error_output());
    }

    #[tokio::test]
    async fn large_output_is_fully_captured() {
        // Well past any OS pipe buffer; hangs here mean the drain is not
        // running alongside the wait.
        let result = run(&Invocation::new("seq").args(["1", "100000"])).await;
        assert!(result.succeeded());
        assert!(!result.timed_out());
        assert_eq!(result.stdout().lines().count(), 100_000);
        assert!(result.stdout().ends_with("100000\n"));
    }

    #[tokio::test]
    async fn no_timeout_still_completes() {
        let result = run(&sh("echo Hello World").no_timeout()).await;
        assert_eq!(result.stdout().trim(), "Hello World");
        assert!(result.succeeded());
    }

    #[tokio::test]
    async fn shell_reports_missing_command() {
        let result = run(&sh("zerk-missing-tool foo")).await;
        assert!(result.failed());
        assert_ne!(result.exit_code(), SUCCESSFUL_EXIT_CODE);
        assert!(!result.timed_out());
        assert!(
            result.stderr().contains("zerk-missing-tool"),
            "stderr should name the failed command: {}",
            result.stderr()
        );
        assert_eq!(result.stdout(), "");
        assert!(result.has_error_output());
    }

    #[tokio::test]
    async fn env_override_reaches_child() {
        let result = run(&Invocation::new("env").env("CINDER_TEST_FOO", "bar")).await;
        assert!(result.succeeded());
        assert!(
            result.stdout().lines().any(|l| l == "CINDER_TEST_FOO=bar"),
            "environment echo should contain the override: {}",
            result.stdout()
        );
    }

    #[tokio::test]
    async fn replace_env_drops_inherited_variables() {
        // Absolute path: with a cleared environment there is no PATH for
        // the loader to search.
        let result = run(&Invocation::new("/usr/bin/env")
            .replace_env()
            .env("ONLY_VAR", "1"))
        .await;
        assert!(result.succeeded());
        assert_eq!(result.stdout().trim(), "ONLY_VAR=1");
    }

    #[tokio::test]
    async fn stdin_payload_is_delivered() {
        let result = run(&Invocation::new("cat").stdin("piped text")).await;
        assert!(result.succeeded());
        assert_eq!(result.stdout(), "piped text");
    }

    #[tokio::test]
    async fn absent_stdin_still_signals_eof() {
        // `cat` only terminates once stdin is closed.
        let result = run(&Invocation::new("cat").timeout(Duration::from_secs(5))).await;
        assert!(result.succeeded());
        assert!(!result.timed_out());
        assert_eq!(result.stdout(), "");
    }

    #[tokio::test]
    async fn timeout_kills_and_keeps_partial_output() {
        let result = run(&sh("echo started; sleep 30").timeout(Duration::from_millis(300))).await;
        assert!(result.timed_out());
        assert_eq!(result.exit_code(), TIMED_OUT_EXIT_CODE);
        assert!(result.failed());
        assert_eq!(result.stdout().trim(), "started");
    }

    #[tokio::test]
    async fn timed_out_process_is_terminated() {
        let dir = tempfile::tempdir().expect("tempdir");
        let marker = dir.path().join("ticks");
        let script = format!(
            "while true; do echo tick >> {}; sleep 0.05; done",
            marker.display()
        );

        let result = run(&sh(&script).timeout(Duration::from_millis(300))).await;
        assert!(result.timed_out());

        let after_return = std::fs::metadata(&marker).map(|m| m.len()).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(400)).await;
        let later = std::fs::metadata(&marker).map(|m| m.len()).unwrap_or(0);
        assert_eq!(
            after_return, later,
            "process kept writing after the call returned"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn timeout_kills_descendants_too() {
        let dir = tempfile::tempdir().expect("tempdir");
        let marker = dir.path().join("ticks");
        // The writer loop is a child of the shell; the group kill must
        // take it down along with the shell itself.
        let script = format!(
            "while true; do echo tick >> {}; sleep 0.05; done & sleep 30",
            marker.display()
        );

        let result = run(&sh(&script).timeout(Duration::from_millis(300))).await;
        assert!(result.timed_out());

        let after_return = std::fs::metadata(&marker).map(|m| m.len()).unwrap_or(0);
        tokio::time::sleep(Duration::from_millis(400)).await;
        let later = std::fs::metadata(&marker).map(|m| m.len()).unwrap_or(0);
        assert_eq!(
            after_return, later,
            "descendant kept writing after the group kill"
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn signal_death_is_not_a_timeout() {
        let result = run(&sh("kill -9 $$")).await;
        assert!(!result.timed_out());
        assert!(result.failed());
        assert_eq!(result.exit_code(), 128 + libc::SIGKILL);
    }

    #[tokio::test]
    async fn missing_executable_is_a_launch_error() {
        let invocation = Invocation::new("cinder-exec-no-such-binary");
        let err = ProcessExecutor::new()
            .execute(&invocation)
            .await
            .expect_err("launch should fail");
        assert_matches!(err, LaunchError::Spawn { .. });
        assert!(
            err.to_string().contains("cinder-exec-no-such-binary"),
            "unexpected message: {err}"
        );
    }

    #[tokio::test]
    async fn missing_working_directory_is_a_path_error() {
        let invocation = Invocation::new("sh").working_dir("/cinder/definitely/missing");
        let err = ProcessExecutor::new()
            .execute(&invocation)
            .await
            .expect_err("launch should fail");
        assert_matches!(err, LaunchError::WorkingDirectoryNotFound { .. });
        assert!(
            err.to_string().contains("/cinder/definitely/missing"),
            "unexpected message: {err}"
        );
    }

    #[tokio::test]
    async fn working_directory_applies() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = run(&sh("pwd").working_dir(dir.path())).await;
        assert!(result.succeeded());
        // Canonicalize both sides; the tempdir may live behind a symlink.
        let expected = dir.path().canonicalize().expect("canonicalize");
        assert_eq!(result.stdout().trim(), expected.to_str().expect("utf8"));
    }

    #[tokio::test]
    async fn streams_are_captured_separately_in_order() {
        let result = run(&sh("echo one; echo two; echo three >&2; echo four")).await;
        assert!(result.succeeded());
        assert_eq!(result.stdout(), "one\ntwo\nfour\n");
        assert_eq!(result.stderr(), "three\n");
    }

    #[tokio::test]
    async fn invocation_is_reusable() {
        let invocation = sh("echo again");
        let executor = ProcessExecutor::new();
        let first = executor.execute(&invocation).await.expect("first run");
        let second = executor.execute(&invocation).await.expect("second run");
        assert_eq!(first.stdout(), second.stdout());
        assert!(first.succeeded() && second.succeeded());
    }

    #[tokio::test]
    async fn concurrent_executions_are_independent() {
        let executor = ProcessExecutor::new();
        let one = sh("echo one");
        let two = sh("echo two");
        let (first, second) = tokio::join!(executor.execute(&one), executor.execute(&two));
        let (first, second) = (first.expect("first"), second.expect("second"));
        assert_eq!(first.stdout().trim(), "one");
        assert_eq!(second.stdout().trim(), "two");
    }
}
