//! Execution result: the complete, immutable outcome of one launch.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exit code reported by a process that completed normally.
pub const SUCCESSFUL_EXIT_CODE: i32 = 0;

/// Reserved exit code reported when the process was killed on timeout.
///
/// Part of the public contract: the value lies outside the 0–255 range a
/// real process exit can occupy, and processes killed by a signal they
/// received on their own report `128 + signal` instead (see
/// [`ExecutionResult::exit_code`]), so nothing else produces this value.
pub const TIMED_OUT_EXIT_CODE: i32 = -1;

/// Outcome of one process launch: exit code, full per-stream capture,
/// timeout flag, and wall-clock duration.
///
/// Produced exclusively by the executor; holds no OS resources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    exit_code: i32,
    stdout: String,
    stderr: String,
    timed_out: bool,
    duration: Duration,
}

impl ExecutionResult {
    /// Result for a process that exited on its own.
    pub(crate) fn completed(exit_code: i32, stdout: String, stderr: String, duration: Duration) -> Self {
        Self {
            exit_code,
            stdout,
            stderr,
            timed_out: false,
            duration,
        }
    }

    /// Result for a process forcibly killed on timeout. Output captured up
    /// to the kill is preserved.
    pub(crate) fn terminated(stdout: String, stderr: String, duration: Duration) -> Self {
        Self {
            exit_code: TIMED_OUT_EXIT_CODE,
            stdout,
            stderr,
            timed_out: true,
            duration,
        }
    }

    /// The process exit code, `128 + signal` for a signal death on Unix,
    /// or [`TIMED_OUT_EXIT_CODE`] when [`Self::timed_out`] is true.
    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }

    /// Everything the process wrote to stdout, in write order.
    pub fn stdout(&self) -> &str {
        &self.stdout
    }

    /// Everything the process wrote to stderr, in write order. No ordering
    /// relative to stdout is implied.
    pub fn stderr(&self) -> &str {
        &self.stderr
    }

    /// Whether the process was killed because it exceeded its time limit.
    pub fn timed_out(&self) -> bool {
        self.timed_out
    }

    /// Wall-clock time from launch to completion or termination.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// True when the process exited zero and was not timed out.
    pub fn succeeded(&self) -> bool {
        self.exit_code == SUCCESSFUL_EXIT_CODE && !self.timed_out
    }

    /// Inverse of [`Self::succeeded`].
    pub fn failed(&self) -> bool {
        !self.succeeded()
    }

    /// Whether stderr carries anything beyond whitespace.
    pub fn has_error_output(&self) -> bool {
        !self.stderr.trim().is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
