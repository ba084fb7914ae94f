//! Classified failures that prevent an invocation from producing a result.
//!
//! Only pre-execution conditions live here. A process that runs but exits
//! non-zero, or is killed on timeout, is reported through
//! [`crate::ExecutionResult`], never through this type.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A launch could not be performed at all.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The configured working directory does not exist (or is not a
    /// directory). Raised before any process is created.
    #[error("working directory not found: {}", path.display())]
    WorkingDirectoryNotFound {
        /// The directory that was configured on the invocation.
        path: PathBuf,
    },

    /// The OS could not create the process: executable missing, not
    /// executable, permission denied.
    #[error("failed to launch `{program}`: {source}")]
    Spawn {
        /// The program that was being launched.
        program: String,
        /// The underlying OS diagnostic.
        #[source]
        source: io::Error,
    },

    /// Waiting on the spawned process failed at the OS level, so no
    /// well-formed result could be produced.
    #[error("failed waiting for `{program}` to exit: {source}")]
    Wait {
        /// The program that was being supervised.
        program: String,
        /// The underlying OS diagnostic.
        #[source]
        source: io::Error,
    },
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
