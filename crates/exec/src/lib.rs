//! External process execution harness.
//!
//! Runs one OS process per call: launches it with piped stdio, drains
//! stdout and stderr concurrently so the child can never stall on a full
//! pipe, races natural exit against an optional wall-clock timeout, and
//! returns a complete [`ExecutionResult`]. Pre-launch problems (missing
//! working directory, unlaunchable executable) surface as [`LaunchError`];
//! non-zero exits and timeouts are ordinary data on the result, so callers
//! branch on [`ExecutionResult::succeeded`] and [`ExecutionResult::timed_out`]
//! rather than on errors.
//!
//! ```no_run
//! use cinder_exec::{Invocation, ProcessExecutor};
//!
//! # async fn demo() -> Result<(), cinder_exec::LaunchError> {
//! let invocation = Invocation::new("cargo").arg("--version");
//! let result = ProcessExecutor::new().execute(&invocation).await?;
//! assert!(result.succeeded());
//! println!("{}", result.stdout());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod executor;
pub mod invocation;
pub mod result;

pub use error::LaunchError;
pub use executor::ProcessExecutor;
pub use invocation::{Invocation, DEFAULT_TIMEOUT};
pub use result::{ExecutionResult, SUCCESSFUL_EXIT_CODE, TIMED_OUT_EXIT_CODE};
