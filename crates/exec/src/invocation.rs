//! Invocation descriptor: everything needed to launch one process.
//!
//! An [`Invocation`] is assembled with the consuming builder methods, is
//! immutable afterwards, and can be reused to launch any number of
//! independent processes — execution borrows it and never mutates it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Wall-clock limit applied when none is configured explicitly (2 minutes).
///
/// Use [`Invocation::no_timeout`] to wait indefinitely instead.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Immutable description of one external process launch.
#[derive(Debug, Clone)]
pub struct Invocation {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
    inherit_env: bool,
    stdin: Option<String>,
    timeout: Option<Duration>,
}

impl Invocation {
    /// Start describing a launch of `program`.
    ///
    /// `program` must be non-empty; it is resolved by the OS loader (no
    /// search-path logic lives here). The invocation starts with no
    /// arguments, the caller's environment, no stdin payload, and
    /// [`DEFAULT_TIMEOUT`].
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: BTreeMap::new(),
            inherit_env: true,
            stdin: None,
            timeout: Some(DEFAULT_TIMEOUT),
        }
    }

    /// Append one argument, passed to the child unmodified.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments, in order.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set the working directory. It must exist at launch time.
    pub fn working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Set one environment variable for the child. Overrides are layered
    /// key-for-key on top of the inherited environment (or form the entire
    /// environment after [`Self::replace_env`]); setting the same key twice
    /// keeps the last value.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set several environment variables at once.
    pub fn envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in vars {
            self.env.insert(key.into(), value.into());
        }
        self
    }

    /// Give the child a clean environment containing only the configured
    /// overrides instead of layering them on the caller's environment.
    pub fn replace_env(mut self) -> Self {
        self.inherit_env = false;
        self
    }

    /// Payload written to the child's stdin before it is closed. Without a
    /// payload stdin is closed immediately, signalling end-of-input.
    pub fn stdin(mut self, payload: impl Into<String>) -> Self {
        self.stdin = Some(payload.into());
        self
    }

    /// Set the wall-clock limit after which the process is forcibly killed.
    pub fn timeout(mut self, limit: Duration) -> Self {
        self.timeout = Some(limit);
        self
    }

    /// Disable the wall-clock limit entirely; execution then blocks until
    /// the process exits on its own.
    pub fn no_timeout(mut self) -> Self {
        self.timeout = None;
        self
    }

    /// The program to launch.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments, in the order they were added.
    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    /// Configured working directory, if any.
    pub fn working_directory(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    /// Environment overrides, keyed uniquely per invocation.
    pub fn env_overrides(&self) -> impl Iterator<Item = (&str, &str)> {
        self.env.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Whether the child inherits the caller's environment underneath the
    /// overrides (`false` after [`Self::replace_env`]).
    pub fn inherits_env(&self) -> bool {
        self.inherit_env
    }

    /// Stdin payload, if any.
    pub fn stdin_payload(&self) -> Option<&str> {
        self.stdin.as_deref()
    }

    /// Wall-clock limit, or `None` to wait indefinitely.
    pub fn time_limit(&self) -> Option<Duration> {
        self.timeout
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
