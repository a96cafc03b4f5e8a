//! TexChannel trait for abstracting the conversation with a typesetting engine.
//!
//! A session only ever needs line-oriented access to an engine: write a line
//! of input, read a line of output with a deadline, and shut the engine down.
//! Keeping that behind a trait lets the session run against a real process or
//! against a scripted stand-in in tests.

use std::future::Future;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Error type for channel operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Failed to start '{command}': {message}")]
    SpawnFailed { command: String, message: String },

    #[error("Engine process exited (status: {status:?})")]
    ProcessExited { status: Option<i32> },

    #[error("No output from engine within {0:?}")]
    Timeout(Duration),

    #[error("Channel already shut down")]
    Closed,

    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for ChannelError {
    fn from(err: std::io::Error) -> Self {
        ChannelError::Io(err.to_string())
    }
}

/// How an engine process ended.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChannelExit {
    /// Exit code, if the process exited on its own.
    pub code: Option<i32>,
    /// True when the grace period ran out and the process was killed.
    pub killed: bool,
    /// Output lines read while waiting for the process to exit.
    pub trailing: Vec<String>,
}

impl ChannelExit {
    pub fn success(&self) -> bool {
        !self.killed && self.code == Some(0)
    }
}

/// Line-oriented access to one running engine.
///
/// A channel is owned by exactly one session at a time; none of the methods
/// may be called concurrently.
pub trait TexChannel: Send {
    /// Writes `line` followed by a newline and flushes it to the engine.
    fn write_line(&mut self, line: &str) -> impl Future<Output = Result<(), ChannelError>> + Send;

    /// Reads the next complete output line (without its terminator).
    ///
    /// Returns [`ChannelError::Timeout`] when nothing arrives within `timeout`
    /// and [`ChannelError::ProcessExited`] once the output stream has ended.
    fn read_line(
        &mut self,
        timeout: Duration,
    ) -> impl Future<Output = Result<String, ChannelError>> + Send;

    /// Sends `farewell` (the dialect's end-of-document sequence), waits up to
    /// `grace` for the engine to exit, then kills it. Resources are released
    /// on every path.
    fn shutdown(
        &mut self,
        farewell: &str,
        grace: Duration,
    ) -> impl Future<Output = Result<ChannelExit, ChannelError>> + Send;

    /// Directory the engine writes its artifacts into, if it has one.
    fn working_dir(&self) -> Option<&Path>;

    /// Returns a human-readable name for this channel (for logging/debugging).
    fn name(&self) -> &'static str;
}
