//! An in-memory [`TexChannel`] that plays back canned engine output.
//!
//! Every time the session writes a measurement's report trigger, the next
//! queued reply becomes readable. Reading with nothing queued reports a
//! timeout at once (or an exited process, see [`ScriptedChannel::exit_when_drained`]).

use crate::protocol::{MEASURE_TAG, is_report_trigger};
use pgfkit_traits::{ChannelError, ChannelExit, TexChannel};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct Recorded {
    lines: Vec<String>,
    shutdowns: usize,
}

/// Shared view of what a [`ScriptedChannel`] was sent, usable after the
/// channel has moved into a session.
#[derive(Debug, Clone, Default)]
pub struct ScriptLog {
    inner: Arc<Mutex<Recorded>>,
}

impl ScriptLog {
    /// All lines written to the channel, farewell lines included.
    pub fn lines(&self) -> Vec<String> {
        self.inner.lock().map(|r| r.lines.clone()).unwrap_or_default()
    }

    /// Contents of the hboxes that were measured, in order.
    pub fn measured_contents(&self) -> Vec<String> {
        self.lines()
            .iter()
            .filter_map(|line| {
                let rest = line.strip_prefix(r"\setbox0")?;
                let rest = rest.strip_prefix('=').unwrap_or(rest);
                let body = rest.strip_prefix(r"\hbox{")?.strip_suffix('}')?;
                Some(body.to_string())
            })
            .collect()
    }

    pub fn shutdowns(&self) -> usize {
        self.inner.lock().map(|r| r.shutdowns).unwrap_or(0)
    }

    fn record(&self, line: &str) {
        if let Ok(mut r) = self.inner.lock() {
            r.lines.push(line.to_string());
        }
    }
}

#[derive(Debug, Default)]
pub struct ScriptedChannel {
    log: ScriptLog,
    replies: VecDeque<Vec<String>>,
    readable: VecDeque<String>,
    shutdown_lines: Vec<String>,
    exit_when_drained: bool,
    exit_code: Option<i32>,
    working_dir: Option<PathBuf>,
    closed: bool,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self { exit_code: Some(0), ..Self::default() }
    }

    pub fn log(&self) -> ScriptLog {
        self.log.clone()
    }

    /// Output readable before anything is written, like an engine banner.
    pub fn with_startup<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.readable.extend(lines.into_iter().map(Into::into));
        self
    }

    /// Queues the output produced in response to the next measurement.
    pub fn reply<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.replies.push_back(lines.into_iter().map(Into::into).collect());
        self
    }

    /// Queues a well-formed report with the given metrics.
    pub fn reply_measurement(self, width: f64, height: f64, depth: f64) -> Self {
        self.reply([format!("{MEASURE_TAG}{width:?}pt,{height:?}pt,{depth:?}pt")])
    }

    /// Reports the process as exited once queued output runs out.
    pub fn exit_when_drained(mut self) -> Self {
        self.exit_when_drained = true;
        self
    }

    pub fn with_exit_code(mut self, code: Option<i32>) -> Self {
        self.exit_code = code;
        self
    }

    pub fn with_working_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Output printed while the document is ended.
    pub fn on_shutdown<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.shutdown_lines = lines.into_iter().map(Into::into).collect();
        self
    }
}

impl TexChannel for ScriptedChannel {
    async fn write_line(&mut self, line: &str) -> Result<(), ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.log.record(line);
        if is_report_trigger(line)
            && let Some(reply) = self.replies.pop_front()
        {
            self.readable.extend(reply);
        }
        Ok(())
    }

    async fn read_line(&mut self, timeout: Duration) -> Result<String, ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        match self.readable.pop_front() {
            Some(line) => Ok(line),
            None if self.exit_when_drained => Err(ChannelError::ProcessExited { status: self.exit_code }),
            None => Err(ChannelError::Timeout(timeout)),
        }
    }

    async fn shutdown(&mut self, farewell: &str, _grace: Duration) -> Result<ChannelExit, ChannelError> {
        if self.closed {
            return Err(ChannelError::Closed);
        }
        self.closed = true;
        if !farewell.is_empty() {
            self.log.record(farewell);
        }
        if let Ok(mut r) = self.log.inner.lock() {
            r.shutdowns += 1;
        }
        let mut trailing: Vec<String> = self.readable.drain(..).collect();
        trailing.append(&mut self.shutdown_lines);
        Ok(ChannelExit { code: self.exit_code, killed: false, trailing })
    }

    fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    fn name(&self) -> &'static str {
        "ScriptedChannel"
    }
}
