//! Streaming parser for engine output.
//!
//! Raw bytes are split into lines ([`LogParser`]) and each line is fed to a
//! small state machine ([`LineClassifier`]) that recognizes shipouts,
//! measurement reports, warnings and multi-line error diagnostics.

mod classify;
mod event;

pub use classify::{LineClassifier, parse_measurement_values};
pub use event::LogEvent;

use crate::protocol::MEASURE_TAG;
use pgfkit_types::Dialect;
use std::collections::VecDeque;

/// Turns a byte stream arriving in arbitrary chunks into [`LogEvent`]s.
///
/// The parser never fails: input it does not understand comes out as
/// [`LogEvent::Unrecognized`]. Iterating yields the events available so far;
/// after more input is fed, iteration can resume.
#[derive(Debug)]
pub struct LogParser {
    classifier: LineClassifier,
    partial: Vec<u8>,
    events: VecDeque<LogEvent>,
}

impl LogParser {
    pub fn new(dialect: Dialect) -> Self {
        Self::with_tag(dialect, MEASURE_TAG)
    }

    pub fn with_tag(dialect: Dialect, tag: &str) -> Self {
        Self {
            classifier: LineClassifier::new(dialect, tag),
            partial: Vec::new(),
            events: VecDeque::new(),
        }
    }

    /// Feeds a chunk of raw output. Complete lines are classified immediately;
    /// a trailing partial line waits for the next chunk.
    pub fn feed(&mut self, chunk: &[u8]) {
        let mut rest = chunk;
        while let Some(pos) = rest.iter().position(|&b| b == b'\n') {
            self.partial.extend_from_slice(&rest[..pos]);
            let line = String::from_utf8_lossy(&self.partial).into_owned();
            self.partial.clear();
            self.classifier.push_line(strip_cr(&line), &mut self.events);
            rest = &rest[pos + 1..];
        }
        self.partial.extend_from_slice(rest);
    }

    /// Classifies one already-split line.
    pub fn push_line(&mut self, line: &str) {
        self.classifier.push_line(strip_cr(line), &mut self.events);
    }

    /// Flushes the trailing partial line and any error still collecting context.
    pub fn finish(&mut self) {
        if !self.partial.is_empty() {
            let line = String::from_utf8_lossy(&self.partial).into_owned();
            self.partial.clear();
            self.classifier.push_line(strip_cr(&line), &mut self.events);
        }
        self.classifier.flush(&mut self.events);
    }

    pub fn next_event(&mut self) -> Option<LogEvent> {
        self.events.pop_front()
    }

    pub fn has_pending_error(&self) -> bool {
        self.classifier.in_error()
    }

    /// Parses a complete transcript in one go.
    pub fn parse_all(dialect: Dialect, bytes: &[u8]) -> Vec<LogEvent> {
        let mut parser = LogParser::new(dialect);
        parser.feed(bytes);
        parser.finish();
        parser.collect()
    }
}

impl Iterator for LogParser {
    type Item = LogEvent;

    fn next(&mut self) -> Option<LogEvent> {
        self.next_event()
    }
}

fn strip_cr(line: &str) -> &str {
    line.strip_suffix('\r').unwrap_or(line)
}
