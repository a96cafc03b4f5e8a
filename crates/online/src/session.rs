//! The online measurement protocol.
//!
//! A session keeps one engine in a "mid-document, ready for more input"
//! state: the preamble and begin-document boilerplate are written when it
//! opens, and the end-document boilerplate only when it closes. In between it
//! strictly alternates between sending one measurement fragment and reading
//! until that fragment's report appears. The engine has no notion of request
//! ids, so there is never more than one query outstanding.

use crate::error::OnlineError;
use crate::parser::{LogEvent, LogParser};
use crate::process::ProcessChannel;
use crate::protocol::{self, boilerplate_lines};
use log::{debug, info, trace, warn};
use pgfkit_traits::{ChannelError, ChannelExit, TexChannel};
use pgfkit_types::{EngineProfile, MeasurementRequest, MeasurementResult};
use std::path::PathBuf;
use std::time::{Duration, Instant};

/// Bounds that keep a confused engine from hanging a render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Maximum time for one measurement round trip.
    pub read_timeout: Duration,
    /// Maximum engine lines read while waiting for one measurement.
    pub max_lines: usize,
    /// Pages the engine may ship out while a measurement is pending before
    /// the query is abandoned with `NoMeasurement`.
    pub max_page_ships: usize,
    /// Time the engine gets to exit after the end-document boilerplate.
    pub shutdown_grace: Duration,
    /// Extra directories on the engine's input search path.
    pub search_dirs: Vec<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(30),
            max_lines: 10_000,
            max_page_ships: 0,
            shutdown_grace: Duration::from_secs(5),
            search_dirs: Vec::new(),
        }
    }
}

impl SessionConfig {
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_max_lines(mut self, max_lines: usize) -> Self {
        self.max_lines = max_lines;
        self
    }

    pub fn with_max_page_ships(mut self, max_page_ships: usize) -> Self {
        self.max_page_ships = max_page_ships;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_search_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.search_dirs = dirs;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingReply,
    Closed,
}

pub struct Session<C: TexChannel> {
    channel: C,
    profile: EngineProfile,
    config: SessionConfig,
    state: SessionState,
    parser: LogParser,
    transcript: Vec<String>,
    queries: usize,
    exit: Option<ChannelExit>,
}

impl Session<ProcessChannel> {
    /// Starts the profile's engine and brings it to the ready-for-input state.
    pub async fn open(profile: EngineProfile, config: SessionConfig) -> Result<Self, OnlineError> {
        profile
            .validate()
            .map_err(|e| OnlineError::SpawnFailed { command: profile.command.clone(), message: e.to_string() })?;
        let channel = ProcessChannel::start_with_search_dirs(&profile, &config.search_dirs)?;
        Self::with_channel(channel, profile, config).await
    }
}

impl<C: TexChannel> Session<C> {
    /// Opens a session over an already started channel.
    pub async fn with_channel(
        channel: C,
        profile: EngineProfile,
        config: SessionConfig,
    ) -> Result<Self, OnlineError> {
        let mut session = Self {
            channel,
            parser: LogParser::new(profile.dialect),
            profile,
            config,
            state: SessionState::Idle,
            transcript: Vec::new(),
            queries: 0,
            exit: None,
        };
        if let Err(err) = session.write_prologue().await {
            return Err(session.fail(err).await);
        }
        debug!("Session over {} ready ({})", session.channel.name(), session.profile.dialect);
        Ok(session)
    }

    async fn write_prologue(&mut self) -> Result<(), OnlineError> {
        // A leading \relax keeps the engine's first-line prompt from treating
        // the preamble as a file name.
        let mut lines = vec![r"\relax".to_string()];
        lines.extend(boilerplate_lines(&self.profile.preamble).map(str::to_string));
        lines.extend(boilerplate_lines(&self.profile.begin_document).map(str::to_string));
        for line in lines {
            self.send(&line).await?;
        }
        Ok(())
    }

    /// Writes one line. An engine that takes no input for `read_timeout` is
    /// treated like one that sends no output.
    async fn send(&mut self, line: &str) -> Result<(), OnlineError> {
        match tokio::time::timeout(self.config.read_timeout, self.channel.write_line(line)).await {
            Ok(written) => Ok(written?),
            Err(_) => Err(OnlineError::Timeout { timeout: self.config.read_timeout, log: String::new() }),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn profile(&self) -> &EngineProfile {
        &self.profile
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Number of completed measurement round trips.
    pub fn queries(&self) -> usize {
        self.queries
    }

    /// Every engine line read so far.
    pub fn transcript(&self) -> String {
        self.transcript.join("\n")
    }

    /// How the engine ended, once the session is closed.
    pub fn exit(&self) -> Option<&ChannelExit> {
        self.exit.as_ref()
    }

    /// Typesets `request` in an hbox and returns its metrics.
    ///
    /// Any failure closes the session; the error carries the transcript.
    pub async fn measure(&mut self, request: &MeasurementRequest) -> Result<MeasurementResult, OnlineError> {
        match self.state {
            SessionState::Idle => {}
            SessionState::AwaitingReply => {
                return Err(OnlineError::InvalidState("a measurement is already pending".to_string()));
            }
            SessionState::Closed => {
                return Err(OnlineError::InvalidState("session is closed".to_string()));
            }
        }

        let started = Instant::now();
        for line in protocol::measurement_fragment(self.profile.dialect, request) {
            if let Err(err) = self.send(&line).await {
                return Err(self.fail(err).await);
            }
        }
        self.state = SessionState::AwaitingReply;

        match self.await_measurement().await {
            Ok(raw) => {
                self.state = SessionState::Idle;
                self.queries += 1;
                let result = raw.shaped(request.kind);
                debug!(
                    "Measured {:?} in {:?}: {:.3}x{:.3}+{:.3}bp",
                    request.content,
                    started.elapsed(),
                    result.width,
                    result.height,
                    result.depth
                );
                Ok(result)
            }
            Err(err) => Err(self.fail(err).await),
        }
    }

    async fn await_measurement(&mut self) -> Result<MeasurementResult, OnlineError> {
        let deadline = Instant::now() + self.config.read_timeout;
        let mut lines_read = 0usize;
        let mut ships = 0usize;

        loop {
            while let Some(event) = self.parser.next_event() {
                match event {
                    LogEvent::MeasurementReported(m) if m.is_well_formed() => return Ok(m),
                    LogEvent::MeasurementReported(m) => {
                        return Err(OnlineError::ParseAmbiguous {
                            line: format!("{}x{}+{}", m.width, m.height, m.depth),
                            log: String::new(),
                        });
                    }
                    LogEvent::MalformedMeasurement(line) => {
                        return Err(OnlineError::ParseAmbiguous { line, log: String::new() });
                    }
                    LogEvent::FatalError(message) => {
                        return Err(OnlineError::EngineReportedError { message, log: String::new() });
                    }
                    LogEvent::PageShipped { page } => {
                        ships += 1;
                        if ships > self.config.max_page_ships {
                            return Err(OnlineError::NoMeasurement {
                                reason: format!("page {page:?} shipped out before a measurement was reported"),
                                log: String::new(),
                            });
                        }
                    }
                    LogEvent::Warning(text) => warn!("Engine warning: {}", text),
                    LogEvent::Unrecognized(_) => {}
                }
            }

            if lines_read >= self.config.max_lines {
                return Err(OnlineError::NoMeasurement {
                    reason: format!("no measurement within {} lines of output", self.config.max_lines),
                    log: String::new(),
                });
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(OnlineError::Timeout { timeout: self.config.read_timeout, log: String::new() });
            }

            match self.channel.read_line(remaining).await {
                Ok(line) => {
                    trace!("engine: {}", line);
                    self.parser.push_line(&line);
                    self.transcript.push(line);
                    lines_read += 1;
                }
                Err(ChannelError::ProcessExited { status }) => {
                    // The engine may have died right after printing an error.
                    self.parser.finish();
                    while let Some(event) = self.parser.next_event() {
                        if let LogEvent::FatalError(message) = event {
                            return Err(OnlineError::EngineReportedError { message, log: String::new() });
                        }
                    }
                    return Err(OnlineError::ProcessExited { status, log: String::new() });
                }
                Err(ChannelError::Timeout(_)) => {
                    return Err(OnlineError::Timeout { timeout: self.config.read_timeout, log: String::new() });
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Closes the session after a failure and attaches the transcript to `err`.
    async fn fail(&mut self, err: OnlineError) -> OnlineError {
        if let Err(close_err) = self.close().await {
            debug!("Closing failed session: {}", close_err);
        }
        err.with_log(self.transcript())
    }

    /// Ends the document and shuts the engine down. Closing a closed session is a no-op.
    pub async fn close(&mut self) -> Result<(), OnlineError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        let farewell = self.profile.end_document.clone();
        let exit = self.channel.shutdown(&farewell, self.config.shutdown_grace).await?;
        info!("Session closed after {} measurement(s)", self.queries);
        self.record_exit(exit);
        Ok(())
    }

    fn record_exit(&mut self, exit: ChannelExit) {
        for line in &exit.trailing {
            self.parser.push_line(line);
        }
        self.transcript.extend(exit.trailing.iter().cloned());
        self.exit = Some(exit);
    }

    /// Writes `markup` into the live document, ends it, and returns the PDF
    /// the engine produced. The session is closed afterwards.
    pub async fn finish_document(&mut self, markup: &str) -> Result<Vec<u8>, OnlineError> {
        if self.state != SessionState::Idle {
            return Err(OnlineError::InvalidState(format!(
                "cannot finish a document from state {:?}",
                self.state
            )));
        }
        // Each line has its own deadline; the channel keeps draining engine
        // output while it waits, so a long document cannot stall on a full pipe.
        for line in markup.lines() {
            if let Err(err) = self.send(line).await {
                return Err(self.fail(err).await);
            }
        }

        self.state = SessionState::Closed;
        let farewell = self.profile.end_document.clone();
        // Finishing typesets the whole document, so it gets the round-trip budget.
        let grace = self.config.read_timeout.max(self.config.shutdown_grace);
        let exit = match self.channel.shutdown(&farewell, grace).await {
            Ok(exit) => exit,
            Err(err) => return Err(OnlineError::from(err).with_log(self.transcript())),
        };
        self.record_exit(exit);
        self.parser.finish();

        while let Some(event) = self.parser.next_event() {
            if let LogEvent::FatalError(message) = event {
                return Err(OnlineError::EngineReportedError { message, log: self.transcript() });
            }
        }

        let artifact = self.profile.artifact_name();
        let no_artifact = |log: String| OnlineError::NoArtifact { artifact: artifact.clone(), log };
        let Some(dir) = self.channel.working_dir() else {
            return Err(no_artifact(self.transcript()));
        };
        match tokio::fs::read(dir.join(&artifact)).await {
            Ok(bytes) if !bytes.is_empty() => {
                info!("Engine produced {} ({} bytes)", artifact, bytes.len());
                Ok(bytes)
            }
            _ => Err(no_artifact(self.transcript())),
        }
    }

    /// Gives the channel back, e.g. to inspect a scripted engine after the session.
    pub fn into_channel(self) -> C {
        self.channel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedChannel;
    use pgfkit_types::MeasureKind;

    fn config() -> SessionConfig {
        SessionConfig::default().with_read_timeout(Duration::from_secs(1))
    }

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    async fn open(channel: ScriptedChannel) -> Session<ScriptedChannel> {
        Session::with_channel(channel, EngineProfile::plain_tex(), config()).await.unwrap()
    }

    #[tokio::test]
    async fn test_open_writes_preamble_then_begin_document() {
        let channel = ScriptedChannel::new();
        let log = channel.log();
        let session = Session::with_channel(channel, EngineProfile::latex(), config()).await.unwrap();
        assert_eq!(session.state(), SessionState::Idle);
        let lines = log.lines();
        assert_eq!(lines[0], r"\relax");
        assert_eq!(lines[1], r"\documentclass{article}");
        assert_eq!(lines.last().map(String::as_str), Some(r"\begin{document}"));
    }

    #[tokio::test]
    async fn test_measure_returns_reported_metrics() {
        let channel = ScriptedChannel::new().reply(vec!["noise", "!PGF-PARSE:45.0pt,12.0pt,0.0pt"]);
        let mut session = open(channel).await;
        let m = session.measure(&MeasurementRequest::new("X")).await.unwrap();
        assert_eq!((m.width, m.height, m.depth), (45.0, 12.0, 0.0));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.queries(), 1);
    }

    #[tokio::test]
    async fn test_measure_applies_kind() {
        let channel = ScriptedChannel::new().reply_measurement(10.0, 7.0, 2.0);
        let mut session = open(channel).await;
        let request = MeasurementRequest::new("g").with_kind(MeasureKind::Size);
        let m = session.measure(&request).await.unwrap();
        assert_eq!((m.height, m.depth), (9.0, 0.0));
    }

    #[tokio::test]
    async fn test_silence_is_a_timeout_not_a_success() {
        let channel = ScriptedChannel::new().reply(vec!["(pgfcore.tex)", "*"]);
        let mut session = open(channel).await;
        let err = session.measure(&MeasurementRequest::new("X")).await.unwrap_err();
        assert!(matches!(err, OnlineError::Timeout { .. }));
        assert_eq!(err.log(), Some("(pgfcore.tex)\n*"));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_line_budget_yields_no_measurement() {
        let noise: Vec<String> = (0..50).map(|i| format!("noise {i}")).collect();
        let channel = ScriptedChannel::new().reply(noise);
        let mut session = Session::with_channel(channel, EngineProfile::plain_tex(), config().with_max_lines(10))
            .await
            .unwrap();
        let err = session.measure(&MeasurementRequest::new("X")).await.unwrap_err();
        assert!(matches!(err, OnlineError::NoMeasurement { .. }));
    }

    #[tokio::test]
    async fn test_engine_error_is_surfaced_with_log() {
        init_logging();
        let channel = ScriptedChannel::new().reply(vec![
            "! Undefined control sequence.",
            r"<*> \setbox0=\hbox{\foo",
            "!PGF-PARSE:0.0pt,0.0pt,0.0pt",
        ]);
        let mut session = open(channel).await;
        let err = session.measure(&MeasurementRequest::new(r"\foo")).await.unwrap_err();
        match err {
            OnlineError::EngineReportedError { message, log } => {
                assert!(message.starts_with("! Undefined control sequence."));
                assert!(log.contains(r"\foo"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_engine_error_after_prompt_is_not_a_measurement() {
        init_logging();
        // Piped input is not echoed, so the error continues the `*` prompt line
        // and the engine recovers into an empty box.
        let channel = ScriptedChannel::new().reply(vec![
            "*! Undefined control sequence.",
            r"<*> \setbox0=\hbox{\pgfkitnosuchmacro",
            "   }",
            "",
            "*!PGF-PARSE:0.0pt,0.0pt,0.0pt",
        ]);
        let mut session = open(channel).await;
        let err = session.measure(&MeasurementRequest::new(r"\pgfkitnosuchmacro")).await.unwrap_err();
        match err {
            OnlineError::EngineReportedError { message, log } => {
                assert!(message.starts_with("! Undefined control sequence."));
                assert!(log.contains("*!PGF-PARSE:"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.queries(), 0);
    }

    #[tokio::test]
    async fn test_malformed_report_is_parse_ambiguous() {
        let channel = ScriptedChannel::new().reply(vec!["!PGF-PARSE:1pt,nan?,2pt"]);
        let mut session = open(channel).await;
        let err = session.measure(&MeasurementRequest::new("X")).await.unwrap_err();
        assert!(matches!(err, OnlineError::ParseAmbiguous { .. }));
        assert!(err.is_no_measurement());
    }

    #[tokio::test]
    async fn test_negative_width_rejected() {
        let channel = ScriptedChannel::new().reply_measurement(-3.0, 1.0, 0.0);
        let mut session = open(channel).await;
        let err = session.measure(&MeasurementRequest::new("X")).await.unwrap_err();
        assert!(matches!(err, OnlineError::ParseAmbiguous { .. }));
    }

    #[tokio::test]
    async fn test_page_shipout_abandons_query() {
        let channel = ScriptedChannel::new().reply(vec!["[1]", "!PGF-PARSE:1pt,1pt,0pt"]);
        let mut session = open(channel).await;
        let err = session.measure(&MeasurementRequest::new("X")).await.unwrap_err();
        assert!(matches!(err, OnlineError::NoMeasurement { .. }));
    }

    #[tokio::test]
    async fn test_page_shipout_within_budget() {
        let channel = ScriptedChannel::new().reply(vec!["[1]", "!PGF-PARSE:1pt,1pt,0pt"]);
        let mut session = Session::with_channel(channel, EngineProfile::plain_tex(), config().with_max_page_ships(1))
            .await
            .unwrap();
        assert!(session.measure(&MeasurementRequest::new("X")).await.is_ok());
    }

    #[tokio::test]
    async fn test_process_exit_mid_query() {
        let channel = ScriptedChannel::new().reply(vec!["starting"]).exit_when_drained();
        let mut session = open(channel).await;
        let err = session.measure(&MeasurementRequest::new("X")).await.unwrap_err();
        assert!(matches!(err, OnlineError::ProcessExited { .. }));
    }

    #[tokio::test]
    async fn test_error_before_exit_wins_over_exit() {
        let channel = ScriptedChannel::new().reply(vec!["! Emergency stop."]).exit_when_drained();
        let mut session = open(channel).await;
        let err = session.measure(&MeasurementRequest::new("X")).await.unwrap_err();
        assert!(matches!(err, OnlineError::EngineReportedError { .. }));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let channel = ScriptedChannel::new();
        let log = channel.log();
        let mut session = open(channel).await;
        session.close().await.unwrap();
        session.close().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(log.shutdowns(), 1);
        assert_eq!(log.lines().last().map(String::as_str), Some(r"\bye"));
    }

    #[tokio::test]
    async fn test_measure_after_close_is_rejected() {
        let mut session = open(ScriptedChannel::new().reply_measurement(1.0, 1.0, 0.0)).await;
        session.close().await.unwrap();
        let err = session.measure(&MeasurementRequest::new("X")).await.unwrap_err();
        assert!(matches!(err, OnlineError::InvalidState(_)));
    }

    #[tokio::test]
    async fn test_finish_document_reads_artifact() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("pgfkit.pdf"), b"%PDF-1.5 fake").unwrap();
        let channel = ScriptedChannel::new()
            .with_working_dir(dir.path())
            .on_shutdown(vec!["[1]", "Output written on pgfkit.pdf (1 page, 1000 bytes)."]);
        let log = channel.log();
        let mut session = open(channel).await;
        let bytes = session.finish_document("\\pgfpicture\n\\endpgfpicture").await.unwrap();
        assert_eq!(bytes, b"%PDF-1.5 fake");
        assert_eq!(session.state(), SessionState::Closed);
        let lines = log.lines();
        let n = lines.len();
        assert_eq!(&lines[n - 3..], &[r"\pgfpicture", r"\endpgfpicture", r"\bye"]);
    }

    #[tokio::test]
    async fn test_finish_document_without_artifact_reports_log() {
        let dir = tempfile::tempdir().unwrap();
        let channel = ScriptedChannel::new()
            .with_working_dir(dir.path())
            .on_shutdown(vec!["No pages of output."]);
        let mut session = open(channel).await;
        let err = session.finish_document("").await.unwrap_err();
        match err {
            OnlineError::NoArtifact { artifact, log } => {
                assert_eq!(artifact, "pgfkit.pdf");
                assert!(log.contains("No pages of output."));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn test_long_document_with_chatty_engine_finishes() {
        init_logging();
        // Answers every input line with a prompt, like an engine in scrollmode.
        // The job-name argument lands in `$0` of the shell.
        let profile = EngineProfile::plain_tex().with_command("sh").with_arguments([
            "-c",
            "while IFS= read -r l; do echo '*(pgfkit) waiting for the next line of input'; done",
        ]);
        let config = SessionConfig::default()
            .with_read_timeout(Duration::from_secs(5))
            .with_shutdown_grace(Duration::from_secs(5));
        let mut session = match Session::open(profile, config).await {
            Ok(s) => s,
            Err(_) => return,
        };
        // Far more prompt output than a pipe buffers.
        let markup: String = (0..20_000)
            .map(|i| format!("\\pgfpathlineto{{\\pgfpoint{{{i}bp}}{{2bp}}}}\n"))
            .collect();

        let finished = tokio::time::timeout(Duration::from_secs(60), session.finish_document(&markup)).await;
        let err = match finished {
            Ok(result) => result.unwrap_err(),
            Err(_) => panic!("finish_document did not return"),
        };
        // The stand-in writes no PDF; what matters is that the run ended.
        assert!(matches!(err, OnlineError::NoArtifact { .. }), "unexpected error: {err:?}");
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.transcript().lines().count() > 19_000);
    }
}
