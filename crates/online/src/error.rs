use pgfkit_traits::ChannelError;
use std::time::Duration;
use thiserror::Error;

/// Everything that can go wrong while talking to an engine.
///
/// Variants that follow engine activity carry the transcript captured so far
/// in `log`, so the caller can show the engine's own complaint.
#[derive(Error, Debug)]
pub enum OnlineError {
    #[error("Failed to start typesetting engine '{command}': {message}")]
    SpawnFailed { command: String, message: String },

    #[error("Typesetting engine exited unexpectedly (status: {status:?})")]
    ProcessExited { status: Option<i32>, log: String },

    #[error("No reply from typesetting engine within {timeout:?}")]
    Timeout { timeout: Duration, log: String },

    #[error("No measurement: malformed measurement line '{line}'")]
    ParseAmbiguous { line: String, log: String },

    #[error("No measurement: {reason}")]
    NoMeasurement { reason: String, log: String },

    #[error("Typesetting engine reported an error: {message}")]
    EngineReportedError { message: String, log: String },

    #[error("Typesetting engine did not produce '{artifact}'")]
    NoArtifact { artifact: String, log: String },

    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Measurement aborted: the session already failed")]
    Aborted,

    #[error("Builder program panicked: {0}")]
    BuilderPanicked(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl OnlineError {
    /// The engine transcript attached to this error, if any.
    pub fn log(&self) -> Option<&str> {
        match self {
            OnlineError::ProcessExited { log, .. }
            | OnlineError::Timeout { log, .. }
            | OnlineError::ParseAmbiguous { log, .. }
            | OnlineError::NoMeasurement { log, .. }
            | OnlineError::EngineReportedError { log, .. }
            | OnlineError::NoArtifact { log, .. } => Some(log.as_str()),
            _ => None,
        }
    }

    /// Attaches `transcript` to variants that carry a log. Others are returned unchanged.
    pub fn with_log(mut self, transcript: String) -> Self {
        match &mut self {
            OnlineError::ProcessExited { log, .. }
            | OnlineError::Timeout { log, .. }
            | OnlineError::ParseAmbiguous { log, .. }
            | OnlineError::NoMeasurement { log, .. }
            | OnlineError::EngineReportedError { log, .. }
            | OnlineError::NoArtifact { log, .. } => *log = transcript,
            _ => {}
        }
        self
    }

    /// True for failures that mean "the engine gave no usable measurement".
    pub fn is_no_measurement(&self) -> bool {
        matches!(
            self,
            OnlineError::NoMeasurement { .. }
                | OnlineError::ParseAmbiguous { .. }
                | OnlineError::Timeout { .. }
        )
    }
}

// `io::Error` is not `Clone`; a copy keeps its kind and message.
impl Clone for OnlineError {
    fn clone(&self) -> Self {
        match self {
            OnlineError::SpawnFailed { command, message } => {
                OnlineError::SpawnFailed { command: command.clone(), message: message.clone() }
            }
            OnlineError::ProcessExited { status, log } => {
                OnlineError::ProcessExited { status: *status, log: log.clone() }
            }
            OnlineError::Timeout { timeout, log } => OnlineError::Timeout { timeout: *timeout, log: log.clone() },
            OnlineError::ParseAmbiguous { line, log } => {
                OnlineError::ParseAmbiguous { line: line.clone(), log: log.clone() }
            }
            OnlineError::NoMeasurement { reason, log } => {
                OnlineError::NoMeasurement { reason: reason.clone(), log: log.clone() }
            }
            OnlineError::EngineReportedError { message, log } => {
                OnlineError::EngineReportedError { message: message.clone(), log: log.clone() }
            }
            OnlineError::NoArtifact { artifact, log } => {
                OnlineError::NoArtifact { artifact: artifact.clone(), log: log.clone() }
            }
            OnlineError::InvalidState(s) => OnlineError::InvalidState(s.clone()),
            OnlineError::Aborted => OnlineError::Aborted,
            OnlineError::BuilderPanicked(s) => OnlineError::BuilderPanicked(s.clone()),
            OnlineError::Io(e) => OnlineError::Io(std::io::Error::new(e.kind(), e.to_string())),
        }
    }
}

impl From<ChannelError> for OnlineError {
    fn from(err: ChannelError) -> Self {
        match err {
            ChannelError::SpawnFailed { command, message } => {
                OnlineError::SpawnFailed { command, message }
            }
            ChannelError::ProcessExited { status } => {
                OnlineError::ProcessExited { status, log: String::new() }
            }
            ChannelError::Timeout(timeout) => OnlineError::Timeout { timeout, log: String::new() },
            ChannelError::Closed => OnlineError::InvalidState("channel already shut down".to_string()),
            ChannelError::Io(message) => OnlineError::Io(std::io::Error::other(message)),
        }
    }
}
