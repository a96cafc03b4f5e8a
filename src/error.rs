use pgfkit_online::OnlineError;
use pgfkit_render_core::RenderError;
use pgfkit_types::ProfileError;
use thiserror::Error;

/// A comprehensive error type for a whole render.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Engine session failed: {0}")]
    Online(#[from] OnlineError),

    #[error("Rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("Invalid engine profile: {0}")]
    Profile(#[from] ProfileError),

    #[error("Invalid scene description: {0}")]
    Description(#[from] serde_json::Error),

    #[error("Typesetting engine did not produce '{artifact}'")]
    NoArtifact { artifact: String, log: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// The engine transcript captured before the failure, if there is one.
    pub fn log(&self) -> Option<&str> {
        match self {
            PipelineError::Online(e) => e.log(),
            PipelineError::NoArtifact { log, .. } => Some(log.as_str()),
            _ => None,
        }
    }
}
