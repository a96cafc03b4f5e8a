use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Invalid scene: {0}")]
    InvalidScene(String),
    #[error("Text '{0}' has not been measured")]
    Unmeasured(String),
}
