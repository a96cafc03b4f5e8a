use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProfileError {
    #[error("Unknown dialect '{0}': expected one of latex, context, plain (or l, c, p, t)")]
    UnknownDialect(String),

    #[error("Invalid engine profile: {0}")]
    Invalid(String),
}
