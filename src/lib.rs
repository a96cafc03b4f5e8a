//! Render vector scenes to PGF markup, measuring text with a live TeX engine.
//!
//! - [`builder`]: scene construction that pauses for engine measurements
//! - [`driver`]: markup output, one-shot PDF runs and online renders
//! - [`description`]: JSON scene descriptions used by the `pgfkit` binary

pub mod builder;
pub mod description;
pub mod driver;
pub mod error;

pub use builder::{Measurer, SessionOutcome};
pub use description::SceneDescription;
pub use error::PipelineError;

pub use pgfkit_online as online;
pub use pgfkit_render_core as render;
pub use pgfkit_traits as traits;
pub use pgfkit_types as types;
