//! Scene model and PGF markup generation.
//!
//! - [`scene`]: paths, text and groups, with helpers that lay out measured text
//! - [`pgf`]: the `PgfWriter` serializer for each dialect
//! - [`document`]: standalone document assembly from an engine profile

pub mod document;
mod error;
pub mod pgf;
pub mod scene;

pub use document::{document_tail, standalone_document};
pub use error::RenderError;
pub use pgf::{PgfWriter, render_picture};
pub use scene::{Anchor, Group, Node, PathNode, PathSegment, Scene, Style, TextNode, Transform, hcat};
