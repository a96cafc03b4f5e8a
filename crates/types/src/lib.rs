pub mod color;
pub mod dialect;
pub mod error;
pub mod geometry;
pub mod measurement;
pub mod options;
pub mod profile;

pub use color::Color;
pub use dialect::Dialect;
pub use error::ProfileError;
pub use geometry::{BoundingBox, Point, Size};
pub use measurement::{MeasureKind, MeasurementRequest, MeasurementResult};
pub use options::{OutputFormat, RenderOptions};
pub use profile::{EngineProfile, ProfileOverride};
