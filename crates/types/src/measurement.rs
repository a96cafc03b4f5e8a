use crate::geometry::{BoundingBox, Size};
use serde::{Deserialize, Serialize};

/// Which shape of answer a measurement point wants back.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MeasureKind {
    /// Width and total vertical extent; `depth` is folded into `height`.
    Size,
    /// Width, height above the baseline and depth below it.
    #[default]
    Baseline,
    /// Baseline metrics plus a four-sided bounding box.
    BoundingBox,
}

/// A fragment of markup to be typeset in an hbox and measured.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MeasurementRequest {
    pub content: String,
    pub kind: MeasureKind,
}

impl MeasurementRequest {
    pub fn new(content: impl Into<String>) -> Self {
        Self { content: content.into(), kind: MeasureKind::default() }
    }

    pub fn with_kind(mut self, kind: MeasureKind) -> Self {
        self.kind = kind;
        self
    }
}

/// Box metrics reported by the engine, in big points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MeasurementResult {
    pub width: f64,
    pub height: f64,
    pub depth: f64,
    pub bbox: Option<BoundingBox>,
}

impl MeasurementResult {
    pub fn new(width: f64, height: f64, depth: f64) -> Self {
        Self { width, height, depth, bbox: None }
    }

    /// Total vertical extent (height plus depth).
    pub fn total_height(&self) -> f64 {
        self.height + self.depth
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.total_height())
    }

    /// True when every reported dimension is finite and width/height are non-negative.
    pub fn is_well_formed(&self) -> bool {
        self.width.is_finite()
            && self.height.is_finite()
            && self.depth.is_finite()
            && self.width >= 0.0
            && self.height >= 0.0
    }

    /// Reshapes raw box metrics into the form `kind` asks for.
    pub fn shaped(self, kind: MeasureKind) -> Self {
        match kind {
            MeasureKind::Size => Self {
                width: self.width,
                height: self.total_height(),
                depth: 0.0,
                bbox: self.bbox,
            },
            MeasureKind::Baseline => self,
            MeasureKind::BoundingBox => Self {
                bbox: Some(self.bbox.unwrap_or_else(|| {
                    BoundingBox::new(0.0, -self.depth, self.width, self.height)
                })),
                ..self
            },
        }
    }
}
