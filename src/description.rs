//! JSON scene descriptions.
//!
//! ```json
//! {
//!   "width": 200, "height": 80,
//!   "items": [
//!     { "type": "path", "points": [[0,0],[50,0],[50,20]], "closed": true, "stroke": "#000" },
//!     { "type": "label", "content": "Hello", "at": [10, 40], "frame": { "padding": 3 } },
//!     { "type": "row", "at": [10, 10], "gap": 6, "labels": [{ "content": "a" }, { "content": "b" }] }
//!   ]
//! }
//! ```
//!
//! `label` and `row` items are measurement points: their text is sized by the
//! engine before the scene is laid out.

use crate::builder::Measurer;
use pgfkit_online::OnlineError;
use pgfkit_render_core::{Anchor, Node, PathNode, RenderError, Scene, Style, TextNode, Transform, hcat};
use pgfkit_types::{Color, MeasurementRequest, MeasurementResult, Point, Size};
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SceneDescription {
    /// Picture size; when either side is missing the scene is fitted to its content.
    pub width: Option<f64>,
    pub height: Option<f64>,
    /// Margin used when fitting to content.
    #[serde(default)]
    pub padding: f64,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Item {
    #[serde(rename_all = "camelCase")]
    Path {
        points: Vec<[f64; 2]>,
        #[serde(default)]
        closed: bool,
        stroke: Option<Color>,
        fill: Option<Color>,
        line_width: Option<f64>,
    },
    /// Text placed as is, without measuring.
    Text {
        content: String,
        at: [f64; 2],
        #[serde(default)]
        anchor: AnchorName,
        color: Option<Color>,
    },
    /// Measured text, optionally framed.
    Label {
        content: String,
        at: [f64; 2],
        #[serde(default)]
        anchor: AnchorName,
        color: Option<Color>,
        frame: Option<Frame>,
    },
    /// Measured labels laid out left to right, baselines at `at`.
    Row {
        at: [f64; 2],
        #[serde(default = "default_gap")]
        gap: f64,
        labels: Vec<RowLabel>,
    },
}

fn default_gap() -> f64 {
    4.0
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RowLabel {
    pub content: String,
    pub color: Option<Color>,
    pub frame: Option<Frame>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Frame {
    #[serde(default = "default_padding")]
    pub padding: f64,
    pub stroke: Option<Color>,
    pub fill: Option<Color>,
    pub line_width: Option<f64>,
}

fn default_padding() -> f64 {
    2.0
}

impl Frame {
    fn style(&self) -> Style {
        Style {
            // An unstyled frame is still drawn.
            stroke: self.stroke.or(if self.fill.is_none() { Some(Color::BLACK) } else { None }),
            fill: self.fill,
            line_width: self.line_width,
            clip: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AnchorName {
    Center,
    Base,
    #[default]
    BaseWest,
    BaseEast,
    West,
    East,
    North,
    South,
}

impl From<AnchorName> for Anchor {
    fn from(name: AnchorName) -> Self {
        match name {
            AnchorName::Center => Anchor::Center,
            AnchorName::Base => Anchor::Base,
            AnchorName::BaseWest => Anchor::BaseWest,
            AnchorName::BaseEast => Anchor::BaseEast,
            AnchorName::West => Anchor::West,
            AnchorName::East => Anchor::East,
            AnchorName::North => Anchor::North,
            AnchorName::South => Anchor::South,
        }
    }
}

fn point([x, y]: [f64; 2]) -> Point {
    Point::new(x, y)
}

impl SceneDescription {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Number of measurement points the description contains.
    pub fn measurement_points(&self) -> usize {
        self.items
            .iter()
            .map(|item| match item {
                Item::Label { .. } => 1,
                Item::Row { labels, .. } => labels.len(),
                Item::Path { .. } | Item::Text { .. } => 0,
            })
            .sum()
    }

    pub fn needs_measurement(&self) -> bool {
        self.measurement_points() > 0
    }

    /// The scene without an engine. Fails on the first measured label.
    pub fn static_scene(&self) -> Result<Scene, RenderError> {
        self.assemble(&mut |content: &str| Err(RenderError::Unmeasured(content.to_string())))
    }

    /// The scene with every label measured through `measurer`, in item order.
    pub fn build(&self, measurer: &mut Measurer) -> Result<Scene, OnlineError> {
        self.assemble(&mut |content: &str| measurer.measure(MeasurementRequest::new(content)))
    }

    fn assemble<E>(
        &self,
        measure: &mut impl FnMut(&str) -> Result<MeasurementResult, E>,
    ) -> Result<Scene, E> {
        let mut nodes = Vec::with_capacity(self.items.len());
        for item in &self.items {
            let node = match item {
                Item::Path { points, closed, stroke, fill, line_width } => {
                    let style = Style { stroke: *stroke, fill: *fill, line_width: *line_width, clip: false };
                    let pts: Vec<Point> = points.iter().copied().map(point).collect();
                    let path = if *closed { PathNode::polygon(&pts) } else { open_path(&pts) };
                    Node::Path(path.with_style(style))
                }
                Item::Text { content, at, anchor, color } => {
                    let mut text = TextNode::new(content.as_str()).at(point(*at)).with_anchor((*anchor).into());
                    text.color = *color;
                    Node::Text(text)
                }
                Item::Label { content, at, anchor, color, frame } => {
                    let metrics = measure(content.as_str())?;
                    let mut text = TextNode::new(content.as_str())
                        .at(point(*at))
                        .with_anchor((*anchor).into())
                        .with_metrics(metrics);
                    text.color = *color;
                    label_node(text, frame.as_ref())
                }
                Item::Row { at, gap, labels } => {
                    let mut cells = Vec::with_capacity(labels.len());
                    for label in labels {
                        let metrics = measure(label.content.as_str())?;
                        let mut text = TextNode::new(label.content.as_str()).with_metrics(metrics);
                        text.color = label.color;
                        cells.push(label_node(text, label.frame.as_ref()));
                    }
                    let [x, y] = *at;
                    Node::Group(hcat(cells, *gap).with_transform(Transform::translate(x, y)))
                }
            };
            nodes.push(node);
        }

        let scene = Scene { size: Size::zero(), nodes };
        Ok(match (self.width, self.height) {
            (Some(width), Some(height)) => Scene { size: Size::new(width, height), ..scene },
            _ => scene.fit_to_content(self.padding),
        })
    }
}

fn open_path(points: &[Point]) -> PathNode {
    let mut path = PathNode::new();
    for (i, &p) in points.iter().enumerate() {
        path = if i == 0 { path.move_to(p) } else { path.line_to(p) };
    }
    path
}

fn label_node(text: TextNode, frame: Option<&Frame>) -> Node {
    match frame {
        Some(frame) => match text.clone().framed(frame.padding, frame.style()) {
            Ok(group) => Node::Group(group),
            Err(_) => Node::Text(text),
        },
        None => Node::Text(text),
    }
}
