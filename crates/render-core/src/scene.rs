//! A small scene graph: paths, text and groups in big points with the y axis up.
//!
//! Text nodes carry the metrics reported by the engine, so layout helpers such
//! as [`hcat`] and [`TextNode::framed`] work on real typeset sizes.

use crate::error::RenderError;
use pgfkit_types::{BoundingBox, Color, MeasurementResult, Point, Size};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSegment {
    MoveTo(Point),
    LineTo(Point),
    CurveTo(Point, Point, Point),
    Close,
}

impl PathSegment {
    fn points(&self) -> Vec<Point> {
        match *self {
            PathSegment::MoveTo(p) | PathSegment::LineTo(p) => vec![p],
            PathSegment::CurveTo(a, b, c) => vec![a, b, c],
            PathSegment::Close => Vec::new(),
        }
    }

    fn map(self, f: impl Fn(Point) -> Point) -> Self {
        match self {
            PathSegment::MoveTo(p) => PathSegment::MoveTo(f(p)),
            PathSegment::LineTo(p) => PathSegment::LineTo(f(p)),
            PathSegment::CurveTo(a, b, c) => PathSegment::CurveTo(f(a), f(b), f(c)),
            PathSegment::Close => PathSegment::Close,
        }
    }
}

/// How a path is painted. A path with neither stroke nor fill (and no clip) is discarded.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Style {
    pub stroke: Option<Color>,
    pub fill: Option<Color>,
    pub line_width: Option<f64>,
    /// Clip everything after this path in the enclosing group.
    pub clip: bool,
}

impl Style {
    pub fn stroked(color: Color) -> Self {
        Self { stroke: Some(color), ..Self::default() }
    }

    pub fn filled(color: Color) -> Self {
        Self { fill: Some(color), ..Self::default() }
    }

    pub fn with_stroke(mut self, color: Color) -> Self {
        self.stroke = Some(color);
        self
    }

    pub fn with_fill(mut self, color: Color) -> Self {
        self.fill = Some(color);
        self
    }

    pub fn with_line_width(mut self, width: f64) -> Self {
        self.line_width = Some(width);
        self
    }

    pub fn with_clip(mut self, clip: bool) -> Self {
        self.clip = clip;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathNode {
    pub segments: Vec<PathSegment>,
    pub style: Style,
}

impl PathNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn move_to(mut self, p: Point) -> Self {
        self.segments.push(PathSegment::MoveTo(p));
        self
    }

    pub fn line_to(mut self, p: Point) -> Self {
        self.segments.push(PathSegment::LineTo(p));
        self
    }

    pub fn curve_to(mut self, c1: Point, c2: Point, end: Point) -> Self {
        self.segments.push(PathSegment::CurveTo(c1, c2, end));
        self
    }

    pub fn close(mut self) -> Self {
        self.segments.push(PathSegment::Close);
        self
    }

    pub fn with_style(mut self, style: Style) -> Self {
        self.style = style;
        self
    }

    /// Closed polyline through `points`.
    pub fn polygon(points: &[Point]) -> Self {
        let mut path = Self::new();
        for (i, &p) in points.iter().enumerate() {
            path = if i == 0 { path.move_to(p) } else { path.line_to(p) };
        }
        if !points.is_empty() {
            path = path.close();
        }
        path
    }

    pub fn rectangle(bbox: &BoundingBox) -> Self {
        Self::polygon(&bbox.corners())
    }

    /// Control-point hull of the path, which contains the curve.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::enclosing(self.segments.iter().flat_map(PathSegment::points))
    }

    fn translated(mut self, dx: f64, dy: f64) -> Self {
        self.segments = self.segments.into_iter().map(|s| s.map(|p| p.offset(dx, dy))).collect();
        self
    }
}

/// Where a text node's origin sits relative to its box.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Anchor {
    Center,
    /// Horizontally centred on the baseline.
    Base,
    #[default]
    BaseWest,
    BaseEast,
    West,
    East,
    North,
    South,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextNode {
    pub content: String,
    pub origin: Point,
    pub anchor: Anchor,
    pub color: Option<Color>,
    /// Box metrics from the engine; `None` until measured.
    pub metrics: Option<MeasurementResult>,
}

impl TextNode {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            origin: Point::default(),
            anchor: Anchor::default(),
            color: None,
            metrics: None,
        }
    }

    pub fn at(mut self, origin: Point) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_anchor(mut self, anchor: Anchor) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn with_color(mut self, color: Color) -> Self {
        self.color = Some(color);
        self
    }

    pub fn with_metrics(mut self, metrics: MeasurementResult) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn measured_size(&self) -> Option<Size> {
        self.metrics.map(|m| m.size())
    }

    /// The typeset box placed according to the anchor.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let m = self.metrics?;
        let (w, h, d) = (m.width, m.height, m.depth);
        let Point { x, y } = self.origin;
        let left = match self.anchor {
            Anchor::BaseWest | Anchor::West => x,
            Anchor::BaseEast | Anchor::East => x - w,
            Anchor::Center | Anchor::Base | Anchor::North | Anchor::South => x - w / 2.0,
        };
        let baseline = match self.anchor {
            Anchor::Base | Anchor::BaseWest | Anchor::BaseEast => y,
            Anchor::Center | Anchor::West | Anchor::East => y - (h + d) / 2.0 + d,
            Anchor::North => y - h,
            Anchor::South => y + d,
        };
        Some(BoundingBox::new(left, baseline - d, left + w, baseline + h))
    }

    /// The text with a rectangle drawn `padding` away from its measured box.
    pub fn framed(self, padding: f64, style: Style) -> Result<Group, RenderError> {
        let bbox = self
            .bounding_box()
            .ok_or_else(|| RenderError::Unmeasured(self.content.clone()))?;
        let frame = PathNode::rectangle(&bbox.inflate(padding)).with_style(style);
        Ok(Group::new(vec![Node::Path(frame), Node::Text(self)]))
    }
}

/// Affine map `(x, y) -> (a*x + c*y + e, b*x + d*y + f)`, the argument order of `\pgftransformcm`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self { a: 1.0, b: 0.0, c: 0.0, d: 1.0, e: 0.0, f: 0.0 }
    }

    pub fn translate(dx: f64, dy: f64) -> Self {
        Self { e: dx, f: dy, ..Self::identity() }
    }

    pub fn scale(sx: f64, sy: f64) -> Self {
        Self { a: sx, d: sy, ..Self::identity() }
    }

    /// Counter-clockwise rotation about the origin.
    pub fn rotate(degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self { a: cos, b: sin, c: -sin, d: cos, e: 0.0, f: 0.0 }
    }

    pub fn apply(&self, p: Point) -> Point {
        Point::new(self.a * p.x + self.c * p.y + self.e, self.b * p.x + self.d * p.y + self.f)
    }

    /// `self` followed by `outer`.
    pub fn then(&self, outer: &Transform) -> Transform {
        Transform {
            a: outer.a * self.a + outer.c * self.b,
            b: outer.b * self.a + outer.d * self.b,
            c: outer.a * self.c + outer.c * self.d,
            d: outer.b * self.c + outer.d * self.d,
            e: outer.a * self.e + outer.c * self.f + outer.e,
            f: outer.b * self.e + outer.d * self.f + outer.f,
        }
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::identity()
    }

    fn is_finite(&self) -> bool {
        [self.a, self.b, self.c, self.d, self.e, self.f].iter().all(|v| v.is_finite())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Group {
    pub children: Vec<Node>,
    pub transform: Option<Transform>,
    /// Clips the children; given in the group's own coordinates.
    pub clip: Option<PathNode>,
}

impl Group {
    pub fn new(children: Vec<Node>) -> Self {
        Self { children, transform: None, clip: None }
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = Some(transform);
        self
    }

    pub fn with_clip(mut self, clip: PathNode) -> Self {
        self.clip = Some(clip);
        self
    }

    pub fn bounding_box(&self) -> Option<BoundingBox> {
        let inner = union_all(self.children.iter().filter_map(Node::bounding_box))?;
        let inner = match self.clip.as_ref().and_then(PathNode::bounding_box) {
            Some(clip) => intersect(&inner, &clip)?,
            None => inner,
        };
        match &self.transform {
            Some(t) => BoundingBox::enclosing(inner.corners().map(|p| t.apply(p))),
            None => Some(inner),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Path(PathNode),
    Text(TextNode),
    Group(Group),
}

impl Node {
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        match self {
            Node::Path(p) => p.bounding_box(),
            Node::Text(t) => t.bounding_box(),
            Node::Group(g) => g.bounding_box(),
        }
    }

    /// The node moved by `(dx, dy)`.
    pub fn translated(self, dx: f64, dy: f64) -> Node {
        match self {
            Node::Path(p) => Node::Path(p.translated(dx, dy)),
            Node::Text(mut t) => {
                t.origin = t.origin.offset(dx, dy);
                Node::Text(t)
            }
            Node::Group(mut g) => {
                let shift = Transform::translate(dx, dy);
                g.transform = Some(match g.transform {
                    Some(t) => t.then(&shift),
                    None => shift,
                });
                Node::Group(g)
            }
        }
    }

    /// Checks that every coordinate and metric is finite.
    pub fn validate(&self) -> Result<(), RenderError> {
        let finite = |p: &Point| p.x.is_finite() && p.y.is_finite();
        match self {
            Node::Path(p) => {
                if p.segments.iter().flat_map(PathSegment::points).all(|p| finite(&p))
                    && p.style.line_width.is_none_or(|w| w.is_finite() && w >= 0.0)
                {
                    Ok(())
                } else {
                    Err(RenderError::InvalidScene("path with a non-finite coordinate".to_string()))
                }
            }
            Node::Text(t) => {
                let metrics_ok = t.metrics.is_none_or(|m| m.is_well_formed());
                if finite(&t.origin) && metrics_ok {
                    Ok(())
                } else {
                    Err(RenderError::InvalidScene(format!("text '{}' is badly placed", t.content)))
                }
            }
            Node::Group(g) => {
                if g.transform.as_ref().is_some_and(|t| !t.is_finite()) {
                    return Err(RenderError::InvalidScene("group with a non-finite transform".to_string()));
                }
                if let Some(clip) = &g.clip {
                    Node::Path(clip.clone()).validate()?;
                }
                g.children.iter().try_for_each(Node::validate)
            }
        }
    }
}

impl From<PathNode> for Node {
    fn from(p: PathNode) -> Self {
        Node::Path(p)
    }
}

impl From<TextNode> for Node {
    fn from(t: TextNode) -> Self {
        Node::Text(t)
    }
}

impl From<Group> for Node {
    fn from(g: Group) -> Self {
        Node::Group(g)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    pub size: Size,
    pub nodes: Vec<Node>,
}

impl Scene {
    pub fn new(size: Size) -> Self {
        Self { size, nodes: Vec::new() }
    }

    pub fn with_node(mut self, node: impl Into<Node>) -> Self {
        self.nodes.push(node.into());
        self
    }

    pub fn push(&mut self, node: impl Into<Node>) {
        self.nodes.push(node.into());
    }

    /// Union of every node's box.
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        union_all(self.nodes.iter().filter_map(Node::bounding_box))
    }

    /// Moves the content so it starts `padding` from the lower-left corner and
    /// sizes the scene to fit it.
    pub fn fit_to_content(self, padding: f64) -> Self {
        let Some(bbox) = self.bounding_box() else {
            return self;
        };
        let (dx, dy) = (padding - bbox.llx, padding - bbox.lly);
        Self {
            size: Size::new(bbox.width() + 2.0 * padding, bbox.height() + 2.0 * padding),
            nodes: self.nodes.into_iter().map(|n| n.translated(dx, dy)).collect(),
        }
    }

    pub fn validate(&self) -> Result<(), RenderError> {
        if !(self.size.width.is_finite() && self.size.height.is_finite())
            || self.size.width < 0.0
            || self.size.height < 0.0
        {
            return Err(RenderError::InvalidScene(format!(
                "scene size {}x{} is not a valid page size",
                self.size.width, self.size.height
            )));
        }
        self.nodes.iter().try_for_each(Node::validate)
    }
}

/// Lays `nodes` out left to right, `gap` apart, using their bounding boxes.
/// Vertical positions (and so baselines) are kept. Nodes without a box are skipped.
pub fn hcat(nodes: Vec<Node>, gap: f64) -> Group {
    let mut cursor = 0.0;
    let mut children = Vec::with_capacity(nodes.len());
    for node in nodes {
        let Some(bbox) = node.bounding_box() else {
            log::debug!("hcat: skipping node without a bounding box");
            continue;
        };
        children.push(node.translated(cursor - bbox.llx, 0.0));
        cursor += bbox.width() + gap;
    }
    Group::new(children)
}

fn union_all(boxes: impl Iterator<Item = BoundingBox>) -> Option<BoundingBox> {
    boxes.reduce(|a, b| a.union(&b))
}

fn intersect(a: &BoundingBox, b: &BoundingBox) -> Option<BoundingBox> {
    let llx = a.llx.max(b.llx);
    let lly = a.lly.max(b.lly);
    let urx = a.urx.min(b.urx);
    let ury = a.ury.min(b.ury);
    (llx <= urx && lly <= ury).then(|| BoundingBox { llx, lly, urx, ury })
}
