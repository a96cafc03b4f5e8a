//! Serializes a [`Scene`] into a PGF picture for one dialect.

use crate::error::RenderError;
use crate::scene::{Anchor, Group, Node, PathNode, PathSegment, Scene, Style, TextNode, Transform};
use pgfkit_types::{Color, Dialect, Point, Size};
use std::collections::BTreeSet;

const INDENT: &str = "  ";

pub struct PgfWriter {
    dialect: Dialect,
    readable: bool,
    size: Option<Size>,
    out: String,
    depth: usize,
}

impl PgfWriter {
    pub fn new(dialect: Dialect) -> Self {
        Self { dialect, readable: true, size: None, out: String::new(), depth: 0 }
    }

    /// One command per line, indented by scope depth. Compact output has no
    /// line breaks at all.
    pub fn with_readable(mut self, readable: bool) -> Self {
        self.readable = readable;
        self
    }

    /// Picture size to use instead of the scene's own.
    pub fn with_size(mut self, size: Size) -> Self {
        self.size = Some(size);
        self
    }

    /// Renders `scene` as a complete picture environment.
    pub fn render(mut self, scene: &Scene) -> Result<String, RenderError> {
        scene.validate()?;
        let size = self.size.unwrap_or(scene.size);
        if !(size.width.is_finite() && size.height.is_finite()) || size.width < 0.0 || size.height < 0.0 {
            return Err(RenderError::InvalidScene(format!(
                "picture size {}x{} is not usable",
                size.width, size.height
            )));
        }
        let (begin, end) = self.picture_delimiters();
        self.emit(begin);
        self.depth += 1;

        for color in scene_colors(scene) {
            let definition = self.color_definition(color);
            self.emit(&definition);
        }

        // Fix the picture's size to the scene's regardless of what is drawn.
        self.emit(&format!(
            r"\pgfpathrectangle{{\pgfpointorigin}}{{{}}}",
            point(Point::new(size.width, size.height))
        ));
        self.emit(r"\pgfusepath{use as bounding box}");

        for node in &scene.nodes {
            self.write_node(node);
        }

        self.depth -= 1;
        self.emit(end);
        Ok(self.out)
    }

    fn picture_delimiters(&self) -> (&'static str, &'static str) {
        match self.dialect {
            Dialect::LaTeX => (r"\begin{pgfpicture}", r"\end{pgfpicture}"),
            Dialect::ConTeXt => (r"\startpgfpicture", r"\stoppgfpicture"),
            Dialect::PlainTeX => (r"\pgfpicture", r"\endpgfpicture"),
        }
    }

    fn scope_delimiters(&self) -> (&'static str, &'static str) {
        match self.dialect {
            Dialect::LaTeX => (r"\begin{pgfscope}", r"\end{pgfscope}"),
            Dialect::ConTeXt => (r"\startpgfscope", r"\stoppgfscope"),
            Dialect::PlainTeX => (r"\pgfscope", r"\endpgfscope"),
        }
    }

    fn color_definition(&self, color: Color) -> String {
        let (r, g, b) = color.unit_rgb();
        let name = color_name(color);
        match self.dialect {
            Dialect::ConTeXt => {
                format!(r"\definecolor[{name}][r={},g={},b={}]", number(r), number(g), number(b))
            }
            Dialect::LaTeX | Dialect::PlainTeX => {
                format!(r"\definecolor{{{name}}}{{rgb}}{{{},{},{}}}", number(r), number(g), number(b))
            }
        }
    }

    fn emit(&mut self, command: &str) {
        if self.readable {
            for _ in 0..self.depth {
                self.out.push_str(INDENT);
            }
            self.out.push_str(command);
            self.out.push('\n');
        } else {
            self.out.push_str(command);
        }
    }

    fn begin_scope(&mut self) {
        let (begin, _) = self.scope_delimiters();
        self.emit(begin);
        self.depth += 1;
    }

    fn end_scope(&mut self) {
        let (_, end) = self.scope_delimiters();
        self.depth -= 1;
        self.emit(end);
    }

    fn write_node(&mut self, node: &Node) {
        match node {
            Node::Path(path) => self.write_path(path),
            Node::Text(text) => self.write_text(text),
            Node::Group(group) => self.write_group(group),
        }
    }

    fn write_group(&mut self, group: &Group) {
        self.begin_scope();
        if let Some(t) = group.transform.filter(|t| !t.is_identity()) {
            self.emit(&transform(&t));
        }
        if let Some(clip) = &group.clip {
            self.write_segments(clip);
            self.emit(r"\pgfusepath{clip}");
        }
        for child in &group.children {
            self.write_node(child);
        }
        self.end_scope();
    }

    fn write_path(&mut self, path: &PathNode) {
        let style = &path.style;
        // A clipping path has to stay in the enclosing scope to affect what follows.
        let scoped = !style.clip && (style.stroke.is_some() || style.fill.is_some() || style.line_width.is_some());
        if scoped {
            self.begin_scope();
        }
        self.write_style(style);
        self.write_segments(path);
        self.emit(&format!(r"\pgfusepath{{{}}}", usage(style)));
        if scoped {
            self.end_scope();
        }
    }

    fn write_style(&mut self, style: &Style) {
        if let Some(width) = style.line_width {
            self.emit(&format!(r"\pgfsetlinewidth{{{}bp}}", number(width)));
        }
        if let Some(stroke) = style.stroke {
            self.emit(&format!(r"\pgfsetstrokecolor{{{}}}", color_name(stroke)));
            if !stroke.is_opaque() {
                self.emit(&format!(r"\pgfsetstrokeopacity{{{}}}", number(f64::from(stroke.a))));
            }
        }
        if let Some(fill) = style.fill {
            self.emit(&format!(r"\pgfsetfillcolor{{{}}}", color_name(fill)));
            if !fill.is_opaque() {
                self.emit(&format!(r"\pgfsetfillopacity{{{}}}", number(f64::from(fill.a))));
            }
        }
    }

    fn write_segments(&mut self, path: &PathNode) {
        for segment in &path.segments {
            let command = match *segment {
                PathSegment::MoveTo(p) => format!(r"\pgfpathmoveto{{{}}}", point(p)),
                PathSegment::LineTo(p) => format!(r"\pgfpathlineto{{{}}}", point(p)),
                PathSegment::CurveTo(a, b, c) => {
                    format!(r"\pgfpathcurveto{{{}}}{{{}}}{{{}}}", point(a), point(b), point(c))
                }
                PathSegment::Close => r"\pgfpathclose".to_string(),
            };
            self.emit(&command);
        }
    }

    fn write_text(&mut self, text: &TextNode) {
        let command = format!(
            r"\pgftext[{}at={{{}}}]{{{}}}",
            anchor_options(text.anchor),
            point(text.origin),
            text.content.replace(['\r', '\n'], " ")
        );
        match text.color {
            Some(color) => {
                self.begin_scope();
                self.emit(&format!(r"\pgfsetcolor{{{}}}", color_name(color)));
                self.emit(&command);
                self.end_scope();
            }
            None => self.emit(&command),
        }
    }
}

/// Renders `scene` with `dialect`'s picture syntax.
pub fn render_picture(dialect: Dialect, readable: bool, scene: &Scene) -> Result<String, RenderError> {
    PgfWriter::new(dialect).with_readable(readable).render(scene)
}

fn usage(style: &Style) -> &'static str {
    match (style.fill.is_some(), style.stroke.is_some(), style.clip) {
        (false, false, false) => "discard",
        (true, false, false) => "fill",
        (false, true, false) => "stroke",
        (true, true, false) => "fill,stroke",
        (false, false, true) => "clip",
        (true, false, true) => "fill,clip",
        (false, true, true) => "stroke,clip",
        (true, true, true) => "fill,stroke,clip",
    }
}

fn anchor_options(anchor: Anchor) -> &'static str {
    match anchor {
        Anchor::Center => "",
        Anchor::Base => "base,",
        Anchor::BaseWest => "left,base,",
        Anchor::BaseEast => "right,base,",
        Anchor::West => "left,",
        Anchor::East => "right,",
        Anchor::North => "top,",
        Anchor::South => "bottom,",
    }
}

fn transform(t: &Transform) -> String {
    format!(
        r"\pgftransformcm{{{}}}{{{}}}{{{}}}{{{}}}{{{}}}",
        number(t.a),
        number(t.b),
        number(t.c),
        number(t.d),
        point(Point::new(t.e, t.f))
    )
}

fn point(p: Point) -> String {
    format!(r"\pgfpoint{{{}bp}}{{{}bp}}", number(p.x), number(p.y))
}

/// Fixed-point notation TeX can read: at most four decimals, no exponent,
/// trailing zeros dropped.
fn number(v: f64) -> String {
    let s = format!("{v:.4}");
    let s = s.trim_end_matches('0').trim_end_matches('.');
    match s {
        "-0" | "" => "0".to_string(),
        s => s.to_string(),
    }
}

fn color_name(color: Color) -> String {
    format!("pgfkit{:02X}{:02X}{:02X}", color.r, color.g, color.b)
}

fn scene_colors(scene: &Scene) -> Vec<Color> {
    fn collect(node: &Node, seen: &mut BTreeSet<(u8, u8, u8)>) {
        match node {
            Node::Path(p) => {
                for c in [p.style.stroke, p.style.fill].into_iter().flatten() {
                    seen.insert((c.r, c.g, c.b));
                }
            }
            Node::Text(t) => {
                if let Some(c) = t.color {
                    seen.insert((c.r, c.g, c.b));
                }
            }
            Node::Group(g) => {
                for child in &g.children {
                    collect(child, seen);
                }
            }
        }
    }
    let mut seen = BTreeSet::new();
    for node in &scene.nodes {
        collect(node, &mut seen);
    }
    seen.into_iter().map(|(r, g, b)| Color::rgb(r, g, b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgfkit_types::{BoundingBox, MeasurementResult};

    fn square_scene() -> Scene {
        Scene::new(Size::new(100.0, 50.0)).with_node(
            PathNode::rectangle(&BoundingBox::new(10.0, 10.0, 20.0, 20.0))
                .with_style(Style::stroked(Color::rgb(255, 0, 0)).with_line_width(0.5)),
        )
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(number(1.0), "1");
        assert_eq!(number(0.5), "0.5");
        assert_eq!(number(1.0 / 3.0), "0.3333");
        assert_eq!(number(-0.00001), "0");
        assert_eq!(number(1e-7), "0");
        assert_eq!(number(-12.25), "-12.25");
    }

    #[test]
    fn test_plain_picture_readable() {
        let out = render_picture(Dialect::PlainTeX, true, &square_scene()).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], r"\pgfpicture");
        assert_eq!(lines[1], r"  \definecolor{pgfkitFF0000}{rgb}{1,0,0}");
        assert_eq!(lines[2], r"  \pgfpathrectangle{\pgfpointorigin}{\pgfpoint{100bp}{50bp}}");
        assert_eq!(lines[3], r"  \pgfusepath{use as bounding box}");
        assert_eq!(lines[4], r"  \pgfscope");
        assert_eq!(lines[5], r"    \pgfsetlinewidth{0.5bp}");
        assert_eq!(lines[6], r"    \pgfsetstrokecolor{pgfkitFF0000}");
        assert_eq!(lines[7], r"    \pgfpathmoveto{\pgfpoint{10bp}{10bp}}");
        assert!(lines.contains(&r"    \pgfpathclose"));
        assert!(lines.contains(&r"    \pgfusepath{stroke}"));
        assert_eq!(lines[lines.len() - 2], r"  \endpgfscope");
        assert_eq!(lines[lines.len() - 1], r"\endpgfpicture");
    }

    #[test]
    fn test_compact_has_no_newlines() {
        let out = render_picture(Dialect::LaTeX, false, &square_scene()).unwrap();
        assert!(!out.contains('\n'));
        assert!(out.starts_with(r"\begin{pgfpicture}\definecolor"));
        assert!(out.ends_with(r"\end{pgfscope}\end{pgfpicture}"));
    }

    #[test]
    fn test_context_syntax() {
        let out = render_picture(Dialect::ConTeXt, true, &square_scene()).unwrap();
        assert!(out.starts_with("\\startpgfpicture\n"));
        assert!(out.contains(r"\definecolor[pgfkitFF0000][r=1,g=0,b=0]"));
        assert!(out.contains(r"\startpgfscope"));
        assert!(out.trim_end().ends_with(r"\stoppgfpicture"));
    }

    #[test]
    fn test_text_and_transform() {
        let text = TextNode::new("Hello")
            .at(Point::new(5.0, 6.0))
            .with_metrics(MeasurementResult::new(20.0, 7.0, 0.0));
        let group = Group::new(vec![text.into()]).with_transform(Transform::translate(1.0, 2.0));
        let scene = Scene::new(Size::new(30.0, 30.0)).with_node(group);
        let out = render_picture(Dialect::PlainTeX, true, &scene).unwrap();
        assert!(out.contains(r"\pgftransformcm{1}{0}{0}{1}{\pgfpoint{1bp}{2bp}}"));
        assert!(out.contains(r"\pgftext[left,base,at={\pgfpoint{5bp}{6bp}}]{Hello}"));
    }

    #[test]
    fn test_clip_path_is_not_scoped() {
        let clip = PathNode::rectangle(&BoundingBox::new(0.0, 0.0, 5.0, 5.0))
            .with_style(Style::default().with_clip(true));
        let scene = Scene::new(Size::new(10.0, 10.0)).with_node(clip);
        let out = render_picture(Dialect::PlainTeX, true, &scene).unwrap();
        assert!(!out.contains(r"\pgfscope"));
        assert!(out.contains(r"\pgfusepath{clip}"));
    }

    #[test]
    fn test_size_override() {
        let out = PgfWriter::new(Dialect::LaTeX)
            .with_size(Size::new(40.0, 30.0))
            .render(&square_scene())
            .unwrap();
        assert!(out.contains(r"\pgfpathrectangle{\pgfpointorigin}{\pgfpoint{40bp}{30bp}}"));
    }

    #[test]
    fn test_invalid_scene_is_rejected() {
        let scene = Scene::new(Size::new(f64::INFINITY, 1.0));
        assert!(render_picture(Dialect::LaTeX, true, &scene).is_err());
    }
}
