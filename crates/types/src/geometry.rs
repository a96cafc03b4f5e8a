use serde::{Deserialize, Serialize};

/// A point in big points (1/72 inch), y axis pointing up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self { x: self.x + dx, y: self.y + dy }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn zero() -> Self {
        Self { width: 0.0, height: 0.0 }
    }

    /// Width and height rounded to whole points, as page-size templates want them.
    pub fn rounded(self) -> (i64, i64) {
        (self.width.round() as i64, self.height.round() as i64)
    }
}

/// An axis-aligned box given by its lower-left and upper-right corners.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub llx: f64,
    pub lly: f64,
    pub urx: f64,
    pub ury: f64,
}

impl BoundingBox {
    pub fn new(llx: f64, lly: f64, urx: f64, ury: f64) -> Self {
        Self {
            llx: llx.min(urx),
            lly: lly.min(ury),
            urx: llx.max(urx),
            ury: lly.max(ury),
        }
    }

    pub fn from_origin(origin: Point, size: Size) -> Self {
        Self::new(origin.x, origin.y, origin.x + size.width, origin.y + size.height)
    }

    pub fn width(&self) -> f64 {
        self.urx - self.llx
    }

    pub fn height(&self) -> f64 {
        self.ury - self.lly
    }

    pub fn size(&self) -> Size {
        Size::new(self.width(), self.height())
    }

    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            llx: self.llx.min(other.llx),
            lly: self.lly.min(other.lly),
            urx: self.urx.max(other.urx),
            ury: self.ury.max(other.ury),
        }
    }

    pub fn translate(&self, dx: f64, dy: f64) -> BoundingBox {
        BoundingBox {
            llx: self.llx + dx,
            lly: self.lly + dy,
            urx: self.urx + dx,
            ury: self.ury + dy,
        }
    }

    /// Grows the box by `amount` on every side.
    pub fn inflate(&self, amount: f64) -> BoundingBox {
        BoundingBox::new(self.llx - amount, self.lly - amount, self.urx + amount, self.ury + amount)
    }

    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.llx, self.lly),
            Point::new(self.urx, self.lly),
            Point::new(self.urx, self.ury),
            Point::new(self.llx, self.ury),
        ]
    }

    /// Smallest box containing all of `points`, or `None` when empty.
    pub fn enclosing<I: IntoIterator<Item = Point>>(points: I) -> Option<BoundingBox> {
        points.into_iter().fold(None, |acc, p| {
            let pb = BoundingBox { llx: p.x, lly: p.y, urx: p.x, ury: p.y };
            Some(match acc {
                Some(b) => b.union(&pb),
                None => pb,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_union_and_inflate() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 5.0);
        let b = BoundingBox::new(5.0, -2.0, 20.0, 3.0);
        let u = a.union(&b);
        assert_eq!(u, BoundingBox::new(0.0, -2.0, 20.0, 5.0));
        assert_eq!(u.inflate(1.0).width(), 22.0);
    }

    #[test]
    fn test_new_normalises_corners() {
        let b = BoundingBox::new(10.0, 5.0, 0.0, 0.0);
        assert_eq!(b.llx, 0.0);
        assert_eq!(b.ury, 5.0);
    }

    #[test]
    fn test_enclosing() {
        assert!(BoundingBox::enclosing(Vec::new()).is_none());
        let b = BoundingBox::enclosing(vec![Point::new(1.0, 2.0), Point::new(-1.0, 4.0)]).unwrap();
        assert_eq!(b, BoundingBox::new(-1.0, 2.0, 1.0, 4.0));
    }

    #[test]
    fn test_size_rounding() {
        assert_eq!(Size::new(99.6, 50.4).rounded(), (100, 50));
    }
}
