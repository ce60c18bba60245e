use serde::{Deserialize, Serialize};

/// A 2D point in graph or screen coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Self = Self { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    pub fn scale(&self, factor: f64) -> Self {
        Self::new(self.x * factor, self.y * factor)
    }

    pub fn distance(&self, other: Point) -> f64 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Linear interpolation between `self` (t = 0) and `other` (t = 1).
    pub fn lerp(&self, other: Point, t: f64) -> Self {
        Self::new(
            self.x + (other.x - self.x) * t,
            self.y + (other.y - self.y) * t,
        )
    }
}

/// Axis-aligned rectangle stored as origin plus size.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    /// An empty rectangle at the origin
    pub const NOTHING: Self = Self {
        x: 0.0,
        y: 0.0,
        width: 0.0,
        height: 0.0,
    };

    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Smallest rectangle containing every point, or `None` for an empty slice.
    pub fn from_points(points: &[Point]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x, self.y)
    }

    /// Get the center of the rectangle
    pub fn center(&self) -> Point {
        Point::new(self.x + self.width * 0.5, self.y + self.height * 0.5)
    }

    /// Check if the rectangle contains a point (edges inclusive)
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.x && point.x <= self.right() && point.y >= self.y && point.y <= self.bottom()
    }

    /// Check if this rectangle intersects with another rectangle
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x <= other.right()
            && self.right() >= other.x
            && self.y <= other.bottom()
            && self.bottom() >= other.y
    }

    /// Smallest rectangle covering both inputs.
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }

    /// Return a new rectangle expanded by `amount` on all sides
    pub fn grow(&self, amount: f64) -> Rect {
        Rect::new(
            self.x - amount,
            self.y - amount,
            self.width + 2.0 * amount,
            self.height + 2.0 * amount,
        )
    }

    pub fn translate(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    pub fn scale(&self, factor: f64) -> Rect {
        Rect::new(
            self.x * factor,
            self.y * factor,
            self.width * factor,
            self.height * factor,
        )
    }
}

/// Geometry of a cell, relative to its parent.
///
/// For vertices `x`/`y` are offsets from the parent's origin, or fractions of
/// the parent's size when `relative` is set. For children of an edge with
/// `relative` set, `x` is the position along the edge in `[0, 1]` and `offset`
/// is a pixel displacement from that point. Edges use `points` for waypoints
/// and `source_point`/`target_point` when a side has no terminal.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Geometry {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub points: Vec<Point>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<Point>,
    pub relative: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_point: Option<Point>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_point: Option<Point>,
}

impl Geometry {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            ..Default::default()
        }
    }

    /// Relative geometry, as used by edges and edge labels.
    pub fn relative(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            relative: true,
            ..Default::default()
        }
    }

    pub fn bounds(&self) -> Rect {
        Rect::new(self.x, self.y, self.width, self.height)
    }

    pub fn with_points(mut self, points: Vec<Point>) -> Self {
        self.points = points;
        self
    }

    pub fn with_offset(mut self, offset: Point) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn terminal_point(&self, is_source: bool) -> Option<Point> {
        if is_source {
            self.source_point
        } else {
            self.target_point
        }
    }

    pub fn set_terminal_point(&mut self, point: Option<Point>, is_source: bool) {
        if is_source {
            self.source_point = point;
        } else {
            self.target_point = point;
        }
    }

    /// Moves the geometry by the given amount. Relative geometries keep their
    /// position; waypoints and terminal points always move.
    pub fn translate(&mut self, dx: f64, dy: f64) {
        if !self.relative {
            self.x += dx;
            self.y += dy;
        }
        for point in &mut self.points {
            *point = point.translate(dx, dy);
        }
        self.source_point = self.source_point.map(|p| p.translate(dx, dy));
        self.target_point = self.target_point.map(|p| p.translate(dx, dy));
    }
}
