use cellgraph_core::{CellIndex, CellKind, Point, Rect, StyleMap};

/// Handle of a painter-owned visual object (shape or label).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeHandle(pub u64);

/// Derived visual state of one cell in one view.
///
/// Only [`crate::GraphView::validate`] recomputes states. `revision` counts
/// recomputations, so readers can tell whether a state changed since they
/// last looked.
#[derive(Debug, Clone, PartialEq)]
pub struct CellState {
    pub cell: CellIndex,
    pub kind: CellKind,
    pub(crate) invalid: bool,
    pub revision: u64,
    /// Absolute position in graph units, before translate and scale.
    pub origin: Point,
    /// Screen-space bounds.
    pub bounds: Rect,
    /// Width and height in graph units.
    pub unscaled_size: (f64, f64),
    pub style: StyleMap,
    /// Screen-space route of an edge, source end first.
    pub absolute_points: Vec<Point>,
    /// Screen-space anchor of the label.
    pub absolute_offset: Point,
    pub visible_source: Option<CellIndex>,
    pub visible_target: Option<CellIndex>,
    /// Total route length and the length of each segment.
    pub length: f64,
    pub segments: Vec<f64>,
    pub text: String,
    pub shape: Option<ShapeHandle>,
    pub text_shape: Option<ShapeHandle>,
    /// Set when the route is a straight-line fallback.
    pub routing_fallback: bool,
}

impl CellState {
    pub fn new(cell: CellIndex, kind: CellKind) -> Self {
        Self {
            cell,
            kind,
            invalid: true,
            revision: 0,
            origin: Point::ORIGIN,
            bounds: Rect::NOTHING,
            unscaled_size: (0.0, 0.0),
            style: StyleMap::new(),
            absolute_points: Vec::new(),
            absolute_offset: Point::ORIGIN,
            visible_source: None,
            visible_target: None,
            length: 0.0,
            segments: Vec::new(),
            text: String::new(),
            shape: None,
            text_shape: None,
            routing_fallback: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        !self.invalid
    }

    pub fn invalidate(&mut self) {
        self.invalid = true;
    }

    pub fn center(&self) -> Point {
        self.bounds.center()
    }

    pub fn visible_terminal(&self, is_source: bool) -> Option<CellIndex> {
        if is_source {
            self.visible_source
        } else {
            self.visible_target
        }
    }

    /// Both ends resolve to the same visible cell.
    pub fn is_loop(&self) -> bool {
        self.kind.is_edge() && self.visible_source.is_some() && self.visible_source == self.visible_target
    }

    /// Recomputes `length` and `segments` from `absolute_points`.
    pub(crate) fn update_lengths(&mut self) {
        self.segments = self
            .absolute_points
            .windows(2)
            .map(|pair| pair[0].distance(pair[1]))
            .collect();
        self.length = self.segments.iter().sum();
    }

    /// Point at `fraction` (clamped to `[0, 1]`) of the route length.
    pub fn point_at(&self, fraction: f64) -> Option<Point> {
        let first = *self.absolute_points.first()?;
        if self.length <= 0.0 {
            return Some(first);
        }
        let mut remaining = fraction.clamp(0.0, 1.0) * self.length;
        for (pair, segment) in self.absolute_points.windows(2).zip(&self.segments) {
            if remaining <= *segment {
                let t = if *segment > 0.0 { remaining / segment } else { 0.0 };
                return Some(pair[0].lerp(pair[1], t));
            }
            remaining -= segment;
        }
        self.absolute_points.last().copied()
    }
}
