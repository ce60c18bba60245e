//! Edge routing strategies.
//!
//! A strategy turns the terminal bounds, terminal points and waypoints of an
//! edge into the full ordered route, first point on the source side and last
//! point on the target side, in screen coordinates.

use cellgraph_core::{Point, Rect, StyleMap, ViewConfig};
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

pub const STRAIGHT: &str = "straight";
pub const ELBOW: &str = "elbow";
pub const ENTITY_RELATION: &str = "entityRelation";
pub const LOOP: &str = "loop";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RoutingError {
    #[error("edge has no {0} terminal or terminal point")]
    MissingEndpoint(&'static str),
    #[error("unknown edge style '{0}'")]
    UnknownStyle(String),
    #[error("routing failed: {0}")]
    Failed(String),
}

/// Inputs of one routing call. Rectangles and points are already scaled and
/// translated.
#[derive(Debug, Clone)]
pub struct RouteRequest<'a> {
    pub source: Option<Rect>,
    pub target: Option<Rect>,
    pub source_point: Option<Point>,
    pub target_point: Option<Point>,
    pub waypoints: &'a [Point],
    pub style: &'a StyleMap,
    pub scale: f64,
    pub config: &'a ViewConfig,
}

impl RouteRequest<'_> {
    fn source_center(&self) -> Option<Point> {
        self.source.map(|r| r.center()).or(self.source_point)
    }

    fn target_center(&self) -> Option<Point> {
        self.target.map(|r| r.center()).or(self.target_point)
    }

    /// Point where the route leaves the source, heading toward `toward`.
    pub fn source_anchor(&self, toward: Point) -> Result<Point, RoutingError> {
        match (self.source, self.source_point) {
            (Some(rect), _) => Ok(perimeter_point(rect, toward)),
            (None, Some(point)) => Ok(point),
            (None, None) => Err(RoutingError::MissingEndpoint("source")),
        }
    }

    pub fn target_anchor(&self, toward: Point) -> Result<Point, RoutingError> {
        match (self.target, self.target_point) {
            (Some(rect), _) => Ok(perimeter_point(rect, toward)),
            (None, Some(point)) => Ok(point),
            (None, None) => Err(RoutingError::MissingEndpoint("target")),
        }
    }

    fn centers(&self) -> Result<(Point, Point), RoutingError> {
        let source = self
            .source_center()
            .ok_or(RoutingError::MissingEndpoint("source"))?;
        let target = self
            .target_center()
            .ok_or(RoutingError::MissingEndpoint("target"))?;
        Ok((source, target))
    }

    fn number(&self, key: &str) -> Option<f64> {
        self.style.get(key).and_then(|v| v.as_f64())
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.style.get(key).and_then(|v| v.as_str())
    }
}

/// Where the ray from the center of `rect` toward `toward` leaves the
/// rectangle. Returns the center when `toward` is (nearly) the center.
pub fn perimeter_point(rect: Rect, toward: Point) -> Point {
    let center = rect.center();
    let dx = toward.x - center.x;
    let dy = toward.y - center.y;

    if dx * dx + dy * dy < 1e-6 {
        return center;
    }

    // Ray casting from center to target, intersecting rect bounds.
    let mut best: Option<(f64, Point)> = None;
    let mut consider = |t: f64, hit: Point| {
        if t > 0.0 && best.is_none_or(|(t_min, _)| t < t_min) {
            best = Some((t, hit));
        }
    };

    // Left and right sides
    if dx.abs() > 1e-9 {
        for side in [rect.x, rect.right()] {
            let t = (side - center.x) / dx;
            let y = center.y + t * dy;
            if y >= rect.y - 1e-9 && y <= rect.bottom() + 1e-9 {
                consider(t, Point::new(side, y));
            }
        }
    }

    // Top and bottom sides
    if dy.abs() > 1e-9 {
        for side in [rect.y, rect.bottom()] {
            let t = (side - center.y) / dy;
            let x = center.x + t * dx;
            if x >= rect.x - 1e-9 && x <= rect.right() + 1e-9 {
                consider(t, Point::new(x, side));
            }
        }
    }

    best.map(|(_, hit)| hit).unwrap_or(center)
}

pub trait EdgeStyle {
    fn route(&self, request: &RouteRequest<'_>) -> Result<Vec<Point>, RoutingError>;
}

/// Source anchor, waypoints, target anchor.
#[derive(Debug, Clone, Copy, Default)]
pub struct Straight;

impl EdgeStyle for Straight {
    fn route(&self, request: &RouteRequest<'_>) -> Result<Vec<Point>, RoutingError> {
        let (source_center, target_center) = request.centers()?;
        let first = request.waypoints.first().copied().unwrap_or(target_center);
        let last = request.waypoints.last().copied().unwrap_or(source_center);

        let mut route = Vec::with_capacity(request.waypoints.len() + 2);
        route.push(request.source_anchor(first)?);
        route.extend_from_slice(request.waypoints);
        route.push(request.target_anchor(last)?);
        Ok(route)
    }
}

/// Orthogonal route with one bend segment. `elbow=vertical` bends on a
/// horizontal line instead of a vertical one. The first waypoint, if any,
/// positions the bend.
#[derive(Debug, Clone, Copy, Default)]
pub struct Elbow;

impl EdgeStyle for Elbow {
    fn route(&self, request: &RouteRequest<'_>) -> Result<Vec<Point>, RoutingError> {
        let (sc, tc) = request.centers()?;
        let hint = request.waypoints.first().copied();

        if request.text("elbow") == Some("vertical") {
            let mid_y = hint.map(|p| p.y).unwrap_or((sc.y + tc.y) / 2.0);
            let bend_a = Point::new(sc.x, mid_y);
            let bend_b = Point::new(tc.x, mid_y);
            Ok(vec![
                request.source_anchor(bend_a)?,
                bend_a,
                bend_b,
                request.target_anchor(bend_b)?,
            ])
        } else {
            let mid_x = hint.map(|p| p.x).unwrap_or((sc.x + tc.x) / 2.0);
            let bend_a = Point::new(mid_x, sc.y);
            let bend_b = Point::new(mid_x, tc.y);
            Ok(vec![
                request.source_anchor(bend_a)?,
                bend_a,
                bend_b,
                request.target_anchor(bend_b)?,
            ])
        }
    }
}

/// Leaves and enters terminals horizontally with fixed-length stubs, the
/// way entity-relation diagrams connect table rows.
#[derive(Debug, Clone, Copy, Default)]
pub struct EntityRelation;

impl EdgeStyle for EntityRelation {
    fn route(&self, request: &RouteRequest<'_>) -> Result<Vec<Point>, RoutingError> {
        let (sc, tc) = request.centers()?;
        let segment = request
            .number("segment")
            .unwrap_or(request.config.entity_segment)
            * request.scale;

        let rightward = tc.x >= sc.x;
        let dir = if rightward { 1.0 } else { -1.0 };

        let start = match request.source {
            Some(rect) => Point::new(if rightward { rect.right() } else { rect.x }, sc.y),
            None => request.source_anchor(tc)?,
        };
        let end = match request.target {
            Some(rect) => Point::new(if rightward { rect.x } else { rect.right() }, tc.y),
            None => request.target_anchor(sc)?,
        };

        Ok(vec![
            start,
            start.translate(dir * segment, 0.0),
            end.translate(-dir * segment, 0.0),
            end,
        ])
    }
}

/// Box-shaped route leaving and re-entering the right side of a terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct Loop;

impl EdgeStyle for Loop {
    fn route(&self, request: &RouteRequest<'_>) -> Result<Vec<Point>, RoutingError> {
        let rect = request
            .source
            .or(request.target)
            .ok_or_else(|| RoutingError::Failed("loop needs a terminal".to_string()))?;
        let size = request.config.loop_size * request.scale;
        let center = rect.center();
        let outer_x = request
            .waypoints
            .first()
            .map(|p| p.x)
            .unwrap_or(rect.right() + size);
        let top = center.y - size / 2.0;
        let bottom = center.y + size / 2.0;

        Ok(vec![
            Point::new(rect.right(), top),
            Point::new(outer_x, top),
            Point::new(outer_x, bottom),
            Point::new(rect.right(), bottom),
        ])
    }
}

/// Strategies by the name used in the `edgeStyle` style key.
pub struct EdgeStyleRegistry {
    styles: HashMap<String, Box<dyn EdgeStyle>>,
}

impl fmt::Debug for EdgeStyleRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.styles.keys().collect();
        names.sort();
        f.debug_struct("EdgeStyleRegistry")
            .field("styles", &names)
            .finish()
    }
}

impl Default for EdgeStyleRegistry {
    fn default() -> Self {
        let mut registry = Self {
            styles: HashMap::new(),
        };
        registry.register(STRAIGHT, Straight);
        registry.register(cellgraph_core::NONE, Straight);
        registry.register(ELBOW, Elbow);
        registry.register(ENTITY_RELATION, EntityRelation);
        registry.register(LOOP, Loop);
        registry
    }
}

impl EdgeStyleRegistry {
    pub fn register(&mut self, name: impl Into<String>, style: impl EdgeStyle + 'static) {
        self.styles.insert(name.into(), Box::new(style));
    }

    pub fn get(&self, name: &str) -> Option<&dyn EdgeStyle> {
        self.styles.get(name).map(|s| s.as_ref())
    }

    pub fn route(&self, name: &str, request: &RouteRequest<'_>) -> Result<Vec<Point>, RoutingError> {
        self.get(name)
            .ok_or_else(|| RoutingError::UnknownStyle(name.to_string()))?
            .route(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellgraph_core::StyleValue;
    use proptest::prelude::*;

    fn request<'a>(
        source: Rect,
        target: Rect,
        style: &'a StyleMap,
        config: &'a ViewConfig,
    ) -> RouteRequest<'a> {
        RouteRequest {
            source: Some(source),
            target: Some(target),
            source_point: None,
            target_point: None,
            waypoints: &[],
            style,
            scale: 1.0,
            config,
        }
    }

    #[test]
    fn test_perimeter_point_hits_facing_side() {
        let rect = Rect::new(0.0, 0.0, 100.0, 50.0);
        assert_eq!(perimeter_point(rect, Point::new(500.0, 25.0)), Point::new(100.0, 25.0));
        assert_eq!(perimeter_point(rect, Point::new(50.0, -100.0)), Point::new(50.0, 0.0));
        assert_eq!(perimeter_point(rect, rect.center()), rect.center());
    }

    #[test]
    fn test_straight_route() {
        let style = StyleMap::new();
        let config = ViewConfig::default();
        let req = request(
            Rect::new(0.0, 0.0, 20.0, 20.0),
            Rect::new(100.0, 0.0, 20.0, 20.0),
            &style,
            &config,
        );
        let route = Straight.route(&req).unwrap();
        assert_eq!(route, vec![Point::new(20.0, 10.0), Point::new(100.0, 10.0)]);
    }

    #[test]
    fn test_straight_uses_terminal_points() {
        let style = StyleMap::new();
        let config = ViewConfig::default();
        let req = RouteRequest {
            source: None,
            target: None,
            source_point: Some(Point::new(1.0, 2.0)),
            target_point: Some(Point::new(3.0, 4.0)),
            waypoints: &[],
            style: &style,
            scale: 1.0,
            config: &config,
        };
        assert_eq!(
            Straight.route(&req).unwrap(),
            vec![Point::new(1.0, 2.0), Point::new(3.0, 4.0)]
        );
        let missing = RouteRequest {
            target_point: None,
            ..req
        };
        assert_eq!(
            Straight.route(&missing),
            Err(RoutingError::MissingEndpoint("target"))
        );
    }

    #[test]
    fn test_elbow_is_orthogonal() {
        let style = StyleMap::new();
        let config = ViewConfig::default();
        let req = request(
            Rect::new(0.0, 0.0, 20.0, 20.0),
            Rect::new(100.0, 100.0, 20.0, 20.0),
            &style,
            &config,
        );
        let route = Elbow.route(&req).unwrap();
        assert_eq!(route.len(), 4);
        for pair in route.windows(2) {
            assert!(pair[0].x == pair[1].x || pair[0].y == pair[1].y);
        }
    }

    #[test]
    fn test_entity_relation_segment_from_style() {
        let mut style = StyleMap::new();
        style.insert("segment".into(), StyleValue::Number(10.0));
        let config = ViewConfig::default();
        let req = request(
            Rect::new(0.0, 0.0, 20.0, 20.0),
            Rect::new(100.0, 40.0, 20.0, 20.0),
            &style,
            &config,
        );
        let route = EntityRelation.route(&req).unwrap();
        assert_eq!(
            route,
            vec![
                Point::new(20.0, 10.0),
                Point::new(30.0, 10.0),
                Point::new(90.0, 50.0),
                Point::new(100.0, 50.0),
            ]
        );
    }

    #[test]
    fn test_loop_box_uses_configured_size() {
        let style = StyleMap::new();
        let config = ViewConfig::default();
        let rect = Rect::new(0.0, 0.0, 40.0, 40.0);
        let route = Loop.route(&request(rect, rect, &style, &config)).unwrap();
        assert_eq!(route[1], Point::new(60.0, 10.0));
        assert_eq!(route[3], Point::new(40.0, 30.0));
    }

    #[test]
    fn test_registry_unknown_style() {
        let registry = EdgeStyleRegistry::default();
        let style = StyleMap::new();
        let config = ViewConfig::default();
        let rect = Rect::new(0.0, 0.0, 1.0, 1.0);
        assert!(matches!(
            registry.route("zigzag", &request(rect, rect, &style, &config)),
            Err(RoutingError::UnknownStyle(_))
        ));
        assert!(registry.get("none").is_some());
    }

    proptest! {
        #[test]
        fn prop_perimeter_point_on_boundary(
            x in -500.0f64..500.0,
            y in -500.0f64..500.0,
            w in 1.0f64..200.0,
            h in 1.0f64..200.0,
            tx in -1000.0f64..1000.0,
            ty in -1000.0f64..1000.0,
        ) {
            let rect = Rect::new(x, y, w, h);
            let p = perimeter_point(rect, Point::new(tx, ty));
            prop_assert!(rect.grow(1e-6).contains(p));
            if p != rect.center() {
                let on_vertical = (p.x - rect.x).abs() < 1e-6 || (p.x - rect.right()).abs() < 1e-6;
                let on_horizontal = (p.y - rect.y).abs() < 1e-6 || (p.y - rect.bottom()).abs() < 1e-6;
                prop_assert!(on_vertical || on_horizontal);
            }
        }
    }
}
