use cellgraph_core::{CellIndex, CellStyle, Geometry, Point, Rect, StyleValue};
use cellgraph_events::EventName;
use cellgraph_model::{GraphModel, NewCell};
use cellgraph_view::{
    EdgeStyle, GraphView, RouteRequest, RoutingError, ViewEvent, edge_style::STRAIGHT,
};
use std::cell::RefCell;
use std::rc::Rc;

struct Fixture {
    model: GraphModel,
    view: GraphView,
    layer: CellIndex,
}

impl Fixture {
    fn new() -> Self {
        let mut model = GraphModel::default();
        let root = model.root();
        let layer = model.create_cell(NewCell::group());
        model.add(layer, root, None).unwrap();
        let mut view = GraphView::default();
        view.attach(&mut model);
        Self { model, view, layer }
    }

    fn vertex(&mut self, parent: CellIndex, label: &str, x: f64, y: f64, w: f64, h: f64) -> CellIndex {
        let cell = self
            .model
            .create_cell(NewCell::vertex(label, Geometry::new(x, y, w, h)));
        self.model.add(cell, parent, None).unwrap()
    }

    fn edge(&mut self, source: CellIndex, target: CellIndex, style: CellStyle) -> CellIndex {
        let edge = self.model.create_cell(NewCell::edge("").with_style(style));
        let layer = self.layer;
        self.model
            .add_edge(edge, layer, None, Some(source), Some(target))
            .unwrap()
    }

    fn bounds(&self, cell: CellIndex) -> Rect {
        self.view.state(cell).unwrap().bounds
    }

    fn revision(&self, cell: CellIndex) -> u64 {
        self.view.state(cell).unwrap().revision
    }

    fn move_by(&mut self, cell: CellIndex, dx: f64, dy: f64) {
        let mut geo = self.model.geometry(cell).cloned().unwrap();
        geo.translate(dx, dy);
        self.model.set_geometry(cell, Some(geo)).unwrap();
    }
}

#[test]
fn test_states_are_computed_lazily() {
    let mut fx = Fixture::new();
    let layer = fx.layer;
    let a = fx.vertex(layer, "a", 0.0, 0.0, 20.0, 20.0);
    let b = fx.vertex(layer, "b", 100.0, 0.0, 20.0, 20.0);
    let e = fx.edge(a, b, CellStyle::new());
    assert_eq!(fx.view.state_count(), 0);

    let report = fx.view.validate(&fx.model);
    assert!(report.recomputed.contains(&a) && report.recomputed.contains(&e));
    assert!(report.diagnostics.is_empty());
    assert_eq!(fx.bounds(a), Rect::new(0.0, 0.0, 20.0, 20.0));
    assert_eq!(fx.view.state(a).unwrap().text, "a");

    let edge = fx.view.state(e).unwrap();
    assert_eq!(
        edge.absolute_points,
        vec![Point::new(20.0, 10.0), Point::new(100.0, 10.0)]
    );
    assert_eq!(edge.length, 80.0);
    assert_eq!(edge.absolute_offset, Point::new(60.0, 10.0));
    assert_eq!((edge.visible_source, edge.visible_target), (Some(a), Some(b)));
    assert!(!edge.routing_fallback);

    // Nothing changed, nothing recomputed.
    let report = fx.view.validate(&fx.model);
    assert!(report.recomputed.is_empty());
    assert!(report.removed.is_empty());

    // Changes only invalidate until the next validate.
    fx.move_by(a, 0.0, 40.0);
    assert_eq!(fx.bounds(a), Rect::new(0.0, 0.0, 20.0, 20.0));
    fx.view.validate(&fx.model);
    assert_eq!(fx.bounds(a), Rect::new(0.0, 40.0, 20.0, 20.0));
}

#[test]
fn test_style_change_leaves_siblings_alone() {
    let mut fx = Fixture::new();
    let layer = fx.layer;
    let a = fx.vertex(layer, "a", 0.0, 0.0, 20.0, 20.0);
    let b = fx.vertex(layer, "b", 100.0, 0.0, 20.0, 20.0);
    let c = fx.vertex(layer, "c", 200.0, 0.0, 20.0, 20.0);
    let e = fx.edge(a, b, CellStyle::new());
    fx.view.validate(&fx.model);

    fx.model
        .set_style(a, CellStyle::new().with("fillColor", "red"))
        .unwrap();
    let mut report = fx.view.validate(&fx.model);
    report.recomputed.sort();
    assert_eq!(report.recomputed, vec![a, e]);
    assert_eq!((fx.revision(a), fx.revision(b), fx.revision(c)), (2, 1, 1));
    assert_eq!(
        fx.view.state(a).unwrap().style["fillColor"],
        StyleValue::from("red")
    );
}

#[test]
fn test_parent_geometry_moves_descendants() {
    let mut fx = Fixture::new();
    let layer = fx.layer;
    let parent = fx.vertex(layer, "p", 100.0, 100.0, 200.0, 200.0);
    let child = fx.vertex(parent, "c", 10.0, 10.0, 20.0, 20.0);
    let port = fx.model.create_cell(NewCell::vertex(
        "port",
        Geometry {
            width: 10.0,
            height: 10.0,
            ..Geometry::relative(0.5, 0.5)
        },
    ));
    fx.model.add(port, parent, None).unwrap();
    fx.view.validate(&fx.model);
    assert_eq!(fx.bounds(child), Rect::new(110.0, 110.0, 20.0, 20.0));
    assert_eq!(fx.bounds(port), Rect::new(200.0, 200.0, 10.0, 10.0));

    fx.move_by(parent, 50.0, 0.0);
    let report = fx.view.validate(&fx.model);
    assert!(report.recomputed.contains(&child));
    assert_eq!(fx.bounds(child), Rect::new(160.0, 110.0, 20.0, 20.0));
    assert_eq!(fx.bounds(port), Rect::new(250.0, 200.0, 10.0, 10.0));
}

#[test]
fn test_scale_and_translate_apply_to_every_state() {
    let mut fx = Fixture::new();
    let layer = fx.layer;
    let a = fx.vertex(layer, "a", 10.0, 20.0, 30.0, 40.0);
    fx.view.validate(&fx.model);

    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&events);
    fx.view.add_listener(EventName::Scale, move |_, event| {
        sink.borrow_mut().push(event.clone());
    });

    fx.view.set_scale(2.0).unwrap();
    fx.view.set_translate(Point::new(5.0, 5.0));
    fx.view.validate(&fx.model);
    assert_eq!(fx.bounds(a), Rect::new(30.0, 50.0, 60.0, 80.0));
    assert_eq!(fx.view.state(a).unwrap().origin, Point::new(10.0, 20.0));
    assert_eq!(
        *events.borrow(),
        vec![ViewEvent::Scale {
            scale: 2.0,
            previous: 1.0
        }]
    );
}

#[test]
fn test_collapse_substitutes_visible_ancestor() {
    let mut fx = Fixture::new();
    let layer = fx.layer;
    let grandparent = fx.vertex(layer, "g", 0.0, 0.0, 300.0, 300.0);
    let parent = fx.vertex(grandparent, "p", 10.0, 10.0, 200.0, 200.0);
    let child = fx.vertex(parent, "c", 10.0, 10.0, 50.0, 50.0);
    let other = fx.vertex(layer, "x", 400.0, 0.0, 50.0, 50.0);
    let edge = fx.edge(child, other, CellStyle::new());

    let source_of = |fx: &mut Fixture| {
        fx.view.validate(&fx.model);
        fx.view.state(edge).and_then(|s| s.visible_source)
    };

    assert_eq!(source_of(&mut fx), Some(child));

    fx.model.set_collapsed(parent, true).unwrap();
    assert_eq!(source_of(&mut fx), Some(parent));
    assert!(fx.view.state(child).is_none());

    fx.model.set_collapsed(grandparent, true).unwrap();
    assert_eq!(source_of(&mut fx), Some(grandparent));
    assert!(fx.view.state(parent).is_none());

    fx.model.set_collapsed(parent, false).unwrap();
    assert_eq!(source_of(&mut fx), Some(grandparent));

    fx.model.set_collapsed(grandparent, false).unwrap();
    assert_eq!(source_of(&mut fx), Some(child));
    assert_eq!(fx.bounds(child), Rect::new(20.0, 20.0, 50.0, 50.0));
}

#[test]
fn test_edge_folded_into_one_ancestor_is_a_point() {
    let mut fx = Fixture::new();
    let layer = fx.layer;
    let group = fx.vertex(layer, "g", 0.0, 0.0, 100.0, 100.0);
    let a = fx.vertex(group, "a", 0.0, 0.0, 10.0, 10.0);
    let b = fx.vertex(group, "b", 50.0, 50.0, 10.0, 10.0);
    let edge = fx.edge(a, b, CellStyle::new());

    fx.model.set_collapsed(group, true).unwrap();
    let report = fx.view.validate(&fx.model);
    assert!(report.diagnostics.is_empty());

    let state = fx.view.state(edge).unwrap();
    assert_eq!(state.visible_source, Some(group));
    assert!(state.is_loop());
    assert!(state.routing_fallback);
    assert_eq!(
        state.absolute_points,
        vec![Point::new(50.0, 50.0), Point::new(50.0, 50.0)]
    );
}

#[test]
fn test_grandchildren_edge_resolves_to_collapsed_grandparent() {
    let mut fx = Fixture::new();
    let layer = fx.layer;
    let grandparent = fx.vertex(layer, "g", 0.0, 0.0, 200.0, 200.0);
    let parent = fx.vertex(grandparent, "p", 10.0, 10.0, 150.0, 150.0);
    let left = fx.vertex(parent, "l", 0.0, 0.0, 20.0, 20.0);
    let right = fx.vertex(parent, "r", 100.0, 0.0, 20.0, 20.0);
    let edge = fx.edge(left, right, CellStyle::new());

    let ends = |fx: &mut Fixture| {
        fx.view.validate(&fx.model);
        let state = fx.view.state(edge).unwrap();
        (state.visible_source, state.visible_target)
    };
    assert_eq!(ends(&mut fx), (Some(left), Some(right)));

    fx.model.set_collapsed(grandparent, true).unwrap();
    assert_eq!(ends(&mut fx), (Some(grandparent), Some(grandparent)));
    assert_eq!(
        fx.view.state(edge).unwrap().absolute_points,
        vec![Point::new(100.0, 100.0), Point::new(100.0, 100.0)]
    );

    fx.model.set_collapsed(grandparent, false).unwrap();
    assert_eq!(ends(&mut fx), (Some(left), Some(right)));
    assert!(!fx.view.state(edge).unwrap().routing_fallback);
}

#[test]
fn test_genuine_self_loop_uses_loop_style() {
    let mut fx = Fixture::new();
    let layer = fx.layer;
    let a = fx.vertex(layer, "a", 0.0, 0.0, 40.0, 40.0);
    let edge = fx.edge(a, a, CellStyle::new());
    fx.view.validate(&fx.model);

    let state = fx.view.state(edge).unwrap();
    assert!(!state.routing_fallback);
    assert_eq!(state.absolute_points.len(), 4);
    assert_eq!(state.absolute_points[0], Point::new(40.0, 10.0));
    assert_eq!(state.absolute_points[1], Point::new(60.0, 10.0));
}

struct Broken;

impl EdgeStyle for Broken {
    fn route(&self, _request: &RouteRequest<'_>) -> Result<Vec<Point>, RoutingError> {
        Err(RoutingError::Failed("no room".to_string()))
    }
}

#[test]
fn test_failing_edge_style_falls_back_with_diagnostic() {
    let mut fx = Fixture::new();
    let layer = fx.layer;
    let a = fx.vertex(layer, "a", 0.0, 0.0, 20.0, 20.0);
    let b = fx.vertex(layer, "b", 100.0, 0.0, 20.0, 20.0);
    fx.view.edge_styles_mut().register("broken", Broken);
    let broken = fx.edge(a, b, CellStyle::new().with("edgeStyle", "broken"));
    let unknown = fx.edge(a, b, CellStyle::new().with("edgeStyle", "zigzag"));

    let diagnostics = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&diagnostics);
    fx.view.add_listener(EventName::Diagnostic, move |_, event| {
        if let ViewEvent::Diagnostic(d) = event {
            sink.borrow_mut().push(d.cell);
        }
    });

    let report = fx.view.validate(&fx.model);
    assert_eq!(report.diagnostics.len(), 2);
    assert!(report.diagnostics[0].message.contains("no room"));
    assert!(report.diagnostics[1].message.contains("zigzag"));
    assert_eq!(*diagnostics.borrow(), vec![broken, unknown]);

    for edge in [broken, unknown] {
        let state = fx.view.state(edge).unwrap();
        assert!(state.routing_fallback);
        assert_eq!(
            state.absolute_points,
            vec![Point::new(20.0, 10.0), Point::new(100.0, 10.0)]
        );
    }

    fx.model
        .set_style(unknown, CellStyle::new().with("edgeStyle", STRAIGHT))
        .unwrap();
    let report = fx.view.validate(&fx.model);
    assert_eq!(report.recomputed, vec![unknown]);
    assert!(report.diagnostics.is_empty());
    assert!(!fx.view.state(unknown).unwrap().routing_fallback);
    assert!(fx.view.state(broken).unwrap().routing_fallback);
}

#[test]
fn test_edge_labels_follow_the_route() {
    let mut fx = Fixture::new();
    let layer = fx.layer;
    let a = fx.vertex(layer, "a", 0.0, 0.0, 20.0, 20.0);
    let b = fx.vertex(layer, "b", 100.0, 0.0, 20.0, 20.0);
    let edge = fx.edge(a, b, CellStyle::new());
    let label = fx.model.create_cell(NewCell::vertex(
        "label",
        Geometry {
            width: 10.0,
            height: 10.0,
            ..Geometry::relative(0.5, 0.0)
        }
        .with_offset(Point::new(0.0, -10.0)),
    ));
    fx.model.add(label, edge, None).unwrap();

    fx.view.validate(&fx.model);
    assert_eq!(fx.bounds(label), Rect::new(55.0, -5.0, 10.0, 10.0));

    // Moving a terminal moves the label with the edge.
    fx.move_by(b, 100.0, 0.0);
    let report = fx.view.validate(&fx.model);
    assert!(report.recomputed.contains(&label));
    assert_eq!(fx.bounds(label), Rect::new(105.0, -5.0, 10.0, 10.0));
}

#[test]
fn test_dangling_edge_uses_terminal_points() {
    let mut fx = Fixture::new();
    let layer = fx.layer;
    let a = fx.vertex(layer, "a", 0.0, 0.0, 20.0, 20.0);
    let mut geometry = Geometry::relative(0.0, 0.0);
    geometry.target_point = Some(Point::new(80.0, 10.0));
    let dangling = fx
        .model
        .create_cell(NewCell::edge("").with_geometry(geometry));
    fx.model.add_edge(dangling, layer, None, Some(a), None).unwrap();
    let bare = fx.model.create_cell(NewCell::edge(""));
    fx.model.add_edge(bare, layer, None, Some(a), None).unwrap();

    fx.view.validate(&fx.model);
    assert_eq!(
        fx.view.state(dangling).unwrap().absolute_points,
        vec![Point::new(20.0, 10.0), Point::new(80.0, 10.0)]
    );
    assert!(fx.view.state(bare).is_none());
}

#[test]
fn test_removed_and_hidden_cells_lose_their_state() {
    let mut fx = Fixture::new();
    let layer = fx.layer;
    let a = fx.vertex(layer, "a", 0.0, 0.0, 20.0, 20.0);
    let b = fx.vertex(layer, "b", 100.0, 0.0, 20.0, 20.0);
    fx.view.validate(&fx.model);

    fx.model.remove(a).unwrap();
    fx.model.set_visible(b, false).unwrap();
    let mut report = fx.view.validate(&fx.model);
    report.removed.sort();
    assert_eq!(report.removed, vec![a, b]);
    assert!(fx.view.state(a).is_none() && fx.view.state(b).is_none());
}

#[test]
fn test_current_root_limits_displayed_cells() {
    let mut fx = Fixture::new();
    let layer = fx.layer;
    let parent = fx.vertex(layer, "p", 100.0, 100.0, 200.0, 200.0);
    let child = fx.vertex(parent, "c", 10.0, 10.0, 20.0, 20.0);
    let outside = fx.vertex(layer, "o", 0.0, 0.0, 20.0, 20.0);

    fx.view.set_current_root(Some(parent));
    fx.view.validate(&fx.model);
    assert_eq!(fx.bounds(child), Rect::new(10.0, 10.0, 20.0, 20.0));
    assert!(fx.view.state(outside).is_none());

    fx.view.set_current_root(None);
    fx.view.validate(&fx.model);
    assert_eq!(fx.bounds(child), Rect::new(110.0, 110.0, 20.0, 20.0));
    assert!(fx.view.state(outside).is_some());
}

#[test]
fn test_detached_view_ignores_changes() {
    let mut fx = Fixture::new();
    let layer = fx.layer;
    let a = fx.vertex(layer, "a", 0.0, 0.0, 20.0, 20.0);
    fx.view.validate(&fx.model);

    let mut view = std::mem::take(&mut fx.view);
    view.detach(&mut fx.model);
    fx.move_by(a, 10.0, 0.0);
    view.validate(&fx.model);
    assert_eq!(view.state(a).unwrap().bounds, Rect::new(0.0, 0.0, 20.0, 20.0));

    view.invalidate(&fx.model, a);
    view.validate(&fx.model);
    assert_eq!(view.state(a).unwrap().bounds, Rect::new(10.0, 0.0, 20.0, 20.0));
}

#[test]
fn test_vertices_under_root_are_terminals_but_layers_are_not() {
    let mut model = GraphModel::default();
    let root = model.root();
    let mut view = GraphView::default();
    view.attach(&mut model);

    let a = model.create_cell(NewCell::vertex("a", Geometry::new(0.0, 0.0, 20.0, 20.0)));
    let b = model.create_cell(NewCell::vertex("b", Geometry::new(100.0, 0.0, 20.0, 20.0)));
    model.add(a, root, None).unwrap();
    model.add(b, root, None).unwrap();
    let edge = model.create_cell(NewCell::edge(""));
    model.add_edge(edge, root, None, Some(a), Some(b)).unwrap();

    view.validate(&model);
    let state = view.state(edge).unwrap();
    assert_eq!((state.visible_source, state.visible_target), (Some(a), Some(b)));
    assert_eq!(
        state.absolute_points,
        vec![Point::new(20.0, 10.0), Point::new(100.0, 10.0)]
    );

    let layer = model.create_cell(NewCell::group());
    model.add(layer, root, None).unwrap();
    model.set_terminal(edge, Some(layer), false).unwrap();
    assert_eq!(view.visible_terminal(&model, edge, false), None);
    view.validate(&model);
    assert!(view.state(edge).is_none());
}
