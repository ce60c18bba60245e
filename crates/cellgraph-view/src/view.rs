use crate::VIEW_TARGET;
use crate::edge_style::{EdgeStyle, EdgeStyleRegistry, RouteRequest, STRAIGHT, Straight};
use crate::state::CellState;
use crate::stylesheet::Stylesheet;
use cellgraph_core::{
    CellIndex, CellKind, Geometry, GraphError, Point, Rect, StyleValue, ViewConfig,
    value_to_label,
};
use cellgraph_events::{Event, EventEmitter, EventName, EventSource, ListenerId};
use cellgraph_model::{GraphModel, ModelEvent, Transaction, UndoableEdit};
use crossbeam_channel::Receiver;
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;
use tracing::{debug, warn};

/// A derived-state problem reported instead of failing validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub cell: CellIndex,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewEvent {
    Scale {
        scale: f64,
        previous: f64,
    },
    Translate {
        translate: Point,
        previous: Point,
    },
    CurrentRoot {
        root: Option<CellIndex>,
        previous: Option<CellIndex>,
    },
    Validated {
        recomputed: usize,
        removed: usize,
    },
    Diagnostic(Diagnostic),
}

impl Event for ViewEvent {
    fn name(&self) -> EventName {
        match self {
            Self::Scale { .. } => EventName::Scale,
            Self::Translate { .. } => EventName::Translate,
            Self::CurrentRoot { .. } => EventName::CurrentRoot,
            Self::Validated { .. } => EventName::Validated,
            Self::Diagnostic(_) => EventName::Diagnostic,
        }
    }
}

/// What one `validate` call did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// Cells whose state was recomputed, in recomputation order.
    pub recomputed: Vec<CellIndex>,
    /// Cells whose state was dropped because they are no longer displayed.
    pub removed: Vec<CellIndex>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Invalidations collected from model notifications, applied by `sync`.
#[derive(Debug, Default)]
struct PendingInvalidation {
    cells: HashSet<CellIndex>,
    all: bool,
}

#[derive(Default)]
struct Pass {
    visited: HashSet<CellIndex>,
    deferred: VecDeque<CellIndex>,
    reachable_edges: HashSet<CellIndex>,
    edges_done: HashSet<CellIndex>,
    in_progress: HashSet<CellIndex>,
    report: ValidationReport,
}

/// Cells whose states a transaction makes stale: the changed cells, their
/// subtrees (except for value changes), and every edge connected to a stale
/// cell together with the edge's own subtree.
pub fn collect_dirty(model: &GraphModel, transaction: &Transaction) -> HashSet<CellIndex> {
    let mut seeds = Vec::new();
    for edit in transaction.iter() {
        match edit {
            UndoableEdit::Child(c) => seeds.push((c.child, true)),
            UndoableEdit::Terminal(c) => seeds.push((c.edge, true)),
            UndoableEdit::Value(c) => seeds.push((c.cell, false)),
            UndoableEdit::Style(c) => seeds.push((c.cell, true)),
            UndoableEdit::Geometry(c) => seeds.push((c.cell, true)),
            UndoableEdit::Collapsed(c) => seeds.push((c.cell, true)),
            UndoableEdit::Visible(c) => seeds.push((c.cell, true)),
            UndoableEdit::Custom(c) => {
                seeds.extend(c.affected_cells().into_iter().map(|cell| (cell, true)))
            }
        }
    }
    expand_dirty(model, seeds)
}

fn expand_dirty(
    model: &GraphModel,
    seeds: impl IntoIterator<Item = (CellIndex, bool)>,
) -> HashSet<CellIndex> {
    let mut dirty = HashSet::new();
    let mut expanded = HashSet::new();
    let mut queue = Vec::new();

    let mut enqueue_subtree = |root: CellIndex, dirty: &mut HashSet<CellIndex>, queue: &mut Vec<CellIndex>| {
        for cell in model.descendants(Some(root)) {
            dirty.insert(cell);
            if expanded.insert(cell) {
                queue.push(cell);
            }
        }
    };

    for (cell, recurse) in seeds {
        if recurse {
            enqueue_subtree(cell, &mut dirty, &mut queue);
        } else {
            dirty.insert(cell);
        }
    }
    while let Some(cell) = queue.pop() {
        for &edge in model.edges(cell) {
            enqueue_subtree(edge, &mut dirty, &mut queue);
        }
    }
    dirty
}

/// Cached, lazily validated visual state of the cells of one model.
///
/// Model changes only mark states invalid (through the listener installed by
/// [`GraphView::attach`]); nothing is recomputed until [`GraphView::validate`]
/// is called.
#[derive(Debug)]
pub struct GraphView {
    states: HashMap<CellIndex, CellState>,
    pending: Rc<RefCell<PendingInvalidation>>,
    stylesheet: Stylesheet,
    edge_styles: EdgeStyleRegistry,
    config: ViewConfig,
    scale: f64,
    translate: Point,
    current_root: Option<CellIndex>,
    events: EventSource<GraphView, ViewEvent>,
    listener: Option<ListenerId>,
}

impl Default for GraphView {
    fn default() -> Self {
        Self::new(&ViewConfig::default())
    }
}

impl EventEmitter for GraphView {
    type Event = ViewEvent;

    fn event_source(&self) -> &EventSource<Self, ViewEvent> {
        &self.events
    }
}

impl GraphView {
    pub fn new(config: &ViewConfig) -> Self {
        Self {
            states: HashMap::new(),
            pending: Rc::new(RefCell::new(PendingInvalidation::default())),
            stylesheet: Stylesheet::default(),
            edge_styles: EdgeStyleRegistry::default(),
            config: config.clone(),
            scale: config.scale,
            translate: config.translate,
            current_root: None,
            events: EventSource::new(),
            listener: None,
        }
    }

    /// Subscribes to `model`'s change notifications.
    pub fn attach(&mut self, model: &mut GraphModel) {
        self.detach(model);
        let pending = Rc::clone(&self.pending);
        let id = model.add_listener(EventName::Change, move |model, event| {
            if let ModelEvent::Change { transaction, .. } = event {
                let dirty = collect_dirty(model, transaction);
                pending.borrow_mut().cells.extend(dirty);
            }
        });
        self.listener = Some(id);
    }

    pub fn detach(&mut self, model: &mut GraphModel) {
        if let Some(id) = self.listener.take() {
            model.remove_listener(id);
        }
    }

    pub fn add_listener<F>(&mut self, name: EventName, listener: F) -> ListenerId
    where
        F: Fn(&mut GraphView, &ViewEvent) + 'static,
    {
        self.events.add_listener(name, listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.events.remove_listener(id)
    }

    /// Channel fed with every view event matching `name` (all for `None`).
    pub fn subscribe(&mut self, name: Option<EventName>) -> (ListenerId, Receiver<ViewEvent>) {
        self.events.subscribe(name)
    }

    pub fn stylesheet(&self) -> &Stylesheet {
        &self.stylesheet
    }

    /// Changing the stylesheet invalidates every state.
    pub fn stylesheet_mut(&mut self) -> &mut Stylesheet {
        self.invalidate_all();
        &mut self.stylesheet
    }

    pub fn edge_styles_mut(&mut self) -> &mut EdgeStyleRegistry {
        self.invalidate_all();
        &mut self.edge_styles
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn translate(&self) -> Point {
        self.translate
    }

    pub fn current_root(&self) -> Option<CellIndex> {
        self.current_root
    }

    pub fn set_scale(&mut self, scale: f64) -> Result<(), GraphError> {
        if !scale.is_finite() || scale <= 0.0 {
            return Err(GraphError::invalid_state(format!("invalid scale {scale}")));
        }
        if scale != self.scale {
            let previous = std::mem::replace(&mut self.scale, scale);
            self.invalidate_all();
            self.fire_event(ViewEvent::Scale { scale, previous });
        }
        Ok(())
    }

    pub fn set_translate(&mut self, translate: Point) {
        if translate != self.translate {
            let previous = std::mem::replace(&mut self.translate, translate);
            self.invalidate_all();
            self.fire_event(ViewEvent::Translate {
                translate,
                previous,
            });
        }
    }

    pub fn scale_and_translate(&mut self, scale: f64, translate: Point) -> Result<(), GraphError> {
        self.set_scale(scale)?;
        self.set_translate(translate);
        Ok(())
    }

    /// Displays only the subtree below `root` (or the whole graph for `None`).
    pub fn set_current_root(&mut self, root: Option<CellIndex>) {
        if root != self.current_root {
            let previous = std::mem::replace(&mut self.current_root, root);
            self.invalidate_all();
            self.fire_event(ViewEvent::CurrentRoot { root, previous });
        }
    }

    pub fn state(&self, cell: CellIndex) -> Option<&CellState> {
        self.states.get(&cell)
    }

    /// Painter access, e.g. to store shape handles.
    pub fn state_mut(&mut self, cell: CellIndex) -> Option<&mut CellState> {
        self.states.get_mut(&cell)
    }

    pub fn states(&self) -> impl Iterator<Item = &CellState> {
        self.states.values()
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    /// Union of the bounds of the given cells' states.
    pub fn bounds(&self, cells: &[CellIndex]) -> Option<Rect> {
        cells
            .iter()
            .filter_map(|c| self.state(*c))
            .map(|s| s.bounds)
            .reduce(|a, b| a.union(&b))
    }

    /// Union of the bounds of every vertex and edge state.
    pub fn graph_bounds(&self) -> Option<Rect> {
        self.states
            .values()
            .filter(|s| !s.kind.is_group())
            .map(|s| s.bounds)
            .reduce(|a, b| a.union(&b))
    }

    /// Drops every state.
    pub fn clear(&mut self) {
        self.states.clear();
        let mut pending = self.pending.borrow_mut();
        pending.cells.clear();
        pending.all = false;
    }

    /// Marks `cell`, its subtree and the edges depending on them stale.
    pub fn invalidate(&mut self, model: &GraphModel, cell: CellIndex) {
        let dirty = expand_dirty(model, [(cell, true)]);
        self.pending.borrow_mut().cells.extend(dirty);
    }

    pub fn invalidate_all(&mut self) {
        self.pending.borrow_mut().all = true;
    }

    /// Applies queued invalidations to the cached states.
    pub fn sync(&mut self) {
        let pending = std::mem::take(&mut *self.pending.borrow_mut());
        if pending.all {
            self.states.values_mut().for_each(CellState::invalidate);
            return;
        }
        for cell in pending.cells {
            if let Some(state) = self.states.get_mut(&cell) {
                state.invalidate();
            }
        }
    }

    /// Nearest displayed stand-in for one terminal of `edge`: the terminal
    /// itself, or its outermost collapsed or first visible ancestor. `None`
    /// when that would be the root, a layer or the current root. Layers are
    /// groups directly under the root; vertices there are regular terminals.
    pub fn visible_terminal(
        &self,
        model: &GraphModel,
        edge: CellIndex,
        is_source: bool,
    ) -> Option<CellIndex> {
        let terminal = model.terminal(edge, is_source)?;
        if !model.contains(terminal) {
            return None;
        }
        let root = model.root();
        let stop = self.current_root.unwrap_or(root);

        let mut best = terminal;
        let mut current = Some(terminal);
        while let Some(cell) = current {
            if cell == stop || cell == root {
                break;
            }
            if !model.is_visible(best) || model.is_collapsed(cell) {
                best = cell;
            }
            current = model.parent(cell);
        }

        let is_layer =
            model.parent(best) == Some(root) && model.kind(best).is_some_and(CellKind::is_group);
        if best == root || is_layer || Some(best) == self.current_root {
            None
        } else {
            Some(best)
        }
    }

    /// Brings every displayed state up to date and drops states of cells that
    /// are no longer displayed.
    pub fn validate(&mut self, model: &GraphModel) -> ValidationReport {
        self.sync();
        let start = match self.current_root {
            Some(root) if model.contains(root) => root,
            _ => model.root(),
        };

        let mut pass = Pass::default();
        self.visit(model, start, start, Point::ORIGIN, None, &mut pass);
        while let Some(edge) = pass.deferred.pop_front() {
            self.validate_edge(model, start, edge, &mut pass);
        }

        let stale: Vec<CellIndex> = self
            .states
            .keys()
            .copied()
            .filter(|c| !pass.visited.contains(c))
            .collect();
        for cell in &stale {
            self.states.remove(cell);
        }
        pass.report.removed = stale;

        debug!(
            target: VIEW_TARGET,
            recomputed = pass.report.recomputed.len(),
            removed = pass.report.removed.len(),
            diagnostics = pass.report.diagnostics.len(),
            "view validated"
        );
        for diagnostic in &pass.report.diagnostics {
            self.fire_event(ViewEvent::Diagnostic(diagnostic.clone()));
        }
        self.fire_event(ViewEvent::Validated {
            recomputed: pass.report.recomputed.len(),
            removed: pass.report.removed.len(),
        });
        pass.report
    }

    fn to_screen(&self, origin: Point, width: f64, height: f64) -> Rect {
        Rect::new(
            (origin.x + self.translate.x) * self.scale,
            (origin.y + self.translate.y) * self.scale,
            width * self.scale,
            height * self.scale,
        )
    }

    fn to_graph(&self, point: Point) -> Point {
        Point::new(
            point.x / self.scale - self.translate.x,
            point.y / self.scale - self.translate.y,
        )
    }

    fn visit(
        &mut self,
        model: &GraphModel,
        start: CellIndex,
        cell: CellIndex,
        parent_origin: Point,
        parent_size: Option<(f64, f64)>,
        pass: &mut Pass,
    ) {
        let Some(kind) = model.kind(cell) else {
            return;
        };
        if cell != start && !model.is_visible(cell) {
            return;
        }
        if kind.is_edge() {
            pass.reachable_edges.insert(cell);
            pass.deferred.push_back(cell);
            return;
        }

        if self.states.get(&cell).is_none_or(|s| s.invalid) {
            let geometry = model.geometry(cell);
            let (origin, size) = if cell == start {
                let size = geometry.map(|g| (g.width, g.height)).unwrap_or((0.0, 0.0));
                (Point::ORIGIN, size)
            } else {
                place(geometry, parent_origin, parent_size)
            };
            let bounds = self.to_screen(origin, size.0, size.1);
            self.store_state(model, cell, kind, origin, bounds, pass);
        }
        pass.visited.insert(cell);
        self.visit_children(model, start, cell, pass);
    }

    fn visit_children(&mut self, model: &GraphModel, start: CellIndex, cell: CellIndex, pass: &mut Pass) {
        if cell != start && model.is_collapsed(cell) {
            return;
        }
        let Some((origin, size)) = self.states.get(&cell).map(|s| (s.origin, s.unscaled_size)) else {
            return;
        };
        for &child in model.children(cell) {
            self.visit(model, start, child, origin, Some(size), pass);
        }
    }

    fn store_state(
        &mut self,
        model: &GraphModel,
        cell: CellIndex,
        kind: CellKind,
        origin: Point,
        bounds: Rect,
        pass: &mut Pass,
    ) {
        let style = model
            .style(cell)
            .map(|s| self.stylesheet.resolve(kind, s))
            .unwrap_or_default();
        let text = model.value(cell).map(value_to_label).unwrap_or_default();
        let scale = self.scale;

        let state = self
            .states
            .entry(cell)
            .or_insert_with(|| CellState::new(cell, kind));
        state.kind = kind;
        state.origin = origin;
        state.bounds = bounds;
        state.unscaled_size = (bounds.width / scale, bounds.height / scale);
        state.style = style;
        state.text = text;
        state.absolute_offset = bounds.center();
        state.invalid = false;
        state.revision += 1;
        pass.report.recomputed.push(cell);
    }

    fn validate_edge(&mut self, model: &GraphModel, start: CellIndex, edge: CellIndex, pass: &mut Pass) {
        if pass.edges_done.contains(&edge) || !pass.in_progress.insert(edge) {
            return;
        }
        let routed = if self.states.get(&edge).is_none_or(|s| s.invalid) {
            self.route_edge(model, start, edge, pass)
        } else {
            true
        };
        pass.in_progress.remove(&edge);
        pass.edges_done.insert(edge);
        if !routed {
            return;
        }
        pass.visited.insert(edge);

        for &label in model.children(edge) {
            self.visit_label(model, start, edge, label, pass);
        }
    }

    /// Recomputes an edge state. Returns `false` when a side has neither a
    /// displayed terminal nor a terminal point.
    fn route_edge(&mut self, model: &GraphModel, start: CellIndex, edge: CellIndex, pass: &mut Pass) -> bool {
        let visible_source = self.visible_terminal(model, edge, true);
        let visible_target = self.visible_terminal(model, edge, false);
        for terminal in [visible_source, visible_target].into_iter().flatten() {
            if pass.reachable_edges.contains(&terminal) {
                self.validate_edge(model, start, terminal, pass);
            }
        }

        let displayed = |t: Option<CellIndex>| t.filter(|t| pass.visited.contains(t));
        let visible_source = displayed(visible_source);
        let visible_target = displayed(visible_target);
        let rect_of = |t: Option<CellIndex>| t.and_then(|t| self.states.get(&t)).map(|s| s.bounds);
        let source_rect = rect_of(visible_source);
        let target_rect = rect_of(visible_target);

        let geometry = model.geometry(edge).cloned().unwrap_or_default();
        let parent_origin = model
            .parent(edge)
            .filter(|p| pass.visited.contains(p))
            .and_then(|p| self.states.get(&p))
            .map(|s| s.origin)
            .unwrap_or(Point::ORIGIN);
        let to_screen = |p: &Point| {
            let r = self.to_screen(parent_origin.translate(p.x, p.y), 0.0, 0.0);
            Point::new(r.x, r.y)
        };
        let source_point = source_rect
            .is_none()
            .then(|| geometry.source_point.as_ref().map(to_screen))
            .flatten();
        let target_point = target_rect
            .is_none()
            .then(|| geometry.target_point.as_ref().map(to_screen))
            .flatten();
        if (source_rect.is_none() && source_point.is_none())
            || (target_rect.is_none() && target_point.is_none())
        {
            return false;
        }

        let waypoints: Vec<Point> = geometry.points.iter().map(to_screen).collect();
        let style = model
            .style(edge)
            .map(|s| self.stylesheet.resolve(CellKind::Edge, s))
            .unwrap_or_default();
        let request = RouteRequest {
            source: source_rect,
            target: target_rect,
            source_point,
            target_point,
            waypoints: &waypoints,
            style: &style,
            scale: self.scale,
            config: &self.config,
        };

        let model_source = model.terminal(edge, true);
        let genuine_loop = model_source.is_some() && model_source == model.terminal(edge, false);
        let collapsed_together = !genuine_loop && visible_source.is_some() && visible_source == visible_target;

        let (points, fallback) = if collapsed_together {
            // Both ends folded into the same ancestor: a zero-length line at
            // the ancestor's center.
            let center = source_rect.map(|r| r.center()).unwrap_or(Point::ORIGIN);
            (vec![center, center], true)
        } else {
            let name = style
                .get("edgeStyle")
                .and_then(StyleValue::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| {
                    if genuine_loop {
                        self.config.loop_style.clone()
                    } else {
                        STRAIGHT.to_string()
                    }
                });
            match self.edge_styles.route(&name, &request) {
                Ok(points) if points.len() >= 2 => (points, false),
                Ok(_) => {
                    debug!(target: VIEW_TARGET, %edge, style = %name, "edge style returned no route");
                    (Straight.route(&request).unwrap_or_default(), true)
                }
                Err(err) => {
                    warn!(target: VIEW_TARGET, %edge, style = %name, %err, "edge routing failed, using straight line");
                    pass.report.diagnostics.push(Diagnostic {
                        cell: edge,
                        message: err.to_string(),
                    });
                    (Straight.route(&request).unwrap_or_default(), true)
                }
            }
        };
        if points.len() < 2 {
            return false;
        }

        let bounds = Rect::from_points(&points).unwrap_or(Rect::NOTHING);
        let origin = self.to_graph(bounds.origin());
        let scale = self.scale;
        let label_offset = geometry.offset.unwrap_or(Point::ORIGIN).scale(scale);
        let text = model.value(edge).map(value_to_label).unwrap_or_default();

        let state = self
            .states
            .entry(edge)
            .or_insert_with(|| CellState::new(edge, CellKind::Edge));
        state.absolute_points = points;
        state.update_lengths();
        state.bounds = bounds;
        state.origin = origin;
        state.unscaled_size = (bounds.width / scale, bounds.height / scale);
        state.style = style;
        state.text = text;
        state.visible_source = visible_source;
        state.visible_target = visible_target;
        state.routing_fallback = fallback;
        state.absolute_offset = state
            .point_at(0.5)
            .unwrap_or(bounds.center())
            .translate(label_offset.x, label_offset.y);
        state.invalid = false;
        state.revision += 1;
        pass.report.recomputed.push(edge);
        true
    }

    /// Places a child of an edge: relative geometries sit at fraction `x`
    /// along the route plus `offset`, others are offset from the edge origin.
    fn visit_label(
        &mut self,
        model: &GraphModel,
        start: CellIndex,
        edge: CellIndex,
        label: CellIndex,
        pass: &mut Pass,
    ) {
        let Some(kind) = model.kind(label) else {
            return;
        };
        if !model.is_visible(label) {
            return;
        }
        if kind.is_edge() {
            pass.reachable_edges.insert(label);
            pass.deferred.push_back(label);
            return;
        }

        if self.states.get(&label).is_none_or(|s| s.invalid) {
            let Some(edge_state) = self.states.get(&edge) else {
                return;
            };
            let geometry = model.geometry(label).cloned().unwrap_or_default();
            let (width, height) = (geometry.width * self.scale, geometry.height * self.scale);
            let bounds = if geometry.relative {
                let offset = geometry.offset.unwrap_or(Point::ORIGIN).scale(self.scale);
                let anchor = edge_state
                    .point_at(geometry.x)
                    .unwrap_or(edge_state.center())
                    .translate(offset.x, offset.y);
                Rect::new(anchor.x - width / 2.0, anchor.y - height / 2.0, width, height)
            } else {
                let origin = edge_state.origin.translate(geometry.x, geometry.y);
                self.to_screen(origin, geometry.width, geometry.height)
            };
            let origin = self.to_graph(bounds.origin());
            self.store_state(model, label, kind, origin, bounds, pass);
        }
        pass.visited.insert(label);
        self.visit_children(model, start, label, pass);
    }
}

/// Absolute origin and size of a non-edge cell below a parent at
/// `parent_origin`. Relative geometries are fractions of the parent's size.
fn place(
    geometry: Option<&Geometry>,
    parent_origin: Point,
    parent_size: Option<(f64, f64)>,
) -> (Point, (f64, f64)) {
    let Some(geo) = geometry else {
        return (parent_origin, (0.0, 0.0));
    };
    let mut origin = if geo.relative {
        let (pw, ph) = parent_size.unwrap_or((0.0, 0.0));
        parent_origin.translate(geo.x * pw, geo.y * ph)
    } else {
        parent_origin.translate(geo.x, geo.y)
    };
    if geo.relative
        && let Some(offset) = geo.offset
    {
        origin = origin.translate(offset.x, offset.y);
    }
    (origin, (geo.width, geo.height))
}
