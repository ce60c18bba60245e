use crate::MODEL_TARGET;
use crate::edit::{AttributeChange, ChildChange, TerminalChange, Transaction, UndoableEdit};
use crate::multiplicity::ConnectionRule;
use crate::store::{Cell, CellStore, NewCell};
use cellgraph_core::{
    CellId, CellIndex, CellKind, CellStyle, CellValue, Geometry, GraphConfig, GraphError,
};
use cellgraph_events::{Event, EventEmitter, EventName, EventSource, ListenerId};
use crossbeam_channel::Receiver;
use std::collections::HashSet;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;
use tracing::{debug, error, trace, warn};

/// Why a `Change` event was fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    Edit,
    Undo,
    Redo,
}

#[derive(Debug, Clone)]
pub enum ModelEvent {
    BeginUpdate {
        level: usize,
    },
    EndUpdate {
        level: usize,
    },
    /// A closed, non-empty transaction ready to be recorded.
    Undoable {
        transaction: Rc<Transaction>,
    },
    /// Edits applied since the last notification, in application order.
    Change {
        transaction: Rc<Transaction>,
        origin: ChangeOrigin,
    },
}

impl Event for ModelEvent {
    fn name(&self) -> EventName {
        match self {
            Self::BeginUpdate { .. } => EventName::BeginUpdate,
            Self::EndUpdate { .. } => EventName::EndUpdate,
            Self::Undoable { .. } => EventName::Undoable,
            Self::Change { .. } => EventName::Change,
        }
    }
}

/// Transactional owner of a [`CellStore`].
///
/// Every recorded mutation is an [`UndoableEdit`] applied inside a
/// `begin_update`/`end_update` bracket. Brackets nest; only the outermost
/// `end_update` notifies listeners, with the whole edit list at once.
pub struct GraphModel {
    store: CellStore,
    update_level: usize,
    current: Vec<UndoableEdit>,
    events: EventSource<GraphModel, ModelEvent>,
    rules: Vec<Box<dyn ConnectionRule>>,
}

impl fmt::Debug for GraphModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphModel")
            .field("cells", &self.store.len())
            .field("update_level", &self.update_level)
            .field("pending_edits", &self.current.len())
            .field("rules", &self.rules.len())
            .field("events", &self.events)
            .finish()
    }
}

impl Default for GraphModel {
    fn default() -> Self {
        Self::new(&GraphConfig::default())
    }
}

impl EventEmitter for GraphModel {
    type Event = ModelEvent;

    fn event_source(&self) -> &EventSource<Self, ModelEvent> {
        &self.events
    }
}

impl GraphModel {
    pub fn new(config: &GraphConfig) -> Self {
        Self {
            store: CellStore::new(config.model.clone()),
            update_level: 0,
            current: Vec::new(),
            events: EventSource::new(),
            rules: Vec::new(),
        }
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    pub fn add_listener<F>(&mut self, name: EventName, listener: F) -> ListenerId
    where
        F: Fn(&mut GraphModel, &ModelEvent) + 'static,
    {
        self.events.add_listener(name, listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.events.remove_listener(id)
    }

    pub fn subscribe(&mut self, name: Option<EventName>) -> (ListenerId, Receiver<ModelEvent>) {
        self.events.subscribe(name)
    }

    pub fn events_mut(&mut self) -> &mut EventSource<GraphModel, ModelEvent> {
        &mut self.events
    }

    pub fn add_rule(&mut self, rule: impl ConnectionRule + 'static) {
        self.rules.push(Box::new(rule));
    }

    pub fn clear_rules(&mut self) {
        self.rules.clear();
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn store(&self) -> &CellStore {
        &self.store
    }

    pub fn root(&self) -> CellIndex {
        self.store.root()
    }

    pub fn cell(&self, cell: CellIndex) -> Option<&Cell> {
        self.store.cell(cell)
    }

    pub fn cell_by_id(&self, id: &CellId) -> Option<CellIndex> {
        self.store.cell_by_id(id)
    }

    /// Like [`cell_by_id`](Self::cell_by_id), but an unknown id is an error.
    pub fn require_by_id(&self, id: &CellId) -> Result<CellIndex, GraphError> {
        self.cell_by_id(id).ok_or_else(|| GraphError::UnknownId(id.clone()))
    }

    pub fn id(&self, cell: CellIndex) -> Option<&CellId> {
        self.store.id(cell)
    }

    /// True if the cell is reachable from the root.
    pub fn contains(&self, cell: CellIndex) -> bool {
        self.store.is_attached(cell)
    }

    pub fn kind(&self, cell: CellIndex) -> Option<CellKind> {
        self.cell(cell).map(Cell::kind)
    }

    pub fn is_edge(&self, cell: CellIndex) -> bool {
        self.kind(cell).is_some_and(CellKind::is_edge)
    }

    pub fn is_vertex(&self, cell: CellIndex) -> bool {
        self.kind(cell).is_some_and(CellKind::is_vertex)
    }

    pub fn value(&self, cell: CellIndex) -> Option<&CellValue> {
        self.cell(cell).map(Cell::value)
    }

    pub fn style(&self, cell: CellIndex) -> Option<&CellStyle> {
        self.cell(cell).map(Cell::style)
    }

    pub fn geometry(&self, cell: CellIndex) -> Option<&Geometry> {
        self.cell(cell).and_then(Cell::geometry)
    }

    pub fn is_collapsed(&self, cell: CellIndex) -> bool {
        self.cell(cell).is_some_and(Cell::is_collapsed)
    }

    pub fn is_visible(&self, cell: CellIndex) -> bool {
        self.cell(cell).is_some_and(Cell::is_visible)
    }

    pub fn parent(&self, cell: CellIndex) -> Option<CellIndex> {
        self.store.parent(cell)
    }

    pub fn children(&self, cell: CellIndex) -> &[CellIndex] {
        self.store.children(cell)
    }

    pub fn child_at(&self, cell: CellIndex, position: usize) -> Option<CellIndex> {
        self.store.child_at(cell, position)
    }

    pub fn child_count(&self, cell: CellIndex) -> usize {
        self.store.child_count(cell)
    }

    /// Strict: a cell is never its own ancestor.
    pub fn is_ancestor(&self, ancestor: CellIndex, cell: CellIndex) -> bool {
        self.store.is_ancestor(ancestor, cell)
    }

    pub fn terminal(&self, edge: CellIndex, is_source: bool) -> Option<CellIndex> {
        self.store.terminal(edge, is_source)
    }

    /// Attached edges connected to `cell`.
    pub fn edges(&self, cell: CellIndex) -> &[CellIndex] {
        self.store.edges(cell)
    }

    pub fn edge_count(&self, cell: CellIndex) -> usize {
        self.edges(cell).len()
    }

    /// Edges from `source` to `target`, and the reverse direction unless
    /// `directed`.
    pub fn get_edges_between(
        &self,
        source: CellIndex,
        target: CellIndex,
        directed: bool,
    ) -> Vec<CellIndex> {
        self.edges(source)
            .iter()
            .copied()
            .filter(|&edge| {
                let s = self.terminal(edge, true);
                let t = self.terminal(edge, false);
                (s == Some(source) && t == Some(target))
                    || (!directed && s == Some(target) && t == Some(source))
            })
            .collect()
    }

    /// `start` (the root by default) and its descendants in pre-order.
    pub fn descendants(&self, start: Option<CellIndex>) -> Vec<CellIndex> {
        self.store.descendants(start.unwrap_or_else(|| self.root()))
    }

    pub fn filter_descendants<F>(&self, predicate: F, start: Option<CellIndex>) -> Vec<CellIndex>
    where
        F: Fn(CellIndex, &Cell) -> bool,
    {
        self.descendants(start)
            .into_iter()
            .filter(|&index| self.cell(index).is_some_and(|cell| predicate(index, cell)))
            .collect()
    }

    /// Pre-order walk; the visitor returns `false` to skip a cell's children.
    pub fn traverse<F>(&self, start: CellIndex, visitor: &mut F)
    where
        F: FnMut(CellIndex, &Cell) -> bool,
    {
        let Some(cell) = self.cell(start) else {
            return;
        };
        if visitor(start, cell) {
            for &child in cell.children() {
                self.traverse(child, visitor);
            }
        }
    }

    /// Drops every cell that has an ancestor in the same list.
    pub fn topmost_cells(&self, cells: &[CellIndex]) -> Vec<CellIndex> {
        let mut seen = HashSet::new();
        cells
            .iter()
            .copied()
            .filter(|&cell| !cells.iter().any(|&other| self.is_ancestor(other, cell)))
            .filter(|cell| seen.insert(*cell))
            .collect()
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    pub fn is_updating(&self) -> bool {
        self.update_level > 0
    }

    pub fn update_level(&self) -> usize {
        self.update_level
    }

    pub fn begin_update(&mut self) {
        if self.update_level == 0 {
            self.current.clear();
        }
        self.update_level += 1;
        let level = self.update_level;
        self.fire_event(ModelEvent::BeginUpdate { level });
    }

    /// Closes one bracket. The outermost close hands the collected edits to
    /// `Undoable` listeners and then to `Change` listeners.
    pub fn end_update(&mut self) -> Result<(), GraphError> {
        if self.update_level == 0 {
            error!(target: MODEL_TARGET, "end_update called without begin_update");
            return Err(GraphError::invalid_state(
                "end_update called without a matching begin_update",
            ));
        }
        self.update_level -= 1;
        let level = self.update_level;

        if level > 0 {
            self.fire_event(ModelEvent::EndUpdate { level });
            return Ok(());
        }

        let edits = std::mem::take(&mut self.current);
        self.fire_event(ModelEvent::EndUpdate { level });
        if edits.is_empty() {
            return Ok(());
        }

        debug!(target: MODEL_TARGET, edits = edits.len(), "transaction closed");
        let transaction = Rc::new(Transaction::new(edits));
        self.fire_event(ModelEvent::Undoable {
            transaction: Rc::clone(&transaction),
        });
        self.fire_event(ModelEvent::Change {
            transaction,
            origin: ChangeOrigin::Edit,
        });
        Ok(())
    }

    /// Opens a bracket that closes when the guard drops.
    pub fn update(&mut self) -> UpdateGuard<'_> {
        self.begin_update();
        UpdateGuard { model: self }
    }

    /// Runs `f` inside one transaction.
    pub fn batch_update<R>(&mut self, f: impl FnOnce(&mut GraphModel) -> R) -> R {
        let mut guard = self.update();
        f(&mut guard)
    }

    /// Applies an externally built edit inside its own transaction.
    pub fn execute(&mut self, edit: UndoableEdit) -> Result<(), GraphError> {
        self.validate_edit(&edit)?;
        self.record(vec![edit])
    }

    /// Re-applies a recorded transaction, backwards for undo and forwards for
    /// redo, and fires `Change` with the given origin.
    pub(crate) fn replay(
        &mut self,
        transaction: &mut Transaction,
        origin: ChangeOrigin,
    ) -> Result<(), GraphError> {
        if self.is_updating() {
            return Err(GraphError::invalid_state(
                "cannot undo or redo while a transaction is open",
            ));
        }
        let result = if origin == ChangeOrigin::Undo {
            transaction
                .edits
                .iter_mut()
                .rev()
                .try_for_each(|edit| edit.execute(self))
        } else {
            transaction
                .edits
                .iter_mut()
                .try_for_each(|edit| edit.execute(self))
        };
        if let Err(err) = &result {
            error!(target: MODEL_TARGET, ?origin, %err, "replay failed");
        }
        self.fire_event(ModelEvent::Change {
            transaction: Rc::new(transaction.clone()),
            origin,
        });
        result
    }

    fn record(&mut self, edits: Vec<UndoableEdit>) -> Result<(), GraphError> {
        self.begin_update();
        let result = edits.into_iter().try_for_each(|edit| self.apply(edit));
        self.end_update()?;
        result
    }

    fn apply(&mut self, mut edit: UndoableEdit) -> Result<(), GraphError> {
        edit.execute(self)?;
        trace!(
            target: MODEL_TARGET,
            kind = edit.kind_name(),
            cell = ?edit.primary_cell(),
            "edit applied"
        );
        self.current.push(edit);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Validation
    // ------------------------------------------------------------------

    fn ensure_attached(&self, cell: CellIndex) -> Result<(), GraphError> {
        if self.contains(cell) {
            Ok(())
        } else {
            Err(GraphError::NotFound(cell))
        }
    }

    /// Structural checks come before attachment, so a cycle through a
    /// detached subtree is reported as a cycle.
    fn validate_insert(&self, cell: CellIndex, parent: CellIndex) -> Result<(), GraphError> {
        let existing = self.cell(cell).ok_or(GraphError::NotFound(cell))?;
        if cell == self.root() {
            return Err(GraphError::structural("the root cannot be added as a child"));
        }
        if existing.parent().is_some() {
            return Err(GraphError::structural(format!(
                "cell {cell} already has a parent"
            )));
        }
        if self.store.contains(cell, parent) {
            return Err(GraphError::structural(format!(
                "adding {cell} under {parent} would create a cycle"
            )));
        }
        self.ensure_attached(parent)
    }

    fn validate_edit(&self, edit: &UndoableEdit) -> Result<(), GraphError> {
        match edit {
            UndoableEdit::Child(change) => {
                let child = change.child;
                if self.cell(child).is_none() {
                    return Err(GraphError::NotFound(child));
                }
                if child == self.root() {
                    return Err(GraphError::structural("the root cannot be moved"));
                }
                match change.previous {
                    Some(parent) => {
                        if self.store.contains(child, parent) {
                            return Err(GraphError::structural(format!(
                                "moving {child} under {parent} would create a cycle"
                            )));
                        }
                        self.ensure_attached(parent)
                    }
                    None => self.ensure_attached(child),
                }
            }
            UndoableEdit::Terminal(change) => {
                self.ensure_attached(change.edge)?;
                if let Some(terminal) = change.previous {
                    self.ensure_attached(terminal)?;
                }
                let (source, target) =
                    self.terminals_after(change.edge, change.previous, change.is_source);
                self.check_connection(change.edge, source, target)
            }
            UndoableEdit::Value(c) => self.ensure_attached(c.cell),
            UndoableEdit::Style(c) => self.ensure_attached(c.cell),
            UndoableEdit::Geometry(c) => self.ensure_attached(c.cell),
            UndoableEdit::Collapsed(c) => self.ensure_attached(c.cell),
            UndoableEdit::Visible(c) => self.ensure_attached(c.cell),
            UndoableEdit::Custom(_) => Ok(()),
        }
    }

    fn terminals_after(
        &self,
        edge: CellIndex,
        terminal: Option<CellIndex>,
        is_source: bool,
    ) -> (Option<CellIndex>, Option<CellIndex>) {
        if is_source {
            (terminal, self.terminal(edge, false))
        } else {
            (self.terminal(edge, true), terminal)
        }
    }

    /// Consults every connection rule; the first veto wins.
    pub fn check_connection(
        &self,
        edge: CellIndex,
        source: Option<CellIndex>,
        target: Option<CellIndex>,
    ) -> Result<(), GraphError> {
        for rule in &self.rules {
            if let Err(reason) = rule.check(self, edge, source, target) {
                warn!(target: MODEL_TARGET, %edge, %reason, "connection rejected");
                return Err(GraphError::ConnectionRejected(reason));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Recorded mutations
    // ------------------------------------------------------------------

    /// Creates a detached cell in the arena. Nothing is recorded until it is
    /// added.
    pub fn create_cell(&mut self, new: NewCell) -> CellIndex {
        self.store.create_cell(new)
    }

    /// Inserts a detached cell under `parent` at `index` (`None` appends).
    pub fn add(
        &mut self,
        cell: CellIndex,
        parent: CellIndex,
        index: Option<usize>,
    ) -> Result<CellIndex, GraphError> {
        self.validate_insert(cell, parent)?;
        if self.is_edge(cell) {
            let source = self.terminal(cell, true);
            let target = self.terminal(cell, false);
            if source.is_some() || target.is_some() {
                self.check_connection(cell, source, target)?;
            }
        }
        self.record(vec![UndoableEdit::Child(ChildChange::new(
            cell,
            Some(parent),
            index,
        ))])?;
        Ok(cell)
    }

    /// Inserts an edge and connects it in one transaction.
    pub fn add_edge(
        &mut self,
        edge: CellIndex,
        parent: CellIndex,
        index: Option<usize>,
        source: Option<CellIndex>,
        target: Option<CellIndex>,
    ) -> Result<CellIndex, GraphError> {
        self.validate_insert(edge, parent)?;
        if !self.is_edge(edge) {
            return Err(GraphError::structural(format!("cell {edge} is not an edge")));
        }
        for terminal in [source, target].into_iter().flatten() {
            self.ensure_attached(terminal)?;
        }
        self.check_connection(edge, source, target)?;

        self.record(vec![
            UndoableEdit::Child(ChildChange::new(edge, Some(parent), index)),
            UndoableEdit::Terminal(TerminalChange::new(edge, source, true)),
            UndoableEdit::Terminal(TerminalChange::new(edge, target, false)),
        ])?;
        Ok(edge)
    }

    /// Detaches `cell` and its subtree. Edges outside the subtree that are
    /// connected to it lose that terminal first, in the same transaction.
    pub fn remove(&mut self, cell: CellIndex) -> Result<CellIndex, GraphError> {
        if cell == self.root() {
            return Err(GraphError::structural("the root cannot be removed"));
        }
        self.ensure_attached(cell)?;

        let subtree = self.store.descendants(cell);
        let inside: HashSet<CellIndex> = subtree.iter().copied().collect();
        let mut edits = Vec::new();
        for &member in &subtree {
            for &edge in self.edges(member) {
                if inside.contains(&edge) {
                    continue;
                }
                for is_source in [true, false] {
                    if self.terminal(edge, is_source) == Some(member) {
                        edits.push(UndoableEdit::Terminal(TerminalChange::new(
                            edge, None, is_source,
                        )));
                    }
                }
            }
        }
        edits.push(UndoableEdit::Child(ChildChange::new(cell, None, None)));
        self.record(edits)?;
        Ok(cell)
    }

    pub fn set_value(
        &mut self,
        cell: CellIndex,
        value: impl Into<CellValue>,
    ) -> Result<(), GraphError> {
        self.ensure_attached(cell)?;
        self.record(vec![UndoableEdit::Value(AttributeChange::new(
            cell,
            value.into(),
        ))])
    }

    pub fn set_style(&mut self, cell: CellIndex, style: CellStyle) -> Result<(), GraphError> {
        self.ensure_attached(cell)?;
        self.record(vec![UndoableEdit::Style(AttributeChange::new(cell, style))])
    }

    pub fn set_geometry(
        &mut self,
        cell: CellIndex,
        geometry: Option<Geometry>,
    ) -> Result<(), GraphError> {
        self.ensure_attached(cell)?;
        self.record(vec![UndoableEdit::Geometry(AttributeChange::new(
            cell, geometry,
        ))])
    }

    pub fn set_collapsed(&mut self, cell: CellIndex, collapsed: bool) -> Result<(), GraphError> {
        self.ensure_attached(cell)?;
        self.record(vec![UndoableEdit::Collapsed(AttributeChange::new(
            cell, collapsed,
        ))])
    }

    pub fn set_visible(&mut self, cell: CellIndex, visible: bool) -> Result<(), GraphError> {
        self.ensure_attached(cell)?;
        self.record(vec![UndoableEdit::Visible(AttributeChange::new(
            cell, visible,
        ))])
    }

    pub fn set_terminal(
        &mut self,
        edge: CellIndex,
        terminal: Option<CellIndex>,
        is_source: bool,
    ) -> Result<(), GraphError> {
        self.ensure_attached(edge)?;
        if !self.is_edge(edge) {
            return Err(GraphError::structural(format!("cell {edge} is not an edge")));
        }
        let edit = UndoableEdit::Terminal(TerminalChange::new(edge, terminal, is_source));
        self.validate_edit(&edit)?;
        self.record(vec![edit])
    }

    /// Sets both terminals of an edge in one transaction.
    pub fn set_terminals(
        &mut self,
        edge: CellIndex,
        source: Option<CellIndex>,
        target: Option<CellIndex>,
    ) -> Result<(), GraphError> {
        self.batch_update(|model| {
            model.set_terminal(edge, source, true)?;
            model.set_terminal(edge, target, false)
        })
    }

    /// Merges the children of `from_parent` in `from` into `to_parent`,
    /// matching cells by id. See [`crate::codec::merge`].
    pub fn merge_children(
        &mut self,
        from: &GraphModel,
        from_parent: CellIndex,
        to_parent: CellIndex,
        clone_all_edges: bool,
    ) -> Result<Vec<CellIndex>, GraphError> {
        let snapshot = crate::codec::export_cells(from, from.children(from_parent));
        crate::codec::merge(self, &snapshot, to_parent, clone_all_edges)
    }

    // ------------------------------------------------------------------
    // Unrecorded setters used by edits
    // ------------------------------------------------------------------

    /// Moves `child` under `parent` (or detaches it) and returns where it was.
    pub fn parent_for_cell_changed(
        &mut self,
        child: CellIndex,
        parent: Option<CellIndex>,
        index: Option<usize>,
    ) -> Result<(Option<CellIndex>, Option<usize>), GraphError> {
        let old = if self.store.parent(child).is_some() {
            let (p, i) = self.store.remove(child)?;
            (Some(p), Some(i))
        } else {
            (None, None)
        };
        if let Some(parent) = parent {
            self.store.add_child(parent, child, index)?;
        }
        Ok(old)
    }

    pub fn terminal_for_cell_changed(
        &mut self,
        edge: CellIndex,
        terminal: Option<CellIndex>,
        is_source: bool,
    ) -> Result<Option<CellIndex>, GraphError> {
        self.store.set_terminal(edge, terminal, is_source)
    }

    pub fn value_for_cell_changed(
        &mut self,
        cell: CellIndex,
        value: CellValue,
    ) -> Result<CellValue, GraphError> {
        Ok(std::mem::replace(&mut self.store.cell_mut(cell)?.value, value))
    }

    pub fn style_for_cell_changed(
        &mut self,
        cell: CellIndex,
        style: CellStyle,
    ) -> Result<CellStyle, GraphError> {
        Ok(std::mem::replace(&mut self.store.cell_mut(cell)?.style, style))
    }

    pub fn geometry_for_cell_changed(
        &mut self,
        cell: CellIndex,
        geometry: Option<Geometry>,
    ) -> Result<Option<Geometry>, GraphError> {
        Ok(std::mem::replace(
            &mut self.store.cell_mut(cell)?.geometry,
            geometry,
        ))
    }

    pub fn collapsed_state_for_cell_changed(
        &mut self,
        cell: CellIndex,
        collapsed: bool,
    ) -> Result<bool, GraphError> {
        Ok(std::mem::replace(
            &mut self.store.cell_mut(cell)?.collapsed,
            collapsed,
        ))
    }

    pub fn visible_state_for_cell_changed(
        &mut self,
        cell: CellIndex,
        visible: bool,
    ) -> Result<bool, GraphError> {
        Ok(std::mem::replace(
            &mut self.store.cell_mut(cell)?.visible,
            visible,
        ))
    }

    /// Renames an attached cell. Ids are not part of the undo history.
    pub fn set_id(&mut self, cell: CellIndex, id: CellId) -> Result<(), GraphError> {
        self.store.set_id(cell, id)
    }
}

/// Closes the bracket opened by [`GraphModel::update`] when dropped.
pub struct UpdateGuard<'a> {
    model: &'a mut GraphModel,
}

impl Deref for UpdateGuard<'_> {
    type Target = GraphModel;

    fn deref(&self) -> &GraphModel {
        self.model
    }
}

impl DerefMut for UpdateGuard<'_> {
    fn deref_mut(&mut self) -> &mut GraphModel {
        self.model
    }
}

impl Drop for UpdateGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.model.end_update() {
            error!(target: MODEL_TARGET, %err, "update guard failed to close transaction");
        }
    }
}
