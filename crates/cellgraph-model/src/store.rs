//! Arena-backed cell tree.
//!
//! Cells are addressed by [`CellIndex`] and never freed: a detached subtree
//! stays in the arena so that an undo record can re-attach it. Only attached
//! cells are reachable through the id index and only attached edges appear in
//! their terminals' edge lists.
//!
//! Nothing here is undoable. [`crate::GraphModel`] wraps every mutation in an
//! edit before it reaches the store.

use crate::MODEL_TARGET;
use cellgraph_core::{
    CellId, CellIndex, CellKind, CellStyle, CellValue, Geometry, GraphError, IdStrategy,
    ModelConfig,
};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

/// Id of the root cell of every store.
pub const ROOT_ID: &str = "0";

#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub(crate) id: Option<CellId>,
    pub(crate) kind: CellKind,
    pub(crate) value: CellValue,
    pub(crate) geometry: Option<Geometry>,
    pub(crate) style: CellStyle,
    pub(crate) collapsed: bool,
    pub(crate) visible: bool,
    pub(crate) connectable: bool,
    pub(crate) parent: Option<CellIndex>,
    pub(crate) children: Vec<CellIndex>,
    pub(crate) source: Option<CellIndex>,
    pub(crate) target: Option<CellIndex>,
    /// Attached edges that use this cell as a terminal, in connection order.
    pub(crate) edges: Vec<CellIndex>,
}

impl Cell {
    pub fn id(&self) -> Option<&CellId> {
        self.id.as_ref()
    }

    pub fn kind(&self) -> CellKind {
        self.kind
    }

    pub fn value(&self) -> &CellValue {
        &self.value
    }

    pub fn geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref()
    }

    pub fn style(&self) -> &CellStyle {
        &self.style
    }

    pub fn is_collapsed(&self) -> bool {
        self.collapsed
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn is_connectable(&self) -> bool {
        self.connectable
    }

    pub fn parent(&self) -> Option<CellIndex> {
        self.parent
    }

    pub fn children(&self) -> &[CellIndex] {
        &self.children
    }

    pub fn terminal(&self, is_source: bool) -> Option<CellIndex> {
        if is_source { self.source } else { self.target }
    }

    pub fn edges(&self) -> &[CellIndex] {
        &self.edges
    }
}

/// Description of a cell to be created in the arena.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCell {
    pub id: Option<CellId>,
    pub kind: CellKind,
    pub value: CellValue,
    pub geometry: Option<Geometry>,
    pub style: CellStyle,
    pub collapsed: bool,
    pub visible: bool,
    pub connectable: bool,
}

impl NewCell {
    pub fn vertex(value: impl Into<CellValue>, geometry: Geometry) -> Self {
        Self {
            id: None,
            kind: CellKind::Vertex,
            value: value.into(),
            geometry: Some(geometry),
            style: CellStyle::default(),
            collapsed: false,
            visible: true,
            connectable: true,
        }
    }

    pub fn edge(value: impl Into<CellValue>) -> Self {
        Self {
            id: None,
            kind: CellKind::Edge,
            value: value.into(),
            geometry: Some(Geometry::relative(0.0, 0.0)),
            style: CellStyle::default(),
            collapsed: false,
            visible: true,
            connectable: false,
        }
    }

    pub fn group() -> Self {
        Self {
            id: None,
            kind: CellKind::Group,
            value: CellValue::Null,
            geometry: None,
            style: CellStyle::default(),
            collapsed: false,
            visible: true,
            connectable: false,
        }
    }

    pub fn with_id(mut self, id: impl Into<CellId>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_style(mut self, style: CellStyle) -> Self {
        self.style = style;
        self
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = Some(geometry);
        self
    }

    pub fn with_connectable(mut self, connectable: bool) -> Self {
        self.connectable = connectable;
        self
    }
}

#[derive(Debug, Clone)]
pub struct CellStore {
    cells: Vec<Cell>,
    id_map: HashMap<CellId, CellIndex>,
    root: CellIndex,
    next_id: u64,
    config: ModelConfig,
}

impl Default for CellStore {
    fn default() -> Self {
        Self::new(ModelConfig::default())
    }
}

impl CellStore {
    pub fn new(config: ModelConfig) -> Self {
        let mut store = Self {
            cells: Vec::new(),
            id_map: HashMap::new(),
            root: CellIndex(0),
            next_id: 1,
            config,
        };
        let root = store.create_cell(NewCell::group().with_id(ROOT_ID));
        store.id_map.insert(CellId::from(ROOT_ID), root);
        store.root = root;
        store
    }

    pub fn root(&self) -> CellIndex {
        self.root
    }

    /// Creates a detached cell. Its id is only checked for uniqueness when it
    /// is attached.
    pub fn create_cell(&mut self, new: NewCell) -> CellIndex {
        let index = CellIndex(self.cells.len());
        self.cells.push(Cell {
            id: new.id,
            kind: new.kind,
            value: new.value,
            geometry: new.geometry,
            style: new.style,
            collapsed: new.collapsed,
            visible: new.visible,
            connectable: new.connectable,
            parent: None,
            children: Vec::new(),
            source: None,
            target: None,
            edges: Vec::new(),
        });
        index
    }

    pub fn cell(&self, index: CellIndex) -> Option<&Cell> {
        self.cells.get(index.0)
    }

    pub(crate) fn cell_mut(&mut self, index: CellIndex) -> Result<&mut Cell, GraphError> {
        self.cells.get_mut(index.0).ok_or(GraphError::NotFound(index))
    }

    /// Number of cells in the arena, attached or not.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn is_attached(&self, index: CellIndex) -> bool {
        let mut current = Some(index);
        while let Some(cell) = current {
            if cell == self.root {
                return true;
            }
            current = self.cell(cell).and_then(|c| c.parent);
        }
        false
    }

    pub fn parent(&self, index: CellIndex) -> Option<CellIndex> {
        self.cell(index).and_then(|c| c.parent)
    }

    pub fn children(&self, index: CellIndex) -> &[CellIndex] {
        self.cell(index).map(|c| c.children.as_slice()).unwrap_or(&[])
    }

    pub fn child_at(&self, index: CellIndex, position: usize) -> Option<CellIndex> {
        self.children(index).get(position).copied()
    }

    pub fn child_count(&self, index: CellIndex) -> usize {
        self.children(index).len()
    }

    pub fn index_of(&self, parent: CellIndex, child: CellIndex) -> Option<usize> {
        self.children(parent).iter().position(|c| *c == child)
    }

    /// True if `ancestor` is a proper ancestor of `cell`.
    pub fn is_ancestor(&self, ancestor: CellIndex, cell: CellIndex) -> bool {
        let mut current = self.parent(cell);
        while let Some(c) = current {
            if c == ancestor {
                return true;
            }
            current = self.parent(c);
        }
        false
    }

    /// True if `cell` is `ancestor` or lies in its subtree.
    pub fn contains(&self, ancestor: CellIndex, cell: CellIndex) -> bool {
        ancestor == cell || self.is_ancestor(ancestor, cell)
    }

    /// `cell` and all of its descendants in pre-order.
    pub fn descendants(&self, cell: CellIndex) -> Vec<CellIndex> {
        let mut out = Vec::new();
        if self.cell(cell).is_none() {
            return out;
        }
        let mut stack = vec![cell];
        while let Some(current) = stack.pop() {
            out.push(current);
            stack.extend(self.children(current).iter().rev().copied());
        }
        out
    }

    pub fn terminal(&self, edge: CellIndex, is_source: bool) -> Option<CellIndex> {
        self.cell(edge).and_then(|c| c.terminal(is_source))
    }

    pub fn edges(&self, cell: CellIndex) -> &[CellIndex] {
        self.cell(cell).map(|c| c.edges.as_slice()).unwrap_or(&[])
    }

    pub fn cell_by_id(&self, id: &CellId) -> Option<CellIndex> {
        self.id_map.get(id).copied()
    }

    pub fn id(&self, index: CellIndex) -> Option<&CellId> {
        self.cell(index).and_then(|c| c.id.as_ref())
    }

    /// Generates an id not used by any attached cell.
    pub fn create_id(&mut self) -> CellId {
        loop {
            let candidate = match self.config.id_strategy {
                IdStrategy::Sequential => {
                    let n = self.next_id;
                    self.next_id += 1;
                    format!("{}{}{}", self.config.id_prefix, n, self.config.id_postfix)
                }
                IdStrategy::Uuid => format!(
                    "{}{}{}",
                    self.config.id_prefix,
                    Uuid::new_v4(),
                    self.config.id_postfix
                ),
            };
            let id = CellId(candidate);
            if !self.id_map.contains_key(&id) {
                return id;
            }
        }
    }

    /// Renames a cell. Attached cells are re-indexed; a duplicate id is rejected.
    pub fn set_id(&mut self, index: CellIndex, id: CellId) -> Result<(), GraphError> {
        if let Some(existing) = self.cell_by_id(&id)
            && existing != index
        {
            return Err(GraphError::invalid_state(format!("id '{id}' is already in use")));
        }
        let attached = self.is_attached(index);
        let cell = self.cell_mut(index)?;
        let old = cell.id.replace(id.clone());
        if attached {
            if let Some(old) = old {
                self.id_map.remove(&old);
            }
            self.id_map.insert(id, index);
        }
        Ok(())
    }

    /// Inserts a detached `child` under `parent` at `position` (clamped,
    /// `None` appends) and returns the position used.
    pub fn add_child(
        &mut self,
        parent: CellIndex,
        child: CellIndex,
        position: Option<usize>,
    ) -> Result<usize, GraphError> {
        if self.cell(parent).is_none() {
            return Err(GraphError::NotFound(parent));
        }
        let current_parent = self.cell(child).ok_or(GraphError::NotFound(child))?.parent;
        if child == self.root {
            return Err(GraphError::structural("the root cannot be added as a child"));
        }
        if current_parent.is_some() {
            return Err(GraphError::structural(format!(
                "cell {child} already has a parent and must be removed first"
            )));
        }
        if self.contains(child, parent) {
            return Err(GraphError::structural(format!(
                "adding {child} under {parent} would create a cycle"
            )));
        }

        let children = &mut self.cell_mut(parent)?.children;
        let position = position.unwrap_or(children.len()).min(children.len());
        children.insert(position, child);
        self.cell_mut(child)?.parent = Some(parent);

        if self.is_attached(parent) {
            self.cells_attached(child);
        }
        Ok(position)
    }

    /// Detaches `cell` (and its subtree) from its parent, returning the old
    /// parent and position.
    pub fn remove(&mut self, cell: CellIndex) -> Result<(CellIndex, usize), GraphError> {
        if cell == self.root {
            return Err(GraphError::structural("the root cannot be removed"));
        }
        let parent = self
            .cell(cell)
            .and_then(|c| c.parent)
            .ok_or(GraphError::NotFound(cell))?;
        if self.is_attached(cell) {
            self.cells_detached(cell);
        }
        let position = self
            .index_of(parent, cell)
            .ok_or_else(|| GraphError::invalid_state(format!("{cell} missing from its parent")))?;
        self.cell_mut(parent)?.children.remove(position);
        self.cell_mut(cell)?.parent = None;
        Ok((parent, position))
    }

    /// Sets one terminal of `edge` and returns the previous one.
    pub fn set_terminal(
        &mut self,
        edge: CellIndex,
        terminal: Option<CellIndex>,
        is_source: bool,
    ) -> Result<Option<CellIndex>, GraphError> {
        if let Some(t) = terminal
            && self.cell(t).is_none()
        {
            return Err(GraphError::NotFound(t));
        }
        let cell = self.cell_mut(edge)?;
        let slot = if is_source { &mut cell.source } else { &mut cell.target };
        let previous = std::mem::replace(slot, terminal);
        let other = cell.terminal(!is_source);

        if self.is_attached(edge) {
            if let Some(p) = previous
                && other != Some(p)
            {
                self.unlink(p, edge);
            }
            if let Some(t) = terminal {
                self.link(t, edge);
            }
        }
        Ok(previous)
    }

    fn link(&mut self, terminal: CellIndex, edge: CellIndex) {
        if let Some(cell) = self.cells.get_mut(terminal.0)
            && !cell.edges.contains(&edge)
        {
            cell.edges.push(edge);
        }
    }

    fn unlink(&mut self, terminal: CellIndex, edge: CellIndex) {
        if let Some(cell) = self.cells.get_mut(terminal.0) {
            cell.edges.retain(|e| *e != edge);
        }
    }

    fn cells_attached(&mut self, subtree: CellIndex) {
        for index in self.descendants(subtree) {
            let taken = match self.id(index) {
                Some(id) => self.id_map.get(id).is_some_and(|other| *other != index),
                None => true,
            };
            if taken {
                let fresh = self.create_id();
                debug!(
                    target: MODEL_TARGET,
                    cell = %index,
                    requested = ?self.id(index),
                    assigned = %fresh,
                    "assigned fresh cell id"
                );
                self.cells[index.0].id = Some(fresh);
            }
            if let Some(id) = self.cells[index.0].id.clone() {
                self.id_map.insert(id, index);
            }
            for is_source in [true, false] {
                if let Some(terminal) = self.terminal(index, is_source) {
                    self.link(terminal, index);
                }
            }
        }
    }

    fn cells_detached(&mut self, subtree: CellIndex) {
        for index in self.descendants(subtree) {
            if let Some(id) = self.cells[index.0].id.clone()
                && self.id_map.get(&id) == Some(&index)
            {
                self.id_map.remove(&id);
            }
            for is_source in [true, false] {
                if let Some(terminal) = self.terminal(index, is_source) {
                    self.unlink(terminal, index);
                }
            }
        }
    }
}
