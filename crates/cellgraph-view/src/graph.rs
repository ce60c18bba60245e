use cellgraph_core::{
    CellIndex, CellStyle, CellValue, Geometry, GraphConfig, GraphError, Rect, StyleValue,
};
use cellgraph_model::{Clipboard, GraphModel, NewCell, SelectionModel, UndoManager};
use std::collections::HashSet;
use tracing::debug;

use crate::VIEW_TARGET;
use crate::layout::Layout;
use crate::view::{GraphView, ValidationReport};

/// One editable diagram: a model with its view, selection, undo history and
/// clipboard wired together.
///
/// New cells go under the default parent, a layer created below the root at
/// construction.
#[derive(Debug)]
pub struct Graph {
    model: GraphModel,
    view: GraphView,
    selection: SelectionModel,
    undo: UndoManager,
    clipboard: Clipboard,
    default_parent: CellIndex,
}

impl Graph {
    pub fn new(config: &GraphConfig) -> Result<Self, GraphError> {
        let mut model = GraphModel::new(config);
        let root = model.root();
        let layer = model.create_cell(NewCell::group());
        model.add(layer, root, None)?;

        let mut view = GraphView::new(&config.view);
        view.attach(&mut model);
        let mut undo = UndoManager::new(&config.undo);
        undo.attach(&mut model);

        Ok(Self {
            model,
            view,
            selection: SelectionModel::new(&config.selection),
            undo,
            clipboard: Clipboard::new(),
            default_parent: layer,
        })
    }

    pub fn model(&self) -> &GraphModel {
        &self.model
    }

    /// Direct model access. Changes made here are recorded and observed like
    /// any other.
    pub fn model_mut(&mut self) -> &mut GraphModel {
        &mut self.model
    }

    pub fn view(&self) -> &GraphView {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut GraphView {
        &mut self.view
    }

    pub fn selection(&self) -> &SelectionModel {
        &self.selection
    }

    pub fn selection_mut(&mut self) -> &mut SelectionModel {
        &mut self.selection
    }

    pub fn undo_manager(&self) -> &UndoManager {
        &self.undo
    }

    pub fn undo_manager_mut(&mut self) -> &mut UndoManager {
        &mut self.undo
    }

    pub fn clipboard(&self) -> &Clipboard {
        &self.clipboard
    }

    pub fn default_parent(&self) -> CellIndex {
        self.default_parent
    }

    pub fn set_default_parent(&mut self, parent: CellIndex) -> Result<(), GraphError> {
        if !self.model.contains(parent) {
            return Err(GraphError::NotFound(parent));
        }
        self.default_parent = parent;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Cell factories
    // ------------------------------------------------------------------

    /// Creates and inserts a vertex. A duplicate `id` is replaced by a
    /// generated one.
    pub fn insert_vertex(
        &mut self,
        parent: Option<CellIndex>,
        id: Option<&str>,
        value: impl Into<CellValue>,
        bounds: Rect,
        style: CellStyle,
    ) -> Result<CellIndex, GraphError> {
        let parent = parent.unwrap_or(self.default_parent);
        let geometry = Geometry::new(bounds.x, bounds.y, bounds.width, bounds.height);
        let mut new = NewCell::vertex(value, geometry).with_style(style);
        if let Some(id) = id {
            new = new.with_id(id);
        }
        let cell = self.model.create_cell(new);
        self.model.add(cell, parent, None)
    }

    /// Creates an edge and connects it in one transaction.
    pub fn insert_edge(
        &mut self,
        parent: Option<CellIndex>,
        id: Option<&str>,
        value: impl Into<CellValue>,
        source: Option<CellIndex>,
        target: Option<CellIndex>,
        style: CellStyle,
    ) -> Result<CellIndex, GraphError> {
        let parent = parent.unwrap_or(self.default_parent);
        let mut new = NewCell::edge(value).with_style(style);
        if let Some(id) = id {
            new = new.with_id(id);
        }
        let edge = self.model.create_cell(new);
        self.model.add_edge(edge, parent, None, source, target)
    }

    // ------------------------------------------------------------------
    // Bulk edits, one transaction each
    // ------------------------------------------------------------------

    /// Removes `cells` (and with `include_edges` every edge connected to them
    /// or their descendants). Returns the top-most cells actually removed.
    pub fn remove_cells(
        &mut self,
        cells: &[CellIndex],
        include_edges: bool,
    ) -> Result<Vec<CellIndex>, GraphError> {
        let mut targets: Vec<CellIndex> = Vec::new();
        let mut seen = HashSet::new();
        for &cell in cells.iter().filter(|&&c| self.model.contains(c)) {
            if seen.insert(cell) {
                targets.push(cell);
            }
            if include_edges {
                for member in self.model.descendants(Some(cell)) {
                    for &edge in self.model.edges(member) {
                        if seen.insert(edge) {
                            targets.push(edge);
                        }
                    }
                }
            }
        }
        let topmost = self.model.topmost_cells(&targets);

        let removed = self.model.batch_update(|model| {
            let mut removed = Vec::with_capacity(topmost.len());
            for cell in topmost {
                // An earlier removal may already have taken it out.
                if model.contains(cell) {
                    removed.push(model.remove(cell)?);
                }
            }
            Ok::<_, GraphError>(removed)
        })?;
        debug!(target: VIEW_TARGET, removed = removed.len(), include_edges, "cells removed");
        self.selection.prune(&self.model);
        Ok(removed)
    }

    /// Translates the geometries of `cells` by `(dx, dy)`.
    pub fn move_cells(&mut self, cells: &[CellIndex], dx: f64, dy: f64) -> Result<(), GraphError> {
        let topmost = self.model.topmost_cells(cells);
        self.model.batch_update(|model| {
            for cell in topmost {
                let Some(mut geometry) = model.geometry(cell).cloned() else {
                    continue;
                };
                geometry.translate(dx, dy);
                model.set_geometry(cell, Some(geometry))?;
            }
            Ok(())
        })
    }

    pub fn resize_cell(&mut self, cell: CellIndex, bounds: Rect) -> Result<(), GraphError> {
        let mut geometry = self
            .model
            .geometry(cell)
            .cloned()
            .unwrap_or_default();
        geometry.x = bounds.x;
        geometry.y = bounds.y;
        geometry.width = bounds.width;
        geometry.height = bounds.height;
        self.model.set_geometry(cell, Some(geometry))
    }

    /// Sets one inline style property on every cell.
    pub fn set_cells_style_property(
        &mut self,
        cells: &[CellIndex],
        key: &str,
        value: impl Into<StyleValue>,
    ) -> Result<(), GraphError> {
        let value = value.into();
        self.model.batch_update(|model| {
            for &cell in cells {
                let Some(style) = model.style(cell) else {
                    return Err(GraphError::NotFound(cell));
                };
                let mut style = style.clone();
                style.set(key, value.clone());
                model.set_style(cell, style)?;
            }
            Ok(())
        })
    }

    /// Collapses or expands `cells` in one transaction.
    pub fn fold_cells(&mut self, collapse: bool, cells: &[CellIndex]) -> Result<(), GraphError> {
        self.model.batch_update(|model| {
            for &cell in cells {
                if model.is_collapsed(cell) != collapse {
                    model.set_collapsed(cell, collapse)?;
                }
            }
            Ok(())
        })
    }

    pub fn execute_layout(
        &mut self,
        layout: &dyn Layout,
        parent: Option<CellIndex>,
    ) -> Result<(), GraphError> {
        let parent = parent.unwrap_or(self.default_parent);
        self.model.batch_update(|model| layout.execute(model, parent))
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    pub fn undo(&mut self) -> Result<bool, GraphError> {
        let undone = self.undo.undo(&mut self.model)?;
        self.selection.prune(&self.model);
        Ok(undone)
    }

    pub fn redo(&mut self) -> Result<bool, GraphError> {
        let redone = self.undo.redo(&mut self.model)?;
        self.selection.prune(&self.model);
        Ok(redone)
    }

    // ------------------------------------------------------------------
    // Selection and clipboard
    // ------------------------------------------------------------------

    pub fn select_cells(&mut self, cells: &[CellIndex]) {
        let attached = cells.iter().copied().filter(|&c| self.model.contains(c)).collect();
        self.selection.set_cells(attached);
    }

    pub fn clear_selection(&mut self) {
        self.selection.clear();
    }

    pub fn selection_cells(&self) -> &[CellIndex] {
        self.selection.cells()
    }

    /// Copies the selection. Returns how many top-most cells were copied.
    pub fn copy(&mut self) -> usize {
        let cells = self.selection.cells().to_vec();
        self.clipboard.copy(&self.model, &cells)
    }

    pub fn cut(&mut self) -> Result<usize, GraphError> {
        let cells = self.selection.cells().to_vec();
        let count = self.clipboard.cut(&mut self.model, &cells)?;
        self.selection.prune(&self.model);
        Ok(count)
    }

    /// Pastes into the default parent and selects the pasted cells.
    pub fn paste(&mut self) -> Result<Vec<CellIndex>, GraphError> {
        let cells = self.clipboard.paste(&mut self.model, self.default_parent)?;
        if !cells.is_empty() {
            self.selection.set_cells(cells.clone());
        }
        Ok(cells)
    }

    // ------------------------------------------------------------------
    // View
    // ------------------------------------------------------------------

    pub fn validate(&mut self) -> ValidationReport {
        self.view.validate(&self.model)
    }
}
