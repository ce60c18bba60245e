use crate::GraphModel;
use crate::codec::{self, GraphSnapshot};
use cellgraph_core::{CellIndex, GraphError};

/// Offset between consecutive pastes, in graph units.
pub const STEP_SIZE: f64 = 10.0;

/// Copy/cut/paste buffer holding a detached snapshot of cells.
#[derive(Debug, Clone, Default)]
pub struct Clipboard {
    contents: Option<GraphSnapshot>,
    insert_count: usize,
}

impl Clipboard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.contents.as_ref().is_none_or(GraphSnapshot::is_empty)
    }

    pub fn contents(&self) -> Option<&GraphSnapshot> {
        self.contents.as_ref()
    }

    /// Copies the top-most of `cells` and returns how many were taken.
    pub fn copy(&mut self, model: &GraphModel, cells: &[CellIndex]) -> usize {
        let topmost: Vec<_> = model
            .topmost_cells(cells)
            .into_iter()
            .filter(|&c| model.contains(c))
            .collect();
        self.contents = Some(codec::export_cells(model, &topmost));
        self.insert_count = 1;
        topmost.len()
    }

    /// Copies and then removes the cells in one transaction. The first paste
    /// lands at the original position.
    pub fn cut(&mut self, model: &mut GraphModel, cells: &[CellIndex]) -> Result<usize, GraphError> {
        let count = self.copy(model, cells);
        let topmost = model.topmost_cells(cells);
        model.batch_update(|model| -> Result<(), GraphError> {
            for &c in &topmost {
                if model.contains(c) {
                    model.remove(c)?;
                }
            }
            Ok(())
        })?;
        self.insert_count = 0;
        Ok(count)
    }

    /// Inserts the clipboard contents under `parent`, shifted by
    /// `insert_count * STEP_SIZE` on both axes.
    pub fn paste(
        &mut self,
        model: &mut GraphModel,
        parent: CellIndex,
    ) -> Result<Vec<CellIndex>, GraphError> {
        let Some(snapshot) = &self.contents else {
            return Ok(Vec::new());
        };
        let offset = self.insert_count as f64 * STEP_SIZE;
        let cells = codec::import(model, snapshot, parent, offset, offset)?;
        self.insert_count += 1;
        Ok(cells)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewCell;
    use cellgraph_core::Geometry;

    fn setup() -> (GraphModel, CellIndex, CellIndex) {
        let mut model = GraphModel::default();
        let root = model.root();
        let v = model.create_cell(NewCell::vertex("v", Geometry::new(5.0, 5.0, 20.0, 20.0)));
        model.add(v, root, None).unwrap();
        (model, root, v)
    }

    #[test]
    fn test_paste_offsets_accumulate() {
        let (mut model, root, v) = setup();
        let mut clipboard = Clipboard::new();
        assert!(clipboard.paste(&mut model, root).unwrap().is_empty());

        assert_eq!(clipboard.copy(&model, &[v]), 1);
        let first = clipboard.paste(&mut model, root).unwrap();
        let second = clipboard.paste(&mut model, root).unwrap();
        assert_eq!(model.geometry(first[0]).map(|g| g.x), Some(15.0));
        assert_eq!(model.geometry(second[0]).map(|g| g.x), Some(25.0));
        assert_eq!(model.child_count(root), 3);
    }

    #[test]
    fn test_cut_then_paste_restores_position() {
        let (mut model, root, v) = setup();
        let mut clipboard = Clipboard::new();
        clipboard.cut(&mut model, &[v]).unwrap();
        assert!(!model.contains(v));

        let pasted = clipboard.paste(&mut model, root).unwrap();
        assert_eq!(model.geometry(pasted[0]).map(|g| (g.x, g.y)), Some((5.0, 5.0)));
        assert!(!clipboard.is_empty());
    }

    #[test]
    fn test_cut_nested_selection_is_one_transaction() {
        let (mut model, root, v) = setup();
        let inner = model.create_cell(NewCell::vertex("in", Geometry::new(1.0, 1.0, 5.0, 5.0)));
        model.add(inner, v, None).unwrap();
        let (_, rx) = model.subscribe(Some(cellgraph_events::EventName::Change));

        let mut clipboard = Clipboard::new();
        assert_eq!(clipboard.cut(&mut model, &[inner, v]).unwrap(), 1);
        assert_eq!(rx.try_iter().count(), 1);
        assert!(!model.contains(v) && !model.contains(inner));
        assert_eq!(model.child_count(root), 0);
    }
}
