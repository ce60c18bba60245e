use crate::GraphModel;
use cellgraph_core::{CellIndex, SelectionConfig};
use cellgraph_events::{Event, EventEmitter, EventName, EventSource, ListenerId};
use crossbeam_channel::Receiver;

#[derive(Debug, Clone, PartialEq)]
pub enum SelectionEvent {
    Change {
        added: Vec<CellIndex>,
        removed: Vec<CellIndex>,
    },
}

impl Event for SelectionEvent {
    fn name(&self) -> EventName {
        EventName::Change
    }
}

/// Self-inverting selection edit. Executing it removes `removed`, adds
/// `added`, then swaps the two lists.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SelectionChange {
    pub added: Vec<CellIndex>,
    pub removed: Vec<CellIndex>,
}

impl SelectionChange {
    pub fn new(added: Vec<CellIndex>, removed: Vec<CellIndex>) -> Self {
        Self { added, removed }
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }

    pub fn execute(&mut self, selection: &mut SelectionModel) {
        selection.cells.retain(|c| !self.removed.contains(c));
        for &cell in &self.added {
            if !selection.cells.contains(&cell) {
                selection.cells.push(cell);
            }
        }
        let (added, removed) = (self.added.clone(), self.removed.clone());
        std::mem::swap(&mut self.added, &mut self.removed);
        selection.fire_event(SelectionEvent::Change { added, removed });
    }
}

/// Ordered set of selected cells; the last one is the primary selection.
#[derive(Debug)]
pub struct SelectionModel {
    cells: Vec<CellIndex>,
    single_selection: bool,
    events: EventSource<SelectionModel, SelectionEvent>,
}

impl Default for SelectionModel {
    fn default() -> Self {
        Self::new(&SelectionConfig::default())
    }
}

impl EventEmitter for SelectionModel {
    type Event = SelectionEvent;

    fn event_source(&self) -> &EventSource<Self, SelectionEvent> {
        &self.events
    }
}

impl SelectionModel {
    pub fn new(config: &SelectionConfig) -> Self {
        Self {
            cells: Vec::new(),
            single_selection: config.single_selection,
            events: EventSource::new(),
        }
    }

    pub fn add_listener<F>(&mut self, listener: F) -> ListenerId
    where
        F: Fn(&mut SelectionModel, &SelectionEvent) + 'static,
    {
        self.events.add_listener(EventName::Change, listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.events.remove_listener(id)
    }

    pub fn subscribe(&mut self) -> (ListenerId, Receiver<SelectionEvent>) {
        self.events.subscribe(Some(EventName::Change))
    }

    pub fn is_single_selection(&self) -> bool {
        self.single_selection
    }

    pub fn set_single_selection(&mut self, single: bool) {
        self.single_selection = single;
        if single && self.cells.len() > 1 {
            let keep = self.cells.last().copied();
            self.set_cells(keep.into_iter().collect());
        }
    }

    pub fn cells(&self) -> &[CellIndex] {
        &self.cells
    }

    pub fn primary(&self) -> Option<CellIndex> {
        self.cells.last().copied()
    }

    pub fn is_selected(&self, cell: CellIndex) -> bool {
        self.cells.contains(&cell)
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Replaces the selection.
    pub fn set_cells(&mut self, cells: Vec<CellIndex>) {
        let mut wanted = dedup(cells);
        if self.single_selection && wanted.len() > 1 {
            wanted = wanted.split_off(wanted.len() - 1);
        }
        let added = wanted
            .iter()
            .copied()
            .filter(|c| !self.cells.contains(c))
            .collect();
        let removed = self
            .cells
            .iter()
            .copied()
            .filter(|c| !wanted.contains(c))
            .collect();
        self.change(SelectionChange::new(added, removed));
    }

    pub fn add_cell(&mut self, cell: CellIndex) {
        self.add_cells(vec![cell]);
    }

    pub fn add_cells(&mut self, cells: Vec<CellIndex>) {
        if self.single_selection {
            self.set_cells(cells.last().copied().into_iter().collect());
            return;
        }
        let added = dedup(cells)
            .into_iter()
            .filter(|c| !self.cells.contains(c))
            .collect();
        self.change(SelectionChange::new(added, Vec::new()));
    }

    pub fn remove_cell(&mut self, cell: CellIndex) {
        self.remove_cells(vec![cell]);
    }

    pub fn remove_cells(&mut self, cells: Vec<CellIndex>) {
        let removed = dedup(cells)
            .into_iter()
            .filter(|c| self.cells.contains(c))
            .collect();
        self.change(SelectionChange::new(Vec::new(), removed));
    }

    pub fn clear(&mut self) {
        let removed = self.cells.clone();
        self.change(SelectionChange::new(Vec::new(), removed));
    }

    pub fn toggle(&mut self, cell: CellIndex) {
        if self.is_selected(cell) {
            self.remove_cell(cell);
        } else {
            self.add_cell(cell);
        }
    }

    /// Drops cells that are no longer attached to `model`.
    pub fn prune(&mut self, model: &GraphModel) {
        let stale = self
            .cells
            .iter()
            .copied()
            .filter(|&c| !model.contains(c))
            .collect();
        self.remove_cells(stale);
    }

    fn change(&mut self, mut change: SelectionChange) {
        if !change.is_empty() {
            change.execute(self);
        }
    }
}

fn dedup(cells: Vec<CellIndex>) -> Vec<CellIndex> {
    let mut out = Vec::with_capacity(cells.len());
    for cell in cells {
        if !out.contains(&cell) {
            out.push(cell);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn c(i: usize) -> CellIndex {
        CellIndex(i)
    }

    #[test]
    fn test_primary_is_last_added() {
        let mut selection = SelectionModel::default();
        selection.add_cells(vec![c(1), c(2)]);
        selection.add_cell(c(3));
        assert_eq!(selection.primary(), Some(c(3)));
        selection.add_cell(c(1));
        assert_eq!(selection.cells(), &[c(1), c(2), c(3)]);
    }

    #[test]
    fn test_one_event_per_operation() {
        let mut selection = SelectionModel::default();
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&log);
        selection.add_listener(move |_, event| sink.borrow_mut().push(event.clone()));

        selection.add_cells(vec![c(1), c(2)]);
        selection.set_cells(vec![c(2), c(3)]);
        selection.add_cell(c(2));
        selection.clear();

        assert_eq!(
            *log.borrow(),
            vec![
                SelectionEvent::Change { added: vec![c(1), c(2)], removed: vec![] },
                SelectionEvent::Change { added: vec![c(3)], removed: vec![c(1)] },
                SelectionEvent::Change { added: vec![], removed: vec![c(2), c(3)] },
            ]
        );
    }

    #[test]
    fn test_selection_change_is_self_inverting() {
        let mut selection = SelectionModel::default();
        selection.add_cell(c(1));
        let mut change = SelectionChange::new(vec![c(2)], vec![c(1)]);
        change.execute(&mut selection);
        assert_eq!(selection.cells(), &[c(2)]);
        change.execute(&mut selection);
        assert_eq!(selection.cells(), &[c(1)]);
    }

    #[test]
    fn test_single_selection_keeps_last() {
        let mut selection = SelectionModel::new(&SelectionConfig {
            single_selection: true,
        });
        selection.add_cells(vec![c(1), c(2)]);
        assert_eq!(selection.cells(), &[c(2)]);
        selection.toggle(c(4));
        assert_eq!(selection.cells(), &[c(4)]);
        selection.toggle(c(4));
        assert!(selection.is_empty());
    }

    #[test]
    fn test_prune_removes_detached_cells() {
        let mut model = GraphModel::default();
        let root = model.root();
        let a = model.create_cell(crate::NewCell::vertex("a", Default::default()));
        let b = model.create_cell(crate::NewCell::vertex("b", Default::default()));
        model.add(a, root, None).unwrap();
        model.add(b, root, None).unwrap();

        let mut selection = SelectionModel::default();
        selection.set_cells(vec![a, b]);
        model.remove(a).unwrap();
        selection.prune(&model);
        assert_eq!(selection.cells(), &[b]);
    }
}
