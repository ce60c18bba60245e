use crate::MODEL_TARGET;
use crate::edit::Transaction;
use crate::model::{ChangeOrigin, GraphModel, ModelEvent};
use cellgraph_core::{GraphError, UndoConfig};
use cellgraph_events::{Event, EventEmitter, EventName, EventSource, ListenerId};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use tracing::debug;

#[derive(Debug, Clone)]
pub enum UndoEvent {
    Undo { transaction: Rc<Transaction> },
    Redo { transaction: Rc<Transaction> },
    Clear,
}

impl Event for UndoEvent {
    fn name(&self) -> EventName {
        match self {
            Self::Undo { .. } => EventName::Undo,
            Self::Redo { .. } => EventName::Redo,
            Self::Clear => EventName::Clear,
        }
    }
}

/// A recorded transaction. Replay flips its edits in place.
type Record = Rc<RefCell<Transaction>>;

/// Done/undone stacks shared with the model listener that fills them.
#[derive(Debug, Default)]
struct UndoHistory {
    done: VecDeque<Record>,
    undone: Vec<Record>,
    /// `0` means unbounded.
    capacity: usize,
}

impl UndoHistory {
    fn push(&mut self, transaction: Transaction) {
        self.undone.clear();
        self.done.push_back(Rc::new(RefCell::new(transaction)));
        self.trim();
    }

    fn trim(&mut self) {
        if self.capacity == 0 {
            return;
        }
        while self.done.len() > self.capacity {
            self.done.pop_front();
            debug!(target: MODEL_TARGET, capacity = self.capacity, "evicted oldest undo record");
        }
    }
}

/// Bounded linear undo history fed by a model's `Undoable` events.
#[derive(Debug)]
pub struct UndoManager {
    history: Rc<RefCell<UndoHistory>>,
    events: EventSource<UndoManager, UndoEvent>,
    listener: Option<ListenerId>,
}

impl EventEmitter for UndoManager {
    type Event = UndoEvent;

    fn event_source(&self) -> &EventSource<Self, UndoEvent> {
        &self.events
    }
}

impl UndoManager {
    pub fn new(config: &UndoConfig) -> Self {
        Self {
            history: Rc::new(RefCell::new(UndoHistory {
                capacity: config.capacity,
                ..UndoHistory::default()
            })),
            events: EventSource::new(),
            listener: None,
        }
    }

    /// Starts recording every transaction `model` closes.
    pub fn attach(&mut self, model: &mut GraphModel) {
        self.detach(model);
        let history = Rc::clone(&self.history);
        let id = model.add_listener(EventName::Undoable, move |_, event| {
            if let ModelEvent::Undoable { transaction } = event {
                history.borrow_mut().push(Transaction::clone(transaction));
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
        F: Fn(&mut UndoManager, &UndoEvent) + 'static,
    {
        self.events.add_listener(name, listener)
    }

    pub fn remove_listener(&mut self, id: ListenerId) -> bool {
        self.events.remove_listener(id)
    }

    pub fn can_undo(&self) -> bool {
        !self.history.borrow().done.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.history.borrow().undone.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.history.borrow().done.len()
    }

    pub fn redo_len(&self) -> usize {
        self.history.borrow().undone.len()
    }

    pub fn capacity(&self) -> usize {
        self.history.borrow().capacity
    }

    /// Changes the cap, evicting the oldest records if needed.
    pub fn set_capacity(&mut self, capacity: usize) {
        let mut history = self.history.borrow_mut();
        history.capacity = capacity;
        history.trim();
    }

    /// Records a transaction directly, as the attached listener does.
    pub fn push(&mut self, transaction: Transaction) {
        if !transaction.is_empty() {
            self.history.borrow_mut().push(transaction);
        }
    }

    pub fn clear(&mut self) {
        {
            let mut history = self.history.borrow_mut();
            history.done.clear();
            history.undone.clear();
        }
        self.fire_event(UndoEvent::Clear);
    }

    /// Reverts the most recent transaction. Returns `false` when there is
    /// nothing to undo.
    pub fn undo(&mut self, model: &mut GraphModel) -> Result<bool, GraphError> {
        self.step(model, ChangeOrigin::Undo)
    }

    /// Re-applies the most recently undone transaction.
    pub fn redo(&mut self, model: &mut GraphModel) -> Result<bool, GraphError> {
        self.step(model, ChangeOrigin::Redo)
    }

    fn step(&mut self, model: &mut GraphModel, origin: ChangeOrigin) -> Result<bool, GraphError> {
        if model.is_updating() {
            return Err(GraphError::invalid_state(
                "cannot undo or redo while a transaction is open",
            ));
        }
        let popped = {
            let mut history = self.history.borrow_mut();
            if origin == ChangeOrigin::Undo {
                history.done.pop_back()
            } else {
                history.undone.pop()
            }
        };
        let Some(record) = popped else {
            return Ok(false);
        };

        // The record moves to its new stack before replay fires `Change`, so a
        // listener that records a transaction clears `undone` as usual.
        {
            let mut history = self.history.borrow_mut();
            if origin == ChangeOrigin::Undo {
                history.undone.push(Rc::clone(&record));
            } else {
                history.done.push_back(Rc::clone(&record));
                history.trim();
            }
        }
        let transaction = {
            let mut transaction = record.borrow_mut();
            model.replay(&mut transaction, origin)?;
            transaction.clone()
        };

        debug!(target: MODEL_TARGET, ?origin, edits = transaction.len(), "history step");
        let transaction = Rc::new(transaction);
        let event = if origin == ChangeOrigin::Undo {
            UndoEvent::Undo { transaction }
        } else {
            UndoEvent::Redo { transaction }
        };
        self.fire_event(event);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::NewCell;
    use cellgraph_core::{CellValue, Geometry, GraphConfig};

    fn setup(capacity: usize) -> (GraphModel, UndoManager) {
        let mut model = GraphModel::new(&GraphConfig::default());
        let mut undo = UndoManager::new(&UndoConfig { capacity });
        undo.attach(&mut model);
        (model, undo)
    }

    #[test]
    fn test_undo_redo_value() {
        let (mut model, mut undo) = setup(10);
        let root = model.root();
        let v = model.create_cell(NewCell::vertex("a", Geometry::default()));
        model.add(v, root, None).unwrap();
        model.set_value(v, "b").unwrap();
        assert_eq!(undo.undo_len(), 2);

        assert!(undo.undo(&mut model).unwrap());
        assert_eq!(model.value(v), Some(&CellValue::from("a")));
        assert!(undo.can_redo());

        assert!(undo.redo(&mut model).unwrap());
        assert_eq!(model.value(v), Some(&CellValue::from("b")));
        assert!(!undo.can_redo());
    }

    #[test]
    fn test_new_transaction_clears_redo() {
        let (mut model, mut undo) = setup(10);
        let root = model.root();
        let v = model.create_cell(NewCell::vertex("a", Geometry::default()));
        model.add(v, root, None).unwrap();
        undo.undo(&mut model).unwrap();
        assert_eq!(undo.redo_len(), 1);

        let w = model.create_cell(NewCell::vertex("w", Geometry::default()));
        model.add(w, root, None).unwrap();
        assert_eq!(undo.redo_len(), 0);
        assert!(!undo.redo(&mut model).unwrap());
    }

    #[test]
    fn test_undo_inside_transaction_is_invalid() {
        let (mut model, mut undo) = setup(10);
        model.begin_update();
        assert!(matches!(
            undo.undo(&mut model),
            Err(GraphError::InvalidState(_))
        ));
        model.end_update().unwrap();
        assert!(!undo.undo(&mut model).unwrap());
    }

    #[test]
    fn test_set_capacity_evicts_oldest() {
        let (mut model, mut undo) = setup(0);
        let root = model.root();
        for i in 0..5 {
            let v = model.create_cell(NewCell::vertex(i, Geometry::default()));
            model.add(v, root, None).unwrap();
        }
        assert_eq!(undo.undo_len(), 5);
        undo.set_capacity(2);
        assert_eq!(undo.undo_len(), 2);
    }

    #[test]
    fn test_clear_fires_event_and_detach_stops_recording() {
        let (mut model, mut undo) = setup(10);
        let cleared = Rc::new(RefCell::new(0));
        let count = Rc::clone(&cleared);
        undo.add_listener(EventName::Clear, move |_, _| *count.borrow_mut() += 1);

        let root = model.root();
        let v = model.create_cell(NewCell::vertex("a", Geometry::default()));
        model.add(v, root, None).unwrap();
        undo.clear();
        assert_eq!(*cleared.borrow(), 1);
        assert!(!undo.can_undo());

        undo.detach(&mut model);
        model.set_value(v, "b").unwrap();
        assert!(!undo.can_undo());
    }
}
