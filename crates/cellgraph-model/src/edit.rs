//! Self-inverting edits.
//!
//! Every edit stores the value it will apply next in `previous`. Executing it
//! applies `previous`, remembers what was overwritten, and swaps the two, so
//! running the same edit again restores the earlier state. Undo and redo are
//! therefore the same operation; only the order across a transaction differs.

use crate::GraphModel;
use cellgraph_core::{CellIndex, CellStyle, CellValue, Geometry, GraphError};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Structural change: moves `child` under `previous` at `previous_index`, or
/// detaches it when `previous` is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChildChange {
    pub child: CellIndex,
    /// Parent after the last execution.
    pub parent: Option<CellIndex>,
    pub index: Option<usize>,
    /// Parent the next execution moves the child to.
    pub previous: Option<CellIndex>,
    /// `None` appends.
    pub previous_index: Option<usize>,
}

impl ChildChange {
    pub fn new(child: CellIndex, parent: Option<CellIndex>, index: Option<usize>) -> Self {
        Self {
            child,
            parent,
            index,
            previous: parent,
            previous_index: index,
        }
    }

    fn execute(&mut self, model: &mut GraphModel) -> Result<(), GraphError> {
        let (old_parent, old_index) =
            model.parent_for_cell_changed(self.child, self.previous, self.previous_index)?;
        self.parent = self.previous;
        self.index = self.previous_index;
        self.previous = old_parent;
        self.previous_index = old_index;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TerminalChange {
    pub edge: CellIndex,
    pub is_source: bool,
    pub terminal: Option<CellIndex>,
    pub previous: Option<CellIndex>,
}

impl TerminalChange {
    pub fn new(edge: CellIndex, terminal: Option<CellIndex>, is_source: bool) -> Self {
        Self {
            edge,
            is_source,
            terminal,
            previous: terminal,
        }
    }

    fn execute(&mut self, model: &mut GraphModel) -> Result<(), GraphError> {
        let old = model.terminal_for_cell_changed(self.edge, self.previous, self.is_source)?;
        self.terminal = self.previous;
        self.previous = old;
        Ok(())
    }
}

/// Single-field change of one cell.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeChange<T> {
    pub cell: CellIndex,
    /// Value applied by the last execution.
    pub current: T,
    /// Value applied by the next execution.
    pub previous: T,
}

type Setter<T> = fn(&mut GraphModel, CellIndex, T) -> Result<T, GraphError>;

impl<T: Clone> AttributeChange<T> {
    pub fn new(cell: CellIndex, value: T) -> Self {
        Self {
            cell,
            current: value.clone(),
            previous: value,
        }
    }

    fn execute(&mut self, model: &mut GraphModel, setter: Setter<T>) -> Result<(), GraphError> {
        let old = setter(model, self.cell, self.previous.clone())?;
        self.current = std::mem::replace(&mut self.previous, old);
        Ok(())
    }
}

/// Edit types defined outside this crate.
///
/// `execute` must be self-inverting in the same way as the built-in edits and
/// may only mutate the model through its unrecorded `*_changed` setters.
pub trait CustomEdit {
    fn execute(&mut self, model: &mut GraphModel) -> Result<(), GraphError>;

    /// Cells whose derived state depends on this edit.
    fn affected_cells(&self) -> Vec<CellIndex>;

    fn description(&self) -> String {
        "custom edit".to_string()
    }
}

#[derive(Clone)]
pub struct CustomChange(pub Rc<RefCell<dyn CustomEdit>>);

impl CustomChange {
    pub fn new(edit: impl CustomEdit + 'static) -> Self {
        Self(Rc::new(RefCell::new(edit)))
    }

    pub fn affected_cells(&self) -> Vec<CellIndex> {
        self.0.borrow().affected_cells()
    }
}

impl fmt::Debug for CustomChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CustomChange")
            .field(&self.0.borrow().description())
            .finish()
    }
}

impl PartialEq for CustomChange {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum UndoableEdit {
    Child(ChildChange),
    Terminal(TerminalChange),
    Value(AttributeChange<CellValue>),
    Style(AttributeChange<CellStyle>),
    Geometry(AttributeChange<Option<Geometry>>),
    Collapsed(AttributeChange<bool>),
    Visible(AttributeChange<bool>),
    Custom(CustomChange),
}

impl UndoableEdit {
    pub fn execute(&mut self, model: &mut GraphModel) -> Result<(), GraphError> {
        match self {
            Self::Child(change) => change.execute(model),
            Self::Terminal(change) => change.execute(model),
            Self::Value(change) => change.execute(model, GraphModel::value_for_cell_changed),
            Self::Style(change) => change.execute(model, GraphModel::style_for_cell_changed),
            Self::Geometry(change) => change.execute(model, GraphModel::geometry_for_cell_changed),
            Self::Collapsed(change) => {
                change.execute(model, GraphModel::collapsed_state_for_cell_changed)
            }
            Self::Visible(change) => {
                change.execute(model, GraphModel::visible_state_for_cell_changed)
            }
            Self::Custom(change) => change.0.borrow_mut().execute(model),
        }
    }

    /// The cell this edit targets first (the child, edge or attributed cell).
    pub fn primary_cell(&self) -> Option<CellIndex> {
        match self {
            Self::Child(c) => Some(c.child),
            Self::Terminal(c) => Some(c.edge),
            Self::Value(c) => Some(c.cell),
            Self::Style(c) => Some(c.cell),
            Self::Geometry(c) => Some(c.cell),
            Self::Collapsed(c) => Some(c.cell),
            Self::Visible(c) => Some(c.cell),
            Self::Custom(c) => c.affected_cells().first().copied(),
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Child(_) => "child",
            Self::Terminal(_) => "terminal",
            Self::Value(_) => "value",
            Self::Style(_) => "style",
            Self::Geometry(_) => "geometry",
            Self::Collapsed(_) => "collapsed",
            Self::Visible(_) => "visible",
            Self::Custom(_) => "custom",
        }
    }
}

/// Ordered edits closed by one outermost `end_update`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transaction {
    pub edits: Vec<UndoableEdit>,
}

impl Transaction {
    pub fn new(edits: Vec<UndoableEdit>) -> Self {
        Self { edits }
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UndoableEdit> {
        self.edits.iter()
    }
}
