//! Transactional cell graph.
//!
//! [`GraphModel`] owns a [`CellStore`] and applies every change as a
//! self-inverting [`UndoableEdit`] grouped into transactions. The
//! [`UndoManager`] and [`SelectionModel`] sit next to it; the codec and
//! clipboard are plain clients of the model's public API.

pub mod clipboard;
pub mod codec;
pub mod edit;
pub mod model;
pub mod multiplicity;
pub mod selection;
pub mod store;
pub mod undo;

pub use clipboard::Clipboard;
pub use codec::{CellRecord, CodecError, GraphSnapshot};
pub use edit::{
    AttributeChange, ChildChange, CustomChange, CustomEdit, TerminalChange, Transaction,
    UndoableEdit,
};
pub use model::{ChangeOrigin, GraphModel, ModelEvent, UpdateGuard};
pub use multiplicity::{ConnectionRule, Multiplicity};
pub use selection::{SelectionChange, SelectionEvent, SelectionModel};
pub use store::{Cell, CellStore, NewCell, ROOT_ID};
pub use undo::{UndoEvent, UndoManager};

/// Log target used by this crate.
pub const MODEL_TARGET: &str = "cellgraph::model";
