use crate::{CellId, CellIndex};
use thiserror::Error;

/// Failures surfaced by the cell store, the model and their managers.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// Cyclic parenting, self-ancestry, detaching the root, or attaching a
    /// cell that is still attached elsewhere. Nothing was mutated.
    #[error("structural violation: {0}")]
    StructuralViolation(String),
    /// The cell is not attached to the tree (or does not exist at all).
    #[error("cell {0} not found")]
    NotFound(CellIndex),
    #[error("no cell with id '{0}'")]
    UnknownId(CellId),
    /// Programmer error, e.g. `end_update` without a matching `begin_update`.
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// A connection rule vetoed a terminal assignment.
    #[error("connection rejected: {0}")]
    ConnectionRejected(String),
    #[error("codec error: {0}")]
    Codec(String),
}

impl GraphError {
    pub fn structural(message: impl Into<String>) -> Self {
        Self::StructuralViolation(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }
}
