//! Connection rules consulted before an edge's terminals change.

use crate::GraphModel;
use cellgraph_core::{CellIndex, CellValue};

/// Vetoes a prospective connection. `Err` carries the message reported to the
/// caller.
pub trait ConnectionRule {
    fn check(
        &self,
        model: &GraphModel,
        edge: CellIndex,
        source: Option<CellIndex>,
        target: Option<CellIndex>,
    ) -> Result<(), String>;
}

/// Limits how many edges a typed terminal may have and which cell types it
/// may connect to.
///
/// A cell's type is its string value, or the `type` field of an object value.
#[derive(Debug, Clone, PartialEq)]
pub struct Multiplicity {
    /// Whether the rule applies to the source end (otherwise the target end).
    pub source: bool,
    pub type_name: String,
    /// Maximum number of edges on the constrained end; `None` is unbounded.
    pub max: Option<usize>,
    /// Allowed types at the opposite end. Empty allows any.
    pub valid_neighbors: Vec<String>,
    pub count_error: String,
    pub type_error: String,
}

impl Multiplicity {
    pub fn new(source: bool, type_name: impl Into<String>) -> Self {
        let type_name = type_name.into();
        Self {
            source,
            count_error: format!("too many connections for {type_name}"),
            type_error: format!("invalid neighbor for {type_name}"),
            type_name,
            max: None,
            valid_neighbors: Vec::new(),
        }
    }

    pub fn with_max(mut self, max: usize) -> Self {
        self.max = Some(max);
        self
    }

    pub fn with_neighbors<I, S>(mut self, neighbors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.valid_neighbors = neighbors.into_iter().map(Into::into).collect();
        self
    }
}

/// Type name used to match cells against rules.
pub fn cell_type(model: &GraphModel, cell: CellIndex) -> Option<&str> {
    match model.value(cell)? {
        CellValue::String(text) => Some(text),
        CellValue::Object(map) => map.get("type").and_then(CellValue::as_str),
        _ => None,
    }
}

impl ConnectionRule for Multiplicity {
    fn check(
        &self,
        model: &GraphModel,
        edge: CellIndex,
        source: Option<CellIndex>,
        target: Option<CellIndex>,
    ) -> Result<(), String> {
        let (terminal, opposite) = if self.source {
            (source, target)
        } else {
            (target, source)
        };
        let Some(terminal) = terminal else {
            return Ok(());
        };
        if cell_type(model, terminal) != Some(self.type_name.as_str()) {
            return Ok(());
        }

        if let Some(max) = self.max {
            let existing = model
                .edges(terminal)
                .iter()
                .filter(|&&other| {
                    other != edge && model.terminal(other, self.source) == Some(terminal)
                })
                .count();
            if existing + 1 > max {
                return Err(self.count_error.clone());
            }
        }

        if let Some(opposite) = opposite
            && !self.valid_neighbors.is_empty()
        {
            let allowed = cell_type(model, opposite)
                .is_some_and(|ty| self.valid_neighbors.iter().any(|n| n == ty));
            if !allowed {
                return Err(self.type_error.clone());
            }
        }
        Ok(())
    }
}
