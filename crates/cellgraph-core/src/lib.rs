use serde::{Deserialize, Serialize};
use std::fmt;

pub mod config;
pub mod error;
pub mod geometry;
pub mod style;

pub use config::{GraphConfig, IdStrategy, ModelConfig, SelectionConfig, UndoConfig, ViewConfig};
pub use error::GraphError;
pub use geometry::{Geometry, Point, Rect};
pub use style::{CellStyle, NONE, StyleMap, StyleValue};

/// Opaque user payload carried by a cell.
pub type CellValue = serde_json::Value;

/// Arena handle of a cell inside one cell store.
///
/// Handles stay valid for the lifetime of the store, including while the cell
/// is detached from the tree (an undo record may re-attach it later).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CellIndex(pub usize);

impl fmt::Display for CellIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Caller-visible identifier of a cell, unique among attached cells.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CellId(pub String);

impl CellId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CellId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for CellId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Capability set of a cell.
///
/// Groups are pure containers (the root and layers); vertices are drawable
/// boxes that may also contain children; edges connect two terminals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CellKind {
    Vertex,
    Edge,
    #[default]
    Group,
}

impl CellKind {
    pub fn is_vertex(self) -> bool {
        matches!(self, CellKind::Vertex)
    }

    pub fn is_edge(self) -> bool {
        matches!(self, CellKind::Edge)
    }

    pub fn is_group(self) -> bool {
        matches!(self, CellKind::Group)
    }
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => write!(f, "vertex"),
            Self::Edge => write!(f, "edge"),
            Self::Group => write!(f, "group"),
        }
    }
}

/// Converts a cell value into the text a label painter displays.
pub fn value_to_label(value: &CellValue) -> String {
    match value {
        CellValue::Null => String::new(),
        CellValue::String(text) => text.clone(),
        CellValue::Object(map) => map
            .get("label")
            .map(value_to_label)
            .unwrap_or_else(|| value.to_string()),
        other => other.to_string(),
    }
}
