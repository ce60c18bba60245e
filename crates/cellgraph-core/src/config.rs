use crate::geometry::Point;
use serde::{Deserialize, Serialize};

/// Configuration handed to the model, view, selection and undo manager at
/// construction time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub model: ModelConfig,
    pub undo: UndoConfig,
    pub view: ViewConfig,
    pub selection: SelectionConfig,
}

impl GraphConfig {
    /// Restores every section to its default values.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// `prefix + counter + postfix`, the counter starting at 1.
    #[default]
    Sequential,
    /// Random v4 UUIDs.
    Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub id_prefix: String,
    pub id_postfix: String,
    pub id_strategy: IdStrategy,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            id_prefix: String::new(),
            id_postfix: String::new(),
            id_strategy: IdStrategy::Sequential,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UndoConfig {
    /// Maximum number of transactions kept in the history. `0` means unbounded.
    pub capacity: usize,
}

impl Default for UndoConfig {
    fn default() -> Self {
        Self {
            capacity: default_undo_capacity(),
        }
    }
}

fn default_undo_capacity() -> usize {
    100
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub scale: f64,
    pub translate: Point,
    /// Length of the horizontal stubs drawn by the entity-relation edge style.
    pub entity_segment: f64,
    /// Size of the box drawn by the loop edge style.
    pub loop_size: f64,
    /// Edge style used for edges whose source and target are the same cell.
    pub loop_style: String,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            scale: 1.0,
            translate: Point::ORIGIN,
            entity_segment: 30.0,
            loop_size: 20.0,
            loop_style: "loop".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Keep at most one selected cell, replacing it on every addition.
    pub single_selection: bool,
}
