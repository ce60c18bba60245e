use cellgraph_core::{CellKind, CellStyle, StyleMap, StyleValue};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::VIEW_TARGET;

pub const DEFAULT_VERTEX: &str = "defaultVertex";
pub const DEFAULT_EDGE: &str = "defaultEdge";

/// Named style entries plus the defaults applied to every vertex and edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stylesheet {
    styles: HashMap<String, StyleMap>,
}

impl Default for Stylesheet {
    fn default() -> Self {
        let mut sheet = Self {
            styles: HashMap::new(),
        };
        sheet.put_cell_style(DEFAULT_VERTEX, default_vertex_style());
        sheet.put_cell_style(DEFAULT_EDGE, default_edge_style());
        sheet
    }
}

fn style_map<const N: usize>(entries: [(&str, &str); N]) -> StyleMap {
    entries
        .into_iter()
        .map(|(k, v)| (k.to_string(), StyleValue::from(v)))
        .collect()
}

fn default_vertex_style() -> StyleMap {
    style_map([
        ("shape", "rectangle"),
        ("perimeter", "rectanglePerimeter"),
        ("verticalAlign", "middle"),
        ("align", "center"),
        ("fillColor", "#C3D9FF"),
        ("strokeColor", "#6482B9"),
        ("fontColor", "#774400"),
    ])
}

fn default_edge_style() -> StyleMap {
    style_map([
        ("shape", "connector"),
        ("endArrow", "classic"),
        ("verticalAlign", "middle"),
        ("align", "center"),
        ("strokeColor", "#6482B9"),
        ("fontColor", "#446299"),
    ])
}

impl Stylesheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_cell_style(&mut self, name: impl Into<String>, style: StyleMap) {
        self.styles.insert(name.into(), style);
    }

    pub fn cell_style(&self, name: &str) -> Option<&StyleMap> {
        self.styles.get(name)
    }

    pub fn default_vertex_style(&self) -> Option<&StyleMap> {
        self.cell_style(DEFAULT_VERTEX)
    }

    pub fn default_edge_style(&self) -> Option<&StyleMap> {
        self.cell_style(DEFAULT_EDGE)
    }

    /// Flattens a cell's style: the default for its kind, then each named
    /// base style left to right, then the inline properties. Inline `"none"`
    /// values keep whatever was inherited.
    pub fn resolve(&self, kind: CellKind, style: &CellStyle) -> StyleMap {
        let default = if kind.is_edge() {
            self.default_edge_style()
        } else {
            self.default_vertex_style()
        };
        let mut resolved = default.cloned().unwrap_or_default();
        for name in &style.base_style_names {
            match self.cell_style(name) {
                Some(base) => resolved.extend(base.iter().map(|(k, v)| (k.clone(), v.clone()))),
                None => debug!(target: VIEW_TARGET, style = %name, "unknown base style"),
            }
        }
        for (key, value) in &style.properties {
            if !value.is_none() {
                resolved.insert(key.clone(), value.clone());
            }
        }
        resolved
    }
}
