use cellgraph_core::{CellIndex, Geometry, GraphError};
use cellgraph_model::GraphModel;
use tracing::debug;

use crate::VIEW_TARGET;

/// Arranges the children of a cell by rewriting their geometries.
///
/// Callers run a layout inside one model transaction, so a whole run is
/// undone in one step.
pub trait Layout {
    fn execute(&self, model: &mut GraphModel, parent: CellIndex) -> Result<(), GraphError>;
}

/// Stacks the visible vertex children of a cell in a row or a column.
#[derive(Debug, Clone, PartialEq)]
pub struct StackLayout {
    pub horizontal: bool,
    /// Gap between neighbouring children.
    pub spacing: f64,
    /// Gap between the parent's edge and the first/last child.
    pub border: f64,
    /// Grow or shrink the parent to fit the stack.
    pub resize_parent: bool,
}

impl Default for StackLayout {
    fn default() -> Self {
        Self {
            horizontal: true,
            spacing: 0.0,
            border: 0.0,
            resize_parent: false,
        }
    }
}

impl StackLayout {
    pub const DEFAULT_SPACING: f64 = 10.0;

    pub fn horizontal(spacing: f64) -> Self {
        Self {
            horizontal: true,
            spacing,
            ..Self::default()
        }
    }

    pub fn vertical(spacing: f64) -> Self {
        Self {
            horizontal: false,
            spacing,
            ..Self::default()
        }
    }

    pub fn with_border(mut self, border: f64) -> Self {
        self.border = border;
        self
    }

    pub fn with_resize_parent(mut self, resize: bool) -> Self {
        self.resize_parent = resize;
        self
    }

    fn stacked_children(model: &GraphModel, parent: CellIndex) -> Vec<CellIndex> {
        model
            .children(parent)
            .iter()
            .copied()
            .filter(|&c| !model.is_edge(c) && model.is_visible(c) && model.geometry(c).is_some())
            .collect()
    }
}

impl Layout for StackLayout {
    fn execute(&self, model: &mut GraphModel, parent: CellIndex) -> Result<(), GraphError> {
        if !model.contains(parent) {
            return Err(GraphError::NotFound(parent));
        }
        let children = Self::stacked_children(model, parent);

        let mut offset = self.border;
        let mut breadth: f64 = 0.0;
        let mut placed = Vec::with_capacity(children.len());
        for (i, &child) in children.iter().enumerate() {
            let Some(current) = model.geometry(child) else {
                continue;
            };
            let mut geo = current.clone();
            if i > 0 {
                offset += self.spacing;
            }
            if self.horizontal {
                geo.x = offset;
                geo.y = self.border;
                offset += geo.width;
                breadth = breadth.max(geo.height);
            } else {
                geo.x = self.border;
                geo.y = offset;
                offset += geo.height;
                breadth = breadth.max(geo.width);
            }
            if &geo != current {
                placed.push((child, geo));
            }
        }

        let resized = if self.resize_parent && !children.is_empty() {
            let mut geo = model.geometry(parent).cloned().unwrap_or_else(Geometry::default);
            let (length, breadth) = (offset + self.border, breadth + 2.0 * self.border);
            if self.horizontal {
                (geo.width, geo.height) = (length, breadth);
            } else {
                (geo.width, geo.height) = (breadth, length);
            }
            (model.geometry(parent) != Some(&geo)).then_some(geo)
        } else {
            None
        };

        debug!(
            target: VIEW_TARGET,
            %parent,
            moved = placed.len(),
            resized = resized.is_some(),
            "stack layout"
        );
        model.batch_update(|model| {
            for (child, geo) in placed {
                model.set_geometry(child, Some(geo))?;
            }
            if let Some(geo) = resized {
                model.set_geometry(parent, Some(geo))?;
            }
            Ok(())
        })
    }
}
