//! Derived visual state for a cellgraph model.
//!
//! [`GraphView`] caches one [`CellState`] per displayed cell. Model changes
//! only invalidate states; [`GraphView::validate`] recomputes the stale ones
//! top-down, routes edges through the [`edge_style`] registry and reports
//! routing problems as diagnostics instead of errors. [`Graph`] wires a model,
//! a view, a selection, an undo history and a clipboard together.

pub mod edge_style;
pub mod graph;
pub mod layout;
pub mod state;
pub mod stylesheet;
pub mod view;

pub use edge_style::{EdgeStyle, EdgeStyleRegistry, RouteRequest, RoutingError};
pub use graph::Graph;
pub use layout::{Layout, StackLayout};
pub use state::{CellState, ShapeHandle};
pub use stylesheet::Stylesheet;
pub use view::{Diagnostic, GraphView, ValidationReport, ViewEvent, collect_dirty};

/// Log target used by this crate.
pub const VIEW_TARGET: &str = "cellgraph::view";
