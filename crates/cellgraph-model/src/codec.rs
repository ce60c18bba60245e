//! Snapshot export and bulk import.
//!
//! A [`GraphSnapshot`] lists cells in pre-order with their ids, attributes and
//! structural relations: enough to rebuild an isomorphic tree. Import adds
//! the cells with the model's regular mutation API inside one transaction.

use crate::GraphModel;
use crate::store::NewCell;
use cellgraph_core::{CellId, CellIndex, CellKind, CellStyle, CellValue, Geometry, GraphError};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("duplicate cell id '{0}' in snapshot")]
    DuplicateId(CellId),
    #[error("parent '{parent}' of cell '{cell}' must appear before it")]
    ParentOrder { cell: CellId, parent: CellId },
    #[error("terminal '{terminal}' of edge '{edge}' is not part of the snapshot")]
    UnknownTerminal { edge: CellId, terminal: CellId },
}

impl From<CodecError> for GraphError {
    fn from(err: CodecError) -> Self {
        GraphError::Codec(err.to_string())
    }
}

fn is_true(value: &bool) -> bool {
    *value
}

fn is_false(value: &bool) -> bool {
    !*value
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellRecord {
    pub id: CellId,
    /// Absent or outside the snapshot: attach to the import target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<CellId>,
    pub kind: CellKind,
    #[serde(default, skip_serializing_if = "CellValue::is_null")]
    pub value: CellValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geometry: Option<Geometry>,
    #[serde(default, skip_serializing_if = "CellStyle::is_empty")]
    pub style: CellStyle,
    #[serde(default, skip_serializing_if = "is_false")]
    pub collapsed: bool,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub visible: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub connectable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<CellId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<CellId>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSnapshot {
    pub cells: Vec<CellRecord>,
}

impl GraphSnapshot {
    pub fn from_json(json: &str) -> Result<Self, CodecError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_pretty(&self) -> Result<String, CodecError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Checks ids, parent ordering and terminal references.
    pub fn validate(&self) -> Result<(), CodecError> {
        let mut seen = HashSet::new();
        let all: HashSet<&CellId> = self.cells.iter().map(|r| &r.id).collect();
        for record in &self.cells {
            if let Some(parent) = &record.parent
                && all.contains(parent)
                && !seen.contains(parent)
            {
                return Err(CodecError::ParentOrder {
                    cell: record.id.clone(),
                    parent: parent.clone(),
                });
            }
            if !seen.insert(&record.id) {
                return Err(CodecError::DuplicateId(record.id.clone()));
            }
        }
        for record in &self.cells {
            for terminal in [&record.source, &record.target].into_iter().flatten() {
                if !all.contains(terminal) {
                    return Err(CodecError::UnknownTerminal {
                        edge: record.id.clone(),
                        terminal: terminal.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Every cell below the root.
pub fn export(model: &GraphModel) -> GraphSnapshot {
    let root = model.root();
    export_cells(model, model.children(root))
}

/// The given cells and their subtrees. Terminals outside the exported set
/// are dropped.
pub fn export_cells(model: &GraphModel, cells: &[CellIndex]) -> GraphSnapshot {
    let mut order = Vec::new();
    for cell in model.topmost_cells(cells) {
        if model.contains(cell) {
            order.extend(model.descendants(Some(cell)));
        }
    }
    let included: HashSet<CellIndex> = order.iter().copied().collect();
    let id_of = |cell: Option<CellIndex>| {
        cell.filter(|c| included.contains(c))
            .and_then(|c| model.id(c).cloned())
    };

    let records = order
        .iter()
        .filter_map(|&index| {
            let cell = model.cell(index)?;
            Some(CellRecord {
                id: cell.id()?.clone(),
                parent: model.parent(index).and_then(|p| model.id(p).cloned()),
                kind: cell.kind(),
                value: cell.value().clone(),
                geometry: cell.geometry().cloned(),
                style: cell.style().clone(),
                collapsed: cell.is_collapsed(),
                visible: cell.is_visible(),
                connectable: cell.is_connectable(),
                source: id_of(cell.terminal(true)),
                target: id_of(cell.terminal(false)),
            })
        })
        .collect();
    GraphSnapshot { cells: records }
}

/// Adds the snapshot's cells under `parent` in one transaction and returns the
/// new top-level cells. Top-level geometries are moved by `(dx, dy)`.
///
/// The snapshot is validated before the model is touched. Ids that collide
/// with attached cells are replaced by fresh ones.
pub fn import(
    model: &mut GraphModel,
    snapshot: &GraphSnapshot,
    parent: CellIndex,
    dx: f64,
    dy: f64,
) -> Result<Vec<CellIndex>, GraphError> {
    snapshot.validate()?;
    if !model.contains(parent) {
        return Err(GraphError::NotFound(parent));
    }

    let mut created: HashMap<&CellId, CellIndex> = HashMap::new();
    let mut placements = Vec::with_capacity(snapshot.len());
    let mut top_level = Vec::new();
    for record in &snapshot.cells {
        let local_parent = record.parent.as_ref().and_then(|p| created.get(p)).copied();
        let mut geometry = record.geometry.clone();
        if local_parent.is_none()
            && let Some(geo) = geometry.as_mut()
        {
            geo.translate(dx, dy);
        }
        let index = model.create_cell(NewCell {
            id: Some(record.id.clone()),
            kind: record.kind,
            value: record.value.clone(),
            geometry,
            style: record.style.clone(),
            collapsed: record.collapsed,
            visible: record.visible,
            connectable: record.connectable,
        });
        created.insert(&record.id, index);
        if local_parent.is_none() {
            top_level.push(index);
        }
        placements.push((index, local_parent.unwrap_or(parent)));
    }

    model.batch_update(|model| {
        for &(cell, cell_parent) in &placements {
            model.add(cell, cell_parent, None)?;
        }
        for record in &snapshot.cells {
            if record.source.is_none() && record.target.is_none() {
                continue;
            }
            let lookup = |id: &CellId| {
                created.get(id).copied().ok_or_else(|| {
                    GraphError::Codec(format!("cell '{id}' was not created"))
                })
            };
            let edge = lookup(&record.id)?;
            let source = record.source.as_ref().map(lookup).transpose()?;
            let target = record.target.as_ref().map(lookup).transpose()?;
            model.set_terminals(edge, source, target)?;
        }
        Ok(top_level)
    })
}

/// Merges the snapshot's cells into `parent` in one transaction and returns
/// the cells standing in for the snapshot's top-level records.
///
/// A record whose id names an attached cell reuses that cell, and its
/// children are merged into it. Other records are cloned under the cell
/// standing in for their parent. Edges are always cloned when
/// `clone_all_edges` is set. Every edge record is then connected to the
/// cells standing in for its terminals, so reused edges are reconnected too.
pub fn merge(
    model: &mut GraphModel,
    snapshot: &GraphSnapshot,
    parent: CellIndex,
    clone_all_edges: bool,
) -> Result<Vec<CellIndex>, GraphError> {
    snapshot.validate()?;
    if !model.contains(parent) {
        return Err(GraphError::NotFound(parent));
    }

    model.batch_update(|model| {
        let mut mapping: HashMap<&CellId, CellIndex> = HashMap::new();
        let mut top_level = Vec::new();
        for record in &snapshot.cells {
            let local_parent = record.parent.as_ref().and_then(|p| mapping.get(p)).copied();
            let reusable = !(clone_all_edges && record.kind.is_edge());
            let existing = model
                .cell_by_id(&record.id)
                .filter(|&cell| reusable && model.kind(cell) == Some(record.kind));
            let index = match existing {
                Some(cell) => cell,
                None => {
                    let cell = model.create_cell(NewCell {
                        id: Some(record.id.clone()),
                        kind: record.kind,
                        value: record.value.clone(),
                        geometry: record.geometry.clone(),
                        style: record.style.clone(),
                        collapsed: record.collapsed,
                        visible: record.visible,
                        connectable: record.connectable,
                    });
                    model.add(cell, local_parent.unwrap_or(parent), None)?
                }
            };
            mapping.insert(&record.id, index);
            if local_parent.is_none() {
                top_level.push(index);
            }
        }

        for record in snapshot.cells.iter().filter(|r| r.kind.is_edge()) {
            if record.source.is_none() && record.target.is_none() {
                continue;
            }
            let lookup = |id: &CellId| {
                mapping.get(id).copied().ok_or_else(|| {
                    GraphError::Codec(format!("cell '{id}' was not merged"))
                })
            };
            let edge = lookup(&record.id)?;
            let source = record.source.as_ref().map(lookup).transpose()?;
            let target = record.target.as_ref().map(lookup).transpose()?;
            model.set_terminals(edge, source, target)?;
        }
        Ok(top_level)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> GraphModel {
        let mut model = GraphModel::default();
        let root = model.root();
        let layer = model.create_cell(NewCell::group().with_id("layer"));
        model.add(layer, root, None).unwrap();
        let a = model.create_cell(
            NewCell::vertex("A", Geometry::new(10.0, 10.0, 80.0, 30.0)).with_id("a"),
        );
        let b = model.create_cell(
            NewCell::vertex("B", Geometry::new(200.0, 10.0, 80.0, 30.0)).with_id("b"),
        );
        model.add(a, layer, None).unwrap();
        model.add(b, layer, None).unwrap();
        let e = model.create_cell(NewCell::edge("").with_id("e"));
        model.add_edge(e, layer, None, Some(a), Some(b)).unwrap();
        model
    }

    #[test]
    fn test_export_shape() {
        let model = sample();
        let snapshot = export(&model);
        let ids: Vec<_> = snapshot.cells.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["layer", "a", "b", "e"]);

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["cells"][0]["parent"], json!("0"));
        assert_eq!(json["cells"][3]["source"], json!("a"));
        assert!(json["cells"][1].get("visible").is_none());
    }

    #[test]
    fn test_import_into_fresh_model_is_isomorphic() {
        let source = sample();
        let snapshot = export(&source);

        let mut target = GraphModel::default();
        let root = target.root();
        let top = import(&mut target, &snapshot, root, 0.0, 0.0).unwrap();
        assert_eq!(top.len(), 1);
        assert_eq!(export(&target), snapshot);
    }

    #[test]
    fn test_export_cells_drops_outside_terminals() {
        let model = sample();
        let a = model.cell_by_id(&CellId::from("a")).unwrap();
        let e = model.cell_by_id(&CellId::from("e")).unwrap();
        let snapshot = export_cells(&model, &[a, e]);
        assert_eq!(snapshot.cells[1].source, Some(CellId::from("a")));
        assert_eq!(snapshot.cells[1].target, None);
    }

    #[test]
    fn test_invalid_snapshot_leaves_model_untouched() {
        let mut model = GraphModel::default();
        let root = model.root();
        let snapshot = GraphSnapshot::from_json(
            r#"{"cells": [
                {"id": "x", "kind": "vertex"},
                {"id": "e", "kind": "edge", "source": "x", "target": "missing"}
            ]}"#,
        )
        .unwrap();
        let err = import(&mut model, &snapshot, root, 0.0, 0.0).unwrap_err();
        assert!(matches!(err, GraphError::Codec(_)));
        assert_eq!(model.child_count(root), 0);

        let dup = GraphSnapshot::from_json(
            r#"{"cells": [{"id": "x", "kind": "vertex"}, {"id": "x", "kind": "vertex"}]}"#,
        )
        .unwrap();
        assert!(matches!(dup.validate(), Err(CodecError::DuplicateId(_))));
    }

    #[test]
    fn test_import_offsets_top_level_and_renames_collisions() {
        let mut model = sample();
        let layer = model.cell_by_id(&CellId::from("layer")).unwrap();
        let a = model.cell_by_id(&CellId::from("a")).unwrap();
        let snapshot = export_cells(&model, &[a]);
        let pasted = import(&mut model, &snapshot, layer, 10.0, 10.0).unwrap();

        assert_eq!(pasted.len(), 1);
        assert_ne!(model.id(pasted[0]), Some(&CellId::from("a")));
        assert_eq!(model.geometry(pasted[0]).map(|g| (g.x, g.y)), Some((20.0, 20.0)));
    }

    fn diagram(vertices: &[&str], edges: &[(&str, &str, &str)]) -> (GraphModel, CellIndex) {
        let mut model = GraphModel::default();
        let root = model.root();
        let layer = model.create_cell(NewCell::group());
        model.add(layer, root, None).unwrap();
        for (i, &id) in vertices.iter().enumerate() {
            let geo = Geometry::new(200.0 * i as f64, 20.0, 40.0, 40.0);
            let v = model.create_cell(NewCell::vertex(id.to_uppercase(), geo).with_id(id));
            model.add(v, layer, None).unwrap();
        }
        for &(id, source, target) in edges {
            let source = model.cell_by_id(&CellId::from(source));
            let target = model.cell_by_id(&CellId::from(target));
            let e = model.create_cell(NewCell::edge(id).with_id(id));
            model.add_edge(e, layer, None, source, target).unwrap();
        }
        (model, layer)
    }

    fn ends(model: &GraphModel, edge: CellIndex) -> (Option<&CellId>, Option<&CellId>) {
        let id = |cell: Option<CellIndex>| cell.and_then(|c| model.id(c));
        (id(model.terminal(edge, true)), id(model.terminal(edge, false)))
    }

    fn by_id(model: &GraphModel, id: &str) -> CellIndex {
        model.cell_by_id(&CellId::from(id)).unwrap()
    }

    #[test]
    fn test_merge_reuses_shared_ids_and_reconnects_edges() {
        let (mut model, layer) = diagram(
            &["a", "b", "c", "d"],
            &[("ac", "a", "c"), ("ad", "a", "d"), ("bd", "b", "d")],
        );
        let (other, other_layer) = diagram(
            &["c", "d", "e", "f"],
            &[("ce", "c", "e"), ("ed", "e", "d"), ("bd", "f", "d")],
        );
        let c = by_id(&model, "c");
        let d = by_id(&model, "d");
        let (_, rx) = model.subscribe(Some(cellgraph_events::EventName::Change));

        let merged = model
            .merge_children(&other, other_layer, layer, true)
            .unwrap();
        assert_eq!(rx.try_iter().count(), 1);
        assert_eq!(merged.len(), 7);
        assert_eq!(&merged[..2], &[c, d]);
        assert_eq!(model.child_count(layer), 7 + 5);

        let e = by_id(&model, "e");
        let f = by_id(&model, "f");
        assert_eq!(&merged[2..4], &[e, f]);
        assert_eq!(model.parent(f), Some(layer));

        let id = |s: &str| CellId::from(s);
        assert_eq!(ends(&model, by_id(&model, "ce")), (Some(&id("c")), Some(&id("e"))));
        assert_eq!(ends(&model, by_id(&model, "ed")), (Some(&id("e")), Some(&id("d"))));
        // The incoming "bd" is cloned under a fresh id; the existing one keeps
        // its terminals.
        assert_ne!(model.id(merged[6]), Some(&id("bd")));
        assert_eq!(ends(&model, merged[6]), (Some(&id("f")), Some(&id("d"))));
        assert_eq!(ends(&model, by_id(&model, "bd")), (Some(&id("b")), Some(&id("d"))));
        assert_eq!(model.edge_count(d), 4);
    }

    #[test]
    fn test_merge_without_edge_cloning_moves_shared_edges() {
        let (mut model, layer) = diagram(&["b", "d"], &[("bd", "b", "d")]);
        let (other, other_layer) = diagram(&["d", "f"], &[("bd", "f", "d")]);
        let bd = by_id(&model, "bd");
        let b = by_id(&model, "b");

        model
            .merge_children(&other, other_layer, layer, false)
            .unwrap();
        assert_eq!(model.child_count(layer), 4);
        let f = by_id(&model, "f");
        assert_eq!(model.terminal(bd, true), Some(f));
        assert_eq!(model.edge_count(b), 0);
    }

    #[test]
    fn test_merge_into_detached_parent_is_not_found() {
        let (mut model, _) = diagram(&["a"], &[]);
        let (other, other_layer) = diagram(&["b"], &[]);
        let detached = model.create_cell(NewCell::group());
        assert_eq!(
            model.merge_children(&other, other_layer, detached, true),
            Err(GraphError::NotFound(detached))
        );
    }
}
