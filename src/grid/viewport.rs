//! A client's window onto a grid.

use super::node::{NodePath, NodeTree};
use super::structure::GridStructure;
use crate::error::{AnalyticsError, Result};
use crate::services::ResultsCache;
use crate::types::{CellSelection, GridLayout, ViewportDefinition, ViewportResults, ViewportState};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;

/// Subscribed region of a grid.
///
/// Keeps the last materialized results so reads never touch the cache, and
/// the node paths the client has expanded so they survive structure changes.
pub struct Viewport<S> {
    structure: Arc<S>,
    tree: NodeTree,
    expanded: BTreeSet<NodePath>,
    definition: ViewportDefinition,
    callback_id: String,
    structure_callback_id: String,
    latest: Arc<ViewportResults>,
    state: ViewportState,
    last_read: u64,
}

impl<S: GridStructure> Viewport<S> {
    /// Validate the definition and populate from the cache. Every tree node
    /// starts expanded.
    pub fn new(
        structure: Arc<S>,
        definition: ViewportDefinition,
        callback_id: &str,
        structure_callback_id: &str,
        cache: &ResultsCache,
    ) -> Result<Self> {
        validate(structure.as_ref(), &definition)?;
        let expanded = structure.tree().all_paths();
        let tree = structure.tree().with_expanded(&expanded);
        let mut viewport = Self {
            structure,
            tree,
            expanded,
            latest: Arc::new(ViewportResults::empty(definition.version)),
            definition,
            callback_id: callback_id.to_string(),
            structure_callback_id: structure_callback_id.to_string(),
            state: ViewportState::Empty,
            last_read: 0,
        };
        viewport.render(cache, 0);
        Ok(viewport)
    }

    /// Replace the definition. A single node expanded or collapsed by the
    /// client is recorded in the viewport's expanded paths.
    pub fn update(&mut self, definition: ViewportDefinition, cache: &ResultsCache) -> Result<ViewportState> {
        validate(self.structure.as_ref(), &definition)?;
        if let Some(changed) = definition.changed_node(&self.definition) {
            if let Some(node) = self.tree.node_at_row(changed.row) {
                let path = node.path.clone();
                debug!("Node at row {} expanded={}", changed.row, changed.expanded);
                if changed.expanded {
                    self.expanded.insert(path);
                } else {
                    self.expanded.remove(&path);
                }
                self.tree = self.structure.tree().with_expanded(&self.expanded);
            }
        }
        self.definition = definition;
        Ok(self.render(cache, 0))
    }

    /// Re-render after new data. Fresh if any visible cell changed since the
    /// previous read.
    pub fn refresh(&mut self, cache: &ResultsCache) -> ViewportState {
        let since = self.last_read;
        self.render(cache, since)
    }

    /// Move onto a rebuilt structure. Expanded paths are reapplied, nodes that
    /// are new to the viewport start collapsed and cells that no longer exist
    /// are dropped.
    pub fn migrate(&mut self, structure: Arc<S>, cache: &ResultsCache) -> ViewportState {
        self.definition = clamp(&self.definition, structure.row_count(), structure.column_count());
        self.tree = structure.tree().with_expanded(&self.expanded);
        self.structure = structure;
        self.render(cache, 0)
    }

    fn render(&mut self, cache: &ResultsCache, since: u64) -> ViewportState {
        let definition = &self.definition;
        let mut fresh = false;
        let cells = definition
            .cells()
            .into_iter()
            .map(|cell| {
                let rendered = self
                    .structure
                    .render(cell, cache, definition.format, definition.enable_logging);
                fresh |= rendered.last_changed > since;
                rendered.cell
            })
            .collect();

        self.latest = Arc::new(ViewportResults {
            version: definition.version,
            format: definition.format,
            cells,
        });
        self.last_read = cache.update_id();
        self.state = if fresh {
            ViewportState::FreshData
        } else {
            ViewportState::Empty
        };
        self.state
    }

    pub fn results(&self) -> Arc<ViewportResults> {
        Arc::clone(&self.latest)
    }

    pub fn state(&self) -> ViewportState {
        self.state
    }

    pub fn definition(&self) -> &ViewportDefinition {
        &self.definition
    }

    pub fn callback_id(&self) -> &str {
        &self.callback_id
    }

    pub fn structure_callback_id(&self) -> &str {
        &self.structure_callback_id
    }

    pub fn expanded_paths(&self) -> &BTreeSet<NodePath> {
        &self.expanded
    }

    /// Grid layout with this viewport's expanded/collapsed flags.
    pub fn layout(&self) -> GridLayout {
        GridLayout {
            root: self.tree.to_layout(),
            ..self.structure.layout()
        }
    }
}

fn validate<S: GridStructure>(structure: &S, definition: &ViewportDefinition) -> Result<()> {
    match definition
        .cells()
        .into_iter()
        .find(|&cell| !structure.contains(cell))
    {
        Some(cell) => Err(AnalyticsError::InvalidViewport {
            row: cell.row,
            col: cell.col,
            rows: structure.row_count(),
            cols: structure.column_count(),
        }),
        None => Ok(()),
    }
}

fn clamp(definition: &ViewportDefinition, rows: usize, cols: usize) -> ViewportDefinition {
    let selection = match &definition.selection {
        CellSelection::Rectangular { rows: r, columns: c } => CellSelection::Rectangular {
            rows: r.iter().copied().filter(|&row| row < rows).collect(),
            columns: c.iter().copied().filter(|&col| col < cols).collect(),
        },
        CellSelection::Arbitrary { cells } => CellSelection::Arbitrary {
            cells: cells
                .iter()
                .copied()
                .filter(|c| c.row < rows && c.col < cols)
                .collect(),
        },
    };
    ViewportDefinition {
        selection,
        ..definition.clone()
    }
}
