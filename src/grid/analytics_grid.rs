//! Grids own their structure and viewports and publish viewport results.

use super::depgraph::DependencyGraphGridStructure;
use super::structure::{GridStructure, MainGridStructure};
use super::viewport::Viewport;
use crate::error::{AnalyticsError, Result};
use crate::services::{FunctionNames, ResultsCache};
use crate::types::{
    EmptyViewCycle, GraphSource, GridLayout, GridRef, GridType, ViewCycle, ViewportDefinition, ViewportKey,
    ViewportResults, ViewportState,
};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, warn};

// =============================================================================
// Published results
// =============================================================================

/// Latest results of every live viewport, shared with lock-free readers.
///
/// Writers replace whole `Arc<ViewportResults>` snapshots; a deleted
/// viewport is unpublished so stale results are never served.
#[derive(Clone, Default)]
pub struct ResultsBoard {
    results: Arc<DashMap<ViewportKey, Arc<ViewportResults>>>,
}

impl ResultsBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, key: ViewportKey, results: Arc<ViewportResults>) {
        self.results.insert(key, results);
    }

    pub fn unpublish(&self, key: &ViewportKey) {
        self.results.remove(key);
    }

    /// Remove every viewport of a grid.
    pub fn unpublish_grid(&self, grid: &GridRef) {
        self.results.retain(|key, _| &key.grid != grid);
    }

    pub fn get(&self, key: &ViewportKey) -> Result<Arc<ViewportResults>> {
        self.results
            .get(key)
            .map(|r| Arc::clone(r.value()))
            .ok_or_else(|| AnalyticsError::viewport_not_found(key.viewport_id))
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

// =============================================================================
// Generic grid
// =============================================================================

/// A grid structure plus the viewports clients have opened on it.
pub struct AnalyticsGrid<S> {
    grid: GridRef,
    callback_id: String,
    structure: Arc<S>,
    viewports: BTreeMap<i32, Viewport<S>>,
    board: ResultsBoard,
}

impl<S: GridStructure> AnalyticsGrid<S> {
    pub fn new(grid: GridRef, callback_id: &str, structure: Arc<S>, board: ResultsBoard) -> Self {
        Self {
            grid,
            callback_id: callback_id.to_string(),
            structure,
            viewports: BTreeMap::new(),
            board,
        }
    }

    pub fn grid_ref(&self) -> GridRef {
        self.grid
    }

    /// ID notified when the grid's rows or columns change.
    pub fn callback_id(&self) -> &str {
        &self.callback_id
    }

    pub fn structure(&self) -> &Arc<S> {
        &self.structure
    }

    fn key(&self, viewport_id: i32) -> ViewportKey {
        ViewportKey::new(self.grid, viewport_id)
    }

    fn publish(&self, viewport_id: i32, viewport: &Viewport<S>) {
        self.board.publish(self.key(viewport_id), viewport.results());
    }

    /// Returns true if the new viewport already has data.
    pub fn create_viewport(
        &mut self,
        viewport_id: i32,
        callback_id: &str,
        structure_callback_id: &str,
        definition: ViewportDefinition,
        cache: &ResultsCache,
    ) -> Result<bool> {
        if self.viewports.contains_key(&viewport_id) {
            return Err(AnalyticsError::DuplicateId {
                kind: "Viewport",
                id: viewport_id,
            });
        }
        let viewport = Viewport::new(
            Arc::clone(&self.structure),
            definition,
            callback_id,
            structure_callback_id,
            cache,
        )?;
        let has_data = viewport.state() == ViewportState::FreshData;
        self.publish(viewport_id, &viewport);
        self.viewports.insert(viewport_id, viewport);
        Ok(has_data)
    }

    /// Returns the viewport's callback ID if it has data after the update.
    pub fn update_viewport(
        &mut self,
        viewport_id: i32,
        definition: ViewportDefinition,
        cache: &ResultsCache,
    ) -> Result<Option<String>> {
        let viewport = self
            .viewports
            .get_mut(&viewport_id)
            .ok_or_else(|| AnalyticsError::viewport_not_found(viewport_id))?;
        let state = viewport.update(definition, cache)?;
        let callback_id = (state == ViewportState::FreshData).then(|| viewport.callback_id().to_string());
        self.board
            .publish(ViewportKey::new(self.grid, viewport_id), viewport.results());
        Ok(callback_id)
    }

    pub fn delete_viewport(&mut self, viewport_id: i32) -> Result<()> {
        self.viewports
            .remove(&viewport_id)
            .ok_or_else(|| AnalyticsError::viewport_not_found(viewport_id))?;
        self.board.unpublish(&self.key(viewport_id));
        Ok(())
    }

    pub fn viewport(&self, viewport_id: i32) -> Result<&Viewport<S>> {
        self.viewports
            .get(&viewport_id)
            .ok_or_else(|| AnalyticsError::viewport_not_found(viewport_id))
    }

    pub fn data(&self, viewport_id: i32) -> Result<Arc<ViewportResults>> {
        self.viewport(viewport_id).map(Viewport::results)
    }

    pub fn viewport_layout(&self, viewport_id: i32) -> Result<GridLayout> {
        self.viewport(viewport_id).map(Viewport::layout)
    }

    pub fn viewport_ids(&self) -> Vec<i32> {
        self.viewports.keys().copied().collect()
    }

    /// Refresh every viewport and return the callback IDs of those with fresh data.
    pub fn refresh(&mut self, cache: &ResultsCache) -> Vec<String> {
        let mut fresh = Vec::new();
        for (&id, viewport) in self.viewports.iter_mut() {
            if viewport.refresh(cache) == ViewportState::FreshData {
                fresh.push(viewport.callback_id().to_string());
            }
            self.board
                .publish(ViewportKey::new(self.grid, id), viewport.results());
        }
        fresh
    }

    /// Install a rebuilt structure and move every viewport onto it.
    pub fn set_structure(&mut self, structure: Arc<S>, cache: &ResultsCache) {
        if Arc::ptr_eq(&self.structure, &structure) {
            return;
        }
        self.structure = structure;
        for (&id, viewport) in self.viewports.iter_mut() {
            viewport.migrate(Arc::clone(&self.structure), cache);
            self.board
                .publish(ViewportKey::new(self.grid, id), viewport.results());
        }
    }

    /// Grid callback ID plus data and structure callback IDs of every viewport.
    pub fn callback_ids(&self) -> Vec<String> {
        let mut ids = vec![self.callback_id.clone()];
        for viewport in self.viewports.values() {
            ids.push(viewport.callback_id().to_string());
            ids.push(viewport.structure_callback_id().to_string());
        }
        ids
    }

    /// Remove every viewport from the board.
    pub fn unpublish_all(&self) {
        self.board.unpublish_grid(&self.grid);
    }
}

/// Grid showing the calculation steps behind one value.
pub type DependencyGraphGrid = AnalyticsGrid<DependencyGraphGridStructure>;

impl DependencyGraphGrid {
    /// Fetch the grid's intermediate values from the cycle into the cache.
    fn load_values(&self, cache: &ResultsCache, cycle: &dyn ViewCycle) {
        let calc_config = self.structure.calc_config();
        let values = cycle.query_values(calc_config, &self.structure.value_specs());
        cache.put_values(calc_config, &values);
    }
}

// =============================================================================
// Main grids
// =============================================================================

/// Portfolio or primitives grid plus the dependency graphs opened from it.
pub struct MainAnalyticsGrid {
    grid: AnalyticsGrid<MainGridStructure>,
    graphs: BTreeMap<i32, DependencyGraphGrid>,
    cycle: Arc<dyn ViewCycle>,
    functions: Arc<FunctionNames>,
    board: ResultsBoard,
}

impl MainAnalyticsGrid {
    pub fn new(
        grid_type: GridType,
        callback_id: &str,
        structure: MainGridStructure,
        functions: Arc<FunctionNames>,
        board: ResultsBoard,
    ) -> Self {
        Self {
            grid: AnalyticsGrid::new(
                GridRef::main(grid_type),
                callback_id,
                Arc::new(structure),
                board.clone(),
            ),
            graphs: BTreeMap::new(),
            cycle: Arc::new(EmptyViewCycle),
            functions,
            board,
        }
    }

    pub fn grid_type(&self) -> GridType {
        self.grid.grid_ref().grid_type
    }

    pub fn structure(&self) -> &Arc<MainGridStructure> {
        self.grid.structure()
    }

    pub fn grid(&self) -> &AnalyticsGrid<MainGridStructure> {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut AnalyticsGrid<MainGridStructure> {
        &mut self.grid
    }

    pub fn graph(&self, graph_id: i32) -> Result<&DependencyGraphGrid> {
        self.graphs
            .get(&graph_id)
            .ok_or_else(|| AnalyticsError::graph_not_found(graph_id))
    }

    pub fn graph_mut(&mut self, graph_id: i32) -> Result<&mut DependencyGraphGrid> {
        self.graphs
            .get_mut(&graph_id)
            .ok_or_else(|| AnalyticsError::graph_not_found(graph_id))
    }

    pub fn graph_ids(&self) -> Vec<i32> {
        self.graphs.keys().copied().collect()
    }

    pub fn open_dependency_graph(
        &mut self,
        graph_id: i32,
        callback_id: &str,
        source: GraphSource,
        cache: &ResultsCache,
    ) -> Result<()> {
        if self.graphs.contains_key(&graph_id) {
            return Err(AnalyticsError::DuplicateId {
                kind: "Dependency graph",
                id: graph_id,
            });
        }
        let (calc_config, requirement) = match source {
            GraphSource::Cell { row, col } => self.structure().requirement_for_cell(row, col)?,
            GraphSource::Requirement {
                calc_config,
                requirement,
            } => (calc_config, requirement),
        };
        debug!(
            "Opening dependency graph {} for {} in {}",
            graph_id, requirement, calc_config
        );
        let structure = DependencyGraphGridStructure::build(
            &calc_config,
            &requirement,
            self.structure().compiled(),
            &self.functions,
        );
        let grid = DependencyGraphGrid::new(
            GridRef::graph(self.grid_type(), graph_id),
            callback_id,
            Arc::new(structure),
            self.board.clone(),
        );
        grid.load_values(cache, self.cycle.as_ref());
        self.graphs.insert(graph_id, grid);
        Ok(())
    }

    pub fn close_dependency_graph(&mut self, graph_id: i32) -> Result<()> {
        let grid = self
            .graphs
            .remove(&graph_id)
            .ok_or_else(|| AnalyticsError::graph_not_found(graph_id))?;
        grid.unpublish_all();
        Ok(())
    }

    /// Refresh the main grid and every dependency graph after a cycle.
    /// Returns the callback IDs of viewports with fresh data, unordered.
    pub fn update_results(&mut self, cache: &ResultsCache, cycle: Arc<dyn ViewCycle>) -> Vec<String> {
        self.cycle = cycle;
        let mut ids = self.grid.refresh(cache);
        for graph in self.graphs.values_mut() {
            graph.load_values(cache, self.cycle.as_ref());
            ids.extend(graph.refresh(cache));
        }
        ids
    }

    /// Refresh the main grid after entities changed.
    pub fn update_entities(&mut self, cache: &ResultsCache) -> Vec<String> {
        self.grid.refresh(cache)
    }

    /// Install a structure built from the current compilation, with new rows
    /// or inlined columns. Open dependency graphs stay as they are.
    pub fn replace_structure(&mut self, structure: Arc<MainGridStructure>, cache: &ResultsCache) {
        self.grid.set_structure(structure, cache);
    }

    /// Install a recompiled structure. Open dependency graphs are rebuilt from
    /// their root requirements and their viewports reset to empty definitions
    /// until clients update them.
    pub fn set_structure(&mut self, structure: MainGridStructure, cache: &ResultsCache) {
        self.grid.set_structure(Arc::new(structure), cache);

        let previous = std::mem::take(&mut self.graphs);
        for (graph_id, old) in previous {
            debug!("Reopening dependency graph {} ({})", graph_id, old.callback_id());
            old.unpublish_all();
            let rebuilt = DependencyGraphGridStructure::build(
                old.structure().calc_config(),
                old.structure().root_requirement(),
                self.grid.structure().compiled(),
                &self.functions,
            );
            let mut grid = DependencyGraphGrid::new(
                old.grid_ref(),
                old.callback_id(),
                Arc::new(rebuilt),
                self.board.clone(),
            );
            grid.load_values(cache, self.cycle.as_ref());
            for viewport_id in old.viewport_ids() {
                let Ok(viewport) = old.viewport(viewport_id) else {
                    continue;
                };
                if let Err(e) = grid.create_viewport(
                    viewport_id,
                    viewport.callback_id(),
                    viewport.structure_callback_id(),
                    ViewportDefinition::empty(),
                    cache,
                ) {
                    warn!(
                        "Dropping viewport {} of dependency graph {}: {}",
                        viewport_id, graph_id, e
                    );
                }
            }
            self.graphs.insert(graph_id, grid);
        }
    }

    /// Every callback ID of the grid, its viewports and its dependency graphs.
    pub fn callback_ids(&self) -> Vec<String> {
        let mut ids = self.grid.callback_ids();
        for graph in self.graphs.values() {
            ids.extend(graph.callback_ids());
        }
        ids
    }

    /// Callback IDs of the dependency graph grids themselves.
    pub fn graph_callback_ids(&self) -> Vec<String> {
        self.graphs
            .values()
            .map(|g| g.callback_id().to_string())
            .collect()
    }
}
