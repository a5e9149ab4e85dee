//! The view itself: both main grids, their dependency graphs and the cache.
//!
//! Not thread-safe on its own. Callers go through [`super::LockingAnalyticsView`].

use crate::error::{AnalyticsError, Result};
use crate::grid::{GridStructure, MainAnalyticsGrid, MainGridStructure, ResultsBoard, Viewport};
use crate::services::{ErrorInfo, ErrorManager, FunctionNames, ResultsCache};
use crate::types::{
    ChangeType, CompiledViewDefinition, Entity, EntityChange, Format, GraphSource, GridLayout, GridRef, GridType,
    Portfolio, VersionCorrection, ViewCycle, ViewResultModel, ViewportDefinition, ViewportResults,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Where the view is in its structure lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewStatus {
    /// No compiled view yet; grids are empty.
    Uninitialized,
    /// Grids match the latest compilation.
    Structured,
    /// A recompilation is held back until the next cycle's results arrive.
    StructurePending,
}

/// Identity and callback IDs fixed when a view is opened.
#[derive(Debug, Clone)]
pub struct ViewSettings {
    pub view_definition_id: String,
    pub portfolio_callback_id: String,
    pub primitives_callback_id: String,
    pub version_correction: VersionCorrection,
}

impl ViewSettings {
    pub fn new(view_definition_id: &str) -> Self {
        Self {
            view_definition_id: view_definition_id.to_string(),
            portfolio_callback_id: Uuid::new_v4().to_string(),
            primitives_callback_id: Uuid::new_v4().to_string(),
            version_correction: VersionCorrection::latest(),
        }
    }

    pub fn with_callback_ids(mut self, portfolio: &str, primitives: &str) -> Self {
        self.portfolio_callback_id = portfolio.to_string();
        self.primitives_callback_id = primitives.to_string();
        self
    }

    pub fn with_version_correction(mut self, version_correction: VersionCorrection) -> Self {
        self.version_correction = version_correction;
        self
    }
}

struct PendingStructure {
    compiled: Arc<CompiledViewDefinition>,
    portfolio: Option<Portfolio>,
}

pub struct SimpleAnalyticsView {
    view_definition_id: String,
    version_correction: VersionCorrection,
    cache: Arc<ResultsCache>,
    errors: Arc<ErrorManager>,
    board: ResultsBoard,
    portfolio_grid: MainAnalyticsGrid,
    primitives_grid: MainAnalyticsGrid,
    compiled: Option<Arc<CompiledViewDefinition>>,
    pending: Option<PendingStructure>,
}

impl SimpleAnalyticsView {
    pub fn new(
        settings: ViewSettings,
        cache: Arc<ResultsCache>,
        errors: Arc<ErrorManager>,
        functions: Arc<FunctionNames>,
    ) -> Self {
        let board = ResultsBoard::new();
        Self {
            portfolio_grid: MainAnalyticsGrid::new(
                GridType::Portfolio,
                &settings.portfolio_callback_id,
                MainGridStructure::empty(GridType::Portfolio),
                Arc::clone(&functions),
                board.clone(),
            ),
            primitives_grid: MainAnalyticsGrid::new(
                GridType::Primitives,
                &settings.primitives_callback_id,
                MainGridStructure::empty(GridType::Primitives),
                functions,
                board.clone(),
            ),
            view_definition_id: settings.view_definition_id,
            version_correction: settings.version_correction,
            cache,
            errors,
            board,
            compiled: None,
            pending: None,
        }
    }

    pub fn status(&self) -> ViewStatus {
        match (&self.compiled, &self.pending) {
            (_, Some(_)) => ViewStatus::StructurePending,
            (Some(_), None) => ViewStatus::Structured,
            (None, None) => ViewStatus::Uninitialized,
        }
    }

    /// Published viewport results, readable without holding the view.
    pub fn board(&self) -> &ResultsBoard {
        &self.board
    }

    pub fn cache(&self) -> &Arc<ResultsCache> {
        &self.cache
    }

    pub fn error_manager(&self) -> &Arc<ErrorManager> {
        &self.errors
    }

    pub fn grid(&self, grid_type: GridType) -> &MainAnalyticsGrid {
        match grid_type {
            GridType::Portfolio => &self.portfolio_grid,
            GridType::Primitives => &self.primitives_grid,
        }
    }

    fn grid_mut(&mut self, grid_type: GridType) -> &mut MainAnalyticsGrid {
        match grid_type {
            GridType::Portfolio => &mut self.portfolio_grid,
            GridType::Primitives => &mut self.primitives_grid,
        }
    }

    // =========================================================================
    // Engine-driven updates
    // =========================================================================

    /// Apply a new compilation. While results for the previous one are on
    /// screen the change is held back until the next cycle.
    pub fn update_structure(
        &mut self,
        compiled: Arc<CompiledViewDefinition>,
        portfolio: Option<Portfolio>,
    ) -> Vec<String> {
        if self.compiled.is_some() {
            info!("Holding back structure change until the next cycle");
            self.pending = Some(PendingStructure { compiled, portfolio });
            return Vec::new();
        }
        self.apply_structure(compiled, portfolio);
        self.grid_ids()
    }

    fn apply_structure(&mut self, compiled: Arc<CompiledViewDefinition>, portfolio: Option<Portfolio>) {
        info!(
            "Applying structure for view {} ({} value mappings)",
            compiled.view_definition.name,
            compiled.value_mappings.len()
        );
        if let Some(portfolio) = &portfolio {
            self.cache.put_entities(portfolio.entities());
        }
        let portfolio_structure = self
            .portfolio_grid
            .structure()
            .with_updated_structure(Arc::clone(&compiled), portfolio.as_ref());
        self.portfolio_grid.set_structure(portfolio_structure, &self.cache);
        self.primitives_grid
            .set_structure(MainGridStructure::primitives(Arc::clone(&compiled)), &self.cache);
        self.compiled = Some(compiled);
    }

    pub fn view_compilation_failed(&mut self, message: &str) -> String {
        warn!("View compilation failed: {}", message);
        self.errors.add(&AnalyticsError::CompilationFailed(message.to_string()))
    }

    /// Ingest a cycle. Returns the callback IDs clients should re-fetch.
    pub fn update_results(&mut self, results: &ViewResultModel, cycle: Arc<dyn ViewCycle>) -> Vec<String> {
        self.cache.put_results(results);
        if let Some(pending) = self.pending.take() {
            self.apply_structure(pending.compiled, pending.portfolio);
            // every viewport is already reported through the grid IDs
            self.portfolio_grid.update_results(&self.cache, Arc::clone(&cycle));
            self.primitives_grid.update_results(&self.cache, cycle);
            return self.grid_ids();
        }

        let mut ids = Vec::new();
        let current = self.portfolio_grid.structure();
        let updated = current.with_updated_columns(&self.cache);
        if Arc::ptr_eq(current, &updated) {
            ids.extend(self.portfolio_grid.update_results(&self.cache, Arc::clone(&cycle)));
        } else {
            debug!("Inlined columns changed, rebuilding portfolio grid columns");
            self.portfolio_grid.replace_structure(updated, &self.cache);
            // viewports are covered by the grid ID, graphs still need this cycle's values
            self.portfolio_grid.update_results(&self.cache, Arc::clone(&cycle));
            ids.push(self.portfolio_grid.grid().callback_id().to_string());
            ids.extend(self.portfolio_grid.graph_callback_ids());
        }
        ids.extend(self.primitives_grid.update_results(&self.cache, cycle));
        ids
    }

    /// Handle a master-data change. `portfolio` is the freshly resolved
    /// portfolio, only consulted for removals.
    pub fn entity_changed(&mut self, change: &EntityChange, portfolio: Option<Portfolio>) -> Vec<String> {
        if !self.is_change_relevant(change) {
            return Vec::new();
        }
        if change.change_type == ChangeType::Removed {
            debug!("Entity {} removed, rebuilding portfolio rows", change.object_id);
            self.cache.remove(&change.object_id);
            self.rebuild_rows(portfolio.as_ref());
            return self.grid_ids();
        }
        let Some(entity) = &change.entity else {
            return Vec::new();
        };
        let mut entities = vec![entity.clone()];
        if let Entity::Position(position) = entity {
            entities.extend(position.trades.iter().cloned().map(Entity::Trade));
        }
        self.cache.put_entities(entities);
        let ids = self.portfolio_grid.update_entities(&self.cache);
        debug!("Entity {} changed, updated viewports {:?}", change.object_id, ids);
        ids
    }

    fn is_change_relevant(&self, change: &EntityChange) -> bool {
        // added objects reach the cache through the next portfolio traversal
        if change.change_type == ChangeType::Added {
            return false;
        }
        if !self.cache.contains_entity(&change.object_id) {
            return false;
        }
        self.version_correction.is_affected_by(change)
    }

    /// Re-read the portfolio's entities and rebuild the portfolio rows.
    pub fn portfolio_changed(&mut self, portfolio: Option<Portfolio>) -> Vec<String> {
        if let Some(portfolio) = &portfolio {
            self.cache.put_entities(portfolio.entities());
        }
        self.rebuild_rows(portfolio.as_ref());
        self.grid_ids()
    }

    fn rebuild_rows(&mut self, portfolio: Option<&Portfolio>) {
        let structure = self.portfolio_grid.structure().with_updated_rows(portfolio);
        self.portfolio_grid.replace_structure(Arc::new(structure), &self.cache);
    }

    /// Every grid, dependency graph and viewport callback ID.
    fn grid_ids(&self) -> Vec<String> {
        let mut ids = self.portfolio_grid.callback_ids();
        ids.extend(self.primitives_grid.callback_ids());
        ids
    }

    // =========================================================================
    // Client operations
    // =========================================================================

    pub fn initial_grid_structure(&self, grid: GridRef) -> Result<GridLayout> {
        let main = self.grid(grid.grid_type);
        match grid.graph_id {
            None => Ok(main.structure().layout()),
            Some(graph_id) => Ok(main.graph(graph_id)?.structure().layout()),
        }
    }

    pub fn viewport_grid_structure(&self, grid: GridRef, viewport_id: i32) -> Result<GridLayout> {
        let main = self.grid(grid.grid_type);
        match grid.graph_id {
            None => main.grid().viewport_layout(viewport_id),
            Some(graph_id) => main.graph(graph_id)?.viewport_layout(viewport_id),
        }
    }

    /// Returns true if the viewport has data straight away.
    pub fn create_viewport(
        &mut self,
        grid: GridRef,
        viewport_id: i32,
        callback_id: &str,
        structure_callback_id: &str,
        definition: ViewportDefinition,
    ) -> Result<bool> {
        debug!("Creating viewport {} in {:?}", viewport_id, grid);
        let cache = Arc::clone(&self.cache);
        let main = self.grid_mut(grid.grid_type);
        match grid.graph_id {
            None => main
                .grid_mut()
                .create_viewport(viewport_id, callback_id, structure_callback_id, definition, &cache),
            Some(graph_id) => main.graph_mut(graph_id)?.create_viewport(
                viewport_id,
                callback_id,
                structure_callback_id,
                definition,
                &cache,
            ),
        }
    }

    /// Returns the viewport's callback ID if it has data after the update.
    pub fn update_viewport(
        &mut self,
        grid: GridRef,
        viewport_id: i32,
        definition: ViewportDefinition,
    ) -> Result<Option<String>> {
        debug!("Updating viewport {} in {:?}", viewport_id, grid);
        let cache = Arc::clone(&self.cache);
        let main = self.grid_mut(grid.grid_type);
        match grid.graph_id {
            None => main.grid_mut().update_viewport(viewport_id, definition, &cache),
            Some(graph_id) => main.graph_mut(graph_id)?.update_viewport(viewport_id, definition, &cache),
        }
    }

    pub fn delete_viewport(&mut self, grid: GridRef, viewport_id: i32) -> Result<()> {
        debug!("Deleting viewport {} in {:?}", viewport_id, grid);
        let main = self.grid_mut(grid.grid_type);
        match grid.graph_id {
            None => main.grid_mut().delete_viewport(viewport_id),
            Some(graph_id) => main.graph_mut(graph_id)?.delete_viewport(viewport_id),
        }
    }

    pub fn get_data(&self, grid: GridRef, viewport_id: i32) -> Result<Arc<ViewportResults>> {
        let main = self.grid(grid.grid_type);
        match grid.graph_id {
            None => main.grid().data(viewport_id),
            Some(graph_id) => main.graph(graph_id)?.data(viewport_id),
        }
    }

    pub fn open_dependency_graph(
        &mut self,
        grid_type: GridType,
        graph_id: i32,
        callback_id: &str,
        source: GraphSource,
    ) -> Result<()> {
        let cache = Arc::clone(&self.cache);
        self.grid_mut(grid_type)
            .open_dependency_graph(graph_id, callback_id, source, &cache)
    }

    pub fn close_dependency_graph(&mut self, grid_type: GridType, graph_id: i32) -> Result<()> {
        debug!("Closing dependency graph {} of the {:?} grid", graph_id, grid_type);
        self.grid_mut(grid_type).close_dependency_graph(graph_id)
    }

    /// Every cell of a main grid, rendered through a throwaway viewport that
    /// is never registered.
    pub fn all_grid_data(&self, grid_type: GridType, format: Format) -> Result<Arc<ViewportResults>> {
        let structure = self.grid(grid_type).structure();
        let definition = ViewportDefinition::rectangular(
            i64::MIN,
            (0..structure.row_count()).collect(),
            (0..structure.column_count()).collect(),
            format,
        );
        let viewport = Viewport::new(
            Arc::clone(structure),
            definition,
            &Uuid::new_v4().to_string(),
            &Uuid::new_v4().to_string(),
            &self.cache,
        )?;
        Ok(viewport.results())
    }

    pub fn view_definition_id(&self) -> &str {
        &self.view_definition_id
    }

    pub fn errors(&self) -> Vec<ErrorInfo> {
        self.errors.errors()
    }

    pub fn delete_error(&self, id: u64) -> Result<()> {
        self.errors.delete(id)
    }
}
