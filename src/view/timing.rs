use super::AnalyticsView;
use crate::error::Result;
use crate::services::ErrorInfo;
use crate::types::{
    CompiledViewDefinition, EntityChange, Format, GraphSource, GridLayout, GridRef, GridType, Portfolio, ViewCycle,
    ViewResultModel, ViewportDefinition, ViewportResults,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::trace;

/// Traces how long each call takes. Otherwise transparent.
pub struct TimingAnalyticsView<V> {
    inner: V,
}

impl<V: AnalyticsView> TimingAnalyticsView<V> {
    pub fn new(inner: V) -> Self {
        Self { inner }
    }

    fn timed<T>(&self, operation: &str, call: impl FnOnce(&V) -> T) -> T {
        let start = Instant::now();
        trace!("Executing AnalyticsView.{}", operation);
        let result = call(&self.inner);
        trace!("{} completed in {}ms", operation, start.elapsed().as_millis());
        result
    }
}

impl<V: AnalyticsView> AnalyticsView for TimingAnalyticsView<V> {
    fn update_structure(
        &self,
        compiled: Arc<CompiledViewDefinition>,
        portfolio: Option<Portfolio>,
    ) -> Result<Vec<String>> {
        self.timed("update_structure", |v| v.update_structure(compiled, portfolio))
    }

    fn view_compilation_failed(&self, message: &str) -> Result<String> {
        self.timed("view_compilation_failed", |v| v.view_compilation_failed(message))
    }

    fn update_results(&self, results: &ViewResultModel, cycle: Arc<dyn ViewCycle>) -> Result<Vec<String>> {
        self.timed("update_results", |v| v.update_results(results, cycle))
    }

    fn initial_grid_structure(&self, grid: GridRef) -> Result<GridLayout> {
        self.timed("initial_grid_structure", |v| v.initial_grid_structure(grid))
    }

    fn viewport_grid_structure(&self, grid: GridRef, viewport_id: i32) -> Result<GridLayout> {
        self.timed("viewport_grid_structure", |v| v.viewport_grid_structure(grid, viewport_id))
    }

    fn create_viewport(
        &self,
        grid: GridRef,
        viewport_id: i32,
        callback_id: &str,
        structure_callback_id: &str,
        definition: ViewportDefinition,
    ) -> Result<bool> {
        self.timed("create_viewport", |v| {
            v.create_viewport(grid, viewport_id, callback_id, structure_callback_id, definition)
        })
    }

    fn update_viewport(
        &self,
        grid: GridRef,
        viewport_id: i32,
        definition: ViewportDefinition,
    ) -> Result<Option<String>> {
        self.timed("update_viewport", |v| v.update_viewport(grid, viewport_id, definition))
    }

    fn delete_viewport(&self, grid: GridRef, viewport_id: i32) -> Result<()> {
        self.timed("delete_viewport", |v| v.delete_viewport(grid, viewport_id))
    }

    fn get_data(&self, grid: GridRef, viewport_id: i32) -> Result<Arc<ViewportResults>> {
        self.timed("get_data", |v| v.get_data(grid, viewport_id))
    }

    fn open_dependency_graph(
        &self,
        grid_type: GridType,
        graph_id: i32,
        callback_id: &str,
        source: GraphSource,
    ) -> Result<()> {
        self.timed("open_dependency_graph", |v| {
            v.open_dependency_graph(grid_type, graph_id, callback_id, source)
        })
    }

    fn close_dependency_graph(&self, grid_type: GridType, graph_id: i32) -> Result<()> {
        self.timed("close_dependency_graph", |v| v.close_dependency_graph(grid_type, graph_id))
    }

    fn entity_changed(&self, change: &EntityChange) -> Result<Vec<String>> {
        self.timed("entity_changed", |v| v.entity_changed(change))
    }

    fn portfolio_changed(&self) -> Result<Vec<String>> {
        self.timed("portfolio_changed", |v| v.portfolio_changed())
    }

    fn all_grid_data(&self, grid_type: GridType, format: Format) -> Result<Arc<ViewportResults>> {
        self.timed("all_grid_data", |v| v.all_grid_data(grid_type, format))
    }

    fn view_definition_id(&self) -> Result<String> {
        self.inner.view_definition_id()
    }

    fn errors(&self) -> Vec<ErrorInfo> {
        self.timed("errors", |v| v.errors())
    }

    fn delete_error(&self, id: u64) -> Result<()> {
        self.timed("delete_error", |v| v.delete_error(id))
    }
}
