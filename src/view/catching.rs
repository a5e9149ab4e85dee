use super::AnalyticsView;
use crate::error::Result;
use crate::push::UpdateListener;
use crate::services::{ErrorInfo, ErrorManager};
use crate::types::{
    CompiledViewDefinition, EntityChange, Format, GraphSource, GridLayout, GridRef, GridType, Portfolio, ViewCycle,
    ViewResultModel, ViewportDefinition, ViewportResults,
};
use std::sync::Arc;

/// Records every failure in the error manager and tells listeners about it.
/// The error is still returned to the caller.
pub struct CatchingAnalyticsView<V> {
    inner: V,
    errors: Arc<ErrorManager>,
    listener: Arc<dyn UpdateListener>,
}

impl<V: AnalyticsView> CatchingAnalyticsView<V> {
    pub fn new(inner: V, errors: Arc<ErrorManager>, listener: Arc<dyn UpdateListener>) -> Self {
        Self {
            inner,
            errors,
            listener,
        }
    }

    fn catching<T>(&self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            let callback_id = self.errors.add(e);
            self.listener.item_updated(&callback_id);
        }
        result
    }
}

impl<V: AnalyticsView> AnalyticsView for CatchingAnalyticsView<V> {
    fn update_structure(
        &self,
        compiled: Arc<CompiledViewDefinition>,
        portfolio: Option<Portfolio>,
    ) -> Result<Vec<String>> {
        self.catching(self.inner.update_structure(compiled, portfolio))
    }

    fn view_compilation_failed(&self, message: &str) -> Result<String> {
        self.catching(self.inner.view_compilation_failed(message))
    }

    fn update_results(&self, results: &ViewResultModel, cycle: Arc<dyn ViewCycle>) -> Result<Vec<String>> {
        self.catching(self.inner.update_results(results, cycle))
    }

    fn initial_grid_structure(&self, grid: GridRef) -> Result<GridLayout> {
        self.catching(self.inner.initial_grid_structure(grid))
    }

    fn viewport_grid_structure(&self, grid: GridRef, viewport_id: i32) -> Result<GridLayout> {
        self.catching(self.inner.viewport_grid_structure(grid, viewport_id))
    }

    fn create_viewport(
        &self,
        grid: GridRef,
        viewport_id: i32,
        callback_id: &str,
        structure_callback_id: &str,
        definition: ViewportDefinition,
    ) -> Result<bool> {
        self.catching(
            self.inner
                .create_viewport(grid, viewport_id, callback_id, structure_callback_id, definition),
        )
    }

    fn update_viewport(
        &self,
        grid: GridRef,
        viewport_id: i32,
        definition: ViewportDefinition,
    ) -> Result<Option<String>> {
        self.catching(self.inner.update_viewport(grid, viewport_id, definition))
    }

    fn delete_viewport(&self, grid: GridRef, viewport_id: i32) -> Result<()> {
        self.catching(self.inner.delete_viewport(grid, viewport_id))
    }

    fn get_data(&self, grid: GridRef, viewport_id: i32) -> Result<Arc<ViewportResults>> {
        self.catching(self.inner.get_data(grid, viewport_id))
    }

    fn open_dependency_graph(
        &self,
        grid_type: GridType,
        graph_id: i32,
        callback_id: &str,
        source: GraphSource,
    ) -> Result<()> {
        self.catching(
            self.inner
                .open_dependency_graph(grid_type, graph_id, callback_id, source),
        )
    }

    fn close_dependency_graph(&self, grid_type: GridType, graph_id: i32) -> Result<()> {
        self.catching(self.inner.close_dependency_graph(grid_type, graph_id))
    }

    fn entity_changed(&self, change: &EntityChange) -> Result<Vec<String>> {
        self.catching(self.inner.entity_changed(change))
    }

    fn portfolio_changed(&self) -> Result<Vec<String>> {
        self.catching(self.inner.portfolio_changed())
    }

    fn all_grid_data(&self, grid_type: GridType, format: Format) -> Result<Arc<ViewportResults>> {
        self.catching(self.inner.all_grid_data(grid_type, format))
    }

    fn view_definition_id(&self) -> Result<String> {
        self.catching(self.inner.view_definition_id())
    }

    fn errors(&self) -> Vec<ErrorInfo> {
        self.inner.errors()
    }

    fn delete_error(&self, id: u64) -> Result<()> {
        self.catching(self.inner.delete_error(id))
    }
}
