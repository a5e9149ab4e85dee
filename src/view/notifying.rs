use super::AnalyticsView;
use crate::error::Result;
use crate::push::UpdateListener;
use crate::services::ErrorInfo;
use crate::types::{
    CompiledViewDefinition, EntityChange, Format, GraphSource, GridLayout, GridRef, GridType, Portfolio, ViewCycle,
    ViewResultModel, ViewportDefinition, ViewportResults,
};
use std::sync::Arc;

/// Forwards the callback IDs returned by successful calls to the listener.
pub struct NotifyingAnalyticsView<V> {
    inner: V,
    listener: Arc<dyn UpdateListener>,
}

impl<V: AnalyticsView> NotifyingAnalyticsView<V> {
    pub fn new(inner: V, listener: Arc<dyn UpdateListener>) -> Self {
        Self { inner, listener }
    }

    fn notify(&self, ids: &[String]) {
        if !ids.is_empty() {
            self.listener.items_updated(ids);
        }
    }
}

impl<V: AnalyticsView> AnalyticsView for NotifyingAnalyticsView<V> {
    fn update_structure(
        &self,
        compiled: Arc<CompiledViewDefinition>,
        portfolio: Option<Portfolio>,
    ) -> Result<Vec<String>> {
        let ids = self.inner.update_structure(compiled, portfolio)?;
        self.notify(&ids);
        Ok(ids)
    }

    fn view_compilation_failed(&self, message: &str) -> Result<String> {
        let id = self.inner.view_compilation_failed(message)?;
        self.listener.item_updated(&id);
        Ok(id)
    }

    fn update_results(&self, results: &ViewResultModel, cycle: Arc<dyn ViewCycle>) -> Result<Vec<String>> {
        let ids = self.inner.update_results(results, cycle)?;
        self.notify(&ids);
        Ok(ids)
    }

    fn initial_grid_structure(&self, grid: GridRef) -> Result<GridLayout> {
        self.inner.initial_grid_structure(grid)
    }

    fn viewport_grid_structure(&self, grid: GridRef, viewport_id: i32) -> Result<GridLayout> {
        self.inner.viewport_grid_structure(grid, viewport_id)
    }

    fn create_viewport(
        &self,
        grid: GridRef,
        viewport_id: i32,
        callback_id: &str,
        structure_callback_id: &str,
        definition: ViewportDefinition,
    ) -> Result<bool> {
        let has_data = self
            .inner
            .create_viewport(grid, viewport_id, callback_id, structure_callback_id, definition)?;
        if has_data {
            self.listener.item_updated(callback_id);
        }
        Ok(has_data)
    }

    fn update_viewport(
        &self,
        grid: GridRef,
        viewport_id: i32,
        definition: ViewportDefinition,
    ) -> Result<Option<String>> {
        let callback_id = self.inner.update_viewport(grid, viewport_id, definition)?;
        if let Some(id) = &callback_id {
            self.listener.item_updated(id);
        }
        Ok(callback_id)
    }

    fn delete_viewport(&self, grid: GridRef, viewport_id: i32) -> Result<()> {
        self.inner.delete_viewport(grid, viewport_id)
    }

    fn get_data(&self, grid: GridRef, viewport_id: i32) -> Result<Arc<ViewportResults>> {
        self.inner.get_data(grid, viewport_id)
    }

    fn open_dependency_graph(
        &self,
        grid_type: GridType,
        graph_id: i32,
        callback_id: &str,
        source: GraphSource,
    ) -> Result<()> {
        self.inner
            .open_dependency_graph(grid_type, graph_id, callback_id, source)?;
        self.listener.item_updated(callback_id);
        Ok(())
    }

    fn close_dependency_graph(&self, grid_type: GridType, graph_id: i32) -> Result<()> {
        self.inner.close_dependency_graph(grid_type, graph_id)
    }

    fn entity_changed(&self, change: &EntityChange) -> Result<Vec<String>> {
        let ids = self.inner.entity_changed(change)?;
        self.notify(&ids);
        Ok(ids)
    }

    fn portfolio_changed(&self) -> Result<Vec<String>> {
        let ids = self.inner.portfolio_changed()?;
        self.notify(&ids);
        Ok(ids)
    }

    fn all_grid_data(&self, grid_type: GridType, format: Format) -> Result<Arc<ViewportResults>> {
        self.inner.all_grid_data(grid_type, format)
    }

    fn view_definition_id(&self) -> Result<String> {
        self.inner.view_definition_id()
    }

    fn errors(&self) -> Vec<ErrorInfo> {
        self.inner.errors()
    }

    fn delete_error(&self, id: u64) -> Result<()> {
        self.inner.delete_error(id)
    }
}
