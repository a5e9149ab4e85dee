use super::{AnalyticsView, SimpleAnalyticsView};
use crate::error::{AnalyticsError, Result};
use crate::grid::ResultsBoard;
use crate::services::{ErrorInfo, ErrorManager};
use crate::types::{
    ChangeType, CompiledViewDefinition, EntityChange, Format, GraphSource, GridLayout, GridRef, GridType, Portfolio,
    PortfolioSupplier, ViewCycle, ViewResultModel, ViewportKey, ViewportDefinition, ViewportResults,
};
use std::sync::{Arc, Mutex, MutexGuard};

/// Serializes every call that touches grid state.
///
/// Viewport data and errors are read from the published board and the error
/// manager without taking the lock. The portfolio is resolved before locking
/// because suppliers may be slow.
pub struct LockingAnalyticsView {
    view: Mutex<SimpleAnalyticsView>,
    board: ResultsBoard,
    errors: Arc<ErrorManager>,
    supplier: Arc<dyn PortfolioSupplier>,
}

impl LockingAnalyticsView {
    pub fn new(view: SimpleAnalyticsView, supplier: Arc<dyn PortfolioSupplier>) -> Self {
        Self {
            board: view.board().clone(),
            errors: Arc::clone(view.error_manager()),
            view: Mutex::new(view),
            supplier,
        }
    }

    /// A panic while the lock is held can leave the grids half rebuilt, so a
    /// poisoned view is not recovered. Every locked call fails with
    /// `LockPoisoned` and the owner must build a new view. Lock-free reads
    /// keep serving the last published results.
    fn lock(&self) -> Result<MutexGuard<'_, SimpleAnalyticsView>> {
        self.view.lock().map_err(|_| AnalyticsError::LockPoisoned)
    }
}

impl AnalyticsView for LockingAnalyticsView {
    fn update_structure(
        &self,
        compiled: Arc<CompiledViewDefinition>,
        portfolio: Option<Portfolio>,
    ) -> Result<Vec<String>> {
        Ok(self.lock()?.update_structure(compiled, portfolio))
    }

    fn view_compilation_failed(&self, message: &str) -> Result<String> {
        Ok(self.lock()?.view_compilation_failed(message))
    }

    fn update_results(&self, results: &ViewResultModel, cycle: Arc<dyn ViewCycle>) -> Result<Vec<String>> {
        Ok(self.lock()?.update_results(results, cycle))
    }

    fn initial_grid_structure(&self, grid: GridRef) -> Result<GridLayout> {
        self.lock()?.initial_grid_structure(grid)
    }

    fn viewport_grid_structure(&self, grid: GridRef, viewport_id: i32) -> Result<GridLayout> {
        self.lock()?.viewport_grid_structure(grid, viewport_id)
    }

    fn create_viewport(
        &self,
        grid: GridRef,
        viewport_id: i32,
        callback_id: &str,
        structure_callback_id: &str,
        definition: ViewportDefinition,
    ) -> Result<bool> {
        self.lock()?
            .create_viewport(grid, viewport_id, callback_id, structure_callback_id, definition)
    }

    fn update_viewport(
        &self,
        grid: GridRef,
        viewport_id: i32,
        definition: ViewportDefinition,
    ) -> Result<Option<String>> {
        self.lock()?.update_viewport(grid, viewport_id, definition)
    }

    fn delete_viewport(&self, grid: GridRef, viewport_id: i32) -> Result<()> {
        self.lock()?.delete_viewport(grid, viewport_id)
    }

    fn get_data(&self, grid: GridRef, viewport_id: i32) -> Result<Arc<ViewportResults>> {
        self.board.get(&ViewportKey::new(grid, viewport_id))
    }

    fn open_dependency_graph(
        &self,
        grid_type: GridType,
        graph_id: i32,
        callback_id: &str,
        source: GraphSource,
    ) -> Result<()> {
        self.lock()?
            .open_dependency_graph(grid_type, graph_id, callback_id, source)
    }

    fn close_dependency_graph(&self, grid_type: GridType, graph_id: i32) -> Result<()> {
        self.lock()?.close_dependency_graph(grid_type, graph_id)
    }

    fn entity_changed(&self, change: &EntityChange) -> Result<Vec<String>> {
        let portfolio = match change.change_type {
            ChangeType::Removed => self.supplier.portfolio(),
            _ => None,
        };
        Ok(self.lock()?.entity_changed(change, portfolio))
    }

    fn portfolio_changed(&self) -> Result<Vec<String>> {
        let portfolio = self.supplier.portfolio();
        Ok(self.lock()?.portfolio_changed(portfolio))
    }

    fn all_grid_data(&self, grid_type: GridType, format: Format) -> Result<Arc<ViewportResults>> {
        self.lock()?.all_grid_data(grid_type, format)
    }

    fn view_definition_id(&self) -> Result<String> {
        Ok(self.lock()?.view_definition_id().to_string())
    }

    fn errors(&self) -> Vec<ErrorInfo> {
        self.errors.errors()
    }

    fn delete_error(&self, id: u64) -> Result<()> {
        self.errors.delete(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{FunctionNames, ResultsCache};
    use crate::simulation::{self, SimulatedEngine};
    use crate::types::FixedPortfolio;
    use crate::view::ViewSettings;

    #[test]
    fn test_poisoned_view_fails_closed() {
        let engine = SimulatedEngine::new(simulation::demo_portfolio(1));
        let simple = SimpleAnalyticsView::new(
            ViewSettings::new("poisoned").with_callback_ids("portfolio", "primitives"),
            ResultsCache::new(3),
            ErrorManager::new("errors"),
            FunctionNames::new(),
        );
        let view = LockingAnalyticsView::new(simple, Arc::new(FixedPortfolio(None)));
        view.update_structure(engine.compiled(), Some(engine.portfolio().clone()))
            .unwrap();
        let grid = GridRef::main(GridType::Primitives);
        let definition = ViewportDefinition::rectangular(1, vec![0], vec![0], Format::Cell);
        view.create_viewport(grid, 1, "prim", "prim-s", definition).unwrap();

        std::thread::scope(|s| {
            let poisoner = s.spawn(|| {
                let _guard = view.view.lock().unwrap();
                panic!("panic while holding the view lock");
            });
            assert!(poisoner.join().is_err());
        });

        assert_eq!(view.view_definition_id().unwrap_err(), AnalyticsError::LockPoisoned);
        assert_eq!(
            view.delete_viewport(grid, 1).unwrap_err(),
            AnalyticsError::LockPoisoned
        );
        assert!(view.get_data(grid, 1).is_ok());
        assert!(view.errors().is_empty());
    }
}
