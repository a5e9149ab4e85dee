//! The view clients and the engine talk to, and the layers wrapped around it.
//!
//! The chain is built once per view:
//! `Timing(Notifying(Catching(Locking(SimpleAnalyticsView))))`, timing optional.

pub mod catching;
pub mod locking;
pub mod notifying;
pub mod simple;
pub mod timing;

pub use catching::CatchingAnalyticsView;
pub use locking::LockingAnalyticsView;
pub use notifying::NotifyingAnalyticsView;
pub use simple::{SimpleAnalyticsView, ViewSettings, ViewStatus};
pub use timing::TimingAnalyticsView;

use crate::error::Result;
use crate::push::UpdateListener;
use crate::services::{ErrorInfo, ErrorManager};
use crate::types::{
    CompiledViewDefinition, EntityChange, Format, GraphSource, GridLayout, GridRef, GridType, Portfolio,
    PortfolioSupplier, ViewCycle, ViewResultModel, ViewportDefinition, ViewportResults,
};
use std::sync::Arc;

/// Operations on a live analytics view.
///
/// Calls returning callback IDs report which client-visible items changed;
/// the notifying layer forwards them to the update listener.
pub trait AnalyticsView: Send + Sync {
    /// New compilation from the engine. Returns the IDs of every grid and
    /// viewport when applied immediately, nothing when deferred.
    fn update_structure(
        &self,
        compiled: Arc<CompiledViewDefinition>,
        portfolio: Option<Portfolio>,
    ) -> Result<Vec<String>>;

    /// Returns the error callback ID.
    fn view_compilation_failed(&self, message: &str) -> Result<String>;

    fn update_results(&self, results: &ViewResultModel, cycle: Arc<dyn ViewCycle>) -> Result<Vec<String>>;

    fn initial_grid_structure(&self, grid: GridRef) -> Result<GridLayout>;

    fn viewport_grid_structure(&self, grid: GridRef, viewport_id: i32) -> Result<GridLayout>;

    /// Returns true if the viewport has data straight away.
    fn create_viewport(
        &self,
        grid: GridRef,
        viewport_id: i32,
        callback_id: &str,
        structure_callback_id: &str,
        definition: ViewportDefinition,
    ) -> Result<bool>;

    /// Returns the viewport's callback ID if it has data after the update.
    fn update_viewport(
        &self,
        grid: GridRef,
        viewport_id: i32,
        definition: ViewportDefinition,
    ) -> Result<Option<String>>;

    fn delete_viewport(&self, grid: GridRef, viewport_id: i32) -> Result<()>;

    fn get_data(&self, grid: GridRef, viewport_id: i32) -> Result<Arc<ViewportResults>>;

    fn open_dependency_graph(
        &self,
        grid_type: GridType,
        graph_id: i32,
        callback_id: &str,
        source: GraphSource,
    ) -> Result<()>;

    fn close_dependency_graph(&self, grid_type: GridType, graph_id: i32) -> Result<()>;

    fn entity_changed(&self, change: &EntityChange) -> Result<Vec<String>>;

    fn portfolio_changed(&self) -> Result<Vec<String>>;

    /// Every cell of a main grid, outside any viewport.
    fn all_grid_data(&self, grid_type: GridType, format: Format) -> Result<Arc<ViewportResults>>;

    fn view_definition_id(&self) -> Result<String>;

    fn errors(&self) -> Vec<ErrorInfo>;

    fn delete_error(&self, id: u64) -> Result<()>;
}

/// Wrap a view in the standard layers.
pub fn build_chain(
    view: SimpleAnalyticsView,
    supplier: Arc<dyn PortfolioSupplier>,
    listener: Arc<dyn UpdateListener>,
    timing: bool,
) -> Arc<dyn AnalyticsView> {
    let errors: Arc<ErrorManager> = Arc::clone(view.error_manager());
    let locking = LockingAnalyticsView::new(view, supplier);
    let catching = CatchingAnalyticsView::new(locking, errors, Arc::clone(&listener));
    let notifying = NotifyingAnalyticsView::new(catching, listener);
    if timing {
        Arc::new(TimingAnalyticsView::new(notifying))
    } else {
        Arc::new(notifying)
    }
}
