use std::sync::Arc;
use std::time::Duration;
use tessera::config::Config;
use tessera::push::UpdateRouter;
use tessera::services::{ErrorManager, FunctionNames, ResultsCache};
use tessera::simulation::{self, SimulatedEngine, CALC_CONFIG, PRESENT_VALUE};
use tessera::types::{
    FixedPortfolio, Format, GraphSource, GridRef, GridType, TargetSpec, ValueProperties, ValueRequirement,
    ViewportDefinition,
};
use tessera::view::{build_chain, AnalyticsView, SimpleAnalyticsView, ViewSettings};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const PORTFOLIO_CALLBACK: &str = "portfolio";
const PRIMITIVES_CALLBACK: &str = "primitives";
const VIEWPORT_CALLBACK: &str = "portfolio-viewport";
const GRAPH_CALLBACK: &str = "root-pv-graph";
const GRAPH_VIEWPORT_CALLBACK: &str = "root-pv-graph-viewport";

/// Viewport covering every cell of a grid.
fn whole_grid(view: &dyn AnalyticsView, grid: GridRef, version: i64) -> anyhow::Result<ViewportDefinition> {
    let layout = view.initial_grid_structure(grid)?;
    Ok(ViewportDefinition::rectangular(
        version,
        (0..layout.row_count).collect(),
        (0..layout.column_count()).collect(),
        Format::Cell,
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tessera=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();
    info!(
        "Starting Tessera demo: {} cycles every {}ms over {} positions",
        config.demo.cycles, config.demo.cycle_interval_ms, config.demo.positions
    );

    let functions = FunctionNames::new();
    for (id, name) in simulation::FUNCTIONS {
        functions.register(id, name);
    }
    let cache = ResultsCache::new(config.history_capacity);
    let errors = ErrorManager::new(&config.errors_callback_id);
    let mut engine = SimulatedEngine::new(simulation::demo_portfolio(config.demo.positions));

    // Build the view chain
    let settings =
        ViewSettings::new("demo-view").with_callback_ids(PORTFOLIO_CALLBACK, PRIMITIVES_CALLBACK);
    let router = UpdateRouter::new();
    let view = build_chain(
        SimpleAnalyticsView::new(settings, cache, errors, functions),
        Arc::new(FixedPortfolio(Some(engine.portfolio().clone()))),
        router.clone(),
        config.timing_enabled,
    );

    // One push client listening to everything the demo opens
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client_id = router.register(tx);
    let subscriptions: Vec<String> = [
        PORTFOLIO_CALLBACK,
        PRIMITIVES_CALLBACK,
        VIEWPORT_CALLBACK,
        GRAPH_CALLBACK,
        GRAPH_VIEWPORT_CALLBACK,
        config.errors_callback_id.as_str(),
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    router.subscribe(client_id, &subscriptions);
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            debug!("Push to {}: {}", client_id, message);
        }
    });

    view.update_structure(engine.compiled(), Some(engine.portfolio().clone()))?;

    let portfolio_grid = GridRef::main(GridType::Portfolio);
    let definition = whole_grid(view.as_ref(), portfolio_grid, 0)?;
    view.create_viewport(
        portfolio_grid,
        1,
        VIEWPORT_CALLBACK,
        &format!("{}-structure", VIEWPORT_CALLBACK),
        definition,
    )?;

    // Drill into the portfolio's total present value
    let graph_id = 1;
    view.open_dependency_graph(
        GridType::Portfolio,
        graph_id,
        GRAPH_CALLBACK,
        GraphSource::Requirement {
            calc_config: CALC_CONFIG.to_string(),
            requirement: ValueRequirement::new(PRESENT_VALUE, TargetSpec::node("root"), ValueProperties::new()),
        },
    )?;
    let graph_grid = GridRef::graph(GridType::Portfolio, graph_id);
    let definition = whole_grid(view.as_ref(), graph_grid, 0)?;
    view.create_viewport(
        graph_grid,
        1,
        GRAPH_VIEWPORT_CALLBACK,
        &format!("{}-structure", GRAPH_VIEWPORT_CALLBACK),
        definition,
    )?;

    let mut interval = tokio::time::interval(Duration::from_millis(config.demo.cycle_interval_ms));
    let mut columns = view.initial_grid_structure(portfolio_grid)?.column_count();
    for version in 1..=config.demo.cycles as i64 {
        interval.tick().await;
        let (results, cycle) = engine.next_cycle();
        let updated = view.update_results(&results, cycle)?;
        info!("Cycle {}: {} items updated", results.cycle_id, updated.len());

        // Inlined columns appear once vector results arrive
        let layout = view.initial_grid_structure(portfolio_grid)?;
        if layout.column_count() != columns {
            columns = layout.column_count();
            info!("Portfolio grid now has {} columns", columns);
            view.update_viewport(portfolio_grid, 1, whole_grid(view.as_ref(), portfolio_grid, version)?)?;
        }
    }

    let data = view.get_data(portfolio_grid, 1)?;
    let graph_data = view.get_data(graph_grid, 1)?;
    info!(
        "Finished: {} portfolio cells, {} dependency graph cells",
        data.cells.len(),
        graph_data.cells.len()
    );
    for error in view.errors() {
        warn!("Unresolved error {} [{}]: {}", error.id, error.code, error.message);
    }

    Ok(())
}
