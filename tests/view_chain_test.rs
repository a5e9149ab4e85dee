//! The full view chain: locking, error capture and notifications.

use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tessera::push::BroadcastListener;
use tessera::services::{ErrorManager, FunctionNames, ResultsCache};
use tessera::simulation::{self, SimulatedEngine};
use tessera::types::{
    Entity, EntityChange, FixedPortfolio, Format, GraphSource, GridRef, GridType, ObjectId, Portfolio, Position,
    Security, Value, VersionCorrection, ViewportDefinition,
};
use tessera::{build_chain, AnalyticsError, AnalyticsView, SimpleAnalyticsView, ViewSettings};
use tokio::sync::broadcast;

const PORTFOLIO: GridRef = GridRef {
    grid_type: GridType::Portfolio,
    graph_id: None,
};
const PRIMITIVES: GridRef = GridRef {
    grid_type: GridType::Primitives,
    graph_id: None,
};

struct Harness {
    view: Arc<dyn AnalyticsView>,
    rx: broadcast::Receiver<String>,
    engine: SimulatedEngine,
}

fn harness_with(settings: ViewSettings, supplied: Portfolio, timing: bool) -> Harness {
    let listener = BroadcastListener::new(256);
    let rx = listener.subscribe();
    let functions = FunctionNames::new();
    for (id, name) in simulation::FUNCTIONS {
        functions.register(id, name);
    }
    let simple = SimpleAnalyticsView::new(
        settings.with_callback_ids("portfolio", "primitives"),
        ResultsCache::new(5),
        ErrorManager::new("errors"),
        functions,
    );
    let view = build_chain(simple, Arc::new(FixedPortfolio(Some(supplied))), listener, timing);
    Harness {
        view,
        rx,
        engine: SimulatedEngine::new(simulation::demo_portfolio(3)),
    }
}

fn harness() -> Harness {
    harness_with(ViewSettings::new("view-1"), simulation::demo_portfolio(3), false)
}

impl Harness {
    fn structure(&mut self) -> Vec<String> {
        let ids = self
            .view
            .update_structure(self.engine.compiled(), Some(self.engine.portfolio().clone()))
            .unwrap();
        self.drain();
        ids
    }

    fn cycle(&mut self) -> Vec<String> {
        let (results, cycle) = self.engine.next_cycle();
        self.view.update_results(&results, cycle).unwrap()
    }

    /// Everything the listener has been told since the last drain.
    fn drain(&mut self) -> Vec<String> {
        let mut ids = Vec::new();
        while let Ok(id) = self.rx.try_recv() {
            ids.push(id);
        }
        ids
    }

    fn whole_grid(&self, grid: GridRef, version: i64) -> ViewportDefinition {
        let layout = self.view.initial_grid_structure(grid).unwrap();
        ViewportDefinition::rectangular(
            version,
            (0..layout.row_count).collect(),
            (0..layout.column_count()).collect(),
            Format::Cell,
        )
    }
}

fn contains(ids: &[String], id: &str) -> bool {
    ids.iter().any(|i| i == id)
}

// =============================================================================
// Structure and cycles
// =============================================================================

#[test]
fn test_first_structure_applies_immediately() {
    let mut h = harness();
    let ids = h
        .view
        .update_structure(h.engine.compiled(), Some(h.engine.portfolio().clone()))
        .unwrap();
    assert!(contains(&ids, "portfolio"));
    assert!(contains(&ids, "primitives"));
    assert_eq!(h.drain(), ids);

    let layout = h.view.initial_grid_structure(PORTFOLIO).unwrap();
    assert_eq!(layout.row_count, 10);
    assert_eq!(layout.column_count(), 5);
    let primitives = h.view.initial_grid_structure(PRIMITIVES).unwrap();
    assert_eq!(primitives.row_count, 1);
    assert_eq!(primitives.column_count(), 2);
}

#[test]
fn test_recompilation_waits_for_next_cycle() {
    let mut h = harness();
    h.structure();

    let smaller = simulation::demo_portfolio(2);
    let compiled = Arc::new(simulation::demo_view(&smaller));
    let ids = h.view.update_structure(compiled, Some(smaller)).unwrap();
    assert!(ids.is_empty());
    assert!(h.drain().is_empty());
    assert_eq!(h.view.initial_grid_structure(PORTFOLIO).unwrap().row_count, 10);

    let ids = h.cycle();
    assert!(contains(&ids, "portfolio"));
    assert!(contains(&ids, "primitives"));
    assert_eq!(h.view.initial_grid_structure(PORTFOLIO).unwrap().row_count, 7);
}

#[test]
fn test_viewports_follow_cycles_and_inlining() {
    let mut h = harness();
    h.structure();

    // quantities are cached with the structure
    let definition = h.whole_grid(PORTFOLIO, 1);
    assert!(h.view.create_viewport(PORTFOLIO, 1, "vp", "vp-s", definition).unwrap());
    assert_eq!(h.drain(), vec!["vp".to_string()]);

    let prim = h.whole_grid(PRIMITIVES, 1);
    assert!(!h.view.create_viewport(PRIMITIVES, 1, "prim", "prim-s", prim).unwrap());
    assert!(h.drain().is_empty());

    // the first cycle brings vector results, so the columns change
    let ids = h.cycle();
    assert!(contains(&ids, "portfolio"));
    assert!(!contains(&ids, "vp"));
    assert!(contains(&ids, "prim"));
    assert_eq!(h.view.initial_grid_structure(PORTFOLIO).unwrap().column_count(), 7);

    let definition = h.whole_grid(PORTFOLIO, 2);
    assert_eq!(
        h.view.update_viewport(PORTFOLIO, 1, definition).unwrap(),
        Some("vp".to_string())
    );
    let data = h.view.get_data(PORTFOLIO, 1).unwrap();
    assert_eq!(data.version, 2);
    assert_eq!(data.cells.len(), 70);

    h.drain();
    let ids = h.cycle();
    assert!(contains(&ids, "vp"));
    assert!(contains(&ids, "prim"));
    assert_eq!(h.drain(), ids);
}

#[test]
fn test_all_grid_data_renders_every_cell() {
    let mut h = harness();
    h.structure();
    h.cycle();

    let data = h.view.all_grid_data(GridType::Primitives, Format::Cell).unwrap();
    assert_eq!(data.cells.len(), 2);
    assert_eq!(data.cell(0, 0).unwrap().value, Value::Text("USD-CURVE".into()));
    assert!(matches!(data.cell(0, 1).unwrap().value, Value::Double(_)));

    let history = h.view.all_grid_data(GridType::Primitives, Format::History).unwrap();
    assert_eq!(history.cell(0, 1).unwrap().history.as_ref().map(Vec::len), Some(1));
}

#[test]
fn test_view_definition_id() {
    let h = harness();
    assert_eq!(h.view.view_definition_id().unwrap(), "view-1");
}

#[test]
fn test_get_data_reads_while_cycles_run() {
    let mut h = harness();
    h.structure();
    let whole = h.whole_grid(PORTFOLIO, 3);
    h.view.create_viewport(PORTFOLIO, 1, "vp", "vp-s", whole).unwrap();

    let done = AtomicBool::new(false);
    let view = &h.view;
    let engine = &mut h.engine;
    let reads = std::thread::scope(|s| {
        let reader = s.spawn(|| {
            let mut reads = 0;
            loop {
                let finished = done.load(Ordering::Acquire);
                let data = view.get_data(PORTFOLIO, 1).unwrap();
                assert_eq!(data.version, 3);
                assert_eq!(data.cells.len(), 50);
                reads += 1;
                if finished {
                    return reads;
                }
            }
        });
        for _ in 0..50 {
            let (results, cycle) = engine.next_cycle();
            view.update_results(&results, cycle).unwrap();
        }
        done.store(true, Ordering::Release);
        reader.join().unwrap()
    });
    assert!(reads > 0);
    let data = h.view.get_data(PORTFOLIO, 1).unwrap();
    assert!(data.cells.iter().any(|c| matches!(c.value, Value::Double(_))));
}

#[test]
fn test_timing_layer_is_transparent() {
    let mut h = harness_with(ViewSettings::new("timed"), simulation::demo_portfolio(3), true);
    h.structure();
    let prim = h.whole_grid(PRIMITIVES, 1);
    h.view.create_viewport(PRIMITIVES, 1, "prim", "prim-s", prim).unwrap();
    let ids = h.cycle();
    assert!(contains(&ids, "prim"));
    assert_eq!(h.view.view_definition_id().unwrap(), "timed");
}

// =============================================================================
// Errors
// =============================================================================

#[test]
fn test_failures_are_recorded_and_announced() {
    let mut h = harness();
    h.structure();

    let bad = ViewportDefinition::rectangular(1, vec![99], vec![0], Format::Cell);
    let err = h.view.create_viewport(PORTFOLIO, 1, "vp", "vp-s", bad).unwrap_err();
    assert_eq!(err.code(), "INVALID_VIEWPORT");
    assert_eq!(h.drain(), vec!["errors".to_string()]);

    let errors = h.view.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "INVALID_VIEWPORT");
    assert_eq!(errors[0].message, err.to_string());

    h.view.delete_error(errors[0].id).unwrap();
    assert!(h.view.errors().is_empty());
    assert!(h.drain().is_empty());
}

#[test]
fn test_deleting_unknown_error_is_itself_recorded() {
    let mut h = harness();
    assert!(matches!(h.view.delete_error(42), Err(AnalyticsError::NotFound(_))));
    assert_eq!(h.view.errors().len(), 1);
    assert_eq!(h.drain(), vec!["errors".to_string()]);
}

#[test]
fn test_unknown_viewport_read() {
    let mut h = harness();
    h.structure();
    let err = h.view.get_data(PORTFOLIO, 7).unwrap_err();
    assert_eq!(err.code(), "NOT_FOUND");
    assert_eq!(h.view.errors().len(), 1);
    assert_eq!(h.drain(), vec!["errors".to_string()]);
}

#[test]
fn test_compilation_failure_reported_as_error() {
    let mut h = harness();
    let id = h.view.view_compilation_failed("missing function").unwrap();
    assert_eq!(id, "errors");
    assert_eq!(h.drain(), vec!["errors".to_string()]);

    let errors = h.view.errors();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].code, "COMPILATION_FAILED");
    assert!(errors[0].message.contains("missing function"));
}

// =============================================================================
// Dependency graphs
// =============================================================================

#[test]
fn test_dependency_graph_lifecycle() {
    let mut h = harness();
    h.structure();
    h.cycle();
    h.drain();

    h.view
        .open_dependency_graph(GridType::Portfolio, 1, "graph", GraphSource::Cell { row: 2, col: 3 })
        .unwrap();
    assert_eq!(h.drain(), vec!["graph".to_string()]);

    let graph = GridRef::graph(GridType::Portfolio, 1);
    let layout = h.view.initial_grid_structure(graph).unwrap();
    assert_eq!(layout.row_count, 4);
    assert_eq!(layout.column_count(), 6);

    let definition = h.whole_grid(graph, 1);
    assert!(h.view.create_viewport(graph, 1, "graph-vp", "graph-vp-s", definition).unwrap());
    let data = h.view.get_data(graph, 1).unwrap();
    assert!(matches!(data.cell(0, 3).unwrap().value, Value::Double(v) if v > 0.0));
    assert!(h.view.viewport_grid_structure(graph, 1).unwrap().root.is_some());

    h.view.close_dependency_graph(GridType::Portfolio, 1).unwrap();
    assert!(h.view.initial_grid_structure(graph).is_err());
    assert!(h.view.get_data(graph, 1).is_err());
}

#[test]
fn test_graph_on_label_cell_fails() {
    let mut h = harness();
    h.structure();
    let err = h
        .view
        .open_dependency_graph(GridType::Portfolio, 1, "graph", GraphSource::Cell { row: 0, col: 0 })
        .unwrap_err();
    assert_eq!(err.code(), "NO_TARGET");
    assert_eq!(h.drain(), vec!["errors".to_string()]);
}

// =============================================================================
// Entity changes
// =============================================================================

fn stock_0(quantity: f64) -> EntityChange {
    EntityChange::changed(Entity::Position(Position::new(
        "pos-0",
        quantity,
        Security::fungible("sec-0", "Stock 0"),
    )))
}

#[test]
fn test_changed_position_refreshes_viewports() {
    let mut h = harness();
    h.structure();
    let quantities = ViewportDefinition::rectangular(1, vec![2], vec![1], Format::Cell);
    h.view.create_viewport(PORTFOLIO, 1, "qty", "qty-s", quantities).unwrap();
    h.drain();

    let ids = h.view.entity_changed(&stock_0(999.0)).unwrap();
    assert_eq!(ids, vec!["qty".to_string()]);
    assert_eq!(h.drain(), ids);
    let data = h.view.get_data(PORTFOLIO, 1).unwrap();
    assert_eq!(data.cell(2, 1).unwrap().value, Value::Double(999.0));
}

#[test]
fn test_irrelevant_changes_ignored() {
    let mut h = harness();
    h.structure();

    let mut added = stock_0(1.0);
    added.change_type = tessera::types::ChangeType::Added;
    assert!(h.view.entity_changed(&added).unwrap().is_empty());

    // never part of the portfolio
    let unknown = EntityChange::changed(Entity::Security(Security::otc("sec-x", "Other")));
    assert!(h.view.entity_changed(&unknown).unwrap().is_empty());

    // superseded by a later version
    let mut old = stock_0(1.0);
    old.version_to = Some(Utc::now());
    assert!(h.view.entity_changed(&old).unwrap().is_empty());
    assert!(h.drain().is_empty());
}

#[test]
fn test_corrected_view_ignores_changes() {
    let corrected = VersionCorrection {
        version_as_of: None,
        corrected_to: Some(Utc::now()),
    };
    let mut h = harness_with(
        ViewSettings::new("view-1").with_version_correction(corrected),
        simulation::demo_portfolio(3),
        false,
    );
    h.structure();
    assert!(h.view.entity_changed(&stock_0(5.0)).unwrap().is_empty());
}

#[test]
fn test_removed_position_rebuilds_rows() {
    // the store no longer has pos-2
    let mut h = harness_with(ViewSettings::new("view-1"), simulation::demo_portfolio(2), false);
    h.structure();
    let all = h.whole_grid(PORTFOLIO, 1);
    h.view.create_viewport(PORTFOLIO, 1, "vp", "vp-s", all).unwrap();
    h.drain();

    let ids = h.view.entity_changed(&EntityChange::removed(ObjectId::from("pos-2"))).unwrap();
    assert!(contains(&ids, "portfolio"));
    assert!(contains(&ids, "vp"));
    assert_eq!(h.view.initial_grid_structure(PORTFOLIO).unwrap().row_count, 7);

    // cells below the new last row are dropped
    let data = h.view.get_data(PORTFOLIO, 1).unwrap();
    assert_eq!(data.cells.len(), 7 * 5);
}

#[test]
fn test_portfolio_changed_rereads_supplier() {
    let mut h = harness_with(ViewSettings::new("view-1"), simulation::demo_portfolio(5), false);
    h.structure();
    let ids = h.view.portfolio_changed().unwrap();
    assert!(contains(&ids, "portfolio"));
    // Stock 4 and its trades, plus 3Y Swap
    assert_eq!(h.view.initial_grid_structure(PORTFOLIO).unwrap().row_count, 14);
}
