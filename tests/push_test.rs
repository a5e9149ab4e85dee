//! Push clients receiving view notifications through the router.

use std::sync::Arc;
use tessera::push::{PushMessage, UpdateRouter};
use tessera::services::{ErrorManager, FunctionNames, ResultsCache};
use tessera::simulation::{self, SimulatedEngine};
use tessera::types::{FixedPortfolio, Format, GridRef, GridType, ViewportDefinition};
use tessera::{build_chain, AnalyticsView, SimpleAnalyticsView, ViewSettings};
use tokio::sync::mpsc;

fn view(router: Arc<UpdateRouter>, engine: &SimulatedEngine) -> Arc<dyn AnalyticsView> {
    let simple = SimpleAnalyticsView::new(
        ViewSettings::new("push-view").with_callback_ids("portfolio", "primitives"),
        ResultsCache::new(3),
        ErrorManager::new("errors"),
        FunctionNames::new(),
    );
    build_chain(
        simple,
        Arc::new(FixedPortfolio(Some(engine.portfolio().clone()))),
        router,
        false,
    )
}

fn parse(json: &str) -> PushMessage {
    serde_json::from_str(json).unwrap()
}

#[tokio::test]
async fn test_subscribed_client_hears_about_its_viewport() {
    let router = UpdateRouter::new();
    let mut engine = SimulatedEngine::new(simulation::demo_portfolio(3));
    let view = view(router.clone(), &engine);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = router.register(tx);
    router.handle_message(client, r#"{"type":"subscribe","callbackIds":["prim"]}"#);
    assert_eq!(
        parse(&rx.recv().await.unwrap()),
        PushMessage::Subscribed {
            callback_ids: vec!["prim".to_string()]
        }
    );

    view.update_structure(engine.compiled(), Some(engine.portfolio().clone()))
        .unwrap();
    let primitives = GridRef::main(GridType::Primitives);
    let definition = ViewportDefinition::rectangular(1, vec![0], vec![0, 1], Format::Cell);
    view.create_viewport(primitives, 1, "prim", "prim-s", definition)
        .unwrap();
    assert!(rx.try_recv().is_err());

    let (results, cycle) = engine.next_cycle();
    view.update_results(&results, cycle).unwrap();
    assert_eq!(
        parse(&rx.recv().await.unwrap()),
        PushMessage::Updated {
            callback_ids: vec!["prim".to_string()]
        }
    );
}

#[tokio::test]
async fn test_clients_only_get_their_own_ids() {
    let router = UpdateRouter::new();
    let engine = SimulatedEngine::new(simulation::demo_portfolio(1));
    let view = view(router.clone(), &engine);

    let (tx_a, mut rx_a) = mpsc::unbounded_channel();
    let (tx_b, mut rx_b) = mpsc::unbounded_channel();
    let a = router.register(tx_a);
    let b = router.register(tx_b);
    router.subscribe(a, &["portfolio".to_string(), "primitives".to_string()]);
    router.subscribe(b, &["errors".to_string()]);

    view.update_structure(engine.compiled(), Some(engine.portfolio().clone()))
        .unwrap();
    // one batched message per client, IDs sorted
    assert_eq!(
        parse(&rx_a.recv().await.unwrap()),
        PushMessage::Updated {
            callback_ids: vec!["portfolio".to_string(), "primitives".to_string()]
        }
    );
    assert!(rx_b.try_recv().is_err());

    view.get_data(GridRef::main(GridType::Portfolio), 9).unwrap_err();
    assert_eq!(
        parse(&rx_b.recv().await.unwrap()),
        PushMessage::Updated {
            callback_ids: vec!["errors".to_string()]
        }
    );
    assert!(rx_a.try_recv().is_err());
}

#[tokio::test]
async fn test_malformed_request_gets_error_reply() {
    let router = UpdateRouter::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client = router.register(tx);

    router.handle_message(client, r#"{"type":"subscribe"}"#);
    match parse(&rx.recv().await.unwrap()) {
        PushMessage::Error { error } => assert!(error.starts_with("Invalid message")),
        other => panic!("Expected error reply, got {:?}", other),
    }
    assert_eq!(router.room_count(), 0);
}
