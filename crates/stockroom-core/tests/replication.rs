use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use stockroom_core::gateway::GatewayCall;
use stockroom_core::{
    Business, CollectionName, Config, ConnectivityMonitor, Document, GatewayError,
    InMemoryGateway, NewArticle, PassOutcome, PassStats, ReplicationEngine, Store, Trigger,
};
use tempfile::TempDir;

fn online_engine(store: Store) -> (ReplicationEngine, Arc<InMemoryGateway>) {
    let gateway = Arc::new(InMemoryGateway::new());
    let engine = ReplicationEngine::new(
        store,
        gateway.clone(),
        ConnectivityMonitor::with_state(true),
    );
    (engine, gateway)
}

fn article(business_id: &str, name: &str) -> NewArticle {
    NewArticle {
        name: name.to_string(),
        quantity: 10,
        unit_price: 1.5,
        business_id: business_id.to_string(),
    }
}

async fn pass(engine: &ReplicationEngine) -> PassStats {
    match engine.run_pass(Trigger::Manual).await {
        PassOutcome::Completed(stats) => stats,
        other => panic!("expected a completed pass, got {:?}", other),
    }
}

#[tokio::test]
async fn second_pass_writes_nothing() {
    let store = Store::open_in_memory().unwrap();
    let acme = store.add_business("Acme").unwrap();
    store.add_article(article(&acme.id, "Bolt")).unwrap();
    let (engine, gateway) = online_engine(store.clone());

    let first = pass(&engine).await;
    assert_eq!(first.created, 2);

    gateway.reset_calls();
    let second = pass(&engine).await;
    assert_eq!(second.pushed(), 0);
    assert_eq!(gateway.calls().writes(), 0);
    assert!(store.backlog().is_clear());
}

#[tokio::test]
async fn pull_finishes_before_any_write() {
    let store = Store::open_in_memory().unwrap();
    store.add_business("Local").unwrap();
    let (engine, gateway) = online_engine(store.clone());
    gateway.seed(CollectionName::Businesses, "remote-1", json!({ "name": "Remote" }));

    pass(&engine).await;

    let log = gateway.call_log();
    let last_list = log
        .iter()
        .rposition(|call| matches!(call, GatewayCall::List(_)))
        .unwrap();
    let first_write = log.iter().position(GatewayCall::is_write).unwrap();
    assert!(last_list < first_write, "call order was {:?}", log);
    assert_eq!(store.visible_businesses().len(), 2);
}

#[tokio::test]
async fn pull_resolves_same_id_create_without_duplicate() {
    let store = Store::open_in_memory().unwrap();
    store
        .businesses()
        .insert(Business::with_id("b1", "Acme"))
        .unwrap();
    let (engine, gateway) = online_engine(store.clone());
    let remote_rev =
        gateway.seed(CollectionName::Businesses, "b1", json!({ "name": "Acme Remote" }));

    let stats = pass(&engine).await;

    assert_eq!(stats.pulled_updated, 1);
    assert_eq!(gateway.calls().creates, 0);
    let local = store.businesses().find_by_id("b1").unwrap();
    assert_eq!(local.name, "Acme Remote");
    assert_eq!(local.revision(), Some(&remote_rev));
    assert!(store.backlog().is_clear());
}

#[tokio::test]
async fn offline_pass_is_a_no_op() {
    let store = Store::open_in_memory().unwrap();
    store.add_business("Acme").unwrap();
    let gateway = Arc::new(InMemoryGateway::new());
    let engine = ReplicationEngine::new(
        store.clone(),
        gateway.clone(),
        ConnectivityMonitor::with_state(false),
    );

    assert_eq!(engine.run_pass(Trigger::Manual).await, PassOutcome::Offline);
    assert_eq!(gateway.calls().total(), 0);
    assert_eq!(store.backlog().businesses.pending_creates, 1);
}

#[tokio::test]
async fn deleting_a_business_removes_its_articles_everywhere() {
    let store = Store::open_in_memory().unwrap();
    let acme = store.add_business("Acme").unwrap();
    let other = store.add_business("Other").unwrap();
    store.add_article(article(&acme.id, "Bolt")).unwrap();
    store.add_article(article(&acme.id, "Nut")).unwrap();
    let kept = store.add_article(article(&other.id, "Screw")).unwrap();
    let (engine, gateway) = online_engine(store.clone());
    pass(&engine).await;

    assert_eq!(store.delete_business(&acme.id).unwrap(), 2);
    assert!(store.articles_for_business(&acme.id).is_empty());
    assert_eq!(store.backlog().articles.tombstones, 2);

    let stats = pass(&engine).await;
    assert_eq!(stats.deleted, 3);
    assert!(gateway.get(CollectionName::Businesses, &acme.id).is_none());
    assert_eq!(gateway.documents(CollectionName::Articles).len(), 1);
    assert!(gateway.get(CollectionName::Articles, &kept.id).is_some());
    assert!(store.businesses().find_by_id(&acme.id).is_none());
    assert_eq!(store.articles().len(), 1);
}

#[tokio::test]
async fn article_pulled_under_deleted_business_is_deleted_too() {
    let store = Store::open_in_memory().unwrap();
    let acme = store.add_business("Acme").unwrap();
    let (engine, gateway) = online_engine(store.clone());
    pass(&engine).await;

    store.delete_business(&acme.id).unwrap();
    gateway.seed(
        CollectionName::Articles,
        "a-remote",
        json!({ "name": "Late", "qty": 1, "selling_price": 2.0, "business_id": acme.id }),
    );
    let stats = pass(&engine).await;

    assert_eq!(stats.pulled_inserted, 1);
    assert_eq!(stats.deleted, 2);
    assert!(store.businesses().find_by_id(&acme.id).is_none());
    assert!(store.articles().is_empty());
    assert!(gateway.get(CollectionName::Articles, "a-remote").is_none());
    assert!(gateway.get(CollectionName::Businesses, &acme.id).is_none());
}

#[tokio::test]
async fn pending_create_receives_revision() {
    let store = Store::open_in_memory().unwrap();
    store
        .businesses()
        .insert(Business::with_id("b1", "Acme"))
        .unwrap();
    let (engine, gateway) = online_engine(store.clone());

    pass(&engine).await;

    let local = store.businesses().find_by_id("b1").unwrap();
    let remote = gateway.get(CollectionName::Businesses, "b1").unwrap();
    assert_eq!(local.revision(), Some(&remote.revision));
    assert!(remote.revision.as_str().starts_with("1-"));
    assert_eq!(remote.body, json!({ "name": "Acme" }));
}

#[tokio::test]
async fn replicated_state_survives_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let config = Config {
        data_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };
    let gateway = Arc::new(InMemoryGateway::new());

    let acme_id = {
        let store = Store::open_with_config(config.clone()).unwrap();
        let acme = store.add_business("Acme").unwrap();
        store.add_article(article(&acme.id, "Bolt")).unwrap();
        let engine = ReplicationEngine::new(
            store,
            gateway.clone(),
            ConnectivityMonitor::with_state(true),
        );
        pass(&engine).await;
        acme.id
    };

    let store = Store::open_with_config(config).unwrap();
    let acme = store.businesses().find_by_id(&acme_id).unwrap();
    assert_eq!(
        acme.revision(),
        Some(&gateway.get(CollectionName::Businesses, &acme_id).unwrap().revision)
    );
    assert!(store.backlog().is_clear());

    gateway.reset_calls();
    let engine = ReplicationEngine::new(
        store,
        gateway.clone(),
        ConnectivityMonitor::with_state(true),
    );
    pass(&engine).await;
    assert_eq!(gateway.calls().writes(), 0);
}

#[tokio::test]
async fn export_import_round_trip_is_exact() {
    let store = Store::open_in_memory().unwrap();
    let acme = store.add_business("Acme").unwrap();
    let bolt = store.add_article(article(&acme.id, "Bolt")).unwrap();
    store.add_article(article(&acme.id, "Nut")).unwrap();
    let (engine, _gateway) = online_engine(store.clone());
    pass(&engine).await;
    store.rename_business(&acme.id, "Acme Ltd").unwrap();
    store.delete_article(&bolt.id).unwrap();
    store.add_business("Pending").unwrap();

    let original = store.export();
    let json = serde_json::to_string(&original).unwrap();
    let restored = Store::open_in_memory().unwrap();
    restored.import(serde_json::from_str(&json).unwrap()).unwrap();

    let copy = restored.export();
    assert_eq!(copy.businesses, original.businesses);
    assert_eq!(copy.articles, original.articles);
    assert_eq!(restored.backlog(), store.backlog());
    assert!(restored.articles().find_by_id(&bolt.id).unwrap().is_tombstoned());
}

#[tokio::test(start_paused = true)]
async fn concurrent_passes_are_coalesced() {
    let store = Store::open_in_memory().unwrap();
    store.add_business("Acme").unwrap();
    let (engine, gateway) = online_engine(store);
    gateway.set_latency(Duration::from_millis(50));

    let (first, second) = tokio::join!(
        engine.run_pass(Trigger::Manual),
        engine.run_pass(Trigger::LocalChange)
    );

    assert!(first.is_completed());
    assert_eq!(second, PassOutcome::Coalesced);
    assert_eq!(gateway.calls().creates, 1);
    assert_eq!(gateway.calls().probes, 1);
}

#[tokio::test]
async fn delete_conflict_is_retried_with_fresh_revision() {
    let store = Store::open_in_memory().unwrap();
    let acme = store.add_business("Acme").unwrap();
    let (engine, gateway) = online_engine(store.clone());
    pass(&engine).await;

    store.delete_business(&acme.id).unwrap();
    gateway.conflict_next_write(CollectionName::Businesses, &acme.id);
    let stats = pass(&engine).await;

    assert_eq!(stats.conflicts, 1);
    assert_eq!(stats.deleted, 1);
    assert!(gateway.get(CollectionName::Businesses, &acme.id).is_none());
    assert!(store.businesses().find_by_id(&acme.id).is_none());
}

#[tokio::test]
async fn rejected_create_adopts_remote_copy() {
    let store = Store::open_in_memory().unwrap();
    store
        .businesses()
        .insert(Business::with_id("b1", "Acme"))
        .unwrap();
    let (engine, gateway) = online_engine(store.clone());
    let remote_rev =
        gateway.seed(CollectionName::Businesses, "b1", json!({ "name": "Acme Remote" }));
    gateway.set_listings_fail(true);

    let stats = pass(&engine).await;

    assert_eq!(stats.adopted, 1);
    assert_eq!(stats.conflicts, 1);
    let local = store.businesses().find_by_id("b1").unwrap();
    assert_eq!(local.name, "Acme Remote");
    assert_eq!(local.revision(), Some(&remote_rev));
    assert!(!local.needs_push());
}

#[tokio::test]
async fn failed_write_stays_pending_until_next_pass() {
    let store = Store::open_in_memory().unwrap();
    let acme = store.add_business("Acme").unwrap();
    let (engine, gateway) = online_engine(store.clone());
    gateway.fail_next_write(
        CollectionName::Businesses,
        &acme.id,
        GatewayError::Unavailable("timed out".to_string()),
    );

    let stats = pass(&engine).await;
    assert_eq!(stats.deferred, 1);
    assert!(store.businesses().find_by_id(&acme.id).unwrap().is_pending());

    let stats = pass(&engine).await;
    assert_eq!(stats.created, 1);
    assert!(store.backlog().is_clear());
}

#[tokio::test]
async fn pulled_documents_reach_subscribers() {
    let store = Store::open_in_memory().unwrap();
    let mut subscription = store.businesses().subscribe();
    assert!(subscription.next().await.unwrap().is_empty());

    let (engine, gateway) = online_engine(store.clone());
    gateway.seed(CollectionName::Businesses, "b9", json!({ "name": "Remote" }));
    pass(&engine).await;

    let snapshot = subscription.latest().unwrap();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].name, "Remote");
}

#[tokio::test]
async fn unreachable_remote_leaves_store_untouched() {
    let store = Store::open_in_memory().unwrap();
    store.add_business("Acme").unwrap();
    let (engine, gateway) = online_engine(store.clone());
    gateway.set_reachable(false);

    assert_eq!(engine.run_pass(Trigger::Manual).await, PassOutcome::Unreachable);
    assert_eq!(gateway.call_log(), vec![GatewayCall::Probe]);
    assert_eq!(store.backlog().businesses.pending_creates, 1);
}
