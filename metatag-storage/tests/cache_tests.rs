//! Cache store integration tests: observers, events and the tag tree.

use metatag_storage::{CacheEventKind, FetchStatus, QueryStatus};
use metatag_test_utils::{
    fixtures, run_local, BatchLoader, CacheClient, CacheConfig, CountingFetch, EventRecorder,
    LoaderError, Node,
};
use std::rc::Rc;

fn word_loader() -> (BatchLoader<u32, String>, Rc<std::cell::Cell<usize>>) {
    let fetch = CountingFetch::new(|n: &u32| match n {
        0 => Err(LoaderError::fetch_failed("offline")),
        n => Ok(Some(format!("word-{}", n))),
    });
    let calls = fetch.calls();
    let loader = BatchLoader::builder("words").single(fetch).build().unwrap();
    (loader, calls)
}

#[tokio::test]
async fn test_observer_lifecycle_reports_every_transition() {
    run_local(async {
        let client = fixtures::client();
        let (loader, _) = word_loader();
        let store = client.store("words", loader).unwrap();
        store.write(1, Rc::new("one".to_string()));
        let recorder = EventRecorder::attach(&store);

        let a = store.observe(1);
        let b = store.observe(1);
        drop(a);
        drop(b);

        assert_eq!(store.observer_count(&1), 0);
        assert_eq!(
            recorder.observer_transitions(),
            vec![(0, 1), (1, 2), (2, 1), (1, 0)]
        );
        assert_eq!(recorder.count(CacheEventKind::ObserverCountChange), 4);
    })
    .await;
}

#[test]
fn test_tree_scenario_emits_one_data_change_per_step() {
    let (_client, tree) = fixtures::tag_tree(fixtures::three_roots());
    let recorder = EventRecorder::attach(tree.store());

    assert!(tree.move_down(0, None));
    assert_eq!(fixtures::ids(&tree.current()), vec!["WTK02", "WTK01", "WTK03"]);
    assert_eq!(recorder.count(CacheEventKind::DataChange), 1);

    assert!(tree.remove_at(2, None));
    assert_eq!(fixtures::ids(&tree.current()), vec!["WTK02", "WTK01"]);
    assert_eq!(recorder.count(CacheEventKind::DataChange), 2);

    assert_eq!(tree.insert(Node::new("WTK04"), None), Ok(true));
    assert_eq!(fixtures::ids(&tree.current()), vec!["WTK02", "WTK01", "WTK04"]);
    assert_eq!(recorder.count(CacheEventKind::DataChange), 3);

    let keys: Vec<String> = recorder
        .events()
        .into_iter()
        .filter(|r| r.kind == CacheEventKind::DataChange)
        .map(|r| r.key)
        .collect();
    assert!(keys.iter().all(|k| *k == tree.store().key_of(&())));
}

#[test]
fn test_tree_no_ops_emit_nothing() {
    let (_client, tree) = fixtures::tag_tree(fixtures::three_roots());
    let recorder = EventRecorder::attach(tree.store());
    let before = tree.current();

    assert!(!tree.move_up(0, None));
    assert!(!tree.move_down(2, None));
    assert!(!tree.remove_at(7, None));
    assert!(tree.show(1, None));

    assert!(Rc::ptr_eq(&before, &tree.current()));
    assert!(recorder.events().is_empty());
}

#[tokio::test]
async fn test_batch_observer_aggregate_settles() {
    run_local(async {
        let client = fixtures::client();
        let (loader, calls) = word_loader();
        let store = client.store("words", loader).unwrap();

        let batch = store.observe_many(vec![1, 2, 3]);
        let loading = batch.snapshot();
        assert_eq!(loading.status, QueryStatus::Loading);
        assert_eq!(loading.fetch_status, FetchStatus::Fetching);

        let results = store.batch_fetch_query(vec![1, 2, 3]).await;
        assert!(results.iter().all(Option::is_some));
        let settled = batch.snapshot();
        assert_eq!(calls.get(), 3);
        assert_eq!(settled.status, QueryStatus::Success);
        assert_eq!(settled.fetch_status, FetchStatus::Idle);
        assert_eq!(settled.data[2].as_deref().map(String::as_str), Some("word-3"));

        assert!(Rc::ptr_eq(&settled, &batch.snapshot()));
        let version = batch.version();
        store.write(2, Rc::new("two".to_string()));
        assert_eq!(batch.version(), version + 1);
        assert!(!Rc::ptr_eq(&settled, &batch.snapshot()));
    })
    .await;
}

#[tokio::test]
async fn test_batch_observer_reports_errors() {
    run_local(async {
        let client = fixtures::client();
        let (loader, _) = word_loader();
        let store = client.store("words", loader).unwrap();

        let batch = store.observe_many(vec![4, 0]);
        let results = store.batch_fetch_query(vec![4, 0]).await;
        assert!(results[1].is_none());
        let snapshot = batch.snapshot();
        assert_eq!(snapshot.status, QueryStatus::Error);
        assert!(snapshot.errors[0].is_none());
        assert!(snapshot.errors[1].is_some());
    })
    .await;
}

#[test]
fn test_change_trigger_counts_accepted_changes() {
    let (_client, tree) = fixtures::tag_tree(fixtures::three_roots());
    let trigger = tree
        .store()
        .change_trigger(|_, new, _| new.is_some_and(|t| t.len() > 2));

    tree.move_down(0, None);
    tree.remove_at(0, None);
    assert_eq!(trigger.count(), 1);

    trigger.set_check(|_, _, _| true);
    tree.remove_at(0, None);
    assert_eq!(trigger.count(), 2);

    drop(trigger);
    assert_eq!(tree.store().events().listener_count(&CacheEventKind::DataChange), 0);
}

#[test]
fn test_client_stats_cover_every_namespace() {
    let client = CacheClient::new(CacheConfig::default()).unwrap();
    let (loader, _) = word_loader();
    let words = client.store("words", loader).unwrap();
    let tree = metatag_storage::TagTree::new(&client).unwrap();
    tree.replace_all(fixtures::nested());
    words.write(5, Rc::new("five".to_string()));
    words.write(6, Rc::new("six".to_string()));

    let stats = client.stats();
    assert_eq!(stats.namespaces.len(), 2);
    assert_eq!(stats.entries, 3);
    assert!(client.namespaces().contains(&"word-type".to_string()));

    client.clear();
    assert!(tree.current().is_empty());
    assert!(words.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_client_sweeper_releases_unobserved_entries() {
    run_local(async {
        let config = CacheConfig::new().with_retention(std::time::Duration::from_secs(1));
        let client = CacheClient::new(config).unwrap();
        let (loader, _) = word_loader();
        let store = client.store("words", loader).unwrap();
        store.write(1, Rc::new("one".to_string()));
        store.write(2, Rc::new("two".to_string()));
        let _kept = store.observe(2);
        let recorder = EventRecorder::attach(&store);

        let sweeper = client.spawn_gc(std::time::Duration::from_millis(250));
        tokio::time::sleep(std::time::Duration::from_secs(2)).await;

        assert_eq!(recorder.count(CacheEventKind::QueryRemoved), 1);
        assert_eq!(recorder.count(CacheEventKind::DataChange), 1);
        assert_eq!(client.stats().entries, 1);
        sweeper.abort();
    })
    .await;
}

async fn settle_background_work() {
    for _ in 0..5 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_write_during_fetch_is_kept() {
    run_local(async {
        let client = fixtures::client();
        let (loader, calls) = word_loader();
        let store = client.store("words", loader).unwrap();

        let _observer = store.observe(7);
        assert_eq!(store.snapshot(&7).unwrap().fetch_status, FetchStatus::Fetching);
        let written = Rc::new("written".to_string());
        store.write(7, Rc::clone(&written));
        let recorder = EventRecorder::attach(&store);

        settle_background_work().await;

        assert_eq!(calls.get(), 1);
        let snapshot = store.snapshot(&7).unwrap();
        assert!(Rc::ptr_eq(snapshot.value.as_ref().unwrap(), &written));
        assert_eq!(snapshot.status, QueryStatus::Success);
        assert_eq!(snapshot.fetch_status, FetchStatus::Idle);
        assert_eq!(recorder.count(CacheEventKind::DataChange), 0);
    })
    .await;
}

#[tokio::test]
async fn test_tree_hydrated_after_observe_survives_initial_load() {
    run_local(async {
        let client = fixtures::client();
        let tree = metatag_test_utils::TagTree::new(&client).unwrap();
        let _observer = tree.observe();
        tree.replace_all(fixtures::three_roots());

        settle_background_work().await;

        assert_eq!(tree.current().len(), 3);
        assert_eq!(
            tree.store().snapshot(&()).unwrap().fetch_status,
            FetchStatus::Idle
        );
    })
    .await;
}
