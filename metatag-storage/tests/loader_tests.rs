//! Batch loader integration tests with counting fetch mocks.

use futures_util::future::join_all;
use metatag_storage::{LoadHooks, Proxy};
use metatag_test_utils::{run_local, BatchLoader, CountingBatchFetch, CountingFetch, LoaderError};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
struct WordQuery {
    word: String,
    lang: String,
}

fn query(word: &str) -> WordQuery {
    WordQuery {
        word: word.to_string(),
        lang: "en".to_string(),
    }
}

#[tokio::test]
async fn test_identical_requests_in_one_tick_fetch_once() {
    run_local(async {
        let fetch = CountingFetch::new(|q: &WordQuery| Ok(Some(q.word.len())));
        let calls = fetch.calls();
        let loader = BatchLoader::builder("words").single(fetch).build().unwrap();

        let results = join_all((0..10).map(|_| loader.load(query("lantern")))).await;
        assert_eq!(calls.get(), 1);
        assert!(results.iter().all(|r| r.as_deref() == Some(&7)));
    })
    .await;
}

#[tokio::test]
async fn test_batch_gets_unique_inputs_in_request_order() {
    run_local(async {
        let fetch = CountingBatchFetch::new(|q: &WordQuery| Some(q.word.to_uppercase()));
        let batches = fetch.batches();
        let loader = BatchLoader::builder("words").batch(fetch).build().unwrap();

        let results = loader
            .load_many(vec![query("b"), query("a"), query("b"), query("c")])
            .await;
        let seen: Vec<Vec<String>> = batches
            .borrow()
            .iter()
            .map(|b| b.iter().map(|q| q.word.clone()).collect())
            .collect();
        assert_eq!(seen, vec![vec!["b", "a", "c"]]);
        let words: Vec<Option<&str>> = results.iter().map(|r| r.as_deref().map(String::as_str)).collect();
        assert_eq!(words, vec![Some("B"), Some("A"), Some("B"), Some("C")]);
    })
    .await;
}

#[tokio::test]
async fn test_throwing_batch_leaves_every_ticket_empty() {
    run_local(async {
        let fetch = CountingBatchFetch::<WordQuery, String>::failing(LoaderError::fetch_failed("503"));
        let batches = fetch.batches();
        let loader = BatchLoader::builder("words").batch(fetch).build().unwrap();

        let results = loader.load_many(vec![query("a"), query("b")]).await;
        assert_eq!(results, vec![None, None]);
        assert_eq!(batches.borrow().len(), 1);

        let err = loader.try_load(query("c")).await.unwrap_err();
        assert!(matches!(err, LoaderError::FetchFailed { .. }));
    })
    .await;
}

#[tokio::test]
async fn test_next_tick_refetches_same_key() {
    run_local(async {
        let fetch = CountingFetch::new(|q: &WordQuery| Ok(Some(q.word.clone())));
        let calls = fetch.calls();
        let loader = BatchLoader::builder("words").single(fetch).build().unwrap();

        let first = loader.load(query("x")).await;
        let second = loader.load(query("x")).await;
        assert_eq!(calls.get(), 2);
        assert_eq!(loader.ticks(), 2);
        assert_eq!(first, second);
    })
    .await;
}

struct Overrides;

impl LoadHooks<WordQuery, String> for Overrides {
    fn before(&self, input: &WordQuery) -> Proxy<String> {
        if input.word == "cached" {
            Proxy::Replace(Some("from-hook".to_string()))
        } else {
            Proxy::Pass
        }
    }
}

#[tokio::test]
async fn test_before_hook_skips_the_fetch() {
    run_local(async {
        let fetch = CountingFetch::new(|q: &WordQuery| Ok(Some(q.word.clone())));
        let inputs = fetch.inputs();
        let loader = BatchLoader::builder("words")
            .single(fetch)
            .hooks(Overrides)
            .build()
            .unwrap();

        let results = loader.load_many(vec![query("cached"), query("live")]).await;
        assert_eq!(results[0].as_deref().map(String::as_str), Some("from-hook"));
        assert_eq!(results[1].as_deref().map(String::as_str), Some("live"));
        assert_eq!(*inputs.borrow(), vec![query("live")]);
    })
    .await;
}
