//! Deduplicating batch loader.
//!
//! Every request made during one turn of the local task set lands in the same
//! [`BatchLoadHelper`] ledger. The first request of a turn schedules a tick on
//! the `LocalSet`; when the tick runs it takes the whole ledger, so requests
//! issued while it is fetching open the next ledger instead of joining it.
//!
//! Within a tick:
//!
//! 1. `before` hooks may settle tickets outright.
//! 2. One unsettled ticket and a single fetch: call it directly.
//! 3. Otherwise, with a batch fetch: one call for every unsettled ticket.
//! 4. Otherwise: one single fetch per ticket, concurrently, failures isolated.
//! 5. `after` hooks may replace any ticket's value.
//!
//! Fetch failures never escape a tick. They are logged and recorded on the
//! ticket; [`BatchLoader::load`] reports them as `None` and
//! [`BatchLoader::try_load`] hands them to the caller.

mod fetch;
mod ledger;

pub use fetch::{BatchFetch, FnBatchFetch, FnFetch, LoadHooks, NoHooks, Proxy, SingleFetch};
pub use ledger::{BatchLoadHelper, BatchLoadTicket};

use futures_util::future::join_all;
use metatag_core::{hash_key, ConfigError, LoaderError};
use serde::Serialize;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::Rc;
use tokio::sync::oneshot;

/// Settled value of one request.
pub type LoadResult<D> = Result<Option<Rc<D>>, LoaderError>;

struct Waiter<D> {
    ticket: usize,
    tx: oneshot::Sender<LoadResult<D>>,
}

struct PendingTick<I, D> {
    ledger: BatchLoadHelper<I, Rc<D>>,
    waiters: Vec<Waiter<D>>,
}

impl<I, D> Default for PendingTick<I, D> {
    fn default() -> Self {
        Self {
            ledger: BatchLoadHelper::default(),
            waiters: Vec::new(),
        }
    }
}

struct Shared<I, D> {
    name: String,
    single: Option<Rc<dyn SingleFetch<I, D>>>,
    batch: Option<Rc<dyn BatchFetch<I, D>>>,
    hooks: Rc<dyn LoadHooks<I, D>>,
    pending: RefCell<Option<PendingTick<I, D>>>,
    ticks: Cell<u64>,
}

/// Request-coalescing loader. Cloning yields another handle to the same
/// loader.
pub struct BatchLoader<I, D> {
    shared: Rc<Shared<I, D>>,
}

impl<I, D> Clone for BatchLoader<I, D> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<I, D> fmt::Debug for BatchLoader<I, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchLoader")
            .field("name", &self.shared.name)
            .field("single", &self.shared.single.is_some())
            .field("batch", &self.shared.batch.is_some())
            .field("ticks", &self.shared.ticks.get())
            .finish()
    }
}

/// Builder for [`BatchLoader`].
pub struct BatchLoaderBuilder<I, D> {
    name: String,
    single: Option<Rc<dyn SingleFetch<I, D>>>,
    batch: Option<Rc<dyn BatchFetch<I, D>>>,
    hooks: Rc<dyn LoadHooks<I, D>>,
}

impl<I, D> BatchLoaderBuilder<I, D>
where
    I: Serialize + Clone + 'static,
    D: 'static,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            single: None,
            batch: None,
            hooks: Rc::new(NoHooks),
        }
    }

    /// Use `fetch` for single inputs.
    pub fn single(mut self, fetch: impl SingleFetch<I, D> + 'static) -> Self {
        self.single = Some(Rc::new(fetch));
        self
    }

    /// Use an async closure for single inputs.
    pub fn single_fn<F, Fut>(self, f: F) -> Self
    where
        F: Fn(I) -> Fut + 'static,
        Fut: Future<Output = Result<Option<D>, LoaderError>> + 'static,
    {
        self.single(FnFetch::new(f))
    }

    /// Use `fetch` for batches of inputs.
    pub fn batch(mut self, fetch: impl BatchFetch<I, D> + 'static) -> Self {
        self.batch = Some(Rc::new(fetch));
        self
    }

    /// Use an async closure for batches of inputs.
    pub fn batch_fn<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Vec<I>) -> Fut + 'static,
        Fut: Future<Output = Result<Vec<Option<D>>, LoaderError>> + 'static,
    {
        self.batch(FnBatchFetch::new(f))
    }

    pub fn hooks(mut self, hooks: impl LoadHooks<I, D> + 'static) -> Self {
        self.hooks = Rc::new(hooks);
        self
    }

    /// Build the loader. At least one fetch function is required.
    pub fn build(self) -> Result<BatchLoader<I, D>, ConfigError> {
        if self.single.is_none() && self.batch.is_none() {
            return Err(ConfigError::MissingRequired {
                field: "single or batch fetch".to_string(),
            });
        }
        Ok(BatchLoader {
            shared: Rc::new(Shared {
                name: self.name,
                single: self.single,
                batch: self.batch,
                hooks: self.hooks,
                pending: RefCell::new(None),
                ticks: Cell::new(0),
            }),
        })
    }
}

impl<I, D> BatchLoader<I, D>
where
    I: Serialize + Clone + 'static,
    D: 'static,
{
    pub fn builder(name: impl Into<String>) -> BatchLoaderBuilder<I, D> {
        BatchLoaderBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Number of ticks started so far.
    pub fn ticks(&self) -> u64 {
        self.shared.ticks.get()
    }

    /// Request one input, reporting fetch failures to the caller.
    ///
    /// The request joins the current turn's ledger immediately; the returned
    /// future only waits for the tick. Must be called within a `LocalSet`.
    pub fn try_load(&self, input: I) -> impl Future<Output = LoadResult<D>> {
        let key = hash_key(&input);
        let rx = self.enqueue(input);
        async move { rx.await.unwrap_or(Err(LoaderError::Dropped { key })) }
    }

    /// Request one input. Fetch failures resolve to `None`.
    pub fn load(&self, input: I) -> impl Future<Output = Option<Rc<D>>> {
        let request = self.try_load(input);
        async move { request.await.unwrap_or(None) }
    }

    /// Request several inputs. Results are aligned with `inputs`.
    pub fn load_many(
        &self,
        inputs: impl IntoIterator<Item = I>,
    ) -> impl Future<Output = Vec<Option<Rc<D>>>> {
        join_all(inputs.into_iter().map(|input| self.load(input)).collect::<Vec<_>>())
    }

    fn enqueue(&self, input: I) -> oneshot::Receiver<LoadResult<D>> {
        let (tx, rx) = oneshot::channel();
        let start = {
            let mut pending = self.shared.pending.borrow_mut();
            let start = pending.is_none();
            let tick = pending.get_or_insert_with(PendingTick::default);
            let ticket = tick.ledger.push(input);
            tick.waiters.push(Waiter { ticket, tx });
            start
        };
        if start {
            let shared = Rc::clone(&self.shared);
            tokio::task::spawn_local(shared.run_tick());
        }
        rx
    }
}

impl<I, D> Shared<I, D>
where
    I: Serialize + Clone + 'static,
    D: 'static,
{
    async fn run_tick(self: Rc<Self>) {
        let Some(PendingTick {
            mut ledger,
            waiters,
        }) = self.pending.borrow_mut().take()
        else {
            return;
        };
        let tick = self.ticks.get() + 1;
        self.ticks.set(tick);
        tracing::debug!(
            loader = %self.name,
            tick,
            tickets = ledger.len(),
            requests = waiters.len(),
            "loader tick started"
        );

        for ticket in ledger.iter_mut() {
            if let Proxy::Replace(data) = self.hooks.before(&ticket.input) {
                ticket.data = data.map(Rc::new);
                ticket.loaded = true;
            }
        }

        self.fetch_unloaded(&mut ledger).await;

        for ticket in ledger.iter_mut() {
            if let Proxy::Replace(data) = self.hooks.after(&ticket.input, ticket.data.as_deref()) {
                ticket.data = data.map(Rc::new);
                ticket.loaded = true;
                ticket.error = None;
            }
        }

        for Waiter { ticket, tx } in waiters {
            let settled = match ledger.ticket(ticket) {
                Some(t) => match &t.error {
                    Some(e) => Err(e.clone()),
                    None => Ok(t.data.clone()),
                },
                None => Ok(None),
            };
            // The requester may have stopped waiting.
            let _ = tx.send(settled);
        }
        tracing::trace!(loader = %self.name, tick, "loader tick settled");
    }

    async fn fetch_unloaded(&self, ledger: &mut BatchLoadHelper<I, Rc<D>>) {
        let unloaded = ledger.unloaded();
        if unloaded.is_empty() {
            return;
        }

        if let (1, Some(single)) = (unloaded.len(), &self.single) {
            let position = unloaded[0];
            let result = match ledger.ticket(position) {
                Some(ticket) => single.fetch(&ticket.input).await,
                None => return,
            };
            self.record(ledger, position, result);
            return;
        }

        if let Some(batch) = &self.batch {
            let inputs: Vec<I> = unloaded
                .iter()
                .filter_map(|&p| ledger.ticket(p))
                .map(|t| t.input.clone())
                .collect();
            let outcome = match batch.fetch_batch(&inputs).await {
                Ok(results) if results.len() == inputs.len() => Ok(results),
                Ok(results) => Err(LoaderError::BatchLengthMismatch {
                    expected: inputs.len(),
                    got: results.len(),
                }),
                Err(e) => Err(e),
            };
            match outcome {
                Ok(results) => {
                    for (&position, data) in unloaded.iter().zip(results) {
                        ledger.settle(position, data.map(Rc::new));
                    }
                }
                Err(e) => {
                    tracing::error!(
                        loader = %self.name,
                        tickets = unloaded.len(),
                        error = %e,
                        "batch fetch failed"
                    );
                    for &position in &unloaded {
                        ledger.fail(position, e.clone());
                    }
                }
            }
            return;
        }

        if let Some(single) = &self.single {
            let results = {
                let view: &BatchLoadHelper<I, Rc<D>> = ledger;
                join_all(
                    unloaded
                        .iter()
                        .filter_map(|&p| view.ticket(p))
                        .map(|t| single.fetch(&t.input)),
                )
                .await
            };
            for (&position, result) in unloaded.iter().zip(results) {
                self.record(ledger, position, result);
            }
        }
    }

    fn record(
        &self,
        ledger: &mut BatchLoadHelper<I, Rc<D>>,
        position: usize,
        result: Result<Option<D>, LoaderError>,
    ) {
        match result {
            Ok(data) => ledger.settle(position, data.map(Rc::new)),
            Err(e) => {
                tracing::error!(loader = %self.name, position, error = %e, "fetch failed");
                ledger.fail(position, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::LocalSet;

    fn counter() -> Rc<Cell<usize>> {
        Rc::new(Cell::new(0))
    }

    #[test]
    fn test_build_requires_a_fetch() {
        let result = BatchLoader::<u32, u32>::builder("empty").build();
        assert!(matches!(result, Err(ConfigError::MissingRequired { .. })));
    }

    #[tokio::test]
    async fn test_same_turn_requests_share_one_fetch() {
        LocalSet::new()
            .run_until(async {
                let calls = counter();
                let c = Rc::clone(&calls);
                let loader = BatchLoader::builder("dedup")
                    .single_fn(move |n: u32| {
                        c.set(c.get() + 1);
                        async move { Ok(Some(n * 10)) }
                    })
                    .build()
                    .unwrap();

                let results = join_all((0..5).map(|_| loader.load(7))).await;
                assert_eq!(calls.get(), 1);
                assert_eq!(loader.ticks(), 1);
                for result in &results {
                    assert_eq!(result.as_deref(), Some(&70));
                }
                assert!(Rc::ptr_eq(
                    results[0].as_ref().unwrap(),
                    results[4].as_ref().unwrap()
                ));
            })
            .await;
    }

    #[tokio::test]
    async fn test_later_turn_opens_new_ledger() {
        LocalSet::new()
            .run_until(async {
                let calls = counter();
                let c = Rc::clone(&calls);
                let loader = BatchLoader::builder("ticks")
                    .single_fn(move |n: u32| {
                        c.set(c.get() + 1);
                        async move { Ok(Some(n)) }
                    })
                    .build()
                    .unwrap();

                assert_eq!(loader.load(1).await.as_deref(), Some(&1));
                assert_eq!(loader.load(1).await.as_deref(), Some(&1));
                assert_eq!(calls.get(), 2);
                assert_eq!(loader.ticks(), 2);
            })
            .await;
    }

    #[tokio::test]
    async fn test_batch_fetch_is_called_once_in_order() {
        LocalSet::new()
            .run_until(async {
                let seen = Rc::new(RefCell::new(Vec::new()));
                let s = Rc::clone(&seen);
                let loader = BatchLoader::builder("batch")
                    .batch_fn(move |inputs: Vec<u32>| {
                        s.borrow_mut().push(inputs.clone());
                        async move { Ok(inputs.into_iter().map(|n| Some(n + 100)).collect()) }
                    })
                    .build()
                    .unwrap();

                let results = loader.load_many([3, 1, 3, 2]).await;
                let values: Vec<Option<u32>> = results.iter().map(|r| r.as_deref().copied()).collect();
                assert_eq!(values, vec![Some(103), Some(101), Some(103), Some(102)]);
                assert_eq!(*seen.borrow(), vec![vec![3, 1, 2]]);
            })
            .await;
    }

    #[tokio::test]
    async fn test_failed_batch_settles_every_ticket_to_none() {
        LocalSet::new()
            .run_until(async {
                let loader: BatchLoader<u32, u32> = BatchLoader::builder("failing")
                    .batch_fn(|_inputs: Vec<u32>| async {
                        Err(LoaderError::fetch_failed("remote down"))
                    })
                    .build()
                    .unwrap();

                assert_eq!(loader.load_many([1, 2, 3]).await, vec![None, None, None]);

                let err = loader.try_load(1).await.unwrap_err();
                assert_eq!(err, LoaderError::fetch_failed("remote down"));
            })
            .await;
    }

    #[tokio::test]
    async fn test_batch_length_mismatch_is_a_failure() {
        LocalSet::new()
            .run_until(async {
                let loader: BatchLoader<u32, u32> = BatchLoader::builder("short")
                    .batch_fn(|_inputs: Vec<u32>| async { Ok(vec![Some(1)]) })
                    .build()
                    .unwrap();

                let a = loader.try_load(1);
                let b = loader.try_load(2);
                assert_eq!(
                    a.await,
                    Err(LoaderError::BatchLengthMismatch {
                        expected: 2,
                        got: 1
                    })
                );
                assert!(b.await.is_err());
            })
            .await;
    }

    #[tokio::test]
    async fn test_single_fetch_failures_are_isolated() {
        LocalSet::new()
            .run_until(async {
                let loader = BatchLoader::builder("isolated")
                    .single_fn(|n: u32| async move {
                        if n == 2 {
                            Err(LoaderError::fetch_failed("bad input"))
                        } else {
                            Ok(Some(n))
                        }
                    })
                    .build()
                    .unwrap();

                let results = loader.load_many([1, 2, 3]).await;
                let values: Vec<Option<u32>> = results.iter().map(|r| r.as_deref().copied()).collect();
                assert_eq!(values, vec![Some(1), None, Some(3)]);
            })
            .await;
    }

    #[tokio::test]
    async fn test_single_preferred_for_one_ticket() {
        LocalSet::new()
            .run_until(async {
                let batches = counter();
                let b = Rc::clone(&batches);
                let loader = BatchLoader::builder("both")
                    .single_fn(|n: u32| async move { Ok(Some(n)) })
                    .batch_fn(move |inputs: Vec<u32>| {
                        b.set(b.get() + 1);
                        async move { Ok(inputs.into_iter().map(Some).collect()) }
                    })
                    .build()
                    .unwrap();

                assert_eq!(loader.load(5).await.as_deref(), Some(&5));
                assert_eq!(batches.get(), 0);
                loader.load_many([1, 2]).await;
                assert_eq!(batches.get(), 1);
            })
            .await;
    }

    struct Overrides;

    impl LoadHooks<u32, String> for Overrides {
        fn before(&self, input: &u32) -> Proxy<String> {
            if *input == 0 {
                Proxy::Replace(Some("zero".to_string()))
            } else {
                Proxy::Pass
            }
        }

        fn after(&self, _input: &u32, data: Option<&String>) -> Proxy<String> {
            match data {
                Some(s) if s.starts_with('#') => Proxy::Replace(Some(s.to_uppercase())),
                None => Proxy::Replace(Some("fallback".to_string())),
                _ => Proxy::Pass,
            }
        }
    }

    #[tokio::test]
    async fn test_hooks_short_circuit_and_rewrite() {
        LocalSet::new()
            .run_until(async {
                let calls = counter();
                let c = Rc::clone(&calls);
                let loader = BatchLoader::builder("hooks")
                    .single_fn(move |n: u32| {
                        c.set(c.get() + 1);
                        async move {
                            match n {
                                1 => Ok(Some("#tag".to_string())),
                                _ => Ok(None),
                            }
                        }
                    })
                    .hooks(Overrides)
                    .build()
                    .unwrap();

                let results = loader.load_many([0, 1, 2]).await;
                let values: Vec<Option<String>> =
                    results.iter().map(|r| r.as_deref().cloned()).collect();
                assert_eq!(
                    values,
                    vec![
                        Some("zero".to_string()),
                        Some("#TAG".to_string()),
                        Some("fallback".to_string())
                    ]
                );
                assert_eq!(calls.get(), 2);
            })
            .await;
    }
}
