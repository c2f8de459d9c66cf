//! Fetch functions and load hooks plugged into the batch loader.

use async_trait::async_trait;
use metatag_core::LoaderError;
use std::future::Future;
use std::marker::PhantomData;

/// Single-item fetch supplied by the remote collaborator.
///
/// `Ok(None)` means the remote has no value for this input.
#[async_trait(?Send)]
pub trait SingleFetch<I, D> {
    async fn fetch(&self, input: &I) -> Result<Option<D>, LoaderError>;
}

/// Batch fetch supplied by the remote collaborator.
///
/// The output must be positionally aligned with `inputs`.
#[async_trait(?Send)]
pub trait BatchFetch<I, D> {
    async fn fetch_batch(&self, inputs: &[I]) -> Result<Vec<Option<D>>, LoaderError>;
}

/// Adapts an async closure `Fn(I) -> Future<Result<Option<D>>>` into a
/// [`SingleFetch`].
pub struct FnFetch<F, I> {
    f: F,
    _input: PhantomData<fn(I)>,
}

impl<F, I> FnFetch<F, I> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _input: PhantomData,
        }
    }
}

#[async_trait(?Send)]
impl<F, Fut, I, D> SingleFetch<I, D> for FnFetch<F, I>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = Result<Option<D>, LoaderError>> + 'static,
    I: Clone + 'static,
    D: 'static,
{
    async fn fetch(&self, input: &I) -> Result<Option<D>, LoaderError> {
        (self.f)(input.clone()).await
    }
}

/// Adapts an async closure `Fn(Vec<I>) -> Future<Result<Vec<Option<D>>>>`
/// into a [`BatchFetch`].
pub struct FnBatchFetch<F, I> {
    f: F,
    _input: PhantomData<fn(I)>,
}

impl<F, I> FnBatchFetch<F, I> {
    pub fn new(f: F) -> Self {
        Self {
            f,
            _input: PhantomData,
        }
    }
}

#[async_trait(?Send)]
impl<F, Fut, I, D> BatchFetch<I, D> for FnBatchFetch<F, I>
where
    F: Fn(Vec<I>) -> Fut,
    Fut: Future<Output = Result<Vec<Option<D>>, LoaderError>> + 'static,
    I: Clone + 'static,
    D: 'static,
{
    async fn fetch_batch(&self, inputs: &[I]) -> Result<Vec<Option<D>>, LoaderError> {
        (self.f)(inputs.to_vec()).await
    }
}

/// Outcome of a load hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Proxy<D> {
    /// Leave the ticket alone.
    Pass,
    /// Settle the ticket with this value, skipping any remaining fetch.
    Replace(Option<D>),
}

/// Per-ticket hooks run around the fetch.
///
/// `before` may settle a ticket before any fetch happens. `after` sees every
/// ticket's settled value and may replace it.
pub trait LoadHooks<I, D> {
    fn before(&self, _input: &I) -> Proxy<D> {
        Proxy::Pass
    }

    fn after(&self, _input: &I, _data: Option<&D>) -> Proxy<D> {
        Proxy::Pass
    }
}

/// Hooks that never intervene.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl<I, D> LoadHooks<I, D> for NoHooks {}
