//! Per-instance event emitter.
//!
//! An [`EventEmitter`] keeps an ordered listener list per event kind and fans
//! a dispatch out to it using one of several strategies. Handlers may answer
//! immediately or with a pending future; the sequential strategies await each
//! pending answer before moving to the next handler.
//!
//! Everything runs on one thread. The emitter is a cheap `Rc` handle and
//! handlers may re-enter it (dispatch, add or remove listeners) freely: the
//! internal borrow is never held while a handler runs.
//!
//! A handler that panics, synchronously or while its future is polled, is
//! logged and counted as failed; the remaining handlers still run.

use futures_util::future::{join_all, FutureExt, LocalBoxFuture};
use std::cell::RefCell;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use tokio::task::JoinHandle;

/// Identifier of one registration, used to remove it again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// What a handler hands back to the dispatcher.
pub enum Reply<R> {
    /// The handler finished synchronously.
    Ready(R),
    /// The handler finishes when this future resolves.
    Pending(LocalBoxFuture<'static, R>),
}

impl<R> Reply<R> {
    /// Wrap a future as a pending reply.
    pub fn pending<F>(future: F) -> Self
    where
        F: Future<Output = R> + 'static,
    {
        Reply::Pending(future.boxed_local())
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Reply::Pending(_))
    }

    /// Resolve the reply to its value.
    pub async fn settle(self) -> R {
        match self {
            Reply::Ready(value) => value,
            Reply::Pending(future) => future.await,
        }
    }
}

impl<R> From<R> for Reply<R> {
    fn from(value: R) -> Self {
        Reply::Ready(value)
    }
}

impl<R: fmt::Debug> fmt::Debug for Reply<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Ready(value) => f.debug_tuple("Ready").field(value).finish(),
            Reply::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// Truth value of a handler result, for the `every`/`some` strategies.
pub trait Verdict {
    fn passed(&self) -> bool;
}

impl Verdict for bool {
    fn passed(&self) -> bool {
        *self
    }
}

impl<T> Verdict for Option<T> {
    fn passed(&self) -> bool {
        self.is_some()
    }
}

impl<T, E> Verdict for Result<T, E> {
    fn passed(&self) -> bool {
        self.is_ok()
    }
}

/// Replies produced by one synchronous fan-out, in registration order.
///
/// Pending replies are dropped (and their work cancelled) unless the fan-out
/// is settled.
pub struct Fanout<R> {
    replies: Vec<Reply<R>>,
}

impl<R> Fanout<R> {
    /// Number of handlers invoked.
    pub fn len(&self) -> usize {
        self.replies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replies.is_empty()
    }

    /// Values of the handlers that answered synchronously.
    pub fn ready(self) -> Vec<R> {
        self.replies
            .into_iter()
            .filter_map(|reply| match reply {
                Reply::Ready(value) => Some(value),
                Reply::Pending(_) => None,
            })
            .collect()
    }

    /// Wait for every reply, driving pending ones concurrently. Replies
    /// whose future panicked are left out.
    pub async fn settle(self) -> Vec<R> {
        join_all(self.replies.into_iter().map(settle_guarded))
            .await
            .into_iter()
            .flatten()
            .collect()
    }
}

/// Outcome of invoking one snapshotted listener.
enum Call<R> {
    /// Removed since the snapshot was taken.
    Skipped,
    Replied(Reply<R>),
    Panicked,
}

impl<R> Call<R> {
    fn into_reply(self) -> Option<Reply<R>> {
        match self {
            Call::Replied(reply) => Some(reply),
            Call::Skipped | Call::Panicked => None,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

/// Settle a reply, logging a panic raised while its future is polled.
async fn settle_guarded<R>(reply: Reply<R>) -> Option<R> {
    match AssertUnwindSafe(reply.settle()).catch_unwind().await {
        Ok(value) => Some(value),
        Err(payload) => {
            tracing::error!(panic = panic_message(&*payload), "event handler future panicked");
            None
        }
    }
}

/// Pass/fail of one call; `None` when the listener was skipped.
async fn verdict<R: Verdict>(call: Call<R>) -> Option<bool> {
    match call {
        Call::Skipped => None,
        Call::Panicked => Some(false),
        Call::Replied(reply) => Some(settle_guarded(reply).await.is_some_and(|v| v.passed())),
    }
}

type Handler<A, R> = dyn Fn(&A) -> Reply<R>;

struct Listener<A, R> {
    id: ListenerId,
    handler: Rc<Handler<A, R>>,
    once: bool,
}

struct Registry<K, A, R> {
    name: String,
    listeners: HashMap<K, Vec<Listener<A, R>>>,
    next_id: u64,
    destroyed: bool,
}

/// Typed publish/subscribe hub.
///
/// `K` is the event kind, `A` the payload every handler receives by
/// reference and `R` the handler result.
pub struct EventEmitter<K, A, R = ()> {
    registry: Rc<RefCell<Registry<K, A, R>>>,
}

impl<K, A, R> Clone for EventEmitter<K, A, R> {
    fn clone(&self) -> Self {
        Self {
            registry: Rc::clone(&self.registry),
        }
    }
}

impl<K, A, R> fmt::Debug for EventEmitter<K, A, R>
where
    K: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registry = self.registry.borrow();
        f.debug_struct("EventEmitter")
            .field("name", &registry.name)
            .field("kinds", &registry.listeners.keys().collect::<Vec<_>>())
            .field("destroyed", &registry.destroyed)
            .finish()
    }
}

impl<K, A, R> EventEmitter<K, A, R>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// Create an emitter. `name` only appears in log output.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            registry: Rc::new(RefCell::new(Registry {
                name: name.into(),
                listeners: HashMap::new(),
                next_id: 0,
                destroyed: false,
            })),
        }
    }

    pub fn name(&self) -> String {
        self.registry.borrow().name.clone()
    }

    // ========================================================================
    // REGISTRATION
    // ========================================================================

    /// Register a handler for `kind`.
    ///
    /// A `once` handler is removed right before its first invocation. On a
    /// destroyed emitter this logs and returns an id that matches nothing.
    pub fn add_listener<F>(&self, kind: K, handler: F, once: bool) -> ListenerId
    where
        F: Fn(&A) -> Reply<R> + 'static,
    {
        let mut registry = self.registry.borrow_mut();
        registry.next_id += 1;
        let id = ListenerId(registry.next_id);
        if registry.destroyed {
            tracing::warn!(emitter = %registry.name, kind = ?kind, "add_listener on destroyed emitter ignored");
            return id;
        }
        registry
            .listeners
            .entry(kind)
            .or_default()
            .push(Listener {
                id,
                handler: Rc::new(handler),
                once,
            });
        id
    }

    /// Register a synchronous handler.
    pub fn on<F>(&self, kind: K, handler: F) -> ListenerId
    where
        F: Fn(&A) -> R + 'static,
    {
        self.add_listener(kind, move |args| Reply::Ready(handler(args)), false)
    }

    /// Register a synchronous handler that runs at most once.
    pub fn once<F>(&self, kind: K, handler: F) -> ListenerId
    where
        F: Fn(&A) -> R + 'static,
    {
        self.add_listener(kind, move |args| Reply::Ready(handler(args)), true)
    }

    /// Register a handler that answers with a future.
    pub fn on_async<F, Fut>(&self, kind: K, handler: F) -> ListenerId
    where
        F: Fn(&A) -> Fut + 'static,
        Fut: Future<Output = R> + 'static,
    {
        self.add_listener(kind, move |args| Reply::pending(handler(args)), false)
    }

    /// Remove a registration. Removing an unknown id is a no-op.
    pub fn remove_listener(&self, kind: &K, id: ListenerId) -> bool {
        let mut registry = self.registry.borrow_mut();
        let Some(list) = registry.listeners.get_mut(kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|l| l.id != id);
        let removed = list.len() != before;
        if list.is_empty() {
            registry.listeners.remove(kind);
        }
        removed
    }

    /// Drop every listener of `kind`, or of every kind when `None`.
    pub fn remove_all(&self, kind: Option<&K>) {
        let mut registry = self.registry.borrow_mut();
        match kind {
            Some(kind) => {
                registry.listeners.remove(kind);
            }
            None => registry.listeners.clear(),
        }
    }

    pub fn listener_count(&self, kind: &K) -> usize {
        self.registry
            .borrow()
            .listeners
            .get(kind)
            .map_or(0, Vec::len)
    }

    pub fn has_listener(&self, kind: &K, id: ListenerId) -> bool {
        self.registry
            .borrow()
            .listeners
            .get(kind)
            .is_some_and(|list| list.iter().any(|l| l.id == id))
    }

    /// Drop every listener and refuse further use.
    ///
    /// Every later call on any handle of this emitter logs and does nothing.
    pub fn destroy(&self) {
        let mut registry = self.registry.borrow_mut();
        registry.listeners.clear();
        registry.destroyed = true;
        tracing::debug!(emitter = %registry.name, "emitter destroyed");
    }

    pub fn is_destroyed(&self) -> bool {
        self.registry.borrow().destroyed
    }

    // ========================================================================
    // DISPATCH
    // ========================================================================

    /// Invoke every handler synchronously, in registration order.
    pub fn dispatch(&self, kind: &K, args: &A) -> Fanout<R> {
        let replies = self
            .snapshot(kind, "dispatch")
            .into_iter()
            .filter_map(|(id, handler)| self.invoke(kind, id, &handler, args).into_reply())
            .collect();
        Fanout { replies }
    }

    /// Await every handler in order; a pending reply blocks the next handler.
    pub async fn sync_dispatch(&self, kind: &K, args: &A) {
        for (id, handler) in self.snapshot(kind, "sync_dispatch") {
            if let Some(reply) = self.invoke(kind, id, &handler, args).into_reply() {
                settle_guarded(reply).await;
            }
        }
    }

    /// Like [`EventEmitter::sync_dispatch`], returning every result in order.
    /// Handlers that panicked contribute nothing.
    pub async fn collect_dispatch(&self, kind: &K, args: &A) -> Vec<R> {
        let mut results = Vec::new();
        for (id, handler) in self.snapshot(kind, "collect_dispatch") {
            if let Some(reply) = self.invoke(kind, id, &handler, args).into_reply() {
                results.extend(settle_guarded(reply).await);
            }
        }
        results
    }

    // ========================================================================
    // INTERNALS
    // ========================================================================

    fn snapshot(&self, kind: &K, strategy: &str) -> Vec<(ListenerId, Rc<Handler<A, R>>)> {
        let registry = self.registry.borrow();
        if registry.destroyed {
            tracing::warn!(
                emitter = %registry.name,
                kind = ?kind,
                strategy,
                "dispatch on destroyed emitter ignored"
            );
            return Vec::new();
        }
        let snapshot: Vec<_> = registry
            .listeners
            .get(kind)
            .map(|list| {
                list.iter()
                    .map(|l| (l.id, Rc::clone(&l.handler)))
                    .collect()
            })
            .unwrap_or_default();
        tracing::trace!(
            emitter = %registry.name,
            kind = ?kind,
            strategy,
            listeners = snapshot.len(),
            "dispatching"
        );
        snapshot
    }

    /// Confirm a snapshotted listener is still registered, unregistering it
    /// first when it is a `once` listener.
    fn claim(&self, kind: &K, id: ListenerId) -> bool {
        let mut registry = self.registry.borrow_mut();
        if registry.destroyed {
            return false;
        }
        let Some(list) = registry.listeners.get_mut(kind) else {
            return false;
        };
        let Some(pos) = list.iter().position(|l| l.id == id) else {
            return false;
        };
        if list[pos].once {
            list.remove(pos);
            if list.is_empty() {
                registry.listeners.remove(kind);
            }
        }
        true
    }

    fn invoke(&self, kind: &K, id: ListenerId, handler: &Rc<Handler<A, R>>, args: &A) -> Call<R> {
        if !self.claim(kind, id) {
            return Call::Skipped;
        }
        match panic::catch_unwind(AssertUnwindSafe(|| handler(args))) {
            Ok(reply) => Call::Replied(reply),
            Err(payload) => {
                tracing::error!(
                    emitter = %self.name(),
                    kind = ?kind,
                    panic = panic_message(&*payload),
                    "event handler panicked"
                );
                Call::Panicked
            }
        }
    }
}

impl<K, A, R> EventEmitter<K, A, R>
where
    K: Eq + Hash + Clone + fmt::Debug + 'static,
    A: 'static,
    R: 'static,
{
    /// Run [`EventEmitter::dispatch`] on a later turn of the local task set.
    ///
    /// The returned handle resolves to every handler result once all of
    /// them, pending ones included, have settled. Must be called from within
    /// a `tokio::task::LocalSet`.
    pub fn async_dispatch(&self, kind: K, args: A) -> JoinHandle<Vec<R>> {
        let emitter = self.clone();
        tokio::task::spawn_local(async move { emitter.dispatch(&kind, &args).settle().await })
    }
}

impl<K, T> EventEmitter<K, T, T>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    /// Fold the handlers in order: each one receives the (settled) result of
    /// the previous one, the first receives `initial`. A panicking handler
    /// leaves the accumulator unchanged.
    pub async fn reduce_dispatch(&self, kind: &K, initial: T) -> T {
        let mut acc = initial;
        for (id, handler) in self.snapshot(kind, "reduce_dispatch") {
            if let Some(reply) = self.invoke(kind, id, &handler, &acc).into_reply() {
                if let Some(next) = settle_guarded(reply).await {
                    acc = next;
                }
            }
        }
        acc
    }
}

impl<K, A, R> EventEmitter<K, A, R>
where
    K: Eq + Hash + Clone + fmt::Debug,
    R: Verdict,
{
    /// Stop at the first handler whose result does not pass; `true` only if
    /// every handler passed.
    pub async fn every_dispatch(&self, kind: &K, args: &A) -> bool {
        for (id, handler) in self.snapshot(kind, "every_dispatch") {
            if verdict(self.invoke(kind, id, &handler, args)).await == Some(false) {
                return false;
            }
        }
        true
    }

    /// Same verdict as [`EventEmitter::every_dispatch`] but every handler
    /// runs.
    pub async fn every_dispatch_all(&self, kind: &K, args: &A) -> bool {
        let mut all = true;
        for (id, handler) in self.snapshot(kind, "every_dispatch_all") {
            if let Some(passed) = verdict(self.invoke(kind, id, &handler, args)).await {
                all &= passed;
            }
        }
        all
    }

    /// Stop at the first handler whose result passes.
    pub async fn some_dispatch(&self, kind: &K, args: &A) -> bool {
        for (id, handler) in self.snapshot(kind, "some_dispatch") {
            if verdict(self.invoke(kind, id, &handler, args)).await == Some(true) {
                return true;
            }
        }
        false
    }
}
