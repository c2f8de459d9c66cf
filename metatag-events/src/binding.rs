//! Lifecycle-bound listener.
//!
//! A [`BoundListener`] registers one stable forwarding handler while it is
//! attached. The forwarder always calls the most recent body passed to
//! [`BoundListener::update`], so callers can swap behavior without the
//! registration changing. Dropping the binding detaches it.

use crate::emitter::{EventEmitter, ListenerId, Reply};
use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;

type Body<A, R> = Rc<dyn Fn(&A) -> Reply<R>>;

pub struct BoundListener<K, A, R>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    emitter: EventEmitter<K, A, R>,
    kind: K,
    id: Option<ListenerId>,
    body: Rc<RefCell<Body<A, R>>>,
}

impl<K, A, R> BoundListener<K, A, R>
where
    K: Eq + Hash + Clone + fmt::Debug,
    A: 'static,
    R: 'static,
{
    /// Register a forwarder for `kind` that calls `body`.
    pub fn attach<F>(emitter: &EventEmitter<K, A, R>, kind: K, body: F) -> Self
    where
        F: Fn(&A) -> Reply<R> + 'static,
    {
        let body: Rc<RefCell<Body<A, R>>> = Rc::new(RefCell::new(Rc::new(body)));
        let current = Rc::clone(&body);
        let id = emitter.add_listener(
            kind.clone(),
            move |args| {
                // Clone out so the body may call `update` on itself.
                let f = Rc::clone(&current.borrow());
                f(args)
            },
            false,
        );
        Self {
            emitter: emitter.clone(),
            kind,
            id: Some(id),
            body,
        }
    }

    /// Synchronous-body shorthand for [`BoundListener::attach`].
    pub fn attach_sync<F>(emitter: &EventEmitter<K, A, R>, kind: K, body: F) -> Self
    where
        F: Fn(&A) -> R + 'static,
    {
        Self::attach(emitter, kind, move |args| Reply::Ready(body(args)))
    }

    /// Replace the body; the registration stays the same.
    pub fn update<F>(&self, body: F)
    where
        F: Fn(&A) -> Reply<R> + 'static,
    {
        *self.body.borrow_mut() = Rc::new(body);
    }

    /// Deregister the forwarder. Later calls are no-ops.
    pub fn detach(&mut self) {
        if let Some(id) = self.id.take() {
            self.emitter.remove_listener(&self.kind, id);
        }
    }

    pub fn is_attached(&self) -> bool {
        self.id.is_some()
    }

    pub fn id(&self) -> Option<ListenerId> {
        self.id
    }
}

impl<K, A, R> Drop for BoundListener<K, A, R>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.emitter.remove_listener(&self.kind, id);
        }
    }
}

impl<K, A, R> fmt::Debug for BoundListener<K, A, R>
where
    K: Eq + Hash + Clone + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundListener")
            .field("kind", &self.kind)
            .field("id", &self.id)
            .finish()
    }
}
