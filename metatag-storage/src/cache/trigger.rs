//! Change counter driven by `DataChange` events.

use super::event::{CacheEvent, CacheEventKind};
use super::store::CacheStore;
use metatag_events::{BoundListener, Reply};
use serde::Serialize;
use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

/// Counts the data changes a predicate accepts.
///
/// Render layers poll [`ChangeTrigger::count`] and redraw when it moves.
/// The predicate can be swapped without re-registering; dropping the trigger
/// unsubscribes it.
pub struct ChangeTrigger<P, V> {
    count: Rc<Cell<u64>>,
    binding: BoundListener<CacheEventKind, CacheEvent<P, V>, ()>,
}

impl<P, V> ChangeTrigger<P, V>
where
    P: Serialize + Clone + 'static,
    V: 'static,
{
    pub(crate) fn new<F>(store: &CacheStore<P, V>, check: F) -> Self
    where
        F: Fn(&P, Option<&Rc<V>>, Option<&Rc<V>>) -> bool + 'static,
    {
        let count = Rc::new(Cell::new(0));
        let binding = BoundListener::attach_sync(
            store.events(),
            CacheEventKind::DataChange,
            Self::body(Rc::clone(&count), check),
        );
        Self { count, binding }
    }

    fn body<F>(count: Rc<Cell<u64>>, check: F) -> impl Fn(&CacheEvent<P, V>) + 'static
    where
        F: Fn(&P, Option<&Rc<V>>, Option<&Rc<V>>) -> bool + 'static,
    {
        move |event: &CacheEvent<P, V>| {
            if let CacheEvent::DataChange {
                params, new, old, ..
            } = event
            {
                if check(params, new.as_ref(), old.as_ref()) {
                    count.set(count.get() + 1);
                }
            }
        }
    }

    /// Number of accepted changes so far.
    pub fn count(&self) -> u64 {
        self.count.get()
    }

    /// Swap the predicate; the count is kept.
    pub fn set_check<F>(&self, check: F)
    where
        F: Fn(&P, Option<&Rc<V>>, Option<&Rc<V>>) -> bool + 'static,
    {
        let body = Self::body(Rc::clone(&self.count), check);
        self.binding.update(move |event| Reply::Ready(body(event)));
    }
}

impl<P, V> fmt::Debug for ChangeTrigger<P, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeTrigger")
            .field("count", &self.count.get())
            .finish()
    }
}
