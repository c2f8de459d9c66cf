//! Identity-keyed side tables.
//!
//! A [`DerivedCache`] hands out one [`SideTable`] per live allocation. Tables
//! are found by the owner's address and confirmed through a weak reference,
//! so they never keep the owner alive and a table is discarded as soon as
//! its owner has been dropped. Values stored in a table must not hold a
//! strong reference to the owner.

use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

/// Memoization slots for one owner value, one slot per stored type.
#[derive(Default)]
pub struct SideTable {
    slots: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
}

impl SideTable {
    pub fn get<T: 'static>(&self) -> Option<Rc<T>> {
        let slot = self.slots.borrow().get(&TypeId::of::<T>()).cloned()?;
        slot.downcast::<T>().ok()
    }

    /// Return the `T` slot, computing it with `init` on first use.
    pub fn get_or_init<T: 'static>(&self, init: impl FnOnce() -> T) -> Rc<T> {
        if let Some(existing) = self.get::<T>() {
            return existing;
        }
        let value = Rc::new(init());
        self.slots
            .borrow_mut()
            .insert(TypeId::of::<T>(), Rc::clone(&value) as Rc<dyn Any>);
        value
    }

    pub fn insert<T: 'static>(&self, value: T) -> Rc<T> {
        let value = Rc::new(value);
        self.slots
            .borrow_mut()
            .insert(TypeId::of::<T>(), Rc::clone(&value) as Rc<dyn Any>);
        value
    }

    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    pub fn clear(&self) {
        self.slots.borrow_mut().clear();
    }
}

impl std::fmt::Debug for SideTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SideTable").field("slots", &self.len()).finish()
    }
}

struct Slot {
    owner: Weak<dyn Any>,
    table: Rc<SideTable>,
}

/// Owner-identity to side-table map.
#[derive(Default)]
pub struct DerivedCache {
    tables: RefCell<HashMap<usize, Slot>>,
}

impl DerivedCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Side table bound to the allocation behind `owner`.
    pub fn table_for<T: 'static>(&self, owner: &Rc<T>) -> Rc<SideTable> {
        self.purge();
        let address = Rc::as_ptr(owner) as *const () as usize;
        let mut tables = self.tables.borrow_mut();
        if let Some(slot) = tables.get(&address) {
            if slot.owner.strong_count() > 0 {
                return Rc::clone(&slot.table);
            }
        }
        let table = Rc::new(SideTable::default());
        let weak: Weak<T> = Rc::downgrade(owner);
        tables.insert(
            address,
            Slot {
                owner: weak as Weak<dyn Any>,
                table: Rc::clone(&table),
            },
        );
        table
    }

    /// Number of tables whose owner is still alive.
    pub fn live_tables(&self) -> usize {
        self.purge();
        self.tables.borrow().len()
    }

    fn purge(&self) {
        self.tables
            .borrow_mut()
            .retain(|_, slot| slot.owner.strong_count() > 0);
    }
}

impl std::fmt::Debug for DerivedCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedCache")
            .field("tables", &self.tables.borrow().len())
            .finish()
    }
}
