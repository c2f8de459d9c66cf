//! Per-tick load ledger.
//!
//! A [`BatchLoadHelper`] holds one [`BatchLoadTicket`] per distinct input
//! requested during one loader tick. Inputs are deduplicated by their
//! canonical key, and tickets keep the order in which their key was first
//! requested.

use metatag_core::{hash_key, LoaderError};
use serde::Serialize;
use std::collections::HashMap;
use std::hash::Hash;

/// Load progress of one distinct input.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchLoadTicket<I, D> {
    /// Canonical key of `input`.
    pub key: String,
    pub input: I,
    pub data: Option<D>,
    pub loaded: bool,
    /// Set when the fetch covering this ticket failed.
    pub error: Option<LoaderError>,
}

/// Ledger of tickets for one loader tick.
#[derive(Debug, Clone)]
pub struct BatchLoadHelper<I, D> {
    tickets: Vec<BatchLoadTicket<I, D>>,
    index: HashMap<String, usize>,
}

impl<I, D> Default for BatchLoadHelper<I, D> {
    fn default() -> Self {
        Self {
            tickets: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<I: Serialize, D> BatchLoadHelper<I, D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger from a list of inputs, collapsing duplicates.
    pub fn from_inputs(inputs: impl IntoIterator<Item = I>) -> Self {
        let mut ledger = Self::new();
        for input in inputs {
            ledger.push(input);
        }
        ledger
    }

    /// Add an input, returning the index of the ticket that covers it.
    ///
    /// An input whose key is already present joins the existing ticket.
    pub fn push(&mut self, input: I) -> usize {
        let key = hash_key(&input);
        if let Some(&existing) = self.index.get(&key) {
            return existing;
        }
        let position = self.tickets.len();
        self.index.insert(key.clone(), position);
        self.tickets.push(BatchLoadTicket {
            key,
            input,
            data: None,
            loaded: false,
            error: None,
        });
        position
    }
}

impl<I, D> BatchLoadHelper<I, D> {
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    pub fn ticket(&self, position: usize) -> Option<&BatchLoadTicket<I, D>> {
        self.tickets.get(position)
    }

    pub fn ticket_by_key(&self, key: &str) -> Option<&BatchLoadTicket<I, D>> {
        self.index.get(key).map(|&i| &self.tickets[i])
    }

    /// Settle the ticket for `key`. Returns `false` for an unknown key.
    pub fn set_data_by_key(&mut self, key: &str, data: Option<D>) -> bool {
        match self.index.get(key) {
            Some(&i) => {
                self.settle(i, data);
                true
            }
            None => false,
        }
    }

    /// Settle a ticket with data, clearing any earlier error.
    pub fn settle(&mut self, position: usize, data: Option<D>) {
        if let Some(ticket) = self.tickets.get_mut(position) {
            ticket.data = data;
            ticket.loaded = true;
            ticket.error = None;
        }
    }

    /// Settle a ticket as failed.
    pub fn fail(&mut self, position: usize, error: LoaderError) {
        if let Some(ticket) = self.tickets.get_mut(position) {
            ticket.data = None;
            ticket.loaded = true;
            ticket.error = Some(error);
        }
    }

    /// Group tickets by a computed class.
    ///
    /// Classes appear in the order they are first produced; tickets keep
    /// ledger order inside each class.
    pub fn classify<C, F>(&self, mut f: F) -> Vec<(C, Vec<&BatchLoadTicket<I, D>>)>
    where
        C: Eq + Hash + Clone,
        F: FnMut(&BatchLoadTicket<I, D>, usize) -> C,
    {
        let mut slots: HashMap<C, usize> = HashMap::new();
        let mut groups: Vec<(C, Vec<&BatchLoadTicket<I, D>>)> = Vec::new();
        for (i, ticket) in self.tickets.iter().enumerate() {
            let class = f(ticket, i);
            match slots.get(&class) {
                Some(&slot) => groups[slot].1.push(ticket),
                None => {
                    slots.insert(class.clone(), groups.len());
                    groups.push((class, vec![ticket]));
                }
            }
        }
        groups
    }

    /// Positions of tickets that have not settled yet.
    pub fn unloaded(&self) -> Vec<usize> {
        self.tickets
            .iter()
            .enumerate()
            .filter(|(_, t)| !t.loaded)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BatchLoadTicket<I, D>> {
        self.tickets.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, BatchLoadTicket<I, D>> {
        self.tickets.iter_mut()
    }
}

impl<I, D: Clone> BatchLoadHelper<I, D> {
    /// Data of every ticket in ledger order.
    pub fn output(&self) -> Vec<Option<D>> {
        self.tickets.iter().map(|t| t.data.clone()).collect()
    }
}

impl<'a, I, D> IntoIterator for &'a BatchLoadHelper<I, D> {
    type Item = &'a BatchLoadTicket<I, D>;
    type IntoIter = std::slice::Iter<'a, BatchLoadTicket<I, D>>;

    fn into_iter(self) -> Self::IntoIter {
        self.tickets.iter()
    }
}
