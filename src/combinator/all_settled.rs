//! Wait-for-all: collects every outcome, never fails.
use super::{adapt_all, Item};
use crate::{promise::Promise, scheduler::Handle};
use std::{cell::RefCell, convert::Infallible, rc::Rc};
use tracing::trace;

/// How one input settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Settled<T, E> {
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> Settled<T, E> {
    pub fn is_fulfilled(&self) -> bool {
        matches!(self, Self::Fulfilled(_))
    }

    pub fn is_rejected(&self) -> bool {
        !self.is_fulfilled()
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Fulfilled(value) => Some(value),
            Self::Rejected(_) => None,
        }
    }

    pub fn reason(&self) -> Option<&E> {
        match self {
            Self::Fulfilled(_) => None,
            Self::Rejected(reason) => Some(reason),
        }
    }

    pub fn into_result(self) -> Result<T, E> {
        match self {
            Self::Fulfilled(value) => Ok(value),
            Self::Rejected(reason) => Err(reason),
        }
    }
}

impl<T, E> From<Result<T, E>> for Settled<T, E> {
    fn from(outcome: Result<T, E>) -> Self {
        match outcome {
            Ok(value) => Self::Fulfilled(value),
            Err(reason) => Self::Rejected(reason),
        }
    }
}

struct Outcomes<T, E> {
    slots: Vec<Option<Settled<T, E>>>,
    count: usize,
}

impl<T, E> Outcomes<T, E> {
    /// Stores one outcome; yields the full list once every slot is filled.
    fn record(&mut self, index: usize, outcome: Settled<T, E>) -> Option<Vec<Settled<T, E>>> {
        self.slots[index] = Some(outcome);
        self.count += 1;
        if self.count < self.slots.len() {
            return None;
        }
        Some(self.slots.drain(..).flatten().collect())
    }
}

/// Fulfills, in input order, with how each input settled once all have.
pub fn all_settled<T, E, I>(handle: &Handle, items: I) -> Promise<Vec<Settled<T, E>>, Infallible>
where
    T: Clone + 'static,
    E: Clone + 'static,
    I: IntoIterator,
    I::Item: Into<Item<T, E>>,
{
    let inputs = adapt_all(handle, items);
    let (result, resolver) = Promise::pending(handle);
    trace!(id = result.id(), inputs = inputs.len(), "all_settled");
    if inputs.is_empty() {
        resolver.resolve(vec![]);
        return result;
    }

    let outcomes = Rc::new(RefCell::new(Outcomes {
        slots: vec![None; inputs.len()],
        count: 0,
    }));
    for (index, input) in inputs.into_iter().enumerate() {
        let (on_fulfilled, on_rejected) = (resolver.clone(), resolver.clone());
        let (fulfilled, rejected) = (outcomes.clone(), outcomes.clone());
        input.register(
            move |value| {
                let done = fulfilled.borrow_mut().record(index, Settled::Fulfilled(value));
                if let Some(all) = done {
                    on_fulfilled.resolve(all);
                }
            },
            move |reason| {
                let done = rejected.borrow_mut().record(index, Settled::Rejected(reason));
                if let Some(all) = done {
                    on_rejected.resolve(all);
                }
            },
        );
    }
    result
}
