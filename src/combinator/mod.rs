//! Combinators that fold an ordered sequence of values and promises into a
//! single promise.
//!
//! | Combinator       | Fulfills when              | Rejects when                 | Empty input        |
//! |------------------|----------------------------|------------------------------|--------------------|
//! | [`race`]         | first input fulfills       | first input rejects          | never settles      |
//! | [`any`]          | first input fulfills       | every input rejects          | rejects, no reasons|
//! | [`all`]          | every input fulfills       | first input rejects          | fulfills with `[]` |
//! | [`all_settled`]  | every input settles        | never                        | fulfills with `[]` |
//!
//! Only settlement order matters for the outcome; input order only decides
//! where a value lands in the collected results.
use crate::{promise::Promise, scheduler::Handle};

mod all;
mod all_settled;
mod any;
mod race;

pub use all::all;
pub use all_settled::{all_settled, Settled};
pub use any::{any, AggregateError};
pub use race::race;

/// One combinator input: a plain value or a promise.
#[derive(Debug, Clone)]
pub enum Item<T, E> {
    Value(T),
    Deferred(Promise<T, E>),
}

impl<T, E> From<Promise<T, E>> for Item<T, E> {
    fn from(promise: Promise<T, E>) -> Self {
        Self::Deferred(promise)
    }
}

impl<T, E> Item<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Turns the item into a promise. The decision rests on the variant alone;
    /// a plain value is never inspected.
    pub fn adapt(self, handle: &Handle) -> Promise<T, E> {
        match self {
            Self::Value(value) => Promise::resolved(handle, value),
            Self::Deferred(promise) => promise,
        }
    }
}

pub(crate) fn adapt_all<T, E, I>(handle: &Handle, items: I) -> Vec<Promise<T, E>>
where
    T: Clone + 'static,
    E: Clone + 'static,
    I: IntoIterator,
    I::Item: Into<Item<T, E>>,
{
    items
        .into_iter()
        .map(|item| item.into().adapt(handle))
        .collect()
}
