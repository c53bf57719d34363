//! First-to-succeed: the earliest fulfillment wins; the result only fails once
//! every input has failed.
use super::{adapt_all, Item};
use crate::{promise::Promise, scheduler::Handle};
use std::{cell::RefCell, rc::Rc};
use thiserror::Error;
use tracing::trace;

/// Every input rejected. `reasons` keeps input order, not rejection order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("all {} promises were rejected", .reasons.len())]
pub struct AggregateError<E> {
    pub reasons: Vec<E>,
}

impl<E> AggregateError<E> {
    pub fn new(reasons: Vec<E>) -> Self {
        Self { reasons }
    }

    pub fn into_reasons(self) -> Vec<E> {
        self.reasons
    }
}

struct Rejections<E> {
    reasons: Vec<Option<E>>,
    count: usize,
}

/// Fulfills with the first fulfilled input, or rejects with an
/// [`AggregateError`] once all inputs have rejected. An empty input rejects
/// straight away with no reasons.
pub fn any<T, E, I>(handle: &Handle, items: I) -> Promise<T, AggregateError<E>>
where
    T: Clone + 'static,
    E: Clone + 'static,
    I: IntoIterator,
    I::Item: Into<Item<T, E>>,
{
    let inputs = adapt_all(handle, items);
    let (result, resolver) = Promise::pending(handle);
    trace!(id = result.id(), inputs = inputs.len(), "any");
    if inputs.is_empty() {
        resolver.reject(AggregateError::new(vec![]));
        return result;
    }

    let rejections = Rc::new(RefCell::new(Rejections {
        reasons: vec![None; inputs.len()],
        count: 0,
    }));
    for (index, input) in inputs.into_iter().enumerate() {
        let on_fulfilled = resolver.clone();
        let on_rejected = resolver.clone();
        let rejections = rejections.clone();
        input.register(
            move |value| on_fulfilled.resolve(value),
            move |reason| {
                let reasons = {
                    let mut rejections = rejections.borrow_mut();
                    rejections.reasons[index] = Some(reason);
                    rejections.count += 1;
                    if rejections.count < rejections.reasons.len() {
                        return;
                    }
                    rejections.reasons.drain(..).flatten().collect()
                };
                on_rejected.reject(AggregateError::new(reasons));
            },
        );
    }
    result
}
