//! All-or-first-failure.
use super::{adapt_all, Item};
use crate::{promise::Promise, scheduler::Handle};
use std::{cell::RefCell, rc::Rc};
use tracing::trace;

struct Collected<T> {
    values: Vec<Option<T>>,
    count: usize,
}

/// Fulfills with every input's value, in input order, once all inputs have
/// fulfilled. The first rejection rejects the result with that reason.
///
/// ```
/// use promise_chain::{all, EventLoop, Item, Promise};
///
/// let event_loop = EventLoop::new();
/// let handle = event_loop.handle();
/// let joined = all(
///     &handle,
///     [Item::Value(1), Item::from(Promise::<i32, ()>::resolved(&handle, 2))],
/// );
/// assert_eq!(event_loop.block_on(&joined), Ok(Ok(vec![1, 2])));
/// ```
pub fn all<T, E, I>(handle: &Handle, items: I) -> Promise<Vec<T>, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
    I: IntoIterator,
    I::Item: Into<Item<T, E>>,
{
    let inputs = adapt_all(handle, items);
    let (result, resolver) = Promise::pending(handle);
    trace!(id = result.id(), inputs = inputs.len(), "all");
    if inputs.is_empty() {
        resolver.resolve(vec![]);
        return result;
    }

    let collected = Rc::new(RefCell::new(Collected {
        values: vec![None; inputs.len()],
        count: 0,
    }));
    for (index, input) in inputs.into_iter().enumerate() {
        let on_fulfilled = resolver.clone();
        let on_rejected = resolver.clone();
        let collected = collected.clone();
        input.register(
            move |value| {
                let values = {
                    let mut collected = collected.borrow_mut();
                    collected.values[index] = Some(value);
                    collected.count += 1;
                    if collected.count < collected.values.len() {
                        return;
                    }
                    collected.values.drain(..).flatten().collect()
                };
                on_fulfilled.resolve(values);
            },
            move |reason| on_rejected.reject(reason),
        );
    }
    result
}
