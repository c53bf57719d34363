//! First-to-settle: the earliest settlement among the inputs, success or
//! failure, becomes the result.
use super::{adapt_all, Item};
use crate::{promise::Promise, scheduler::Handle};
use tracing::trace;

/// Settles like whichever input settles first.
///
/// An empty input leaves the result pending forever.
pub fn race<T, E, I>(handle: &Handle, items: I) -> Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
    I: IntoIterator,
    I::Item: Into<Item<T, E>>,
{
    let inputs = adapt_all(handle, items);
    let (result, resolver) = Promise::pending(handle);
    trace!(id = result.id(), inputs = inputs.len(), "race");
    for input in inputs {
        let (on_fulfilled, on_rejected) = (resolver.clone(), resolver.clone());
        input.register(
            move |value| on_fulfilled.resolve(value),
            move |reason| on_rejected.reject(reason),
        );
    }
    result
}
