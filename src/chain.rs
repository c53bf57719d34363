//! `then`/`catch` style chaining.
//!
//! Every operator returns a fresh promise whose state depends only on the
//! source's settlement and on what the handler returned. A handler "fails" by
//! returning `Err`, which rejects the derived promise.
use crate::promise::{Promise, Resolver, Thenable};
use std::{cell::Cell, rc::Rc};

impl<T, E> Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    fn derive<U, E2, F, G>(&self, on_fulfilled: F, on_rejected: G) -> Promise<U, E2>
    where
        U: Clone + 'static,
        E2: Clone + 'static,
        F: FnOnce(T, &Resolver<U, E2>) + 'static,
        G: FnOnce(E, &Resolver<U, E2>) + 'static,
    {
        let (derived, resolver) = Promise::pending(self.handle());
        let failure = resolver.clone();
        self.register(
            move |value| on_fulfilled(value, &resolver),
            move |reason| on_rejected(reason, &failure),
        );
        derived
    }

    /// Maps the fulfilled value. Rejections pass through untouched.
    ///
    /// ```
    /// use promise_chain::{EventLoop, Promise};
    ///
    /// let event_loop = EventLoop::new();
    /// let handle = event_loop.handle();
    /// let parsed = Promise::<&str, String>::resolved(&handle, "42")
    ///     .then(|s| s.parse::<i32>().map_err(|e| e.to_string()));
    /// assert_eq!(event_loop.block_on(&parsed), Ok(Ok(42)));
    /// ```
    pub fn then<U, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Clone + 'static,
        F: FnOnce(T) -> Result<U, E> + 'static,
    {
        self.derive(
            move |value, resolver| resolver.complete(on_fulfilled(value)),
            |reason, resolver| resolver.reject(reason),
        )
    }

    /// Handles both outcomes. Whatever either handler returns decides the
    /// derived promise, so a handled rejection fulfills it.
    pub fn then_or<U, E2, F, G>(&self, on_fulfilled: F, on_rejected: G) -> Promise<U, E2>
    where
        U: Clone + 'static,
        E2: Clone + 'static,
        F: FnOnce(T) -> Result<U, E2> + 'static,
        G: FnOnce(E) -> Result<U, E2> + 'static,
    {
        self.derive(
            move |value, resolver| resolver.complete(on_fulfilled(value)),
            move |reason, resolver| resolver.complete(on_rejected(reason)),
        )
    }

    /// Like [`then`](Self::then), but the handler returns another thenable
    /// whose eventual state the derived promise adopts.
    pub fn and_then<U, P, F>(&self, on_fulfilled: F) -> Promise<U, E>
    where
        U: Clone + 'static,
        P: Thenable<U, E> + 'static,
        F: FnOnce(T) -> Result<P, E> + 'static,
    {
        self.derive(
            move |value, resolver| match on_fulfilled(value) {
                Ok(next) => resolver.resolve_with(next),
                Err(reason) => resolver.reject(reason),
            },
            |reason, resolver| resolver.reject(reason),
        )
    }

    /// Recovers from a rejection. Fulfilled values pass through untouched.
    pub fn catch<E2, G>(&self, on_rejected: G) -> Promise<T, E2>
    where
        E2: Clone + 'static,
        G: FnOnce(E) -> Result<T, E2> + 'static,
    {
        self.derive(
            |value, resolver| resolver.resolve(value),
            move |reason, resolver| resolver.complete(on_rejected(reason)),
        )
    }

    /// [`catch`](Self::catch) whose handler returns a thenable to adopt.
    pub fn or_else<E2, P, G>(&self, on_rejected: G) -> Promise<T, E2>
    where
        E2: Clone + 'static,
        P: Thenable<T, E2> + 'static,
        G: FnOnce(E) -> Result<P, E2> + 'static,
    {
        self.derive(
            |value, resolver| resolver.resolve(value),
            move |reason, resolver| match on_rejected(reason) {
                Ok(next) => resolver.resolve_with(next),
                Err(reason) => resolver.reject(reason),
            },
        )
    }

    /// Runs `on_settled` whichever way the source settles, then mirrors it.
    pub fn finally<F>(&self, on_settled: F) -> Promise<T, E>
    where
        F: FnOnce() + 'static,
    {
        let (derived, resolver) = Promise::pending(self.handle());
        let on_settled = Rc::new(Cell::new(Some(on_settled)));
        let (success, failure) = (on_settled.clone(), on_settled);
        let rejecter = resolver.clone();
        self.register(
            move |value| {
                if let Some(f) = success.take() {
                    f();
                }
                resolver.resolve(value);
            },
            move |reason| {
                if let Some(f) = failure.take() {
                    f();
                }
                rejecter.reject(reason);
            },
        );
        derived
    }

    /// A derived promise with no handlers: it mirrors this one exactly.
    pub fn forward(&self) -> Promise<T, E> {
        self.derive(
            |value, resolver| resolver.resolve(value),
            |reason, resolver| resolver.reject(reason),
        )
    }
}
