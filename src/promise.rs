//! The promise state machine.
//!
//! A [`Promise`] starts `Pending` and settles at most once, to `Fulfilled` or
//! `Rejected`. Settling is split in two steps: the first call on a
//! [`Resolver`] *claims* the promise, and the state transition itself runs on a
//! later turn of the scheduler. Handlers never observe a settlement inside the
//! call that caused it.
use crate::scheduler::Handle;
use std::{
    cell::RefCell,
    fmt,
    future::Future,
    mem,
    pin::Pin,
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
    task::{Context, Poll, Waker},
};
use tracing::trace;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> State<T, E> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fulfilled(_) => "fulfilled",
            Self::Rejected(_) => "rejected",
        }
    }
}

impl<T, E> From<Result<T, E>> for State<T, E> {
    fn from(outcome: Result<T, E>) -> Self {
        match outcome {
            Ok(value) => Self::Fulfilled(value),
            Err(reason) => Self::Rejected(reason),
        }
    }
}

/// Anything that can be adopted as the eventual value of a promise: it only
/// has to accept a success and a failure continuation.
pub trait Thenable<T, E> {
    fn subscribe(self, on_fulfilled: Box<dyn FnOnce(T)>, on_rejected: Box<dyn FnOnce(E)>);
}

struct Reaction<T, E> {
    on_fulfilled: Box<dyn FnOnce(T)>,
    on_rejected: Box<dyn FnOnce(E)>,
}

impl<T, E> Reaction<T, E> {
    fn fire(self, outcome: Result<T, E>) {
        match outcome {
            Ok(value) => (self.on_fulfilled)(value),
            Err(reason) => (self.on_rejected)(reason),
        }
    }
}

struct Inner<T, E> {
    state: State<T, E>,
    claimed: bool,
    reactions: Vec<Reaction<T, E>>,
    wakers: Vec<Waker>,
}

struct Core<T, E> {
    id: u64,
    inner: Rc<RefCell<Inner<T, E>>>,
    handle: Handle,
}

impl<T, E> Clone for Core<T, E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: self.inner.clone(),
            handle: self.handle.clone(),
        }
    }
}

impl<T, E> Core<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    fn new(handle: &Handle) -> Self {
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            inner: Rc::new(RefCell::new(Inner {
                state: State::Pending,
                claimed: false,
                reactions: vec![],
                wakers: vec![],
            })),
            handle: handle.clone(),
        }
    }

    fn outcome(&self) -> Option<Result<T, E>> {
        match &self.inner.borrow().state {
            State::Pending => None,
            State::Fulfilled(value) => Some(Ok(value.clone())),
            State::Rejected(reason) => Some(Err(reason.clone())),
        }
    }

    fn claim(&self) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.claimed {
            trace!(id = self.id, "promise already claimed, ignoring");
            return false;
        }
        inner.claimed = true;
        trace!(id = self.id, "promise claimed");
        true
    }

    /// Performs the one and only state transition, then hands every queued
    /// reaction to the scheduler in registration order.
    fn settle(&self, outcome: Result<T, E>) {
        let (reactions, wakers) = {
            let mut inner = self.inner.borrow_mut();
            if inner.state.is_settled() {
                return;
            }
            inner.state = State::from(outcome.clone());
            trace!(
                id = self.id,
                state = inner.state.label(),
                reactions = inner.reactions.len(),
                "promise settled"
            );
            (
                mem::take(&mut inner.reactions),
                mem::take(&mut inner.wakers),
            )
        };
        for reaction in reactions {
            self.dispatch(reaction, outcome.clone());
        }
        for waker in wakers {
            waker.wake();
        }
    }

    fn dispatch(&self, reaction: Reaction<T, E>, outcome: Result<T, E>) {
        trace!(id = self.id, "reaction dispatched");
        self.handle.defer(move || reaction.fire(outcome));
    }
}

/// A deferred value of type `T` that may instead fail with `E`.
///
/// Cloning a `Promise` yields another reference to the same state.
///
/// # Examples
///
/// ```
/// use promise_chain::{EventLoop, Promise};
///
/// let event_loop = EventLoop::new();
/// let promise = Promise::<u32, String>::new(&event_loop.handle(), |resolver| {
///     resolver.resolve(20);
///     Ok(())
/// });
/// let doubled = promise.then(|n| Ok(n * 2));
/// assert_eq!(event_loop.block_on(&doubled), Ok(Ok(40)));
/// ```
pub struct Promise<T, E> {
    core: Core<T, E>,
}

impl<T, E> Clone for Promise<T, E> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Promise<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("id", &self.core.id)
            .field("state", &self.core.inner.borrow().state.label())
            .finish()
    }
}

impl<T, E> Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    /// Creates a pending promise and runs `executor` with its resolver.
    ///
    /// An `Err` returned by the executor rejects the promise, unless the
    /// executor already settled it.
    pub fn new<F>(handle: &Handle, executor: F) -> Self
    where
        F: FnOnce(Resolver<T, E>) -> Result<(), E>,
    {
        let (promise, resolver) = Self::pending(handle);
        if let Err(reason) = executor(resolver.clone()) {
            trace!(id = promise.id(), "executor failed");
            resolver.reject(reason);
        }
        promise
    }

    /// A pending promise together with the capability to settle it.
    pub fn pending(handle: &Handle) -> (Self, Resolver<T, E>) {
        let core = Core::new(handle);
        (Self { core: core.clone() }, Resolver { core })
    }

    pub fn resolved(handle: &Handle, value: T) -> Self {
        let (promise, resolver) = Self::pending(handle);
        resolver.resolve(value);
        promise
    }

    pub fn rejected(handle: &Handle, reason: E) -> Self {
        let (promise, resolver) = Self::pending(handle);
        resolver.reject(reason);
        promise
    }

    /// Registers a raw handler pair. Exactly one of the two runs, on a later
    /// scheduler turn, after every pair registered before it.
    pub fn register<F, G>(&self, on_fulfilled: F, on_rejected: G)
    where
        F: FnOnce(T) + 'static,
        G: FnOnce(E) + 'static,
    {
        let reaction = Reaction {
            on_fulfilled: Box::new(on_fulfilled),
            on_rejected: Box::new(on_rejected),
        };
        match self.core.outcome() {
            Some(outcome) => self.core.dispatch(reaction, outcome),
            None => self.core.inner.borrow_mut().reactions.push(reaction),
        }
    }

    pub fn state(&self) -> State<T, E> {
        self.core.inner.borrow().state.clone()
    }

    /// `Some` once settled.
    pub fn outcome(&self) -> Option<Result<T, E>> {
        self.core.outcome()
    }

    pub fn is_pending(&self) -> bool {
        self.core.inner.borrow().state.is_pending()
    }

    pub fn is_settled(&self) -> bool {
        !self.is_pending()
    }

    pub fn id(&self) -> u64 {
        self.core.id
    }

    pub fn handle(&self) -> &Handle {
        &self.core.handle
    }
}

impl<T, E> Thenable<T, E> for Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    fn subscribe(self, on_fulfilled: Box<dyn FnOnce(T)>, on_rejected: Box<dyn FnOnce(E)>) {
        self.register(on_fulfilled, on_rejected);
    }
}

impl<T, E> Future for Promise<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match self.core.outcome() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                self.core
                    .inner
                    .borrow_mut()
                    .wakers
                    .push(cx.waker().clone());
                Poll::Pending
            }
        }
    }
}

/// The settling half of a promise. Clones share the same once-only claim.
pub struct Resolver<T, E> {
    core: Core<T, E>,
}

impl<T, E> Clone for Resolver<T, E> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T, E> fmt::Debug for Resolver<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("id", &self.core.id)
            .field("claimed", &self.core.inner.borrow().claimed)
            .finish()
    }
}

impl<T, E> Resolver<T, E>
where
    T: Clone + 'static,
    E: Clone + 'static,
{
    pub fn resolve(&self, value: T) {
        self.complete(Ok(value));
    }

    pub fn reject(&self, reason: E) {
        self.complete(Err(reason));
    }

    /// Fulfills on `Ok`, rejects on `Err`.
    pub fn complete(&self, outcome: Result<T, E>) {
        if !self.core.claim() {
            return;
        }
        let core = self.core.clone();
        self.core.handle.defer(move || core.settle(outcome));
    }

    /// Adopts the eventual state of `thenable` instead of settling directly.
    pub fn resolve_with<P>(&self, thenable: P)
    where
        P: Thenable<T, E> + 'static,
    {
        if !self.core.claim() {
            return;
        }
        let on_fulfilled = self.core.clone();
        let on_rejected = self.core.clone();
        let id = self.core.id;
        self.core.handle.defer(move || {
            trace!(id, "adopting nested state");
            thenable.subscribe(
                Box::new(move |value| on_fulfilled.settle(Ok(value))),
                Box::new(move |reason| on_rejected.settle(Err(reason))),
            );
        });
    }

    pub fn is_claimed(&self) -> bool {
        self.core.inner.borrow().claimed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EventLoop;
    use futures::task::{waker, ArcWake};
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    };

    fn recorder() -> Rc<RefCell<Vec<String>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn first_settlement_wins() {
        let event_loop = EventLoop::new();
        let (promise, resolver) = Promise::<&str, &str>::pending(&event_loop.handle());
        resolver.resolve("first");
        resolver.reject("second");
        resolver.resolve("third");
        event_loop.run_until_idle().unwrap();
        assert_eq!(promise.state(), State::Fulfilled("first"));

        resolver.reject("late");
        event_loop.run_until_idle().unwrap();
        assert_eq!(promise.state(), State::Fulfilled("first"));
    }

    #[test]
    fn settlement_is_deferred() {
        let event_loop = EventLoop::new();
        let promise = Promise::<i32, ()>::new(&event_loop.handle(), |resolver| {
            resolver.resolve(1);
            Ok(())
        });
        assert!(promise.is_pending());
        assert!(event_loop.turn());
        assert_eq!(promise.state(), State::Fulfilled(1));
    }

    #[test]
    fn executor_error_rejects() {
        let event_loop = EventLoop::new();
        let promise = Promise::<i32, String>::new(&event_loop.handle(), |_| Err("boom".into()));
        assert_eq!(event_loop.block_on(&promise), Ok(Err("boom".to_string())));
    }

    #[test]
    fn executor_error_after_resolve_is_ignored() {
        let event_loop = EventLoop::new();
        let promise = Promise::<i32, String>::new(&event_loop.handle(), |resolver| {
            resolver.resolve(5);
            Err("too late".into())
        });
        assert_eq!(event_loop.block_on(&promise), Ok(Ok(5)));
    }

    #[test]
    fn handlers_run_in_registration_order() {
        let event_loop = EventLoop::new();
        let (promise, resolver) = Promise::<i32, ()>::pending(&event_loop.handle());
        let log = recorder();
        for name in ["h1", "h2", "h3"] {
            let log = log.clone();
            promise.register(move |v| log.borrow_mut().push(format!("{name}:{v}")), |_| {});
        }
        resolver.resolve(9);
        assert!(log.borrow().is_empty());
        event_loop.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), vec!["h1:9", "h2:9", "h3:9"]);
    }

    #[test]
    fn handler_on_settled_promise_is_still_deferred() {
        let event_loop = EventLoop::new();
        let promise = Promise::<i32, ()>::resolved(&event_loop.handle(), 3);
        event_loop.run_until_idle().unwrap();

        let log = recorder();
        let sink = log.clone();
        promise.register(move |v| sink.borrow_mut().push(v.to_string()), |_| {});
        assert!(log.borrow().is_empty());
        event_loop.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), vec!["3"]);
    }

    #[test]
    fn rejection_reaches_failure_handler_only() {
        let event_loop = EventLoop::new();
        let promise = Promise::<i32, &str>::rejected(&event_loop.handle(), "nope");
        let log = recorder();
        let (ok, err) = (log.clone(), log.clone());
        promise.register(
            move |v| ok.borrow_mut().push(format!("ok:{v}")),
            move |e| err.borrow_mut().push(format!("err:{e}")),
        );
        event_loop.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), vec!["err:nope"]);
    }

    #[test]
    fn adopts_nested_fulfillment() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let (inner, inner_resolver) = Promise::<&str, &str>::pending(&handle);
        let (outer, outer_resolver) = Promise::<&str, &str>::pending(&handle);
        outer_resolver.resolve_with(inner);
        event_loop.run_until_idle().unwrap();
        assert!(outer.is_pending());
        assert!(outer_resolver.is_claimed());

        outer_resolver.resolve("ignored");
        inner_resolver.resolve("done");
        event_loop.run_until_idle().unwrap();
        assert_eq!(outer.state(), State::Fulfilled("done"));
    }

    #[test]
    fn adopts_nested_rejection_through_levels() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let (innermost, resolver) = Promise::<u8, &str>::pending(&handle);
        let middle = Promise::<u8, &str>::new(&handle, move |r| {
            r.resolve_with(innermost);
            Ok(())
        });
        let outer = Promise::<u8, &str>::new(&handle, move |r| {
            r.resolve_with(middle);
            Ok(())
        });
        resolver.reject("deep");
        assert_eq!(event_loop.block_on(&outer), Ok(Err("deep")));
    }

    #[test]
    fn never_settled_promise_stalls() {
        let event_loop = EventLoop::new();
        let (promise, _resolver) = Promise::<(), ()>::pending(&event_loop.handle());
        assert_eq!(event_loop.block_on(&promise), Err(crate::Error::Stalled));
    }

    struct Flag(AtomicBool);

    impl ArcWake for Flag {
        fn wake_by_ref(arc_self: &Arc<Self>) {
            arc_self.0.store(true, Ordering::SeqCst);
        }
    }

    #[test]
    fn future_bridge_wakes_on_settlement() {
        let event_loop = EventLoop::new();
        let (mut promise, resolver) = Promise::<i32, ()>::pending(&event_loop.handle());
        let flag = Arc::new(Flag(AtomicBool::new(false)));
        let waker = waker(flag.clone());
        let mut cx = Context::from_waker(&waker);

        assert_eq!(Pin::new(&mut promise).poll(&mut cx), Poll::Pending);
        resolver.resolve(11);
        assert!(!flag.0.load(Ordering::SeqCst));
        event_loop.run_until_idle().unwrap();
        assert!(flag.0.load(Ordering::SeqCst));
        assert_eq!(Pin::new(&mut promise).poll(&mut cx), Poll::Ready(Ok(11)));
    }

    #[test]
    fn settled_promise_can_be_awaited() {
        let event_loop = EventLoop::new();
        let promise = Promise::<String, ()>::resolved(&event_loop.handle(), "🍓".into());
        event_loop.run_until_idle().unwrap();
        let value = futures::executor::block_on(async { promise.await });
        assert_eq!(value, Ok("🍓".to_string()));
    }
}
