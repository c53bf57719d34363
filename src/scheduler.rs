//! The deferred-execution hook every promise is built on.
//!
//! A [`Schedule`] implementation only has to honour one contract: tasks run
//! later, in the order they were submitted, and never inline inside the call
//! that submitted them. [`EventLoop`] is the reference implementation, a
//! single-threaded FIFO queue drained by the caller.
//!
//! ```
//! use promise_chain::{EventLoop, Promise};
//!
//! let event_loop = EventLoop::new();
//! let promise = Promise::<i32, String>::resolved(&event_loop.handle(), 7);
//! assert!(promise.is_pending());
//! assert_eq!(event_loop.block_on(&promise), Ok(Ok(7)));
//! ```
use crate::{Error, Promise};
use std::{cell::RefCell, collections::VecDeque, fmt, mem, rc::Rc};
use tracing::{debug, trace, warn};

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce()>;

/// "Run this later, in submission order, without blocking the caller."
pub trait Schedule {
    fn schedule(&self, task: Task);
}

/// Shared handle to a scheduler. Promises carry one so that everything derived
/// from them is deferred onto the same queue.
#[derive(Clone)]
pub struct Handle {
    scheduler: Rc<dyn Schedule>,
}

impl Handle {
    pub fn new<S: Schedule + 'static>(scheduler: S) -> Self {
        Self {
            scheduler: Rc::new(scheduler),
        }
    }

    pub fn from_rc(scheduler: Rc<dyn Schedule>) -> Self {
        Self { scheduler }
    }

    /// Defers `task` onto the underlying scheduler.
    pub fn defer<F: FnOnce() + 'static>(&self, task: F) {
        self.scheduler.schedule(Box::new(task));
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle").finish_non_exhaustive()
    }
}

/// Knobs for an [`EventLoop`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Config {
    /// Upper bound on tasks run by a single [`EventLoop::run_until_idle`].
    /// `None` drains until the queue is empty.
    pub turn_limit: Option<usize>,
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turn_limit(mut self, limit: usize) -> Self {
        self.turn_limit = Some(limit);
        self
    }
}

#[derive(Default)]
struct Queue {
    tasks: RefCell<VecDeque<Task>>,
}

impl Schedule for Queue {
    fn schedule(&self, task: Task) {
        let mut tasks = self.tasks.borrow_mut();
        tasks.push_back(task);
        trace!(queued = tasks.len(), "task scheduled");
    }
}

impl Queue {
    fn pop(&self) -> Option<Task> {
        self.tasks.borrow_mut().pop_front()
    }

    fn len(&self) -> usize {
        self.tasks.borrow().len()
    }
}

/// Cooperative FIFO task queue. Nothing runs until the owner drives it with
/// [`turn`](EventLoop::turn), [`run_until_idle`](EventLoop::run_until_idle)
/// or [`block_on`](EventLoop::block_on).
pub struct EventLoop {
    queue: Rc<Queue>,
    config: Config,
}

impl Drop for EventLoop {
    /// Queued tasks hold promises, and promises hold a handle back to this
    /// queue. Dropping the tasks breaks that cycle.
    fn drop(&mut self) {
        loop {
            // Dropping a task may run destructors that schedule more work.
            let tasks = mem::take(&mut *self.queue.tasks.borrow_mut());
            if tasks.is_empty() {
                break;
            }
            trace!(dropped = tasks.len(), "discarding queued tasks");
            drop(tasks);
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventLoop")
            .field("pending", &self.pending())
            .field("config", &self.config)
            .finish()
    }
}

impl EventLoop {
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    pub fn with_config(config: Config) -> Self {
        Self {
            queue: Rc::new(Queue::default()),
            config,
        }
    }

    pub fn config(&self) -> Config {
        self.config
    }

    pub fn handle(&self) -> Handle {
        Handle::from_rc(self.queue.clone())
    }

    /// Number of tasks waiting to run.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Runs the oldest queued task. Returns `false` if there was none.
    pub fn turn(&self) -> bool {
        // The pop borrow ends before the task runs; tasks schedule more tasks.
        match self.queue.pop() {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Drains the queue, including tasks enqueued while draining, and returns
    /// how many tasks ran.
    pub fn run_until_idle(&self) -> Result<usize, Error> {
        let mut turns = 0;
        loop {
            if let Some(limit) = self.config.turn_limit {
                if turns >= limit && self.pending() > 0 {
                    warn!(limit, pending = self.pending(), "turn limit reached");
                    return Err(Error::TurnLimitExceeded(limit));
                }
            }
            if !self.turn() {
                break;
            }
            turns += 1;
        }
        debug!(turns, "event loop idle");
        Ok(turns)
    }

    /// Drains the queue and reports how `promise` settled.
    ///
    /// Returns [`Error::Stalled`] when the loop runs dry while the promise is
    /// still pending; nothing left in the queue could ever settle it.
    pub fn block_on<T, E>(&self, promise: &Promise<T, E>) -> Result<Result<T, E>, Error>
    where
        T: Clone + 'static,
        E: Clone + 'static,
    {
        self.run_until_idle()?;
        promise.outcome().ok_or(Error::Stalled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};

    #[test]
    fn tasks_run_in_submission_order() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let log = Rc::new(RefCell::new(Vec::new()));
        for i in 0..3 {
            let log = log.clone();
            handle.defer(move || log.borrow_mut().push(i));
        }
        assert!(log.borrow().is_empty());
        assert_eq!(event_loop.pending(), 3);
        assert_eq!(event_loop.run_until_idle(), Ok(3));
        assert_eq!(*log.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn nested_tasks_queue_behind_existing_ones() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let log = log.clone();
            let inner = handle.clone();
            handle.defer(move || {
                log.borrow_mut().push("outer");
                let log = log.clone();
                inner.defer(move || log.borrow_mut().push("nested"));
            });
        }
        {
            let log = log.clone();
            handle.defer(move || log.borrow_mut().push("second"));
        }
        event_loop.run_until_idle().unwrap();
        assert_eq!(*log.borrow(), vec!["outer", "second", "nested"]);
    }

    #[test]
    fn turn_runs_a_single_task() {
        let event_loop = EventLoop::new();
        let handle = event_loop.handle();
        handle.defer(|| {});
        handle.defer(|| {});
        assert!(event_loop.turn());
        assert_eq!(event_loop.pending(), 1);
        assert!(event_loop.turn());
        assert!(!event_loop.turn());
    }

    #[test]
    fn turn_limit_stops_runaway_work() {
        fn forever(handle: Handle) {
            let next = handle.clone();
            handle.defer(move || forever(next));
        }
        let event_loop = EventLoop::with_config(Config::new().turn_limit(10));
        forever(event_loop.handle());
        assert_eq!(
            event_loop.run_until_idle(),
            Err(Error::TurnLimitExceeded(10))
        );
    }

    struct DropFlag(Rc<Cell<bool>>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    #[test]
    fn dropping_the_loop_releases_queued_work() {
        let dropped = Rc::new(Cell::new(false));
        let flag = DropFlag(dropped.clone());
        let event_loop = EventLoop::new();
        let promise = Promise::<i32, ()>::resolved(&event_loop.handle(), 1);
        let derived = promise.then(move |v| {
            let _flag = &flag;
            Ok(v)
        });
        drop(derived);
        drop(promise);
        assert!(!dropped.get());
        assert!(event_loop.pending() > 0);
        drop(event_loop);
        assert!(dropped.get());
    }

    #[test]
    fn custom_scheduler_plugs_into_handle() {
        #[derive(Clone, Default)]
        struct Recording(Rc<RefCell<Vec<Task>>>);
        impl Schedule for Recording {
            fn schedule(&self, task: Task) {
                self.0.borrow_mut().push(task);
            }
        }

        let recording = Recording::default();
        let handle = Handle::new(recording.clone());
        let promise = Promise::<u8, ()>::resolved(&handle, 1);
        assert_eq!(recording.0.borrow().len(), 1);
        let tasks: Vec<Task> = recording.0.borrow_mut().drain(..).collect();
        for task in tasks {
            task();
        }
        assert_eq!(promise.outcome(), Some(Ok(1)));
    }
}
