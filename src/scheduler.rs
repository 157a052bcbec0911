//! Deferred execution for debounced notifications.
//!
//! The manager never touches a clock directly; it asks a [`Scheduler`] to
//! run a task after a delay and keeps the returned [`CancelHandle`]. Tests
//! drive time by hand with [`ManualScheduler`].

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;
use std::time::Duration;

/// A deferred task. Runs on the manager's thread.
pub type Task = Box<dyn FnOnce()>;

/// Cancels a scheduled task. Cancelling after the task ran is a no-op.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Rc<Cell<bool>>,
}

impl CancelHandle {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.set(true);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

pub trait Scheduler {
    /// Run `task` once `delay` has elapsed unless the returned handle is
    /// cancelled first.
    fn schedule(&self, delay: Duration, task: Task) -> CancelHandle;
}

/// Runs every task synchronously inside [`schedule`](Scheduler::schedule),
/// ignoring the delay.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateScheduler;

impl Scheduler for ImmediateScheduler {
    fn schedule(&self, _delay: Duration, task: Task) -> CancelHandle {
        task();
        CancelHandle::new()
    }
}

struct Entry {
    due: Duration,
    seq: u64,
    handle: CancelHandle,
    task: Task,
}

/// Virtual-time scheduler. Nothing runs until [`advance`](Self::advance).
#[derive(Default)]
pub struct ManualScheduler {
    now: Cell<Duration>,
    seq: Cell<u64>,
    queue: RefCell<Vec<Entry>>,
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManualScheduler")
            .field("now", &self.now.get())
            .field("pending", &self.pending())
            .finish()
    }
}

impl ManualScheduler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Virtual time elapsed so far.
    #[must_use]
    pub fn now(&self) -> Duration {
        self.now.get()
    }

    /// Number of scheduled tasks that are neither run nor cancelled.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue
            .borrow()
            .iter()
            .filter(|e| !e.handle.is_cancelled())
            .count()
    }

    /// Move virtual time forward, running every task that falls due in due
    /// order. Tasks scheduled by a running task are honored if they fall
    /// within the window.
    pub fn advance(&self, by: Duration) {
        let target = self.now.get() + by;
        loop {
            let next = {
                let mut queue = self.queue.borrow_mut();
                queue.retain(|e| !e.handle.is_cancelled());
                let pos = queue
                    .iter()
                    .enumerate()
                    .filter(|(_, e)| e.due <= target)
                    .min_by_key(|(_, e)| (e.due, e.seq))
                    .map(|(i, _)| i);
                pos.map(|i| queue.remove(i))
            };
            let Some(entry) = next else { break };
            self.now.set(entry.due.max(self.now.get()));
            (entry.task)();
        }
        self.now.set(target);
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> CancelHandle {
        let handle = CancelHandle::new();
        let seq = self.seq.get();
        self.seq.set(seq + 1);
        self.queue.borrow_mut().push(Entry {
            due: self.now.get() + delay,
            seq,
            handle: handle.clone(),
            task,
        });
        handle
    }
}

/// Timer on the current tokio `LocalSet`.
///
/// Must be used from inside a `LocalSet`, since tasks are not `Send`.
#[cfg(feature = "tokio")]
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioScheduler;

#[cfg(feature = "tokio")]
impl Scheduler for TokioScheduler {
    fn schedule(&self, delay: Duration, task: Task) -> CancelHandle {
        let handle = CancelHandle::new();
        let guard = handle.clone();
        tokio::task::spawn_local(async move {
            tokio::time::sleep(delay).await;
            if !guard.is_cancelled() {
                task();
            }
        });
        handle
    }
}
