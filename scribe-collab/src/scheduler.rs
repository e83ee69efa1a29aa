//! Keyed, cancellable task scheduler.
//!
//! Debounce timers and in-flight requests are tokio tasks registered under a
//! [`TaskKey`]. Scheduling a key aborts whatever was registered under it, so
//! there is never more than one live task per key.
//!
//! ```text
//! schedule(key, 500ms, ev) ─┬─► abort previous task for key
//!                           └─► spawn: sleep ─► send Fired{key, ticket, ev}
//!                                                       │
//! owner loop ◄── accept(fired) ◄────────────────────────┘
//!                 (None if the ticket was superseded)
//! ```
//!
//! Results come back through a channel instead of callbacks, so the owner
//! handles them on its own loop, where it can revalidate against current
//! state. `accept` drops anything fired by a task that has since been
//! superseded or cancelled, covering the window between a task sending and
//! its abort.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;

/// Which part of the editor owns a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Component {
    Content,
    Grammar,
    Completion,
    Enhance,
}

/// What the task is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Purpose {
    Debounce,
    Request,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskKey {
    pub component: Component,
    pub purpose: Purpose,
}

impl TaskKey {
    pub const fn new(component: Component, purpose: Purpose) -> Self {
        Self { component, purpose }
    }

    pub const fn debounce(component: Component) -> Self {
        Self::new(component, Purpose::Debounce)
    }

    pub const fn request(component: Component) -> Self {
        Self::new(component, Purpose::Request)
    }
}

/// A task's output, tagged with the registration it came from.
#[derive(Debug)]
pub struct Fired<E> {
    pub key: TaskKey,
    ticket: u64,
    event: E,
}

pub struct Scheduler<E> {
    tasks: HashMap<TaskKey, (u64, AbortHandle)>,
    next_ticket: u64,
    tx: mpsc::UnboundedSender<Fired<E>>,
}

impl<E: Send + 'static> Scheduler<E> {
    /// Create a scheduler and the receiver its tasks report to.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Fired<E>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tasks: HashMap::new(),
                next_ticket: 0,
                tx,
            },
            rx,
        )
    }

    /// Deliver `event` after `delay`, replacing any task under `key`.
    pub fn schedule(&mut self, key: TaskKey, delay: Duration, event: E) {
        self.spawn(key, async move {
            tokio::time::sleep(delay).await;
            event
        });
    }

    /// Run `fut` and deliver its output, replacing any task under `key`.
    pub fn spawn<F>(&mut self, key: TaskKey, fut: F)
    where
        F: Future<Output = E> + Send + 'static,
    {
        self.cancel(key);
        self.next_ticket += 1;
        let ticket = self.next_ticket;
        let tx = self.tx.clone();
        let handle = tokio::spawn(async move {
            let event = fut.await;
            // The receiver is gone only when the owner is shutting down.
            let _ = tx.send(Fired { key, ticket, event });
        });
        self.tasks.insert(key, (ticket, handle.abort_handle()));
    }

    /// Abort the task under `key`. Returns whether one was registered.
    pub fn cancel(&mut self, key: TaskKey) -> bool {
        match self.tasks.remove(&key) {
            Some((_, handle)) => {
                handle.abort();
                log::trace!("cancelled {:?}", key);
                true
            }
            None => false,
        }
    }

    /// Abort every task owned by `component`.
    pub fn cancel_component(&mut self, component: Component) {
        for purpose in [Purpose::Debounce, Purpose::Request] {
            self.cancel(TaskKey::new(component, purpose));
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, (_, handle)) in self.tasks.drain() {
            handle.abort();
        }
    }

    pub fn is_pending(&self, key: TaskKey) -> bool {
        self.tasks.contains_key(&key)
    }

    /// Unwrap a fired task's output if it is still the live registration for
    /// its key. Accepting retires the registration.
    pub fn accept(&mut self, fired: Fired<E>) -> Option<E> {
        match self.tasks.get(&fired.key) {
            Some((ticket, _)) if *ticket == fired.ticket => {
                self.tasks.remove(&fired.key);
                Some(fired.event)
            }
            _ => {
                log::trace!("dropped stale {:?}", fired.key);
                None
            }
        }
    }
}

impl<E> Drop for Scheduler<E> {
    fn drop(&mut self) {
        for (_, (_, handle)) in self.tasks.drain() {
            handle.abort();
        }
    }
}
