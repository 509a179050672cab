//! # Queue
//!
//! Bounded async task serializer.
//!
//! A [Queue] runs at most `max_pending` tasks at a time and keeps at most `max_queued` tasks
//! waiting. Tasks start in submission order. Adding a task while the backlog is full fails
//! immediately and the task is never invoked. Both limits default to unbounded.
//!
//! Tasks are spawned on the current tokio runtime, so [Queue::add] must be called from within
//! one. A started task always runs to completion: dropping the [QueuedTask] only discards the
//! result. A task that panics is reported as an [ErrorType::TaskPanicked](crate::error::ErrorType::TaskPanicked)
//! error, and its slot is released like for any other finished task.
//!
//! When a task finishes, its slot is released and the next waiting task is started first,
//! then `Resolved`/`Rejected` is reported, and only then the result is delivered. A caller
//! awaiting a [QueuedTask] therefore never observes its own task as pending.
//! Notifiers are advisory: a panicking notifier is logged and otherwise ignored.
//!
//! With `max_pending = 1` the queue guarantees that no two task bodies ever overlap.

use std::collections::VecDeque;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::config::QueueConfig;
use crate::error::Error;
use crate::lock;

/// Lifecycle notifications of a queued task. Advisory only, e.g. for logging or progress.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueEvent {
    Starting,
    Resolved,
    Rejected(Error),
}

pub type QueueNotifier = Arc<dyn Fn(&QueueEvent) + Send + Sync>;

type Job = Box<dyn FnOnce(Slot) -> BoxFuture<'static, ()> + Send>;

struct QueueEntry {
    job: Job,
    notify: Option<QueueNotifier>,
}

fn send_event(notify: &Option<QueueNotifier>, event: QueueEvent) {
    if let Some(notify) = notify {
        if std::panic::catch_unwind(AssertUnwindSafe(|| notify(&event))).is_err() {
            warn!(?event, "queue notifier panicked");
        }
    }
}

struct QueueState {
    pending: usize,
    entries: VecDeque<QueueEntry>,
}

struct QueueInner {
    max_pending: usize,
    max_queued: usize,
    state: Mutex<QueueState>,
}

/// A running task's claim on one of the `max_pending` slots.
/// Dropping it frees the slot and starts the next waiting task.
struct Slot {
    inner: Arc<QueueInner>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        lock(&self.inner.state).pending -= 1;
        Queue::dequeue(&self.inner);
    }
}

/// Clonable handle; clones share the same queue.
#[derive(Clone)]
pub struct Queue {
    inner: Arc<QueueInner>,
}

impl Default for Queue {
    fn default() -> Self {
        Self::new(usize::MAX, usize::MAX)
    }
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("max_pending", &self.inner.max_pending)
            .field("max_queued", &self.inner.max_queued)
            .field("pending_length", &self.pending_length())
            .field("queue_length", &self.queue_length())
            .finish()
    }
}

/// Result of a queued task. Resolves once the task finished.
#[must_use = "the task runs anyway, but its result is lost"]
pub struct QueuedTask<T> {
    rx: oneshot::Receiver<Result<T, Error>>,
}

impl<T> Future for QueuedTask<T> {
    type Output = Result<T, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.get_mut().rx)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(Error::task_dropped())))
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Queue {
    /// Create a queue running at most `max_pending` tasks and holding at most `max_queued`
    /// waiting ones. Use `usize::MAX` for no limit.
    pub fn new(max_pending: usize, max_queued: usize) -> Self {
        Queue {
            inner: Arc::new(QueueInner {
                max_pending,
                max_queued,
                state: Mutex::new(QueueState {
                    pending: 0,
                    entries: VecDeque::new(),
                }),
            }),
        }
    }

    pub fn with_config(config: &QueueConfig) -> Self {
        Self::new(config.max_pending(), config.max_queued())
    }

    pub fn max_pending(&self) -> usize {
        self.inner.max_pending
    }

    pub fn max_queued(&self) -> usize {
        self.inner.max_queued
    }

    /// Number of tasks currently executing.
    pub fn pending_length(&self) -> usize {
        lock(&self.inner.state).pending
    }

    /// Number of tasks waiting to be started.
    pub fn queue_length(&self) -> usize {
        lock(&self.inner.state).entries.len()
    }

    /// Add a task. See [Queue::add_with_notify].
    pub fn add<T, F, Fut>(&self, task: F) -> Result<QueuedTask<T>, Error>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        self.enqueue(task, None)
    }

    /// Add a task, reporting its lifecycle to `notify`.
    ///
    /// Fails immediately with a queue limit error if `max_queued` tasks are already waiting.
    /// Otherwise the task is queued and started as soon as fewer than `max_pending` tasks run.
    pub fn add_with_notify<T, F, Fut>(
        &self,
        task: F,
        notify: QueueNotifier,
    ) -> Result<QueuedTask<T>, Error>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        self.enqueue(task, Some(notify))
    }

    fn enqueue<T, F, Fut>(
        &self,
        task: F,
        notify: Option<QueueNotifier>,
    ) -> Result<QueuedTask<T>, Error>
    where
        T: Send + 'static,
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        tokio::runtime::Handle::try_current().map_err(|e| {
            Error::not_supported(format!("Queue requires a tokio runtime: {}", e))
        })?;

        let (tx, rx) = oneshot::channel();
        let finished = notify.clone();
        let job: Job = Box::new(move |slot: Slot| {
            async move {
                debug!("queued task started");
                let result = match AssertUnwindSafe(async move { task().await })
                    .catch_unwind()
                    .await
                {
                    Ok(result) => result,
                    Err(panic) => Err(Error::task_panicked(&panic_message(panic.as_ref()))),
                };
                let event = match &result {
                    Ok(_) => QueueEvent::Resolved,
                    Err(e) => {
                        debug!(error = %e, "queued task rejected");
                        QueueEvent::Rejected(e.clone())
                    }
                };
                drop(slot);
                send_event(&finished, event);
                if tx.send(result).is_err() {
                    debug!("queued task finished, result was not awaited");
                }
            }
            .boxed()
        });

        {
            let mut state = lock(&self.inner.state);
            if state.entries.len() >= self.inner.max_queued {
                warn!(
                    max_queued = self.inner.max_queued,
                    "queue limit reached, task rejected"
                );
                return Err(Error::queue_limit_reached(self.inner.max_queued));
            }
            state.entries.push_back(QueueEntry { job, notify });
        }
        Self::dequeue(&self.inner);
        Ok(QueuedTask { rx })
    }

    /// Start waiting tasks while there are free slots.
    fn dequeue(inner: &Arc<QueueInner>) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        loop {
            let entry = {
                let mut state = lock(&inner.state);
                if state.pending >= inner.max_pending {
                    return;
                }
                match state.entries.pop_front() {
                    Some(entry) => {
                        state.pending += 1;
                        entry
                    }
                    None => return,
                }
            };
            let QueueEntry { job, notify } = entry;
            let slot = Slot {
                inner: inner.clone(),
            };
            send_event(&notify, QueueEvent::Starting);
            runtime.spawn(job(slot));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_resolves_with_result() {
        let queue = Queue::default();
        let task = queue.add(|| async { Ok(21 * 2) }).unwrap();
        assert_eq!(task.await.unwrap(), 42);
        assert_eq!(queue.pending_length(), 0);
    }

    #[tokio::test]
    async fn test_error_is_propagated() {
        let queue = Queue::new(1, usize::MAX);
        let task = queue
            .add(|| async { Err::<(), _>(Error::execution_error("save failed".to_string())) })
            .unwrap();
        let err = task.await.unwrap_err();
        assert_eq!(err.message, "save failed");
        // The slot is free again.
        let next = queue.add(|| async { Ok(1) }).unwrap();
        assert_eq!(next.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_panic_becomes_error_and_releases_slot() {
        let queue = Queue::new(1, usize::MAX);
        let task = queue
            .add(|| async {
                if true {
                    panic!("task bug");
                }
                Ok(())
            })
            .unwrap();
        let err = task.await.unwrap_err();
        assert_eq!(err.error_type, crate::error::ErrorType::TaskPanicked);
        assert!(err.message.contains("task bug"));
        let next = queue.add(|| async { Ok("next") }).unwrap();
        assert_eq!(next.await.unwrap(), "next");
    }

    #[tokio::test]
    async fn test_notify_events() {
        let queue = Queue::default();
        let events = Arc::new(Mutex::new(Vec::new()));
        let e = events.clone();
        let notify: QueueNotifier =
            Arc::new(move |event: &QueueEvent| e.lock().unwrap().push(event.clone()));
        queue
            .add_with_notify(|| async { Ok(()) }, notify.clone())
            .unwrap()
            .await
            .unwrap();
        let _ = queue
            .add_with_notify(
                || async { Err::<(), _>(Error::general_error("no".to_string())) },
                notify,
            )
            .unwrap()
            .await;
        let events = events.lock().unwrap();
        assert_eq!(events[0], QueueEvent::Starting);
        assert_eq!(events[1], QueueEvent::Resolved);
        assert_eq!(events[2], QueueEvent::Starting);
        assert!(matches!(events[3], QueueEvent::Rejected(_)));
    }

    #[tokio::test]
    async fn test_start_order_is_fifo() {
        let queue = Queue::new(1, usize::MAX);
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut tasks = Vec::new();
        for i in 0..5 {
            let order = order.clone();
            tasks.push(
                queue
                    .add(move || async move {
                        order.lock().unwrap().push(i);
                        tokio::task::yield_now().await;
                        Ok(i)
                    })
                    .unwrap(),
            );
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(*order.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_slot_is_free_when_result_arrives() {
        let queue = Queue::new(1, usize::MAX);
        for _ in 0..200 {
            queue.add(|| async { Ok(()) }).unwrap().await.unwrap();
            assert_eq!(queue.pending_length(), 0);
        }
    }

    #[tokio::test]
    async fn test_panicking_notifier_does_not_block_queue() {
        let queue = Queue::new(1, usize::MAX);
        let notify: QueueNotifier = Arc::new(|_: &QueueEvent| panic!("notifier bug"));
        let first = queue
            .add_with_notify(|| async { Ok(1) }, notify.clone())
            .unwrap();
        assert_eq!(first.await.unwrap(), 1);
        assert_eq!(queue.pending_length(), 0);

        let failing = queue
            .add_with_notify(
                || async { Err::<(), _>(Error::general_error("no".to_string())) },
                notify,
            )
            .unwrap();
        assert!(failing.await.is_err());

        let next = queue.add(|| async { Ok(7) }).unwrap();
        assert_eq!(next.await.unwrap(), 7);
        assert_eq!(queue.pending_length(), 0);
    }

    #[test]
    fn test_add_outside_runtime_fails() {
        let queue = Queue::default();
        let err = queue.add(|| async { Ok(()) }).err().unwrap();
        assert_eq!(err.error_type, crate::error::ErrorType::NotSupported);
        assert_eq!(queue.queue_length(), 0);
    }
}
