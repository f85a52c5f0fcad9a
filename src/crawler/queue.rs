//! Task records and the work queue
//!
//! A [`Task`] is a self-contained unit of traversal work: the locator to load
//! now, the entry locator the crawl started from, and the kind of document
//! expected. Tasks serialize to JSON so a process-external queue can stand in
//! for the in-memory default -- because `entry` travels inside every task, a
//! worker in another process can still enforce the file/URL mode invariant.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;

use crate::locator::Locator;
use crate::{CrawlError, Result};

/// The kind of document a task expects at its locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskKind {
    /// A single catalog, collection, or item.
    Resource,
    /// A STAC API collections page.
    Collections,
    /// A STAC API children page.
    Children,
    /// A STAC API items page.
    Features,
}

/// A unit of traversal work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    entry: Locator,
    resource: Locator,
    #[serde(rename = "type")]
    kind: TaskKind,
}

impl Task {
    pub fn new(entry: Locator, resource: Locator, kind: TaskKind) -> Self {
        Self {
            entry,
            resource,
            kind,
        }
    }

    /// The locator of the resource the crawl started from.
    pub fn entry(&self) -> &Locator {
        &self.entry
    }

    /// The locator this task will load.
    pub fn resource(&self) -> &Locator {
        &self.resource
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Derives a follow-up task, inheriting this task's entry.
    pub(crate) fn follow(&self, resource: Locator, kind: TaskKind) -> Task {
        Task {
            entry: self.entry.clone(),
            resource,
            kind,
        }
    }
}

/// The per-task handler registered by the crawler.
///
/// Returned tasks are fed back into the queue by the queue itself, so
/// follow-up submission happens-after the handler's visitor work.
pub type TaskHandler =
    Arc<dyn Fn(Task) -> BoxFuture<'static, Result<Vec<Task>>> + Send + Sync>;

/// A bounded-concurrency work dispenser.
///
/// The in-memory [`MemoryQueue`] is the default; anything implementing this
/// trait -- including a durable queue shared across processes -- may replace
/// it. Implementations make no ordering guarantee.
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueues tasks without blocking on free worker slots.
    async fn add(&self, tasks: Vec<Task>) -> Result<()>;

    /// Registers the per-task handler and starts draining. The latest
    /// registration wins.
    fn handle(&self, handler: TaskHandler);

    /// Blocks until every enqueued task has been processed, returning the
    /// first handler error (which cancels remaining work) if any.
    async fn wait(&self) -> Result<()>;
}

/// In-memory work queue used when a crawl does not supply its own.
///
/// A semaphore of `limit` permits bounds concurrency; pending tasks buffer in
/// a mutex-guarded queue and are launched opportunistically whenever a permit
/// is free. The first handler error cancels the token, drains the buffer, and
/// is returned from [`TaskQueue::wait`].
pub struct MemoryQueue {
    inner: Arc<Inner>,
}

struct Inner {
    cancel: CancellationToken,
    semaphore: Arc<Semaphore>,
    state: Mutex<State>,
    idle: Notify,
}

#[derive(Default)]
struct State {
    handler: Option<TaskHandler>,
    buffer: VecDeque<Task>,
    /// Tasks buffered or running. `wait` returns when this reaches zero.
    pending: usize,
    first_error: Option<CrawlError>,
}

impl MemoryQueue {
    /// Creates a queue with `limit` concurrent worker slots.
    ///
    /// The crawl stops if the provided token is cancelled.
    pub fn new(cancel: CancellationToken, limit: usize) -> Self {
        Self {
            inner: Arc::new(Inner {
                cancel,
                semaphore: Arc::new(Semaphore::new(limit.max(1))),
                state: Mutex::new(State::default()),
                idle: Notify::new(),
            }),
        }
    }
}

impl Inner {
    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn enqueue(inner: &Arc<Inner>, tasks: Vec<Task>) {
        if tasks.is_empty() {
            return;
        }
        {
            let mut state = inner.lock();
            if inner.cancel.is_cancelled() {
                // Work arriving after cancellation is dropped; make sure the
                // caller learns the crawl did not complete.
                state.first_error.get_or_insert(CrawlError::Cancelled);
                if state.pending == 0 {
                    inner.idle.notify_waiters();
                }
                return;
            }
            state.pending += tasks.len();
            state.buffer.extend(tasks);
        }
        Inner::pump(inner);
    }

    /// Launches buffered tasks while worker slots are free. Never blocks.
    fn pump(inner: &Arc<Inner>) {
        loop {
            if inner.cancel.is_cancelled() {
                inner.drain();
                return;
            }
            let (task, handler, permit) = {
                let mut state = inner.lock();
                let Some(handler) = state.handler.clone() else {
                    return;
                };
                let Ok(permit) = Arc::clone(&inner.semaphore).try_acquire_owned() else {
                    return;
                };
                let Some(task) = state.buffer.pop_front() else {
                    return;
                };
                (task, handler, permit)
            };

            let worker = Arc::clone(inner);
            tokio::spawn(async move {
                tracing::trace!(kind = ?task.kind(), resource = %task.resource(), "task started");
                let outcome = tokio::select! {
                    _ = worker.cancel.cancelled() => None,
                    result = handler(task) => Some(result),
                };
                match outcome {
                    Some(Ok(next)) => Inner::enqueue(&worker, next),
                    Some(Err(error)) => worker.fail(error),
                    None => worker.fail(CrawlError::Cancelled),
                }
                worker.complete();
                drop(permit);
                Inner::pump(&worker);
            });
        }
    }

    fn fail(&self, error: CrawlError) {
        {
            let mut state = self.lock();
            if state.first_error.is_none() {
                tracing::debug!(%error, "crawl failed, cancelling remaining work");
                state.first_error = Some(error);
            }
        }
        self.cancel.cancel();
        self.drain();
    }

    fn drain(&self) {
        let mut state = self.lock();
        let dropped = state.buffer.len();
        state.buffer.clear();
        state.pending -= dropped;
        if state.pending == 0 {
            self.idle.notify_waiters();
        }
    }

    fn complete(&self) {
        let mut state = self.lock();
        state.pending -= 1;
        if state.pending == 0 {
            self.idle.notify_waiters();
        }
    }
}

#[async_trait]
impl TaskQueue for MemoryQueue {
    async fn add(&self, tasks: Vec<Task>) -> Result<()> {
        Inner::enqueue(&self.inner, tasks);
        Ok(())
    }

    fn handle(&self, handler: TaskHandler) {
        {
            let mut state = self.inner.lock();
            state.handler = Some(handler);
        }
        Inner::pump(&self.inner);
    }

    async fn wait(&self) -> Result<()> {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            {
                let mut state = self.inner.lock();
                if state.pending == 0 {
                    return match state.first_error.take() {
                        Some(error) => Err(error),
                        None => Ok(()),
                    };
                }
            }
            notified.await;
        }
    }
}
