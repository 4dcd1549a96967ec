use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{MainThreadSink, ServiceWorker, Task};

/// Default bound on resident requests.
pub const DEFAULT_QUEUE_CAPACITY: usize = 15;
/// Default number of requests popped per drain batch.
pub const DEFAULT_MAX_BATCH: usize = 5;

/// A request to (re)compute an expensive derived artifact for one logical
/// target (an entity, a trajectory, a page of samples).
pub trait WorkRequest: Send + 'static {
    /// Identifies the logical target; at most one request per key is ever
    /// resident in a dispatcher's queue.
    type Key: Eq + Send;
    /// What the provider computes and [`apply`](Self::apply) consumes.
    type Artifact: Send + 'static;

    fn key(&self) -> Self::Key;

    /// Applies a computed artifact to the target. Only ever called on the
    /// main thread, via the dispatcher's sink.
    fn apply(&self, artifact: Self::Artifact);

    /// Advisory "a refresh is underway" marker on the target, set when the
    /// request is accepted and cleared (on the main thread) after
    /// [`apply`](Self::apply). UI-facing only; never used for control flow.
    fn set_refreshing(&self, _refreshing: bool) {}
}

/// Computes artifacts on the worker thread.
///
/// `produce` runs off the main thread, must be free of render-context side
/// effects, and must be safe to call repeatedly; the dispatcher calls it
/// once per drained request.
pub trait ArtifactProvider<R: WorkRequest>: Send + 'static {
    type Error: fmt::Display;

    fn produce(&mut self, request: &R) -> Result<R::Artifact, Self::Error>;
}

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Hard bound on resident requests. One slot is kept as headroom while
    /// a drain is mid-flight, so acceptance stops at `capacity - 1`.
    pub capacity: usize,
    /// Requests popped per drain batch.
    pub max_batch: usize,
    /// Name of the worker thread.
    pub thread_name: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_QUEUE_CAPACITY,
            max_batch: DEFAULT_MAX_BATCH,
            thread_name: "orrery-worker-refresh".into(),
        }
    }
}

/// Why [`WorkDispatcher::try_queue`] rejected a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueRejected {
    /// The dispatcher is paused or shutting down.
    Paused,
    /// The queue is at `capacity - 1`.
    Full,
}

/// Failed to start a dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    #[error("failed to spawn worker thread {name:?}")]
    Worker {
        name: String,
        #[source]
        source: io::Error,
    },
}

/// Bounded, per-key-deduplicating recompute pipeline.
///
/// Producer threads [`queue`](Self::queue) requests; a dedicated
/// [`ServiceWorker`] drains them in FIFO batches, runs the injected
/// [`ArtifactProvider`] for each, and posts an apply-closure per computed
/// artifact to the [`MainThreadSink`]. Results are therefore only ever
/// applied on the main thread, and at most one computation is in flight
/// per dispatcher.
pub struct WorkDispatcher<R: WorkRequest> {
    queue: Arc<Mutex<Vec<R>>>,
    worker: ServiceWorker,
    paused: Arc<AtomicBool>,
    capacity: usize,
}

fn lock<R>(queue: &Mutex<Vec<R>>) -> MutexGuard<'_, Vec<R>> {
    match queue.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl<R: WorkRequest> WorkDispatcher<R> {
    /// Starts the dispatcher and its worker thread.
    pub fn spawn<P>(
        config: DispatcherConfig,
        provider: P,
        sink: Arc<dyn MainThreadSink>,
    ) -> Result<Self, SpawnError>
    where
        P: ArtifactProvider<R>,
    {
        let queue: Arc<Mutex<Vec<R>>> = Arc::new(Mutex::new(Vec::new()));
        let task = drain_task(queue.clone(), provider, sink, config.max_batch.max(1));
        let worker =
            ServiceWorker::spawn_with(&config.thread_name, task).map_err(|source| {
                SpawnError::Worker {
                    name: config.thread_name.clone(),
                    source,
                }
            })?;
        Ok(Self {
            queue,
            worker,
            paused: Arc::new(AtomicBool::new(false)),
            capacity: config.capacity,
        })
    }

    /// Submits a recompute request; silently dropped when not accepted.
    ///
    /// See [`try_queue`](Self::try_queue) for the acceptance rules. Callers
    /// that need feedback can use `try_queue` directly or poll
    /// [`queued_len`](Self::queued_len)/[`is_busy`](Self::is_busy).
    pub fn queue(&self, request: R) {
        if let Err(rejected) = self.try_queue(request) {
            tracing::debug!("recompute request dropped: {rejected:?}");
        }
    }

    /// Submits a recompute request.
    ///
    /// Rejected when the dispatcher is paused or the queue has reached
    /// `capacity - 1` (headroom for a drain in flight). A resident request
    /// with the same key is replaced: the new request's content wins and it
    /// moves to the back of the queue. On acceptance the target is marked
    /// refreshing and the worker is woken. Never blocks.
    pub fn try_queue(&self, request: R) -> Result<(), QueueRejected> {
        if self.paused.load(Ordering::Acquire) {
            return Err(QueueRejected::Paused);
        }
        {
            let mut queue = lock(&self.queue);
            if queue.len() >= self.capacity.saturating_sub(1) {
                return Err(QueueRejected::Full);
            }
            let key = request.key();
            if let Some(resident) = queue.iter().position(|queued| queued.key() == key) {
                queue.remove(resident);
            }
            request.set_refreshing(true);
            queue.push(request);
        }
        self.worker.wake();
        Ok(())
    }

    /// Requests currently resident in the queue.
    pub fn queued_len(&self) -> usize {
        lock(&self.queue).len()
    }

    /// True while a drain cycle is requested or running.
    pub fn is_busy(&self) -> bool {
        self.worker.is_busy()
    }

    /// Stops accepting requests; resident requests stay queued and are
    /// drained once [`resume`](Self::resume) is called.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.worker.wake();
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Stops accepting requests, discards anything still queued, and shuts
    /// the worker down. An in-progress computation finishes first; its
    /// results are still posted to the sink.
    pub fn shutdown(&self) {
        self.paused.store(true, Ordering::Release);
        lock(&self.queue).clear();
        self.worker.stop(true);
    }
}

impl<R: WorkRequest> fmt::Debug for WorkDispatcher<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkDispatcher")
            .field("queued", &self.queued_len())
            .field("paused", &self.is_paused())
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// The recurring drain cycle installed on the worker.
fn drain_task<R, P>(
    queue: Arc<Mutex<Vec<R>>>,
    mut provider: P,
    sink: Arc<dyn MainThreadSink>,
    max_batch: usize,
) -> Task
where
    R: WorkRequest,
    P: ArtifactProvider<R>,
{
    Box::new(move || {
        loop {
            let batch: Vec<R> = {
                let mut queue = lock(&queue);
                if queue.is_empty() {
                    break;
                }
                let take = queue.len().min(max_batch);
                queue.drain(..take).collect()
            };
            for request in batch {
                match provider.produce(&request) {
                    Ok(artifact) => {
                        sink.post(Box::new(move || {
                            request.apply(artifact);
                            request.set_refreshing(false);
                        }));
                    }
                    Err(err) => {
                        // Typically means the request's target vanished (or
                        // its parameters were cleared) while we were
                        // draining; drop the rest of this batch and keep
                        // servicing whatever is queued next.
                        tracing::warn!("artifact refresh failed: {err}");
                        break;
                    }
                }
            }
        }
    })
}
