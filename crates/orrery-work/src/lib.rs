//! Background recompute: service worker, main-thread sink, work dispatcher.
//!
//! Expensive derived data (sampled trajectories, resampled point clouds)
//! must not be recomputed on the render thread. This crate provides the
//! three pieces the engine uses to offload that work safely:
//!
//! 1. [`ServiceWorker`]: one dedicated background thread that runs one
//!    exclusive task at a time, with a blocking wait-for-previous handoff
//!    and a non-blocking re-run signal.
//! 2. [`MainThreadSink`]: the capability to defer a closure onto the
//!    host's main thread ([`MainThreadQueue`] is the standard drain-style
//!    implementation, pumped once per frame).
//! 3. [`WorkDispatcher`]: a bounded, per-key-deduplicating request queue
//!    drained in batches on the worker; computed artifacts are marshalled
//!    back through the sink so they are only ever applied on the main
//!    thread.

mod dispatch;
mod sink;
mod worker;

pub use dispatch::{
    ArtifactProvider, DispatcherConfig, QueueRejected, SpawnError, WorkDispatcher, WorkRequest,
    DEFAULT_MAX_BATCH, DEFAULT_QUEUE_CAPACITY,
};
pub use sink::{MainThreadJob, MainThreadQueue, MainThreadSink};
pub use worker::{ServiceWorker, Task};
