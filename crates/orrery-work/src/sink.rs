use std::sync::{Mutex, MutexGuard};

/// A zero-argument closure deferred to the host's main thread.
pub type MainThreadJob = Box<dyn FnOnce() + Send>;

/// Capability to run a closure on the main thread.
///
/// The host guarantees that posted jobs run on the thread driving the
/// render/simulation loop, before its next iteration begins, FIFO across
/// posts. Worker-side code uses this to apply computed artifacts without
/// racing the frame in progress.
pub trait MainThreadSink: Send + Sync {
    fn post(&self, job: MainThreadJob);
}

/// Standard [`MainThreadSink`] implementation: a simple drain queue.
///
/// Any thread may [`post`](MainThreadSink::post); the main thread calls
/// [`run_pending`](MainThreadQueue::run_pending) once per loop iteration.
/// Jobs posted while a batch is running are held for the next call, so a
/// job can safely re-post.
#[derive(Default)]
pub struct MainThreadQueue {
    jobs: Mutex<Vec<MainThreadJob>>,
}

impl MainThreadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<MainThreadJob>> {
        match self.jobs.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Runs every job posted so far, in post order, and returns how many
    /// ran.
    pub fn run_pending(&self) -> usize {
        let jobs = std::mem::take(&mut *self.lock());
        let count = jobs.len();
        for job in jobs {
            job();
        }
        count
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

impl MainThreadSink for MainThreadQueue {
    fn post(&self, job: MainThreadJob) {
        self.lock().push(job);
    }
}

impl std::fmt::Debug for MainThreadQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MainThreadQueue")
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn runs_jobs_fifo_and_clears() {
        let queue = MainThreadQueue::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        for label in ["a", "b", "c"] {
            let log = log.clone();
            queue.post(Box::new(move || log.lock().unwrap().push(label)));
        }

        assert_eq!(queue.run_pending(), 3);
        assert_eq!(*log.lock().unwrap(), vec!["a", "b", "c"]);
        assert_eq!(queue.run_pending(), 0);
    }

    #[test]
    fn jobs_posted_during_run_wait_for_next_call() {
        let queue = Arc::new(MainThreadQueue::new());
        let ran = Arc::new(AtomicUsize::new(0));

        {
            let queue_for_call = queue.clone();
            let queue = queue.clone();
            let ran = ran.clone();
            queue_for_call.post(Box::new(move || {
                ran.fetch_add(1, Ordering::SeqCst);
                let ran = ran.clone();
                queue.post(Box::new(move || {
                    ran.fetch_add(1, Ordering::SeqCst);
                }));
            }));
        }

        assert_eq!(queue.run_pending(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 1);
        assert_eq!(queue.run_pending(), 1);
        assert_eq!(ran.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn posting_is_thread_safe() {
        let queue = Arc::new(MainThreadQueue::new());
        let ran = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let queue = queue.clone();
            let ran = ran.clone();
            handles.push(std::thread::spawn(move || {
                for _ in 0..50 {
                    let ran = ran.clone();
                    queue.post(Box::new(move || {
                        ran.fetch_add(1, Ordering::SeqCst);
                    }));
                }
            }));
        }
        for handle in handles {
            handle.join().expect("poster thread");
        }

        assert_eq!(queue.run_pending(), 200);
        assert_eq!(ran.load(Ordering::SeqCst), 200);
    }
}
