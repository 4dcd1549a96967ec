use std::io;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};

/// The recurring unit of work a [`ServiceWorker`] runs.
///
/// The worker keeps the task installed across runs; [`ServiceWorker::wake`]
/// re-runs it without re-submitting.
pub type Task = Box<dyn FnMut() + Send>;

struct State {
    task: Option<Task>,
    /// A run has been requested and not yet picked up by the worker.
    signaled: bool,
    /// A run is requested or in progress; cleared when the run completes.
    busy: bool,
    running: bool,
}

struct Shared {
    state: Mutex<State>,
    /// Wakes the worker when a run is requested or shutdown begins.
    work: Condvar,
    /// Wakes submitters when the in-progress run completes.
    idle: Condvar,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn wait_work<'a>(&self, guard: MutexGuard<'a, State>) -> MutexGuard<'a, State> {
        match self.work.wait(guard) {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn wait_idle<'a>(&self, guard: MutexGuard<'a, State>) -> MutexGuard<'a, State> {
        match self.idle.wait(guard) {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// A single background execution context: one named OS thread running at
/// most one task at a time.
///
/// Spawning starts the run loop immediately; the thread then alternates
/// between waiting for a signal and running the installed task. There is no
/// queue inside the worker; queuing, if needed, is the caller's concern
/// (see `WorkDispatcher`).
///
/// A task must never call [`submit_and_wait`](Self::submit_and_wait) on its
/// own worker; that handoff waits for the current run to finish.
pub struct ServiceWorker {
    shared: Arc<Shared>,
    handle: Option<JoinHandle<()>>,
}

impl ServiceWorker {
    /// Starts a worker with no task installed; use
    /// [`submit_and_wait`](Self::submit_and_wait) to hand it work.
    pub fn spawn(name: &str) -> io::Result<Self> {
        Self::spawn_inner(name, None)
    }

    /// Starts a worker with `task` pre-installed but not yet signaled; the
    /// first [`wake`](Self::wake) runs it.
    pub fn spawn_with(name: &str, task: Task) -> io::Result<Self> {
        Self::spawn_inner(name, Some(task))
    }

    fn spawn_inner(name: &str, task: Option<Task>) -> io::Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(State {
                task,
                signaled: false,
                busy: false,
                running: true,
            }),
            work: Condvar::new(),
            idle: Condvar::new(),
        });
        let handle = thread::Builder::new().name(name.to_owned()).spawn({
            let shared = shared.clone();
            move || run_loop(&shared)
        })?;
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Installs `task` as the worker's current task and signals a run.
    ///
    /// Blocks the calling thread until any previously requested run has
    /// finished; it does *not* wait for the newly installed task. If the
    /// worker has been stopped the task is dropped.
    pub fn submit_and_wait(&self, task: Task) {
        let mut state = self.shared.state();
        while state.busy && state.running {
            state = self.shared.wait_idle(state);
        }
        if !state.running {
            return;
        }
        state.task = Some(task);
        state.signaled = true;
        state.busy = true;
        self.shared.work.notify_one();
    }

    /// Signals the worker to run its installed task (again) without
    /// changing it.
    ///
    /// Never blocks: if a run is in progress the signal is remembered and
    /// the task re-runs exactly once after the current run completes, so a
    /// condition changed mid-run (such as a queue refilling) is always
    /// re-checked.
    pub fn wake(&self) {
        let mut state = self.shared.state();
        if !state.running {
            return;
        }
        state.signaled = true;
        state.busy = true;
        self.shared.work.notify_one();
    }

    /// True from the moment a run is requested until it completes.
    pub fn is_busy(&self) -> bool {
        self.shared.state().busy
    }

    pub fn is_running(&self) -> bool {
        self.shared.state().running
    }

    /// Requests shutdown. Cooperative: an in-progress run finishes first,
    /// and the loop exits at its next wait cycle. With `flush_waiters` the
    /// worker and any blocked submitters are woken so the shutdown is
    /// observed promptly; without it a parked worker only notices on its
    /// next signal. A signal still pending when the loop exits is
    /// discarded.
    pub fn stop(&self, flush_waiters: bool) {
        let mut state = self.shared.state();
        state.running = false;
        if flush_waiters {
            self.shared.work.notify_all();
            self.shared.idle.notify_all();
        }
    }
}

impl Drop for ServiceWorker {
    fn drop(&mut self) {
        self.stop(true);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_loop(shared: &Shared) {
    loop {
        let mut task = {
            let mut state = shared.state();
            while !state.signaled && state.running {
                state = shared.wait_work(state);
            }
            if !state.running {
                break;
            }
            state.signaled = false;
            state.task.take()
        };

        // Run outside the lock so submitters and introspection never wait
        // on user code, and contain panics so a faulting task cannot take
        // the worker down with it.
        if let Some(run) = task.as_mut() {
            if catch_unwind(AssertUnwindSafe(|| run())).is_err() {
                tracing::error!("service worker task panicked; worker continues");
            }
        }

        let mut state = shared.state();
        // `busy` gates task installation, so the slot is still empty; the
        // guard only matters if a submitter raced a shutdown.
        if state.task.is_none() {
            state.task = task;
        }
        // A wake() that arrived mid-run requests exactly one more run;
        // `busy` stays up until that run completes too.
        state.busy = state.signaled;
        shared.idle.notify_all();
    }

    // Unblock anyone still parked in submit_and_wait.
    let mut state = shared.state();
    state.busy = false;
    shared.idle.notify_all();
}
