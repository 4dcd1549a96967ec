use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use orrery_work::{
    ArtifactProvider, DispatcherConfig, MainThreadQueue, MainThreadSink, QueueRejected,
    WorkDispatcher, WorkRequest,
};

/// Stand-in for a trajectory entity whose sampled points get recomputed.
#[derive(Default)]
struct Target {
    refreshing: AtomicBool,
    samples: Mutex<Vec<u64>>,
    applied: AtomicUsize,
}

struct RefreshRequest {
    entity: u64,
    /// Sampling parameter; the "latest wins" payload.
    step: u64,
    target: Arc<Target>,
    apply_log: Arc<Mutex<Vec<u64>>>,
}

impl WorkRequest for RefreshRequest {
    type Key = u64;
    type Artifact = Vec<u64>;

    fn key(&self) -> u64 {
        self.entity
    }

    fn apply(&self, artifact: Vec<u64>) {
        *self.target.samples.lock().unwrap() = artifact;
        self.target.applied.fetch_add(1, Ordering::SeqCst);
        self.apply_log.lock().unwrap().push(self.entity);
    }

    fn set_refreshing(&self, refreshing: bool) {
        self.target.refreshing.store(refreshing, Ordering::SeqCst);
    }
}

#[derive(Debug, thiserror::Error)]
#[error("no samples available for entity {0}")]
struct SampleError(u64);

/// Test provider: can be gated (every `produce` blocks until the gate
/// opens) and told to fail for specific entities.
struct SampleProvider {
    gate: Arc<Gate>,
    fail_entities: HashSet<u64>,
    produced: Arc<Mutex<Vec<u64>>>,
}

impl ArtifactProvider<RefreshRequest> for SampleProvider {
    type Error = SampleError;

    fn produce(&mut self, request: &RefreshRequest) -> Result<Vec<u64>, SampleError> {
        self.gate.pass();
        self.produced.lock().unwrap().push(request.entity);
        if self.fail_entities.contains(&request.entity) {
            return Err(SampleError(request.entity));
        }
        Ok((0..4).map(|i| i * request.step).collect())
    }
}

#[derive(Default)]
struct Gate {
    state: Mutex<GateState>,
    cv: Condvar,
}

#[derive(Default)]
struct GateState {
    entered: usize,
    open: bool,
}

impl Gate {
    /// Starts open; call `close` before spawning to gate the provider.
    fn open_now(&self) {
        let mut state = self.state.lock().unwrap();
        state.open = true;
        self.cv.notify_all();
    }

    fn pass(&self) {
        let mut state = self.state.lock().unwrap();
        state.entered += 1;
        self.cv.notify_all();
        while !state.open {
            state = self.cv.wait(state).unwrap();
        }
    }

    /// Blocks until `produce` has been entered `count` times in total.
    fn await_entered(&self, count: usize) {
        let mut state = self.state.lock().unwrap();
        while state.entered < count {
            let (guard, timeout) = self
                .cv
                .wait_timeout(state, Duration::from_secs(5))
                .unwrap();
            state = guard;
            if timeout.timed_out() && state.entered < count {
                panic!("provider never entered ({} of {count})", state.entered);
            }
        }
    }
}

struct Fixture {
    dispatcher: WorkDispatcher<RefreshRequest>,
    sink: Arc<MainThreadQueue>,
    gate: Arc<Gate>,
    apply_log: Arc<Mutex<Vec<u64>>>,
    produced: Arc<Mutex<Vec<u64>>>,
}

impl Fixture {
    fn new(config: DispatcherConfig, gated: bool, fail_entities: &[u64]) -> Self {
        let sink = Arc::new(MainThreadQueue::new());
        let gate = Arc::new(Gate::default());
        if !gated {
            gate.open_now();
        }
        let apply_log = Arc::new(Mutex::new(Vec::new()));
        let produced = Arc::new(Mutex::new(Vec::new()));
        let provider = SampleProvider {
            gate: gate.clone(),
            fail_entities: fail_entities.iter().copied().collect(),
            produced: produced.clone(),
        };
        let dispatcher = WorkDispatcher::spawn(
            config,
            provider,
            sink.clone() as Arc<dyn MainThreadSink>,
        )
        .expect("spawn dispatcher");
        Self {
            dispatcher,
            sink,
            gate,
            apply_log,
            produced,
        }
    }

    fn request(&self, entity: u64, step: u64, target: &Arc<Target>) -> RefreshRequest {
        RefreshRequest {
            entity,
            step,
            target: target.clone(),
            apply_log: self.apply_log.clone(),
        }
    }

    fn wait_idle(&self) {
        let start = Instant::now();
        while self.dispatcher.is_busy() || self.dispatcher.queued_len() > 0 {
            assert!(
                start.elapsed() < Duration::from_secs(5),
                "dispatcher never went idle"
            );
            thread::yield_now();
        }
    }
}

#[test]
fn same_key_is_replaced_latest_wins() {
    let fx = Fixture::new(DispatcherConfig::default(), true, &[]);
    let blocker = Arc::new(Target::default());
    let target = Arc::new(Target::default());

    // Occupy the worker so the real requests stay queued.
    fx.dispatcher.queue(fx.request(0, 1, &blocker));
    fx.gate.await_entered(1);

    fx.dispatcher.queue(fx.request(7, 10, &target));
    fx.dispatcher.queue(fx.request(7, 20, &target));
    assert_eq!(fx.dispatcher.queued_len(), 1);
    assert!(target.refreshing.load(Ordering::SeqCst));

    fx.gate.open_now();
    fx.wait_idle();

    // Nothing is applied until the main thread pumps the sink.
    assert!(target.samples.lock().unwrap().is_empty());
    assert!(target.refreshing.load(Ordering::SeqCst));

    fx.sink.run_pending();
    assert_eq!(target.applied.load(Ordering::SeqCst), 1);
    assert_eq!(*target.samples.lock().unwrap(), vec![0, 20, 40, 60]);
    assert!(!target.refreshing.load(Ordering::SeqCst));
}

#[test]
fn queue_is_bounded_with_headroom_and_never_blocks() {
    let config = DispatcherConfig {
        capacity: 5,
        ..DispatcherConfig::default()
    };
    let fx = Fixture::new(config, true, &[]);
    let blocker = Arc::new(Target::default());

    fx.dispatcher.queue(fx.request(0, 1, &blocker));
    fx.gate.await_entered(1);

    let targets: Vec<Arc<Target>> = (0..10).map(|_| Arc::new(Target::default())).collect();
    let mut accepted = 0;
    for (i, target) in targets.iter().enumerate() {
        let entity = 1 + i as u64;
        match fx.dispatcher.try_queue(fx.request(entity, 1, target)) {
            Ok(()) => accepted += 1,
            Err(QueueRejected::Full) => {}
            Err(other) => panic!("unexpected rejection {other:?}"),
        }
        assert!(fx.dispatcher.queued_len() <= 4);
    }
    // capacity - 1 slots were available.
    assert_eq!(accepted, 4);

    fx.gate.open_now();
    fx.wait_idle();
    fx.sink.run_pending();

    let applied: usize = targets
        .iter()
        .map(|t| t.applied.load(Ordering::SeqCst))
        .sum();
    assert_eq!(applied, 4);
    assert_eq!(blocker.applied.load(Ordering::SeqCst), 1);
}

#[test]
fn producer_failure_abandons_batch_but_worker_survives() {
    let fx = Fixture::new(DispatcherConfig::default(), true, &[2]);
    let blocker = Arc::new(Target::default());
    let targets: Vec<Arc<Target>> = (0..6).map(|_| Arc::new(Target::default())).collect();

    fx.dispatcher.queue(fx.request(0, 1, &blocker));
    fx.gate.await_entered(1);

    // One full batch: entities 1..=5, with entity 2 doomed to fail.
    for entity in 1..=5u64 {
        fx.dispatcher
            .queue(fx.request(entity, entity, &targets[entity as usize - 1]));
    }
    fx.gate.open_now();
    fx.wait_idle();
    fx.sink.run_pending();

    // Request 1 was produced and applied before the failure.
    assert_eq!(targets[0].applied.load(Ordering::SeqCst), 1);
    // The failing request and the rest of its batch were abandoned.
    for target in &targets[1..5] {
        assert_eq!(target.applied.load(Ordering::SeqCst), 0);
    }
    assert_eq!(*fx.produced.lock().unwrap(), vec![0, 1, 2]);

    // The worker is still alive and services new requests.
    fx.dispatcher.queue(fx.request(6, 3, &targets[5]));
    fx.wait_idle();
    fx.sink.run_pending();
    assert_eq!(targets[5].applied.load(Ordering::SeqCst), 1);
    assert_eq!(*targets[5].samples.lock().unwrap(), vec![0, 3, 6, 9]);
}

#[test]
fn replaced_request_moves_to_the_back() {
    let fx = Fixture::new(DispatcherConfig::default(), true, &[]);
    let blocker = Arc::new(Target::default());
    let a = Arc::new(Target::default());
    let b = Arc::new(Target::default());

    fx.dispatcher.queue(fx.request(0, 1, &blocker));
    fx.gate.await_entered(1);

    fx.dispatcher.queue(fx.request(1, 1, &a));
    fx.dispatcher.queue(fx.request(2, 1, &b));
    fx.dispatcher.queue(fx.request(1, 5, &a));

    fx.gate.open_now();
    fx.wait_idle();
    fx.sink.run_pending();

    assert_eq!(*fx.apply_log.lock().unwrap(), vec![0, 2, 1]);
    assert_eq!(*a.samples.lock().unwrap(), vec![0, 5, 10, 15]);
}

#[test]
fn shutdown_discards_queued_requests() {
    let fx = Fixture::new(DispatcherConfig::default(), true, &[]);
    let in_flight = Arc::new(Target::default());
    let queued = Arc::new(Target::default());

    fx.dispatcher.queue(fx.request(0, 2, &in_flight));
    fx.gate.await_entered(1);
    fx.dispatcher.queue(fx.request(1, 1, &queued));

    fx.dispatcher.shutdown();
    assert_eq!(fx.dispatcher.queued_len(), 0);
    fx.gate.open_now();

    let start = Instant::now();
    while fx.dispatcher.is_busy() {
        assert!(start.elapsed() < Duration::from_secs(5));
        thread::yield_now();
    }
    fx.sink.run_pending();

    // The in-flight computation completed; the queued one was discarded.
    assert_eq!(in_flight.applied.load(Ordering::SeqCst), 1);
    assert_eq!(queued.applied.load(Ordering::SeqCst), 0);

    // New submissions are rejected after shutdown.
    assert_eq!(
        fx.dispatcher.try_queue(fx.request(3, 1, &queued)),
        Err(QueueRejected::Paused)
    );
}

#[test]
fn pause_rejects_but_keeps_resident_requests() {
    let fx = Fixture::new(DispatcherConfig::default(), true, &[]);
    let blocker = Arc::new(Target::default());
    let target = Arc::new(Target::default());

    fx.dispatcher.queue(fx.request(0, 1, &blocker));
    fx.gate.await_entered(1);
    fx.dispatcher.queue(fx.request(1, 4, &target));

    fx.dispatcher.pause();
    assert_eq!(
        fx.dispatcher.try_queue(fx.request(2, 1, &target)),
        Err(QueueRejected::Paused)
    );
    assert_eq!(fx.dispatcher.queued_len(), 1);

    fx.dispatcher.resume();
    fx.gate.open_now();
    fx.wait_idle();
    fx.sink.run_pending();
    assert_eq!(*target.samples.lock().unwrap(), vec![0, 4, 8, 12]);
}
