use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use orrery_time::{ClockId, ClockSet};

use crate::pending::PendingEvent;
use crate::{Event, EventKind, Observer};

type ObserverRef = Arc<dyn Observer>;
type Heap = BinaryHeap<Reverse<PendingEvent>>;

/// The engine's event bus.
///
/// One instance is constructed by the owning application context and handed
/// (by `Arc`) to every component that needs it. All operations take `&self`
/// and are safe to call from any thread.
///
/// Subscription changes made from inside an observer's `notify` are applied
/// immediately but never affect a fan-out already in flight: `publish`
/// works off a snapshot of the subscriber list taken when it starts.
pub struct EventBus {
    clocks: ClockSet,
    subscriptions: Mutex<HashMap<EventKind, Vec<ObserverRef>>>,
    /// One pending-heap per clock, indexed by `heap_index`.
    heaps: [Mutex<Heap>; 2],
    default_clock: Mutex<ClockId>,
    seq: AtomicU64,
}

fn heap_index(clock: ClockId) -> usize {
    match clock {
        ClockId::Real => 0,
        ClockId::Simulation => 1,
    }
}

fn data_ptr(observer: &dyn Observer) -> *const () {
    observer as *const dyn Observer as *const ()
}

fn is_same(stored: &ObserverRef, observer: *const ()) -> bool {
    Arc::as_ptr(stored) as *const () == observer
}

impl EventBus {
    pub fn new(clocks: ClockSet) -> Self {
        Self {
            clocks,
            subscriptions: Mutex::new(HashMap::new()),
            heaps: [Mutex::new(Heap::new()), Mutex::new(Heap::new())],
            default_clock: Mutex::new(ClockId::Real),
            seq: AtomicU64::new(0),
        }
    }

    fn subscriptions(&self) -> MutexGuard<'_, HashMap<EventKind, Vec<ObserverRef>>> {
        match self.subscriptions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn heap(&self, clock: ClockId) -> MutexGuard<'_, Heap> {
        match self.heaps[heap_index(clock)].lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Subscribes `observer` to the given event kinds.
    ///
    /// Idempotent: subscribing an already-subscribed observer to the same
    /// kind is a no-op, and it will still be notified exactly once per
    /// publish. Subscribers are notified in subscription order.
    pub fn subscribe(&self, observer: ObserverRef, kinds: &[EventKind]) {
        let ptr = Arc::as_ptr(&observer) as *const ();
        let mut subs = self.subscriptions();
        for &kind in kinds {
            let list = subs.entry(kind).or_default();
            if !list.iter().any(|stored| is_same(stored, ptr)) {
                list.push(observer.clone());
            }
        }
    }

    /// Unsubscribes `observer` from the given event kinds. No-op for kinds
    /// it was not subscribed to.
    pub fn unsubscribe(&self, observer: &dyn Observer, kinds: &[EventKind]) {
        let ptr = data_ptr(observer);
        let mut subs = self.subscriptions();
        for kind in kinds {
            if let Some(list) = subs.get_mut(kind) {
                list.retain(|stored| !is_same(stored, ptr));
            }
        }
    }

    /// Removes every subscription held by `observer`.
    pub fn unsubscribe_all(&self, observer: &dyn Observer) {
        let ptr = data_ptr(observer);
        let mut subs = self.subscriptions();
        for list in subs.values_mut() {
            list.retain(|stored| !is_same(stored, ptr));
        }
    }

    /// Drops every subscriber of `kind`.
    pub fn clear_subscriptions(&self, kind: EventKind) {
        self.subscriptions().remove(&kind);
    }

    /// Drops all subscriptions for all kinds.
    pub fn clear_all(&self) {
        self.subscriptions().clear();
    }

    /// Synchronously delivers `event` to every current subscriber of its
    /// kind, in subscription order, on the calling thread.
    ///
    /// The subscriber list is snapshotted before delivery starts, so
    /// observers may subscribe, unsubscribe or publish from inside their
    /// handlers without deadlocking and without changing the in-flight
    /// fan-out.
    pub fn publish(&self, event: Event) {
        let observers: Vec<ObserverRef> = {
            let subs = self.subscriptions();
            match subs.get(&event.kind()) {
                Some(list) if !list.is_empty() => list.clone(),
                _ => return,
            }
        };
        for observer in observers {
            observer.notify(&event);
        }
    }

    /// Schedules `event` for delivery once `delay_ms` has elapsed on the
    /// current default clock.
    ///
    /// A zero or negative delay delivers synchronously, exactly like
    /// [`publish`](Self::publish). Otherwise the call returns immediately
    /// and the event fires from a future [`tick`](Self::tick).
    pub fn publish_delayed(&self, event: Event, delay_ms: i64) {
        let clock = self.default_clock();
        self.publish_delayed_on(event, delay_ms, clock);
    }

    /// Schedules `event` on an explicit clock; see
    /// [`publish_delayed`](Self::publish_delayed).
    pub fn publish_delayed_on(&self, event: Event, delay_ms: i64, clock: ClockId) {
        if delay_ms <= 0 {
            self.publish(event);
            return;
        }
        let due_ms = self.clocks.now_ms(clock).saturating_add(delay_ms);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        self.heap(clock).push(Reverse(PendingEvent { due_ms, seq, event }));
    }

    /// Delivers every pending event whose due time has passed.
    ///
    /// Must be called once per iteration of the host's main loop. Each
    /// clock's "now" is read once, then its overdue prefix is fully drained
    /// in (due time, schedule order), so delivery cannot lag behind a burst
    /// of near-simultaneous schedulings. Events are published after the
    /// heap lock is released, so handlers may schedule further events.
    pub fn tick(&self) {
        for clock in ClockId::ALL {
            let now = self.clocks.now_ms(clock);
            loop {
                let due = {
                    let mut heap = self.heap(clock);
                    match heap.peek() {
                        Some(Reverse(pending)) if pending.due_ms <= now => {
                            heap.pop().map(|Reverse(pending)| pending)
                        }
                        _ => None,
                    }
                };
                match due {
                    Some(pending) => self.publish(pending.event),
                    None => break,
                }
            }
        }
    }

    /// Selects the clock used by [`publish_delayed`](Self::publish_delayed)
    /// from now on. Already-scheduled events keep the clock they were
    /// scheduled on.
    pub fn set_default_clock(&self, clock: ClockId) {
        match self.default_clock.lock() {
            Ok(mut guard) => *guard = clock,
            Err(poisoned) => *poisoned.into_inner() = clock,
        }
    }

    pub fn default_clock(&self) -> ClockId {
        match self.default_clock.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub fn has_subscribers(&self, kind: EventKind) -> bool {
        self.subscriptions()
            .get(&kind)
            .is_some_and(|list| !list.is_empty())
    }

    pub fn is_subscribed(&self, observer: &dyn Observer, kind: EventKind) -> bool {
        let ptr = data_ptr(observer);
        self.subscriptions()
            .get(&kind)
            .is_some_and(|list| list.iter().any(|stored| is_same(stored, ptr)))
    }

    pub fn is_subscribed_to_any(&self, observer: &dyn Observer) -> bool {
        let ptr = data_ptr(observer);
        self.subscriptions()
            .values()
            .any(|list| list.iter().any(|stored| is_same(stored, ptr)))
    }

    /// Number of events still waiting on `clock`'s heap.
    pub fn pending_delayed(&self, clock: ClockId) -> usize {
        self.heap(clock).len()
    }
}
