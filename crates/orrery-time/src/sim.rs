use std::sync::{Mutex, MutexGuard};

use crate::TimeSource;

/// Simulated time, advanced by the host's frame loop.
///
/// The clock holds a simulation epoch in milliseconds and a warp factor.
/// Each frame the host calls [`advance`](SimulationClock::advance) with the
/// real frame delta; the epoch moves by `delta * warp`. A warp below 1 slows
/// the simulation down, above 1 speeds it up, and a negative warp runs it
/// backwards. Fractional progress is accumulated so small frame deltas at
/// low warps are not lost to integer truncation.
#[derive(Debug)]
pub struct SimulationClock {
    state: Mutex<State>,
}

#[derive(Debug)]
struct State {
    epoch_ms: f64,
    warp: f64,
}

impl SimulationClock {
    pub fn new(epoch_ms: i64) -> Self {
        Self {
            state: Mutex::new(State {
                epoch_ms: epoch_ms as f64,
                warp: 1.0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Moves simulation time by `frame_delta_ms * warp`.
    ///
    /// Called once per frame by the host loop with the real elapsed frame
    /// time.
    pub fn advance(&self, frame_delta_ms: f64) {
        let mut state = self.lock();
        state.epoch_ms += frame_delta_ms * state.warp;
    }

    /// Jumps the simulation to an absolute epoch without touching the warp.
    pub fn set_time_ms(&self, epoch_ms: i64) {
        self.lock().epoch_ms = epoch_ms as f64;
    }

    pub fn set_warp(&self, warp: f64) {
        self.lock().warp = warp;
    }

    pub fn warp(&self) -> f64 {
        self.lock().warp
    }
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new(0)
    }
}

impl TimeSource for SimulationClock {
    fn now_ms(&self) -> i64 {
        self.lock().epoch_ms as i64
    }
}
