use std::fmt;
use std::sync::Arc;

use crate::{SimulationClock, TimeSource, WallClock};

/// Identifies one of the engine's two timelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockId {
    /// Real time from the user's perspective.
    Real,
    /// Time on the simulation clock.
    Simulation,
}

impl ClockId {
    pub const ALL: [ClockId; 2] = [ClockId::Real, ClockId::Simulation];
}

/// The engine's clock registry: one [`TimeSource`] per [`ClockId`].
///
/// The host constructs the registry and keeps its own handles to the
/// underlying sources (it advances the simulation clock every frame); the
/// event bus only ever reads through [`now_ms`](ClockSet::now_ms).
#[derive(Clone)]
pub struct ClockSet {
    real: Arc<dyn TimeSource>,
    simulation: Arc<dyn TimeSource>,
}

impl ClockSet {
    pub fn new(real: Arc<dyn TimeSource>, simulation: Arc<dyn TimeSource>) -> Self {
        Self { real, simulation }
    }

    /// A wall clock plus a freshly constructed simulation clock.
    pub fn standard() -> (Self, Arc<SimulationClock>) {
        let simulation = Arc::new(SimulationClock::default());
        let set = Self::new(Arc::new(WallClock::new()), simulation.clone());
        (set, simulation)
    }

    pub fn now_ms(&self, id: ClockId) -> i64 {
        self.source(id).now_ms()
    }

    pub fn source(&self, id: ClockId) -> &Arc<dyn TimeSource> {
        match id {
            ClockId::Real => &self.real,
            ClockId::Simulation => &self.simulation,
        }
    }
}

impl fmt::Debug for ClockSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClockSet")
            .field("real_ms", &self.real.now_ms())
            .field("simulation_ms", &self.simulation.now_ms())
            .finish()
    }
}
