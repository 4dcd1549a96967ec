use orrery_time::ClockId;

/// Engine events, with their payloads.
///
/// The set is closed on purpose: every payload is statically typed at the
/// publish site and at every subscriber, and [`Event::kind`] gives the tag
/// used for subscription. Events describe things that happened (or are
/// requested); they carry no references into engine state.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The camera switched focus to a named object.
    FocusChanged { object: String },
    /// Camera position update, broadcast by the camera manager.
    CameraMoved { position: [f64; 3] },
    /// The simulation warp factor changed.
    TimeWarpChanged { warp: f64 },
    /// The simulation clock jumped to an absolute epoch.
    SimulationDateChanged { epoch_ms: i64 },
    /// Which clock newly scheduled delayed events use when none is given.
    DefaultClockChanged { clock: ClockId },
    /// A trajectory's sampled points no longer match its orbit parameters.
    TrajectoryDirty { entity: u64 },
    /// Visibility of a component group (orbits, labels, grids, ...) toggled.
    VisibilityToggled { group: String, visible: bool },
    /// Transient message for the on-screen console.
    NoticePosted { text: String },
    /// A screenshot of the current frame was requested.
    ScreenshotRequested { width: u32, height: u32 },
    /// The application is shutting down.
    Shutdown,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::FocusChanged { .. } => EventKind::FocusChanged,
            Event::CameraMoved { .. } => EventKind::CameraMoved,
            Event::TimeWarpChanged { .. } => EventKind::TimeWarpChanged,
            Event::SimulationDateChanged { .. } => EventKind::SimulationDateChanged,
            Event::DefaultClockChanged { .. } => EventKind::DefaultClockChanged,
            Event::TrajectoryDirty { .. } => EventKind::TrajectoryDirty,
            Event::VisibilityToggled { .. } => EventKind::VisibilityToggled,
            Event::NoticePosted { .. } => EventKind::NoticePosted,
            Event::ScreenshotRequested { .. } => EventKind::ScreenshotRequested,
            Event::Shutdown => EventKind::Shutdown,
        }
    }
}

/// Subscription tag: one per [`Event`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    FocusChanged,
    CameraMoved,
    TimeWarpChanged,
    SimulationDateChanged,
    DefaultClockChanged,
    TrajectoryDirty,
    VisibilityToggled,
    NoticePosted,
    ScreenshotRequested,
    Shutdown,
}

/// A subscriber to bus events.
///
/// `notify` runs on whichever thread called [`EventBus::publish`] or
/// [`EventBus::tick`]; implementations must not assume the main thread.
/// Calling back into the bus (subscribe, unsubscribe, publish, schedule)
/// from inside `notify` is allowed.
///
/// [`EventBus::publish`]: crate::EventBus::publish
/// [`EventBus::tick`]: crate::EventBus::tick
pub trait Observer: Send + Sync {
    fn notify(&self, event: &Event);
}
