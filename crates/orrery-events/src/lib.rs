//! Publish/subscribe event bus with clock-relative delayed dispatch.
//!
//! Producers and consumers of engine state changes are decoupled through a
//! single [`EventBus`]: observers subscribe to [`EventKind`]s, publishers
//! fire [`Event`]s either immediately (synchronous fan-out on the calling
//! thread) or after a delay measured on one of the engine's two clocks
//! (real or simulation time). Delayed events sit in a per-clock min-heap
//! until the host's main loop calls [`EventBus::tick`], once per frame.
//!
//! Payloads are typed: each [`Event`] variant carries its own fields, so a
//! subscriber matching on a variant can never see a payload of the wrong
//! shape.

mod bus;
mod event;
mod pending;

pub use bus::EventBus;
pub use event::{Event, EventKind, Observer};
