//! Observer bus: events, sinks, and the process-wide sink registry.
//!
//! Every orchestration primitive in this crate emits [`Event`]s at its choice
//! points (node boundaries, edge evaluation, pattern steps, checkpoints).
//! Components never couple to a concrete observer implementation; they hold an
//! [`ObserverSink`] resolved by name from the [`registry`], and pay nothing
//! when observability is disabled (the `"noop"` sink).

pub mod event;
pub mod registry;
pub mod sink;

pub use event::{Event, EventKind};
pub use registry::{
    NOOP_OBSERVER, ObserverError, TRACING_OBSERVER, register_observer, resolve_observer,
};
pub use sink::{ChannelSink, FanOutSink, MemorySink, NoopSink, ObserverSink, TracingSink};
