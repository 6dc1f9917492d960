use std::any::type_name;
use std::sync::Arc;

use parking_lot::RwLock;

use super::event::{Event, EventKind};

/// Abstraction over a consumer of workflow [`Event`]s.
///
/// `accept` is best-effort by contract: implementations must not block the
/// caller unboundedly and must swallow their own failures. Nothing an
/// observer does may surface as an error inside an executing workflow, so the
/// method returns nothing.
pub trait ObserverSink: Send + Sync {
    /// Consume one event. Sinks may drop events at their discretion.
    fn accept(&self, event: &Event);

    /// A stable, human-friendly identifier for this sink instance.
    ///
    /// Defaults to the concrete type name; implementors may override to
    /// provide shorter names or include configuration context.
    fn name(&self) -> String {
        type_name::<Self>().to_string()
    }
}

impl std::fmt::Debug for dyn ObserverSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ObserverSink").field(&self.name()).finish()
    }
}

/// Sink that discards every event. Zero overhead; the default binding for
/// components constructed without an explicit observer.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSink;

impl ObserverSink for NoopSink {
    fn accept(&self, _event: &Event) {}

    fn name(&self) -> String {
        "noop".to_string()
    }
}

/// Sink that forwards events to the `tracing` structured logger.
///
/// Most events are recorded at `DEBUG`. [`EventKind::NodeState`] carries full
/// input and output data snapshots and can be large in high-volume graphs, so
/// it is demoted to `TRACE`; enable that level explicitly when snapshot
/// payloads are wanted.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingSink;

impl ObserverSink for TracingSink {
    fn accept(&self, event: &Event) {
        let attrs = serde_json::to_string(event.attrs()).unwrap_or_default();
        match event.kind() {
            EventKind::NodeState => {
                tracing::trace!(
                    kind = event.kind().label(),
                    source = event.source(),
                    attrs = %attrs,
                    "workflow event"
                );
            }
            _ => {
                tracing::debug!(
                    kind = event.kind().label(),
                    source = event.source(),
                    attrs = %attrs,
                    "workflow event"
                );
            }
        }
    }

    fn name(&self) -> String {
        "tracing".to_string()
    }
}

/// Sink that accumulates every event it is handed, in emission order.
///
/// Intended for tests and ad-hoc inspection of a run: assert against
/// [`snapshot`](MemorySink::snapshot) or narrow to one lifecycle point with
/// [`of_kind`](MemorySink::of_kind). Clones share the same buffer, so a
/// handle kept by the test observes what the registered copy recorded.
/// Inspection takes shared access; only `accept` writes.
#[derive(Clone, Default)]
pub struct MemorySink {
    buffer: Arc<RwLock<Vec<Event>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far, oldest first.
    pub fn snapshot(&self) -> Vec<Event> {
        self.buffer.read().clone()
    }

    /// Recorded events matching `kind`, oldest first.
    pub fn of_kind(&self, kind: EventKind) -> Vec<Event> {
        self.buffer
            .read()
            .iter()
            .filter(|e| e.kind() == kind)
            .cloned()
            .collect()
    }

    /// Number of events recorded so far.
    pub fn len(&self) -> usize {
        self.buffer.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.read().is_empty()
    }

    /// Discard everything recorded so far; the sink keeps accepting.
    pub fn clear(&self) {
        self.buffer.write().clear();
    }
}

impl ObserverSink for MemorySink {
    fn accept(&self, event: &Event) {
        let mut buffer = self.buffer.write();
        buffer.push(event.clone());
    }

    fn name(&self) -> String {
        "memory".to_string()
    }
}

/// Channel-based sink for streaming events to async consumers.
///
/// Forwards each event to a flume channel, enabling real-time streaming to
/// web clients, dashboards, or log shippers. If the receiver has been
/// dropped the event is silently discarded, per the [`ObserverSink`]
/// contract.
///
/// # Examples
///
/// ```
/// use loomflow::observer::{ChannelSink, Event, EventKind, ObserverSink};
///
/// let (tx, rx) = flume::unbounded();
/// let sink = ChannelSink::new(tx);
/// sink.accept(&Event::new(EventKind::GraphStart, "graph:g"));
/// assert_eq!(rx.recv().unwrap().kind(), EventKind::GraphStart);
/// ```
pub struct ChannelSink {
    tx: flume::Sender<Event>,
}

impl ChannelSink {
    pub fn new(tx: flume::Sender<Event>) -> Self {
        Self { tx }
    }
}

impl ObserverSink for ChannelSink {
    fn accept(&self, event: &Event) {
        let _ = self.tx.send(event.clone());
    }

    fn name(&self) -> String {
        "channel".to_string()
    }
}

/// Multiplexing sink that forwards each event to a list of children.
///
/// Children are invoked in order on the calling thread; a slow child
/// back-pressures the producer. Producers that cannot tolerate that should
/// put a [`ChannelSink`] in front of the slow consumer instead.
pub struct FanOutSink {
    children: Vec<Arc<dyn ObserverSink>>,
}

impl FanOutSink {
    /// Build a fan-out over the given children.
    pub fn new(children: Vec<Arc<dyn ObserverSink>>) -> Self {
        Self { children }
    }

    /// Build a fan-out from optional children, filtering absent entries.
    ///
    /// Convenient when sinks are conditionally constructed:
    ///
    /// ```
    /// use std::sync::Arc;
    /// use loomflow::observer::{FanOutSink, MemorySink, ObserverSink};
    ///
    /// let capture: Option<Arc<dyn ObserverSink>> = Some(Arc::new(MemorySink::new()));
    /// let verbose: Option<Arc<dyn ObserverSink>> = None;
    /// let fan = FanOutSink::from_optional(vec![capture, verbose]);
    /// assert_eq!(fan.len(), 1);
    /// ```
    pub fn from_optional(children: Vec<Option<Arc<dyn ObserverSink>>>) -> Self {
        Self {
            children: children.into_iter().flatten().collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

impl ObserverSink for FanOutSink {
    fn accept(&self, event: &Event) {
        for child in &self.children {
            child.accept(event);
        }
    }

    fn name(&self) -> String {
        let names: Vec<String> = self.children.iter().map(|c| c.name()).collect();
        format!("fanout({})", names.join(","))
    }
}
