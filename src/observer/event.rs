use std::fmt;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The closed set of observation points in the orchestration kernel.
///
/// Kinds are grouped by the primitive that emits them: state lifecycle,
/// graph/node/edge execution, the chain and parallel patterns, checkpointing,
/// and conditional routing. Sinks that only care about a slice of the
/// lifecycle can match on the variant and drop the rest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    StateCreate,
    StateClone,
    StateSet,
    StateMerge,
    GraphStart,
    GraphComplete,
    NodeStart,
    NodeComplete,
    NodeState,
    EdgeEvaluate,
    EdgeTransition,
    CycleDetected,
    ChainStart,
    ChainStepStart,
    ChainStepComplete,
    ChainComplete,
    ParallelStart,
    WorkerStart,
    WorkerComplete,
    ParallelComplete,
    CheckpointSave,
    CheckpointLoad,
    CheckpointResume,
    RouteEvaluate,
    RouteSelect,
    RouteExecute,
}

impl EventKind {
    /// Stable dotted label used in rendered output and structured logs.
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::StateCreate => "state.create",
            EventKind::StateClone => "state.clone",
            EventKind::StateSet => "state.set",
            EventKind::StateMerge => "state.merge",
            EventKind::GraphStart => "graph.start",
            EventKind::GraphComplete => "graph.complete",
            EventKind::NodeStart => "node.start",
            EventKind::NodeComplete => "node.complete",
            EventKind::NodeState => "node.state",
            EventKind::EdgeEvaluate => "edge.evaluate",
            EventKind::EdgeTransition => "edge.transition",
            EventKind::CycleDetected => "cycle.detected",
            EventKind::ChainStart => "chain.start",
            EventKind::ChainStepStart => "chain.step.start",
            EventKind::ChainStepComplete => "chain.step.complete",
            EventKind::ChainComplete => "chain.complete",
            EventKind::ParallelStart => "parallel.start",
            EventKind::WorkerStart => "parallel.worker.start",
            EventKind::WorkerComplete => "parallel.worker.complete",
            EventKind::ParallelComplete => "parallel.complete",
            EventKind::CheckpointSave => "checkpoint.save",
            EventKind::CheckpointLoad => "checkpoint.load",
            EventKind::CheckpointResume => "checkpoint.resume",
            EventKind::RouteEvaluate => "route.evaluate",
            EventKind::RouteSelect => "route.select",
            EventKind::RouteExecute => "route.execute",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A single observation emitted by an orchestration primitive.
///
/// Events are immutable after emission: primitives build them with
/// [`Event::new`] and [`Event::with_attr`], hand them to a sink, and never
/// touch them again. The attribute map carries free-form structured context
/// (step indices, node names, snapshot payloads) keyed by short snake_case
/// names.
///
/// # Examples
///
/// ```
/// use loomflow::observer::{Event, EventKind};
/// use serde_json::json;
///
/// let event = Event::new(EventKind::NodeStart, "graph:pipeline")
///     .with_attr("node", json!("classify"))
///     .with_attr("iteration", json!(3));
///
/// assert_eq!(event.kind(), EventKind::NodeStart);
/// assert_eq!(event.attr("node"), Some(&json!("classify")));
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Event {
    kind: EventKind,
    at: DateTime<Utc>,
    source: String,
    attrs: FxHashMap<String, Value>,
}

impl Event {
    /// Create an event stamped with the current wall-clock time.
    ///
    /// `source` labels the emitting component, e.g. `"state"`, `"chain"`,
    /// or `"graph:pipeline"`.
    pub fn new(kind: EventKind, source: impl Into<String>) -> Self {
        Self {
            kind,
            at: Utc::now(),
            source: source.into(),
            attrs: FxHashMap::default(),
        }
    }

    /// Attach a structured attribute; later values for the same key win.
    #[must_use]
    pub fn with_attr(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attrs.insert(key.into(), value);
        self
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn at(&self) -> DateTime<Utc> {
        self.at
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn attrs(&self) -> &FxHashMap<String, Value> {
        &self.attrs
    }

    /// Look up a single attribute by key.
    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    /// Convert the event to a JSON value with a normalized schema:
    /// `{"kind", "source", "at", "attrs"}`.
    pub fn to_json_value(&self) -> Value {
        serde_json::json!({
            "kind": self.kind.label(),
            "source": self.source,
            "at": self.at.to_rfc3339(),
            "attrs": self.attrs,
        })
    }

    /// Compact single-line JSON rendering, suitable for JSONL sinks.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.to_json_value())
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.source, self.kind.label())?;
        if !self.attrs.is_empty() {
            let mut keys: Vec<&str> = self.attrs.keys().map(String::as_str).collect();
            keys.sort_unstable();
            let rendered: Vec<String> = keys
                .into_iter()
                .map(|k| format!("{k}={}", self.attrs[k]))
                .collect();
            write!(f, " {}", rendered.join(" "))?;
        }
        Ok(())
    }
}
