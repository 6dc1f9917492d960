//! Immutable workflow state.
//!
//! [`WorkflowState`] carries type-erased key/value data, a parallel secrets
//! namespace, and execution identity (run id, last-checkpoint node,
//! timestamp) through graph and pattern execution. Every mutator returns a
//! new value, so states flow freely across concurrent workers and through
//! checkpoints without synchronisation.
//!
//! Secrets never leave the process: they are excluded from serialisation and
//! no state event ever carries a secret key or value.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

use crate::graph::checkpoint::{CheckpointError, CheckpointStore};
use crate::observer::{Event, EventKind, NoopSink, ObserverSink};

const EVENT_SOURCE: &str = "state";

/// Copy-on-write container of workflow data.
///
/// # Data vs. secrets
///
/// The `data` and `secrets` maps are distinct namespaces; the same key may
/// exist in both with different values. Data mutations emit observer events
/// (key names only, never values); secret operations emit nothing.
///
/// # Identity
///
/// A fresh run id is assigned by [`WorkflowState::new`] and is stable across
/// every derivative of that state, which is what ties a checkpoint back to
/// its run.
///
/// # Examples
///
/// ```
/// use loomflow::state::WorkflowState;
/// use serde_json::json;
///
/// let initial = WorkflowState::new(None);
/// let updated = initial.set("customer", json!("acme"));
///
/// // The original is untouched.
/// assert!(initial.get("customer").is_none());
/// assert_eq!(updated.get("customer"), Some(&json!("acme")));
/// assert_eq!(initial.run_id(), updated.run_id());
/// ```
#[derive(Clone)]
pub struct WorkflowState {
    run_id: String,
    checkpoint_node: String,
    updated_at: DateTime<Utc>,
    data: FxHashMap<String, Value>,
    secrets: FxHashMap<String, Value>,
    observer: Arc<dyn ObserverSink>,
}

impl WorkflowState {
    /// Create an empty state with a fresh run id and the current timestamp.
    ///
    /// A missing observer is silently replaced by the no-op sink. Emits
    /// `state.create`.
    pub fn new(observer: Option<Arc<dyn ObserverSink>>) -> Self {
        let state = Self {
            run_id: Uuid::new_v4().to_string(),
            checkpoint_node: String::new(),
            updated_at: Utc::now(),
            data: FxHashMap::default(),
            secrets: FxHashMap::default(),
            observer: observer.unwrap_or_else(|| Arc::new(NoopSink)),
        };
        state.emit(EventKind::StateCreate, |e| {
            e.with_attr("run_id", Value::String(state.run_id.clone()))
        });
        state
    }

    /// Fluent constructor for states with initial data.
    pub fn builder() -> WorkflowStateBuilder {
        WorkflowStateBuilder::default()
    }

    /// An independent copy sharing the observer, run id, and checkpoint
    /// node. Emits `state.clone`.
    pub fn fork(&self) -> Self {
        let copy = self.clone();
        copy.emit(EventKind::StateClone, |e| {
            e.with_attr("run_id", Value::String(copy.run_id.clone()))
        });
        copy
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Name of the node recorded at the most recent checkpoint boundary;
    /// empty before the first node completes.
    pub fn checkpoint_node(&self) -> &str {
        &self.checkpoint_node
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn observer(&self) -> &Arc<dyn ObserverSink> {
        &self.observer
    }

    /// Read-only view of the data map.
    pub fn data(&self) -> &FxHashMap<String, Value> {
        &self.data
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// New state with `key` upserted in the data map. Emits `state.set`
    /// carrying the key name only.
    #[must_use = "set returns a new state; the original is unchanged"]
    pub fn set(&self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        let mut next = self.clone();
        next.data.insert(key.clone(), value);
        next.updated_at = Utc::now();
        next.emit(EventKind::StateSet, |e| {
            e.with_attr("key", Value::String(key.clone()))
        });
        next
    }

    /// New state with every data entry of `other` copied in, overwriting on
    /// collision. Emits `state.merge` with the number of keys copied.
    #[must_use = "merge returns a new state; the original is unchanged"]
    pub fn merge(&self, other: &WorkflowState) -> Self {
        let mut next = self.clone();
        for (key, value) in &other.data {
            next.data.insert(key.clone(), value.clone());
        }
        next.updated_at = Utc::now();
        next.emit(EventKind::StateMerge, |e| {
            e.with_attr("keys", Value::from(other.data.len()))
        });
        next
    }

    /// New state with the checkpoint-node marker updated and the timestamp
    /// refreshed. Emits no event.
    #[must_use = "with_checkpoint_node returns a new state; the original is unchanged"]
    pub fn with_checkpoint_node(&self, node: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.checkpoint_node = node.into();
        next.updated_at = Utc::now();
        next
    }

    pub fn get_secret(&self, key: &str) -> Option<&Value> {
        self.secrets.get(key)
    }

    /// New state with `key` upserted in the secrets map. No event.
    #[must_use = "set_secret returns a new state; the original is unchanged"]
    pub fn set_secret(&self, key: impl Into<String>, value: Value) -> Self {
        let mut next = self.clone();
        next.secrets.insert(key.into(), value);
        next.updated_at = Utc::now();
        next
    }

    /// New state with `key` dropped from the secrets map. No event.
    #[must_use = "delete_secret returns a new state; the original is unchanged"]
    pub fn delete_secret(&self, key: &str) -> Self {
        let mut next = self.clone();
        next.secrets.remove(key);
        next.updated_at = Utc::now();
        next
    }

    /// Persist this state to a checkpoint store, keyed by run id.
    pub async fn checkpoint(&self, store: &dyn CheckpointStore) -> Result<(), CheckpointError> {
        store.save(self).await
    }

    fn emit(&self, kind: EventKind, build: impl FnOnce(Event) -> Event) {
        self.observer.accept(&build(Event::new(kind, EVENT_SOURCE)));
    }
}

impl fmt::Debug for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowState")
            .field("run_id", &self.run_id)
            .field("checkpoint_node", &self.checkpoint_node)
            .field("updated_at", &self.updated_at)
            .field("data", &self.data)
            .field("secrets", &format_args!("<{} redacted>", self.secrets.len()))
            .finish_non_exhaustive()
    }
}

impl Serialize for WorkflowState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        PersistedState::from(self).serialize(serializer)
    }
}

/// Fluent builder producing a [`WorkflowState`] with one `state.create`
/// emission at [`build`](WorkflowStateBuilder::build).
///
/// # Examples
///
/// ```
/// use loomflow::state::WorkflowState;
/// use serde_json::json;
///
/// let state = WorkflowState::builder()
///     .with_value("tenant", json!("acme"))
///     .with_secret("api_key", json!("s3cret"))
///     .build();
///
/// assert_eq!(state.get("tenant"), Some(&json!("acme")));
/// assert_eq!(state.get_secret("api_key"), Some(&json!("s3cret")));
/// ```
#[derive(Default)]
pub struct WorkflowStateBuilder {
    observer: Option<Arc<dyn ObserverSink>>,
    data: FxHashMap<String, Value>,
    secrets: FxHashMap<String, Value>,
}

impl WorkflowStateBuilder {
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ObserverSink>) -> Self {
        self.observer = Some(observer);
        self
    }

    #[must_use]
    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn with_secret(mut self, key: impl Into<String>, value: Value) -> Self {
        self.secrets.insert(key.into(), value);
        self
    }

    pub fn build(self) -> WorkflowState {
        let mut state = WorkflowState::new(self.observer);
        state.data = self.data;
        state.secrets = self.secrets;
        state
    }
}

/// The externally visible form of a state: run identity, checkpoint marker,
/// timestamp, and the data map. Secrets and the observer binding are
/// structurally absent, so no serialisation path can leak them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PersistedState {
    pub run_id: String,
    pub checkpoint_node: String,
    pub updated_at: DateTime<Utc>,
    pub data: FxHashMap<String, Value>,
}

impl PersistedState {
    /// Rehydrate into a live state bound to `observer`. Secrets start
    /// empty; they are session-local and never round-trip through storage.
    pub fn into_state(self, observer: Arc<dyn ObserverSink>) -> WorkflowState {
        WorkflowState {
            run_id: self.run_id,
            checkpoint_node: self.checkpoint_node,
            updated_at: self.updated_at,
            data: self.data,
            secrets: FxHashMap::default(),
            observer,
        }
    }
}

impl From<&WorkflowState> for PersistedState {
    fn from(state: &WorkflowState) -> Self {
        Self {
            run_id: state.run_id.clone(),
            checkpoint_node: state.checkpoint_node.clone(),
            updated_at: state.updated_at,
            data: state.data.clone(),
        }
    }
}
