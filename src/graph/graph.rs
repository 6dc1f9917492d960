use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::{FxHashMap, FxHashSet};
use thiserror::Error;

use crate::config::GraphConfig;
use crate::graph::checkpoint::{CheckpointError, CheckpointStore, resolve_checkpoint_store};
use crate::node::Node;
use crate::observer::{ObserverError, ObserverSink, resolve_observer};
use crate::state::WorkflowState;

use super::execution::ExecutionError;

/// Predicate guarding an edge: pure, fast, non-blocking.
pub type EdgePredicate = Arc<dyn Fn(&WorkflowState) -> bool + Send + Sync>;

/// A directed, optionally predicated transition between two nodes.
///
/// A missing predicate means "always". Edge order at a given source defines
/// evaluation priority: the first edge whose predicate holds wins.
#[derive(Clone)]
pub struct Edge {
    pub(super) from: String,
    pub(super) to: String,
    pub(super) predicate: Option<EdgePredicate>,
    pub(super) name: Option<String>,
}

impl Edge {
    pub fn from(&self) -> &str {
        &self.from
    }

    pub fn to(&self) -> &str {
        &self.to
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn has_predicate(&self) -> bool {
        self.predicate.is_some()
    }

    /// True when this edge should be taken for `state`.
    pub(super) fn matches(&self, state: &WorkflowState) -> bool {
        match &self.predicate {
            Some(predicate) => predicate(state),
            None => true,
        }
    }
}

/// Errors from graph construction, validation, and execution.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Observer(#[from] ObserverError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// Node and edge endpoint names must be non-empty.
    #[error("node name must not be empty")]
    #[diagnostic(code(loomflow::graph::empty_name))]
    EmptyNodeName,

    #[error("duplicate node: {name}")]
    #[diagnostic(code(loomflow::graph::duplicate_node))]
    DuplicateNode { name: String },

    /// An operation referenced a node that was never registered.
    #[error("unknown node: {name}")]
    #[diagnostic(
        code(loomflow::graph::unknown_node),
        help("Register `{name}` with `add_node` before referencing it.")
    )]
    UnknownNode { name: String },

    #[error("entry node already set to {current}")]
    #[diagnostic(code(loomflow::graph::entry_already_set))]
    EntryAlreadySet { current: String },

    #[error("graph has no nodes")]
    #[diagnostic(code(loomflow::graph::no_nodes))]
    NoNodes,

    #[error("graph has no entry node")]
    #[diagnostic(code(loomflow::graph::no_entry))]
    NoEntry,

    #[error("graph has no exit nodes")]
    #[diagnostic(code(loomflow::graph::no_exit))]
    NoExit,

    /// `resume` requires a positive checkpoint interval.
    #[error("checkpointing not enabled")]
    #[diagnostic(
        code(loomflow::graph::checkpointing_disabled),
        help("Set `checkpoint.interval` to a positive value in the graph config.")
    )]
    CheckpointingDisabled,

    /// The checkpointed node is an exit with no outgoing edges; there is
    /// nothing left to run.
    #[error("execution already complete for run {run_id}")]
    #[diagnostic(code(loomflow::graph::already_complete))]
    AlreadyComplete { run_id: String },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Execution(#[from] ExecutionError),
}

pub(super) struct CheckpointPolicy {
    pub(super) store: Arc<dyn CheckpointStore>,
    pub(super) interval: u64,
    pub(super) preserve: bool,
}

/// Directed graph of computation nodes with predicated edges.
///
/// # Examples
///
/// ```
/// use loomflow::config::GraphConfig;
/// use loomflow::graph::Graph;
/// use loomflow::node::FnNode;
/// use loomflow::state::WorkflowState;
/// use serde_json::json;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), loomflow::graph::GraphError> {
/// let mut graph = Graph::new(&GraphConfig::named("greet"))?;
/// graph
///     .add_node("hello", FnNode::new(|_t, s| async move {
///         Ok(s.set("greeting", json!("hello")))
///     }))?
///     .set_entry("hello")?
///     .add_exit("hello")?;
///
/// let state = graph
///     .execute(&CancellationToken::new(), WorkflowState::new(None))
///     .await?;
/// assert_eq!(state.get("greeting"), Some(&json!("hello")));
/// # Ok(())
/// # }
/// ```
pub struct Graph {
    pub(super) name: String,
    pub(super) observer: Arc<dyn ObserverSink>,
    pub(super) nodes: FxHashMap<String, Arc<dyn Node>>,
    pub(super) edges: FxHashMap<String, Vec<Edge>>,
    pub(super) entry: Option<String>,
    pub(super) exits: FxHashSet<String>,
    pub(super) max_iterations: u64,
    pub(super) checkpoint: Option<CheckpointPolicy>,
}

impl std::fmt::Debug for Graph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("nodes", &self.nodes.keys().collect::<Vec<_>>())
            .field("entry", &self.entry)
            .field("exits", &self.exits)
            .field("max_iterations", &self.max_iterations)
            .finish()
    }
}

impl Graph {
    /// Build an empty graph from configuration.
    ///
    /// The configured observer is resolved immediately. When the checkpoint
    /// interval is positive, the configured checkpoint store is resolved as
    /// well; an unknown name for either fails construction.
    pub fn new(config: &GraphConfig) -> Result<Self, GraphError> {
        let observer = resolve_observer(&config.observer)?;
        let checkpoint = if config.checkpoint.interval > 0 {
            Some(CheckpointPolicy {
                store: resolve_checkpoint_store(&config.checkpoint.store)?,
                interval: config.checkpoint.interval,
                preserve: config.checkpoint.preserve,
            })
        } else {
            None
        };
        Ok(Self {
            name: config.name.clone(),
            observer,
            nodes: FxHashMap::default(),
            edges: FxHashMap::default(),
            entry: None,
            exits: FxHashSet::default(),
            max_iterations: config.max_iterations,
            checkpoint,
        })
    }

    /// Register a node under a unique, non-empty name.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        node: impl Node + 'static,
    ) -> Result<&mut Self, GraphError> {
        let name = name.into();
        if name.is_empty() {
            return Err(GraphError::EmptyNodeName);
        }
        if self.nodes.contains_key(&name) {
            return Err(GraphError::DuplicateNode { name });
        }
        self.nodes.insert(name, Arc::new(node));
        Ok(self)
    }

    /// Add an unconditional edge between two registered nodes.
    pub fn add_edge(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Result<&mut Self, GraphError> {
        self.push_edge(from.into(), to.into(), None, None)
    }

    /// Add a predicated edge. The predicate name appears in
    /// `edge.transition` events.
    pub fn add_edge_when(
        &mut self,
        from: impl Into<String>,
        to: impl Into<String>,
        name: impl Into<String>,
        predicate: EdgePredicate,
    ) -> Result<&mut Self, GraphError> {
        self.push_edge(from.into(), to.into(), Some(predicate), Some(name.into()))
    }

    fn push_edge(
        &mut self,
        from: String,
        to: String,
        predicate: Option<EdgePredicate>,
        name: Option<String>,
    ) -> Result<&mut Self, GraphError> {
        if from.is_empty() || to.is_empty() {
            return Err(GraphError::EmptyNodeName);
        }
        for endpoint in [&from, &to] {
            if !self.nodes.contains_key(endpoint) {
                return Err(GraphError::UnknownNode {
                    name: endpoint.clone(),
                });
            }
        }
        self.edges.entry(from.clone()).or_default().push(Edge {
            from,
            to,
            predicate,
            name,
        });
        Ok(self)
    }

    /// Set the single entry node. Fails when already set.
    pub fn set_entry(&mut self, name: impl Into<String>) -> Result<&mut Self, GraphError> {
        let name = name.into();
        if name.is_empty() {
            return Err(GraphError::EmptyNodeName);
        }
        if !self.nodes.contains_key(&name) {
            return Err(GraphError::UnknownNode { name });
        }
        if let Some(current) = &self.entry {
            return Err(GraphError::EntryAlreadySet {
                current: current.clone(),
            });
        }
        self.entry = Some(name);
        Ok(self)
    }

    /// Mark a registered node as an exit. Multiple exits are allowed.
    pub fn add_exit(&mut self, name: impl Into<String>) -> Result<&mut Self, GraphError> {
        let name = name.into();
        if name.is_empty() {
            return Err(GraphError::EmptyNodeName);
        }
        if !self.nodes.contains_key(&name) {
            return Err(GraphError::UnknownNode { name });
        }
        self.exits.insert(name);
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    pub fn is_exit(&self, name: &str) -> bool {
        self.exits.contains(name)
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Outgoing edges of a node in registration order.
    pub fn edges_from(&self, name: &str) -> &[Edge] {
        self.edges.get(name).map_or(&[], Vec::as_slice)
    }

    /// Structural validation; must pass before execution.
    ///
    /// Checks: at least one node, entry set and registered, at least one
    /// exit, every exit registered.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::NoNodes);
        }
        let entry = self.entry.as_ref().ok_or(GraphError::NoEntry)?;
        if !self.nodes.contains_key(entry) {
            return Err(GraphError::UnknownNode {
                name: entry.clone(),
            });
        }
        if self.exits.is_empty() {
            return Err(GraphError::NoExit);
        }
        for exit in &self.exits {
            if !self.nodes.contains_key(exit) {
                return Err(GraphError::UnknownNode { name: exit.clone() });
            }
        }
        Ok(())
    }

    pub(super) fn event_source(&self) -> String {
        format!("graph:{}", self.name)
    }
}
