use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::node::{BoxError, Cancelled};
use crate::observer::{Event, EventKind};
use crate::state::WorkflowState;

use super::checkpoint::CheckpointError;
use super::graph::{Graph, GraphError};

/// What went wrong at a point in the execution loop.
#[derive(Debug, Error, Diagnostic)]
pub enum ExecutionErrorKind {
    #[error("execution cancelled")]
    #[diagnostic(code(loomflow::execution::cancelled))]
    Cancelled(#[from] Cancelled),

    #[error("exceeded maximum iterations ({cap})")]
    #[diagnostic(
        code(loomflow::execution::max_iterations),
        help("Raise `max_iterations` or add an exit condition to the cycle.")
    )]
    MaxIterations { cap: u64 },

    #[error("node not found: {name}")]
    #[diagnostic(code(loomflow::execution::node_not_found))]
    NodeNotFound { name: String },

    #[error("node failed: {source}")]
    #[diagnostic(code(loomflow::execution::node_failed))]
    Node {
        #[source]
        source: BoxError,
    },

    #[error("no outgoing edges")]
    #[diagnostic(code(loomflow::execution::no_outgoing_edges))]
    NoOutgoingEdges,

    /// Every outgoing edge was evaluated and none matched.
    #[error("no valid transition")]
    #[diagnostic(
        code(loomflow::execution::no_valid_transition),
        help("Add an unconditional fallback edge or widen a predicate.")
    )]
    NoValidTransition,

    #[error("checkpoint save failed: {source}")]
    #[diagnostic(code(loomflow::execution::checkpoint_save))]
    CheckpointSave {
        #[source]
        source: CheckpointError,
    },
}

/// Execution failure carrying enough context to diagnose or resume: the
/// failing node, the state at failure, and the path of node names visited.
#[derive(Debug, Error, Diagnostic)]
#[error("execution failed at node {node:?} after {} steps: {kind}", .path.len())]
#[diagnostic(code(loomflow::execution::failed))]
pub struct ExecutionError {
    pub node: String,
    pub state: WorkflowState,
    pub path: Vec<String>,
    #[source]
    pub kind: ExecutionErrorKind,
}

fn data_snapshot(state: &WorkflowState) -> Value {
    serde_json::to_value(state.data()).unwrap_or(Value::Null)
}

impl Graph {
    /// Execute the graph from its entry node with `initial` state.
    ///
    /// Returns the state at the exit node, or a [`GraphError::Execution`]
    /// carrying the failing node, the state at failure, and the visited
    /// path. Validation failures surface as their construction-error
    /// variants before any node runs.
    pub async fn execute(
        &self,
        token: &CancellationToken,
        initial: WorkflowState,
    ) -> Result<WorkflowState, GraphError> {
        self.validate()?;
        let entry = self
            .entry
            .as_ref()
            .ok_or(GraphError::NoEntry)?
            .clone();

        self.emit(EventKind::GraphStart, |e| {
            e.with_attr("entry", Value::String(entry.clone()))
                .with_attr("run_id", Value::String(initial.run_id().to_string()))
                .with_attr("exits", Value::from(self.exits.len()))
        });

        self.run_loop(token, entry, initial).await
    }

    /// Resume an interrupted run from its saved checkpoint.
    ///
    /// Loads the state for `run_id` from the configured checkpoint store,
    /// computes the node after the checkpointed one by the usual
    /// first-match edge rule, and re-enters the execution loop there. The
    /// loaded state is rebound to this graph's observer.
    ///
    /// # Errors
    ///
    /// - [`GraphError::CheckpointingDisabled`] when the graph has no
    ///   checkpoint policy.
    /// - [`CheckpointError::NotFound`] (wrapped) when no checkpoint exists.
    /// - [`GraphError::AlreadyComplete`] when the checkpointed node is an
    ///   exit with no outgoing edges.
    pub async fn resume(
        &self,
        token: &CancellationToken,
        run_id: &str,
    ) -> Result<WorkflowState, GraphError> {
        let policy = self
            .checkpoint
            .as_ref()
            .ok_or(GraphError::CheckpointingDisabled)?;

        let persisted = policy.store.load(run_id).await?;
        let state = persisted.into_state(self.observer.clone());
        let checkpoint_node = state.checkpoint_node().to_string();

        self.emit(EventKind::CheckpointLoad, |e| {
            e.with_attr("node", Value::String(checkpoint_node.clone()))
                .with_attr("run_id", Value::String(run_id.to_string()))
        });

        let outgoing = self.edges_from(&checkpoint_node);
        if outgoing.is_empty() {
            if self.is_exit(&checkpoint_node) {
                return Err(GraphError::AlreadyComplete {
                    run_id: run_id.to_string(),
                });
            }
            return Err(GraphError::Execution(ExecutionError {
                node: checkpoint_node,
                state,
                path: Vec::new(),
                kind: ExecutionErrorKind::NoOutgoingEdges,
            }));
        }
        let Some(edge) = outgoing.iter().find(|edge| edge.matches(&state)) else {
            return Err(GraphError::Execution(ExecutionError {
                node: checkpoint_node,
                state,
                path: Vec::new(),
                kind: ExecutionErrorKind::NoValidTransition,
            }));
        };
        let resume_node = edge.to().to_string();

        self.emit(EventKind::CheckpointResume, |e| {
            e.with_attr("checkpoint_node", Value::String(checkpoint_node.clone()))
                .with_attr("resume_node", Value::String(resume_node.clone()))
                .with_attr("run_id", Value::String(run_id.to_string()))
        });

        self.run_loop(token, resume_node, state).await
    }

    async fn run_loop(
        &self,
        token: &CancellationToken,
        start: String,
        initial: WorkflowState,
    ) -> Result<WorkflowState, GraphError> {
        let mut current = start;
        let mut state = initial;
        let mut iterations: u64 = 0;
        let mut visited: FxHashMap<String, u64> = FxHashMap::default();
        let mut path: Vec<String> = Vec::new();

        loop {
            if token.is_cancelled() {
                return Err(self.execution_error(current, state, path, Cancelled.into()));
            }

            iterations += 1;
            if iterations > self.max_iterations {
                return Err(self.execution_error(
                    current,
                    state,
                    path,
                    ExecutionErrorKind::MaxIterations {
                        cap: self.max_iterations,
                    },
                ));
            }

            let visits = visited.entry(current.clone()).or_insert(0);
            *visits += 1;
            let visits = *visits;
            path.push(current.clone());
            if visits > 1 {
                self.emit(EventKind::CycleDetected, |e| {
                    e.with_attr("node", Value::String(current.clone()))
                        .with_attr("visits", Value::from(visits))
                        .with_attr("iteration", Value::from(iterations))
                        .with_attr("path_len", Value::from(path.len()))
                });
            }

            let Some(node) = self.nodes.get(&current).cloned() else {
                return Err(self.execution_error(
                    current.clone(),
                    state,
                    path,
                    ExecutionErrorKind::NodeNotFound {
                        name: current.clone(),
                    },
                ));
            };

            let input_snapshot = data_snapshot(&state);
            self.emit(EventKind::NodeStart, |e| {
                e.with_attr("node", Value::String(current.clone()))
                    .with_attr("iteration", Value::from(iterations))
                    .with_attr("input", input_snapshot.clone())
            });

            let result = node.execute(token.clone(), state.clone()).await;

            self.emit(EventKind::NodeComplete, |e| {
                e.with_attr("node", Value::String(current.clone()))
                    .with_attr("iteration", Value::from(iterations))
                    .with_attr("error", Value::Bool(result.is_err()))
            });

            let next = match result {
                Ok(next) => {
                    self.emit(EventKind::NodeState, |e| {
                        e.with_attr("node", Value::String(current.clone()))
                            .with_attr("iteration", Value::from(iterations))
                            .with_attr("input", input_snapshot.clone())
                            .with_attr("output", data_snapshot(&next))
                    });
                    next
                }
                Err(source) => {
                    return Err(self.execution_error(
                        current,
                        state,
                        path,
                        ExecutionErrorKind::Node { source },
                    ));
                }
            };

            state = next.with_checkpoint_node(&current);

            if let Some(policy) = &self.checkpoint {
                if iterations % policy.interval == 0 {
                    if let Err(source) = state.checkpoint(policy.store.as_ref()).await {
                        return Err(self.execution_error(
                            current,
                            state,
                            path,
                            ExecutionErrorKind::CheckpointSave { source },
                        ));
                    }
                    self.emit(EventKind::CheckpointSave, |e| {
                        e.with_attr("node", Value::String(current.clone()))
                            .with_attr("run_id", Value::String(state.run_id().to_string()))
                    });
                }
            }

            if self.is_exit(&current) {
                self.emit(EventKind::GraphComplete, |e| {
                    e.with_attr("node", Value::String(current.clone()))
                        .with_attr("iterations", Value::from(iterations))
                        .with_attr("path_len", Value::from(path.len()))
                });
                if let Some(policy) = &self.checkpoint {
                    if !policy.preserve {
                        // Best-effort cleanup; a failed delete must not fail the run.
                        let _ = policy.store.delete(state.run_id()).await;
                    }
                }
                return Ok(state);
            }

            let outgoing = self.edges_from(&current);
            if outgoing.is_empty() {
                return Err(self.execution_error(
                    current,
                    state,
                    path,
                    ExecutionErrorKind::NoOutgoingEdges,
                ));
            }

            let mut chosen: Option<String> = None;
            for (index, edge) in outgoing.iter().enumerate() {
                self.emit(EventKind::EdgeEvaluate, |e| {
                    e.with_attr("from", Value::String(edge.from().to_string()))
                        .with_attr("to", Value::String(edge.to().to_string()))
                        .with_attr("index", Value::from(index))
                        .with_attr("has_predicate", Value::Bool(edge.has_predicate()))
                });
                if edge.matches(&state) {
                    self.emit(EventKind::EdgeTransition, |e| {
                        e.with_attr("from", Value::String(edge.from().to_string()))
                            .with_attr("to", Value::String(edge.to().to_string()))
                            .with_attr("index", Value::from(index))
                            .with_attr(
                                "predicate",
                                edge.name()
                                    .map_or(Value::Null, |n| Value::String(n.to_string())),
                            )
                            .with_attr("result", Value::Bool(true))
                    });
                    chosen = Some(edge.to().to_string());
                    break;
                }
            }

            match chosen {
                Some(next_node) => current = next_node,
                None => {
                    return Err(self.execution_error(
                        current,
                        state,
                        path,
                        ExecutionErrorKind::NoValidTransition,
                    ));
                }
            }
        }
    }

    fn execution_error(
        &self,
        node: String,
        state: WorkflowState,
        path: Vec<String>,
        kind: ExecutionErrorKind,
    ) -> GraphError {
        GraphError::Execution(ExecutionError {
            node,
            state,
            path,
            kind,
        })
    }

    fn emit(&self, kind: EventKind, build: impl FnOnce(Event) -> Event) {
        self.observer
            .accept(&build(Event::new(kind, self.event_source())));
    }
}
