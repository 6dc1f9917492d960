//! State-graph interpreter: construction, validation, execution, resume.
//!
//! A [`Graph`] is a directed graph of named [`Node`](crate::node::Node)s
//! connected by optionally predicated [`Edge`]s. Execution walks the graph
//! from the entry node, advancing along the first edge whose predicate holds,
//! until an exit node is reached, the iteration cap trips, or a node fails.
//! With checkpointing enabled, the flowing state is persisted at a
//! configurable cadence and an interrupted run can be picked back up with
//! [`Graph::resume`].

pub mod checkpoint;
mod execution;
#[allow(clippy::module_inception)]
mod graph;

pub use checkpoint::{
    CheckpointError, CheckpointStore, MEMORY_CHECKPOINT_STORE, MemoryCheckpointStore,
    NULL_CHECKPOINT_STORE, NullCheckpointStore, register_checkpoint_store,
    resolve_checkpoint_store,
};
pub use execution::{ExecutionError, ExecutionErrorKind};
pub use graph::{Edge, EdgePredicate, Graph, GraphError};
