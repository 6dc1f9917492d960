//! Checkpoint persistence for graph execution.
//!
//! A checkpoint is the persisted form of a [`WorkflowState`] keyed by its
//! run id. The graph interpreter writes one at a configurable iteration
//! cadence and [`Graph::resume`](crate::graph::Graph::resume) reads one back
//! to continue an interrupted run.
//!
//! Stores are resolved by name from a process-wide registry initialised with
//! two bindings: [`MEMORY_CHECKPOINT_STORE`] and [`NULL_CHECKPOINT_STORE`].

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::state::{PersistedState, WorkflowState};

/// Name of the preregistered in-memory checkpoint store; the default for
/// graph configs.
pub const MEMORY_CHECKPOINT_STORE: &str = "memory";

/// Name of the preregistered store that persists nothing.
pub const NULL_CHECKPOINT_STORE: &str = "null";

/// Errors from checkpoint stores and their registry.
#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointError {
    /// No checkpoint exists for the requested run.
    #[error("checkpoint not found for run {run_id}")]
    #[diagnostic(code(loomflow::checkpoint::not_found))]
    NotFound { run_id: String },

    /// No store is registered under the requested name.
    #[error("unknown checkpoint store: {name}")]
    #[diagnostic(
        code(loomflow::checkpoint::unknown_store),
        help("Register the store with `register_checkpoint_store(\"{name}\", ...)` before use.")
    )]
    UnknownStore { name: String },

    /// Backend storage error (database, filesystem, etc.).
    #[error("checkpoint backend error: {message}")]
    #[diagnostic(code(loomflow::checkpoint::backend))]
    Backend { message: String },
}

/// Thread-safe persistence of run checkpoints.
///
/// `save` is an upsert: the prior checkpoint for the same run id is
/// replaced. `delete` is idempotent. Implementations persist the
/// [`PersistedState`] projection, which structurally excludes secrets and
/// the observer binding.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// Persist the latest checkpoint for the state's run id.
    async fn save(&self, state: &WorkflowState) -> Result<(), CheckpointError>;

    /// Load the checkpoint for a run.
    ///
    /// # Errors
    ///
    /// [`CheckpointError::NotFound`] when no checkpoint exists for `run_id`.
    async fn load(&self, run_id: &str) -> Result<PersistedState, CheckpointError>;

    /// Delete the checkpoint for a run; silent when absent.
    async fn delete(&self, run_id: &str) -> Result<(), CheckpointError>;

    /// All run ids with a stored checkpoint, in unspecified order.
    async fn list(&self) -> Result<Vec<String>, CheckpointError>;
}

/// In-memory checkpoint store. Keeps the persisted projection in place, no
/// serialisation round trip.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    inner: RwLock<FxHashMap<String, PersistedState>>,
}

impl MemoryCheckpointStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(FxHashMap::default()),
        }
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn save(&self, state: &WorkflowState) -> Result<(), CheckpointError> {
        let persisted = PersistedState::from(state);
        self.inner
            .write()
            .insert(persisted.run_id.clone(), persisted);
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<PersistedState, CheckpointError> {
        self.inner
            .read()
            .get(run_id)
            .cloned()
            .ok_or_else(|| CheckpointError::NotFound {
                run_id: run_id.to_string(),
            })
    }

    async fn delete(&self, run_id: &str) -> Result<(), CheckpointError> {
        self.inner.write().remove(run_id);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, CheckpointError> {
        Ok(self.inner.read().keys().cloned().collect())
    }
}

/// Checkpoint store that persists nothing: saves and deletes are no-ops,
/// loads always miss. Backs configurations with checkpointing disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullCheckpointStore;

#[async_trait]
impl CheckpointStore for NullCheckpointStore {
    async fn save(&self, _state: &WorkflowState) -> Result<(), CheckpointError> {
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Result<PersistedState, CheckpointError> {
        Err(CheckpointError::NotFound {
            run_id: run_id.to_string(),
        })
    }

    async fn delete(&self, _run_id: &str) -> Result<(), CheckpointError> {
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, CheckpointError> {
        Ok(Vec::new())
    }
}

static CHECKPOINT_STORES: LazyLock<RwLock<FxHashMap<String, Arc<dyn CheckpointStore>>>> =
    LazyLock::new(|| {
        let mut map: FxHashMap<String, Arc<dyn CheckpointStore>> = FxHashMap::default();
        map.insert(
            MEMORY_CHECKPOINT_STORE.to_string(),
            Arc::new(MemoryCheckpointStore::new()),
        );
        map.insert(
            NULL_CHECKPOINT_STORE.to_string(),
            Arc::new(NullCheckpointStore),
        );
        RwLock::new(map)
    });

/// Bind a checkpoint store under a name, replacing any prior binding.
pub fn register_checkpoint_store(name: impl Into<String>, store: Arc<dyn CheckpointStore>) {
    CHECKPOINT_STORES.write().insert(name.into(), store);
}

/// Look up a checkpoint store by name.
///
/// # Errors
///
/// [`CheckpointError::UnknownStore`] when nothing is registered under
/// `name`; graph construction propagates this when checkpointing is
/// enabled with an unresolvable store.
pub fn resolve_checkpoint_store(name: &str) -> Result<Arc<dyn CheckpointStore>, CheckpointError> {
    CHECKPOINT_STORES
        .read()
        .get(name)
        .cloned()
        .ok_or_else(|| CheckpointError::UnknownStore {
            name: name.to_string(),
        })
}
