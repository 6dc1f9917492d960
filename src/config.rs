//! Configuration types for graphs, patterns, and stores.
//!
//! Every config supports [`merge`](GraphConfig::merge)-style layering: a
//! later source overwrites an earlier base field-by-field, where "set" means
//! non-empty for strings, positive for numbers, `Some` for tri-state
//! booleans, and recursively merged for nested configs. This lets callers
//! stack defaults, file-loaded settings, and per-call overrides without
//! clobbering unset fields.

use serde::{Deserialize, Serialize};

use crate::observer::TRACING_OBSERVER;

fn default_observer() -> String {
    TRACING_OBSERVER.to_string()
}

fn default_max_iterations() -> u64 {
    GraphConfig::DEFAULT_MAX_ITERATIONS
}

fn default_checkpoint_store() -> String {
    CheckpointConfig::DEFAULT_STORE.to_string()
}

fn default_worker_cap() -> usize {
    ParallelConfig::DEFAULT_WORKER_CAP
}

/// Settings for a [`Graph`](crate::graph::Graph).
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Graph identifier, used as the event source label (`graph:<name>`).
    pub name: String,
    /// Observer sink name resolved at graph construction.
    pub observer: String,
    /// Hard bound on loop iterations before execution is aborted.
    pub max_iterations: u64,
    /// Checkpointing behaviour.
    pub checkpoint: CheckpointConfig,
}

impl GraphConfig {
    pub const DEFAULT_MAX_ITERATIONS: u64 = 1000;

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Overlay `other` onto `self` field-by-field.
    pub fn merge(&mut self, other: &GraphConfig) {
        if !other.name.is_empty() {
            self.name = other.name.clone();
        }
        if !other.observer.is_empty() {
            self.observer = other.observer.clone();
        }
        if other.max_iterations > 0 {
            self.max_iterations = other.max_iterations;
        }
        self.checkpoint.merge(&other.checkpoint);
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            observer: default_observer(),
            max_iterations: default_max_iterations(),
            checkpoint: CheckpointConfig::default(),
        }
    }
}

/// Checkpointing settings nested inside [`GraphConfig`].
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Checkpoint-store name resolved at graph construction when
    /// checkpointing is enabled.
    pub store: String,
    /// Save a checkpoint every `interval` iterations; 0 disables
    /// checkpointing entirely.
    pub interval: u64,
    /// Keep the checkpoint after a successful run instead of deleting it.
    pub preserve: bool,
}

impl CheckpointConfig {
    pub const DEFAULT_STORE: &'static str = "memory";

    pub fn merge(&mut self, other: &CheckpointConfig) {
        if !other.store.is_empty() {
            self.store = other.store.clone();
        }
        if other.interval > 0 {
            self.interval = other.interval;
        }
        if other.preserve {
            self.preserve = true;
        }
    }
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            store: default_checkpoint_store(),
            interval: 0,
            preserve: false,
        }
    }
}

/// Settings for the sequential [`Chain`](crate::patterns::Chain) pattern.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Record every intermediate accumulator alongside the final one.
    pub capture_intermediates: bool,
    pub observer: String,
}

impl ChainConfig {
    pub fn merge(&mut self, other: &ChainConfig) {
        if other.capture_intermediates {
            self.capture_intermediates = true;
        }
        if !other.observer.is_empty() {
            self.observer = other.observer.clone();
        }
    }
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            capture_intermediates: false,
            observer: default_observer(),
        }
    }
}

/// Settings for the [`Parallel`](crate::patterns::Parallel) worker pool.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelConfig {
    /// Explicit worker count; 0 selects automatically from available
    /// parallelism, `worker_cap`, and the item count.
    pub max_workers: usize,
    /// Upper bound on the automatic worker count.
    pub worker_cap: usize,
    /// Tri-state failure mode: unset means fail-fast; `Some(false)` selects
    /// collect-all-errors.
    pub fail_fast: Option<bool>,
    pub observer: String,
}

impl ParallelConfig {
    pub const DEFAULT_WORKER_CAP: usize = 16;

    /// Effective failure mode after applying the unset-means-true default.
    pub fn fail_fast(&self) -> bool {
        self.fail_fast.unwrap_or(true)
    }

    pub fn merge(&mut self, other: &ParallelConfig) {
        if other.max_workers > 0 {
            self.max_workers = other.max_workers;
        }
        if other.worker_cap > 0 {
            self.worker_cap = other.worker_cap;
        }
        if other.fail_fast.is_some() {
            self.fail_fast = other.fail_fast;
        }
        if !other.observer.is_empty() {
            self.observer = other.observer.clone();
        }
    }
}

impl Default for ParallelConfig {
    fn default() -> Self {
        Self {
            max_workers: 0,
            worker_cap: default_worker_cap(),
            fail_fast: None,
            observer: default_observer(),
        }
    }
}

/// Settings for the [`Conditional`](crate::patterns::Conditional) router.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ConditionalConfig {
    pub observer: String,
}

impl ConditionalConfig {
    pub fn merge(&mut self, other: &ConditionalConfig) {
        if !other.observer.is_empty() {
            self.observer = other.observer.clone();
        }
    }
}

impl Default for ConditionalConfig {
    fn default() -> Self {
        Self {
            observer: default_observer(),
        }
    }
}

/// Settings for [`open_store`](crate::store::open_store).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Opaque backend locator. Empty disables the store: the factory
    /// returns a null store.
    pub path: String,
}

impl StoreConfig {
    pub fn merge(&mut self, other: &StoreConfig) {
        if !other.path.is_empty() {
            self.path = other.path.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn graph_defaults() {
        let cfg = GraphConfig::default();
        assert_eq!(cfg.observer, "tracing");
        assert_eq!(cfg.max_iterations, 1000);
        assert_eq!(cfg.checkpoint.store, "memory");
        assert_eq!(cfg.checkpoint.interval, 0);
        assert!(!cfg.checkpoint.preserve);
    }

    #[test]
    fn merge_skips_unset_fields() {
        let mut base = GraphConfig::named("pipeline");
        base.max_iterations = 50;

        let overlay = GraphConfig {
            name: String::new(),
            observer: "noop".to_string(),
            max_iterations: 0,
            checkpoint: CheckpointConfig {
                store: String::new(),
                interval: 5,
                preserve: true,
            },
        };
        base.merge(&overlay);

        assert_eq!(base.name, "pipeline");
        assert_eq!(base.observer, "noop");
        assert_eq!(base.max_iterations, 50);
        assert_eq!(base.checkpoint.store, "memory");
        assert_eq!(base.checkpoint.interval, 5);
        assert!(base.checkpoint.preserve);
    }

    #[test]
    fn parallel_fail_fast_tristate() {
        let mut cfg = ParallelConfig::default();
        assert!(cfg.fail_fast());

        cfg.merge(&ParallelConfig {
            fail_fast: Some(false),
            ..ParallelConfig::default()
        });
        assert!(!cfg.fail_fast());

        // Unset overlay does not clobber an explicit choice.
        cfg.merge(&ParallelConfig::default());
        assert!(!cfg.fail_fast());
    }
}
