//! Composable workflow patterns: sequential chain, parallel worker pool,
//! and conditional router.
//!
//! Each pattern is generic over its item/accumulator/result types, resolves
//! its observer by name at construction (failing fast on unknown names), and
//! emits events at every choice point. The [`adapters`] module wraps each
//! pattern as a graph [`Node`](crate::node::Node) so patterns compose into
//! larger state graphs.

pub mod adapters;
pub mod chain;
pub mod conditional;
pub mod parallel;

pub use adapters::{ChainNode, ConditionalNode, ParallelNode};
pub use chain::{Chain, ChainError, ChainOutcome, ProgressFn};
pub use conditional::{Conditional, ConditionalError, RoutePredicate};
pub use parallel::{Parallel, ParallelError, ParallelOutcome, ParallelProgressFn, TaskFailure};
