//! # Loomflow: Workflow Orchestration Kernel
//!
//! Loomflow is the execution core for multi-step agent/LLM pipelines: a
//! state-graph interpreter with conditional edges, cycle detection, and
//! checkpoint/resume; a family of composable workflow patterns (sequential
//! chain, parallel worker pool, conditional router); an observer/event model
//! wired through every primitive; and a session-scoped cache over a
//! pluggable key-value store.
//!
//! ## Core Concepts
//!
//! - **State**: immutable, copy-on-write data container flowing through
//!   execution ([`state::WorkflowState`])
//! - **Nodes**: async units of work over the flowing state ([`node::Node`])
//! - **Graph**: directed graph of nodes with predicated edges, executed by a
//!   single-threaded interpreter ([`graph::Graph`])
//! - **Patterns**: chain/parallel/conditional combinators that also adapt
//!   into graph nodes ([`patterns`])
//! - **Observers**: named event sinks receiving every lifecycle event
//!   ([`observer`])
//! - **Session cache**: buffered in-memory view over a key-value store
//!   ([`cache::SessionCache`])
//!
//! ## Quick Start
//!
//! ### A linear graph
//!
//! ```
//! use loomflow::config::GraphConfig;
//! use loomflow::graph::Graph;
//! use loomflow::node::FnNode;
//! use loomflow::state::WorkflowState;
//! use serde_json::json;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), loomflow::graph::GraphError> {
//! let mut graph = Graph::new(&GraphConfig::named("intake"))?;
//! graph
//!     .add_node("classify", FnNode::new(|_t, s| async move {
//!         Ok(s.set("category", json!("invoice")))
//!     }))?
//!     .add_node("archive", FnNode::new(|_t, s| async move {
//!         Ok(s.set("archived", json!(true)))
//!     }))?
//!     .add_edge("classify", "archive")?
//!     .set_entry("classify")?
//!     .add_exit("archive")?;
//!
//! let result = graph
//!     .execute(&CancellationToken::new(), WorkflowState::new(None))
//!     .await?;
//! assert_eq!(result.get("archived"), Some(&json!(true)));
//! # Ok(())
//! # }
//! ```
//!
//! ### A parallel map with order preservation
//!
//! ```
//! use loomflow::config::ParallelConfig;
//! use loomflow::patterns::Parallel;
//! use tokio_util::sync::CancellationToken;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let pool = Parallel::new(&ParallelConfig::default()).unwrap();
//! let outcome = pool
//!     .run(
//!         &CancellationToken::new(),
//!         vec!["alpha", "beta", "gamma"],
//!         |_token, word| async move { Ok(word.len()) },
//!         None,
//!     )
//!     .await
//!     .unwrap();
//! // Results come back in input order regardless of completion order.
//! assert_eq!(outcome.results, vec![5, 4, 5]);
//! # }
//! ```
//!
//! ## Observability
//!
//! Every primitive resolves an [`observer::ObserverSink`] by name from the
//! process-wide registry. Two sinks are preregistered: `"noop"` (discard)
//! and `"tracing"` (forward to the `tracing` structured logger). Register
//! custom sinks with [`observer::register_observer`]; fan out to several at
//! once with [`observer::FanOutSink`].
//!
//! ## Module Guide
//!
//! - [`state`] - Immutable workflow state and its persisted projection
//! - [`node`] - Node trait and inline closure nodes
//! - [`graph`] - Graph construction, validation, execution, checkpointing
//! - [`patterns`] - Chain, parallel, conditional, and their node adapters
//! - [`observer`] - Events, sinks, and the observer registry
//! - [`cache`] - Session cache over the key-value [`store`]
//! - [`config`] - Mergeable configuration for every component

pub mod cache;
pub mod config;
pub mod graph;
pub mod node;
pub mod observer;
pub mod patterns;
pub mod state;
pub mod store;
