//! Node execution primitives for the graph interpreter.
//!
//! A [`Node`] is a single unit of computation in a workflow: it receives the
//! flowing [`WorkflowState`] and returns the next state. Nodes should be
//! stateless or close over immutable configuration; identity comes from the
//! name they are registered under in a graph.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use miette::Diagnostic;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::state::WorkflowState;

/// Boxed error type flowing out of user computations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Error marking cooperative cancellation of an execution.
///
/// Wrapped as the underlying cause wherever a pattern or graph stops because
/// the caller's [`CancellationToken`] fired, so callers can match it through
/// `source()` chains.
#[derive(Clone, Copy, Debug, Error, Diagnostic)]
#[error("execution cancelled")]
#[diagnostic(code(loomflow::cancelled))]
pub struct Cancelled;

/// Core trait defining executable workflow nodes.
///
/// Nodes observe cancellation through the token argument and are expected to
/// return promptly once it fires; the interpreter additionally checks the
/// token at every node boundary.
///
/// # Examples
///
/// ```
/// use async_trait::async_trait;
/// use loomflow::node::{BoxError, Node};
/// use loomflow::state::WorkflowState;
/// use serde_json::json;
/// use tokio_util::sync::CancellationToken;
///
/// struct Tag;
///
/// #[async_trait]
/// impl Node for Tag {
///     async fn execute(
///         &self,
///         _token: CancellationToken,
///         state: WorkflowState,
///     ) -> Result<WorkflowState, BoxError> {
///         Ok(state.set("tagged", json!(true)))
///     }
/// }
/// ```
#[async_trait]
pub trait Node: Send + Sync {
    /// Execute this node against the flowing state, returning the next
    /// state or the error that halts the run.
    async fn execute(
        &self,
        token: CancellationToken,
        state: WorkflowState,
    ) -> Result<WorkflowState, BoxError>;
}

type NodeFn = dyn Fn(CancellationToken, WorkflowState) -> BoxFuture<'static, Result<WorkflowState, BoxError>>
    + Send
    + Sync;

/// [`Node`] built from an async closure, for inline node definitions.
///
/// # Examples
///
/// ```
/// use loomflow::node::FnNode;
/// use serde_json::json;
///
/// let double = FnNode::new(|_token, state| async move {
///     let n = state.get("n").and_then(|v| v.as_i64()).unwrap_or(0);
///     Ok(state.set("n", json!(n * 2)))
/// });
/// ```
pub struct FnNode {
    f: Arc<NodeFn>,
}

impl FnNode {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(CancellationToken, WorkflowState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<WorkflowState, BoxError>> + Send + 'static,
    {
        Self {
            f: Arc::new(move |token, state| Box::pin(f(token, state))),
        }
    }
}

#[async_trait]
impl Node for FnNode {
    async fn execute(
        &self,
        token: CancellationToken,
        state: WorkflowState,
    ) -> Result<WorkflowState, BoxError> {
        (self.f)(token, state).await
    }
}
