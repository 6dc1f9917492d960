//! Adapters wrapping each workflow pattern as a graph [`Node`].
//!
//! When the wrapped pattern fails, the adapter surfaces the pattern error as
//! the node error; the graph interpreter preserves the pre-execution state
//! alongside it in the resulting
//! [`ExecutionError`](crate::graph::ExecutionError).

use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::config::{ChainConfig, ConditionalConfig, ParallelConfig};
use crate::node::{BoxError, Node};
use crate::observer::ObserverError;
use crate::state::WorkflowState;

use super::chain::{Chain, ProgressFn};
use super::conditional::{Conditional, RoutePredicate};
use super::parallel::{Parallel, ParallelProgressFn};

type ChainStepFn<I> = dyn Fn(CancellationToken, I, WorkflowState) -> BoxFuture<'static, Result<WorkflowState, BoxError>>
    + Send
    + Sync;

/// Graph node running a sequential chain with the arriving state as the
/// initial accumulator; the final accumulator becomes the node's output
/// state.
///
/// # Examples
///
/// ```
/// use loomflow::config::ChainConfig;
/// use loomflow::patterns::ChainNode;
/// use serde_json::json;
///
/// let node = ChainNode::new(
///     &ChainConfig::default(),
///     vec!["fetch", "parse", "rank"],
///     |_token, step, state| async move {
///         Ok(state.set(step, json!("done")))
///     },
/// )
/// .unwrap();
/// ```
pub struct ChainNode<I> {
    chain: Chain,
    items: Vec<I>,
    processor: Arc<ChainStepFn<I>>,
    progress: Option<Arc<ProgressFn<WorkflowState>>>,
}

impl<I> ChainNode<I>
where
    I: Clone + Debug + Send + Sync + 'static,
{
    pub fn new<P, Fut>(
        config: &ChainConfig,
        items: Vec<I>,
        processor: P,
    ) -> Result<Self, ObserverError>
    where
        P: Fn(CancellationToken, I, WorkflowState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<WorkflowState, BoxError>> + Send + 'static,
    {
        Ok(Self {
            chain: Chain::new(config)?,
            items,
            processor: Arc::new(move |token, item, state| Box::pin(processor(token, item, state))),
            progress: None,
        })
    }

    #[must_use]
    pub fn with_progress(
        mut self,
        progress: impl Fn(usize, usize, &WorkflowState) + Send + Sync + 'static,
    ) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }
}

#[async_trait]
impl<I> Node for ChainNode<I>
where
    I: Clone + Debug + Send + Sync + 'static,
{
    async fn execute(
        &self,
        token: CancellationToken,
        state: WorkflowState,
    ) -> Result<WorkflowState, BoxError> {
        let processor = Arc::clone(&self.processor);
        let outcome = self
            .chain
            .run(
                &token,
                &self.items,
                state,
                move |token, item, acc| processor(token, item, acc),
                self.progress.as_deref(),
            )
            .await?;
        Ok(outcome.result)
    }
}

type TaskFn<I, R> =
    dyn Fn(CancellationToken, I) -> BoxFuture<'static, Result<R, BoxError>> + Send + Sync;
type AggregatorFn<R> =
    dyn Fn(Vec<R>, WorkflowState) -> Result<WorkflowState, BoxError> + Send + Sync;

/// Graph node running a parallel map over fixed items, then folding the
/// ordered results back into the flowing state with an aggregator.
///
/// # Examples
///
/// ```
/// use loomflow::config::ParallelConfig;
/// use loomflow::patterns::ParallelNode;
/// use serde_json::json;
///
/// let node = ParallelNode::new(
///     &ParallelConfig::default(),
///     vec![1_i64, 2, 3],
///     |_token, n| async move { Ok(n * n) },
///     |squares: Vec<i64>, state| Ok(state.set("squares", json!(squares))),
/// )
/// .unwrap();
/// ```
pub struct ParallelNode<I, R> {
    parallel: Parallel,
    items: Vec<I>,
    task: Arc<TaskFn<I, R>>,
    aggregator: Arc<AggregatorFn<R>>,
    progress: Option<Arc<ParallelProgressFn>>,
}

impl<I, R> ParallelNode<I, R>
where
    I: Clone + Debug + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    pub fn new<T, Fut, G>(
        config: &ParallelConfig,
        items: Vec<I>,
        task: T,
        aggregator: G,
    ) -> Result<Self, ObserverError>
    where
        T: Fn(CancellationToken, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
        G: Fn(Vec<R>, WorkflowState) -> Result<WorkflowState, BoxError> + Send + Sync + 'static,
    {
        Ok(Self {
            parallel: Parallel::new(config)?,
            items,
            task: Arc::new(move |token, item| Box::pin(task(token, item))),
            aggregator: Arc::new(aggregator),
            progress: None,
        })
    }

    #[must_use]
    pub fn with_progress(mut self, progress: impl Fn(usize, usize) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }
}

#[async_trait]
impl<I, R> Node for ParallelNode<I, R>
where
    I: Clone + Debug + Send + Sync + 'static,
    R: Debug + Send + Sync + 'static,
{
    async fn execute(
        &self,
        token: CancellationToken,
        state: WorkflowState,
    ) -> Result<WorkflowState, BoxError> {
        let task = Arc::clone(&self.task);
        let outcome = self
            .parallel
            .run(
                &token,
                self.items.clone(),
                move |token, item| task(token, item),
                self.progress.clone(),
            )
            .await?;
        (self.aggregator)(outcome.results, state)
    }
}

/// Graph node running a conditional router.
pub struct ConditionalNode {
    conditional: Conditional,
}

impl ConditionalNode {
    pub fn new(
        config: &ConditionalConfig,
        predicate: RoutePredicate,
    ) -> Result<Self, ObserverError> {
        Ok(Self {
            conditional: Conditional::new(config, predicate)?,
        })
    }

    #[must_use]
    pub fn with_route(mut self, name: impl Into<String>, handler: impl Node + 'static) -> Self {
        self.conditional = self.conditional.with_route(name, handler);
        self
    }

    #[must_use]
    pub fn with_default(mut self, handler: impl Node + 'static) -> Self {
        self.conditional = self.conditional.with_default(handler);
        self
    }
}

#[async_trait]
impl Node for ConditionalNode {
    async fn execute(
        &self,
        token: CancellationToken,
        state: WorkflowState,
    ) -> Result<WorkflowState, BoxError> {
        Ok(self.conditional.run(&token, state).await?)
    }
}
