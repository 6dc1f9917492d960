//! Sequential chain: a fold over a list of items with a carried accumulator.

use std::future::Future;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::ChainConfig;
use crate::node::{BoxError, Cancelled};
use crate::observer::{Event, EventKind, ObserverError, ObserverSink, resolve_observer};

const EVENT_SOURCE: &str = "chain";

/// Callback invoked after each successful step with
/// `(completed, total, accumulator)`.
pub type ProgressFn<A> = dyn Fn(usize, usize, &A) + Send + Sync;

/// Result of a completed chain run.
#[derive(Clone, Debug)]
pub struct ChainOutcome<A> {
    /// The final accumulator.
    pub result: A,
    /// Number of steps executed.
    pub steps: usize,
    /// Accumulator snapshots `[initial, a₁, …, aₙ]` when capture is
    /// enabled; empty otherwise.
    pub intermediates: Vec<A>,
}

/// Fail-fast chain error carrying enough context to resume or diagnose:
/// the failing step index, the item being processed, the accumulator as it
/// stood before the step, and the underlying cause.
///
/// Cancellation surfaces through the same shape with a
/// [`Cancelled`] cause.
#[derive(Debug, Error)]
#[error("chain step {step} failed: {source}")]
pub struct ChainError<I, A> {
    pub step: usize,
    pub item: I,
    pub state: A,
    #[source]
    pub source: BoxError,
}

/// Sequential fold executor.
///
/// # Examples
///
/// ```
/// use loomflow::config::ChainConfig;
/// use loomflow::patterns::Chain;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let chain = Chain::new(&ChainConfig::default()).unwrap();
/// let outcome = chain
///     .run(
///         &CancellationToken::new(),
///         &["a", "b", "c"],
///         "start".to_string(),
///         |_token, item, acc| async move { Ok(format!("{acc}->{item}")) },
///         None,
///     )
///     .await
///     .unwrap();
///
/// assert_eq!(outcome.result, "start->a->b->c");
/// assert_eq!(outcome.steps, 3);
/// # }
/// ```
#[derive(Debug)]
pub struct Chain {
    observer: Arc<dyn ObserverSink>,
    capture: bool,
}

impl Chain {
    /// Build a chain executor, resolving the configured observer.
    pub fn new(config: &ChainConfig) -> Result<Self, ObserverError> {
        Ok(Self {
            observer: resolve_observer(&config.observer)?,
            capture: config.capture_intermediates,
        })
    }

    /// Fold `processor` over `items` starting from `initial`.
    ///
    /// Fails fast: the first processor error (or cancellation observed at a
    /// step boundary) aborts the fold and returns a [`ChainError`] carrying
    /// the pre-step accumulator.
    pub async fn run<I, A, P, Fut>(
        &self,
        token: &CancellationToken,
        items: &[I],
        initial: A,
        processor: P,
        progress: Option<&ProgressFn<A>>,
    ) -> Result<ChainOutcome<A>, ChainError<I, A>>
    where
        I: Clone,
        A: Clone,
        P: Fn(CancellationToken, I, A) -> Fut,
        Fut: Future<Output = Result<A, BoxError>>,
    {
        let total = items.len();
        self.emit(EventKind::ChainStart, |e| {
            e.with_attr("items", Value::from(total))
                .with_attr("has_progress", Value::Bool(progress.is_some()))
                .with_attr("capture", Value::Bool(self.capture))
        });

        if items.is_empty() {
            self.emit_complete(0, false);
            return Ok(ChainOutcome {
                result: initial,
                steps: 0,
                intermediates: Vec::new(),
            });
        }

        let mut intermediates = Vec::new();
        if self.capture {
            intermediates.push(initial.clone());
        }

        let mut acc = initial;
        for (step, item) in items.iter().enumerate() {
            if token.is_cancelled() {
                self.emit_complete(step, true);
                return Err(ChainError {
                    step,
                    item: item.clone(),
                    state: acc,
                    source: Box::new(Cancelled),
                });
            }

            self.emit(EventKind::ChainStepStart, |e| {
                e.with_attr("step", Value::from(step))
                    .with_attr("total", Value::from(total))
            });

            match processor(token.clone(), item.clone(), acc.clone()).await {
                Ok(next) => {
                    acc = next;
                    if self.capture {
                        intermediates.push(acc.clone());
                    }
                    self.emit_step_complete(step, total, false);
                    if let Some(progress) = progress {
                        progress(step + 1, total, &acc);
                    }
                }
                Err(source) => {
                    self.emit_step_complete(step, total, true);
                    self.emit_complete(step, true);
                    return Err(ChainError {
                        step,
                        item: item.clone(),
                        state: acc,
                        source,
                    });
                }
            }
        }

        self.emit_complete(total, false);
        Ok(ChainOutcome {
            result: acc,
            steps: total,
            intermediates,
        })
    }

    fn emit_step_complete(&self, step: usize, total: usize, error: bool) {
        self.emit(EventKind::ChainStepComplete, |e| {
            e.with_attr("step", Value::from(step))
                .with_attr("total", Value::from(total))
                .with_attr("error", Value::Bool(error))
        });
    }

    fn emit_complete(&self, steps: usize, error: bool) {
        self.emit(EventKind::ChainComplete, |e| {
            e.with_attr("steps", Value::from(steps))
                .with_attr("error", Value::Bool(error))
        });
    }

    fn emit(&self, kind: EventKind, build: impl FnOnce(Event) -> Event) {
        self.observer.accept(&build(Event::new(kind, EVENT_SOURCE)));
    }
}
