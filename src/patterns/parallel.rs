//! Parallel worker pool: a bounded, order-preserving map over a list of
//! items.
//!
//! Execution order is unspecified, but the returned success and failure
//! lists are always ordered by original input index. Two failure modes are
//! supported: fail-fast (the default) cancels outstanding work on the first
//! task error; collect-all-errors attempts every item and only reports an
//! error when every task failed.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::ParallelConfig;
use crate::node::BoxError;
use crate::observer::{Event, EventKind, ObserverError, ObserverSink, resolve_observer};

const EVENT_SOURCE: &str = "parallel";

/// Callback invoked after each successful task with
/// `(completed_successes, total)`, in completion order.
pub type ParallelProgressFn = dyn Fn(usize, usize) + Send + Sync;

/// One failed task, tagged with its original input index.
#[derive(Debug)]
pub struct TaskFailure<I> {
    pub index: usize,
    pub item: I,
    pub source: BoxError,
}

/// Result of a parallel run.
///
/// `results` is dense and ordered by input index; `failures` likewise. Every
/// attempted index appears in exactly one of the two lists. Indices never
/// attempted (the run was cancelled before a worker picked them up) appear
/// in neither.
#[derive(Debug)]
pub struct ParallelOutcome<I, R> {
    pub results: Vec<R>,
    pub failures: Vec<TaskFailure<I>>,
}

impl<I, R> Default for ParallelOutcome<I, R> {
    fn default() -> Self {
        Self {
            results: Vec::new(),
            failures: Vec::new(),
        }
    }
}

/// Aggregate error for a parallel run.
///
/// Carries the partial outcome at the point the run tripped, so fail-fast
/// callers still see every success and failure collected before
/// cancellation took hold.
///
/// The rendered message is a single detail line for one failure, or a
/// categorised summary grouping identical error messages with counts,
/// sorted descending by count.
#[derive(Debug)]
pub struct ParallelError<I, R> {
    pub partial: ParallelOutcome<I, R>,
}

impl<I, R> ParallelError<I, R> {
    pub fn failures(&self) -> &[TaskFailure<I>] {
        &self.partial.failures
    }

    /// The underlying task errors, for multi-error matching.
    pub fn causes(&self) -> impl Iterator<Item = &BoxError> {
        self.partial.failures.iter().map(|f| &f.source)
    }
}

impl<I, R> fmt::Display for ParallelError<I, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failures = &self.partial.failures;
        match failures.len() {
            0 => write!(f, "parallel execution failed"),
            1 => write!(
                f,
                "parallel task {} failed: {}",
                failures[0].index, failures[0].source
            ),
            n => write!(f, "{n} parallel tasks failed: {}", categorised_summary(failures)),
        }
    }
}

impl<I: fmt::Debug, R: fmt::Debug> std::error::Error for ParallelError<I, R> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.partial.failures.first().map(|f| {
            let source: &(dyn std::error::Error + 'static) = f.source.as_ref();
            source
        })
    }
}

/// Bounded worker-pool executor.
///
/// # Worker-count policy
///
/// An explicit positive `max_workers` wins; otherwise the count is
/// `min(available_parallelism × 2, worker_cap, item_count)`, and never less
/// than one.
///
/// # Examples
///
/// ```
/// use loomflow::config::ParallelConfig;
/// use loomflow::patterns::Parallel;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pool = Parallel::new(&ParallelConfig::default()).unwrap();
/// let outcome = pool
///     .run(
///         &CancellationToken::new(),
///         (0..10).collect::<Vec<i64>>(),
///         |_token, n| async move { Ok(n * 2) },
///         None,
///     )
///     .await
///     .unwrap();
///
/// assert_eq!(outcome.results, (0..10).map(|n| n * 2).collect::<Vec<i64>>());
/// assert!(outcome.failures.is_empty());
/// # }
/// ```
pub struct Parallel {
    observer: Arc<dyn ObserverSink>,
    max_workers: usize,
    worker_cap: usize,
    fail_fast: bool,
}

impl std::fmt::Debug for Parallel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parallel")
            .field("max_workers", &self.max_workers)
            .field("worker_cap", &self.worker_cap)
            .field("fail_fast", &self.fail_fast)
            .finish()
    }
}

impl Parallel {
    /// Build a pool executor, resolving the configured observer.
    pub fn new(config: &ParallelConfig) -> Result<Self, ObserverError> {
        Ok(Self {
            observer: resolve_observer(&config.observer)?,
            max_workers: config.max_workers,
            worker_cap: config.worker_cap,
            fail_fast: config.fail_fast(),
        })
    }

    fn worker_count(&self, items: usize) -> usize {
        if self.max_workers > 0 {
            return self.max_workers;
        }
        let cpus = std::thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1);
        (cpus * 2)
            .min(self.worker_cap.max(1))
            .min(items)
            .max(1)
    }

    /// Apply `task` to every item on a pool of concurrent workers.
    ///
    /// The task receives a child token of `token`; in fail-fast mode the
    /// first task error cancels it, signalling every in-flight task.
    /// Cancelling `token` itself stops both modes promptly, returning the
    /// results accumulated so far.
    pub async fn run<I, R, T, Fut>(
        &self,
        token: &CancellationToken,
        items: Vec<I>,
        task: T,
        progress: Option<Arc<ParallelProgressFn>>,
    ) -> Result<ParallelOutcome<I, R>, ParallelError<I, R>>
    where
        I: Clone + Send + 'static,
        R: Send + 'static,
        T: Fn(CancellationToken, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, BoxError>> + Send + 'static,
    {
        let total = items.len();
        let workers = self.worker_count(total);
        self.emit(EventKind::ParallelStart, |e| {
            e.with_attr("items", Value::from(total))
                .with_attr("workers", Value::from(workers))
        });

        if total == 0 {
            self.emit_complete(0, 0);
            return Ok(ParallelOutcome::default());
        }

        let child = token.child_token();
        let fail_fast = self.fail_fast;

        let (work_tx, work_rx) = flume::bounded(total);
        for pair in items.iter().cloned().enumerate() {
            let _ = work_tx.send(pair);
        }
        drop(work_tx);

        let (result_tx, result_rx) = flume::bounded::<(usize, Result<R, BoxError>)>(total);

        let task = Arc::new(task);
        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();
            let task = Arc::clone(&task);
            let child = child.clone();
            let observer = Arc::clone(&self.observer);
            handles.push(tokio::spawn(async move {
                loop {
                    if child.is_cancelled() {
                        break;
                    }
                    let Ok((index, item)) = work_rx.try_recv() else {
                        break;
                    };
                    observer.accept(
                        &Event::new(EventKind::WorkerStart, EVENT_SOURCE)
                            .with_attr("worker", Value::from(worker_id))
                            .with_attr("index", Value::from(index))
                            .with_attr("total", Value::from(total)),
                    );
                    let result = task(child.clone(), item).await;
                    let failed = result.is_err();
                    if failed && fail_fast {
                        child.cancel();
                    }
                    observer.accept(
                        &Event::new(EventKind::WorkerComplete, EVENT_SOURCE)
                            .with_attr("worker", Value::from(worker_id))
                            .with_attr("index", Value::from(index))
                            .with_attr("total", Value::from(total))
                            .with_attr("error", Value::Bool(failed)),
                    );
                    let _ = result_tx.send((index, result));
                }
            }));
        }
        drop(result_tx);
        drop(work_rx);

        // The collector drains concurrently with the workers so the result
        // channel never back-pressures a worker, even when all of them
        // finish at once.
        let collector = tokio::spawn(async move {
            let mut slots: Vec<Option<Result<R, BoxError>>> =
                std::iter::repeat_with(|| None).take(total).collect();
            let mut completed = 0usize;
            while let Ok((index, result)) = result_rx.recv_async().await {
                if result.is_ok() {
                    completed += 1;
                    if let Some(progress) = &progress {
                        progress(completed, total);
                    }
                }
                slots[index] = Some(result);
            }
            slots
        });

        let _ = futures_util::future::join_all(handles).await;
        let slots = collector.await.unwrap_or_default();

        let mut results = Vec::new();
        let mut failures = Vec::new();
        for (index, slot) in slots.into_iter().enumerate() {
            match slot {
                Some(Ok(result)) => results.push(result),
                Some(Err(source)) => failures.push(TaskFailure {
                    index,
                    item: items[index].clone(),
                    source,
                }),
                // Never attempted: the run was cancelled first.
                None => {}
            }
        }

        self.emit_complete(results.len(), failures.len());
        let outcome = ParallelOutcome { results, failures };

        let errored = if fail_fast {
            !outcome.failures.is_empty()
        } else {
            outcome.failures.len() == total
        };
        if errored {
            Err(ParallelError { partial: outcome })
        } else {
            Ok(outcome)
        }
    }

    fn emit_complete(&self, successes: usize, failures: usize) {
        self.emit(EventKind::ParallelComplete, |e| {
            e.with_attr("successes", Value::from(successes))
                .with_attr("failures", Value::from(failures))
        });
    }

    fn emit(&self, kind: EventKind, build: impl FnOnce(Event) -> Event) {
        self.observer.accept(&build(Event::new(kind, EVENT_SOURCE)));
    }
}

/// Group identical failure messages and render `msg (xN)` terms, sorted by
/// descending count, then message for determinism.
fn categorised_summary<I>(failures: &[TaskFailure<I>]) -> String {
    let mut counts: FxHashMap<String, usize> = FxHashMap::default();
    for failure in failures {
        *counts.entry(failure.source.to_string()).or_insert(0) += 1;
    }
    let mut grouped: Vec<(String, usize)> = counts.into_iter().collect();
    grouped.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    let terms: Vec<String> = grouped
        .into_iter()
        .map(|(message, count)| format!("{message} (x{count})"))
        .collect();
    terms.join("; ")
}
