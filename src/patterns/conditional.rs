//! Conditional router: predicate-selected dispatch over named routes.

use std::sync::Arc;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json::Value;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::ConditionalConfig;
use crate::node::{BoxError, Node};
use crate::observer::{Event, EventKind, ObserverError, ObserverSink, resolve_observer};
use crate::state::WorkflowState;

const EVENT_SOURCE: &str = "conditional";

/// Route name recorded when the default handler is selected.
pub const DEFAULT_ROUTE: &str = "default";

/// Predicate mapping a state to the name of the route to take.
pub type RoutePredicate =
    Arc<dyn Fn(&WorkflowState) -> Result<String, BoxError> + Send + Sync>;

/// Errors from conditional routing.
#[derive(Debug, Error, Diagnostic)]
pub enum ConditionalError {
    #[error("routing cancelled")]
    #[diagnostic(code(loomflow::conditional::cancelled))]
    Cancelled,

    #[error("route predicate failed: {source}")]
    #[diagnostic(code(loomflow::conditional::predicate))]
    Predicate {
        #[source]
        source: BoxError,
    },

    /// The predicate named a route with no handler and no default is
    /// configured.
    #[error("no handler for route {route:?}")]
    #[diagnostic(
        code(loomflow::conditional::unknown_route),
        help("Add the route with `with_route` or configure a default handler.")
    )]
    UnknownRoute { route: String },

    #[error("route {route:?} handler failed: {source}")]
    #[diagnostic(code(loomflow::conditional::handler))]
    Handler {
        route: String,
        #[source]
        source: BoxError,
    },
}

/// Predicate-driven router over a table of named handlers.
///
/// Handlers implement the graph [`Node`] trait, so a route target can be
/// anything from an inline closure ([`FnNode`](crate::node::FnNode)) to a
/// full pattern adapter.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use loomflow::config::ConditionalConfig;
/// use loomflow::node::FnNode;
/// use loomflow::patterns::Conditional;
/// use loomflow::state::WorkflowState;
/// use serde_json::json;
/// use tokio_util::sync::CancellationToken;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let router = Conditional::new(
///     &ConditionalConfig::default(),
///     Arc::new(|state: &WorkflowState| {
///         Ok(state.get("kind").and_then(|v| v.as_str()).unwrap_or("other").to_string())
///     }),
/// )?
/// .with_route("invoice", FnNode::new(|_t, s| async move {
///     Ok(s.set("handled_by", json!("invoice")))
/// }))
/// .with_default(FnNode::new(|_t, s| async move {
///     Ok(s.set("handled_by", json!("fallback")))
/// }));
///
/// let state = WorkflowState::new(None).set("kind", json!("invoice"));
/// let routed = router.run(&CancellationToken::new(), state).await?;
/// assert_eq!(routed.get("handled_by"), Some(&json!("invoice")));
/// # Ok(())
/// # }
/// ```
pub struct Conditional {
    observer: Arc<dyn ObserverSink>,
    predicate: RoutePredicate,
    routes: FxHashMap<String, Arc<dyn Node>>,
    default: Option<Arc<dyn Node>>,
}

impl Conditional {
    /// Build a router, resolving the configured observer.
    pub fn new(config: &ConditionalConfig, predicate: RoutePredicate) -> Result<Self, ObserverError> {
        Ok(Self {
            observer: resolve_observer(&config.observer)?,
            predicate,
            routes: FxHashMap::default(),
            default: None,
        })
    }

    /// Register a handler for a route name, replacing any prior handler.
    #[must_use]
    pub fn with_route(mut self, name: impl Into<String>, handler: impl Node + 'static) -> Self {
        self.routes.insert(name.into(), Arc::new(handler));
        self
    }

    /// Register the fallback handler used when the predicate names an
    /// unregistered route.
    #[must_use]
    pub fn with_default(mut self, handler: impl Node + 'static) -> Self {
        self.default = Some(Arc::new(handler));
        self
    }

    pub fn route_count(&self) -> usize {
        self.routes.len()
    }

    /// Evaluate the predicate and dispatch to the selected handler.
    pub async fn run(
        &self,
        token: &CancellationToken,
        state: WorkflowState,
    ) -> Result<WorkflowState, ConditionalError> {
        if token.is_cancelled() {
            return Err(ConditionalError::Cancelled);
        }

        self.emit(EventKind::RouteEvaluate, |e| {
            e.with_attr("routes", Value::from(self.routes.len()))
        });

        let route = (self.predicate)(&state)
            .map_err(|source| ConditionalError::Predicate { source })?;

        let (route_name, handler) = match self.routes.get(&route) {
            Some(handler) => (route, Arc::clone(handler)),
            None => match &self.default {
                Some(handler) => (DEFAULT_ROUTE.to_string(), Arc::clone(handler)),
                None => return Err(ConditionalError::UnknownRoute { route }),
            },
        };

        self.emit(EventKind::RouteSelect, |e| {
            e.with_attr("route", Value::String(route_name.clone()))
                .with_attr("has_default", Value::Bool(self.default.is_some()))
        });

        if token.is_cancelled() {
            return Err(ConditionalError::Cancelled);
        }

        let next = handler
            .execute(token.clone(), state)
            .await
            .map_err(|source| ConditionalError::Handler {
                route: route_name.clone(),
                source,
            })?;

        self.emit(EventKind::RouteExecute, |e| {
            e.with_attr("route", Value::String(route_name.clone()))
                .with_attr("error", Value::Bool(false))
        });

        Ok(next)
    }

    fn emit(&self, kind: EventKind, build: impl FnOnce(Event) -> Event) {
        self.observer.accept(&build(Event::new(kind, EVENT_SOURCE)));
    }
}
