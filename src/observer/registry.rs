//! Process-wide registry mapping sink names to implementations.
//!
//! The registry is initialised lazily with the same two bindings on every
//! process start: [`NOOP_OBSERVER`] and [`TRACING_OBSERVER`]. Components
//! resolve their configured observer by name at construction and fail with
//! [`ObserverError::Unknown`] when the name has no binding.

use std::sync::{Arc, LazyLock};

use miette::Diagnostic;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use thiserror::Error;

use super::sink::{NoopSink, ObserverSink, TracingSink};

/// Name of the preregistered discard-everything sink.
pub const NOOP_OBSERVER: &str = "noop";

/// Name of the preregistered structured-log sink; the default observer for
/// every config in this crate.
pub const TRACING_OBSERVER: &str = "tracing";

static OBSERVERS: LazyLock<RwLock<FxHashMap<String, Arc<dyn ObserverSink>>>> =
    LazyLock::new(|| {
        let mut map: FxHashMap<String, Arc<dyn ObserverSink>> = FxHashMap::default();
        map.insert(NOOP_OBSERVER.to_string(), Arc::new(NoopSink));
        map.insert(TRACING_OBSERVER.to_string(), Arc::new(TracingSink));
        RwLock::new(map)
    });

/// Errors from observer resolution.
#[derive(Debug, Error, Diagnostic)]
pub enum ObserverError {
    /// No sink is registered under the requested name.
    #[error("unknown observer: {name}")]
    #[diagnostic(
        code(loomflow::observer::unknown),
        help("Register the sink with `register_observer(\"{name}\", ...)` before use.")
    )]
    Unknown { name: String },
}

/// Bind a sink under a name, replacing any prior binding for that name.
pub fn register_observer(name: impl Into<String>, sink: Arc<dyn ObserverSink>) {
    OBSERVERS.write().insert(name.into(), sink);
}

/// Look up a sink by name.
///
/// # Errors
///
/// Returns [`ObserverError::Unknown`] when no sink is registered under
/// `name`. Components that take a sink name in their config propagate this
/// from their constructor.
pub fn resolve_observer(name: &str) -> Result<Arc<dyn ObserverSink>, ObserverError> {
    OBSERVERS
        .read()
        .get(name)
        .cloned()
        .ok_or_else(|| ObserverError::Unknown {
            name: name.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::MemorySink;

    #[test]
    fn defaults_are_preregistered() {
        assert!(resolve_observer(NOOP_OBSERVER).is_ok());
        assert!(resolve_observer(TRACING_OBSERVER).is_ok());
    }

    #[test]
    fn unknown_name_errors() {
        let err = resolve_observer("no-such-sink").unwrap_err();
        assert!(err.to_string().contains("no-such-sink"));
    }

    #[test]
    fn registration_replaces_prior_binding() {
        register_observer("replace-me", Arc::new(MemorySink::new()));
        let first = resolve_observer("replace-me").unwrap();
        register_observer("replace-me", Arc::new(MemorySink::new()));
        let second = resolve_observer("replace-me").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
    }
}
