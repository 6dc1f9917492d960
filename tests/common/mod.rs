use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use loomflow::node::{BoxError, FnNode};
use loomflow::observer::{MemorySink, register_observer};
use serde_json::json;

/// Register a fresh capturing sink under a unique name and return both.
/// Registry bindings are process-global, so each test gets its own name.
#[allow(dead_code)]
pub fn capture_observer(label: &str) -> (String, MemorySink) {
    static SEQ: AtomicUsize = AtomicUsize::new(0);
    let name = format!("test-{label}-{}", SEQ.fetch_add(1, Ordering::Relaxed));
    let sink = MemorySink::new();
    register_observer(name.clone(), Arc::new(sink.clone()));
    (name, sink)
}

/// Node that sets `key` to the string `"executed"`.
#[allow(dead_code)]
pub fn marker_node(key: &'static str) -> FnNode {
    FnNode::new(move |_token, state| async move { Ok(state.set(key, json!("executed"))) })
}

/// Node that increments the integer at `key` (missing counts as 0).
#[allow(dead_code)]
pub fn counter_node(key: &'static str) -> FnNode {
    FnNode::new(move |_token, state| async move {
        let n = state.get(key).and_then(|v| v.as_i64()).unwrap_or(0);
        Ok(state.set(key, json!(n + 1)))
    })
}

/// Node that always fails with `message`.
#[allow(dead_code)]
pub fn failing_node(message: &'static str) -> FnNode {
    FnNode::new(move |_token, _state| async move {
        Err(Box::new(std::io::Error::other(message)) as BoxError)
    })
}
