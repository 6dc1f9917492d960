mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use common::{capture_observer, marker_node};
use loomflow::config::{CheckpointConfig, GraphConfig};
use loomflow::graph::{
    CheckpointError, CheckpointStore, Graph, GraphError, MemoryCheckpointStore,
    register_checkpoint_store,
};
use loomflow::observer::EventKind;
use loomflow::state::WorkflowState;
use serde_json::json;
use tokio_util::sync::CancellationToken;

fn fresh_store(label: &str) -> (String, Arc<MemoryCheckpointStore>) {
    static SEQ: AtomicUsize = AtomicUsize::new(0);
    let name = format!("store-{label}-{}", SEQ.fetch_add(1, Ordering::Relaxed));
    let store = Arc::new(MemoryCheckpointStore::new());
    register_checkpoint_store(name.clone(), store.clone());
    (name, store)
}

fn checkpointed_config(name: &str, store: &str, interval: u64, preserve: bool) -> GraphConfig {
    let mut cfg = GraphConfig::named(name);
    cfg.checkpoint = CheckpointConfig {
        store: store.to_string(),
        interval,
        preserve,
    };
    cfg
}

fn linear_graph(cfg: &GraphConfig) -> Graph {
    let mut g = Graph::new(cfg).unwrap();
    g.add_node("n1", marker_node("n1"))
        .unwrap()
        .add_node("n2", marker_node("n2"))
        .unwrap()
        .add_node("n3", marker_node("n3"))
        .unwrap()
        .add_edge("n1", "n2")
        .unwrap()
        .add_edge("n2", "n3")
        .unwrap()
        .set_entry("n1")
        .unwrap()
        .add_exit("n3")
        .unwrap();
    g
}

#[tokio::test]
async fn preserved_checkpoint_survives_completion() {
    let (store_name, store) = fresh_store("preserve");
    let g = linear_graph(&checkpointed_config("orders", &store_name, 1, true));

    let result = g
        .execute(&CancellationToken::new(), WorkflowState::new(None))
        .await
        .unwrap();

    let persisted = store.load(result.run_id()).await.unwrap();
    assert_eq!(persisted.checkpoint_node, "n3");
    assert_eq!(persisted.run_id, result.run_id());
    assert_eq!(persisted.data.get("n2"), Some(&json!("executed")));
}

#[tokio::test]
async fn checkpoint_is_deleted_on_success_by_default() {
    let (store_name, store) = fresh_store("cleanup");
    let g = linear_graph(&checkpointed_config("orders", &store_name, 1, false));

    let result = g
        .execute(&CancellationToken::new(), WorkflowState::new(None))
        .await
        .unwrap();

    assert!(matches!(
        store.load(result.run_id()).await,
        Err(CheckpointError::NotFound { .. })
    ));
}

#[tokio::test]
async fn interval_gates_checkpoint_cadence() {
    let (store_name, _) = fresh_store("cadence");
    let (obs_name, sink) = capture_observer("checkpoint-cadence");
    let mut cfg = checkpointed_config("orders", &store_name, 2, true);
    cfg.observer = obs_name;
    let g = linear_graph(&cfg);

    g.execute(&CancellationToken::new(), WorkflowState::new(None))
        .await
        .unwrap();

    // Three iterations with interval 2: only iteration 2 checkpoints.
    let saves = sink.of_kind(EventKind::CheckpointSave);
    assert_eq!(saves.len(), 1);
    assert_eq!(saves[0].attr("node"), Some(&json!("n2")));
}

#[tokio::test]
async fn resume_picks_up_after_the_checkpointed_node() {
    let (store_name, store) = fresh_store("resume");
    let (obs_name, sink) = capture_observer("resume-events");

    // Simulate a run interrupted after n1: checkpoint a state by hand.
    let interrupted = WorkflowState::new(None)
        .set("n1", json!("executed"))
        .with_checkpoint_node("n1");
    interrupted.checkpoint(store.as_ref()).await.unwrap();
    let run_id = interrupted.run_id().to_string();

    // A fresh graph instance sharing the checkpoint store resumes at n2.
    let mut cfg = checkpointed_config("orders", &store_name, 1, true);
    cfg.observer = obs_name;
    let g = linear_graph(&cfg);
    let result = g
        .resume(&CancellationToken::new(), &run_id)
        .await
        .unwrap();

    assert_eq!(result.run_id(), run_id);
    assert_eq!(result.get("n1"), Some(&json!("executed")));
    assert_eq!(result.get("n2"), Some(&json!("executed")));
    assert_eq!(result.get("n3"), Some(&json!("executed")));
    assert_eq!(result.checkpoint_node(), "n3");

    let load = &sink.of_kind(EventKind::CheckpointLoad)[0];
    assert_eq!(load.attr("node"), Some(&json!("n1")));
    let resume = &sink.of_kind(EventKind::CheckpointResume)[0];
    assert_eq!(resume.attr("checkpoint_node"), Some(&json!("n1")));
    assert_eq!(resume.attr("resume_node"), Some(&json!("n2")));
}

#[tokio::test]
async fn resume_at_an_exit_reports_completion() {
    let (store_name, store) = fresh_store("complete");
    let finished = WorkflowState::new(None).with_checkpoint_node("n3");
    finished.checkpoint(store.as_ref()).await.unwrap();

    let g = linear_graph(&checkpointed_config("orders", &store_name, 1, true));
    let err = g
        .resume(&CancellationToken::new(), finished.run_id())
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::AlreadyComplete { .. }));
}

#[tokio::test]
async fn resume_without_checkpointing_is_rejected() {
    let g = linear_graph(&GraphConfig::named("plain"));
    let err = g
        .resume(&CancellationToken::new(), "some-run")
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::CheckpointingDisabled));
}

#[tokio::test]
async fn resume_of_unknown_run_propagates_not_found() {
    let (store_name, _) = fresh_store("missing");
    let g = linear_graph(&checkpointed_config("orders", &store_name, 1, true));
    let err = g
        .resume(&CancellationToken::new(), "no-such-run")
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        GraphError::Checkpoint(CheckpointError::NotFound { run_id }) if run_id == "no-such-run"
    ));
}

#[tokio::test]
async fn checkpoints_never_contain_secrets() {
    let (store_name, store) = fresh_store("secrets");
    let g = linear_graph(&checkpointed_config("orders", &store_name, 1, true));

    let initial = WorkflowState::new(None).set_secret("api_key", json!("s3cret-value"));
    let result = g
        .execute(&CancellationToken::new(), initial)
        .await
        .unwrap();

    let persisted = store.load(result.run_id()).await.unwrap();
    let rendered = serde_json::to_string(&persisted).unwrap();
    assert!(!rendered.contains("api_key"));
    assert!(!rendered.contains("s3cret-value"));
}

#[test]
fn unknown_checkpoint_store_fails_construction() {
    let cfg = checkpointed_config("orders", "no-such-store", 1, false);
    let err = Graph::new(&cfg).unwrap_err();
    assert!(matches!(
        err,
        GraphError::Checkpoint(CheckpointError::UnknownStore { name }) if name == "no-such-store"
    ));
}

#[test]
fn zero_interval_skips_store_resolution() {
    // With checkpointing disabled the store name is never resolved, so even
    // an unregistered name constructs fine.
    let cfg = checkpointed_config("orders", "no-such-store", 0, false);
    assert!(Graph::new(&cfg).is_ok());
}

#[tokio::test]
async fn save_is_an_upsert_and_delete_idempotent() {
    let store = MemoryCheckpointStore::new();
    let state = WorkflowState::new(None).set("v", json!(1));
    state.checkpoint(&store).await.unwrap();
    let newer = state.set("v", json!(2)).with_checkpoint_node("later");
    newer.checkpoint(&store).await.unwrap();

    let loaded = store.load(state.run_id()).await.unwrap();
    assert_eq!(loaded.data.get("v"), Some(&json!(2)));
    assert_eq!(loaded.checkpoint_node, "later");
    assert_eq!(store.list().await.unwrap().len(), 1);

    store.delete(state.run_id()).await.unwrap();
    store.delete(state.run_id()).await.unwrap();
    assert!(store.list().await.unwrap().is_empty());
}
