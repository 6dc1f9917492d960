mod common;

use common::capture_observer;
use loomflow::config::ChainConfig;
use loomflow::node::{BoxError, Cancelled};
use loomflow::observer::EventKind;
use loomflow::patterns::Chain;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

fn chain_with(observer: &str, capture: bool) -> Chain {
    Chain::new(&ChainConfig {
        capture_intermediates: capture,
        observer: observer.to_string(),
    })
    .unwrap()
}

async fn join_fold(chain: &Chain, items: &[&str]) -> loomflow::patterns::ChainOutcome<String> {
    chain
        .run(
            &CancellationToken::new(),
            items,
            "start".to_string(),
            |_token, item, acc| async move { Ok(format!("{acc}->{item}")) },
            None,
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn fold_concatenates_in_order() {
    let chain = Chain::new(&ChainConfig::default()).unwrap();
    let outcome = join_fold(&chain, &["a", "b", "c"]).await;
    assert_eq!(outcome.result, "start->a->b->c");
    assert_eq!(outcome.steps, 3);
    assert!(outcome.intermediates.is_empty());
}

#[tokio::test]
async fn capture_records_every_accumulator() {
    let (name, _) = capture_observer("chain-capture");
    let chain = chain_with(&name, true);
    let outcome = join_fold(&chain, &["a", "b", "c"]).await;
    assert_eq!(
        outcome.intermediates,
        vec![
            "start".to_string(),
            "start->a".to_string(),
            "start->a->b".to_string(),
            "start->a->b->c".to_string(),
        ]
    );
}

#[tokio::test]
async fn empty_chain_emits_only_start_and_complete() {
    let (name, sink) = capture_observer("chain-empty");
    let chain = chain_with(&name, false);
    let outcome = chain
        .run(
            &CancellationToken::new(),
            &[] as &[i32],
            "initial".to_string(),
            |_token, _item, acc| async move { Ok(acc) },
            None,
        )
        .await
        .unwrap();

    assert_eq!(outcome.result, "initial");
    assert_eq!(outcome.steps, 0);

    let kinds: Vec<EventKind> = sink.snapshot().iter().map(|e| e.kind()).collect();
    assert_eq!(kinds, vec![EventKind::ChainStart, EventKind::ChainComplete]);
}

#[tokio::test]
async fn failure_carries_step_item_and_pre_step_state() {
    let (name, sink) = capture_observer("chain-failure");
    let chain = chain_with(&name, false);
    let err = chain
        .run(
            &CancellationToken::new(),
            &["a", "b", "c"],
            "start".to_string(),
            |_token, item, acc| async move {
                if item == "b" {
                    Err(Box::new(std::io::Error::other("boom")) as BoxError)
                } else {
                    Ok(format!("{acc}->{item}"))
                }
            },
            None,
        )
        .await
        .unwrap_err();

    assert_eq!(err.step, 1);
    assert_eq!(err.item, "b");
    assert_eq!(err.state, "start->a");
    assert_eq!(err.source.to_string(), "boom");
    assert_eq!(err.to_string(), "chain step 1 failed: boom");

    // chain.complete reports the number of completed steps and the error.
    let complete = &sink.of_kind(EventKind::ChainComplete)[0];
    assert_eq!(complete.attr("steps"), Some(&serde_json::json!(1)));
    assert_eq!(complete.attr("error"), Some(&serde_json::json!(true)));
}

#[tokio::test]
async fn cancellation_stops_before_the_next_step() {
    let token = CancellationToken::new();
    let chain = Chain::new(&ChainConfig::default()).unwrap();

    let cancel_after_first = {
        let token = token.clone();
        move |_t: CancellationToken, item: i32, acc: i32| {
            let token = token.clone();
            async move {
                token.cancel();
                Ok(acc + item)
            }
        }
    };

    let err = chain
        .run(&token, &[1, 2, 3], 0, cancel_after_first, None)
        .await
        .unwrap_err();

    assert_eq!(err.step, 1);
    assert_eq!(err.item, 2);
    assert_eq!(err.state, 1);
    assert!(err.source.downcast_ref::<Cancelled>().is_some());
}

#[tokio::test]
async fn progress_fires_after_each_successful_step() {
    let chain = Chain::new(&ChainConfig::default()).unwrap();
    let seen: Arc<Mutex<Vec<(usize, usize, i32)>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_cb = Arc::clone(&seen);

    let outcome = chain
        .run(
            &CancellationToken::new(),
            &[10, 20, 30],
            0,
            |_token, item, acc| async move { Ok(acc + item) },
            Some(&move |done, total, acc: &i32| seen_cb.lock().push((done, total, *acc))),
        )
        .await
        .unwrap();

    assert_eq!(outcome.result, 60);
    assert_eq!(*seen.lock(), vec![(1, 3, 10), (2, 3, 30), (3, 3, 60)]);
}

#[tokio::test]
async fn step_events_bracket_each_item() {
    let (name, sink) = capture_observer("chain-events");
    let chain = chain_with(&name, false);
    join_fold(&chain, &["a", "b"]).await;

    let kinds: Vec<EventKind> = sink.snapshot().iter().map(|e| e.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::ChainStart,
            EventKind::ChainStepStart,
            EventKind::ChainStepComplete,
            EventKind::ChainStepStart,
            EventKind::ChainStepComplete,
            EventKind::ChainComplete,
        ]
    );
}

#[tokio::test]
async fn unknown_observer_fails_construction() {
    let err = Chain::new(&ChainConfig {
        capture_intermediates: false,
        observer: "ghost-sink".to_string(),
    })
    .unwrap_err();
    assert_eq!(err.to_string(), "unknown observer: ghost-sink");
}
