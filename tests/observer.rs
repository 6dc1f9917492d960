mod common;

use std::sync::Arc;

use common::capture_observer;
use loomflow::observer::{
    ChannelSink, Event, EventKind, FanOutSink, MemorySink, NOOP_OBSERVER, ObserverSink,
    TRACING_OBSERVER, register_observer, resolve_observer,
};
use serde_json::json;

#[test]
fn default_sinks_are_preregistered() {
    assert_eq!(resolve_observer(NOOP_OBSERVER).unwrap().name(), "noop");
    assert_eq!(resolve_observer(TRACING_OBSERVER).unwrap().name(), "tracing");
}

#[test]
fn unknown_observer_is_an_error() {
    let err = resolve_observer("never-registered").unwrap_err();
    assert_eq!(err.to_string(), "unknown observer: never-registered");
}

#[test]
fn registering_twice_replaces_the_binding() {
    let first = MemorySink::new();
    register_observer("observer-rebind", Arc::new(first.clone()));
    let second = MemorySink::new();
    register_observer("observer-rebind", Arc::new(second.clone()));

    let resolved = resolve_observer("observer-rebind").unwrap();
    resolved.accept(&Event::new(EventKind::StateCreate, "state"));

    assert!(first.snapshot().is_empty());
    assert_eq!(second.snapshot().len(), 1);
}

#[test]
fn events_are_immutable_snapshots() {
    let (_, sink) = capture_observer("event-snapshot");
    let event = Event::new(EventKind::StateSet, "state").with_attr("key", json!("customer"));
    sink.accept(&event);

    let captured = sink.snapshot();
    assert_eq!(captured.len(), 1);
    assert_eq!(captured[0].kind(), EventKind::StateSet);
    assert_eq!(captured[0].source(), "state");
    assert_eq!(captured[0].attr("key"), Some(&json!("customer")));
}

#[test]
fn fan_out_delivers_in_child_order() {
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    struct Tagging {
        tag: &'static str,
        order: Arc<parking_lot::Mutex<Vec<&'static str>>>,
    }
    impl ObserverSink for Tagging {
        fn accept(&self, _event: &Event) {
            self.order.lock().push(self.tag);
        }
    }

    let fan = FanOutSink::new(vec![
        Arc::new(Tagging {
            tag: "first",
            order: Arc::clone(&order),
        }),
        Arc::new(Tagging {
            tag: "second",
            order: Arc::clone(&order),
        }),
    ]);
    fan.accept(&Event::new(EventKind::GraphStart, "graph:g"));
    assert_eq!(*order.lock(), vec!["first", "second"]);
}

#[test]
fn fan_out_filters_absent_children() {
    let present = MemorySink::new();
    let fan = FanOutSink::from_optional(vec![
        None,
        Some(Arc::new(present.clone()) as Arc<dyn ObserverSink>),
        None,
    ]);
    assert_eq!(fan.len(), 1);

    fan.accept(&Event::new(EventKind::ChainStart, "chain"));
    assert_eq!(present.snapshot().len(), 1);
}

#[test]
fn channel_sink_streams_events() {
    let (tx, rx) = flume::unbounded();
    let sink = ChannelSink::new(tx);

    sink.accept(&Event::new(EventKind::NodeStart, "graph:g").with_attr("node", json!("a")));
    sink.accept(&Event::new(EventKind::NodeComplete, "graph:g").with_attr("node", json!("a")));

    assert_eq!(rx.recv().unwrap().kind(), EventKind::NodeStart);
    assert_eq!(rx.recv().unwrap().kind(), EventKind::NodeComplete);
}

#[test]
fn event_json_round_trip_shape() {
    let event = Event::new(EventKind::CheckpointSave, "graph:orders")
        .with_attr("node", json!("settle"))
        .with_attr("run_id", json!("run-1"));
    let line = event.to_json_string().unwrap();
    let value: serde_json::Value = serde_json::from_str(&line).unwrap();

    assert_eq!(value["kind"], json!("checkpoint.save"));
    assert_eq!(value["source"], json!("graph:orders"));
    assert_eq!(value["attrs"]["node"], json!("settle"));
}
