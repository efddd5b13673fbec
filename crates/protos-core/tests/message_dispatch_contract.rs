//! Architectural Contract Test: Message Dispatch
//!
//! This test verifies how inbound frames reach the NewMessage handler.
//!
//! Constraints verified:
//! - Each `update` frame is dispatched exactly once, in arrival order
//! - Payloads the crate cannot classify are delivered verbatim
//! - Resource payloads are decoded into resources
//! - The session keeps running between messages

mod common;

use common::*;
use protos_core::{DnsRecord, ResourceStatus, ResourceValue, Update};
use serde_json::json;
use std::time::Duration;

const INTERVAL: Duration = Duration::from_secs(60);

#[tokio::test(start_paused = true)]
async fn unknown_payload_is_delivered_verbatim() {
    let (connector, frames, counters) = MockConnector::new();
    let (registry, calls) = registry(Failures::default());

    let running = spawn_loop(connector, registry, INTERVAL);
    frames
        .send(Ok(br#"{"type":"update","update":{"k":"v"}}"#.to_vec()))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;

    assert_eq!(calls.messages(), vec![Update::Unknown(json!({"k": "v"}))]);

    // Still running: nothing has been closed yet
    assert_eq!(counters.close_frames(), 0);
    assert_eq!(calls.terminate_count(), 0);

    let (result, _) = running.shutdown().await;
    assert!(result.is_ok());
}

#[tokio::test(start_paused = true)]
async fn resource_payload_is_decoded() {
    let (connector, frames, _counters) = MockConnector::new();
    let (registry, calls) = registry(Failures::default());

    let frame = json!({
        "type": "update",
        "update": {
            "id": "res-1",
            "type": "dns",
            "status": "requested",
            "value": {"host": "www", "value": "10.0.0.1", "type": "A", "ttl": 300}
        }
    });

    let running = spawn_loop(connector, registry, INTERVAL);
    frames.send(Ok(serde_json::to_vec(&frame).unwrap())).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    let (result, _) = running.shutdown().await;
    assert!(result.is_ok());

    let messages = calls.messages();
    assert_eq!(messages.len(), 1);
    let resource = messages[0].resource().expect("decoded as a resource");
    assert_eq!(resource.id, "res-1");
    assert_eq!(resource.status, ResourceStatus::Requested);
    match &resource.value {
        ResourceValue::Dns(DnsRecord {
            host, value, ttl, ..
        }) => {
            assert_eq!(host, "www");
            assert_eq!(value, "10.0.0.1");
            assert_eq!(*ttl, 300);
        }
        other => panic!("expected a DNS record, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn messages_are_dispatched_in_arrival_order() {
    let (connector, frames, _counters) = MockConnector::new();
    let (registry, calls) = registry(Failures::default());

    let running = spawn_loop(connector, registry, INTERVAL);
    for n in 0..5 {
        let frame = json!({"type": "update", "update": {"seq": n}});
        frames.send(Ok(serde_json::to_vec(&frame).unwrap())).unwrap();
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
    let (result, _) = running.shutdown().await;
    assert!(result.is_ok());

    let seqs: Vec<i64> = calls
        .messages()
        .iter()
        .map(|update| update.to_json()["seq"].as_i64().unwrap())
        .collect();
    assert_eq!(seqs, vec![0, 1, 2, 3, 4]);
}

#[tokio::test(start_paused = true)]
async fn update_without_payload_is_malformed() {
    let (connector, frames, _counters) = MockConnector::new();
    let (registry, calls) = registry(Failures::default());

    let running = spawn_loop(connector, registry, INTERVAL);
    frames.send(Ok(br#"{"type":"update"}"#.to_vec())).unwrap();
    let (result, _) = running.join().await;

    assert!(matches!(
        result,
        Err(protos_core::Error::MalformedMessage(_))
    ));
    assert!(calls.messages().is_empty());
    assert_eq!(calls.terminate_count(), 1);
}
