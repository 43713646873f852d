#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Integration tests use unwrap for brevity

//! WebSocket transport against an in-process peer.

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use futures::StreamExt;
use serde_json::json;

use a2a_client::transport::WsTransport;
use a2a_client::{ClientError, Priority, TaskRequest, Transport, TransportKind, TransportState};

use common::*;

fn finance_request() -> TaskRequest {
    TaskRequest::from_value("finance-1", json!({"x": 1}))
        .unwrap()
        .with_priority(Priority::High)
}

#[tokio::test]
async fn request_frame_round_trips() {
    let pki = pki();
    let (addr, frames) = spawn_ws_tls(&pki).await;
    let identity = client_identity(&pki);

    let transport = WsTransport::connect(
        &addr.to_string(),
        &secure_options(identity.clone(), SERVER_ID),
    )
    .await
    .unwrap();
    assert_eq!(transport.kind(), TransportKind::WebSocket);
    assert_eq!(transport.state(), TransportState::Connected);
    assert_eq!(identity.fetches.load(Ordering::SeqCst), 1);

    let response = transport.send(finance_request()).await.unwrap();
    assert!(!response.task_id.is_empty());
    assert_eq!(response.status, "COMPLETED");

    let expected = json!({"agent_id": "finance-1", "payload": {"x": 1}, "priority": "HIGH"});
    assert_eq!(frames.lock().await.as_slice(), &[expected.clone()]);
    assert_eq!(response.result.unwrap()["echo"], expected);
}

#[tokio::test]
async fn sequential_sends_stay_paired() {
    let (addr, _frames) = spawn_ws_plain().await;
    let pki = pki();
    let transport = WsTransport::connect(&addr.to_string(), &insecure_options(client_identity(&pki)))
        .await
        .unwrap();

    for agent in ["a", "b", "c"] {
        let response = transport
            .send(TaskRequest::from_value(agent, json!({})).unwrap())
            .await
            .unwrap();
        assert_eq!(response.result.unwrap()["echo"]["agent_id"], json!(agent));
    }
}

#[tokio::test]
async fn stream_preserves_order_and_ends_on_close() {
    let pki = pki();
    let (addr, frames) = spawn_ws_tls(&pki).await;
    let transport =
        WsTransport::connect(&addr.to_string(), &secure_options(client_identity(&pki), SERVER_ID))
            .await
            .unwrap();

    let events: Vec<_> = transport
        .stream("alerts")
        .await
        .unwrap()
        .map(Result::unwrap)
        .collect()
        .await;
    assert_eq!(
        events,
        vec![
            json!({"a": 1}).as_object().unwrap().clone(),
            json!({"a": 2}).as_object().unwrap().clone(),
            json!({"a": 3}).as_object().unwrap().clone(),
        ]
    );
    assert_eq!(
        frames.lock().await.as_slice(),
        &[json!({"action": "subscribe", "topic": "alerts"})]
    );
}

#[tokio::test]
async fn dropping_unfinished_stream_poisons_transport() {
    let (addr, frames) = spawn_ws_plain().await;
    let pki = pki();
    let transport = WsTransport::connect(&addr.to_string(), &insecure_options(client_identity(&pki)))
        .await
        .unwrap();

    // "ticker" never ends, so its events keep arriving after the drop.
    let mut stream = transport.stream("ticker").await.unwrap();
    assert_eq!(stream.next().await.unwrap().unwrap()["a"], json!(1));
    drop(stream);
    assert_eq!(transport.state(), TransportState::Connected);

    match transport.send(finance_request()).await {
        Err(ClientError::Transport(msg)) => assert!(msg.contains("poisoned"), "{msg}"),
        other => panic!("expected poisoned transport, got {other:?}"),
    }
    match transport.stream("other").await {
        Err(ClientError::Transport(msg)) => assert!(msg.contains("poisoned"), "{msg}"),
        Err(other) => panic!("expected poisoned transport, got {other:?}"),
        Ok(_) => panic!("expected poisoned transport, got a stream"),
    }
    // Nothing beyond the first subscription reached the peer.
    assert_eq!(frames.lock().await.len(), 1);
    transport.close().await.unwrap();
}

#[tokio::test]
async fn finished_stream_does_not_poison() {
    let (addr, _frames) = spawn_ws_plain().await;
    let pki = pki();
    let transport = WsTransport::connect(&addr.to_string(), &insecure_options(client_identity(&pki)))
        .await
        .unwrap();

    // "alerts" ends with a close frame from the peer.
    let events: Vec<_> = transport.stream("alerts").await.unwrap().collect().await;
    assert_eq!(events.len(), 3);

    // The socket is gone, but the failure is the peer's close, not poisoning.
    match transport.send(finance_request()).await {
        Err(ClientError::Transport(msg)) => assert!(!msg.contains("poisoned"), "{msg}"),
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn cancelled_send_poisons_transport() {
    let (addr, _frames) = spawn_ws_plain().await;
    let pki = pki();
    let transport = WsTransport::connect(&addr.to_string(), &insecure_options(client_identity(&pki)))
        .await
        .unwrap();

    let silent = TaskRequest::from_value("silent", json!({})).unwrap();
    let timed_out = tokio::time::timeout(Duration::from_millis(200), transport.send(silent)).await;
    assert!(timed_out.is_err());

    match transport.send(finance_request()).await {
        Err(ClientError::Transport(msg)) => assert!(msg.contains("poisoned"), "{msg}"),
        other => panic!("expected poisoned transport, got {other:?}"),
    }
    transport.close().await.unwrap();
}

#[tokio::test]
async fn close_interrupts_send_waiting_on_silent_peer() {
    let (addr, _frames) = spawn_ws_plain().await;
    let pki = pki();
    let transport = Arc::new(
        WsTransport::connect(&addr.to_string(), &insecure_options(client_identity(&pki)))
            .await
            .unwrap(),
    );

    let pending = {
        let transport = Arc::clone(&transport);
        tokio::spawn(async move {
            transport
                .send(TaskRequest::from_value("silent", json!({})).unwrap())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(100)).await;

    tokio::time::timeout(Duration::from_secs(2), transport.close())
        .await
        .expect("close blocked behind a pending send")
        .unwrap();
    assert!(matches!(
        pending.await.unwrap(),
        Err(ClientError::ClientClosed)
    ));
}

async fn send_as(agent: &str) -> Result<a2a_client::TaskResponse, ClientError> {
    let (addr, _frames) = spawn_ws_plain().await;
    let pki = pki();
    let transport = WsTransport::connect(&addr.to_string(), &insecure_options(client_identity(&pki)))
        .await
        .unwrap();
    transport
        .send(TaskRequest::from_value(agent, json!({})).unwrap())
        .await
}

#[tokio::test]
async fn malformed_response_frame_is_protocol_violation() {
    match send_as("garbled").await {
        Err(ClientError::ProtocolViolation(msg)) => assert!(msg.contains("response frame"), "{msg}"),
        other => panic!("expected ProtocolViolation, got {other:?}"),
    }
}

#[tokio::test]
async fn binary_response_frame_is_protocol_violation() {
    assert!(matches!(
        send_as("binary").await,
        Err(ClientError::ProtocolViolation(_))
    ));
}

#[tokio::test]
async fn peer_closing_mid_read_is_transport_error() {
    match send_as("hangup").await {
        Err(ClientError::Transport(msg)) => assert!(msg.contains("closed"), "{msg}"),
        other => panic!("expected Transport error, got {other:?}"),
    }
}

#[tokio::test]
async fn unexpected_peer_identity_fails_handshake() {
    let pki = pki();
    let (addr, frames) = spawn_ws_tls(&pki).await;

    let err = WsTransport::connect(
        &addr.to_string(),
        &secure_options(client_identity(&pki), "spiffe://alpha-factory/someone-else"),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(err, ClientError::HandshakeFailed(_)), "{err:?}");
    assert!(frames.lock().await.is_empty());
}

#[tokio::test]
async fn close_is_idempotent_and_final() {
    let (addr, _frames) = spawn_ws_plain().await;
    let pki = pki();
    let transport = WsTransport::connect(&addr.to_string(), &insecure_options(client_identity(&pki)))
        .await
        .unwrap();

    transport.close().await.unwrap();
    transport.close().await.unwrap();
    assert_eq!(transport.state(), TransportState::Closed);
    assert!(matches!(
        transport.send(finance_request()).await,
        Err(ClientError::ClientClosed)
    ));
    assert!(matches!(
        transport.stream("alerts").await,
        Err(ClientError::ClientClosed)
    ));
}
