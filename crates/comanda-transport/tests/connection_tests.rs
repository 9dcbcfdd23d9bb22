// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection manager lifecycle tests.
//!
//! All tests run with a paused tokio clock: sleeps auto-advance, so
//! watchdogs and backoff delays resolve instantly in wall time while the
//! simulated ordering stays exact.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use comanda_config::model::ConnectionConfig;
use comanda_core::types::{DisconnectKind, DisconnectReason, OutboundMessage, SenderId, TransportEvent};
use comanda_test_utils::MockTransport;
use comanda_transport::{
    ConnectionHandle, ConnectionManager, ConnectionSignal, DisconnectClass, SessionBlobStore,
};

fn test_config(blob_dir: &Path) -> ConnectionConfig {
    ConnectionConfig {
        session_blob_dir: blob_dir.to_string_lossy().into_owned(),
        ..ConnectionConfig::default()
    }
}

fn seed_blob(dir: &Path) {
    std::fs::create_dir_all(dir).unwrap();
    std::fs::write(dir.join("creds.json"), b"{}").unwrap();
}

fn start(
    transport: Arc<MockTransport>,
    config: ConnectionConfig,
) -> (
    ConnectionHandle,
    tokio::sync::mpsc::Receiver<comanda_core::types::InboundMessage>,
    tokio::task::JoinHandle<()>,
) {
    let blobs = SessionBlobStore::new(PathBuf::from(&config.session_blob_dir));
    ConnectionManager::new(transport, blobs, config).start()
}

/// Poll a condition while letting simulated time advance.
async fn wait_for(mut cond: impl FnMut() -> bool) {
    for _ in 0..5_000 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    panic!("condition not reached within simulated time");
}

async fn next_signal(rx: &mut broadcast::Receiver<ConnectionSignal>) -> ConnectionSignal {
    rx.recv().await.expect("signal channel closed")
}

async fn wait_connected(rx: &mut broadcast::Receiver<ConnectionSignal>) {
    loop {
        if matches!(next_signal(rx).await, ConnectionSignal::Connected) {
            return;
        }
    }
}

#[tokio::test(start_paused = true)]
async fn logout_wipes_session_and_reconnects_for_fresh_pairing() {
    let tmp = tempfile::tempdir().unwrap();
    let blob_dir = tmp.path().join("session");
    seed_blob(&blob_dir);

    let transport = MockTransport::new();
    let (handle, _inbound, task) = start(transport.clone(), test_config(&blob_dir));
    let mut signals = handle.signals();

    transport.push_event(TransportEvent::Opened).await;
    wait_connected(&mut signals).await;

    transport
        .push_event(TransportEvent::Closed(DisconnectReason {
            code: Some(401),
            kind: DisconnectKind::LoggedOut,
        }))
        .await;

    match next_signal(&mut signals).await {
        ConnectionSignal::Disconnected { class, code } => {
            assert_eq!(class, DisconnectClass::Terminal);
            assert_eq!(code, Some(401));
        }
        other => panic!("expected disconnect signal, got {other:?}"),
    }

    // The manager restarts after the short delay and the wipe has landed.
    wait_for(|| transport.open_count() >= 2).await;
    assert!(!blob_dir.exists(), "session blob should be wiped on logout");

    // A fresh pairing challenge flows out to subscribers.
    transport
        .push_event(TransportEvent::PairingChallenge("code-1234".to_string()))
        .await;
    loop {
        if let ConnectionSignal::ScanCode(code) = next_signal(&mut signals).await {
            assert_eq!(code, "code-1234");
            break;
        }
    }

    handle.stop();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn desync_twice_in_a_row_wipes_session_exactly_once() {
    let tmp = tempfile::tempdir().unwrap();
    let blob_dir = tmp.path().join("session");
    seed_blob(&blob_dir);

    let transport = MockTransport::new();
    let (handle, _inbound, task) = start(transport.clone(), test_config(&blob_dir));
    let mut signals = handle.signals();

    let desync = TransportEvent::Closed(DisconnectReason {
        code: Some(515),
        kind: DisconnectKind::StreamDesync,
    });

    // First desync: transient handling, no wipe.
    transport.push_event(TransportEvent::Opened).await;
    wait_connected(&mut signals).await;
    transport.push_event(desync.clone()).await;
    wait_for(|| transport.open_count() >= 2).await;
    assert!(blob_dir.exists(), "single desync must not wipe the session");

    // Second consecutive desync: corruption, one wipe.
    transport.push_event(TransportEvent::Opened).await;
    wait_connected(&mut signals).await;
    transport.push_event(desync.clone()).await;
    wait_for(|| transport.open_count() >= 3).await;
    assert!(!blob_dir.exists(), "repeated desync should wipe the session");

    // The pairing counter reset with the wipe: the next desync is a fresh
    // first occurrence and must not wipe again.
    seed_blob(&blob_dir);
    transport.push_event(TransportEvent::Opened).await;
    wait_connected(&mut signals).await;
    transport.push_event(desync).await;
    wait_for(|| transport.open_count() >= 4).await;
    assert!(blob_dir.exists(), "wipe counter should reset after a wipe");

    handle.stop();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn transient_failures_back_off_then_wipe_after_budget() {
    let tmp = tempfile::tempdir().unwrap();
    let blob_dir = tmp.path().join("session");
    seed_blob(&blob_dir);

    let transport = MockTransport::new();
    let (handle, _inbound, task) = start(transport.clone(), test_config(&blob_dir));

    let lost = TransportEvent::Closed(DisconnectReason {
        code: None,
        kind: DisconnectKind::ConnectionLost,
    });

    // Three consecutive transient closures reconnect without wiping.
    for expected_opens in 2u32..=4 {
        transport.push_event(lost.clone()).await;
        wait_for(|| transport.open_count() >= expected_opens).await;
    }
    assert!(
        blob_dir.exists(),
        "session must survive transient failures within the retry budget"
    );

    // The fourth exhausts the budget: wipe plus the long restart delay.
    transport.push_event(lost).await;
    wait_for(|| transport.open_count() >= 5).await;
    assert!(!blob_dir.exists(), "exhausted retries should wipe the session");
    assert_eq!(
        handle.status().last_disconnect,
        Some(DisconnectClass::Transient)
    );

    handle.stop();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn pairing_watchdog_wipes_stale_challenge() {
    let tmp = tempfile::tempdir().unwrap();
    let blob_dir = tmp.path().join("session");
    seed_blob(&blob_dir);

    let transport = MockTransport::new();
    let (handle, _inbound, task) = start(transport.clone(), test_config(&blob_dir));
    let mut signals = handle.signals();

    transport
        .push_event(TransportEvent::PairingChallenge("unscanned".to_string()))
        .await;
    loop {
        if matches!(next_signal(&mut signals).await, ConnectionSignal::ScanCode(_)) {
            break;
        }
    }

    // Nobody completes pairing; the watchdog fires and the cycle restarts.
    wait_for(|| transport.open_count() >= 2).await;
    assert!(!blob_dir.exists(), "stale pairing state should be wiped");
    assert!(transport.close_count() >= 1);

    handle.stop();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn decode_failures_force_wipe_only_past_budget() {
    let tmp = tempfile::tempdir().unwrap();
    let blob_dir = tmp.path().join("session");
    seed_blob(&blob_dir);

    let transport = MockTransport::new();
    let mut config = test_config(&blob_dir);
    config.decode_error_budget = 3;
    let (handle, _inbound, task) = start(transport.clone(), config);
    let mut signals = handle.signals();

    transport.push_event(TransportEvent::Opened).await;
    wait_connected(&mut signals).await;

    for _ in 0..3 {
        transport
            .push_event(TransportEvent::DecodeFailure("bad frame".to_string()))
            .await;
    }
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(transport.open_count(), 1, "within budget: connection stays up");
    assert!(blob_dir.exists());

    transport
        .push_event(TransportEvent::DecodeFailure("bad frame".to_string()))
        .await;
    wait_for(|| transport.open_count() >= 2).await;
    assert!(!blob_dir.exists(), "blown decode budget should wipe the session");

    handle.stop();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn credential_persistence_is_debounced() {
    let tmp = tempfile::tempdir().unwrap();
    let blob_dir = tmp.path().join("session");

    let transport = MockTransport::new();
    let (handle, _inbound, task) = start(transport.clone(), test_config(&blob_dir));
    let mut signals = handle.signals();

    transport.push_event(TransportEvent::Opened).await;
    wait_connected(&mut signals).await;

    // First change persists immediately.
    transport.push_event(TransportEvent::CredentialsChanged).await;
    wait_for(|| transport.persist_count() >= 1).await;

    // A burst within the debounce window coalesces into one deferred write.
    transport.push_event(TransportEvent::CredentialsChanged).await;
    transport.push_event(TransportEvent::CredentialsChanged).await;
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(transport.persist_count(), 1);

    wait_for(|| transport.persist_count() >= 2).await;
    assert_eq!(transport.persist_count(), 2);

    // After the window passes, the next change persists immediately again.
    tokio::time::sleep(Duration::from_secs(10)).await;
    transport.push_event(TransportEvent::CredentialsChanged).await;
    wait_for(|| transport.persist_count() >= 3).await;

    handle.stop();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn send_fails_fast_while_disconnected() {
    let tmp = tempfile::tempdir().unwrap();
    let blob_dir = tmp.path().join("session");

    let transport = MockTransport::new();
    let (handle, _inbound, task) = start(transport.clone(), test_config(&blob_dir));
    let mut signals = handle.signals();

    let msg = OutboundMessage {
        to: SenderId("5215550001".to_string()),
        text: "hola".to_string(),
    };

    let err = handle.send(msg.clone()).await.unwrap_err();
    assert!(err.to_string().contains("not connected"));
    assert!(transport.sent_messages().await.is_empty());

    transport.push_event(TransportEvent::Opened).await;
    wait_connected(&mut signals).await;
    handle.send(msg).await.unwrap();
    assert_eq!(transport.sent_messages().await.len(), 1);

    handle.stop();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn inbound_messages_flow_through_the_channel() {
    let tmp = tempfile::tempdir().unwrap();
    let blob_dir = tmp.path().join("session");

    let transport = MockTransport::new();
    let (handle, mut inbound, task) = start(transport.clone(), test_config(&blob_dir));
    let mut signals = handle.signals();

    transport.push_event(TransportEvent::Opened).await;
    wait_connected(&mut signals).await;

    let msg = comanda_core::types::InboundMessage {
        id: "m1".to_string(),
        sender_id: SenderId("5215550001".to_string()),
        content: comanda_core::types::MessageContent::Text("hola".to_string()),
        timestamp: chrono::Utc::now(),
        order: None,
    };
    transport.push_event(TransportEvent::Message(msg)).await;

    let received = inbound.recv().await.expect("inbound channel closed");
    assert_eq!(received.id, "m1");
    assert_eq!(received.sender_id.0, "5215550001");

    handle.stop();
    task.await.unwrap();
}
