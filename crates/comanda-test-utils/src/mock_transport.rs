// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock transport adapter for deterministic connection tests.
//!
//! `MockTransport` implements `TransportAdapter` with injectable transport
//! events and captured outbound messages for assertion in tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use comanda_core::error::ComandaError;
use comanda_core::traits::TransportAdapter;
use comanda_core::types::{MessageId, OutboundMessage, TransportEvent};

/// A scripted transport for testing the connection manager.
///
/// Events pushed via [`push_event`](MockTransport::push_event) are returned
/// in order by `next_event()`; `next_event()` pends while the script is
/// empty. Outbound messages are captured for assertion.
pub struct MockTransport {
    events: Mutex<VecDeque<TransportEvent>>,
    notify: Notify,
    sent: Mutex<Vec<OutboundMessage>>,
    open_calls: AtomicU32,
    close_calls: AtomicU32,
    persist_calls: AtomicU32,
    fail_opens: AtomicU32,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            sent: Mutex::new(Vec::new()),
            open_calls: AtomicU32::new(0),
            close_calls: AtomicU32::new(0),
            persist_calls: AtomicU32::new(0),
            fail_opens: AtomicU32::new(0),
        })
    }

    /// Append an event to the script.
    pub async fn push_event(&self, event: TransportEvent) {
        self.events.lock().await.push_back(event);
        self.notify.notify_one();
    }

    /// Make the next `n` calls to `open()` fail.
    pub fn fail_next_opens(&self, n: u32) {
        self.fail_opens.store(n, Ordering::SeqCst);
    }

    /// Messages captured from `send()`.
    pub async fn sent_messages(&self) -> Vec<OutboundMessage> {
        self.sent.lock().await.clone()
    }

    pub fn open_count(&self) -> u32 {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn close_count(&self) -> u32 {
        self.close_calls.load(Ordering::SeqCst)
    }

    pub fn persist_count(&self) -> u32 {
        self.persist_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransportAdapter for MockTransport {
    async fn open(&self) -> Result<(), ComandaError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        let remaining = self.fail_opens.load(Ordering::SeqCst);
        if remaining > 0 {
            self.fail_opens.store(remaining - 1, Ordering::SeqCst);
            return Err(ComandaError::Transport {
                message: "injected open failure".to_string(),
                source: None,
            });
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), ComandaError> {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, ComandaError> {
        self.sent.lock().await.push(msg);
        Ok(MessageId(format!("mock-msg-{}", uuid::Uuid::new_v4())))
    }

    async fn next_event(&self) -> Result<TransportEvent, ComandaError> {
        loop {
            if let Some(event) = self.events.lock().await.pop_front() {
                return Ok(event);
            }
            self.notify.notified().await;
        }
    }

    async fn persist_credentials(&self) -> Result<(), ComandaError> {
        self.persist_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
