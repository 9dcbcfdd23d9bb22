// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded in-process message queue with priority insertion and a single
//! drain loop.
//!
//! At most one drain task runs at a time. Enqueueing onto an idle queue
//! starts the drain; the drain exits when the queue empties and is restarted
//! by the next enqueue (including retry re-enqueues), so processing always
//! resumes on its own. Dequeued items are tracked in an in-flight id set, so
//! a re-entered drain skips an item that is already being processed. Items
//! that fail processing are re-enqueued after a linear backoff until
//! `max_attempts` is reached, then dropped.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use comanda_config::model::QueueConfig;
use comanda_core::error::ComandaError;
use comanda_core::types::InboundMessage;

/// Queue priority. Operator-injected work jumps ahead of customer traffic
/// but never reorders items of equal priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Normal,
    Operator,
}

/// One unit of queued work.
#[derive(Debug, Clone)]
pub struct QueueItem {
    /// Item id, taken from the wrapped message. Stable across retries.
    pub id: String,
    pub msg: InboundMessage,
    pub priority: Priority,
    /// Completed processing attempts for this item.
    pub attempts: u32,
}

/// Consumer side of the queue.
#[async_trait]
pub trait QueueProcessor: Send + Sync + 'static {
    async fn process(&self, item: &QueueItem) -> Result<(), ComandaError>;
}

struct QueueState {
    items: VecDeque<QueueItem>,
    draining: bool,
    /// Ids currently being processed by the drain.
    in_flight: HashSet<String>,
}

struct QueueInner {
    state: Mutex<QueueState>,
    config: QueueConfig,
    processor: Arc<dyn QueueProcessor>,
}

/// Cheap clonable handle to the shared queue.
#[derive(Clone)]
pub struct MessageQueue {
    inner: Arc<QueueInner>,
}

impl MessageQueue {
    pub fn new(config: QueueConfig, processor: Arc<dyn QueueProcessor>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                state: Mutex::new(QueueState {
                    items: VecDeque::new(),
                    draining: false,
                    in_flight: HashSet::new(),
                }),
                config,
                processor,
            }),
        }
    }

    /// Enqueue a fresh message.
    pub async fn enqueue(&self, msg: InboundMessage, priority: Priority) {
        counter!("comanda_queue_enqueued_total").increment(1);
        Arc::clone(&self.inner)
            .push(QueueItem {
                id: msg.id.clone(),
                msg,
                priority,
                attempts: 0,
            })
            .await;
    }

    /// Current queue depth.
    pub async fn depth(&self) -> usize {
        self.inner.state.lock().await.items.len()
    }
}

impl QueueInner {
    // Boxed because the drain's retry path calls back into `push`; with an
    // opaque future the two would form a cycle rustc cannot size or prove
    // `Send`.
    fn push(self: Arc<Self>, item: QueueItem) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;

            if state.items.len() >= self.config.capacity {
                // Evict the oldest item of the lowest priority present. Items
                // are kept priority-descending with FIFO inside each band, so
                // that is the first item of the last band.
                let min = state
                    .items
                    .iter()
                    .map(|i| i.priority)
                    .min()
                    .unwrap_or(Priority::Normal);
                if let Some(pos) = state.items.iter().position(|i| i.priority == min) {
                    if let Some(evicted) = state.items.remove(pos) {
                        counter!("comanda_queue_evictions_total").increment(1);
                        debug!(
                            sender = %evicted.msg.sender_id,
                            "queue full; evicted oldest low-priority item"
                        );
                    }
                }
            }

            let pos = state
                .items
                .iter()
                .position(|existing| existing.priority < item.priority)
                .unwrap_or(state.items.len());
            state.items.insert(pos, item);

            if !state.draining {
                state.draining = true;
                let inner = Arc::clone(&self);
                tokio::spawn(inner.drain());
            }
        })
    }

    async fn drain(self: Arc<Self>) {
        loop {
            let item = {
                let mut state = self.state.lock().await;
                match state.items.pop_front() {
                    Some(item) => {
                        if !state.in_flight.insert(item.id.clone()) {
                            debug!(id = item.id, "skipping item already in flight");
                            continue;
                        }
                        item
                    }
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };

            let result = self.processor.process(&item).await;
            self.state.lock().await.in_flight.remove(&item.id);

            if let Err(err) = result {
                let attempts = item.attempts + 1;
                if attempts >= self.config.max_attempts {
                    counter!("comanda_queue_dropped_total").increment(1);
                    warn!(
                        sender = %item.msg.sender_id,
                        attempts,
                        error = %err,
                        "dropping message after exhausting processing attempts"
                    );
                } else {
                    let delay = Duration::from_millis(self.config.retry_base_ms * u64::from(attempts));
                    warn!(
                        sender = %item.msg.sender_id,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "message processing failed; scheduling retry"
                    );
                    let inner = Arc::clone(&self);
                    let mut retry = item;
                    retry.attempts = attempts;
                    tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        inner.push(retry).await;
                    });
                }
            }
        }
    }
}
