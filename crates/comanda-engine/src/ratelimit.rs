// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-sender sliding-window rate limiter.
//!
//! Each sender gets at most `max_messages` admissions inside a sliding
//! window, with a minimum spacing between admitted messages. Exhausting the
//! window budget blocks the sender for a full window; when the block passes
//! the window starts over empty. A sender is told about throttling exactly
//! once per blocked stretch: the rejection that starts the block carries
//! `notify`, subsequent ones are silent. Spacing violations are always
//! dropped silently.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use metrics::counter;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use comanda_config::model::RateLimitConfig;
use comanda_core::types::SenderId;

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    /// Rejected; `notify` requests a single throttle notice to the sender.
    Rejected { notify: bool },
}

#[derive(Debug)]
struct SenderRecord {
    hits: VecDeque<Instant>,
    last_admitted: Option<Instant>,
    blocked_until: Option<Instant>,
}

impl SenderRecord {
    fn new() -> Self {
        Self {
            hits: VecDeque::new(),
            last_admitted: None,
            blocked_until: None,
        }
    }
}

/// Sliding-window limiter shared by the conversation engine.
pub struct RateLimiter {
    config: RateLimitConfig,
    records: Mutex<HashMap<SenderId, SenderRecord>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            records: Mutex::new(HashMap::new()),
        }
    }

    /// Check whether one message from `sender_id` may be processed.
    pub async fn admit(&self, sender_id: &SenderId) -> Admission {
        let window = Duration::from_secs(self.config.window_secs);
        let spacing = Duration::from_secs(self.config.min_spacing_secs);
        let now = Instant::now();

        let mut records = self.records.lock().await;
        let record = records
            .entry(sender_id.clone())
            .or_insert_with(SenderRecord::new);

        if let Some(until) = record.blocked_until {
            if now < until {
                counter!("comanda_rate_limited_total").increment(1);
                debug!(sender = %sender_id, "message dropped: sender is blocked");
                return Admission::Rejected { notify: false };
            }
            // Block expired: the window starts over empty.
            record.blocked_until = None;
            record.hits.clear();
        }

        while let Some(&oldest) = record.hits.front() {
            if now.duration_since(oldest) >= window {
                record.hits.pop_front();
            } else {
                break;
            }
        }

        if let Some(last) = record.last_admitted {
            if now.duration_since(last) < spacing {
                counter!("comanda_rate_limited_total").increment(1);
                debug!(sender = %sender_id, "message dropped: below minimum spacing");
                return Admission::Rejected { notify: false };
            }
        }

        if record.hits.len() >= self.config.max_messages {
            record.blocked_until = Some(now + window);
            counter!("comanda_rate_limited_total").increment(1);
            debug!(sender = %sender_id, "window budget exhausted; blocking sender");
            return Admission::Rejected { notify: true };
        }

        record.hits.push_back(now);
        record.last_admitted = Some(now);
        Admission::Admitted
    }

    /// Drop records with no activity inside the window. Called from the
    /// periodic sweeper so the map does not grow with one-off senders.
    pub async fn sweep(&self) -> usize {
        let window = Duration::from_secs(self.config.window_secs);
        let now = Instant::now();
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, record| {
            record
                .hits
                .back()
                .is_some_and(|&last| now.duration_since(last) < window)
        });
        before - records.len()
    }

    #[cfg(test)]
    pub(crate) async fn tracked_senders(&self) -> usize {
        self.records.lock().await.len()
    }
}
