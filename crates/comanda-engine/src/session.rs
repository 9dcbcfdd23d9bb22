// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory conversation sessions and the idle sweeper.
//!
//! A session tracks where one sender is in the ordering dialogue. Sessions
//! are created on first contact, touched on every processed message, and
//! evicted by the periodic sweeper after `max_idle_secs` of silence. An
//! evicted sender simply starts over at [`ConversationState::Welcome`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use metrics::{counter, gauge};
use serde::Serialize;
use strum::Display;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use comanda_config::model::SessionConfig;
use comanda_core::types::{PaymentMethod, SenderId};

/// Where a sender currently is in the ordering dialogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConversationState {
    /// Resting state; greetings, status queries, and complaints start here.
    Welcome,
    /// An order awaits a yes/no confirmation.
    ConfirmingOrder,
    /// Waiting for a delivery address.
    AwaitingAddress,
    /// Waiting for a payment method choice.
    SelectingPayment,
    /// Waiting for an image proving a bank transfer.
    AwaitingTransferProof,
    /// Waiting for the complaint text.
    AwaitingComplaint,
}

/// Per-sender conversation session.
#[derive(Debug, Clone)]
pub struct UserSession {
    pub sender_id: SenderId,
    pub state: ConversationState,
    /// Backend id of the order the dialogue is currently about.
    pub pending_order: Option<String>,
    /// Delivery address captured during this dialogue, if any.
    pub delivery_address: Option<String>,
    pub payment_method: Option<PaymentMethod>,
    /// Order ids this sender has already run through confirmation. Resending
    /// a processed payload must not re-trigger the flow.
    pub processed_orders: HashSet<String>,
    pub last_activity: Instant,
}

impl UserSession {
    fn new(sender_id: SenderId) -> Self {
        Self {
            sender_id,
            state: ConversationState::Welcome,
            pending_order: None,
            delivery_address: None,
            payment_method: None,
            processed_orders: HashSet::new(),
            last_activity: Instant::now(),
        }
    }

    /// Return the dialogue to its resting state. The processed-order set
    /// survives until the session itself is evicted.
    pub fn reset(&mut self) {
        self.state = ConversationState::Welcome;
        self.pending_order = None;
        self.delivery_address = None;
        self.payment_method = None;
    }
}

/// Shared in-memory session map.
pub struct SessionStore {
    sessions: Mutex<HashMap<SenderId, UserSession>>,
    config: SessionConfig,
}

impl SessionStore {
    pub fn new(config: SessionConfig) -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            config,
        })
    }

    /// Load the session for a sender, creating it on first contact. The
    /// activity timestamp is refreshed.
    pub async fn load(&self, sender_id: &SenderId) -> UserSession {
        let mut sessions = self.sessions.lock().await;
        let session = sessions
            .entry(sender_id.clone())
            .or_insert_with(|| UserSession::new(sender_id.clone()));
        session.last_activity = Instant::now();
        session.clone()
    }

    /// Store a mutated session back.
    pub async fn store(&self, session: UserSession) {
        self.sessions
            .lock()
            .await
            .insert(session.sender_id.clone(), session);
    }

    /// Mutate a session in place under the map lock.
    ///
    /// For writers outside the drain loop; a clone-out/store-back there
    /// would race the drain and lose whichever write lands first. Returns
    /// false when the sender has no session.
    pub async fn update<F>(&self, sender_id: &SenderId, mutate: F) -> bool
    where
        F: FnOnce(&mut UserSession),
    {
        let mut sessions = self.sessions.lock().await;
        match sessions.get_mut(sender_id) {
            Some(session) => {
                mutate(session);
                true
            }
            None => false,
        }
    }

    /// Peek at a session without refreshing its activity timestamp.
    pub async fn peek(&self, sender_id: &SenderId) -> Option<UserSession> {
        self.sessions.lock().await.get(sender_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Evict sessions idle longer than `max_idle_secs`. Returns the count.
    pub async fn sweep(&self) -> usize {
        let max_idle = Duration::from_secs(self.config.max_idle_secs);
        let now = Instant::now();
        let mut sessions = self.sessions.lock().await;
        let before = sessions.len();
        sessions.retain(|sender, session| {
            let keep = now.duration_since(session.last_activity) < max_idle;
            if !keep {
                debug!(sender = %sender, state = %session.state, "evicting idle session");
            }
            keep
        });
        let evicted = before - sessions.len();
        if evicted > 0 {
            counter!("comanda_sessions_swept_total").increment(evicted as u64);
        }
        gauge!("comanda_sessions_active").set(sessions.len() as f64);
        evicted
    }
}
