// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The conversation engine: one queue processor that drives every dialogue.
//!
//! Per message the engine applies, in order: operator order-confirmation
//! injection, rate limiting, spam scoring, audit recording, then the state
//! machine handler for the sender's session. Backend requests retry a fixed
//! number of times with a fixed delay; a still-failing request propagates to
//! the queue, which re-enqueues the item until its attempts run out. On the
//! final attempt the customer gets an apology instead of silence.
//!
//! Outbound sends are fire-and-forget: while the transport is down they are
//! dropped with a log line, never queued. The customer can always repeat a
//! question; stale replies arriving minutes later would be worse.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use metrics::counter;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use comanda_config::model::{BackendConfig, ComandaConfig, QueueConfig, SessionConfig};
use comanda_core::error::ComandaError;
use comanda_core::traits::{BackendClient, SpamScorer};
use comanda_core::types::{
    Customer, InboundMessage, MessageContent, MessageDirection, MessageId, MessageRecord,
    OrderPayload, OrderStatus, OrderUpdate, OutboundMessage, PaymentMethod, PaymentStatus,
    SenderId, SpamVerdict,
};
use comanda_transport::ConnectionHandle;

use crate::classify::{classify_text, InputClass};
use crate::queue::{MessageQueue, Priority, QueueItem, QueueProcessor};
use crate::ratelimit::{Admission, RateLimiter};
use crate::replies::{ReplyCatalog, ReplySet};
use crate::session::{ConversationState, SessionStore, UserSession};

/// Orchestrates collaborators and session state for every inbound message.
pub struct ConversationEngine {
    backend: Arc<dyn BackendClient>,
    spam: Arc<dyn SpamScorer>,
    connection: ConnectionHandle,
    sessions: Arc<SessionStore>,
    limiter: RateLimiter,
    replies: Arc<ReplyCatalog>,
    queue_config: QueueConfig,
    backend_config: BackendConfig,
    session_config: SessionConfig,
}

impl ConversationEngine {
    pub fn new(
        backend: Arc<dyn BackendClient>,
        spam: Arc<dyn SpamScorer>,
        connection: ConnectionHandle,
        sessions: Arc<SessionStore>,
        replies: Arc<ReplyCatalog>,
        config: &ComandaConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            backend,
            spam,
            connection,
            sessions,
            limiter: RateLimiter::new(config.rate_limit.clone()),
            replies,
            queue_config: config.queue.clone(),
            backend_config: config.backend.clone(),
            session_config: config.session.clone(),
        })
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Spawn the periodic sweep of idle sessions and stale rate-limit
    /// records. Runs until the token is cancelled.
    pub fn spawn_sweeper(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let interval = Duration::from_secs(engine.session_config.sweep_interval_secs);
        tokio::spawn(async move {
            info!(interval_secs = interval.as_secs(), "idle sweeper started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = sleep(interval) => {
                        let evicted = engine.sessions.sweep().await;
                        let dropped = engine.limiter.sweep().await;
                        if evicted > 0 || dropped > 0 {
                            debug!(evicted, dropped, "idle sweep complete");
                        }
                    }
                }
            }
            info!("idle sweeper stopped");
        })
    }

    // Operator surface -------------------------------------------------

    /// Send a free-form message to a sender on behalf of the operator.
    pub async fn send_message(&self, to: SenderId, text: &str) -> Result<MessageId, ComandaError> {
        let id = self
            .connection
            .send(OutboundMessage {
                to: to.clone(),
                text: text.to_string(),
            })
            .await?;
        self.record_outbound(&to, text).await;
        Ok(id)
    }

    /// Swap in the reply catalog from disk.
    pub fn reload_replies(&self) -> Result<(), ComandaError> {
        self.replies.reload()
    }

    /// Mark the sender's pending order as paid and tell them.
    ///
    /// Finalizes the dialogue when it was waiting on this payment; fine to
    /// call when no order is pending, in which case only the message goes
    /// out.
    pub async fn approve_payment(
        &self,
        sender_id: &SenderId,
        text: Option<&str>,
    ) -> Result<(), ComandaError> {
        let pending = self
            .sessions
            .peek(sender_id)
            .await
            .and_then(|session| session.pending_order);
        if let Some(order_id) = pending {
            let update = OrderUpdate {
                status: Some(OrderStatus::Paid),
                ..Default::default()
            };
            self.with_backend_retry("update_order", || {
                self.backend.update_order(&order_id, &update)
            })
            .await?;
            // In-place under the store lock; the drain loop may be mid-message
            // for this sender and a clone-out/store-back here would lose one
            // side's writes.
            self.sessions
                .update(sender_id, |session| {
                    if session.pending_order.as_deref() == Some(order_id.as_str()) {
                        session.processed_orders.insert(order_id.clone());
                        session.reset();
                    }
                })
                .await;
            info!(sender = %sender_id, order_id, "payment approved; order finalized");
        }

        let replies = self.replies.get();
        let text = text.unwrap_or(&replies.payment_received);
        self.send_message(sender_id.clone(), text).await?;
        Ok(())
    }

    // Inbound pipeline --------------------------------------------------

    async fn handle_message(&self, msg: &InboundMessage) -> Result<(), ComandaError> {
        if let Some(order) = &msg.order {
            return self.begin_order_confirmation(msg, order).await;
        }

        match self.limiter.admit(&msg.sender_id).await {
            Admission::Admitted => {}
            Admission::Rejected { notify } => {
                if notify {
                    let replies = self.replies.get();
                    self.send_reply(&msg.sender_id, &replies.throttle_notice).await;
                }
                return Ok(());
            }
        }

        let text = match &msg.content {
            MessageContent::Text(t) => t.clone(),
            MessageContent::Image { caption } => caption.clone().unwrap_or_default(),
            MessageContent::Unsupported => {
                let replies = self.replies.get();
                self.send_reply(&msg.sender_id, &replies.fallback).await;
                return Ok(());
            }
        };

        match self.spam.check(&msg.sender_id, &text).await {
            Ok(SpamVerdict::Clean) => {}
            Ok(SpamVerdict::Flagged { notify }) => {
                counter!("comanda_spam_flagged_total").increment(1);
                debug!(sender = %msg.sender_id, "dropping message flagged as spam");
                if notify {
                    let replies = self.replies.get();
                    self.send_reply(&msg.sender_id, &replies.spam_notice).await;
                }
                return Ok(());
            }
            Err(err) => {
                // Fail open: a broken scorer must not silence customers.
                warn!(error = %err, "spam scorer failed; processing message anyway");
            }
        }

        let record = MessageRecord {
            sender_id: msg.sender_id.clone(),
            direction: MessageDirection::Inbound,
            text: text.clone(),
            timestamp: msg.timestamp,
        };
        if let Err(err) = self.backend.record_message(&record).await {
            debug!(error = %err, "failed to record inbound message for audit");
        }

        if self.sessions.peek(&msg.sender_id).await.is_none() {
            self.ensure_customer(&msg.sender_id).await;
        }
        let mut session = self.sessions.load(&msg.sender_id).await;
        let reply = self.advance_dialogue(&mut session, msg, &text).await?;
        self.sessions.store(session).await;

        if let Some(text) = reply {
            self.send_reply(&msg.sender_id, &text).await;
        }
        Ok(())
    }

    /// Put the sender's dialogue into order confirmation.
    ///
    /// Idempotent per order id: a payload the sender has already run through
    /// confirmation is dropped without touching the dialogue.
    async fn begin_order_confirmation(
        &self,
        msg: &InboundMessage,
        payload: &OrderPayload,
    ) -> Result<(), ComandaError> {
        let mut session = self.sessions.load(&msg.sender_id).await;
        if session.processed_orders.contains(&payload.order_id) {
            debug!(
                sender = %msg.sender_id,
                order_id = payload.order_id,
                "ignoring confirmation payload for an already-processed order"
            );
            return Ok(());
        }

        info!(sender = %msg.sender_id, order_id = payload.order_id, "starting order confirmation");
        session.state = ConversationState::ConfirmingOrder;
        session.pending_order = Some(payload.order_id.clone());
        session.delivery_address = payload.delivery_address.clone();
        self.sessions.store(session).await;

        let replies = self.replies.get();
        let text = ReplySet::render(&replies.confirm_prompt, &[("order_id", &payload.order_id)]);
        self.send_reply(&msg.sender_id, &text).await;
        Ok(())
    }

    async fn advance_dialogue(
        &self,
        session: &mut UserSession,
        msg: &InboundMessage,
        text: &str,
    ) -> Result<Option<String>, ComandaError> {
        let class = classify_text(text);
        let replies = self.replies.get();
        debug!(sender = %session.sender_id, state = %session.state, ?class, "advancing dialogue");

        // A greeting abandons whatever flow was in progress.
        if class == InputClass::Greeting && session.state != ConversationState::Welcome {
            info!(sender = %session.sender_id, state = %session.state, "greeting resets dialogue");
            session.reset();
            return Ok(Some(replies.welcome.clone()));
        }

        match session.state {
            ConversationState::Welcome => self.on_welcome(session, &class, &replies).await,
            ConversationState::ConfirmingOrder => {
                self.on_confirming_order(session, &class, &replies).await
            }
            ConversationState::AwaitingAddress => self.on_address(session, text, &replies).await,
            ConversationState::SelectingPayment => {
                self.on_payment_choice(session, &class, &replies).await
            }
            ConversationState::AwaitingTransferProof => {
                self.on_transfer_proof(session, msg, &class, &replies).await
            }
            ConversationState::AwaitingComplaint => self.on_complaint(session, text, &replies).await,
        }
    }

    async fn on_welcome(
        &self,
        session: &mut UserSession,
        class: &InputClass,
        replies: &ReplySet,
    ) -> Result<Option<String>, ComandaError> {
        match class {
            InputClass::Greeting => Ok(Some(replies.welcome.clone())),
            InputClass::StatusCode(code) => {
                let order = self
                    .with_backend_retry("get_order_by_code", || self.backend.get_order_by_code(code))
                    .await?;
                match order {
                    Some(order) => Ok(Some(ReplySet::render(
                        &replies.status_update,
                        &[("code", code.as_str()), ("status", &order.status.to_string())],
                    ))),
                    None => Ok(Some(replies.status_unknown.clone())),
                }
            }
            InputClass::Complaint => {
                session.state = ConversationState::AwaitingComplaint;
                Ok(Some(replies.complaint_prompt.clone()))
            }
            _ => Ok(Some(replies.fallback.clone())),
        }
    }

    async fn on_confirming_order(
        &self,
        session: &mut UserSession,
        class: &InputClass,
        replies: &ReplySet,
    ) -> Result<Option<String>, ComandaError> {
        let order_id = match session.pending_order.clone() {
            Some(id) => id,
            None => {
                warn!(sender = %session.sender_id, "confirming state without a pending order");
                session.reset();
                return Ok(Some(replies.fallback.clone()));
            }
        };

        match class {
            InputClass::Affirmative => {
                let order = self
                    .with_backend_retry("get_order", || self.backend.get_order(&order_id))
                    .await?;
                let Some(order) = order else {
                    warn!(order_id, "pending order vanished; resetting dialogue");
                    session.reset();
                    return Ok(Some(replies.fallback.clone()));
                };
                if order.status.is_terminal() {
                    info!(order_id, status = %order.status, "order already closed; resetting dialogue");
                    session.reset();
                    return Ok(Some(replies.order_closed.clone()));
                }
                let update = OrderUpdate {
                    status: Some(OrderStatus::Confirmed),
                    ..Default::default()
                };
                self.with_backend_retry("update_order", || {
                    self.backend.update_order(&order_id, &update)
                })
                .await?;

                if session.delivery_address.is_some() || order.delivery_address.is_some() {
                    session.state = ConversationState::SelectingPayment;
                    Ok(Some(replies.ask_payment.clone()))
                } else {
                    session.state = ConversationState::AwaitingAddress;
                    Ok(Some(replies.ask_address.clone()))
                }
            }
            InputClass::Negative => {
                let update = OrderUpdate {
                    status: Some(OrderStatus::Cancelled),
                    ..Default::default()
                };
                self.with_backend_retry("update_order", || {
                    self.backend.update_order(&order_id, &update)
                })
                .await?;
                session.reset();
                Ok(Some(replies.order_cancelled.clone()))
            }
            _ => Ok(Some(ReplySet::render(
                &replies.confirm_prompt,
                &[("order_id", order_id.as_str())],
            ))),
        }
    }

    async fn on_address(
        &self,
        session: &mut UserSession,
        text: &str,
        replies: &ReplySet,
    ) -> Result<Option<String>, ComandaError> {
        let address = text.trim();
        if address.chars().count() < self.session_config.min_address_len {
            return Ok(Some(replies.address_too_short.clone()));
        }

        let order_id = match session.pending_order.clone() {
            Some(id) => id,
            None => {
                session.reset();
                return Ok(Some(replies.fallback.clone()));
            }
        };
        let update = OrderUpdate {
            delivery_address: Some(address.to_string()),
            ..Default::default()
        };
        self.with_backend_retry("update_order", || self.backend.update_order(&order_id, &update))
            .await?;
        self.remember_address(&session.sender_id, address).await;

        session.delivery_address = Some(address.to_string());
        session.state = ConversationState::SelectingPayment;
        Ok(Some(replies.ask_payment.clone()))
    }

    async fn on_payment_choice(
        &self,
        session: &mut UserSession,
        class: &InputClass,
        replies: &ReplySet,
    ) -> Result<Option<String>, ComandaError> {
        let order_id = match session.pending_order.clone() {
            Some(id) => id,
            None => {
                session.reset();
                return Ok(Some(replies.fallback.clone()));
            }
        };

        match class {
            InputClass::PaymentChoice(PaymentMethod::Cash) => {
                let update = OrderUpdate {
                    payment_method: Some(PaymentMethod::Cash),
                    ..Default::default()
                };
                self.with_backend_retry("update_order", || {
                    self.backend.update_order(&order_id, &update)
                })
                .await?;
                session.processed_orders.insert(order_id);
                session.reset();
                Ok(Some(replies.cash_confirmed.clone()))
            }
            InputClass::PaymentChoice(PaymentMethod::Transfer) => {
                let update = OrderUpdate {
                    payment_method: Some(PaymentMethod::Transfer),
                    status: Some(OrderStatus::AwaitingPayment),
                    ..Default::default()
                };
                self.with_backend_retry("update_order", || {
                    self.backend.update_order(&order_id, &update)
                })
                .await?;
                session.payment_method = Some(PaymentMethod::Transfer);
                session.state = ConversationState::AwaitingTransferProof;
                Ok(Some(replies.ask_transfer_proof.clone()))
            }
            InputClass::Negative => {
                let update = OrderUpdate {
                    status: Some(OrderStatus::Cancelled),
                    ..Default::default()
                };
                self.with_backend_retry("update_order", || {
                    self.backend.update_order(&order_id, &update)
                })
                .await?;
                session.reset();
                Ok(Some(replies.order_cancelled.clone()))
            }
            _ => Ok(Some(replies.ask_payment.clone())),
        }
    }

    async fn on_transfer_proof(
        &self,
        session: &mut UserSession,
        msg: &InboundMessage,
        class: &InputClass,
        replies: &ReplySet,
    ) -> Result<Option<String>, ComandaError> {
        let order_id = match session.pending_order.clone() {
            Some(id) => id,
            None => {
                session.reset();
                return Ok(Some(replies.fallback.clone()));
            }
        };

        if matches!(msg.content, MessageContent::Image { .. }) {
            let status = self
                .with_backend_retry("check_payment_status", || {
                    self.backend.check_payment_status(&order_id)
                })
                .await?;
            return match status {
                PaymentStatus::Approved => {
                    let update = OrderUpdate {
                        status: Some(OrderStatus::Paid),
                        ..Default::default()
                    };
                    self.with_backend_retry("update_order", || {
                        self.backend.update_order(&order_id, &update)
                    })
                    .await?;
                    session.processed_orders.insert(order_id);
                    session.reset();
                    Ok(Some(replies.payment_received.clone()))
                }
                PaymentStatus::Pending => Ok(Some(replies.payment_pending.clone())),
                PaymentStatus::Rejected => Ok(Some(replies.payment_rejected.clone())),
            };
        }

        if *class == InputClass::Negative {
            let update = OrderUpdate {
                status: Some(OrderStatus::Cancelled),
                ..Default::default()
            };
            self.with_backend_retry("update_order", || self.backend.update_order(&order_id, &update))
                .await?;
            session.reset();
            return Ok(Some(replies.order_cancelled.clone()));
        }

        Ok(Some(replies.ask_transfer_proof.clone()))
    }

    async fn on_complaint(
        &self,
        session: &mut UserSession,
        text: &str,
        replies: &ReplySet,
    ) -> Result<Option<String>, ComandaError> {
        self.with_backend_retry("record_complaint", || {
            self.backend.record_complaint(&session.sender_id, text)
        })
        .await?;
        session.reset();
        Ok(Some(replies.complaint_received.clone()))
    }

    // Helpers -----------------------------------------------------------

    /// Make sure the backend has a customer record for a first-contact
    /// sender. Best-effort: a persistence hiccup must not block the dialogue.
    async fn ensure_customer(&self, sender_id: &SenderId) {
        match self.backend.get_customer(sender_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                let customer = Customer {
                    id: sender_id.0.clone(),
                    sender_id: sender_id.clone(),
                    name: None,
                    default_address: None,
                };
                match self.backend.upsert_customer(&customer).await {
                    Ok(()) => info!(sender = %sender_id, "created customer record"),
                    Err(err) => debug!(error = %err, "failed to create customer record"),
                }
            }
            Err(err) => debug!(error = %err, "customer lookup failed"),
        }
    }

    /// Store a captured delivery address as the customer's default,
    /// creating the record if the sender has none yet.
    async fn remember_address(&self, sender_id: &SenderId, address: &str) {
        let customer = match self.backend.get_customer(sender_id).await {
            Ok(Some(mut customer)) => {
                customer.default_address = Some(address.to_string());
                customer
            }
            Ok(None) => Customer {
                id: sender_id.0.clone(),
                sender_id: sender_id.clone(),
                name: None,
                default_address: Some(address.to_string()),
            },
            Err(err) => {
                debug!(error = %err, "customer lookup failed");
                return;
            }
        };
        if let Err(err) = self.backend.upsert_customer(&customer).await {
            debug!(error = %err, "failed to update customer default address");
        }
    }

    /// Send a reply, dropping it with a log line when the transport is down,
    /// and record it for audit on success.
    async fn send_reply(&self, to: &SenderId, text: &str) {
        let msg = OutboundMessage {
            to: to.clone(),
            text: text.to_string(),
        };
        match self.connection.send(msg).await {
            Ok(_) => self.record_outbound(to, text).await,
            Err(err) => {
                counter!("comanda_replies_dropped_total").increment(1);
                warn!(to = %to, error = %err, "dropping reply");
            }
        }
    }

    async fn record_outbound(&self, to: &SenderId, text: &str) {
        let record = MessageRecord {
            sender_id: to.clone(),
            direction: MessageDirection::Outbound,
            text: text.to_string(),
            timestamp: chrono::Utc::now(),
        };
        if let Err(err) = self.backend.record_message(&record).await {
            debug!(error = %err, "failed to record outbound message for audit");
        }
    }

    /// Run one backend request with fixed-delay retries.
    async fn with_backend_retry<T, F, Fut>(
        &self,
        op: &'static str,
        request: F,
    ) -> Result<T, ComandaError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ComandaError>>,
    {
        let mut attempt = 0u32;
        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if attempt >= self.backend_config.max_retries {
                        return Err(err);
                    }
                    attempt += 1;
                    warn!(op, attempt, error = %err, "backend request failed; retrying");
                    sleep(Duration::from_secs(self.backend_config.retry_delay_secs)).await;
                }
            }
        }
    }
}

#[async_trait]
impl QueueProcessor for ConversationEngine {
    async fn process(&self, item: &QueueItem) -> Result<(), ComandaError> {
        counter!("comanda_messages_processed_total").increment(1);
        match self.handle_message(&item.msg).await {
            Ok(()) => Ok(()),
            Err(err) => {
                if item.attempts + 1 >= self.queue_config.max_attempts {
                    let replies = self.replies.get();
                    self.send_reply(&item.msg.sender_id, &replies.apology).await;
                }
                Err(err)
            }
        }
    }
}

/// Forward inbound transport messages onto the queue.
///
/// The configured operator sender is enqueued at operator priority;
/// everyone else is normal customer traffic.
pub fn spawn_inbound_pump(
    mut inbound: mpsc::Receiver<InboundMessage>,
    queue: MessageQueue,
    operator_sender: Option<String>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                msg = inbound.recv() => match msg {
                    Some(msg) => {
                        let priority = if operator_sender.as_deref() == Some(msg.sender_id.0.as_str()) {
                            Priority::Operator
                        } else {
                            Priority::Normal
                        };
                        queue.enqueue(msg, priority).await;
                    }
                    None => break,
                }
            }
        }
        debug!("inbound pump stopped");
    })
}
