// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end conversation engine tests.
//!
//! Messages enter through the mock transport, flow through the connection
//! manager, the inbound pump, and the queue, and replies are asserted on the
//! transport's captured sends. All tests run on a paused clock.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use comanda_config::model::ComandaConfig;
use comanda_core::types::{
    Customer, InboundMessage, MessageContent, Order, OrderPayload, OrderStatus, PaymentMethod,
    PaymentStatus, SenderId, SpamVerdict, TransportEvent,
};
use comanda_engine::{
    spawn_inbound_pump, ConversationEngine, ConversationState, MessageQueue, Priority,
    ReplyCatalog, ReplySet,
};
use comanda_test_utils::{MockBackend, MockSpamScorer, MockTransport};
use comanda_transport::{ConnectionHandle, ConnectionManager, SessionBlobStore};

struct Harness {
    _tmp: tempfile::TempDir,
    transport: Arc<MockTransport>,
    backend: Arc<MockBackend>,
    spam: Arc<MockSpamScorer>,
    engine: Arc<ConversationEngine>,
    queue: MessageQueue,
    handle: ConnectionHandle,
    cancel: CancellationToken,
    replies: ReplySet,
}

impl Harness {
    async fn new(mut config: ComandaConfig) -> Self {
        let tmp = tempfile::tempdir().unwrap();
        config.connection.session_blob_dir =
            tmp.path().join("session").to_string_lossy().into_owned();

        let cancel = CancellationToken::new();
        let transport = MockTransport::new();
        let blobs = SessionBlobStore::new(tmp.path().join("session"));
        let manager = ConnectionManager::new(transport.clone(), blobs, config.connection.clone())
            .with_cancellation(cancel.clone());
        let (handle, inbound, _task) = manager.start();

        let backend = MockBackend::new();
        let spam = MockSpamScorer::new();
        let sessions = comanda_engine::SessionStore::new(config.session.clone());
        let catalog = ReplyCatalog::with_defaults();
        let engine = ConversationEngine::new(
            backend.clone(),
            spam.clone(),
            handle.clone(),
            sessions,
            catalog,
            &config,
        );
        let queue = MessageQueue::new(config.queue.clone(), engine.clone());
        spawn_inbound_pump(
            inbound,
            queue.clone(),
            config.session.operator_sender.clone(),
            cancel.clone(),
        );

        transport.push_event(TransportEvent::Opened).await;
        let harness = Self {
            _tmp: tmp,
            transport,
            backend,
            spam,
            engine,
            queue,
            handle,
            cancel,
            replies: ReplySet::default(),
        };
        harness.settle().await;
        assert!(harness.handle.is_connected());
        harness
    }

    async fn default() -> Self {
        Self::new(ComandaConfig::default()).await
    }

    /// Let queued work, retries, and backoffs run to rest on the paused clock.
    async fn settle(&self) {
        tokio::time::sleep(Duration::from_secs(30)).await;
    }

    async fn say(&self, sender: &str, text: &str) {
        self.transport
            .push_event(TransportEvent::Message(text_msg(sender, text)))
            .await;
        self.settle().await;
    }

    async fn send_image(&self, sender: &str) {
        self.transport
            .push_event(TransportEvent::Message(InboundMessage {
                id: uuid::Uuid::new_v4().to_string(),
                sender_id: SenderId(sender.to_string()),
                content: MessageContent::Image { caption: None },
                timestamp: chrono::Utc::now(),
                order: None,
            }))
            .await;
        self.settle().await;
    }

    async fn sent_texts(&self) -> Vec<String> {
        self.transport
            .sent_messages()
            .await
            .into_iter()
            .map(|m| m.text)
            .collect()
    }

    async fn last_sent(&self) -> String {
        self.sent_texts().await.pop().expect("no messages sent")
    }

    fn stop(&self) {
        self.cancel.cancel();
    }
}

fn text_msg(sender: &str, text: &str) -> InboundMessage {
    InboundMessage {
        id: uuid::Uuid::new_v4().to_string(),
        sender_id: SenderId(sender.to_string()),
        content: MessageContent::Text(text.to_string()),
        timestamp: chrono::Utc::now(),
        order: None,
    }
}

fn seeded_order(id: &str, sender: &str, address: Option<&str>) -> Order {
    Order {
        id: id.to_string(),
        code: None,
        sender_id: SenderId(sender.to_string()),
        status: OrderStatus::Pending,
        delivery_address: address.map(str::to_string),
        payment_method: None,
    }
}

/// Enqueue an operator-injected order confirmation for a sender.
async fn inject_confirmation(h: &Harness, sender: &str, order_id: &str) {
    let mut msg = text_msg(sender, "");
    msg.order = Some(OrderPayload {
        order_id: order_id.to_string(),
        delivery_address: None,
    });
    h.queue.enqueue(msg, Priority::Operator).await;
    h.settle().await;
}

#[tokio::test(start_paused = true)]
async fn greeting_gets_welcome_reply() {
    let h = Harness::default().await;
    h.say("5215550001", "hola").await;

    assert_eq!(h.last_sent().await, h.replies.welcome);
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn status_code_reports_order_state() {
    let h = Harness::default().await;
    let mut order = seeded_order("order-1", "5215550001", None);
    order.code = Some("4821".to_string());
    order.status = OrderStatus::Delivering;
    h.backend.insert_order(order).await;

    h.say("5215550001", "4821").await;
    let reply = h.last_sent().await;
    assert!(reply.contains("4821"));
    assert!(reply.contains(&OrderStatus::Delivering.to_string()));

    h.say("5215550001", "9999").await;
    assert_eq!(h.last_sent().await, h.replies.status_unknown);
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn transfer_flow_runs_to_paid() {
    let h = Harness::default().await;
    let sender = "5215550001";
    h.backend
        .insert_order(seeded_order("order-1", sender, None))
        .await;
    h.backend
        .insert_customer(Customer {
            id: "cust-1".to_string(),
            sender_id: SenderId(sender.to_string()),
            name: Some("Ana".to_string()),
            default_address: None,
        })
        .await;

    inject_confirmation(&h, sender, "order-1").await;
    assert!(h.last_sent().await.contains("order-1"));

    h.say(sender, "sí").await;
    assert_eq!(h.last_sent().await, h.replies.ask_address);
    assert_eq!(
        h.backend.order("order-1").await.unwrap().status,
        OrderStatus::Confirmed
    );

    h.say(sender, "Av. Siempre Viva 742, Col. Centro").await;
    assert_eq!(h.last_sent().await, h.replies.ask_payment);
    assert_eq!(
        h.backend.order("order-1").await.unwrap().delivery_address.as_deref(),
        Some("Av. Siempre Viva 742, Col. Centro")
    );

    h.say(sender, "transferencia").await;
    assert_eq!(h.last_sent().await, h.replies.ask_transfer_proof);
    let order = h.backend.order("order-1").await.unwrap();
    assert_eq!(order.status, OrderStatus::AwaitingPayment);
    assert_eq!(order.payment_method, Some(PaymentMethod::Transfer));

    h.backend.set_payment_status(PaymentStatus::Approved).await;
    h.send_image(sender).await;
    assert_eq!(h.last_sent().await, h.replies.payment_received);
    assert_eq!(
        h.backend.order("order-1").await.unwrap().status,
        OrderStatus::Paid
    );

    let session = h
        .engine
        .sessions()
        .peek(&SenderId(sender.to_string()))
        .await
        .unwrap();
    assert_eq!(session.state, ConversationState::Welcome);
    assert!(session.pending_order.is_none());
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn pending_transfer_keeps_waiting() {
    let h = Harness::default().await;
    let sender = "5215550001";
    h.backend
        .insert_order(seeded_order("order-1", sender, Some("Calle Falsa 123")))
        .await;

    inject_confirmation(&h, sender, "order-1").await;
    h.say(sender, "sí").await;
    h.say(sender, "transferencia").await;

    h.backend.set_payment_status(PaymentStatus::Pending).await;
    h.send_image(sender).await;
    assert_eq!(h.last_sent().await, h.replies.payment_pending);

    let session = h
        .engine
        .sessions()
        .peek(&SenderId(sender.to_string()))
        .await
        .unwrap();
    assert_eq!(session.state, ConversationState::AwaitingTransferProof);
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn cash_flow_skips_address_when_order_has_one() {
    let h = Harness::default().await;
    let sender = "5215550001";
    h.backend
        .insert_order(seeded_order("order-1", sender, Some("Calle Falsa 123")))
        .await;

    inject_confirmation(&h, sender, "order-1").await;
    h.say(sender, "sí").await;
    // The order already carries an address: straight to payment.
    assert_eq!(h.last_sent().await, h.replies.ask_payment);

    h.say(sender, "efectivo").await;
    assert_eq!(h.last_sent().await, h.replies.cash_confirmed);
    let order = h.backend.order("order-1").await.unwrap();
    assert_eq!(order.payment_method, Some(PaymentMethod::Cash));
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn resending_a_processed_payload_does_not_retrigger() {
    let h = Harness::default().await;
    let sender = "5215550001";
    h.backend
        .insert_order(seeded_order("order-1", sender, None))
        .await;

    inject_confirmation(&h, sender, "order-1").await;
    h.say(sender, "sí").await;
    h.say(sender, "Calle Falsa 123").await;
    h.say(sender, "efectivo").await;
    assert_eq!(h.last_sent().await, h.replies.cash_confirmed);

    // The same payload again: no prompt, dialogue stays at rest.
    let sent_before = h.sent_texts().await.len();
    inject_confirmation(&h, sender, "order-1").await;

    assert_eq!(h.sent_texts().await.len(), sent_before);
    let session = h
        .engine
        .sessions()
        .peek(&SenderId(sender.to_string()))
        .await
        .unwrap();
    assert_eq!(session.state, ConversationState::Welcome);
    assert!(session.pending_order.is_none());
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn payload_address_skips_the_address_step() {
    let h = Harness::default().await;
    let sender = "5215550001";
    h.backend
        .insert_order(seeded_order("order-1", sender, None))
        .await;

    let mut msg = text_msg(sender, "");
    msg.order = Some(OrderPayload {
        order_id: "order-1".to_string(),
        delivery_address: Some("Av. Corrientes 1234".to_string()),
    });
    h.queue.enqueue(msg, Priority::Operator).await;
    h.settle().await;

    h.say(sender, "sí").await;
    assert_eq!(h.last_sent().await, h.replies.ask_payment);
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn greeting_resets_a_mid_flow_dialogue() {
    let h = Harness::default().await;
    let sender = "5215550001";
    h.backend
        .insert_order(seeded_order("order-1", sender, None))
        .await;

    inject_confirmation(&h, sender, "order-1").await;
    h.say(sender, "hola").await;

    // Not a re-prompt: the greeting abandons the confirmation.
    assert_eq!(h.last_sent().await, h.replies.welcome);
    let session = h
        .engine
        .sessions()
        .peek(&SenderId(sender.to_string()))
        .await
        .unwrap();
    assert_eq!(session.state, ConversationState::Welcome);
    assert!(session.pending_order.is_none());
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn greeting_resets_while_awaiting_address() {
    let h = Harness::default().await;
    let sender = "5215550001";
    h.backend
        .insert_order(seeded_order("order-1", sender, None))
        .await;

    inject_confirmation(&h, sender, "order-1").await;
    h.say(sender, "sí").await;
    assert_eq!(h.last_sent().await, h.replies.ask_address);

    h.say(sender, "hola").await;
    assert_eq!(h.last_sent().await, h.replies.welcome);
    let session = h
        .engine
        .sessions()
        .peek(&SenderId(sender.to_string()))
        .await
        .unwrap();
    assert_eq!(session.state, ConversationState::Welcome);
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn closed_order_resets_instead_of_reconfirming() {
    let h = Harness::default().await;
    let sender = "5215550001";
    let mut order = seeded_order("order-1", sender, None);
    order.status = OrderStatus::Cancelled;
    h.backend.insert_order(order).await;

    // The order was closed out-of-band between the notify and the reply.
    inject_confirmation(&h, sender, "order-1").await;
    h.say(sender, "sí").await;

    assert_eq!(h.last_sent().await, h.replies.order_closed);
    assert_eq!(
        h.backend.order("order-1").await.unwrap().status,
        OrderStatus::Cancelled
    );
    let session = h
        .engine
        .sessions()
        .peek(&SenderId(sender.to_string()))
        .await
        .unwrap();
    assert_eq!(session.state, ConversationState::Welcome);
    assert!(session.pending_order.is_none());
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn first_contact_creates_a_customer_record() {
    let h = Harness::default().await;
    let sender = "5215550001";
    assert!(h.backend.customer(sender).await.is_none());

    h.say(sender, "hola").await;

    let customer = h.backend.customer(sender).await.unwrap();
    assert_eq!(customer.sender_id, SenderId(sender.to_string()));
    assert!(customer.default_address.is_none());
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn captured_address_becomes_customer_default() {
    let h = Harness::default().await;
    let sender = "5215550001";
    h.backend
        .insert_order(seeded_order("order-1", sender, None))
        .await;

    inject_confirmation(&h, sender, "order-1").await;
    h.say(sender, "sí").await;
    h.say(sender, "Av. Siempre Viva 742").await;

    let customer = h.backend.customer(sender).await.unwrap();
    assert_eq!(
        customer.default_address.as_deref(),
        Some("Av. Siempre Viva 742")
    );
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn declining_confirmation_cancels_the_order() {
    let h = Harness::default().await;
    let sender = "5215550001";
    h.backend
        .insert_order(seeded_order("order-1", sender, None))
        .await;

    inject_confirmation(&h, sender, "order-1").await;
    h.say(sender, "no").await;

    assert_eq!(h.last_sent().await, h.replies.order_cancelled);
    assert_eq!(
        h.backend.order("order-1").await.unwrap().status,
        OrderStatus::Cancelled
    );
    let session = h
        .engine
        .sessions()
        .peek(&SenderId(sender.to_string()))
        .await
        .unwrap();
    assert_eq!(session.state, ConversationState::Welcome);
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn short_address_is_rejected_until_long_enough() {
    let h = Harness::default().await;
    let sender = "5215550001";
    h.backend
        .insert_order(seeded_order("order-1", sender, None))
        .await;

    inject_confirmation(&h, sender, "order-1").await;
    h.say(sender, "sí").await;
    h.say(sender, "corta").await;
    assert_eq!(h.last_sent().await, h.replies.address_too_short);

    h.say(sender, "Av. Reforma 1234, CDMX").await;
    assert_eq!(h.last_sent().await, h.replies.ask_payment);
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn complaint_is_recorded_and_dialogue_resets() {
    let h = Harness::default().await;
    let sender = "5215550001";

    h.say(sender, "queja").await;
    assert_eq!(h.last_sent().await, h.replies.complaint_prompt);

    h.say(sender, "la pizza llegó fría").await;
    assert_eq!(h.last_sent().await, h.replies.complaint_received);

    let complaints = h.backend.complaints().await;
    assert_eq!(complaints.len(), 1);
    assert_eq!(complaints[0].1, "la pizza llegó fría");
    let session = h
        .engine
        .sessions()
        .peek(&SenderId(sender.to_string()))
        .await
        .unwrap();
    assert_eq!(session.state, ConversationState::Welcome);
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn flagged_spam_is_dropped_silently() {
    let h = Harness::default().await;
    h.spam
        .set_verdict(SpamVerdict::Flagged { notify: false })
        .await;

    h.say("5215550001", "hola").await;
    assert!(h.sent_texts().await.is_empty());
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn flagged_spam_with_notify_warns_once() {
    let h = Harness::default().await;
    h.spam
        .set_verdict(SpamVerdict::Flagged { notify: true })
        .await;

    h.say("5215550001", "hola").await;
    assert_eq!(h.sent_texts().await, vec![h.replies.spam_notice.clone()]);
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn throttled_sender_is_notified_once() {
    let mut config = ComandaConfig::default();
    // Each harness step settles 30 simulated seconds; the window must span
    // all four messages for the budget to bite.
    config.rate_limit.window_secs = 600;
    config.rate_limit.max_messages = 2;
    config.rate_limit.min_spacing_secs = 0;
    let h = Harness::new(config).await;
    let sender = "5215550001";

    for _ in 0..4 {
        h.say(sender, "hola").await;
    }

    let sent = h.sent_texts().await;
    // Two welcomes, then a single throttle notice; the fourth is silent.
    assert_eq!(
        sent,
        vec![
            h.replies.welcome.clone(),
            h.replies.welcome.clone(),
            h.replies.throttle_notice.clone(),
        ]
    );
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn unsupported_content_gets_fallback() {
    let h = Harness::default().await;
    h.transport
        .push_event(TransportEvent::Message(InboundMessage {
            id: "m1".to_string(),
            sender_id: SenderId("5215550001".to_string()),
            content: MessageContent::Unsupported,
            timestamp: chrono::Utc::now(),
            order: None,
        }))
        .await;
    h.settle().await;

    assert_eq!(h.last_sent().await, h.replies.fallback);
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn persistent_backend_failure_ends_in_apology() {
    let h = Harness::default().await;
    h.backend
        .insert_order(seeded_order("order-1", "5215550001", None))
        .await;
    h.backend.fail_next_requests(100).await;

    // Status lookup needs the backend, fails through every retry of every
    // queue attempt; the sender gets one apology when the item is dropped.
    h.say("5215550001", "4821").await;
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert_eq!(h.sent_texts().await, vec![h.replies.apology.clone()]);
    assert_eq!(h.queue.depth().await, 0);
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn payment_approval_finalizes_waiting_dialogue() {
    let h = Harness::default().await;
    let sender = "5215550001";
    h.backend
        .insert_order(seeded_order("order-1", sender, Some("Calle Falsa 123")))
        .await;
    inject_confirmation(&h, sender, "order-1").await;
    h.say(sender, "sí").await;
    h.say(sender, "transferencia").await;

    h.engine
        .approve_payment(&SenderId(sender.to_string()), None)
        .await
        .unwrap();

    assert_eq!(
        h.backend.order("order-1").await.unwrap().status,
        OrderStatus::Paid
    );
    assert_eq!(h.last_sent().await, h.replies.payment_received);
    let session = h
        .engine
        .sessions()
        .peek(&SenderId(sender.to_string()))
        .await
        .unwrap();
    assert_eq!(session.state, ConversationState::Welcome);
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn approval_lands_while_a_message_is_in_flight() {
    let h = Harness::default().await;
    let sender = "5215550001";
    h.backend
        .insert_order(seeded_order("order-1", sender, Some("Calle Falsa 123")))
        .await;
    inject_confirmation(&h, sender, "order-1").await;
    h.say(sender, "sí").await;
    h.say(sender, "transferencia").await;

    // An inbound text races the operator approval; whichever side runs
    // second must still see the other's session writes.
    h.transport
        .push_event(TransportEvent::Message(text_msg(sender, "gracias")))
        .await;
    h.engine
        .approve_payment(&SenderId(sender.to_string()), None)
        .await
        .unwrap();
    h.settle().await;

    assert_eq!(
        h.backend.order("order-1").await.unwrap().status,
        OrderStatus::Paid
    );
    let session = h
        .engine
        .sessions()
        .peek(&SenderId(sender.to_string()))
        .await
        .unwrap();
    assert_eq!(session.state, ConversationState::Welcome);
    assert!(session.processed_orders.contains("order-1"));
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn payment_approval_without_dialogue_just_messages() {
    let h = Harness::default().await;
    let sender = SenderId("5215550001".to_string());

    h.engine
        .approve_payment(&sender, Some("tu pago quedó registrado"))
        .await
        .unwrap();
    assert_eq!(h.last_sent().await, "tu pago quedó registrado");
    h.stop();
}

#[tokio::test(start_paused = true)]
async fn idle_session_is_swept_and_sender_starts_over() {
    let h = Harness::default().await;
    let sender = "5215550001";
    let sweeper = h.engine.spawn_sweeper(h.cancel.clone());

    h.backend
        .insert_order(seeded_order("order-1", sender, None))
        .await;
    inject_confirmation(&h, sender, "order-1").await;
    assert_eq!(h.engine.sessions().len().await, 1);

    // Default max idle is 1800s; two sweep intervals past that clears it.
    tokio::time::sleep(Duration::from_secs(2500)).await;
    assert_eq!(h.engine.sessions().len().await, 0);

    // The next contact starts a fresh dialogue at the top.
    h.say(sender, "hola").await;
    assert_eq!(h.last_sent().await, h.replies.welcome);
    let session = h
        .engine
        .sessions()
        .peek(&SenderId(sender.to_string()))
        .await
        .unwrap();
    assert_eq!(session.state, ConversationState::Welcome);
    assert!(session.processed_orders.is_empty());

    h.stop();
    sweeper.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn operator_send_message_is_audited() {
    let h = Harness::default().await;
    let to = SenderId("5215550001".to_string());

    h.engine.send_message(to.clone(), "tu pedido va en camino").await.unwrap();

    assert_eq!(h.last_sent().await, "tu pedido va en camino");
    let records = h.backend.recorded_messages().await;
    assert!(records
        .iter()
        .any(|r| r.sender_id == to && r.text == "tu pedido va en camino"));
    h.stop();
}
