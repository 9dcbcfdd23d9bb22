// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across collaborator traits and the Comanda pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Stable external identifier for a conversation partner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SenderId(pub String);

impl std::fmt::Display for SenderId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a message on the transport.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

/// Content of an inbound message, reduced to what the conversation engine cares about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MessageContent {
    /// Plain text body.
    Text(String),
    /// Image attachment (payment proof), with optional caption.
    Image { caption: Option<String> },
    /// Anything the transport decoded but the engine does not handle.
    Unsupported,
}

/// An order-confirmation payload attached to an externally-sourced message.
///
/// Customer messages never carry this; it is injected by the operator
/// surface when a new order needs confirmation over chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPayload {
    /// Backend order id to confirm.
    pub order_id: String,
    /// Delivery address already captured at order time, if any.
    pub delivery_address: Option<String>,
}

/// An inbound message received from the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub sender_id: SenderId,
    pub content: MessageContent,
    pub timestamp: DateTime<Utc>,
    /// Present only on operator-injected order confirmations.
    #[serde(default)]
    pub order: Option<OrderPayload>,
}

/// An outbound message to be sent through the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: SenderId,
    pub text: String,
}

/// Why the transport reported a closed connection.
///
/// The transport signals intent explicitly; the connection manager never
/// inspects error message text to decide behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize)]
pub enum DisconnectKind {
    /// Explicit logout; the persisted session is no longer valid.
    LoggedOut,
    /// Protocol/stream desync on close.
    StreamDesync,
    /// Network-level connection loss.
    ConnectionLost,
    /// Another client took over the session.
    Replaced,
    /// Handshake or keepalive timeout.
    TimedOut,
    /// The transport could not classify the closure.
    Unknown,
}

/// Tagged closure reason reported with `TransportEvent::Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectReason {
    pub code: Option<u16>,
    pub kind: DisconnectKind,
}

/// Events emitted by a transport adapter.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// One-time pairing code the operator must acknowledge out-of-band.
    PairingChallenge(String),
    /// The connection is open and messages may flow.
    Opened,
    /// The connection closed, with a tagged reason.
    Closed(DisconnectReason),
    /// Connection credentials changed and should be persisted.
    CredentialsChanged,
    /// A frame failed to decode; suppressed and counted by the manager.
    DecodeFailure(String),
    /// An inbound customer message.
    Message(InboundMessage),
}

/// Payment methods a customer may choose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Transfer,
}

/// Approval status returned by the payment-check collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Approved,
    Pending,
    Rejected,
}

/// Lifecycle status of an order in the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Confirmed,
    AwaitingPayment,
    Paid,
    Preparing,
    Delivering,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Terminal statuses end the order cycle and reset the conversation.
    pub fn is_terminal(self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

/// A customer record in the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub id: String,
    pub sender_id: SenderId,
    pub name: Option<String>,
    pub default_address: Option<String>,
}

/// An order record in the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    /// Short 4-digit pickup/status code customers may quote over chat.
    pub code: Option<String>,
    pub sender_id: SenderId,
    pub status: OrderStatus,
    pub delivery_address: Option<String>,
    pub payment_method: Option<PaymentMethod>,
}

/// Partial update applied to an order via the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<OrderStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
}

/// Direction of a recorded conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    Inbound,
    Outbound,
}

/// A conversation message persisted to the backend for audit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageRecord {
    pub sender_id: SenderId,
    pub direction: MessageDirection,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Verdict returned by the spam-scoring collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpamVerdict {
    /// Message may be processed.
    Clean,
    /// Message must be dropped; `notify` requests a single warning reply.
    Flagged { notify: bool },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn disconnect_kind_display_round_trip() {
        let kinds = [
            DisconnectKind::LoggedOut,
            DisconnectKind::StreamDesync,
            DisconnectKind::ConnectionLost,
            DisconnectKind::Replaced,
            DisconnectKind::TimedOut,
            DisconnectKind::Unknown,
        ];
        for kind in kinds {
            let s = kind.to_string();
            assert_eq!(DisconnectKind::from_str(&s).unwrap(), kind);
        }
    }

    #[test]
    fn order_status_terminal() {
        assert!(OrderStatus::Delivered.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
        assert!(!OrderStatus::Confirmed.is_terminal());
        assert!(!OrderStatus::AwaitingPayment.is_terminal());
    }

    #[test]
    fn payment_method_parses_lowercase() {
        assert_eq!(PaymentMethod::from_str("cash").unwrap(), PaymentMethod::Cash);
        assert_eq!(
            PaymentMethod::from_str("transfer").unwrap(),
            PaymentMethod::Transfer
        );
    }

    #[test]
    fn inbound_message_order_payload_defaults_none() {
        let json = serde_json::json!({
            "id": "m1",
            "sender_id": "5215550001",
            "content": {"Text": "hola"},
            "timestamp": "2026-03-01T12:00:00Z",
        });
        let msg: InboundMessage = serde_json::from_value(json).unwrap();
        assert!(msg.order.is_none());
        assert_eq!(msg.sender_id.0, "5215550001");
    }

    #[test]
    fn order_update_skips_unset_fields() {
        let update = OrderUpdate {
            status: Some(OrderStatus::Confirmed),
            ..Default::default()
        };
        let json = serde_json::to_string(&update).unwrap();
        assert!(json.contains("confirmed"));
        assert!(!json.contains("delivery_address"));
    }
}
