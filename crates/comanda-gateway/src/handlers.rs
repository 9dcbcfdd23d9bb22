// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the operator REST API.
//!
//! Handles POST /v1/send, POST /v1/replies/reload, POST /v1/orders/notify,
//! POST /v1/payments/approved, and the public GET /health.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use comanda_core::error::ComandaError;
use comanda_core::types::{InboundMessage, MessageContent, OrderPayload, SenderId};
use comanda_engine::Priority;

use crate::server::GatewayState;

/// Request body for POST /v1/send.
#[derive(Debug, Deserialize)]
pub struct SendRequest {
    /// Recipient sender id (phone-style address).
    pub to: String,
    /// Message text.
    pub text: String,
}

/// Response body for POST /v1/send.
#[derive(Debug, Serialize)]
pub struct SendResponse {
    /// Transport-assigned message id.
    pub message_id: String,
}

/// Request body for POST /v1/orders/notify.
#[derive(Debug, Deserialize)]
pub struct OrderNotifyRequest {
    /// Customer the notification is for.
    pub sender_id: String,
    /// Status text to send as-is.
    pub text: String,
    /// When present, the dialogue also moves into order confirmation.
    #[serde(default)]
    pub order: Option<OrderPayload>,
}

/// Request body for POST /v1/payments/approved.
#[derive(Debug, Deserialize)]
pub struct PaymentApprovedRequest {
    /// Customer whose payment was approved.
    pub sender_id: String,
    /// Custom confirmation text; the default reply is used when absent.
    #[serde(default)]
    pub text: Option<String>,
}

/// Response body for GET /health.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Health status string.
    pub status: String,
    /// Binary version.
    pub version: String,
    /// Uptime in seconds.
    pub uptime_secs: u64,
    /// Current transport connection phase.
    pub connection: String,
    /// Messages waiting in the processing queue.
    pub queue_depth: usize,
    /// Dialogues currently held in memory.
    pub active_sessions: usize,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error description.
    pub error: String,
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

/// Map an engine error to an HTTP response.
///
/// Transport failures mean the phone line is down, not that the request was
/// bad, so they come back as 503.
fn engine_error(err: ComandaError) -> Response {
    let status = match &err {
        ComandaError::Transport { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ComandaError::Config(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.to_string())
}

/// GET /health
///
/// Public liveness endpoint for process supervisors.
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        connection: state.connection.status().phase.to_string(),
        queue_depth: state.queue.depth().await,
        active_sessions: state.engine.sessions().len().await,
    })
}

/// POST /v1/send
///
/// Send a free-form message to a customer on behalf of the operator.
pub async fn post_send(
    State(state): State<GatewayState>,
    Json(body): Json<SendRequest>,
) -> Response {
    if body.to.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "invalid sender");
    }

    match state
        .engine
        .send_message(SenderId(body.to), &body.text)
        .await
    {
        Ok(id) => (StatusCode::OK, Json(SendResponse { message_id: id.0 })).into_response(),
        Err(err) => engine_error(err),
    }
}

/// POST /v1/replies/reload
///
/// Swap in the reply catalog from disk without a restart.
pub async fn post_replies_reload(State(state): State<GatewayState>) -> Response {
    match state.engine.reload_replies() {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => engine_error(err),
    }
}

/// POST /v1/orders/notify
///
/// Send a status update to a customer. When an order payload is attached the
/// message is also injected into the queue at operator priority, which puts
/// the customer's dialogue into order confirmation.
pub async fn post_orders_notify(
    State(state): State<GatewayState>,
    Json(body): Json<OrderNotifyRequest>,
) -> Response {
    if body.sender_id.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "invalid sender");
    }
    let sender_id = SenderId(body.sender_id);

    if let Err(err) = state
        .engine
        .send_message(sender_id.clone(), &body.text)
        .await
    {
        return engine_error(err);
    }

    if let Some(order) = body.order {
        let msg = InboundMessage {
            id: uuid::Uuid::new_v4().to_string(),
            sender_id,
            content: MessageContent::Text(String::new()),
            timestamp: chrono::Utc::now(),
            order: Some(order),
        };
        state.queue.enqueue(msg, Priority::Operator).await;
    }

    StatusCode::ACCEPTED.into_response()
}

/// POST /v1/payments/approved
///
/// Mark the customer's pending order as paid and notify them.
pub async fn post_payments_approved(
    State(state): State<GatewayState>,
    Json(body): Json<PaymentApprovedRequest>,
) -> Response {
    if body.sender_id.trim().is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "invalid sender");
    }
    let sender_id = SenderId(body.sender_id);

    match state
        .engine
        .approve_payment(&sender_id, body.text.as_deref())
        .await
    {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => engine_error(err),
    }
}
