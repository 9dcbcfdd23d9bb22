// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the operator surface.

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use comanda_config::model::GatewayConfig;
use comanda_core::error::ComandaError;
use comanda_engine::{ConversationEngine, MessageQueue};
use comanda_transport::ConnectionHandle;

use crate::auth::{auth_middleware, AuthConfig};
use crate::handlers;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Engine carrying the operator surface.
    pub engine: Arc<ConversationEngine>,
    /// Processing queue, for injections and depth reporting.
    pub queue: MessageQueue,
    /// Handle to the transport connection, for phase reporting.
    pub connection: ConnectionHandle,
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
}

/// Build the gateway router: a public health route merged with
/// bearer-authenticated `/v1` operator routes.
pub fn build_router(state: GatewayState, auth: AuthConfig) -> Router {
    let public_routes = Router::new()
        .route("/health", get(handlers::get_health))
        .with_state(state.clone());

    let api_routes = Router::new()
        .route("/v1/send", post(handlers::post_send))
        .route("/v1/replies/reload", post(handlers::post_replies_reload))
        .route("/v1/orders/notify", post(handlers::post_orders_notify))
        .route(
            "/v1/payments/approved",
            post(handlers::post_payments_approved),
        )
        .route_layer(axum_middleware::from_fn_with_state(auth, auth_middleware))
        .with_state(state);

    Router::new()
        .merge(public_routes)
        .merge(api_routes)
        .layer(CorsLayer::permissive())
}

/// Start the gateway HTTP server and serve until cancelled.
pub async fn start_server(
    config: &GatewayConfig,
    state: GatewayState,
    cancel: CancellationToken,
) -> Result<(), ComandaError> {
    let auth = AuthConfig {
        bearer_token: config.bearer_token.clone(),
    };
    let app = build_router(state, auth);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| ComandaError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    tracing::info!("gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .map_err(|e| ComandaError::Internal(format!("gateway server error: {e}")))?;

    Ok(())
}
