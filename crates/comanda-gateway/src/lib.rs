// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP operator control surface.
//!
//! Exposes the restaurant staff's side of the agent as a small REST API:
//! free-form sends, reply-catalog reload, order-confirmation injection, and
//! payment approval. Everything under `/v1` requires bearer authentication;
//! `/health` is public for liveness probes.

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::AuthConfig;
pub use server::{build_router, start_server, GatewayState};
