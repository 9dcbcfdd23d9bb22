// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Comanda ordering agent.
//!
//! This crate provides the foundational trait definitions, error types, and
//! common types used throughout the Comanda workspace. The transport,
//! persistence backend, and spam scorer implement traits defined here.

pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::ComandaError;
pub use types::{
    DisconnectKind, DisconnectReason, InboundMessage, MessageContent, MessageId, OutboundMessage,
    SenderId, TransportEvent,
};

pub use traits::{BackendClient, SpamScorer, TransportAdapter};
