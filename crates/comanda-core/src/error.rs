// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Comanda ordering agent.

use thiserror::Error;

/// The primary error type used across all Comanda collaborator traits and core operations.
#[derive(Debug, Error)]
pub enum ComandaError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport-level failures (connect failure, send while disconnected, stream errors).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Backend collaborator failures (CRUD request failure, payment-status lookup failure).
    #[error("backend error: {message}")]
    Backend {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Message rejected by the per-sender rate limiter.
    #[error("rate limited: {sender_id}")]
    RateLimited { sender_id: String },

    /// Message rejected by the spam scorer.
    #[error("spam rejected: {sender_id}")]
    SpamRejected { sender_id: String },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}
