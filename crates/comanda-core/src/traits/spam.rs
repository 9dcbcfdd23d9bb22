// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Spam-scoring collaborator trait.

use async_trait::async_trait;

use crate::error::ComandaError;
use crate::types::{SenderId, SpamVerdict};

/// Verdict-returning spam scorer.
///
/// Scoring internals are out of scope; the engine consumes a single verdict
/// per message and drops flagged messages before they reach a session.
#[async_trait]
pub trait SpamScorer: Send + Sync {
    /// Scores one inbound message.
    async fn check(&self, sender_id: &SenderId, text: &str) -> Result<SpamVerdict, ComandaError>;
}
