// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock spam scorer with a programmable verdict.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use comanda_core::error::ComandaError;
use comanda_core::traits::SpamScorer;
use comanda_core::types::{SenderId, SpamVerdict};

/// A spam scorer that returns a fixed verdict and records what it saw.
pub struct MockSpamScorer {
    verdict: Mutex<SpamVerdict>,
    checked: Mutex<Vec<(SenderId, String)>>,
}

impl MockSpamScorer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            verdict: Mutex::new(SpamVerdict::Clean),
            checked: Mutex::new(Vec::new()),
        })
    }

    /// Set the verdict returned by subsequent checks.
    pub async fn set_verdict(&self, verdict: SpamVerdict) {
        *self.verdict.lock().await = verdict;
    }

    /// Every (sender, text) pair that was scored.
    pub async fn checked(&self) -> Vec<(SenderId, String)> {
        self.checked.lock().await.clone()
    }
}

#[async_trait]
impl SpamScorer for MockSpamScorer {
    async fn check(&self, sender_id: &SenderId, text: &str) -> Result<SpamVerdict, ComandaError> {
        self.checked
            .lock()
            .await
            .push((sender_id.clone(), text.to_string()));
        Ok(*self.verdict.lock().await)
    }
}
