// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport adapter trait for the messaging connection.

use async_trait::async_trait;

use crate::error::ComandaError;
use crate::types::{MessageId, OutboundMessage, TransportEvent};

/// Adapter for the single messaging transport connection.
///
/// The connection manager owns the lifecycle: it calls [`open`](TransportAdapter::open),
/// pumps [`next_event`](TransportAdapter::next_event) until the transport reports a
/// closure, and decides when to wipe the persisted session blob. The blob
/// itself is opaque to everything above the adapter: the manager deletes it
/// as a unit, never parses it.
#[async_trait]
pub trait TransportAdapter: Send + Sync {
    /// Begins a connection attempt. Events (pairing challenge, open, close)
    /// are reported through [`next_event`](TransportAdapter::next_event).
    async fn open(&self) -> Result<(), ComandaError>;

    /// Tears down the current connection, if any.
    async fn close(&self) -> Result<(), ComandaError>;

    /// Sends a message over the open connection.
    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, ComandaError>;

    /// Returns the next transport event. Pending until one is available.
    async fn next_event(&self) -> Result<TransportEvent, ComandaError>;

    /// Writes the current connection credentials to the session blob.
    async fn persist_credentials(&self) -> Result<(), ComandaError>;
}
