// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport connection lifecycle management.
//!
//! The connection manager owns the single messaging transport link: it opens
//! the connection, pumps transport events, classifies disconnects, schedules
//! reconnects with linear backoff, and wipes the opaque session blob when the
//! persisted session can no longer be trusted (logout, repeated stream
//! desync, decode-error budget exhaustion, or a pairing challenge nobody
//! scanned).
//!
//! Everything above this crate talks to the connection through a cheap
//! [`ConnectionHandle`]: current status via a watch channel, lifecycle
//! signals via a broadcast channel, and outbound sends that fail fast while
//! the link is down.

pub mod blob;
pub mod bridge;
pub mod classify;
pub mod manager;

pub use blob::SessionBlobStore;
pub use bridge::BridgeTransport;
pub use classify::{classify_disconnect, DisconnectClass};
pub use manager::{
    ConnectionHandle, ConnectionManager, ConnectionPhase, ConnectionSignal, ConnectionStatus,
};
