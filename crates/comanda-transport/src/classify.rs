// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Disconnect classification.
//!
//! The transport reports closure intent as a tagged [`DisconnectKind`]; this
//! module folds those kinds into the four classes the reconnect policy acts
//! on. Classification never inspects error message text.

use comanda_core::types::DisconnectKind;
use serde::Serialize;
use strum::Display;

/// Policy class of a connection closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DisconnectClass {
    /// The persisted session is invalid; wipe it and pair fresh.
    Terminal,
    /// Protocol/stream desync; corruption when seen twice in a row.
    Desync,
    /// Recoverable network-level failure; retry with backoff.
    Transient,
    /// Unclassified closure; handled like a transient failure.
    Unknown,
}

/// Map a transport-reported disconnect kind onto a policy class.
pub fn classify_disconnect(kind: DisconnectKind) -> DisconnectClass {
    match kind {
        DisconnectKind::LoggedOut => DisconnectClass::Terminal,
        DisconnectKind::StreamDesync => DisconnectClass::Desync,
        DisconnectKind::ConnectionLost | DisconnectKind::TimedOut | DisconnectKind::Replaced => {
            DisconnectClass::Transient
        }
        DisconnectKind::Unknown => DisconnectClass::Unknown,
    }
}
