// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Collaborator traits consumed by the Comanda pipeline.
//!
//! The transport, persistence backend, and spam scorer are external
//! systems; the pipeline only ever talks to them through these traits.

pub mod backend;
pub mod spam;
pub mod transport;

pub use backend::BackendClient;
pub use spam::SpamScorer;
pub use transport::TransportAdapter;
