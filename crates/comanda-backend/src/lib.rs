// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP collaborators for the Comanda ordering agent.
//!
//! [`HttpBackend`] talks to the restaurant's CRUD backend over REST and
//! implements both `BackendClient` and `SpamScorer`: spam scoring is a
//! backend endpoint, not a local model.

pub mod client;

pub use client::HttpBackend;
