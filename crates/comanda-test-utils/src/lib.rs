// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Comanda integration tests.
//!
//! Provides mock collaborators for fast, deterministic, CI-runnable tests
//! without external services.
//!
//! # Components
//!
//! - [`MockTransport`] - Scripted transport adapter with event injection and send capture
//! - [`MockBackend`] - In-memory backend with injectable failures
//! - [`MockSpamScorer`] - Spam scorer with a programmable verdict

pub mod mock_backend;
pub mod mock_spam;
pub mod mock_transport;

pub use mock_backend::MockBackend;
pub use mock_spam::MockSpamScorer;
pub use mock_transport::MockTransport;
