// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message processing for the Comanda ordering agent.
//!
//! This crate owns everything between the transport and the collaborators:
//! the bounded priority queue, per-sender rate limiting, in-memory
//! conversation sessions, the reply catalog, and the conversation engine
//! that ties them together.

pub mod classify;
pub mod engine;
pub mod queue;
pub mod ratelimit;
pub mod replies;
pub mod session;

pub use classify::{classify_text, InputClass};
pub use engine::{spawn_inbound_pump, ConversationEngine};
pub use queue::{MessageQueue, Priority, QueueItem, QueueProcessor};
pub use ratelimit::{Admission, RateLimiter};
pub use replies::{ReplyCatalog, ReplySet};
pub use session::{ConversationState, SessionStore, UserSession};
