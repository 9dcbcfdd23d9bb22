// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Backend collaborator trait for customer, order, and message persistence.

use async_trait::async_trait;

use crate::error::ComandaError;
use crate::types::{Customer, MessageRecord, Order, OrderUpdate, PaymentStatus, SenderId};

/// Request/response interface to the CRUD backend.
///
/// The backend owns all persistence; the engine only issues create/read/update
/// requests and never sees storage details. Payment-status checks go through
/// the same collaborator.
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Looks up a customer by sender identity.
    async fn get_customer(&self, sender_id: &SenderId) -> Result<Option<Customer>, ComandaError>;

    /// Creates or updates a customer record.
    async fn upsert_customer(&self, customer: &Customer) -> Result<(), ComandaError>;

    /// Fetches an order by backend id.
    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, ComandaError>;

    /// Fetches an order by its short 4-digit status code.
    async fn get_order_by_code(&self, code: &str) -> Result<Option<Order>, ComandaError>;

    /// Applies a partial update to an order.
    async fn update_order(&self, order_id: &str, update: &OrderUpdate) -> Result<(), ComandaError>;

    /// Records a conversation message for audit.
    async fn record_message(&self, record: &MessageRecord) -> Result<(), ComandaError>;

    /// Records a customer complaint.
    async fn record_complaint(&self, sender_id: &SenderId, text: &str) -> Result<(), ComandaError>;

    /// Checks the approval status of a payment reference.
    async fn check_payment_status(&self, reference: &str) -> Result<PaymentStatus, ComandaError>;
}
