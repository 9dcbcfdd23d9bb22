// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory mock backend for engine tests.
//!
//! `MockBackend` implements `BackendClient` over tokio mutex maps, with an
//! injectable failure budget so retry paths can be exercised.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use comanda_core::error::ComandaError;
use comanda_core::traits::BackendClient;
use comanda_core::types::{
    Customer, MessageRecord, Order, OrderUpdate, PaymentStatus, SenderId,
};

/// A mock CRUD backend for testing the conversation engine.
pub struct MockBackend {
    customers: Mutex<HashMap<String, Customer>>,
    orders: Mutex<HashMap<String, Order>>,
    messages: Mutex<Vec<MessageRecord>>,
    complaints: Mutex<Vec<(SenderId, String)>>,
    payment_status: Mutex<PaymentStatus>,
    fail_remaining: Mutex<u32>,
}

impl MockBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            customers: Mutex::new(HashMap::new()),
            orders: Mutex::new(HashMap::new()),
            messages: Mutex::new(Vec::new()),
            complaints: Mutex::new(Vec::new()),
            payment_status: Mutex::new(PaymentStatus::Pending),
            fail_remaining: Mutex::new(0),
        })
    }

    /// Seed a customer record.
    pub async fn insert_customer(&self, customer: Customer) {
        self.customers
            .lock()
            .await
            .insert(customer.sender_id.0.clone(), customer);
    }

    /// Seed an order record.
    pub async fn insert_order(&self, order: Order) {
        self.orders.lock().await.insert(order.id.clone(), order);
    }

    /// Set the status returned by `check_payment_status`.
    pub async fn set_payment_status(&self, status: PaymentStatus) {
        *self.payment_status.lock().await = status;
    }

    /// Make the next `n` backend calls fail with a transient error.
    pub async fn fail_next_requests(&self, n: u32) {
        *self.fail_remaining.lock().await = n;
    }

    /// Fetch an order as currently stored.
    pub async fn order(&self, order_id: &str) -> Option<Order> {
        self.orders.lock().await.get(order_id).cloned()
    }

    /// Fetch a customer as currently stored.
    pub async fn customer(&self, sender: &str) -> Option<Customer> {
        self.customers.lock().await.get(sender).cloned()
    }

    /// All recorded audit messages.
    pub async fn recorded_messages(&self) -> Vec<MessageRecord> {
        self.messages.lock().await.clone()
    }

    /// All recorded complaints.
    pub async fn complaints(&self) -> Vec<(SenderId, String)> {
        self.complaints.lock().await.clone()
    }

    async fn maybe_fail(&self, op: &str) -> Result<(), ComandaError> {
        let mut remaining = self.fail_remaining.lock().await;
        if *remaining > 0 {
            *remaining -= 1;
            return Err(ComandaError::Backend {
                message: format!("injected failure in {op}"),
                source: None,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl BackendClient for MockBackend {
    async fn get_customer(&self, sender_id: &SenderId) -> Result<Option<Customer>, ComandaError> {
        self.maybe_fail("get_customer").await?;
        Ok(self.customers.lock().await.get(&sender_id.0).cloned())
    }

    async fn upsert_customer(&self, customer: &Customer) -> Result<(), ComandaError> {
        self.maybe_fail("upsert_customer").await?;
        self.customers
            .lock()
            .await
            .insert(customer.sender_id.0.clone(), customer.clone());
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, ComandaError> {
        self.maybe_fail("get_order").await?;
        Ok(self.orders.lock().await.get(order_id).cloned())
    }

    async fn get_order_by_code(&self, code: &str) -> Result<Option<Order>, ComandaError> {
        self.maybe_fail("get_order_by_code").await?;
        Ok(self
            .orders
            .lock()
            .await
            .values()
            .find(|o| o.code.as_deref() == Some(code))
            .cloned())
    }

    async fn update_order(&self, order_id: &str, update: &OrderUpdate) -> Result<(), ComandaError> {
        self.maybe_fail("update_order").await?;
        let mut orders = self.orders.lock().await;
        let order = orders
            .get_mut(order_id)
            .ok_or_else(|| ComandaError::Backend {
                message: format!("unknown order {order_id}"),
                source: None,
            })?;
        if let Some(status) = update.status {
            order.status = status;
        }
        if let Some(address) = &update.delivery_address {
            order.delivery_address = Some(address.clone());
        }
        if let Some(method) = update.payment_method {
            order.payment_method = Some(method);
        }
        Ok(())
    }

    async fn record_message(&self, record: &MessageRecord) -> Result<(), ComandaError> {
        self.maybe_fail("record_message").await?;
        self.messages.lock().await.push(record.clone());
        Ok(())
    }

    async fn record_complaint(&self, sender_id: &SenderId, text: &str) -> Result<(), ComandaError> {
        self.maybe_fail("record_complaint").await?;
        self.complaints
            .lock()
            .await
            .push((sender_id.clone(), text.to_string()));
        Ok(())
    }

    async fn check_payment_status(&self, _reference: &str) -> Result<PaymentStatus, ComandaError> {
        self.maybe_fail("check_payment_status").await?;
        Ok(*self.payment_status.lock().await)
    }
}
