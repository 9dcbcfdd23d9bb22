// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for the restaurant CRUD backend.
//!
//! Handles request construction, bearer authentication, and transient error
//! retry (429 and 5xx, plus network failures) with a fixed delay between
//! attempts. Not-found lookups map to `Ok(None)`, never to errors.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use comanda_config::model::BackendConfig;
use comanda_core::error::ComandaError;
use comanda_core::traits::{BackendClient, SpamScorer};
use comanda_core::types::{
    Customer, MessageRecord, Order, OrderUpdate, PaymentStatus, SenderId, SpamVerdict,
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client for backend communication.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    max_retries: u32,
    retry_delay: Duration,
}

#[derive(Debug, Serialize)]
struct ComplaintRequest<'a> {
    sender_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct PaymentStatusResponse {
    status: PaymentStatus,
}

#[derive(Debug, Serialize)]
struct SpamCheckRequest<'a> {
    sender_id: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SpamCheckResponse {
    verdict: String,
    #[serde(default)]
    notify: bool,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self, ComandaError> {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        if let Some(api_key) = &config.api_key {
            let value = HeaderValue::from_str(&format!("Bearer {api_key}"))
                .map_err(|e| ComandaError::Config(format!("invalid API key header value: {e}")))?;
            headers.insert("authorization", value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ComandaError::Backend {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_retries: config.max_retries,
            retry_delay: Duration::from_secs(config.retry_delay_secs),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url.trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Execute a request with transient-error retry. Success and 404 come
    /// back as responses; everything else is an error after retries.
    async fn execute<F>(&self, op: &'static str, build: F) -> Result<reqwest::Response, ComandaError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0u32;
        loop {
            if attempt > 0 {
                warn!(op, attempt, "retrying backend request after transient error");
                tokio::time::sleep(self.retry_delay).await;
            }

            let result = build().send().await;
            match result {
                Ok(response) => {
                    let status = response.status();
                    debug!(op, status = %status, attempt, "backend response received");
                    if status.is_success() || status == StatusCode::NOT_FOUND {
                        return Ok(response);
                    }
                    let transient = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
                    if !transient || attempt >= self.max_retries {
                        let body = response.text().await.unwrap_or_default();
                        return Err(ComandaError::Backend {
                            message: format!("{op} failed with status {status}: {body}"),
                            source: None,
                        });
                    }
                }
                Err(err) => {
                    if attempt >= self.max_retries {
                        return Err(ComandaError::Backend {
                            message: format!("{op} request failed: {err}"),
                            source: Some(Box::new(err)),
                        });
                    }
                    warn!(op, error = %err, "backend request failed; will retry");
                }
            }
            attempt += 1;
        }
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(
        op: &'static str,
        response: reqwest::Response,
    ) -> Result<T, ComandaError> {
        response.json().await.map_err(|e| ComandaError::Backend {
            message: format!("{op} returned malformed JSON: {e}"),
            source: Some(Box::new(e)),
        })
    }
}

#[async_trait]
impl BackendClient for HttpBackend {
    async fn get_customer(&self, sender_id: &SenderId) -> Result<Option<Customer>, ComandaError> {
        let url = self.url(&format!("/customers/{sender_id}"));
        let response = self
            .execute("get_customer", || self.client.get(&url))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::parse_json("get_customer", response).await?))
    }

    async fn upsert_customer(&self, customer: &Customer) -> Result<(), ComandaError> {
        let url = self.url(&format!("/customers/{}", customer.sender_id));
        self.execute("upsert_customer", || self.client.put(&url).json(customer))
            .await?;
        Ok(())
    }

    async fn get_order(&self, order_id: &str) -> Result<Option<Order>, ComandaError> {
        let url = self.url(&format!("/orders/{order_id}"));
        let response = self.execute("get_order", || self.client.get(&url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::parse_json("get_order", response).await?))
    }

    async fn get_order_by_code(&self, code: &str) -> Result<Option<Order>, ComandaError> {
        let url = self.url(&format!("/orders/by-code/{code}"));
        let response = self
            .execute("get_order_by_code", || self.client.get(&url))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(Self::parse_json("get_order_by_code", response).await?))
    }

    async fn update_order(&self, order_id: &str, update: &OrderUpdate) -> Result<(), ComandaError> {
        let url = self.url(&format!("/orders/{order_id}"));
        let response = self
            .execute("update_order", || self.client.patch(&url).json(update))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(ComandaError::Backend {
                message: format!("update_order: unknown order {order_id}"),
                source: None,
            });
        }
        Ok(())
    }

    async fn record_message(&self, record: &MessageRecord) -> Result<(), ComandaError> {
        let url = self.url("/messages");
        self.execute("record_message", || self.client.post(&url).json(record))
            .await?;
        Ok(())
    }

    async fn record_complaint(&self, sender_id: &SenderId, text: &str) -> Result<(), ComandaError> {
        let url = self.url("/complaints");
        let body = ComplaintRequest {
            sender_id: &sender_id.0,
            text,
        };
        self.execute("record_complaint", || self.client.post(&url).json(&body))
            .await?;
        Ok(())
    }

    async fn check_payment_status(&self, reference: &str) -> Result<PaymentStatus, ComandaError> {
        let url = self.url(&format!("/payments/{reference}/status"));
        let response = self
            .execute("check_payment_status", || self.client.get(&url))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            // No payment on file yet for this reference.
            return Ok(PaymentStatus::Pending);
        }
        let parsed: PaymentStatusResponse =
            Self::parse_json("check_payment_status", response).await?;
        Ok(parsed.status)
    }
}

#[async_trait]
impl SpamScorer for HttpBackend {
    async fn check(&self, sender_id: &SenderId, text: &str) -> Result<SpamVerdict, ComandaError> {
        let url = self.url("/spam/check");
        let body = SpamCheckRequest {
            sender_id: &sender_id.0,
            text,
        };
        let response = self
            .execute("spam_check", || self.client.post(&url).json(&body))
            .await?;
        let parsed: SpamCheckResponse = Self::parse_json("spam_check", response).await?;
        if parsed.verdict == "clean" {
            Ok(SpamVerdict::Clean)
        } else {
            Ok(SpamVerdict::Flagged {
                notify: parsed.notify,
            })
        }
    }
}
