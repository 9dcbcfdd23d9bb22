// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-zero capacities and valid bind addresses.

use thiserror::Error;

use crate::model::ComandaConfig;

/// A configuration error surfaced to the operator at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML/env sources could not be parsed or merged.
    #[error("failed to load configuration: {0}")]
    Load(#[from] figment::Error),

    /// A semantic constraint on a loaded value failed.
    #[error("invalid configuration: {message}")]
    Validation { message: String },
}

/// Print configuration errors to stderr, one per line.
pub fn render_errors(errors: &[ConfigError]) {
    for error in errors {
        eprintln!("error: {error}");
    }
}

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ComandaConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.queue.capacity == 0 {
        errors.push(ConfigError::Validation {
            message: "queue.capacity must be at least 1".to_string(),
        });
    }

    if config.queue.max_attempts == 0 {
        errors.push(ConfigError::Validation {
            message: "queue.max_attempts must be at least 1".to_string(),
        });
    }

    if config.rate_limit.max_messages == 0 {
        errors.push(ConfigError::Validation {
            message: "rate_limit.max_messages must be at least 1".to_string(),
        });
    }

    if config.rate_limit.window_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "rate_limit.window_secs must be at least 1".to_string(),
        });
    }

    if config.session.max_idle_secs < config.session.sweep_interval_secs {
        errors.push(ConfigError::Validation {
            message: format!(
                "session.max_idle_secs ({}) must not be shorter than session.sweep_interval_secs ({})",
                config.session.max_idle_secs, config.session.sweep_interval_secs
            ),
        });
    }

    if config.connection.decode_error_budget == 0 {
        errors.push(ConfigError::Validation {
            message: "connection.decode_error_budget must be at least 1".to_string(),
        });
    }

    if config.connection.session_blob_dir.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "connection.session_blob_dir must not be empty".to_string(),
        });
    }

    if config.connection.bridge_addr.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ConfigError::Validation {
            message: format!(
                "connection.bridge_addr ({}) must be a host:port socket address",
                config.connection.bridge_addr
            ),
        });
    }

    if config.backend.base_url.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "backend.base_url must not be empty".to_string(),
        });
    }

    let host = config.gateway.host.trim();
    if host.is_empty() {
        errors.push(ConfigError::Validation {
            message: "gateway.host must not be empty".to_string(),
        });
    } else {
        let is_valid_ip = host.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = host
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!("gateway.host `{host}` is not a valid IP address or hostname"),
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
