// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./comanda.toml` > `~/.config/comanda/comanda.toml`
//! > `/etc/comanda/comanda.toml` with environment variable overrides via the
//! `COMANDA_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ComandaConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/comanda/comanda.toml` (system-wide)
/// 3. `~/.config/comanda/comanda.toml` (user XDG config)
/// 4. `./comanda.toml` (local directory)
/// 5. `COMANDA_*` environment variables
pub fn load_config() -> Result<ComandaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ComandaConfig::default()))
        .merge(Toml::file("/etc/comanda/comanda.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("comanda/comanda.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("comanda.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<ComandaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ComandaConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ComandaConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ComandaConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names. For example, `COMANDA_RATE_LIMIT_MAX_MESSAGES`
/// must map to `rate_limit.max_messages`, not `rate.limit.max.messages`.
fn env_provider() -> Env {
    Env::prefixed("COMANDA_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: COMANDA_QUEUE_CAPACITY -> "queue_capacity"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("connection_", "connection.", 1)
            .replacen("queue_", "queue.", 1)
            .replacen("rate_limit_", "rate_limit.", 1)
            .replacen("session_", "session.", 1)
            .replacen("backend_", "backend.", 1)
            .replacen("replies_", "replies.", 1)
            .replacen("gateway_", "gateway.", 1);
        mapped.into()
    })
}
