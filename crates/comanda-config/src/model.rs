// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Comanda ordering agent.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Comanda configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ComandaConfig {
    /// Agent identity and logging settings.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Transport connection lifecycle settings.
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Inbound message queue settings.
    #[serde(default)]
    pub queue: QueueConfig,

    /// Per-sender rate limiting settings.
    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    /// Conversation session settings.
    #[serde(default)]
    pub session: SessionConfig,

    /// CRUD backend collaborator settings.
    #[serde(default)]
    pub backend: BackendConfig,

    /// Reply catalog settings.
    #[serde(default)]
    pub replies: RepliesConfig,

    /// Operator control surface settings.
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Agent identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Display name of the agent.
    #[serde(default = "default_agent_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_agent_name() -> String {
    "comanda".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Transport connection lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Address of the bridge sidecar that speaks the wire protocol.
    #[serde(default = "default_bridge_addr")]
    pub bridge_addr: String,

    /// Seconds the pairing watchdog waits before aborting an unscanned challenge.
    #[serde(default = "default_pairing_watchdog_secs")]
    pub pairing_watchdog_secs: u64,

    /// Restart delay after a terminal logout, in seconds.
    #[serde(default = "default_restart_short_secs")]
    pub restart_short_secs: u64,

    /// Restart delay after detected session corruption, in seconds.
    #[serde(default = "default_restart_medium_secs")]
    pub restart_medium_secs: u64,

    /// Restart delay after exhausting transient retries, in seconds.
    #[serde(default = "default_restart_long_secs")]
    pub restart_long_secs: u64,

    /// Base delay for the linear transient-retry backoff, in seconds.
    #[serde(default = "default_retry_base_secs")]
    pub retry_base_secs: u64,

    /// Transient reconnect attempts before wiping and backing off long.
    #[serde(default = "default_max_transient_retries")]
    pub max_transient_retries: u32,

    /// Suppressed decode failures tolerated before a forced session wipe.
    #[serde(default = "default_decode_error_budget")]
    pub decode_error_budget: u32,

    /// Minimum seconds between decode-failure log lines.
    #[serde(default = "default_decode_log_interval_secs")]
    pub decode_log_interval_secs: u64,

    /// Minimum seconds between credential persistence writes.
    #[serde(default = "default_credential_debounce_secs")]
    pub credential_debounce_secs: u64,

    /// Directory holding the opaque transport session blob.
    #[serde(default = "default_session_blob_dir")]
    pub session_blob_dir: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            bridge_addr: default_bridge_addr(),
            pairing_watchdog_secs: default_pairing_watchdog_secs(),
            restart_short_secs: default_restart_short_secs(),
            restart_medium_secs: default_restart_medium_secs(),
            restart_long_secs: default_restart_long_secs(),
            retry_base_secs: default_retry_base_secs(),
            max_transient_retries: default_max_transient_retries(),
            decode_error_budget: default_decode_error_budget(),
            decode_log_interval_secs: default_decode_log_interval_secs(),
            credential_debounce_secs: default_credential_debounce_secs(),
            session_blob_dir: default_session_blob_dir(),
        }
    }
}

fn default_bridge_addr() -> String {
    "127.0.0.1:8920".to_string()
}

fn default_pairing_watchdog_secs() -> u64 {
    60
}

fn default_restart_short_secs() -> u64 {
    2
}

fn default_restart_medium_secs() -> u64 {
    15
}

fn default_restart_long_secs() -> u64 {
    60
}

fn default_retry_base_secs() -> u64 {
    3
}

fn default_max_transient_retries() -> u32 {
    3
}

fn default_decode_error_budget() -> u32 {
    50
}

fn default_decode_log_interval_secs() -> u64 {
    30
}

fn default_credential_debounce_secs() -> u64 {
    5
}

fn default_session_blob_dir() -> String {
    dirs::data_dir()
        .map(|p| p.join("comanda").join("session"))
        .unwrap_or_else(|| std::path::PathBuf::from("session"))
        .to_string_lossy()
        .into_owned()
}

/// Inbound message queue configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueueConfig {
    /// Maximum queued items before oldest-item eviction.
    #[serde(default = "default_queue_capacity")]
    pub capacity: usize,

    /// Processing attempts per item before it is dropped.
    #[serde(default = "default_queue_max_attempts")]
    pub max_attempts: u32,

    /// Base retry backoff in milliseconds, multiplied by the attempt count.
    #[serde(default = "default_queue_retry_base_ms")]
    pub retry_base_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: default_queue_capacity(),
            max_attempts: default_queue_max_attempts(),
            retry_base_ms: default_queue_retry_base_ms(),
        }
    }
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_queue_max_attempts() -> u32 {
    3
}

fn default_queue_retry_base_ms() -> u64 {
    500
}

/// Per-sender rate limiting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimitConfig {
    /// Sliding window length in seconds.
    #[serde(default = "default_rate_window_secs")]
    pub window_secs: u64,

    /// Messages admitted per sender within the window.
    #[serde(default = "default_rate_max_messages")]
    pub max_messages: usize,

    /// Minimum seconds between admitted messages from one sender.
    #[serde(default = "default_rate_min_spacing_secs")]
    pub min_spacing_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            window_secs: default_rate_window_secs(),
            max_messages: default_rate_max_messages(),
            min_spacing_secs: default_rate_min_spacing_secs(),
        }
    }
}

fn default_rate_window_secs() -> u64 {
    60
}

fn default_rate_max_messages() -> usize {
    20
}

fn default_rate_min_spacing_secs() -> u64 {
    2
}

/// Conversation session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Seconds between idle-session sweep runs.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Seconds of inactivity before a session is evicted.
    #[serde(default = "default_max_idle_secs")]
    pub max_idle_secs: u64,

    /// Minimum characters for a delivery address to be accepted.
    #[serde(default = "default_min_address_len")]
    pub min_address_len: usize,

    /// Sender id whose messages are enqueued at priority. `None` disables.
    #[serde(default)]
    pub operator_sender: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sweep_interval_secs: default_sweep_interval_secs(),
            max_idle_secs: default_max_idle_secs(),
            min_address_len: default_min_address_len(),
            operator_sender: None,
        }
    }
}

fn default_sweep_interval_secs() -> u64 {
    300
}

fn default_max_idle_secs() -> u64 {
    1800
}

fn default_min_address_len() -> usize {
    8
}

/// CRUD backend collaborator configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    /// Base URL of the backend REST API.
    #[serde(default = "default_backend_base_url")]
    pub base_url: String,

    /// API key sent as a bearer token. `None` disables auth headers.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Transient-error retries per backend request.
    #[serde(default = "default_backend_max_retries")]
    pub max_retries: u32,

    /// Fixed delay between backend retries, in seconds.
    #[serde(default = "default_backend_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: default_backend_base_url(),
            api_key: None,
            max_retries: default_backend_max_retries(),
            retry_delay_secs: default_backend_retry_delay_secs(),
        }
    }
}

fn default_backend_base_url() -> String {
    "http://127.0.0.1:8080".to_string()
}

fn default_backend_max_retries() -> u32 {
    2
}

fn default_backend_retry_delay_secs() -> u64 {
    1
}

/// Reply catalog configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RepliesConfig {
    /// Path to the TOML reply catalog. `None` uses compiled defaults.
    #[serde(default)]
    pub catalog_path: Option<String>,
}

impl Default for RepliesConfig {
    fn default() -> Self {
        Self { catalog_path: None }
    }
}

/// Operator control surface configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Host address to bind.
    #[serde(default = "default_gateway_host")]
    pub host: String,

    /// Port to bind.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token for operator requests. `None` rejects every `/v1` call.
    #[serde(default)]
    pub bearer_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_gateway_host(),
            port: default_gateway_port(),
            bearer_token: None,
        }
    }
}

fn default_gateway_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8410
}
