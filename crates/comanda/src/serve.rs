// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `comanda serve` command implementation.
//!
//! Wires the bridge transport, connection manager, HTTP backend, conversation
//! engine, message queue, and operator gateway, then serves until SIGINT or
//! SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{info, warn};

use comanda_backend::HttpBackend;
use comanda_config::model::ComandaConfig;
use comanda_core::error::ComandaError;
use comanda_engine::{
    spawn_inbound_pump, ConversationEngine, MessageQueue, ReplyCatalog, SessionStore,
};
use comanda_gateway::GatewayState;
use comanda_transport::{BridgeTransport, ConnectionManager, ConnectionSignal, SessionBlobStore};

use crate::shutdown;

/// Runs the `comanda serve` command.
pub async fn run_serve(config: ComandaConfig) -> Result<(), ComandaError> {
    init_tracing(&config.agent.log_level);
    info!(agent = config.agent.name.as_str(), "starting comanda serve");

    let cancel = shutdown::install_signal_handler();

    let transport = Arc::new(BridgeTransport::new(config.connection.bridge_addr.clone()));
    let blobs = SessionBlobStore::new(PathBuf::from(&config.connection.session_blob_dir));
    let manager = ConnectionManager::new(transport, blobs, config.connection.clone())
        .with_cancellation(cancel.clone());
    let (handle, inbound, manager_task) = manager.start();

    // Pairing codes must reach the operator even with logging filtered down.
    let mut signals = handle.signals();
    tokio::spawn(async move {
        while let Ok(signal) = signals.recv().await {
            if let ConnectionSignal::ScanCode(code) = signal {
                println!("scan to pair: {code}");
            }
        }
    });

    let backend = Arc::new(HttpBackend::new(&config.backend)?);
    let sessions = SessionStore::new(config.session.clone());
    let replies = ReplyCatalog::from_config(&config.replies)?;

    let engine = ConversationEngine::new(
        backend.clone(),
        backend,
        handle.clone(),
        sessions,
        replies,
        &config,
    );
    engine.spawn_sweeper(cancel.clone());
    let queue = MessageQueue::new(config.queue.clone(), engine.clone());
    spawn_inbound_pump(
        inbound,
        queue.clone(),
        config.session.operator_sender.clone(),
        cancel.clone(),
    );

    let state = GatewayState {
        engine,
        queue,
        connection: handle,
        start_time: std::time::Instant::now(),
    };
    let gateway_result = comanda_gateway::start_server(&config.gateway, state, cancel.clone()).await;

    // The gateway returning means shutdown (or a bind failure); either way
    // bring the connection manager down with us.
    cancel.cancel();
    if let Err(err) = manager_task.await {
        warn!(error = %err, "connection manager task ended abnormally");
    }
    gateway_result?;

    info!("comanda serve shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("comanda={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
