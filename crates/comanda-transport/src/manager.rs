// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection manager: lifecycle state machine and reconnect policy.
//!
//! A single background task owns the transport. It drives the connection
//! through `Connecting -> AwaitingScan -> Connected` and reacts to closures
//! according to their [`DisconnectClass`]:
//!
//! - `Terminal` (logout): wipe the session blob, restart after the short
//!   delay so the operator gets a fresh pairing challenge.
//! - `Desync` twice in a row: treat the session as corrupted, wipe, restart
//!   after the medium delay.
//! - `Transient`/`Unknown`: linear backoff (`retry_base * attempt`); after
//!   `max_transient_retries` consecutive failures, wipe and restart after
//!   the long delay.
//!
//! Decode failures never tear the connection down on their own; they are
//! counted against a budget and only a blown budget forces a wipe. A pairing
//! challenge arms a watchdog: if nobody completes pairing before it fires,
//! the stale challenge state is wiped and the cycle restarts.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use strum::Display;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant, Sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use comanda_config::model::ConnectionConfig;
use comanda_core::error::ComandaError;
use comanda_core::traits::TransportAdapter;
use comanda_core::types::{
    DisconnectKind, DisconnectReason, InboundMessage, MessageId, OutboundMessage, TransportEvent,
};

use crate::blob::SessionBlobStore;
use crate::classify::{classify_disconnect, DisconnectClass};

const SIGNAL_CHANNEL_CAPACITY: usize = 64;
const INBOUND_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle phase of the transport connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    AwaitingScan,
    Connected,
    Closing,
}

/// Snapshot of the connection published through the status watch channel.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub phase: ConnectionPhase,
    /// Consecutive failed reconnect attempts since the last open connection.
    pub reconnect_attempts: u32,
    pub last_disconnect: Option<DisconnectClass>,
}

impl ConnectionStatus {
    fn initial() -> Self {
        Self {
            phase: ConnectionPhase::Disconnected,
            reconnect_attempts: 0,
            last_disconnect: None,
        }
    }
}

/// Lifecycle signal broadcast to interested subscribers.
#[derive(Debug, Clone)]
pub enum ConnectionSignal {
    /// A pairing code the operator must complete out-of-band.
    ScanCode(String),
    Connected,
    Disconnected {
        class: DisconnectClass,
        code: Option<u16>,
    },
}

/// Cheap clonable handle onto the running connection task.
#[derive(Clone)]
pub struct ConnectionHandle {
    transport: Arc<dyn TransportAdapter>,
    status_rx: watch::Receiver<ConnectionStatus>,
    signal_tx: broadcast::Sender<ConnectionSignal>,
    cancel: CancellationToken,
}

impl ConnectionHandle {
    /// Current connection status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.status_rx.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.status_rx.borrow().phase == ConnectionPhase::Connected
    }

    /// Subscribe to lifecycle signals.
    pub fn signals(&self) -> broadcast::Receiver<ConnectionSignal> {
        self.signal_tx.subscribe()
    }

    /// Watch receiver for status changes.
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Send a message over the transport.
    ///
    /// Fails fast when the connection is not open; callers decide whether
    /// the message is dropped or retried.
    pub async fn send(&self, msg: OutboundMessage) -> Result<MessageId, ComandaError> {
        if !self.is_connected() {
            return Err(ComandaError::Transport {
                message: format!("transport not connected; dropping send to {}", msg.to),
                source: None,
            });
        }
        self.transport.send(msg).await
    }

    /// Request the connection task to stop.
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

/// Owns the transport and spawns the lifecycle task.
pub struct ConnectionManager {
    transport: Arc<dyn TransportAdapter>,
    blobs: SessionBlobStore,
    config: ConnectionConfig,
    cancel: CancellationToken,
}

impl ConnectionManager {
    pub fn new(
        transport: Arc<dyn TransportAdapter>,
        blobs: SessionBlobStore,
        config: ConnectionConfig,
    ) -> Self {
        Self {
            transport,
            blobs,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Use an external cancellation token instead of a fresh one.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Spawn the lifecycle task.
    ///
    /// Returns the handle, the inbound message stream, and the task join
    /// handle (resolves once the task has shut down).
    pub fn start(
        self,
    ) -> (
        ConnectionHandle,
        mpsc::Receiver<InboundMessage>,
        JoinHandle<()>,
    ) {
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::initial());
        let (signal_tx, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);

        let handle = ConnectionHandle {
            transport: self.transport.clone(),
            status_rx,
            signal_tx: signal_tx.clone(),
            cancel: self.cancel.clone(),
        };

        let task = ManagerTask {
            transport: self.transport,
            blobs: self.blobs,
            config: self.config,
            cancel: self.cancel,
            status_tx,
            signal_tx,
            inbound_tx,
            retries: 0,
            last_close: None,
            decode_errors: 0,
            decode_last_logged: None,
            creds_persisted_at: None,
        };

        let join = tokio::spawn(task.run());
        (handle, inbound_rx, join)
    }
}

/// What ended one connection attempt.
enum PumpOutcome {
    /// Cancellation was requested.
    Stopped,
    /// The transport reported a closure.
    Closed(DisconnectReason),
    /// The pairing watchdog fired before the connection opened.
    WatchdogExpired,
    /// Suppressed decode failures exceeded the budget.
    DecodeBudgetExceeded,
}

struct ManagerTask {
    transport: Arc<dyn TransportAdapter>,
    blobs: SessionBlobStore,
    config: ConnectionConfig,
    cancel: CancellationToken,
    status_tx: watch::Sender<ConnectionStatus>,
    signal_tx: broadcast::Sender<ConnectionSignal>,
    inbound_tx: mpsc::Sender<InboundMessage>,
    retries: u32,
    last_close: Option<DisconnectClass>,
    decode_errors: u32,
    decode_last_logged: Option<Instant>,
    creds_persisted_at: Option<Instant>,
}

impl ManagerTask {
    async fn run(mut self) {
        info!(blob_dir = %self.blobs.dir().display(), "connection manager started");
        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            self.set_phase(ConnectionPhase::Connecting);

            let outcome = match self.transport.open().await {
                Ok(()) => self.pump().await,
                Err(err) => {
                    warn!(error = %err, "transport open failed");
                    PumpOutcome::Closed(DisconnectReason {
                        code: None,
                        kind: DisconnectKind::ConnectionLost,
                    })
                }
            };

            let delay = match outcome {
                PumpOutcome::Stopped => break,
                PumpOutcome::Closed(reason) => self.handle_closed(reason).await,
                PumpOutcome::WatchdogExpired => {
                    self.wipe_session().await;
                    self.reset_failure_state();
                    Duration::from_secs(self.config.restart_short_secs)
                }
                PumpOutcome::DecodeBudgetExceeded => {
                    self.wipe_session().await;
                    self.reset_failure_state();
                    Duration::from_secs(self.config.restart_medium_secs)
                }
            };

            self.set_phase(ConnectionPhase::Disconnected);
            debug!(delay_secs = delay.as_secs(), "scheduling reconnect");
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = sleep(delay) => {}
            }
        }
        self.set_phase(ConnectionPhase::Disconnected);
        info!("connection manager stopped");
    }

    /// Pump transport events until the connection ends one way or another.
    async fn pump(&mut self) -> PumpOutcome {
        let mut watchdog: Pin<Box<Sleep>> = Box::pin(sleep(Duration::ZERO));
        let mut watchdog_armed = false;
        let mut persist_timer: Pin<Box<Sleep>> = Box::pin(sleep(Duration::ZERO));
        let mut persist_pending = false;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    if persist_pending {
                        self.persist_credentials().await;
                    }
                    if let Err(err) = self.transport.close().await {
                        debug!(error = %err, "transport close on shutdown failed");
                    }
                    return PumpOutcome::Stopped;
                }
                _ = watchdog.as_mut(), if watchdog_armed => {
                    warn!(
                        timeout_secs = self.config.pairing_watchdog_secs,
                        "pairing challenge not completed before watchdog fired"
                    );
                    if let Err(err) = self.transport.close().await {
                        debug!(error = %err, "transport close after watchdog failed");
                    }
                    return PumpOutcome::WatchdogExpired;
                }
                _ = persist_timer.as_mut(), if persist_pending => {
                    persist_pending = false;
                    self.persist_credentials().await;
                }
                event = self.transport.next_event() => match event {
                    Ok(TransportEvent::PairingChallenge(code)) => {
                        info!("pairing challenge received");
                        self.set_phase(ConnectionPhase::AwaitingScan);
                        watchdog.as_mut().reset(
                            Instant::now() + Duration::from_secs(self.config.pairing_watchdog_secs),
                        );
                        watchdog_armed = true;
                        let _ = self.signal_tx.send(ConnectionSignal::ScanCode(code));
                    }
                    Ok(TransportEvent::Opened) => {
                        info!("transport connection open");
                        watchdog_armed = false;
                        self.retries = 0;
                        self.decode_errors = 0;
                        self.status_tx.send_modify(|s| {
                            s.phase = ConnectionPhase::Connected;
                            s.reconnect_attempts = 0;
                        });
                        let _ = self.signal_tx.send(ConnectionSignal::Connected);
                    }
                    Ok(TransportEvent::Closed(reason)) => {
                        if persist_pending {
                            self.persist_credentials().await;
                        }
                        return PumpOutcome::Closed(reason);
                    }
                    Ok(TransportEvent::CredentialsChanged) => {
                        let debounce = Duration::from_secs(self.config.credential_debounce_secs);
                        match self.creds_persisted_at {
                            Some(last) if last.elapsed() < debounce => {
                                if !persist_pending {
                                    persist_pending = true;
                                    persist_timer.as_mut().reset(last + debounce);
                                }
                            }
                            _ => self.persist_credentials().await,
                        }
                    }
                    Ok(TransportEvent::DecodeFailure(detail)) => {
                        if self.note_decode_failure(&detail) {
                            error!(
                                count = self.decode_errors,
                                budget = self.config.decode_error_budget,
                                "decode failure budget exhausted; forcing session wipe"
                            );
                            if let Err(err) = self.transport.close().await {
                                debug!(error = %err, "transport close after decode budget failed");
                            }
                            return PumpOutcome::DecodeBudgetExceeded;
                        }
                    }
                    Ok(TransportEvent::Message(msg)) => {
                        if self.inbound_tx.send(msg).await.is_err() {
                            warn!("inbound receiver dropped; discarding message");
                        }
                    }
                    Err(err) => {
                        warn!(error = %err, "transport event stream failed");
                        return PumpOutcome::Closed(DisconnectReason {
                            code: None,
                            kind: DisconnectKind::Unknown,
                        });
                    }
                }
            }
        }
    }

    /// Apply the reconnect policy for a closed connection and return the
    /// delay before the next attempt.
    async fn handle_closed(&mut self, reason: DisconnectReason) -> Duration {
        self.set_phase(ConnectionPhase::Closing);
        let class = classify_disconnect(reason.kind);
        warn!(kind = %reason.kind, code = reason.code, class = %class, "connection closed");
        self.status_tx
            .send_modify(|s| s.last_disconnect = Some(class));
        let _ = self.signal_tx.send(ConnectionSignal::Disconnected {
            class,
            code: reason.code,
        });

        let repeated_desync =
            class == DisconnectClass::Desync && self.last_close == Some(DisconnectClass::Desync);

        if class == DisconnectClass::Terminal {
            info!("logged out; wiping session so a fresh pairing challenge is issued");
            self.wipe_session().await;
            self.reset_failure_state();
            return Duration::from_secs(self.config.restart_short_secs);
        }

        if repeated_desync {
            warn!("stream desync twice in a row; treating session as corrupted");
            self.wipe_session().await;
            self.reset_failure_state();
            return Duration::from_secs(self.config.restart_medium_secs);
        }

        self.last_close = Some(class);
        self.retries += 1;
        let attempt = self.retries;
        self.status_tx
            .send_modify(|s| s.reconnect_attempts = attempt);

        if attempt > self.config.max_transient_retries {
            warn!(
                attempts = attempt,
                "transient retry budget exhausted; wiping session"
            );
            self.wipe_session().await;
            self.reset_failure_state();
            return Duration::from_secs(self.config.restart_long_secs);
        }

        let base = Duration::from_secs(self.config.retry_base_secs);
        let long = Duration::from_secs(self.config.restart_long_secs);
        (base * attempt).min(long)
    }

    /// Count a suppressed decode failure, logging at most once per interval.
    /// Returns true once the budget is exceeded.
    fn note_decode_failure(&mut self, detail: &str) -> bool {
        self.decode_errors += 1;
        let interval = Duration::from_secs(self.config.decode_log_interval_secs);
        let should_log = self
            .decode_last_logged
            .is_none_or(|last| last.elapsed() >= interval);
        if should_log {
            warn!(
                count = self.decode_errors,
                detail, "suppressed transport decode failures"
            );
            self.decode_last_logged = Some(Instant::now());
        }
        self.decode_errors > self.config.decode_error_budget
    }

    async fn persist_credentials(&mut self) {
        match self.transport.persist_credentials().await {
            Ok(()) => {
                debug!("persisted transport credentials");
                self.creds_persisted_at = Some(Instant::now());
            }
            Err(err) => error!(error = %err, "failed to persist transport credentials"),
        }
    }

    async fn wipe_session(&mut self) {
        if let Err(err) = self.blobs.wipe() {
            error!(error = %err, "session blob wipe failed");
        }
    }

    fn reset_failure_state(&mut self) {
        self.retries = 0;
        self.last_close = None;
        self.decode_errors = 0;
        self.status_tx.send_modify(|s| s.reconnect_attempts = 0);
    }

    fn set_phase(&self, phase: ConnectionPhase) {
        self.status_tx.send_if_modified(|s| {
            if s.phase == phase {
                return false;
            }
            debug!(from = %s.phase, to = %phase, "connection phase change");
            s.phase = phase;
            true
        });
    }
}
