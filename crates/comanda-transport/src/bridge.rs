// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport adapter for the messaging bridge sidecar.
//!
//! The sidecar process owns the wire-level messaging protocol and the
//! credential material inside the session blob directory. This adapter
//! speaks newline-delimited JSON to it over a local TCP socket: one frame
//! per line in, one command per line out. A frame that fails to parse is
//! surfaced as a decode failure so the connection manager can count it
//! against the budget.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tracing::debug;

use comanda_core::error::ComandaError;
use comanda_core::traits::TransportAdapter;
use comanda_core::types::{
    DisconnectKind, DisconnectReason, InboundMessage, MessageContent, MessageId, OutboundMessage,
    SenderId, TransportEvent,
};

/// One inbound frame from the bridge sidecar.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", deny_unknown_fields)]
enum BridgeFrame {
    PairingChallenge {
        code: String,
    },
    Opened,
    Closed {
        kind: DisconnectKind,
        #[serde(default)]
        code: Option<u16>,
    },
    CredentialsChanged,
    Message {
        id: String,
        sender: String,
        #[serde(default)]
        text: Option<String>,
        #[serde(default)]
        media: Option<String>,
        #[serde(default)]
        caption: Option<String>,
        timestamp: DateTime<Utc>,
    },
}

/// One outbound command to the bridge sidecar.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum BridgeCommand<'a> {
    Send { id: &'a str, to: &'a str, text: &'a str },
    PersistCredentials,
}

/// [`TransportAdapter`] over a local bridge sidecar socket.
pub struct BridgeTransport {
    addr: String,
    reader: Mutex<Option<Lines<BufReader<OwnedReadHalf>>>>,
    writer: Mutex<Option<OwnedWriteHalf>>,
}

impl BridgeTransport {
    pub fn new(addr: impl Into<String>) -> Self {
        Self {
            addr: addr.into(),
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    async fn write_command(&self, command: &BridgeCommand<'_>) -> Result<(), ComandaError> {
        let mut line = serde_json::to_string(command).map_err(|e| ComandaError::Transport {
            message: "failed to encode bridge command".to_string(),
            source: Some(Box::new(e)),
        })?;
        line.push('\n');

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| ComandaError::Transport {
            message: "bridge not connected".to_string(),
            source: None,
        })?;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ComandaError::Transport {
                message: "failed to write to bridge".to_string(),
                source: Some(Box::new(e)),
            })
    }
}

fn frame_to_event(frame: BridgeFrame) -> TransportEvent {
    match frame {
        BridgeFrame::PairingChallenge { code } => TransportEvent::PairingChallenge(code),
        BridgeFrame::Opened => TransportEvent::Opened,
        BridgeFrame::Closed { kind, code } => {
            TransportEvent::Closed(DisconnectReason { code, kind })
        }
        BridgeFrame::CredentialsChanged => TransportEvent::CredentialsChanged,
        BridgeFrame::Message {
            id,
            sender,
            text,
            media,
            caption,
            timestamp,
        } => {
            let content = match (text, media.as_deref()) {
                (Some(text), _) => MessageContent::Text(text),
                (None, Some("image")) => MessageContent::Image { caption },
                _ => MessageContent::Unsupported,
            };
            TransportEvent::Message(InboundMessage {
                id,
                sender_id: SenderId(sender),
                content,
                timestamp,
                order: None,
            })
        }
    }
}

#[async_trait::async_trait]
impl TransportAdapter for BridgeTransport {
    async fn open(&self) -> Result<(), ComandaError> {
        let stream = TcpStream::connect(&self.addr)
            .await
            .map_err(|e| ComandaError::Transport {
                message: format!("failed to connect to bridge at {}", self.addr),
                source: Some(Box::new(e)),
            })?;
        let (read_half, write_half) = stream.into_split();
        *self.reader.lock().await = Some(BufReader::new(read_half).lines());
        *self.writer.lock().await = Some(write_half);
        debug!(addr = %self.addr, "bridge connection established");
        Ok(())
    }

    async fn close(&self) -> Result<(), ComandaError> {
        self.reader.lock().await.take();
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(err) = writer.shutdown().await {
                debug!(error = %err, "bridge socket shutdown failed");
            }
        }
        Ok(())
    }

    async fn send(&self, msg: OutboundMessage) -> Result<MessageId, ComandaError> {
        let id = uuid::Uuid::new_v4().to_string();
        self.write_command(&BridgeCommand::Send {
            id: &id,
            to: &msg.to.0,
            text: &msg.text,
        })
        .await?;
        Ok(MessageId(id))
    }

    async fn next_event(&self) -> Result<TransportEvent, ComandaError> {
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or_else(|| ComandaError::Transport {
            message: "bridge not connected".to_string(),
            source: None,
        })?;

        match reader.next_line().await {
            Ok(Some(line)) => match serde_json::from_str::<BridgeFrame>(&line) {
                Ok(frame) => Ok(frame_to_event(frame)),
                Err(err) => Ok(TransportEvent::DecodeFailure(err.to_string())),
            },
            // EOF: the sidecar went away without a tagged close.
            Ok(None) => Ok(TransportEvent::Closed(DisconnectReason {
                code: None,
                kind: DisconnectKind::ConnectionLost,
            })),
            Err(err) => {
                debug!(error = %err, "bridge socket read failed");
                Ok(TransportEvent::Closed(DisconnectReason {
                    code: None,
                    kind: DisconnectKind::ConnectionLost,
                }))
            }
        }
    }

    async fn persist_credentials(&self) -> Result<(), ComandaError> {
        self.write_command(&BridgeCommand::PersistCredentials).await
    }
}
