// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hot-reloadable reply catalog.
//!
//! Reply texts live in a TOML file the operator can edit at runtime;
//! `reload()` re-reads it and swaps the whole set atomically, so in-flight
//! processing keeps the set it started with. Without a configured path the
//! compiled defaults are used and reload is a no-op.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;
use serde::{Deserialize, Serialize};
use tracing::info;

use comanda_config::model::RepliesConfig;
use comanda_core::error::ComandaError;

/// The full set of canned replies.
///
/// Placeholders in braces (`{code}`, `{status}`, `{order_id}`) are filled by
/// [`render`](ReplySet::render) at send time.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReplySet {
    pub welcome: String,
    pub confirm_prompt: String,
    pub ask_address: String,
    pub address_too_short: String,
    pub ask_payment: String,
    pub cash_confirmed: String,
    pub ask_transfer_proof: String,
    pub payment_received: String,
    pub payment_pending: String,
    pub payment_rejected: String,
    pub order_cancelled: String,
    pub order_closed: String,
    pub complaint_prompt: String,
    pub complaint_received: String,
    pub throttle_notice: String,
    pub spam_notice: String,
    pub status_unknown: String,
    pub status_update: String,
    pub fallback: String,
    pub apology: String,
}

impl Default for ReplySet {
    fn default() -> Self {
        Self {
            welcome: "¡Hola! Bienvenido a Comanda. Escribe tu pedido, o manda el \
                      código de 4 dígitos de tu orden para consultar su estado."
                .to_string(),
            confirm_prompt: "Tienes un pedido listo para confirmar (orden {order_id}). \
                             ¿Confirmas? Responde sí o no."
                .to_string(),
            ask_address: "¿A qué dirección te lo enviamos?".to_string(),
            address_too_short: "Esa dirección parece muy corta. Por favor mándala \
                                completa, con calle y número."
                .to_string(),
            ask_payment: "¿Cómo quieres pagar? 1) efectivo 2) transferencia".to_string(),
            cash_confirmed: "¡Listo! Pagas en efectivo al recibir. Tu pedido está \
                             confirmado."
                .to_string(),
            ask_transfer_proof: "Perfecto. Haz la transferencia y mándanos una foto \
                                 del comprobante."
                .to_string(),
            payment_received: "¡Pago recibido! Tu pedido está en marcha.".to_string(),
            payment_pending: "Aún no vemos reflejado tu pago. Lo revisamos y te \
                              avisamos en cuanto se acredite."
                .to_string(),
            payment_rejected: "No pudimos validar ese comprobante. Verifica la \
                               transferencia e intenta de nuevo."
                .to_string(),
            order_cancelled: "Pedido cancelado. Cuando quieras, empezamos de nuevo.".to_string(),
            order_closed: "Esa orden ya quedó cerrada. Escribe hola para empezar un \
                           pedido nuevo."
                .to_string(),
            complaint_prompt: "Lamentamos el inconveniente. Cuéntanos qué pasó.".to_string(),
            complaint_received: "Gracias, registramos tu queja y te contactaremos \
                                 pronto."
                .to_string(),
            throttle_notice: "Estás enviando mensajes muy rápido. Espera un momento \
                              e intenta de nuevo."
                .to_string(),
            spam_notice: "No pudimos procesar tu mensaje.".to_string(),
            status_unknown: "No encontramos una orden con ese código.".to_string(),
            status_update: "Tu orden {code} está: {status}.".to_string(),
            fallback: "No te entendí. Escribe hola para ver las opciones.".to_string(),
            apology: "Tuvimos un problema procesando tu mensaje. Por favor intenta \
                      de nuevo en unos minutos."
                .to_string(),
        }
    }
}

impl ReplySet {
    /// Fill `{placeholder}` markers in a reply template.
    pub fn render(template: &str, fills: &[(&str, &str)]) -> String {
        let mut out = template.to_string();
        for (key, value) in fills {
            out = out.replace(&format!("{{{key}}}"), value);
        }
        out
    }
}

/// Atomically swappable reply catalog.
pub struct ReplyCatalog {
    current: ArcSwap<ReplySet>,
    path: Option<PathBuf>,
}

impl ReplyCatalog {
    /// Build from config, reading the catalog file when a path is set.
    pub fn from_config(config: &RepliesConfig) -> Result<Arc<Self>, ComandaError> {
        let path = config.catalog_path.as_ref().map(PathBuf::from);
        let set = match &path {
            Some(p) => Self::read_file(p)?,
            None => ReplySet::default(),
        };
        Ok(Arc::new(Self {
            current: ArcSwap::from_pointee(set),
            path,
        }))
    }

    /// Catalog with compiled defaults and no backing file.
    pub fn with_defaults() -> Arc<Self> {
        Arc::new(Self {
            current: ArcSwap::from_pointee(ReplySet::default()),
            path: None,
        })
    }

    /// Snapshot of the current reply set.
    pub fn get(&self) -> Arc<ReplySet> {
        self.current.load_full()
    }

    /// Re-read the catalog file and swap it in.
    ///
    /// Fails without touching the active set if the file is missing or
    /// malformed.
    pub fn reload(&self) -> Result<(), ComandaError> {
        let path = self.path.as_ref().ok_or_else(|| {
            ComandaError::Config("no reply catalog path configured; nothing to reload".to_string())
        })?;
        let set = Self::read_file(path)?;
        self.current.store(Arc::new(set));
        info!(path = %path.display(), "reply catalog reloaded");
        Ok(())
    }

    fn read_file(path: &PathBuf) -> Result<ReplySet, ComandaError> {
        let raw = std::fs::read_to_string(path).map_err(|err| {
            ComandaError::Config(format!(
                "failed to read reply catalog {}: {err}",
                path.display()
            ))
        })?;
        toml::from_str(&raw).map_err(|err| {
            ComandaError::Config(format!(
                "failed to parse reply catalog {}: {err}",
                path.display()
            ))
        })
    }
}
