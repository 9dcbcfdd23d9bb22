// SPDX-FileCopyrightText: 2026 Comanda Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Opaque session blob storage.
//!
//! The transport persists its connection credentials into a directory the
//! core never parses. The blob store only knows how to check for the blob's
//! presence and how to delete it as a unit.

use std::path::{Path, PathBuf};

use comanda_core::error::ComandaError;
use tracing::info;

/// Filesystem home of the transport session blob.
#[derive(Debug, Clone)]
pub struct SessionBlobStore {
    dir: PathBuf,
}

impl SessionBlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Whether a persisted blob is present (the directory exists and holds
    /// at least one entry).
    pub fn exists(&self) -> bool {
        match std::fs::read_dir(&self.dir) {
            Ok(mut entries) => entries.next().is_some(),
            Err(_) => false,
        }
    }

    /// Delete the blob directory and everything under it.
    ///
    /// Idempotent: wiping an absent blob succeeds silently.
    pub fn wipe(&self) -> Result<(), ComandaError> {
        match std::fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                info!(dir = %self.dir.display(), "wiped transport session blob");
                Ok(())
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(ComandaError::Transport {
                message: format!("failed to wipe session blob at {}", self.dir.display()),
                source: Some(Box::new(err)),
            }),
        }
    }
}
