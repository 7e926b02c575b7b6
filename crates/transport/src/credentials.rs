//! Durable storage for the session credential blob.
//!
//! The blob is opaque to papo; it is whatever the bridge hands over on a
//! rotation event. Writes go through a temp file and rename so a crash
//! mid-write can never corrupt pairing state.

use std::{fs, io::Write, path::PathBuf};

use tracing::{debug, warn};

use crate::error::Result;

/// File-backed credential store for the single logical session.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }

    /// Load the persisted blob. Returns `None` when no credentials exist yet;
    /// an unreadable blob also maps to `None` so boot degrades to a fresh
    /// pairing instead of failing.
    pub async fn load(&self) -> Result<Option<serde_json::Value>> {
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || -> Result<Option<serde_json::Value>> {
            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            match serde_json::from_slice(&bytes) {
                Ok(value) => Ok(Some(value)),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "credential blob unreadable, re-pairing");
                    Ok(None)
                },
            }
        })
        .await?
    }

    /// Persist a rotated blob atomically (write temp, fsync, rename).
    pub async fn save(&self, blob: &serde_json::Value) -> Result<()> {
        let path = self.path.clone();
        let bytes = serde_json::to_vec(blob)?;

        tokio::task::spawn_blocking(move || -> Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let tmp = path.with_extension("tmp");
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &path)?;
            Ok(())
        })
        .await??;

        debug!(path = %self.path.display(), "credentials persisted");
        Ok(())
    }

    /// Delete the persisted blob. Called on a confirmed logout; stale
    /// credentials must never be retried.
    pub async fn wipe(&self) -> Result<()> {
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let tmp = path.with_extension("tmp");
            if tmp.exists() {
                let _ = fs::remove_file(&tmp);
            }
            match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
        .await??;

        debug!(path = %self.path.display(), "credentials wiped");
        Ok(())
    }
}
