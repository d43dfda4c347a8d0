//! Credential store backed by a session directory.
//!
//! The store holds opaque authentication material for the protocol client.
//! A distinguished `creds.json` file signals that a session has already
//! been established; its contents are written by the client on pairing and
//! rewritten on every rotation. This crate never deletes it.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// File whose presence marks an established session.
pub const CREDS_FILE: &str = "creds.json";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access credential store: {0}")]
    Io(#[from] io::Error),
}

/// Directory of persisted authentication material.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    /// Open the store, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Directory holding the credential files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the distinguished credentials file.
    pub fn creds_path(&self) -> PathBuf {
        self.dir.join(CREDS_FILE)
    }

    /// Whether a session has already been established.
    pub fn has_credentials(&self) -> bool {
        self.creds_path().is_file()
    }

    /// Write (or overwrite) the credential material. Called on bootstrap
    /// after a successful blob download and synchronously on every
    /// rotation event.
    pub fn persist(&self, material: &[u8]) -> Result<(), StoreError> {
        fs::write(self.creds_path(), material)?;
        Ok(())
    }

    /// Read the raw credential material, if any.
    pub fn load(&self) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.creds_path()) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err.into()),
        }
    }
}
