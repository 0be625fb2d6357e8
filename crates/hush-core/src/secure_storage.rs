//! Platform secure storage capability.
//!
//! The device identity store only needs a small get/set/delete surface keyed by
//! `(service, account)`. Production builds plug in the platform keystore; the
//! in-memory and file-backed stores here cover tests, desktop, and CLI use.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SecureStorageError {
    /// Device is locked or the keystore refused access.
    #[error("secure storage is locked")]
    Locked,

    #[error("secure storage backend error: {0}")]
    Backend(String),

    #[error("secure storage io error: {0}")]
    Io(String),
}

// ============================================================================
// Capability Trait
// ============================================================================

/// Async key-value capability for secret material.
#[async_trait]
pub trait SecureStorage: Send + Sync {
    /// Returns `Ok(None)` when no item is stored under `(service, account)`.
    async fn get(&self, service: &str, account: &str) -> Result<Option<Zeroizing<Vec<u8>>>, SecureStorageError>;

    async fn set(&self, service: &str, account: &str, value: &[u8]) -> Result<(), SecureStorageError>;

    /// Deleting a missing item is not an error.
    async fn delete(&self, service: &str, account: &str) -> Result<(), SecureStorageError>;
}

// ============================================================================
// In-memory implementation
// ============================================================================

/// In-memory secure storage with a lock switch to simulate a locked device.
#[derive(Default)]
pub struct MemorySecureStorage {
    items: RwLock<HashMap<(String, String), Zeroizing<Vec<u8>>>>,
    locked: AtomicBool,
}

impl MemorySecureStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subsequent operations fail with `Locked` until `unlock` is called.
    pub fn lock(&self) {
        self.locked.store(true, Ordering::SeqCst);
    }

    pub fn unlock(&self) {
        self.locked.store(false, Ordering::SeqCst);
    }

    fn check_unlocked(&self) -> Result<(), SecureStorageError> {
        if self.locked.load(Ordering::SeqCst) {
            Err(SecureStorageError::Locked)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl SecureStorage for MemorySecureStorage {
    async fn get(&self, service: &str, account: &str) -> Result<Option<Zeroizing<Vec<u8>>>, SecureStorageError> {
        self.check_unlocked()?;
        let items = self.items.read().await;
        Ok(items
            .get(&(service.to_string(), account.to_string()))
            .map(|v| Zeroizing::new(v.to_vec())))
    }

    async fn set(&self, service: &str, account: &str, value: &[u8]) -> Result<(), SecureStorageError> {
        self.check_unlocked()?;
        let mut items = self.items.write().await;
        items.insert(
            (service.to_string(), account.to_string()),
            Zeroizing::new(value.to_vec()),
        );
        Ok(())
    }

    async fn delete(&self, service: &str, account: &str) -> Result<(), SecureStorageError> {
        self.check_unlocked()?;
        let mut items = self.items.write().await;
        items.remove(&(service.to_string(), account.to_string()));
        Ok(())
    }
}

// ============================================================================
// File-backed implementation
// ============================================================================

/// Stores each item in its own file under `root/<service>/<account>`.
///
/// Writes go to a temporary file that is renamed into place, so a crash never
/// leaves a half-written identity. On unix the files are created with mode 0600.
pub struct FileSecureStorage {
    root: PathBuf,
}

impl FileSecureStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn item_path(&self, service: &str, account: &str) -> PathBuf {
        self.root.join(sanitize(service)).join(sanitize(account))
    }
}

/// Maps a service/account name to a single safe path component.
fn sanitize(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' { c } else { '_' })
        .collect();
    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        format!("_{}", hex::encode(name.as_bytes()))
    } else {
        cleaned
    }
}

fn io_err(e: std::io::Error) -> SecureStorageError {
    if e.kind() == std::io::ErrorKind::PermissionDenied {
        SecureStorageError::Locked
    } else {
        SecureStorageError::Io(e.to_string())
    }
}

#[async_trait]
impl SecureStorage for FileSecureStorage {
    async fn get(&self, service: &str, account: &str) -> Result<Option<Zeroizing<Vec<u8>>>, SecureStorageError> {
        let path = self.item_path(service, account);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(Zeroizing::new(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(e)),
        }
    }

    async fn set(&self, service: &str, account: &str, value: &[u8]) -> Result<(), SecureStorageError> {
        let path = self.item_path(service, account);
        let dir = path
            .parent()
            .ok_or_else(|| SecureStorageError::Backend("item path has no parent".into()))?;
        tokio::fs::create_dir_all(dir).await.map_err(io_err)?;

        let tmp = path.with_extension("tmp");
        {
            let mut opts = tokio::fs::OpenOptions::new();
            opts.write(true).create(true).truncate(true);
            #[cfg(unix)]
            opts.mode(0o600);
            let mut file = opts.open(&tmp).await.map_err(io_err)?;
            use tokio::io::AsyncWriteExt;
            file.write_all(value).await.map_err(io_err)?;
            file.sync_all().await.map_err(io_err)?;
        }
        tokio::fs::rename(&tmp, &path).await.map_err(io_err)?;
        Ok(())
    }

    async fn delete(&self, service: &str, account: &str) -> Result<(), SecureStorageError> {
        let path = self.item_path(service, account);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(io_err(e)),
        }
    }
}
