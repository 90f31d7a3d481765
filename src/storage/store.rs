//! File-backed data store.

use super::audit::FileAuditLog;
use super::blobs::FileBlobStore;
use super::table::{KeyedTable, BLOCKED_MAGIC, SUBSCRIPTIONS_MAGIC};
use super::{Repositories, Subscription};
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::identity::SubscriptionKey;
use crate::types::{EmailAddress, Timestamp};
use fs2::FileExt;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

/// Magic bytes for the store manifest.
const STORE_MAGIC: &[u8; 4] = b"TPW\0";

/// Current store format version.
const STORE_VERSION: u8 = 1;

/// A store directory:
///
/// ```text
/// <path>/MANIFEST           magic + version
/// <path>/LOCK               exclusive lock held while open
/// <path>/subscriptions.tbl
/// <path>/blocked.tbl
/// <path>/snapshots/         snapshot blobs
/// <path>/changes/           change summary blobs
/// <path>/audit.log
/// ```
pub struct DataStore {
    config: StoreConfig,
    _lock_file: File,
    repositories: Repositories,
}

impl DataStore {
    /// Open an existing store or create a new one.
    pub fn open_or_create(config: StoreConfig) -> Result<Self> {
        if config.path.join("MANIFEST").exists() {
            Self::open(config)
        } else if config.create_if_missing {
            Self::create(config)
        } else {
            Err(StoreError::NotInitialized.into())
        }
    }

    pub fn create(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.path)?;
        Self::write_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;
        Self::assemble(config, lock_file)
    }

    pub fn open(config: StoreConfig) -> Result<Self> {
        Self::verify_manifest(&config.path)?;
        let lock_file = Self::acquire_lock(&config.path)?;
        Self::assemble(config, lock_file)
    }

    fn assemble(config: StoreConfig, lock_file: File) -> Result<Self> {
        let path = &config.path;

        let subscriptions = KeyedTable::<SubscriptionKey, Subscription>::open(
            path.join("subscriptions.tbl"),
            SUBSCRIPTIONS_MAGIC,
        )?;
        let blocked =
            KeyedTable::<EmailAddress, Timestamp>::open(path.join("blocked.tbl"), BLOCKED_MAGIC)?;

        let repositories = Repositories {
            subscriptions: Arc::new(subscriptions),
            blocked: Arc::new(blocked),
            snapshots: Arc::new(FileBlobStore::new(path.join("snapshots"), config.blob_cache_size)),
            changes: Arc::new(FileBlobStore::new(path.join("changes"), config.blob_cache_size)),
            audit: Arc::new(FileAuditLog::open(path.join("audit.log"))?),
        };

        tracing::debug!(path = %path.display(), "Opened data store");

        Ok(Self {
            config,
            _lock_file: lock_file,
            repositories,
        })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Handles onto this store. They stay usable after the store is dropped,
    /// but the directory lock is only held while the `DataStore` lives.
    pub fn repositories(&self) -> Repositories {
        self.repositories.clone()
    }

    fn write_manifest(path: &Path) -> Result<()> {
        let mut file = File::create(path.join("MANIFEST"))?;
        file.write_all(STORE_MAGIC)?;
        file.write_all(&[STORE_VERSION])?;
        file.sync_all()?;
        Ok(())
    }

    fn verify_manifest(path: &Path) -> Result<()> {
        let mut file = File::open(path.join("MANIFEST"))?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != STORE_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid store magic".into()).into());
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != STORE_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported store version: {}",
                version[0]
            ))
            .into());
        }

        Ok(())
    }

    fn acquire_lock(path: &Path) -> Result<File> {
        let lock_file = File::create(path.join("LOCK"))?;
        lock_file.try_lock_exclusive().map_err(|_| StoreError::Locked)?;
        Ok(lock_file)
    }
}
