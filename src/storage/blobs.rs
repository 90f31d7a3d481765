//! Named blob storage.

use super::BlobStore;
use crate::error::{Result, StoreError};
use crate::types::Thumbprint;
use lru::LruCache;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Magic bytes for blob files.
const BLOB_MAGIC: &[u8; 4] = b"TWB\0";

/// Current blob format version.
const BLOB_VERSION: u8 = 1;

/// Blobs on disk, one file per name.
///
/// A file lives at `<shard>/<sha256(name)>` where the shard is the first hex
/// byte of the digest. Layout: magic, version, name length (u16 LE), name,
/// content length (u64 LE), content, CRC32 of the content.
pub struct FileBlobStore {
    path: PathBuf,
    cache: Mutex<LruCache<String, Vec<u8>>>,
    ready: OnceLock<()>,
}

impl FileBlobStore {
    /// The directory is created lazily on first write.
    pub fn new(path: impl AsRef<Path>, cache_size: usize) -> Self {
        let cache_size = NonZeroUsize::new(cache_size).unwrap_or(NonZeroUsize::MIN);
        Self {
            path: path.as_ref().to_path_buf(),
            cache: Mutex::new(LruCache::new(cache_size)),
            ready: OnceLock::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_dir(&self) -> Result<()> {
        if self.ready.get().is_none() {
            fs::create_dir_all(&self.path)?;
            let _ = self.ready.set(());
        }
        Ok(())
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        let digest = Thumbprint::from_bytes(name.as_bytes());
        self.path.join(digest.shard_prefix()).join(digest.to_hex())
    }

    fn read_file(&self, name: &str, blob_path: &Path) -> Result<Vec<u8>> {
        let mut file = File::open(blob_path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        if &magic != BLOB_MAGIC {
            return Err(StoreError::InvalidFormat("Invalid blob magic".into()).into());
        }

        let mut version = [0u8; 1];
        file.read_exact(&mut version)?;
        if version[0] != BLOB_VERSION {
            return Err(StoreError::InvalidFormat(format!(
                "Unsupported blob version: {}",
                version[0]
            ))
            .into());
        }

        let mut name_len_bytes = [0u8; 2];
        file.read_exact(&mut name_len_bytes)?;
        let mut stored_name = vec![0u8; u16::from_le_bytes(name_len_bytes) as usize];
        file.read_exact(&mut stored_name)?;
        if stored_name != name.as_bytes() {
            return Err(StoreError::InvalidFormat(format!("Blob file does not hold `{name}`")).into());
        }

        let mut content_len_bytes = [0u8; 8];
        file.read_exact(&mut content_len_bytes)?;
        let mut content = vec![0u8; u64::from_le_bytes(content_len_bytes) as usize];
        file.read_exact(&mut content)?;

        let mut checksum_bytes = [0u8; 4];
        file.read_exact(&mut checksum_bytes)?;
        let stored_checksum = u32::from_le_bytes(checksum_bytes);
        let computed_checksum = crc32fast::hash(&content);

        if stored_checksum != computed_checksum {
            return Err(StoreError::ChecksumMismatch {
                expected: stored_checksum,
                got: computed_checksum,
            }
            .into());
        }

        Ok(content)
    }
}

impl BlobStore for FileBlobStore {
    fn put(&self, name: &str, content: &[u8]) -> Result<()> {
        self.ensure_dir()?;

        let name_bytes = name.as_bytes();
        let name_len = u16::try_from(name_bytes.len())
            .map_err(|_| StoreError::InvalidFormat(format!("Blob name too long: {name}")))?;

        let blob_path = self.blob_path(name);
        if let Some(shard_dir) = blob_path.parent() {
            fs::create_dir_all(shard_dir)?;
        }

        let mut file = File::create(&blob_path)?;

        file.write_all(BLOB_MAGIC)?;
        file.write_all(&[BLOB_VERSION])?;

        file.write_all(&name_len.to_le_bytes())?;
        file.write_all(name_bytes)?;

        file.write_all(&(content.len() as u64).to_le_bytes())?;
        file.write_all(content)?;

        let checksum = crc32fast::hash(content);
        file.write_all(&checksum.to_le_bytes())?;

        file.sync_all()?;

        self.cache.lock().put(name.to_string(), content.to_vec());
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        if let Some(cached) = self.cache.lock().get(name).cloned() {
            return Ok(Some(cached));
        }

        let blob_path = self.blob_path(name);
        if !blob_path.exists() {
            return Ok(None);
        }

        let content = self.read_file(name, &blob_path)?;
        self.cache.lock().put(name.to_string(), content.clone());
        Ok(Some(content))
    }

    fn delete(&self, name: &str) -> Result<bool> {
        self.cache.lock().pop(name);

        let blob_path = self.blob_path(name);
        if blob_path.exists() {
            fs::remove_file(&blob_path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn exists(&self, name: &str) -> Result<bool> {
        if self.cache.lock().contains(name) {
            return Ok(true);
        }
        Ok(self.blob_path(name).exists())
    }
}

/// Blobs held in memory.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, name: &str, content: &[u8]) -> Result<()> {
        self.blobs.write().insert(name.to_string(), content.to_vec());
        Ok(())
    }

    fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.blobs.read().get(name).cloned())
    }

    fn delete(&self, name: &str) -> Result<bool> {
        Ok(self.blobs.write().remove(name).is_some())
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.blobs.read().contains_key(name))
    }
}
