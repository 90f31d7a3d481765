//! Ordered key-value tables, in memory or persisted to a single file.

use super::{BlockList, Page, Subscription, SubscriptionTable};
use crate::error::{Result, StoreError};
use crate::identity::SubscriptionKey;
use crate::types::{EmailAddress, Timestamp};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};

/// Magic bytes for the subscriptions table file.
pub(crate) const SUBSCRIPTIONS_MAGIC: &[u8; 4] = b"SUB\0";

/// Magic bytes for the blocked emails table file.
pub(crate) const BLOCKED_MAGIC: &[u8; 4] = b"BLK\0";

/// Current table format version.
const TABLE_VERSION: u8 = 1;

/// A `BTreeMap` behind a lock. When file-backed, every mutation rewrites the
/// file: magic, version, body length (u64 LE), MessagePack body.
pub struct KeyedTable<K, V> {
    entries: RwLock<BTreeMap<K, V>>,
    file: Option<(PathBuf, &'static [u8; 4])>,
}

impl<K, V> KeyedTable<K, V>
where
    K: Ord + Clone + Serialize + DeserializeOwned,
    V: Clone + Serialize + DeserializeOwned,
{
    pub fn in_memory() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            file: None,
        }
    }

    /// Load `path` if it exists, otherwise start empty. The file is written on first mutation.
    pub fn open(path: impl AsRef<Path>, magic: &'static [u8; 4]) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let entries = if path.exists() {
            load_entries(&path, magic)?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            entries: RwLock::new(entries),
            file: Some((path, magic)),
        })
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.read().get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.read().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Insert or replace. The in-memory map only changes if the file write succeeds.
    pub fn insert(&self, key: K, value: V) -> Result<()> {
        let mut entries = self.entries.write();
        let previous = entries.insert(key.clone(), value);

        if let Err(e) = self.persist(&entries) {
            // Roll back
            match previous {
                Some(old) => entries.insert(key, old),
                None => entries.remove(&key),
            };
            return Err(e);
        }
        Ok(())
    }

    /// Remove `key`, returning whether it was present. Rolled back if the file write fails.
    pub fn remove(&self, key: &K) -> Result<bool> {
        let mut entries = self.entries.write();
        let Some(old) = entries.remove(key) else {
            return Ok(false);
        };

        if let Err(e) = self.persist(&entries) {
            entries.insert(key.clone(), old);
            return Err(e);
        }
        Ok(true)
    }

    /// Up to `take` values from `start` onward in key order, stopping at the
    /// first key outside `within`, and the key to resume from when more remain.
    pub fn range_while<F>(&self, start: Bound<&K>, take: usize, within: F) -> (Vec<V>, Option<K>)
    where
        F: Fn(&K) -> bool,
    {
        let entries = self.entries.read();
        let mut matched = entries
            .range::<K, _>((start, Bound::Unbounded))
            .take_while(|(k, _)| within(*k));

        let mut items = Vec::new();
        let mut last = None;
        for (key, value) in matched.by_ref().take(take) {
            items.push(value.clone());
            last = Some(key.clone());
        }

        let continuation = if matched.next().is_some() { last } else { None };
        (items, continuation)
    }

    fn persist(&self, entries: &BTreeMap<K, V>) -> Result<()> {
        let Some((path, magic)) = &self.file else {
            return Ok(());
        };

        // Pairs rather than a map so that struct keys round-trip.
        let pairs: Vec<(&K, &V)> = entries.iter().collect();
        let encoded = rmp_serde::to_vec_named(&pairs)?;

        let tmp = path.with_extension("tmp");
        {
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&tmp)?;

            file.write_all(*magic)?;
            file.write_all(&[TABLE_VERSION])?;
            file.write_all(&(encoded.len() as u64).to_le_bytes())?;
            file.write_all(&encoded)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

fn load_entries<K, V>(path: &Path, expected_magic: &[u8; 4]) -> Result<BTreeMap<K, V>>
where
    K: Ord + DeserializeOwned,
    V: DeserializeOwned,
{
    let mut file = File::open(path)?;

    let mut magic = [0u8; 4];
    file.read_exact(&mut magic)?;
    if &magic != expected_magic {
        return Err(StoreError::InvalidFormat(format!(
            "Invalid table magic in {}",
            path.display()
        ))
        .into());
    }

    let mut version = [0u8; 1];
    file.read_exact(&mut version)?;
    if version[0] != TABLE_VERSION {
        return Err(StoreError::InvalidFormat(format!(
            "Unsupported table version: {}",
            version[0]
        ))
        .into());
    }

    let mut len_bytes = [0u8; 8];
    file.read_exact(&mut len_bytes)?;
    let len = u64::from_le_bytes(len_bytes) as usize;

    let mut encoded = vec![0u8; len];
    file.read_exact(&mut encoded)?;

    let pairs: Vec<(K, V)> = rmp_serde::from_slice(&encoded).map_err(StoreError::from)?;
    Ok(pairs.into_iter().collect())
}

impl SubscriptionTable for KeyedTable<SubscriptionKey, Subscription> {
    fn get(&self, key: &SubscriptionKey) -> Result<Option<Subscription>> {
        Ok(KeyedTable::get(self, key))
    }

    fn exists(&self, key: &SubscriptionKey) -> Result<bool> {
        Ok(self.contains(key))
    }

    fn upsert(&self, subscription: &Subscription) -> Result<()> {
        self.insert(subscription.key.clone(), subscription.clone())
    }

    fn delete(&self, key: &SubscriptionKey) -> Result<bool> {
        self.remove(key)
    }

    fn scan(
        &self,
        partition: Option<&str>,
        after: Option<&SubscriptionKey>,
        take: usize,
    ) -> Result<Page<Subscription>> {
        let floor = partition.map(SubscriptionKey::partition_floor);
        let start = match (after, &floor) {
            (Some(key), Some(floor)) if key < floor => Bound::Included(floor),
            (Some(key), _) => Bound::Excluded(key),
            (None, Some(floor)) => Bound::Included(floor),
            (None, None) => Bound::Unbounded,
        };

        let (items, continuation) =
            self.range_while(start, take, |key| partition.map_or(true, |p| key.partition() == p));
        Ok(Page { items, continuation })
    }
}

impl BlockList for KeyedTable<EmailAddress, Timestamp> {
    fn is_blocked(&self, email: &EmailAddress) -> Result<bool> {
        Ok(self.contains(email))
    }

    fn block(&self, email: &EmailAddress, at: Timestamp) -> Result<()> {
        self.insert(email.clone(), at)
    }

    fn unblock(&self, email: &EmailAddress) -> Result<bool> {
        self.remove(email)
    }
}
