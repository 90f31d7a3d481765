//! Append-only audit trail.

use super::AuditLog;
use crate::error::{Result, StoreError};
use crate::types::{EmailAddress, Timestamp};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

/// One state-changing action.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: Timestamp,
    pub email: EmailAddress,
    /// Public subscription id, when the action concerns one subscription.
    pub subscription: Option<String>,
    pub text: String,
}

impl AuditEntry {
    pub fn new(at: Timestamp, email: &EmailAddress, subscription: Option<String>, text: impl Into<String>) -> Self {
        Self {
            at,
            email: email.clone(),
            subscription,
            text: text.into(),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryAuditLog {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AuditLog for MemoryAuditLog {
    fn track(&self, entry: AuditEntry) -> Result<()> {
        self.entries.lock().push(entry);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<AuditEntry>> {
        Ok(self.entries.lock().clone())
    }
}

/// JSON lines, one entry per line.
pub struct FileAuditLog {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileAuditLog {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }
}

impl AuditLog for FileAuditLog {
    fn track(&self, entry: AuditEntry) -> Result<()> {
        let mut line = serde_json::to_vec(&entry)?;
        line.push(b'\n');
        self.file.lock().write_all(&line)?;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<AuditEntry>> {
        let _guard = self.file.lock();
        let reader = BufReader::new(File::open(&self.path)?);

        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let entry = serde_json::from_str(&line)
                .map_err(|e| StoreError::Deserialization(format!("audit log: {e}")))?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_log_appends_across_opens() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("audit.log");
        let email = EmailAddress::parse("a@b.com").unwrap();

        FileAuditLog::open(&path)
            .unwrap()
            .track(AuditEntry::new(Timestamp::from_secs(1), &email, None, "Blocked"))
            .unwrap();

        let log = FileAuditLog::open(&path).unwrap();
        log.track(AuditEntry::new(Timestamp::from_secs(2), &email, Some("p$r".into()), "Unblocked"))
            .unwrap();

        let entries = log.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].subscription.as_deref(), Some("p$r"));
    }
}
