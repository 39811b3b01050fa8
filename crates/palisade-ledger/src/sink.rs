//! Append-only record sinks.
//!
//! The ledger works against any medium that supports appending one record
//! and reading back the last N, in arrival order. Records are
//! self-contained, so a sink never needs cross-record context.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{LedgerError, Result};
use crate::record::AuditRecord;

/// Append-only storage contract for audit records.
pub trait AuditSink: Send + Sync {
    /// Appends one record.
    fn append(&self, record: &AuditRecord) -> Result<()>;

    /// Returns up to `limit` most-recent records in arrival order
    /// (oldest of the tail first, newest last).
    fn tail(&self, limit: usize) -> Result<Vec<AuditRecord>>;

    /// Removes every stored record.
    fn clear(&self) -> Result<()>;
}

/// In-memory sink. The default for tests and for running without a
/// durable ledger directory.
#[derive(Default)]
pub struct MemorySink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemorySink {
    /// Creates an empty in-memory sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// True when no records are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemorySink {
    fn append(&self, record: &AuditRecord) -> Result<()> {
        let mut records = self.records.lock().map_err(|_| LedgerError::Poisoned)?;
        records.push(record.clone());
        Ok(())
    }

    fn tail(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let records = self.records.lock().map_err(|_| LedgerError::Poisoned)?;
        let start = records.len().saturating_sub(limit);
        Ok(records[start..].to_vec())
    }

    fn clear(&self) -> Result<()> {
        let mut records = self.records.lock().map_err(|_| LedgerError::Poisoned)?;
        records.clear();
        Ok(())
    }
}

/// Durable sink writing one JSON record per line.
///
/// Each append opens the file, writes one line, and closes it; the mutex
/// only serializes writers within this process. Unparseable lines are
/// skipped on read rather than failing the whole tail.
pub struct JsonlSink {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonlSink {
    /// Creates a sink at the given path, creating parent directories.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        Ok(Self {
            path,
            lock: Mutex::new(()),
        })
    }

    /// The file this sink writes to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlSink {
    fn append(&self, record: &AuditRecord) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| LedgerError::Poisoned)?;

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;

        let line = serde_json::to_string(record)?;
        writeln!(file, "{}", line)?;
        Ok(())
    }

    fn tail(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let _guard = self.lock.lock().map_err(|_| LedgerError::Poisoned)?;

        if !self.path.exists() {
            return Ok(Vec::new());
        }

        let reader = BufReader::new(File::open(&self.path)?);
        let records: Vec<AuditRecord> = reader
            .lines()
            .filter_map(|line| line.ok())
            .filter_map(|line| serde_json::from_str(&line).ok())
            .collect();

        let start = records.len().saturating_sub(limit);
        Ok(records[start..].to_vec())
    }

    fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().map_err(|_| LedgerError::Poisoned)?;

        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}
