//! Address cache: the persisted list of mined channels.
//!
//! The store is a flat, insertion-ordered list of [`CacheRecord`]s. Records
//! are only ever appended. Keeping inputs unique is the resolver's job
//! (check before mining), so [`AddressCache::find`] returns the first match
//! and never assumes there is only one.
//!
//! There is no internal locking: callers serialize `append` within a
//! process, and the file is assumed to have a single writer.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::warn;

use crate::error::{CacheError, Result};
use crate::record::{CacheRecord, MiningInputs};

/// Default cache file name, relative to the working directory.
pub const DEFAULT_CACHE_FILE: &str = "mined-channels.json";

/// Repository over persisted mining results.
pub trait AddressCache: Send + Sync {
    /// All records in insertion order. Missing or malformed storage reads
    /// as empty.
    fn load(&self) -> Result<Vec<CacheRecord>>;

    /// Persist one more record after all existing ones.
    fn append(&self, record: CacheRecord) -> Result<()>;

    /// First record whose inputs equal `inputs` exactly.
    fn find(&self, inputs: &MiningInputs) -> Result<Option<CacheRecord>> {
        Ok(self.load()?.into_iter().find(|r| &r.inputs == inputs))
    }
}

impl<T: AddressCache + ?Sized> AddressCache for std::sync::Arc<T> {
    fn load(&self) -> Result<Vec<CacheRecord>> {
        (**self).load()
    }

    fn append(&self, record: CacheRecord) -> Result<()> {
        (**self).append(record)
    }

    fn find(&self, inputs: &MiningInputs) -> Result<Option<CacheRecord>> {
        (**self).find(inputs)
    }
}

/// JSON array on disk, rewritten in full on every append.
#[derive(Debug, Clone)]
pub struct JsonFileCache {
    path: PathBuf,
}

impl JsonFileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }

    /// Replace the file contents via a sibling temp file and rename.
    fn write_all(&self, records: &[CacheRecord]) -> Result<()> {
        let data = serde_json::to_string_pretty(records)?;
        let mut tmp = self.path.as_os_str().to_owned();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, data).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }
}

impl AddressCache for JsonFileCache {
    fn load(&self) -> Result<Vec<CacheRecord>> {
        let data = match std::fs::read(&self.path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.io_error(e)),
        };

        match serde_json::from_slice::<Option<Vec<CacheRecord>>>(&data) {
            Ok(records) => Ok(records.unwrap_or_default()),
            Err(e) => {
                warn!(
                    "Invalid cache file {} ({}), resetting to empty",
                    self.path.display(),
                    e
                );
                self.write_all(&[])?;
                Ok(Vec::new())
            }
        }
    }

    fn append(&self, record: CacheRecord) -> Result<()> {
        let mut records = self.load()?;
        records.push(record);
        self.write_all(&records)
    }
}

/// In-memory cache for tests.
#[derive(Debug, Default)]
pub struct MemoryCache {
    records: Mutex<Vec<CacheRecord>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed with existing records.
    pub fn with_records(records: Vec<CacheRecord>) -> Self {
        Self {
            records: Mutex::new(records),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AddressCache for MemoryCache {
    fn load(&self) -> Result<Vec<CacheRecord>> {
        Ok(self.records.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn append(&self, record: CacheRecord) -> Result<()> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
        Ok(())
    }
}
