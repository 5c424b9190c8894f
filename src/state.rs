//! Durable key-value flags that survive across process runs.
//!
//! Values are opaque strings, mirroring browser local storage. The file
//! store keeps every key in one JSON object under the state directory.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access flag store: {0}")]
    Io(#[from] std::io::Error),
    #[error("flag store is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("flag store lock poisoned")]
    Poisoned,
}

/// Narrow read/write/clear interface over durable string flags
pub trait FlagStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Flags persisted as a JSON object on disk
pub struct FileFlagStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process
    lock: Mutex<()>,
}

impl FileFlagStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    /// Write via a temp file and rename so a crash never leaves half a file
    fn save(&self, flags: &BTreeMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(flags)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl FlagStore for FileFlagStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        let mut flags = self.load()?;
        flags.insert(key.to_string(), value.to_string());
        self.save(&flags)
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock().map_err(|_| StoreError::Poisoned)?;
        // A corrupt file cannot hold a usable flag; start it over
        let (mut flags, reset) = match self.load() {
            Ok(flags) => (flags, false),
            Err(StoreError::Corrupt(_)) => (BTreeMap::new(), true),
            Err(e) => return Err(e),
        };
        if flags.remove(key).is_some() || reset {
            self.save(&flags)?;
        }
        Ok(())
    }
}

/// In-process flags, for tests and ephemeral runs
#[derive(Default)]
pub struct MemoryFlagStore {
    flags: Mutex<BTreeMap<String, String>>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.flags.lock().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FlagStore for MemoryFlagStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let flags = self.flags.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(flags.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut flags = self.flags.lock().map_err(|_| StoreError::Poisoned)?;
        flags.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let mut flags = self.flags.lock().map_err(|_| StoreError::Poisoned)?;
        flags.remove(key);
        Ok(())
    }
}
