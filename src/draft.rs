//! Draft persistence. Storage is best effort: failures are logged and the
//! caller carries on as if nothing was saved.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::config::DraftConfig;
use crate::error::StorageError;

pub trait KeyValueStore {
    /// # Errors
    ///
    /// Returns a [`StorageError`] if the store cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// # Errors
    ///
    /// Returns a [`StorageError`] if the value could not be written.
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

/// In-process store. Clones share the same contents, and the store can be
/// switched off to mimic a host that denies storage access.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: Rc<RefCell<HashMap<String, String>>>,
    unavailable: Rc<Cell<bool>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.set(!available);
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        if self.unavailable.get() {
            return Err(StorageError::Unavailable);
        }
        Ok(self.values.borrow().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.unavailable.get() {
            return Err(StorageError::Unavailable);
        }
        self.values.borrow_mut().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// Stores every key in one JSON object file.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read_all(&self) -> Result<BTreeMap<String, String>, StorageError> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(err) => Err(err.into()),
        }
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let mut all = self.read_all()?;
        all.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&all)?)?;
        Ok(())
    }
}

pub struct DraftStore {
    store: Box<dyn KeyValueStore>,
    key: String,
}

impl DraftStore {
    pub fn new(store: impl KeyValueStore + 'static, config: &DraftConfig) -> Self {
        Self {
            store: Box::new(store),
            key: config.storage_key.clone(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn load(&self) -> Option<String> {
        match self.store.get(&self.key) {
            Ok(value) => value,
            Err(err) => {
                warn!(key = %self.key, error = %err, "failed to read draft");
                None
            }
        }
    }

    pub fn save(&self, text: &str) {
        match self.store.set(&self.key, text) {
            Ok(()) => debug!(key = %self.key, len = text.len(), "draft saved"),
            Err(err) => warn!(key = %self.key, error = %err, "failed to save draft"),
        }
    }
}
