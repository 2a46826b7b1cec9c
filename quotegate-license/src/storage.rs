//! Local persisted state.
//!
//! A flat string key/value store, the native stand-in for browser local
//! storage. Values under the well-known keys are JSON documents (except the
//! device id, which is a bare string) so that state written by one client
//! can be read by another.

use crate::error::{LicenseError, LicenseResult};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::debug;

/// Key holding the JSON array of disabled codes.
pub const DISABLED_CODES_KEY: &str = "disabled_codes";
/// Key holding the JSON object mapping codes to device ids.
pub const CODE_DEVICE_MAP_KEY: &str = "code_device_map";
/// Key holding the active subscription record.
pub const SUBSCRIPTION_KEY: &str = "subscription_verified";
/// Key holding the persisted device id.
pub const DEVICE_ID_KEY: &str = "device_id";

/// A string key/value store.
pub trait Storage: Send + Sync {
    /// Reads a value, returning `None` when the key is absent.
    fn get(&self, key: &str) -> LicenseResult<Option<String>>;

    /// Writes a value, replacing any previous one.
    fn set(&self, key: &str, value: &str) -> LicenseResult<()>;

    /// Removes a key. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> LicenseResult<()>;
}

/// In-memory storage.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, String>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> LicenseError {
    LicenseError::Storage("storage lock poisoned".to_string())
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> LicenseResult<Option<String>> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> LicenseResult<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> LicenseResult<()> {
        let mut entries = self.entries.write().map_err(poisoned)?;
        entries.remove(key);
        Ok(())
    }
}

/// Storage backed by a single JSON object on disk.
///
/// The file is re-read on every access so separate processes observe each
/// other's writes; there is no locking between them.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    write_guard: RwLock<()>,
}

impl FileStorage {
    /// Opens (or prepares to create) the state file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory cannot be created.
    pub fn open(path: impl Into<PathBuf>) -> LicenseResult<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    LicenseError::Storage(format!("cannot create {}: {e}", parent.display()))
                })?;
            }
        }
        debug!(path = %path.display(), "opened file storage");
        Ok(Self {
            path,
            write_guard: RwLock::new(()),
        })
    }

    /// Returns the default state file location in the user's data directory.
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quotegate")
            .join("state.json")
    }

    /// Returns the path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> LicenseResult<BTreeMap<String, String>> {
        match fs::read_to_string(&self.path) {
            Ok(content) if content.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(LicenseError::Storage(format!(
                "cannot read {}: {e}",
                self.path.display()
            ))),
        }
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> LicenseResult<()> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json)
            .and_then(|()| fs::rename(&tmp, &self.path))
            .map_err(|e| LicenseError::Storage(format!("cannot write {}: {e}", self.path.display())))
    }

    fn update(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> LicenseResult<()> {
        let _guard = self.write_guard.write().map_err(poisoned)?;
        let mut entries = self.load()?;
        f(&mut entries);
        self.save(&entries)
    }
}

impl Storage for FileStorage {
    fn get(&self, key: &str) -> LicenseResult<Option<String>> {
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> LicenseResult<()> {
        self.update(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> LicenseResult<()> {
        self.update(|entries| {
            entries.remove(key);
        })
    }
}
