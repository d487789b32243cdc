//! JSON-file backed [`KeyValueStorage`] for native targets.
//!
//! All keys under one root share a single map file. Writes replace the file atomically through a
//! sibling temp file, and a map that no longer parses is moved aside on the next write so one
//! damaged file cannot block every later write to the root.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use super::kv::{KeyValueFuture, KeyValueStorage};

/// File name of the shared item map inside the storage root.
pub const ITEM_MAP_FILE: &str = "meow-store.json";

const STAGING_SUFFIX: &str = "tmp";
const QUARANTINE_SUFFIX: &str = "corrupt";

type Items = BTreeMap<String, String>;

/// Why the map file could not be turned into items.
enum MapFault {
    Io(String),
    Corrupt(String),
}

impl MapFault {
    fn into_message(self) -> String {
        match self {
            Self::Io(message) | Self::Corrupt(message) => message,
        }
    }
}

#[derive(Debug, Clone)]
/// Storage backed by one JSON map file under a root directory.
///
/// Every operation re-reads the file, so separate instances over the same root observe each
/// other's writes. Reads report a corrupt map as an error; writes quarantine it to
/// [`FileKeyValueStorage::quarantine_file`] and start over from an empty map.
pub struct FileKeyValueStorage {
    file: PathBuf,
}

impl FileKeyValueStorage {
    /// Opens storage under `root`, creating the directory when needed.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be created.
    pub fn from_root(root: impl AsRef<Path>) -> Result<Self, String> {
        let root = root.as_ref();
        fs::create_dir_all(root)
            .map_err(|err| format!("failed to create storage dir {}: {err}", root.display()))?;
        Ok(Self {
            file: root.join(ITEM_MAP_FILE),
        })
    }

    /// Path of the shared map file.
    pub fn file(&self) -> &Path {
        &self.file
    }

    /// Where a map that failed to parse is moved before the next write.
    pub fn quarantine_file(&self) -> PathBuf {
        self.file.with_extension(QUARANTINE_SUFFIX)
    }

    fn staging_file(&self) -> PathBuf {
        self.file.with_extension(STAGING_SUFFIX)
    }

    fn read_items(&self) -> Result<Items, MapFault> {
        let raw = match fs::read_to_string(&self.file) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Items::new()),
            Err(err) => {
                return Err(MapFault::Io(format!(
                    "failed to read {}: {err}",
                    self.file.display()
                )))
            }
        };
        if raw.trim().is_empty() {
            return Ok(Items::new());
        }
        serde_json::from_str(&raw).map_err(|err| {
            MapFault::Corrupt(format!(
                "failed to parse item map {}: {err}",
                self.file.display()
            ))
        })
    }

    /// Items to build the next write on. A corrupt map is set aside and replaced by an empty one.
    fn items_for_write(&self) -> Result<Items, String> {
        match self.read_items() {
            Ok(items) => Ok(items),
            Err(MapFault::Corrupt(_)) => {
                let quarantine = self.quarantine_file();
                fs::rename(&self.file, &quarantine).map_err(|err| {
                    format!(
                        "failed to move corrupt item map to {}: {err}",
                        quarantine.display()
                    )
                })?;
                Ok(Items::new())
            }
            Err(fault) => Err(fault.into_message()),
        }
    }

    fn replace_items(&self, items: &Items) -> Result<(), String> {
        let body = serde_json::to_string(items)
            .map_err(|err| format!("failed to serialize item map: {err}"))?;
        let staging = self.staging_file();
        fs::write(&staging, body)
            .map_err(|err| format!("failed to write {}: {err}", staging.display()))?;
        fs::rename(&staging, &self.file).map_err(|err| {
            let _ = fs::remove_file(&staging);
            format!("failed to replace {}: {err}", self.file.display())
        })
    }

    fn read(&self, key: &str) -> Result<Option<String>, String> {
        require_key(key)?;
        let mut items = self.read_items().map_err(MapFault::into_message)?;
        Ok(items.remove(key))
    }

    fn write(&self, key: &str, value: &str) -> Result<(), String> {
        require_key(key)?;
        let mut items = self.items_for_write()?;
        if items.get(key).map(String::as_str) == Some(value) {
            return Ok(());
        }
        items.insert(key.to_string(), value.to_string());
        self.replace_items(&items)
    }

    fn erase(&self, key: &str) -> Result<(), String> {
        require_key(key)?;
        let mut items = self.items_for_write()?;
        if items.remove(key).is_none() {
            return Ok(());
        }
        self.replace_items(&items)
    }
}

fn require_key(key: &str) -> Result<(), String> {
    if key.is_empty() {
        Err("Storage key must not be empty".to_string())
    } else {
        Ok(())
    }
}

impl KeyValueStorage for FileKeyValueStorage {
    fn get_item<'a>(&'a self, key: &'a str) -> KeyValueFuture<'a, Result<Option<String>, String>> {
        Box::pin(async move { self.read(key) })
    }

    fn set_item<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
    ) -> KeyValueFuture<'a, Result<(), String>> {
        Box::pin(async move { self.write(key, value) })
    }

    fn remove_item<'a>(&'a self, key: &'a str) -> KeyValueFuture<'a, Result<(), String>> {
        Box::pin(async move { self.erase(key) })
    }
}
