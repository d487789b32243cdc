//! Typed store configuration loaded from TOML.

use std::fs;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{StoreError, StoreResult};
use crate::placeholder::{PlaceholderCatalog, PLACEHOLDER_KEY, REFERENCE_PLACEHOLDERS};
use crate::preferences::PREFERENCES_KEY;

pub(crate) const BROWSER_BACKEND_NATIVE: &str =
    "browser backend is only available on wasm32 targets";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
/// Backing storage used by the stores.
pub enum StorageBackend {
    /// `window.localStorage`.
    Browser,
    /// JSON map file under [`StoreConfig::file_root`].
    File,
    /// Process-local memory; nothing survives a restart.
    Memory,
}

impl Default for StorageBackend {
    fn default() -> Self {
        if cfg!(target_arch = "wasm32") {
            Self::Browser
        } else {
            Self::File
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
/// Store wiring: backend, storage keys, and the placeholder catalog.
///
/// ```toml
/// backend = "file"
/// file_root = "/var/lib/meow"
/// preferences_key = "user-preferences"
/// placeholder_key = "placeholder-storage"
/// placeholder_assets = ["a.png", "b.png"]
/// ```
pub struct StoreConfig {
    /// Backing storage.
    pub backend: StorageBackend,
    /// Directory holding the map file for [`StorageBackend::File`].
    pub file_root: Option<PathBuf>,
    /// Key owned by the preference store.
    pub preferences_key: String,
    /// Key owned by the placeholder store.
    pub placeholder_key: String,
    /// Placeholder asset references in index order.
    pub placeholder_assets: Vec<String>,
}

/// On native targets the default backend is [`StorageBackend::File`] with no root, which does
/// not validate: native callers set [`StoreConfig::file_root`] or start from
/// [`StoreConfig::file`].
impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            file_root: None,
            preferences_key: PREFERENCES_KEY.to_string(),
            placeholder_key: PLACEHOLDER_KEY.to_string(),
            placeholder_assets: REFERENCE_PLACEHOLDERS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl StoreConfig {
    /// In-memory configuration with the default keys and catalog.
    pub fn memory() -> Self {
        Self {
            backend: StorageBackend::Memory,
            ..Self::default()
        }
    }

    /// File-backed configuration rooted at `root`, with the default keys and catalog.
    pub fn file(root: impl Into<PathBuf>) -> Self {
        Self {
            backend: StorageBackend::File,
            file_root: Some(root.into()),
            ..Self::default()
        }
    }

    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] on parse or validation failure.
    pub fn from_toml_str(body: &str) -> StoreResult<Self> {
        let config: Self =
            toml::from_str(body).map_err(|err| StoreError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Checks the semantic rules serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] when a key is empty, both stores share a key, the file
    /// backend has no root, or the browser backend is selected outside wasm32.
    pub fn validate(&self) -> StoreResult<()> {
        self.validate_keys()?;
        match self.backend {
            StorageBackend::File if self.file_root.is_none() => Err(StoreError::Config(
                "file backend requires `file_root`".to_string(),
            )),
            StorageBackend::Browser if !cfg!(target_arch = "wasm32") => Err(StoreError::Config(
                BROWSER_BACKEND_NATIVE.to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// Checks that both storage keys are present and distinct.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] when a key is empty or both stores share a key.
    pub fn validate_keys(&self) -> StoreResult<()> {
        if self.preferences_key.is_empty() || self.placeholder_key.is_empty() {
            return Err(StoreError::Config("storage keys must not be empty".to_string()));
        }
        if self.preferences_key == self.placeholder_key {
            return Err(StoreError::Config(format!(
                "preferences and placeholder stores must not share key `{}`",
                self.preferences_key
            )));
        }
        Ok(())
    }

    /// Placeholder catalog built from [`StoreConfig::placeholder_assets`].
    pub fn placeholder_catalog(&self) -> PlaceholderCatalog<String> {
        PlaceholderCatalog::new(self.placeholder_assets.clone())
    }
}

/// Generic TOML-backed config loader.
///
/// Handles only filesystem access and TOML deserialization; callers validate the typed value.
#[derive(Clone, Debug)]
pub struct ConfigLoader<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T> ConfigLoader<T>
where
    T: DeserializeOwned,
{
    /// Creates a loader for `relative_path` under `root`.
    pub fn new(root: &Path, relative_path: &str) -> Self {
        Self {
            path: root.join(relative_path),
            _marker: PhantomData,
        }
    }

    /// Loads and deserializes the configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] when the file is missing, unreadable, or not valid TOML.
    pub fn load(&self) -> StoreResult<T> {
        let body = fs::read_to_string(&self.path).map_err(|err| {
            StoreError::Config(format!("failed to read {}: {err}", self.path.display()))
        })?;
        toml::from_str(&body).map_err(|err| {
            StoreError::Config(format!("failed to parse {}: {err}", self.path.display()))
        })
    }

    /// Config path on disk.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ConfigLoader<StoreConfig> {
    /// Loads and validates a [`StoreConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] on read, parse, or validation failure.
    pub fn load_validated(&self) -> StoreResult<StoreConfig> {
        let config = self.load()?;
        config.validate()?;
        Ok(config)
    }
}
