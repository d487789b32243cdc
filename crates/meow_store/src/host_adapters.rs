use meow_host::{
    FileKeyValueStorage, KeyValueFuture, KeyValueStorage, MemoryKeyValueStorage,
};
use meow_host_web::WebKeyValueStorage;

use crate::config::{StorageBackend, StoreConfig, BROWSER_BACKEND_NATIVE};
use crate::error::{StoreError, StoreResult};

#[derive(Debug, Clone)]
/// Adapter enum that erases the configured backend behind [`KeyValueStorage`].
pub enum StorageAdapter {
    /// `window.localStorage`.
    Browser(WebKeyValueStorage),
    /// JSON map file.
    File(FileKeyValueStorage),
    /// Process-local memory.
    Memory(MemoryKeyValueStorage),
}

impl StorageAdapter {
    /// Stable string token for the active backend.
    pub fn backend_name(&self) -> &'static str {
        match self {
            Self::Browser(_) => "browser",
            Self::File(_) => "file",
            Self::Memory(_) => "memory",
        }
    }
}

impl KeyValueStorage for StorageAdapter {
    fn get_item<'a>(&'a self, key: &'a str) -> KeyValueFuture<'a, Result<Option<String>, String>> {
        match self {
            Self::Browser(storage) => storage.get_item(key),
            Self::File(storage) => storage.get_item(key),
            Self::Memory(storage) => storage.get_item(key),
        }
    }

    fn set_item<'a>(
        &'a self,
        key: &'a str,
        value: &'a str,
    ) -> KeyValueFuture<'a, Result<(), String>> {
        match self {
            Self::Browser(storage) => storage.set_item(key, value),
            Self::File(storage) => storage.set_item(key, value),
            Self::Memory(storage) => storage.set_item(key, value),
        }
    }

    fn remove_item<'a>(&'a self, key: &'a str) -> KeyValueFuture<'a, Result<(), String>> {
        match self {
            Self::Browser(storage) => storage.remove_item(key),
            Self::File(storage) => storage.remove_item(key),
            Self::Memory(storage) => storage.remove_item(key),
        }
    }
}

/// Builds the storage adapter selected by `config`.
///
/// # Errors
///
/// Returns [`StoreError::Config`] when the file backend has no root or its directory cannot be
/// created, or when the browser backend is requested outside wasm32.
pub fn storage_adapter(config: &StoreConfig) -> StoreResult<StorageAdapter> {
    match config.backend {
        StorageBackend::Browser if cfg!(target_arch = "wasm32") => {
            Ok(StorageAdapter::Browser(WebKeyValueStorage))
        }
        StorageBackend::Browser => Err(StoreError::Config(BROWSER_BACKEND_NATIVE.to_string())),
        StorageBackend::Memory => Ok(StorageAdapter::Memory(MemoryKeyValueStorage::default())),
        StorageBackend::File => {
            let root = config.file_root.as_ref().ok_or_else(|| {
                StoreError::Config("file backend requires `file_root`".to_string())
            })?;
            FileKeyValueStorage::from_root(root)
                .map(StorageAdapter::File)
                .map_err(StoreError::Config)
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;

    use super::*;

    #[test]
    fn memory_backend_round_trips_through_the_adapter() {
        let adapter = storage_adapter(&StoreConfig::memory()).expect("adapter");
        assert_eq!(adapter.backend_name(), "memory");
        block_on(adapter.set_item("user-preferences", "{}")).expect("set");
        assert_eq!(
            block_on(adapter.get_item("user-preferences")).expect("get"),
            Some("{}".to_string())
        );
        block_on(adapter.remove_item("user-preferences")).expect("remove");
        assert_eq!(block_on(adapter.get_item("user-preferences")).expect("get"), None);
    }

    #[test]
    fn file_backend_without_root_is_a_config_error() {
        let config = StoreConfig {
            backend: StorageBackend::File,
            file_root: None,
            ..StoreConfig::memory()
        };
        assert!(matches!(storage_adapter(&config), Err(StoreError::Config(_))));
    }

    #[cfg(not(target_arch = "wasm32"))]
    #[test]
    fn browser_backend_is_refused_on_native() {
        let config = StoreConfig {
            backend: StorageBackend::Browser,
            ..StoreConfig::memory()
        };
        assert!(matches!(storage_adapter(&config), Err(StoreError::Config(_))));
    }

    #[cfg(target_arch = "wasm32")]
    #[test]
    fn browser_backend_selects_local_storage_adapter() {
        let config = StoreConfig {
            backend: StorageBackend::Browser,
            ..StoreConfig::memory()
        };
        let adapter = storage_adapter(&config).expect("adapter");
        assert_eq!(adapter.backend_name(), "browser");
    }
}
