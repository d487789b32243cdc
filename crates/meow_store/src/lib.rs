//! Persisted client stores for the MEOW app: preference flags and the per-install placeholder.
//!
//! Each store keeps its state in memory for synchronous reads and mutations and mirrors every
//! change to one key of an asynchronous [`KeyValueStorage`]. Stores are explicitly opened (which
//! hydrates them) and owned by the app's root composition, [`MeowStores`], instead of living in
//! global singletons.
//!
//! # Example
//!
//! ```rust
//! use futures::executor::{block_on, LocalPool};
//! use futures::task::LocalSpawnExt;
//! use meow_host::MemoryKeyValueStorage;
//! use meow_store::{MeowStores, StoreConfig};
//!
//! let storage = MemoryKeyValueStorage::default();
//! let stores = block_on(MeowStores::open_with(storage.clone(), &StoreConfig::memory()))
//!     .expect("valid config");
//!
//! let mut pool = LocalPool::new();
//! for writer in stores.take_writers() {
//!     pool.spawner().spawn_local(writer).expect("spawn writer");
//! }
//!
//! stores.preferences().toggle_no_ads();
//! let placeholder = stores.placeholder().map(str::to_string);
//! pool.run_until_stalled();
//!
//! assert!(stores.preferences().no_ads());
//! assert!(placeholder.is_some());
//! assert_eq!(storage.keys(), vec!["placeholder-storage", "user-preferences"]);
//! ```

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod config;
pub mod error;
mod host_adapters;
pub mod persisted;
pub mod placeholder;
pub mod preferences;

use meow_host::{KeyValueStorage, RecordStorage};

pub use config::{ConfigLoader, StorageBackend, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use host_adapters::{storage_adapter, StorageAdapter};
pub use meow_host::{
    FileKeyValueStorage, MemoryKeyValueStorage, NoopKeyValueStorage, PersistedRecord,
    StorageError,
};
pub use persisted::{
    FlagState, Hydration, Migration, PersistedStore, StatePatch, StoreOptions, StorePhase,
    StoreWriter, WriteOutcome, DEFAULT_SCHEMA_VERSION,
};
pub use placeholder::{
    FixedIndexSource, IndexSource, PlaceholderCatalog, PlaceholderSelection, PlaceholderSelector,
    PlaceholderStore, RandomIndexSource, PLACEHOLDER_KEY, REFERENCE_PLACEHOLDERS,
};
pub use preferences::{
    PreferenceFlag, PreferenceStore, PreferencesPatch, StoredPreferences, PREFERENCES_KEY,
};

/// Root-owned set of client stores sharing one backing storage.
pub struct MeowStores<R = RandomIndexSource> {
    preferences: PreferenceStore,
    placeholders: PlaceholderSelector<String, R>,
}

impl MeowStores {
    /// Builds the configured storage backend and opens both stores over it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] when the configuration is invalid or the backend cannot be
    /// created. Storage read failures during hydration are recovered, not returned.
    pub async fn open(config: &StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        let storage = storage_adapter(config)?;
        leptos::logging::log!("opening stores on {} storage", storage.backend_name());
        Self::open_with(storage, config).await
    }

    /// Opens both stores over `storage`, ignoring the configured backend.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] when the storage keys are empty or shared.
    pub async fn open_with(
        storage: impl KeyValueStorage + 'static,
        config: &StoreConfig,
    ) -> StoreResult<Self> {
        Self::open_with_source(storage, config, RandomIndexSource).await
    }
}

impl<R: IndexSource> MeowStores<R> {
    /// Opens both stores over `storage` with a caller-provided index source.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Config`] when the storage keys are empty or shared.
    pub async fn open_with_source(
        storage: impl KeyValueStorage + 'static,
        config: &StoreConfig,
        source: R,
    ) -> StoreResult<Self> {
        config.validate_keys()?;
        let records = RecordStorage::new(storage);
        let (preferences, placeholder_store) = futures::join!(
            PreferenceStore::open_at(config.preferences_key.clone(), records.clone()),
            PlaceholderStore::open_at(config.placeholder_key.clone(), records),
        );
        Ok(Self {
            preferences,
            placeholders: PlaceholderSelector::new(
                placeholder_store,
                config.placeholder_catalog(),
                source,
            ),
        })
    }

    /// Preference flags.
    pub fn preferences(&self) -> &PreferenceStore {
        &self.preferences
    }

    /// Placeholder selector.
    pub fn placeholders(&self) -> &PlaceholderSelector<String, R> {
        &self.placeholders
    }

    /// Placeholder asset for this install; `None` only for an empty catalog.
    pub fn placeholder(&self) -> Option<&str> {
        self.placeholders.select().map(String::as_str)
    }

    /// Takes the writer futures of both stores. Empty after the first call.
    pub fn take_writers(&self) -> Vec<StoreWriter> {
        [
            self.preferences.take_writer(),
            self.placeholders.store().take_writer(),
        ]
        .into_iter()
        .flatten()
        .collect()
    }

    /// Spawns both writers on the browser event loop.
    #[cfg(all(target_arch = "wasm32", feature = "csr"))]
    pub fn spawn_writers(&self) {
        for writer in self.take_writers() {
            leptos::spawn_local(writer);
        }
    }
}
