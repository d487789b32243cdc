//! User preference flags persisted under `user-preferences`.

use futures::channel::mpsc::UnboundedReceiver;
use meow_host::RecordStorage;
use serde::{Deserialize, Serialize};

use crate::persisted::{
    FlagState, Hydration, PersistedStore, StatePatch, StorePhase, StoreWriter, WriteOutcome,
};

/// Storage key owned by the preference store.
pub const PREFERENCES_KEY: &str = "user-preferences";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// Persisted preference flags. Fields missing from a stored record fall back to `false`.
pub struct StoredPreferences {
    /// Hide advertising surfaces.
    pub no_ads: bool,
    /// Alternate "fantin" presentation mode.
    pub fantin_mode: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Boolean fields of [`StoredPreferences`].
pub enum PreferenceFlag {
    /// [`StoredPreferences::no_ads`].
    NoAds,
    /// [`StoredPreferences::fantin_mode`].
    FantinMode,
}

impl FlagState for StoredPreferences {
    type Flag = PreferenceFlag;

    fn flag_mut(&mut self, flag: PreferenceFlag) -> &mut bool {
        match flag {
            PreferenceFlag::NoAds => &mut self.no_ads,
            PreferenceFlag::FantinMode => &mut self.fantin_mode,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
/// Partial preference update; `None` fields keep their current value.
pub struct PreferencesPatch {
    /// New value for `no_ads`.
    pub no_ads: Option<bool>,
    /// New value for `fantin_mode`.
    pub fantin_mode: Option<bool>,
}

impl StatePatch<StoredPreferences> for PreferencesPatch {
    fn apply_to(self, state: &mut StoredPreferences) {
        if let Some(no_ads) = self.no_ads {
            state.no_ads = no_ads;
        }
        if let Some(fantin_mode) = self.fantin_mode {
            state.fantin_mode = fantin_mode;
        }
    }
}

#[derive(Debug, Clone)]
/// Preference store handed to settings screens and ad surfaces.
pub struct PreferenceStore {
    inner: PersistedStore<StoredPreferences>,
}

impl PreferenceStore {
    /// Opens the store under [`PREFERENCES_KEY`] and hydrates it.
    pub async fn open(records: RecordStorage) -> Self {
        Self::open_at(PREFERENCES_KEY, records).await
    }

    /// Opens the store under a custom key and hydrates it.
    pub async fn open_at(name: impl Into<String>, records: RecordStorage) -> Self {
        Self {
            inner: PersistedStore::open(name, StoredPreferences::default(), records).await,
        }
    }

    /// Wraps an existing persisted store.
    pub fn from_store(inner: PersistedStore<StoredPreferences>) -> Self {
        Self { inner }
    }

    /// Current flags.
    pub fn get_state(&self) -> StoredPreferences {
        self.inner.get_state()
    }

    /// Whether ads are hidden.
    pub fn no_ads(&self) -> bool {
        self.inner.with_state(|state| state.no_ads)
    }

    /// Whether fantin mode is on.
    pub fn fantin_mode(&self) -> bool {
        self.inner.with_state(|state| state.fantin_mode)
    }

    /// Flips one flag.
    pub fn toggle(&self, flag: PreferenceFlag) {
        self.inner.toggle(flag);
    }

    /// Flips `no_ads`.
    pub fn toggle_no_ads(&self) {
        self.toggle(PreferenceFlag::NoAds);
    }

    /// Flips `fantin_mode`.
    pub fn toggle_fantin_mode(&self) {
        self.toggle(PreferenceFlag::FantinMode);
    }

    /// Merges a partial update.
    pub fn set(&self, patch: PreferencesPatch) {
        self.inner.set(patch);
    }

    /// Lifecycle phase of the underlying store.
    pub fn phase(&self) -> StorePhase {
        self.inner.phase()
    }

    /// Hydration outcome of the underlying store.
    pub fn hydration(&self) -> Option<Hydration> {
        self.inner.hydration()
    }

    /// Takes the writer future; see [`PersistedStore::take_writer`].
    pub fn take_writer(&self) -> Option<StoreWriter> {
        self.inner.take_writer()
    }

    /// Subscribes to durable write outcomes.
    pub fn write_events(&self) -> UnboundedReceiver<WriteOutcome> {
        self.inner.write_events()
    }

    /// Subscribes to flag snapshots.
    pub fn changes(&self) -> UnboundedReceiver<StoredPreferences> {
        self.inner.changes()
    }

    /// Underlying persisted store.
    pub fn store(&self) -> &PersistedStore<StoredPreferences> {
        &self.inner
    }
}
