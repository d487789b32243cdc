//! Stable per-install placeholder asset selection.
//!
//! The first lookup draws an index into the catalog and persists it as a decimal string under
//! `placeholder-storage`; every later lookup, including after a restart, returns the same entry.
//! A persisted value that no longer addresses the catalog (for example after the catalog shrank)
//! is re-rolled and the new index overwrites it.

use std::{cell::RefCell, collections::VecDeque};

use futures::channel::mpsc::UnboundedReceiver;
use leptos::logging;
use meow_host::RecordStorage;
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::persisted::{Hydration, PersistedStore, StoreWriter, WriteOutcome};

/// Storage key owned by the placeholder store.
pub const PLACEHOLDER_KEY: &str = "placeholder-storage";

/// Asset references of the bundled placeholder catalog, in index order.
pub const REFERENCE_PLACEHOLDERS: [&str; 5] = [
    "assets/placeholders/placeholder-1.png",
    "assets/placeholders/placeholder-2.png",
    "assets/placeholders/placeholder-3.png",
    "assets/placeholders/placeholder-4.png",
    "assets/placeholders/placeholder-5.png",
];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
/// Persisted placeholder choice. An empty string means no index has been drawn yet.
pub struct PlaceholderSelection {
    /// Decimal catalog index.
    pub random_placeholder: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Fixed, index-addressable list of placeholder assets.
pub struct PlaceholderCatalog<A> {
    assets: Vec<A>,
}

impl<A> PlaceholderCatalog<A> {
    /// Creates a catalog from assets in index order.
    pub fn new(assets: Vec<A>) -> Self {
        Self { assets }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    /// Whether the catalog has no entries.
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Entry at `index`.
    pub fn get(&self, index: usize) -> Option<&A> {
        self.assets.get(index)
    }

    /// Entries in index order.
    pub fn iter(&self) -> impl Iterator<Item = &A> {
        self.assets.iter()
    }
}

impl PlaceholderCatalog<String> {
    /// The bundled five-entry catalog.
    pub fn reference() -> Self {
        Self::new(REFERENCE_PLACEHOLDERS.iter().map(|s| s.to_string()).collect())
    }
}

impl<A> FromIterator<A> for PlaceholderCatalog<A> {
    fn from_iter<I: IntoIterator<Item = A>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// Source of uniform integer draws.
pub trait IndexSource {
    /// Draws an index in `[0, len)`. Callers never pass `len == 0`.
    fn draw(&mut self, len: usize) -> usize;
}

#[derive(Debug, Clone, Copy, Default)]
/// Platform randomness: `rand::thread_rng` natively, `Math.random` in the browser.
pub struct RandomIndexSource;

impl IndexSource for RandomIndexSource {
    fn draw(&mut self, len: usize) -> usize {
        #[cfg(target_arch = "wasm32")]
        {
            let scaled = js_sys::Math::random() * len as f64;
            (scaled as usize).min(len - 1)
        }

        #[cfg(not(target_arch = "wasm32"))]
        {
            use rand::Rng;
            rand::thread_rng().gen_range(0..len)
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Replays scripted draws, reduced modulo the requested length, and counts them.
///
/// Once the script is exhausted every draw returns 0.
pub struct FixedIndexSource {
    script: VecDeque<usize>,
    taken: usize,
}

impl FixedIndexSource {
    /// Creates a source that returns `draws` in order.
    pub fn new(draws: impl IntoIterator<Item = usize>) -> Self {
        Self {
            script: draws.into_iter().collect(),
            taken: 0,
        }
    }

    /// Number of draws served so far.
    pub fn taken(&self) -> usize {
        self.taken
    }
}

impl IndexSource for FixedIndexSource {
    fn draw(&mut self, len: usize) -> usize {
        self.taken += 1;
        self.script.pop_front().unwrap_or(0) % len
    }
}

#[derive(Debug, Clone)]
/// Persisted store holding the drawn placeholder index.
pub struct PlaceholderStore {
    inner: PersistedStore<PlaceholderSelection>,
}

impl PlaceholderStore {
    /// Opens the store under [`PLACEHOLDER_KEY`] and hydrates it.
    pub async fn open(records: RecordStorage) -> Self {
        Self::open_at(PLACEHOLDER_KEY, records).await
    }

    /// Opens the store under a custom key and hydrates it.
    pub async fn open_at(name: impl Into<String>, records: RecordStorage) -> Self {
        Self {
            inner: PersistedStore::open(name, PlaceholderSelection::default(), records).await,
        }
    }

    /// Wraps an existing persisted store.
    pub fn from_store(inner: PersistedStore<PlaceholderSelection>) -> Self {
        Self { inner }
    }

    /// Current selection.
    pub fn get_state(&self) -> PlaceholderSelection {
        self.inner.get_state()
    }

    /// Raw persisted value, empty when unset.
    pub fn raw_value(&self) -> String {
        self.inner
            .with_state(|state| state.random_placeholder.clone())
    }

    /// Stores `index` as the selection and persists it.
    pub fn assign(&self, index: usize) {
        self.inner
            .update(|state| state.random_placeholder = index.to_string());
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

    /// Underlying persisted store.
    pub fn store(&self) -> &PersistedStore<PlaceholderSelection> {
        &self.inner
    }
}

/// Maps the persisted placeholder index to a catalog entry, drawing it on first use.
pub struct PlaceholderSelector<A, R = RandomIndexSource> {
    store: PlaceholderStore,
    catalog: PlaceholderCatalog<A>,
    source: RefCell<R>,
}

impl<A: std::fmt::Debug, R> std::fmt::Debug for PlaceholderSelector<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaceholderSelector")
            .field("store", &self.store)
            .field("catalog", &self.catalog)
            .finish_non_exhaustive()
    }
}

impl<A, R: IndexSource> PlaceholderSelector<A, R> {
    /// Creates a selector over `catalog`.
    pub fn new(store: PlaceholderStore, catalog: PlaceholderCatalog<A>, source: R) -> Self {
        Self {
            store,
            catalog,
            source: RefCell::new(source),
        }
    }

    /// Returns the catalog index for this install, drawing and persisting it when unset or
    /// invalid. `None` only for an empty catalog.
    pub fn index(&self) -> Option<usize> {
        let len = self.catalog.len();
        if len == 0 {
            return None;
        }
        let raw = self.store.raw_value();
        if !raw.is_empty() {
            match raw.trim().parse::<usize>() {
                Ok(index) if index < len => {
                    if raw != index.to_string() {
                        self.store.assign(index);
                    }
                    return Some(index);
                }
                _ => {
                    let err = StoreError::IndexOutOfRange { value: raw, len };
                    logging::warn!("placeholder selection reset: {err}");
                }
            }
        }
        let index = self.source.borrow_mut().draw(len);
        self.store.assign(index);
        Some(index)
    }

    /// Returns the placeholder asset for this install.
    pub fn select(&self) -> Option<&A> {
        self.index().and_then(|index| self.catalog.get(index))
    }

    /// The catalog this selector maps into.
    pub fn catalog(&self) -> &PlaceholderCatalog<A> {
        &self.catalog
    }

    /// The backing placeholder store.
    pub fn store(&self) -> &PlaceholderStore {
        &self.store
    }

    /// The index source.
    pub fn source(&self) -> std::cell::Ref<'_, R> {
        self.source.borrow()
    }
}
