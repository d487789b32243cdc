//! Store-level error taxonomy.

use meow_host::StorageError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Errors observed by the persisted stores.
///
/// None of these reach the UI by default: reads fall back to defaults, writes are reported on the
/// store's write-event channel, and placeholder index problems are repaired in place.
pub enum StoreError {
    /// Reading, writing, or decoding a record failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A stored record carries a schema version the store cannot migrate.
    #[error("record `{name}` has schema version {found}, expected {expected}")]
    UnsupportedVersion {
        /// Record name (storage key).
        name: String,
        /// Version found in storage.
        found: u32,
        /// Version the store writes.
        expected: u32,
    },
    /// A persisted placeholder value does not address a catalog entry.
    #[error("placeholder value `{value}` is outside a catalog of {len} entries")]
    IndexOutOfRange {
        /// Raw persisted value.
        value: String,
        /// Catalog length at lookup time.
        len: usize,
    },
    /// Configuration could not be loaded or is semantically invalid.
    #[error("invalid store config: {0}")]
    Config(String),
}

/// Convenience result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
