//! Typed storage contracts shared by the MEOW client stores and their platform adapters.
//!
//! This crate is the boundary between the persisted stores in `meow_store` and whatever
//! asynchronous string key-value primitive the platform offers. It exposes the
//! [`KeyValueStorage`] service trait, baseline in-memory/no-op/file implementations, the
//! versioned [`PersistedRecord`] envelope, and the [`RecordStorage`] adapter that turns raw
//! text storage into typed records. Browser `localStorage` lives in `meow_host_web`.

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod error;
pub mod storage;
pub mod time;

pub use error::StorageError;
pub use storage::file::FileKeyValueStorage;
pub use storage::kv::{
    KeyValueFuture, KeyValueStorage, MemoryKeyValueStorage, NoopKeyValueStorage,
};
pub use storage::record::{PersistedRecord, RecordStorage, RECORD_ENVELOPE_VERSION};
pub use time::RecordClock;
