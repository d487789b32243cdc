//! Browser (`wasm32`) implementations of [`meow_host`] storage contracts.
//!
//! On native targets the adapters compile but hold nothing, so workspace tests and desktop
//! builds can link this crate without a browser.

#![warn(missing_docs, rustdoc::broken_intra_doc_links)]

pub mod storage;

pub use storage::local_storage::WebKeyValueStorage;
