//! Key-value storage contracts, record envelopes, and baseline adapters.

pub mod file;
pub mod kv;
pub mod record;
