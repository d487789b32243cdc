//! Storage error taxonomy.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
/// Failures raised while reading, writing, or decoding a persisted record.
///
/// A missing record is never an error; [`crate::RecordStorage::get`] reports it as `Ok(None)`.
pub enum StorageError {
    /// The backing storage could not be read.
    #[error("storage read failed for `{name}`: {message}")]
    Read {
        /// Record name (storage key).
        name: String,
        /// Message reported by the backing storage.
        message: String,
    },
    /// The backing storage rejected a write or delete.
    #[error("storage write failed for `{name}`: {message}")]
    Write {
        /// Record name (storage key).
        name: String,
        /// Message reported by the backing storage.
        message: String,
    },
    /// Stored text exists but does not decode into the expected record shape.
    #[error("record `{name}` is malformed: {message}")]
    Deserialize {
        /// Record name (storage key).
        name: String,
        /// Decoder message.
        message: String,
    },
    /// The in-memory value could not be encoded.
    #[error("record `{name}` could not be encoded: {message}")]
    Serialize {
        /// Record name (storage key).
        name: String,
        /// Encoder message.
        message: String,
    },
}

impl StorageError {
    /// Returns the record name the failure refers to.
    pub fn name(&self) -> &str {
        match self {
            Self::Read { name, .. }
            | Self::Write { name, .. }
            | Self::Deserialize { name, .. }
            | Self::Serialize { name, .. } => name,
        }
    }
}
