//! Versioned record envelopes and the typed storage adapter built on [`KeyValueStorage`].

use std::rc::Rc;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

use super::kv::KeyValueStorage;
use crate::error::StorageError;
use crate::time::RecordClock;

/// Version of the [`PersistedRecord`] envelope layout itself.
pub const RECORD_ENVELOPE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/// Envelope persisted as text under its `name`.
pub struct PersistedRecord {
    /// Storage key that owns the record.
    pub name: String,
    /// Store-defined schema version of `value`.
    #[serde(default)]
    pub version: u32,
    /// Last update time in unix milliseconds.
    #[serde(default)]
    pub updated_at_unix_ms: u64,
    /// Full state object.
    pub value: Value,
}

impl PersistedRecord {
    /// Builds a record for `value` carrying the given update stamp.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialize`] when `value` cannot be converted to JSON.
    pub fn new<T: Serialize>(
        name: &str,
        version: u32,
        updated_at_unix_ms: u64,
        value: &T,
    ) -> Result<Self, StorageError> {
        let value = serde_json::to_value(value).map_err(|err| StorageError::Serialize {
            name: name.to_string(),
            message: err.to_string(),
        })?;
        Ok(Self {
            name: name.to_string(),
            version,
            updated_at_unix_ms,
            value,
        })
    }

    /// Stored text form of the envelope.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialize`] when encoding fails.
    pub fn to_text(&self) -> Result<String, StorageError> {
        serde_json::to_string(self).map_err(|err| StorageError::Serialize {
            name: self.name.clone(),
            message: err.to_string(),
        })
    }

    /// Parses stored text into an envelope.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Deserialize`] when the text is not a record envelope.
    pub fn decode(name: &str, raw: &str) -> Result<Self, StorageError> {
        serde_json::from_str(raw).map_err(|err| StorageError::Deserialize {
            name: name.to_string(),
            message: err.to_string(),
        })
    }

    /// Deserializes the envelope payload into a target type.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Deserialize`] when the payload shape does not match `T`.
    pub fn value_as<T: DeserializeOwned>(&self) -> Result<T, StorageError> {
        serde_json::from_value(self.value.clone()).map_err(|err| StorageError::Deserialize {
            name: self.name.clone(),
            message: err.to_string(),
        })
    }
}

#[derive(Clone)]
/// Typed record adapter over a shared [`KeyValueStorage`].
///
/// Clones share the same backing storage and [`RecordClock`].
pub struct RecordStorage {
    inner: Rc<dyn KeyValueStorage>,
    clock: RecordClock,
}

impl std::fmt::Debug for RecordStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStorage").finish_non_exhaustive()
    }
}

impl RecordStorage {
    /// Wraps a concrete storage implementation.
    pub fn new(storage: impl KeyValueStorage + 'static) -> Self {
        Self::from_shared(Rc::new(storage))
    }

    /// Wraps an already shared storage handle.
    pub fn from_shared(storage: Rc<dyn KeyValueStorage>) -> Self {
        Self {
            inner: storage,
            clock: RecordClock::default(),
        }
    }

    /// Clock stamping records written through this handle.
    pub fn clock(&self) -> &RecordClock {
        &self.clock
    }

    /// Encodes `value` as a freshly stamped record for `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialize`] when encoding fails.
    pub fn encode<T: Serialize>(
        &self,
        name: &str,
        version: u32,
        value: &T,
    ) -> Result<String, StorageError> {
        PersistedRecord::new(name, version, self.clock.stamp(), value)?.to_text()
    }

    /// Returns the underlying storage handle.
    pub fn shared(&self) -> Rc<dyn KeyValueStorage> {
        Rc::clone(&self.inner)
    }

    /// Loads the raw envelope stored under `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] when the backing read fails and
    /// [`StorageError::Deserialize`] when the stored text is malformed.
    pub async fn get_record(&self, name: &str) -> Result<Option<PersistedRecord>, StorageError> {
        let raw = self
            .inner
            .get_item(name)
            .await
            .map_err(|message| StorageError::Read {
                name: name.to_string(),
                message,
            })?;
        let record = raw.map(|raw| PersistedRecord::decode(name, &raw)).transpose()?;
        if let Some(record) = &record {
            self.clock.observe(record.updated_at_unix_ms);
        }
        Ok(record)
    }

    /// Loads and deserializes the value stored under `name`.
    ///
    /// A missing record is `Ok(None)`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Read`] or [`StorageError::Deserialize`]; callers treat both as an
    /// absent record.
    pub async fn get<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, StorageError> {
        match self.get_record(name).await? {
            Some(record) => record.value_as().map(Some),
            None => Ok(None),
        }
    }

    /// Serializes `value` and writes it under `name`, replacing any previous record.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Serialize`] or [`StorageError::Write`].
    pub async fn set<T: Serialize>(
        &self,
        name: &str,
        version: u32,
        value: &T,
    ) -> Result<(), StorageError> {
        let raw = self.encode(name, version, value)?;
        self.write_encoded(name, &raw).await
    }

    /// Writes text previously produced by [`RecordStorage::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] when the backing write fails.
    pub async fn write_encoded(&self, name: &str, raw: &str) -> Result<(), StorageError> {
        self.inner
            .set_item(name, raw)
            .await
            .map_err(|message| StorageError::Write {
                name: name.to_string(),
                message,
            })
    }

    /// Deletes the record stored under `name`. Succeeds when nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Write`] when the backing delete fails.
    pub async fn remove(&self, name: &str) -> Result<(), StorageError> {
        self.inner
            .remove_item(name)
            .await
            .map_err(|message| StorageError::Write {
                name: name.to_string(),
                message,
            })
    }
}

#[cfg(test)]
mod tests {
    use futures::executor::block_on;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::storage::kv::{KeyValueFuture, MemoryKeyValueStorage};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Flags {
        no_ads: bool,
        fantin_mode: bool,
    }

    struct BrokenStorage;

    impl KeyValueStorage for BrokenStorage {
        fn get_item<'a>(
            &'a self,
            _key: &'a str,
        ) -> KeyValueFuture<'a, Result<Option<String>, String>> {
            Box::pin(async { Err("disk unavailable".to_string()) })
        }

        fn set_item<'a>(
            &'a self,
            _key: &'a str,
            _value: &'a str,
        ) -> KeyValueFuture<'a, Result<(), String>> {
            Box::pin(async { Err("disk full".to_string()) })
        }

        fn remove_item<'a>(&'a self, _key: &'a str) -> KeyValueFuture<'a, Result<(), String>> {
            Box::pin(async { Err("disk unavailable".to_string()) })
        }
    }

    #[test]
    fn record_serialization_shape_is_stable() {
        let record = PersistedRecord {
            name: "user-preferences".to_string(),
            version: 1,
            updated_at_unix_ms: 1234,
            value: json!({"noAds": false, "fantinMode": false}),
        };

        let value = serde_json::to_value(&record).expect("serialize record");
        let object = value.as_object().expect("object");
        assert_eq!(object.get("name"), Some(&json!("user-preferences")));
        assert_eq!(object.get("version"), Some(&json!(1)));
        assert_eq!(object.get("updated_at_unix_ms"), Some(&json!(1234)));
        assert_eq!(
            object.get("value"),
            Some(&json!({"noAds": false, "fantinMode": false}))
        );
    }

    #[test]
    fn record_without_version_decodes_as_version_zero() {
        let record = PersistedRecord::decode(
            "placeholder-storage",
            r#"{"name":"placeholder-storage","value":{"randomPlaceholder":"3"}}"#,
        )
        .expect("decode");
        assert_eq!(record.version, 0);
        assert_eq!(record.value, json!({"randomPlaceholder": "3"}));
    }

    #[test]
    fn writes_are_stamped_after_the_newest_stored_record() {
        let memory = MemoryKeyValueStorage::default();
        let future_stamp = u64::MAX / 2;
        let stored = PersistedRecord::new("user-preferences", 1, future_stamp, &json!({}))
            .and_then(|record| record.to_text())
            .expect("encode");
        memory.insert_raw("user-preferences", &stored);

        let storage = RecordStorage::new(memory.clone());
        block_on(storage.get_record("user-preferences")).expect("read");
        block_on(storage.set("placeholder-storage", 1, &json!({"randomPlaceholder": "0"})))
            .expect("set");

        let written = PersistedRecord::decode(
            "placeholder-storage",
            &memory.peek("placeholder-storage").expect("written"),
        )
        .expect("decode");
        assert_eq!(written.updated_at_unix_ms, future_stamp + 1);
    }

    #[test]
    fn typed_get_returns_none_for_missing_record() {
        let storage = RecordStorage::new(MemoryKeyValueStorage::default());
        let loaded: Option<Flags> = block_on(storage.get("user-preferences")).expect("get");
        assert_eq!(loaded, None);
    }

    #[test]
    fn typed_set_then_get_round_trips() {
        let storage = RecordStorage::new(MemoryKeyValueStorage::default());
        let flags = Flags {
            no_ads: true,
            fantin_mode: false,
        };
        block_on(storage.set("user-preferences", 1, &flags)).expect("set");

        let loaded: Option<Flags> = block_on(storage.get("user-preferences")).expect("get");
        assert_eq!(loaded, Some(flags));
    }

    #[test]
    fn malformed_text_is_a_deserialize_error() {
        let memory = MemoryKeyValueStorage::default();
        memory.insert_raw("user-preferences", "{\"name\":");
        let storage = RecordStorage::new(memory);

        let err = block_on(storage.get::<Flags>("user-preferences")).expect_err("malformed");
        assert!(matches!(err, StorageError::Deserialize { .. }));
        assert_eq!(err.name(), "user-preferences");
    }

    #[test]
    fn payload_shape_mismatch_is_a_deserialize_error() {
        let storage = RecordStorage::new(MemoryKeyValueStorage::default());
        block_on(storage.set("user-preferences", 1, &json!({"noAds": "yes"}))).expect("set");

        let err = block_on(storage.get::<Flags>("user-preferences")).expect_err("mismatch");
        assert!(matches!(err, StorageError::Deserialize { .. }));
    }

    #[test]
    fn remove_deletes_and_is_idempotent() {
        let memory = MemoryKeyValueStorage::default();
        let storage = RecordStorage::new(memory.clone());
        block_on(storage.set("placeholder-storage", 1, &json!({"randomPlaceholder": "1"})))
            .expect("set");

        block_on(storage.remove("placeholder-storage")).expect("remove");
        block_on(storage.remove("placeholder-storage")).expect("remove again");
        assert_eq!(memory.peek("placeholder-storage"), None);
    }

    #[test]
    fn backing_failures_map_to_read_and_write_errors() {
        let storage = RecordStorage::new(BrokenStorage);

        let read = block_on(storage.get::<Flags>("user-preferences")).expect_err("read");
        assert_eq!(
            read,
            StorageError::Read {
                name: "user-preferences".to_string(),
                message: "disk unavailable".to_string(),
            }
        );

        let write = block_on(storage.set("user-preferences", 1, &json!({}))).expect_err("write");
        assert_eq!(write.to_string(), "storage write failed for `user-preferences`: disk full");
    }
}
