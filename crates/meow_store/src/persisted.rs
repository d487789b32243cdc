//! Generic persisted store: synchronous in-memory state mirrored to a [`RecordStorage`] key.
//!
//! A store moves through [`StorePhase::Uninitialized`], [`StorePhase::Hydrating`], and
//! [`StorePhase::Ready`] exactly once. Reads and mutations are synchronous and never fail; every
//! mutation enqueues one write of the full state. Writes for a store are applied by a single
//! [`StoreWriter`] future in issue order, and each write reports a [`WriteOutcome`].

use std::{
    cell::{Cell, RefCell},
    fmt,
    future::Future,
    pin::Pin,
    rc::{Rc, Weak},
    task::{Context, Poll},
};

use futures::{
    channel::mpsc::{self, UnboundedReceiver, UnboundedSender},
    future::LocalBoxFuture,
    StreamExt,
};
use leptos::logging;
use meow_host::{PersistedRecord, RecordStorage, StorageError};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::error::StoreError;

/// Schema version written by stores that do not configure one.
pub const DEFAULT_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// Lifecycle of a persisted store within one process run.
pub enum StorePhase {
    /// No hydration attempt has started.
    Uninitialized,
    /// The stored record is being loaded.
    Hydrating,
    /// Terminal; reached whether or not a record existed.
    Ready,
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Result of a hydration attempt.
pub enum Hydration {
    /// The stored record was decoded into memory.
    Restored,
    /// An older record was converted by the store's migration hook.
    Migrated {
        /// Schema version found in storage.
        from: u32,
    },
    /// No record exists; state stays at the defaults and nothing is written.
    Defaults,
    /// The record could not be read or decoded and was treated as absent.
    Recovered(StoreError),
    /// Hydration did not touch memory: the store was already hydrating or ready, or it was
    /// mutated before the record arrived.
    Skipped,
}

/// Converts a payload written under an older schema version into the current state shape.
pub type Migration<T> = fn(u32, &Value) -> Option<T>;

/// Schema settings for a [`PersistedStore`].
pub struct StoreOptions<T> {
    /// Version stamped on every record this store writes.
    pub schema_version: u32,
    /// Optional conversion for records carrying a different version.
    pub migrate: Option<Migration<T>>,
}

impl<T> Default for StoreOptions<T> {
    fn default() -> Self {
        Self {
            schema_version: DEFAULT_SCHEMA_VERSION,
            migrate: None,
        }
    }
}

impl<T> Clone for StoreOptions<T> {
    fn clone(&self) -> Self {
        Self {
            schema_version: self.schema_version,
            migrate: self.migrate,
        }
    }
}

impl<T> fmt::Debug for StoreOptions<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreOptions")
            .field("schema_version", &self.schema_version)
            .field("migrate", &self.migrate.is_some())
            .finish()
    }
}

/// Partial update merged into a store's state; fields the patch does not name are retained.
pub trait StatePatch<T> {
    /// Overwrites the named fields of `state`.
    fn apply_to(self, state: &mut T);
}

/// State shapes with named boolean flags that can be toggled.
pub trait FlagState {
    /// Identifier of one boolean field.
    type Flag: Copy;

    /// Mutable access to the field named by `flag`.
    fn flag_mut(&mut self, flag: Self::Flag) -> &mut bool;
}

#[derive(Debug, Clone, PartialEq, Eq)]
/// Outcome of one durable write.
pub struct WriteOutcome {
    /// Per-store sequence number of the mutation that produced the write, starting at 1.
    pub sequence: u64,
    /// Whether the write reached storage.
    pub result: Result<(), StoreError>,
}

struct WriteRequest {
    sequence: u64,
    raw: Result<String, StoreError>,
}

struct Subscribers<E> {
    senders: RefCell<Vec<UnboundedSender<E>>>,
}

impl<E: Clone> Subscribers<E> {
    fn new() -> Self {
        Self {
            senders: RefCell::new(Vec::new()),
        }
    }

    fn subscribe(&self) -> UnboundedReceiver<E> {
        let (tx, rx) = mpsc::unbounded();
        self.senders.borrow_mut().push(tx);
        rx
    }

    fn publish(&self, event: &E) {
        self.senders
            .borrow_mut()
            .retain(|tx| tx.unbounded_send(event.clone()).is_ok());
    }
}

struct Shared<T> {
    name: String,
    options: StoreOptions<T>,
    records: RecordStorage,
    state: RefCell<T>,
    phase: Cell<StorePhase>,
    dirty: Cell<bool>,
    hydration: RefCell<Option<Hydration>>,
    next_sequence: Cell<u64>,
    pending: Cell<usize>,
    last_write: RefCell<Option<WriteOutcome>>,
    queue: UnboundedSender<WriteRequest>,
    writer: RefCell<Option<StoreWriter>>,
    changes: Subscribers<T>,
    writes: Subscribers<WriteOutcome>,
}

impl<T> Shared<T> {
    fn finish_write(&self, outcome: WriteOutcome) {
        self.pending.set(self.pending.get().saturating_sub(1));
        self.writes.publish(&outcome);
        *self.last_write.borrow_mut() = Some(outcome);
    }
}

/// Future that applies a store's queued writes in order.
///
/// Taken once with [`PersistedStore::take_writer`] and driven by the owner's executor. It
/// completes after the store is dropped and the queue has drained.
pub struct StoreWriter {
    name: String,
    future: LocalBoxFuture<'static, ()>,
}

impl StoreWriter {
    /// Storage key this writer persists.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for StoreWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreWriter")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Future for StoreWriter {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        self.future.as_mut().poll(cx)
    }
}

async fn run_writer<T: 'static>(
    records: RecordStorage,
    name: String,
    mut queue: UnboundedReceiver<WriteRequest>,
    shared: Weak<Shared<T>>,
) {
    while let Some(request) = queue.next().await {
        let result = match request.raw {
            Ok(raw) => records
                .write_encoded(&name, &raw)
                .await
                .map_err(StoreError::from),
            Err(err) => Err(err),
        };
        if let Err(err) = &result {
            logging::warn!("persist {name} failed: {err}");
        }
        if let Some(shared) = shared.upgrade() {
            shared.finish_write(WriteOutcome {
                sequence: request.sequence,
                result,
            });
        }
    }
}

/// Typed state held in memory and mirrored to one storage key.
///
/// Clones share the same state, queue, and subscribers.
pub struct PersistedStore<T> {
    shared: Rc<Shared<T>>,
}

impl<T> Clone for PersistedStore<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for PersistedStore<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistedStore")
            .field("name", &self.shared.name)
            .field("phase", &self.shared.phase.get())
            .field("state", &*self.shared.state.borrow())
            .finish()
    }
}

impl<T> PersistedStore<T>
where
    T: Clone + Serialize + DeserializeOwned + 'static,
{
    /// Creates an uninitialized store owning `name` with default schema options.
    pub fn new(name: impl Into<String>, defaults: T, records: RecordStorage) -> Self {
        Self::with_options(name, defaults, records, StoreOptions::default())
    }

    /// Creates an uninitialized store owning `name`.
    pub fn with_options(
        name: impl Into<String>,
        defaults: T,
        records: RecordStorage,
        options: StoreOptions<T>,
    ) -> Self {
        let name = name.into();
        let (queue, rx) = mpsc::unbounded();
        let shared = Rc::new(Shared {
            name: name.clone(),
            options,
            records: records.clone(),
            state: RefCell::new(defaults),
            phase: Cell::new(StorePhase::Uninitialized),
            dirty: Cell::new(false),
            hydration: RefCell::new(None),
            next_sequence: Cell::new(1),
            pending: Cell::new(0),
            last_write: RefCell::new(None),
            queue,
            writer: RefCell::new(None),
            changes: Subscribers::new(),
            writes: Subscribers::new(),
        });
        let writer = StoreWriter {
            name: name.clone(),
            future: Box::pin(run_writer(records, name, rx, Rc::downgrade(&shared))),
        };
        *shared.writer.borrow_mut() = Some(writer);
        Self { shared }
    }

    /// Creates a store and hydrates it from storage.
    pub async fn open(name: impl Into<String>, defaults: T, records: RecordStorage) -> Self {
        Self::open_with_options(name, defaults, records, StoreOptions::default()).await
    }

    /// Creates a store with explicit schema options and hydrates it from storage.
    pub async fn open_with_options(
        name: impl Into<String>,
        defaults: T,
        records: RecordStorage,
        options: StoreOptions<T>,
    ) -> Self {
        let store = Self::with_options(name, defaults, records, options);
        store.hydrate().await;
        store
    }

    /// Loads the stored record into memory and marks the store ready.
    ///
    /// Never fails: unreadable or undecodable records leave the defaults in place and are
    /// reported as [`Hydration::Recovered`].
    pub async fn hydrate(&self) -> Hydration {
        if self.shared.phase.get() != StorePhase::Uninitialized {
            return Hydration::Skipped;
        }
        self.shared.phase.set(StorePhase::Hydrating);
        let loaded = self.shared.records.get_record(&self.shared.name).await;
        let hydration = self.apply_loaded(loaded);
        self.shared.phase.set(StorePhase::Ready);

        match &hydration {
            Hydration::Recovered(err) => {
                logging::warn!("hydrate {} failed, using defaults: {err}", self.shared.name);
            }
            Hydration::Migrated { from } => {
                logging::log!(
                    "hydrate {} migrated schema {from} -> {}",
                    self.shared.name,
                    self.shared.options.schema_version
                );
            }
            Hydration::Skipped => {
                logging::warn!(
                    "hydrate {} skipped: state changed before the record loaded",
                    self.shared.name
                );
            }
            Hydration::Restored | Hydration::Defaults => {}
        }
        *self.shared.hydration.borrow_mut() = Some(hydration.clone());
        hydration
    }

    fn apply_loaded(&self, loaded: Result<Option<PersistedRecord>, StorageError>) -> Hydration {
        let record = match loaded {
            Ok(Some(record)) => record,
            Ok(None) => return Hydration::Defaults,
            Err(err) => return Hydration::Recovered(err.into()),
        };
        let options = &self.shared.options;
        let decoded = if record.version == options.schema_version {
            record
                .value_as::<T>()
                .map(|value| (value, None))
                .map_err(StoreError::from)
        } else {
            options
                .migrate
                .and_then(|migrate| migrate(record.version, &record.value))
                .map(|value| (value, Some(record.version)))
                .ok_or_else(|| StoreError::UnsupportedVersion {
                    name: self.shared.name.clone(),
                    found: record.version,
                    expected: options.schema_version,
                })
        };
        let (value, migrated_from) = match decoded {
            Ok(decoded) => decoded,
            Err(err) => return Hydration::Recovered(err),
        };
        if self.shared.dirty.get() {
            return Hydration::Skipped;
        }
        *self.shared.state.borrow_mut() = value.clone();
        self.shared.changes.publish(&value);
        match migrated_from {
            Some(from) => Hydration::Migrated { from },
            None => Hydration::Restored,
        }
    }

    /// Returns a snapshot of the in-memory state.
    pub fn get_state(&self) -> T {
        self.shared.state.borrow().clone()
    }

    /// Reads the in-memory state without cloning it.
    pub fn with_state<R>(&self, read: impl FnOnce(&T) -> R) -> R {
        read(&self.shared.state.borrow())
    }

    /// Merges `patch` into the state and persists the result.
    pub fn set<P: StatePatch<T>>(&self, patch: P) {
        self.update(|state| patch.apply_to(state));
    }

    /// Mutates the state in place and persists the result.
    ///
    /// The change is visible to readers as soon as this returns. `mutate` must not call back
    /// into the same store.
    pub fn update(&self, mutate: impl FnOnce(&mut T)) {
        let snapshot = {
            let mut state = self.shared.state.borrow_mut();
            mutate(&mut state);
            state.clone()
        };
        self.shared.dirty.set(true);
        self.shared.changes.publish(&snapshot);
        self.enqueue_write(&snapshot);
    }

    fn enqueue_write(&self, snapshot: &T) {
        let shared = &self.shared;
        let sequence = shared.next_sequence.get();
        shared.next_sequence.set(sequence + 1);
        let raw = shared
            .records
            .encode(&shared.name, shared.options.schema_version, snapshot)
            .map_err(StoreError::from);
        shared.pending.set(shared.pending.get() + 1);
        if shared
            .queue
            .unbounded_send(WriteRequest { sequence, raw })
            .is_err()
        {
            let err = StoreError::Storage(StorageError::Write {
                name: shared.name.clone(),
                message: "store writer has stopped".to_string(),
            });
            logging::warn!("persist {} failed: {err}", shared.name);
            shared.finish_write(WriteOutcome {
                sequence,
                result: Err(err),
            });
        }
    }

    /// Takes the writer future. Returns `None` after the first call.
    pub fn take_writer(&self) -> Option<StoreWriter> {
        self.shared.writer.borrow_mut().take()
    }

    /// Subscribes to durable write outcomes, in write order.
    pub fn write_events(&self) -> UnboundedReceiver<WriteOutcome> {
        self.shared.writes.subscribe()
    }

    /// Subscribes to state snapshots published after each change, including hydration.
    pub fn changes(&self) -> UnboundedReceiver<T> {
        self.shared.changes.subscribe()
    }
}

impl<T> PersistedStore<T> {
    /// Storage key owned by this store.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> StorePhase {
        self.shared.phase.get()
    }

    /// Outcome of the completed hydration, if any.
    pub fn hydration(&self) -> Option<Hydration> {
        self.shared.hydration.borrow().clone()
    }

    /// Most recent write outcome.
    pub fn last_write(&self) -> Option<WriteOutcome> {
        self.shared.last_write.borrow().clone()
    }

    /// Number of writes enqueued but not yet finished.
    pub fn pending_writes(&self) -> usize {
        self.shared.pending.get()
    }
}

impl<T> PersistedStore<T>
where
    T: FlagState + Clone + Serialize + DeserializeOwned + 'static,
{
    /// Replaces the named boolean field with its complement and persists the result.
    pub fn toggle(&self, flag: T::Flag) {
        self.update(|state| {
            let value = state.flag_mut(flag);
            *value = !*value;
        });
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use futures::{
        channel::oneshot,
        executor::{block_on, LocalPool},
        task::LocalSpawnExt,
    };
    use meow_host::{KeyValueFuture, KeyValueStorage, MemoryKeyValueStorage};
    use pretty_assertions::assert_eq;
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    const KEY: &str = "test-counter";

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        count: u32,
        label: String,
        enabled: bool,
    }

    fn defaults() -> Counter {
        Counter {
            count: 0,
            label: "start".to_string(),
            enabled: false,
        }
    }

    struct Count(u32);

    impl StatePatch<Counter> for Count {
        fn apply_to(self, state: &mut Counter) {
            state.count = self.0;
        }
    }

    #[derive(Clone, Copy)]
    struct Enabled;

    impl FlagState for Counter {
        type Flag = Enabled;

        fn flag_mut(&mut self, _flag: Enabled) -> &mut bool {
            &mut self.enabled
        }
    }

    fn spawn_writer<T>(pool: &LocalPool, store: &PersistedStore<T>)
    where
        T: Clone + Serialize + DeserializeOwned + 'static,
    {
        let writer = store.take_writer().expect("writer available");
        pool.spawner().spawn_local(writer).expect("spawn writer");
    }

    fn stored_value(storage: &MemoryKeyValueStorage) -> serde_json::Value {
        let raw = storage.peek(KEY).expect("record stored");
        PersistedRecord::decode(KEY, &raw).expect("decode").value
    }

    #[derive(Clone, Default)]
    struct FlakyStorage {
        inner: MemoryKeyValueStorage,
        fail_writes: Rc<Cell<bool>>,
        writes: Rc<RefCell<HashMap<String, usize>>>,
    }

    impl KeyValueStorage for FlakyStorage {
        fn get_item<'a>(
            &'a self,
            key: &'a str,
        ) -> KeyValueFuture<'a, Result<Option<String>, String>> {
            self.inner.get_item(key)
        }

        fn set_item<'a>(
            &'a self,
            key: &'a str,
            value: &'a str,
        ) -> KeyValueFuture<'a, Result<(), String>> {
            *self.writes.borrow_mut().entry(key.to_string()).or_default() += 1;
            if self.fail_writes.get() {
                return Box::pin(async { Err("quota exceeded".to_string()) });
            }
            self.inner.set_item(key, value)
        }

        fn remove_item<'a>(&'a self, key: &'a str) -> KeyValueFuture<'a, Result<(), String>> {
            self.inner.remove_item(key)
        }
    }

    #[derive(Clone, Default)]
    struct GatedStorage {
        inner: MemoryKeyValueStorage,
        gate: Rc<RefCell<Option<oneshot::Receiver<()>>>>,
        read_gate: Rc<RefCell<Option<oneshot::Receiver<()>>>>,
    }

    impl KeyValueStorage for GatedStorage {
        fn get_item<'a>(
            &'a self,
            key: &'a str,
        ) -> KeyValueFuture<'a, Result<Option<String>, String>> {
            let gate = self.read_gate.borrow_mut().take();
            Box::pin(async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                self.inner.get_item(key).await
            })
        }

        fn set_item<'a>(
            &'a self,
            key: &'a str,
            value: &'a str,
        ) -> KeyValueFuture<'a, Result<(), String>> {
            let gate = self.gate.borrow_mut().take();
            Box::pin(async move {
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                self.inner.set_item(key, value).await
            })
        }

        fn remove_item<'a>(&'a self, key: &'a str) -> KeyValueFuture<'a, Result<(), String>> {
            self.inner.remove_item(key)
        }
    }

    #[test]
    fn lifecycle_moves_from_uninitialized_to_ready() {
        let store = PersistedStore::new(
            KEY,
            defaults(),
            RecordStorage::new(MemoryKeyValueStorage::default()),
        );
        assert_eq!(store.phase(), StorePhase::Uninitialized);
        assert_eq!(store.hydration(), None);

        assert_eq!(block_on(store.hydrate()), Hydration::Defaults);
        assert_eq!(store.phase(), StorePhase::Ready);
        assert_eq!(store.hydration(), Some(Hydration::Defaults));

        assert_eq!(block_on(store.hydrate()), Hydration::Skipped);
        assert_eq!(store.hydration(), Some(Hydration::Defaults));
    }

    #[test]
    fn store_is_hydrating_while_the_record_loads() {
        let storage = GatedStorage::default();
        let (release, gate) = oneshot::channel();
        *storage.read_gate.borrow_mut() = Some(gate);
        let store = PersistedStore::new(KEY, defaults(), RecordStorage::new(storage));
        let mut hydrate = Box::pin(store.hydrate());
        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);

        assert_eq!(hydrate.as_mut().poll(&mut cx), Poll::Pending);
        assert_eq!(store.phase(), StorePhase::Hydrating);
        assert_eq!(block_on(store.hydrate()), Hydration::Skipped);

        release.send(()).expect("release read");
        assert_eq!(hydrate.as_mut().poll(&mut cx), Poll::Ready(Hydration::Defaults));
        assert_eq!(store.phase(), StorePhase::Ready);
    }

    #[test]
    fn absent_record_keeps_defaults_and_writes_nothing() {
        let storage = MemoryKeyValueStorage::default();
        let store = block_on(PersistedStore::open(
            KEY,
            defaults(),
            RecordStorage::new(storage.clone()),
        ));

        assert_eq!(store.get_state(), defaults());
        assert_eq!(store.pending_writes(), 0);
        assert!(storage.keys().is_empty());
    }

    #[test]
    fn every_mutation_writes_the_full_state_once() {
        let storage = FlakyStorage::default();
        let mut pool = LocalPool::new();
        let store = block_on(PersistedStore::open(
            KEY,
            defaults(),
            RecordStorage::new(storage.clone()),
        ));
        spawn_writer(&pool, &store);

        store.set(Count(7));
        assert_eq!(store.get_state().count, 7);
        assert_eq!(store.pending_writes(), 1);
        pool.run_until_stalled();

        assert_eq!(storage.writes.borrow().get(KEY), Some(&1));
        assert_eq!(
            stored_value(&storage.inner),
            json!({"count": 7, "label": "start", "enabled": false})
        );
        assert_eq!(
            store.last_write(),
            Some(WriteOutcome {
                sequence: 1,
                result: Ok(()),
            })
        );
        assert_eq!(store.pending_writes(), 0);
    }

    #[test]
    fn patch_only_overwrites_named_fields() {
        let store = PersistedStore::new(
            KEY,
            defaults(),
            RecordStorage::new(MemoryKeyValueStorage::default()),
        );
        store.update(|state| state.label = "kept".to_string());
        store.set(Count(3));

        assert_eq!(
            store.get_state(),
            Counter {
                count: 3,
                label: "kept".to_string(),
                enabled: false,
            }
        );
    }

    #[test]
    fn double_toggle_restores_the_flag() {
        let store = PersistedStore::new(
            KEY,
            defaults(),
            RecordStorage::new(MemoryKeyValueStorage::default()),
        );
        store.toggle(Enabled);
        assert!(store.with_state(|state| state.enabled));
        store.toggle(Enabled);
        assert_eq!(store.get_state(), defaults());
    }

    #[test]
    fn state_survives_reopening_over_the_same_storage() {
        let storage = MemoryKeyValueStorage::default();
        let mut pool = LocalPool::new();
        let store = block_on(PersistedStore::open(
            KEY,
            defaults(),
            RecordStorage::new(storage.clone()),
        ));
        spawn_writer(&pool, &store);
        store.set(Count(42));
        pool.run_until_stalled();
        drop(store);

        let reopened = block_on(PersistedStore::open(
            KEY,
            defaults(),
            RecordStorage::new(storage),
        ));
        assert_eq!(reopened.hydration(), Some(Hydration::Restored));
        assert_eq!(reopened.get_state().count, 42);
    }

    #[test]
    fn malformed_record_recovers_to_defaults() {
        let storage = MemoryKeyValueStorage::default();
        storage.insert_raw(KEY, "not json");

        let store = block_on(PersistedStore::open(
            KEY,
            defaults(),
            RecordStorage::new(storage),
        ));
        assert!(matches!(
            store.hydration(),
            Some(Hydration::Recovered(StoreError::Storage(
                StorageError::Deserialize { .. }
            )))
        ));
        assert_eq!(store.get_state(), defaults());
        assert_eq!(store.phase(), StorePhase::Ready);
    }

    #[test]
    fn unknown_schema_version_without_migration_recovers() {
        let storage = MemoryKeyValueStorage::default();
        let records = RecordStorage::new(storage);
        block_on(records.set(KEY, 9, &json!({"count": 5}))).expect("seed");

        let store = block_on(PersistedStore::open(KEY, defaults(), records));
        assert_eq!(
            store.hydration(),
            Some(Hydration::Recovered(StoreError::UnsupportedVersion {
                name: KEY.to_string(),
                found: 9,
                expected: DEFAULT_SCHEMA_VERSION,
            }))
        );
        assert_eq!(store.get_state(), defaults());
    }

    #[test]
    fn migration_hook_converts_older_records() {
        fn migrate(from: u32, value: &Value) -> Option<Counter> {
            match from {
                0 => Some(Counter {
                    count: value.get("n")?.as_u64()? as u32,
                    label: "migrated".to_string(),
                    enabled: false,
                }),
                _ => None,
            }
        }

        let records = RecordStorage::new(MemoryKeyValueStorage::default());
        block_on(records.set(KEY, 0, &json!({"n": 12}))).expect("seed");

        let store = block_on(PersistedStore::open_with_options(
            KEY,
            defaults(),
            records,
            StoreOptions {
                schema_version: 2,
                migrate: Some(migrate),
            },
        ));
        assert_eq!(store.hydration(), Some(Hydration::Migrated { from: 0 }));
        assert_eq!(store.get_state().count, 12);
        assert_eq!(store.get_state().label, "migrated");
    }

    #[test]
    fn mutation_before_hydration_wins_over_the_stored_record() {
        let records = RecordStorage::new(MemoryKeyValueStorage::default());
        block_on(records.set(KEY, 1, &Counter {
            count: 99,
            ..defaults()
        }))
        .expect("seed");

        let store = PersistedStore::new(KEY, defaults(), records);
        store.set(Count(1));
        assert_eq!(block_on(store.hydrate()), Hydration::Skipped);
        assert_eq!(store.get_state().count, 1);
    }

    #[test]
    fn failed_write_keeps_memory_and_next_write_heals() {
        let storage = FlakyStorage::default();
        storage.fail_writes.set(true);
        let mut pool = LocalPool::new();
        let store = block_on(PersistedStore::open(
            KEY,
            defaults(),
            RecordStorage::new(storage.clone()),
        ));
        spawn_writer(&pool, &store);
        let mut events = store.write_events();

        store.set(Count(1));
        pool.run_until_stalled();
        assert_eq!(store.get_state().count, 1);
        let failed = events.try_next().expect("event ready").expect("open channel");
        assert_eq!(failed.sequence, 1);
        assert_eq!(
            failed.result,
            Err(StoreError::Storage(StorageError::Write {
                name: KEY.to_string(),
                message: "quota exceeded".to_string(),
            }))
        );
        assert_eq!(storage.inner.peek(KEY), None);

        storage.fail_writes.set(false);
        store.update(|state| state.label = "healed".to_string());
        pool.run_until_stalled();
        let healed = events.try_next().expect("event ready").expect("open channel");
        assert_eq!(healed.sequence, 2);
        assert_eq!(healed.result, Ok(()));
        assert_eq!(
            stored_value(&storage.inner),
            json!({"count": 1, "label": "healed", "enabled": false})
        );
    }

    #[test]
    fn slow_first_write_cannot_overwrite_a_later_one() {
        let storage = GatedStorage::default();
        let (release, gate) = oneshot::channel();
        *storage.gate.borrow_mut() = Some(gate);
        let mut pool = LocalPool::new();
        let store = block_on(PersistedStore::open(
            KEY,
            defaults(),
            RecordStorage::new(storage.clone()),
        ));
        spawn_writer(&pool, &store);

        store.set(Count(1));
        store.set(Count(2));
        pool.run_until_stalled();
        assert_eq!(storage.inner.peek(KEY), None);
        assert_eq!(store.pending_writes(), 2);

        release.send(()).expect("release gate");
        pool.run_until_stalled();
        assert_eq!(store.pending_writes(), 0);
        assert_eq!(stored_value(&storage.inner)["count"], json!(2));
        assert_eq!(store.last_write().map(|outcome| outcome.sequence), Some(2));
    }

    #[test]
    fn change_subscribers_see_every_snapshot_in_order() {
        let store = PersistedStore::new(
            KEY,
            defaults(),
            RecordStorage::new(MemoryKeyValueStorage::default()),
        );
        let mut changes = store.changes();
        store.toggle(Enabled);
        store.toggle(Enabled);

        let first = changes.try_next().expect("ready").expect("open");
        let second = changes.try_next().expect("ready").expect("open");
        assert!(first.enabled);
        assert!(!second.enabled);
    }

    #[test]
    fn writer_is_taken_once_and_drains_after_store_drop() {
        let storage = MemoryKeyValueStorage::default();
        let mut pool = LocalPool::new();
        let store = PersistedStore::new(KEY, defaults(), RecordStorage::new(storage.clone()));
        let writer = store.take_writer().expect("writer");
        assert_eq!(writer.name(), KEY);
        assert!(store.take_writer().is_none());

        store.set(Count(5));
        drop(store);
        pool.run_until(writer);
        assert_eq!(stored_value(&storage)["count"], json!(5));
    }
}
