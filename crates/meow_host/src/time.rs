//! Update stamps for persisted records.

use std::cell::Cell;
use std::rc::Rc;

#[derive(Debug, Clone, Default)]
/// Issues `updated_at_unix_ms` stamps for records written through one storage handle.
///
/// Clones share the clock. Stamps strictly increase and never fall at or below a stamp the
/// handle has read back from storage, so a wall clock that stepped backwards since the previous
/// run still orders new records after the stored ones.
pub struct RecordClock {
    latest: Rc<Cell<u64>>,
}

impl RecordClock {
    /// Records a stamp read from storage.
    pub fn observe(&self, stamp_ms: u64) {
        if stamp_ms > self.latest.get() {
            self.latest.set(stamp_ms);
        }
    }

    /// Next stamp for a record about to be written.
    pub fn stamp(&self) -> u64 {
        let next = wall_clock_ms().max(self.latest.get().saturating_add(1));
        self.latest.set(next);
        next
    }

    /// Newest stamp issued or observed, `0` before any.
    pub fn latest(&self) -> u64 {
        self.latest.get()
    }
}

#[cfg(target_arch = "wasm32")]
fn wall_clock_ms() -> u64 {
    js_sys::Date::now().max(0.0) as u64
}

#[cfg(not(target_arch = "wasm32"))]
fn wall_clock_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
