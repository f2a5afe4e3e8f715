//! Generational arena storage for observable slots.
//!
//! Observed properties keep their value here instead of on the owning
//! object. The slot map hands out generational `SlotId`s, so a slot released
//! by a dropped object can never be reached through a stale id.

use crate::subscribers::SubscriberSet;
use crate::value::Value;
use crate::watcher::Watcher;
use slotmap::{new_key_type, SlotMap};
use std::cell::RefCell;

new_key_type! {
    /// Unique identifier for an observable slot in the storage.
    pub struct SlotId;
}

/// The current value of one observed property and the units reading it.
pub(crate) struct SlotEntry {
    pub value: Value,
    pub subscribers: SubscriberSet,
}

/// Thread-local storage for all observable slots.
///
/// Besides the slots themselves this holds the read-cursor: the watcher
/// currently collecting its dependencies, if any.
pub(crate) struct SlotStorage {
    slots: SlotMap<SlotId, SlotEntry>,
    current_observer: Option<Watcher>,
}

impl SlotStorage {
    /// Create a new empty slot storage.
    pub fn new() -> Self {
        Self {
            slots: SlotMap::with_key(),
            current_observer: None,
        }
    }

    /// Insert a new slot holding `value` and return its ID.
    pub fn insert(&mut self, value: Value) -> SlotId {
        self.slots.insert(SlotEntry {
            value,
            subscribers: SubscriberSet::new(),
        })
    }

    /// Get a reference to a slot's value without tracking.
    pub fn get(&self, id: SlotId) -> Option<&Value> {
        self.slots.get(id).map(|entry| &entry.value)
    }

    /// Read a slot's value, registering the active watcher first.
    pub fn read(&mut self, id: SlotId) -> Option<Value> {
        self.track_read(id);
        self.get(id).cloned()
    }

    /// Store `value` if it differs from the current one.
    ///
    /// Returns the replaced value on change. When the value is unchanged, or
    /// the slot is gone, the argument is handed back so the caller drops it
    /// outside the storage borrow.
    pub fn set(&mut self, id: SlotId, value: Value) -> Result<Value, Value> {
        match self.slots.get_mut(id) {
            Some(entry) if !entry.value.same_value(&value) => {
                Ok(std::mem::replace(&mut entry.value, value))
            }
            _ => Err(value),
        }
    }

    /// Snapshot of the subscribers of a slot, safe to broadcast after the
    /// storage borrow ends.
    pub fn subscribers(&self, id: SlotId) -> SubscriberSet {
        self.slots
            .get(id)
            .map(|entry| entry.subscribers.clone())
            .unwrap_or_default()
    }

    /// Track a read for the current observer.
    ///
    /// The slot only keeps a weak reference, so the watcher's owner decides
    /// how long the subscription lives.
    pub fn track_read(&mut self, id: SlotId) {
        if let Some(observer) = &self.current_observer {
            if let Some(entry) = self.slots.get_mut(id) {
                tracing::trace!(slot = ?id, key = %observer.key(), "collecting dependency");
                entry.subscribers.register(observer);
            }
        }
    }

    /// Set the current observer for dependency tracking, returning the one
    /// it replaces so the caller can restore it.
    pub fn set_observer(&mut self, observer: Option<Watcher>) -> Option<Watcher> {
        std::mem::replace(&mut self.current_observer, observer)
    }

    /// Whether a watcher is currently collecting dependencies.
    #[cfg(test)]
    pub fn is_tracking(&self) -> bool {
        self.current_observer.is_some()
    }

    /// Remove a slot from the arena.
    pub fn remove(&mut self, id: SlotId) -> Option<SlotEntry> {
        self.slots.remove(id)
    }

    /// Number of live slots.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.slots.len()
    }
}

thread_local! {
    static STORAGE: RefCell<SlotStorage> = RefCell::new(SlotStorage::new());
}

/// Access the thread-local slot storage.
///
/// Nothing that can run user code or drop a `Value` may happen inside `f`.
pub(crate) fn with_slot_storage<R>(f: impl FnOnce(&mut SlotStorage) -> R) -> R {
    STORAGE.with(|storage| f(&mut storage.borrow_mut()))
}

/// Release the slots of a dropped object.
///
/// Runs from `Drop`, so it tolerates a storage that is already borrowed or
/// being torn down at thread exit; in both cases the slots are left alone.
pub(crate) fn release_slots(ids: &[SlotId]) {
    if ids.is_empty() {
        return;
    }
    let released: Vec<SlotEntry> = STORAGE
        .try_with(|storage| match storage.try_borrow_mut() {
            Ok(mut storage) => ids.iter().filter_map(|id| storage.remove(*id)).collect(),
            Err(_) => Vec::new(),
        })
        .unwrap_or_default();
    // Entries may own the last handle to other objects; drop them unborrowed.
    drop(released);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::ReactiveState;
    use crate::value::Object;
    use serde_json::json;

    fn slot_count() -> usize {
        with_slot_storage(|storage| storage.len())
    }

    #[test]
    fn test_insert_and_get() {
        with_slot_storage(|storage| {
            let id = storage.insert(Value::from(42));
            assert_eq!(storage.get(id), Some(&Value::from(42)));
        });
    }

    #[test]
    fn test_set_returns_previous_on_change() {
        let id = with_slot_storage(|storage| storage.insert(Value::from(1)));
        let outcome = with_slot_storage(|storage| storage.set(id, Value::from(2)));
        assert_eq!(outcome.ok(), Some(Value::from(1)));
        assert_eq!(
            with_slot_storage(|storage| storage.get(id).cloned()),
            Some(Value::from(2))
        );
    }

    #[test]
    fn test_set_hands_back_unchanged_value() {
        let id = with_slot_storage(|storage| storage.insert(Value::from(f64::NAN)));
        let outcome = with_slot_storage(|storage| storage.set(id, Value::from(f64::NAN)));
        assert!(outcome.is_err());
    }

    #[test]
    fn test_read_without_observer_registers_nothing() {
        with_slot_storage(|storage| {
            let id = storage.insert(Value::from("x"));
            assert!(!storage.is_tracking());
            assert_eq!(storage.read(id), Some(Value::from("x")));
            assert!(storage.subscribers(id).is_empty());
        });
    }

    #[test]
    fn test_dropping_object_releases_its_slots() {
        let before = with_slot_storage(|storage| storage.len());
        {
            let state = Object::from_iter([("a", Value::from(1)), ("b", Value::from(2))]);
            crate::observer::observe(&Value::Object(state.clone()));
            assert_eq!(with_slot_storage(|storage| storage.len()), before + 2);
        }
        assert_eq!(with_slot_storage(|storage| storage.len()), before);
    }

    #[test]
    fn test_watched_object_releases_its_slots() {
        let before = slot_count();
        {
            let state = ReactiveState::new(json!({ "count": 0, "nested": { "x": 1 } }));
            let _watcher = state.watch("count", |_| {}).unwrap();
            let _nested = state.watch_path("nested.x", |_| {}).unwrap();
            state.set("count", 1).unwrap();
            assert_eq!(slot_count(), before + 3);
        }
        assert_eq!(slot_count(), before);
    }

    #[test]
    fn test_replaced_nested_object_releases_its_slots() {
        let state = ReactiveState::new(json!({ "a": { "b": 0 } }));
        let _watcher = state.watch_path("a.b", |_| {}).unwrap();
        let before = slot_count();

        for n in 0..100 {
            state.set("a", json!({ "b": n })).unwrap();
        }
        assert_eq!(slot_count(), before);
    }
}
