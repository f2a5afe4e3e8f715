//! Watchers: one reactive binding per observed key.

use crate::storage::with_slot_storage;
use crate::value::{Object, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

struct WatcherInner {
    target: Object,
    path: Vec<String>,
    callback: Box<dyn Fn(&Value)>,
    previous: RefCell<Value>,
}

/// A unit of reactive work bound to one key (or key path) of an object.
///
/// Creating a watcher makes it the active collector for exactly one read of
/// its key; every observed property touched by that read subscribes it.
/// When one of those properties changes, the watcher re-reads its key and
/// calls its callback only if the value really changed.
///
/// Dependencies are collected once, at construction. Handles are cheap to
/// clone and compare by identity.
///
/// Subscriber sets only hold weak references: once the last handle is
/// dropped the watcher stops receiving updates. Whoever creates a binding
/// keeps its handle, as [`crate::ViewModel`] does for compiled templates.
#[derive(Clone)]
pub struct Watcher {
    inner: Rc<WatcherInner>,
}

/// Non-owning reference to a watcher, held by subscriber sets.
#[derive(Clone)]
pub(crate) struct WeakWatcher(Weak<WatcherInner>);

impl WeakWatcher {
    pub fn upgrade(&self) -> Option<Watcher> {
        self.0.upgrade().map(|inner| Watcher { inner })
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl Watcher {
    /// Watch `target[key]`.
    pub fn new(target: &Object, key: &str, callback: impl Fn(&Value) + 'static) -> Self {
        Self::collect(target, vec![key.to_owned()], callback)
    }

    /// Watch a dot-separated path below `target`, e.g. `"user.name"`.
    ///
    /// Every observed property along the path subscribes the watcher, so
    /// replacing an intermediate object also re-evaluates it.
    pub fn path(target: &Object, path: &str, callback: impl Fn(&Value) + 'static) -> Self {
        let segments = path.split('.').map(str::to_owned).collect();
        Self::collect(target, segments, callback)
    }

    fn collect(target: &Object, path: Vec<String>, callback: impl Fn(&Value) + 'static) -> Self {
        let watcher = Self {
            inner: Rc::new(WatcherInner {
                target: target.clone(),
                path,
                callback: Box::new(callback),
                previous: RefCell::new(Value::Null),
            }),
        };

        // Collect dependencies during the first read, then restore whoever
        // was collecting before us.
        let outer = with_slot_storage(|storage| storage.set_observer(Some(watcher.clone())));
        let value = watcher.read();
        let restored = with_slot_storage(|storage| storage.set_observer(outer));
        debug_assert!(
            restored.as_ref() == Some(&watcher),
            "read-cursor changed during dependency collection"
        );
        drop(restored);

        tracing::trace!(key = %watcher.key(), "watcher created");
        *watcher.inner.previous.borrow_mut() = value;
        watcher
    }

    /// Re-read the watched key and run the callback if the value changed.
    ///
    /// NaN replacing NaN and an object replacing itself are not changes.
    /// The cached value is updated before the callback runs, so a callback
    /// that writes its own key leaves the latest value cached.
    pub fn invalidate(&self) {
        let next = self.read();
        if self.inner.previous.borrow().same_value(&next) {
            return;
        }
        let previous = self.inner.previous.replace(next.clone());
        drop(previous);
        (self.inner.callback)(&next);
    }

    /// The last value the watcher saw.
    pub fn previous(&self) -> Value {
        self.inner.previous.borrow().clone()
    }

    /// The watched key, with path segments joined by dots.
    pub fn key(&self) -> String {
        self.inner.path.join(".")
    }

    /// The object the watched key is read from.
    pub fn target(&self) -> &Object {
        &self.inner.target
    }

    pub(crate) fn downgrade(&self) -> WeakWatcher {
        WeakWatcher(Rc::downgrade(&self.inner))
    }

    fn read(&self) -> Value {
        let mut segments = self.inner.path.iter();
        let Some(first) = segments.next() else {
            return Value::Null;
        };
        let mut current = self.inner.target.get(first).unwrap_or_default();
        for segment in segments {
            current = match current.as_object() {
                Some(object) => object.get(segment).unwrap_or_default(),
                None => return Value::Null,
            };
        }
        current
    }
}

impl PartialEq for Watcher {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Watcher {}

impl fmt::Debug for Watcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watcher")
            .field("key", &self.key())
            .field("previous", &self.previous())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::ReactiveState;
    use parking_lot::Mutex;
    use rand::Rng;
    use serde_json::json;
    use std::sync::Arc;

    fn recorder() -> (Rc<RefCell<Vec<Value>>>, impl Fn(&Value) + 'static) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        (log, move |value: &Value| sink.borrow_mut().push(value.clone()))
    }

    #[test]
    fn test_counter_scenario() {
        let state = ReactiveState::new(json!({ "count": 0 }));
        let (recorded, callback) = recorder();
        let _watcher = state.watch("count", callback).unwrap();

        state.set("count", 5).unwrap();
        assert_eq!(*recorded.borrow(), vec![Value::from(5)]);

        state.set("count", 5).unwrap();
        assert_eq!(recorded.borrow().len(), 1);

        state.set("count", f64::NAN).unwrap();
        state.set("count", f64::NAN).unwrap();
        assert_eq!(*recorded.borrow(), vec![Value::from(5), Value::from(f64::NAN)]);
    }

    #[test]
    fn test_construction_caches_current_value() {
        let state = ReactiveState::new(json!({ "name": "ada" }));
        let watcher = state.watch("name", |_| {}).unwrap();
        assert_eq!(watcher.previous(), Value::from("ada"));
        assert_eq!(watcher.key(), "name");
        assert_eq!(state.object().unwrap().subscriber_count("name"), 1);
    }

    #[test]
    fn test_cursor_is_cleared_after_construction() {
        let state = ReactiveState::new(json!({ "watched": 0, "other": 0 }));
        let _watcher = state.watch("watched", |_| {}).unwrap();
        assert!(!with_slot_storage(|storage| storage.is_tracking()));

        // A later, unrelated read must not subscribe the last watcher.
        let _ = state.get("other");
        assert_eq!(state.object().unwrap().subscriber_count("other"), 0);
    }

    #[test]
    fn test_untracked_reads_subscribe_nobody() {
        let state = ReactiveState::new(json!({ "count": 0 }));
        let _ = state.get("count");
        state.set("count", 1).unwrap();
        assert_eq!(state.object().unwrap().subscriber_count("count"), 0);
    }

    #[test]
    fn test_watchers_on_same_key_fire_in_order() {
        let state = ReactiveState::new(json!({ "count": 0 }));
        let order = Rc::new(RefCell::new(Vec::new()));
        let _first = state
            .watch("count", {
                let order = order.clone();
                move |_| order.borrow_mut().push("u1")
            })
            .unwrap();
        let _second = state
            .watch("count", {
                let order = order.clone();
                move |_| order.borrow_mut().push("u2")
            })
            .unwrap();

        state.set("count", 1).unwrap();
        assert_eq!(*order.borrow(), vec!["u1", "u2"]);
    }

    #[test]
    fn test_nested_construction_restores_outer_collector() {
        let state = ReactiveState::new(json!({ "inner": 0 }));
        let root = state.object().unwrap();
        let outer = Watcher::new(&Object::new(), "unused", |_| {});
        let previous = with_slot_storage(|storage| storage.set_observer(Some(outer.clone())));
        assert!(previous.is_none());

        let nested = Watcher::new(root, "inner", |_| {});
        let restored = with_slot_storage(|storage| storage.set_observer(None));
        assert_eq!(restored, Some(outer.clone()));

        // Only the innermost collector subscribes while it is active.
        assert_eq!(root.subscriber_count("inner"), 1);
        assert_ne!(nested, outer);
    }

    #[test]
    fn test_self_writing_callback_keeps_latest_value() {
        let state = ReactiveState::new(json!({ "count": 0 }));
        let root = state.object().unwrap().clone();
        let log = Rc::new(RefCell::new(Vec::new()));
        let watcher = Watcher::new(&root, "count", {
            let root = root.clone();
            let log = log.clone();
            move |value| {
                log.borrow_mut().push(value.clone());
                let count = value.as_f64().unwrap_or(0.0);
                if count < 3.0 {
                    root.set("count", count + 1.0);
                }
            }
        });

        state.set("count", 1).unwrap();
        assert_eq!(watcher.previous(), Value::from(3));
        assert_eq!(log.borrow().len(), 3);

        // 3 -> 1 is a real change and must fire again.
        state.set("count", 1).unwrap();
        assert_eq!(log.borrow().len(), 6);
        assert_eq!(watcher.previous(), Value::from(3));
    }

    #[test]
    fn test_dropped_watcher_stops_receiving_updates() {
        let state = ReactiveState::new(json!({ "count": 0 }));
        let (log, callback) = recorder();
        let watcher = state.watch("count", callback).unwrap();
        state.set("count", 1).unwrap();

        drop(watcher);
        state.set("count", 2).unwrap();
        assert_eq!(*log.borrow(), vec![Value::from(1)]);
        assert_eq!(state.object().unwrap().subscriber_count("count"), 0);
    }

    #[test]
    fn test_object_replacement_is_a_change() {
        let state = ReactiveState::new(json!({ "a": { "b": 1 } }));
        let (log, callback) = recorder();
        let _watcher = state.watch("a", callback).unwrap();

        let same = state.get("a").unwrap();
        state.set("a", same).unwrap();
        assert!(log.borrow().is_empty());

        state.set("a", json!({ "b": 1 })).unwrap();
        assert_eq!(log.borrow().len(), 1);
    }

    #[test]
    fn test_nested_property_watcher() {
        let state = ReactiveState::new(json!({ "a": { "b": 1 } }));
        let a = state.get("a").unwrap();
        let (log, callback) = recorder();
        let _watcher = Watcher::new(a.as_object().unwrap(), "b", callback);

        state.object().unwrap().set_path("a.b", 2);
        assert_eq!(*log.borrow(), vec![Value::from(2)]);
    }

    #[test]
    fn test_path_watcher_follows_replaced_parent() {
        let state = ReactiveState::new(json!({ "user": { "name": "ada" } }));
        let (log, callback) = recorder();
        let watcher = state.watch_path("user.name", callback).unwrap();
        assert_eq!(watcher.key(), "user.name");

        state.object().unwrap().set_path("user.name", "grace");
        state.set("user", json!({ "name": "linus" })).unwrap();
        state.set("user", json!({ "name": "linus" })).unwrap();

        assert_eq!(
            *log.borrow(),
            vec![Value::from("grace"), Value::from("linus")]
        );
    }

    #[test]
    fn test_missing_key_reads_null() {
        let state = ReactiveState::new(json!({}));
        let watcher = state.watch("absent", |_| {}).unwrap();
        assert!(watcher.previous().is_null());
        watcher.invalidate();
        assert!(watcher.previous().is_null());
    }

    #[test]
    fn test_callback_writes_propagate_synchronously() {
        let state = ReactiveState::new(json!({ "celsius": 0, "fahrenheit": 32 }));
        let root = state.object().unwrap().clone();
        let _convert = Watcher::new(&root, "celsius", {
            let root = root.clone();
            move |value| {
                let celsius = value.as_f64().unwrap_or(f64::NAN);
                root.set("fahrenheit", celsius * 9.0 / 5.0 + 32.0);
            }
        });
        let (log, callback) = recorder();
        let _display = state.watch("fahrenheit", callback).unwrap();

        state.set("celsius", 100).unwrap();
        assert_eq!(*log.borrow(), vec![Value::from(212)]);
    }

    #[test]
    fn test_callback_count_matches_genuine_changes() {
        let state = ReactiveState::new(json!({ "n": 0 }));
        let calls = Arc::new(Mutex::new(0usize));
        let _watcher = state
            .watch("n", {
                let calls = calls.clone();
                move |_| *calls.lock() += 1
            })
            .unwrap();

        let mut rng = rand::thread_rng();
        let mut previous = Value::from(0);
        let mut expected = 0;
        for _ in 0..500 {
            let next = match rng.gen_range(0..4u8) {
                0 => Value::from(f64::NAN),
                _ => Value::from(rng.gen_range(0..3i32)),
            };
            if !next.same_value(&previous) {
                expected += 1;
            }
            previous = next.clone();
            state.set("n", next).unwrap();
        }
        assert_eq!(*calls.lock(), expected);
    }
}
