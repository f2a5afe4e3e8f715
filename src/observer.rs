//! Instrumentation: turning plain objects into observed ones.
//!
//! [`observe`] walks a value depth-first and moves every plain property of
//! every reachable object into an arena slot. Afterwards reads of those
//! properties collect dependencies and writes notify subscribers.

use crate::error::{Error, Result};
use crate::storage::{with_slot_storage, SlotId};
use crate::value::{Object, Property, Value};
use crate::watcher::Watcher;
use std::collections::HashSet;

/// Make `value` and every object reachable from it reactive.
///
/// Non-objects are left alone. Shared and cyclic object graphs are visited
/// once per object. Properties that are already observed keep their slot and
/// subscribers, so observing the same value twice is harmless.
pub fn observe(value: &Value) {
    let mut visited = HashSet::new();
    walk(value, &mut visited);
}

fn walk(value: &Value, visited: &mut HashSet<usize>) {
    let Some(object) = value.as_object() else {
        return;
    };
    if !visited.insert(object.id()) {
        return;
    }
    for key in object.keys() {
        define_reactive(object, &key, visited);
    }
}

fn define_reactive(object: &Object, key: &str, visited: &mut HashSet<usize>) {
    match object.property(key) {
        Some(Property::Plain(value)) => {
            // Nested objects become reactive before their parent slot exists.
            walk(&value, visited);
            let id = with_slot_storage(|storage| storage.insert(value));
            let replaced = object.replace_property(key, Property::Observed(id));
            drop(replaced);
            tracing::debug!(key, slot = ?id, "observing property");
        }
        Some(Property::Observed(id)) => {
            let current = with_slot_storage(|storage| storage.get(id).cloned());
            if let Some(current) = current {
                walk(&current, visited);
            }
        }
        None => {}
    }
}

/// The write half of an observed property.
pub(crate) fn write(id: SlotId, value: Value) {
    let stored = value.clone();
    let previous = match with_slot_storage(|storage| storage.set(id, value)) {
        Ok(previous) => previous,
        Err(_unchanged) => return,
    };
    drop(previous);
    observe(&stored);
    let subscribers = with_slot_storage(|storage| storage.subscribers(id));
    subscribers.broadcast();
}

/// A reactive state graph rooted at one value.
///
/// The root is instrumented once at construction. A primitive root is
/// accepted but has no properties to observe.
///
/// ```rust,no_run
/// use serde_json::json;
/// use vue_signals::ReactiveState;
///
/// let state = ReactiveState::new(json!({ "count": 0 }));
/// let _watcher = state.watch("count", |value| println!("count is now {value}"))?;
/// state.set("count", 1)?;
/// # Ok::<(), vue_signals::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct ReactiveState {
    root: Value,
}

impl ReactiveState {
    /// Make `data` reactive and keep it as the root.
    pub fn new(data: impl Into<Value>) -> Self {
        let root = data.into();
        observe(&root);
        Self { root }
    }

    /// The root value.
    pub fn root(&self) -> &Value {
        &self.root
    }

    /// The root object, if the root is one.
    pub fn object(&self) -> Option<&Object> {
        self.root.as_object()
    }

    /// Tracked read of a root property.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.object()?.get(key)
    }

    /// Tracked read of a dot-separated path below the root.
    pub fn get_path(&self, path: &str) -> Option<Value> {
        self.object()?.get_path(path)
    }

    /// Write a root property, broadcasting if it changed.
    pub fn set(&self, key: &str, value: impl Into<Value>) -> Result<()> {
        self.require_object()?.set(key, value);
        Ok(())
    }

    /// Create a watcher on a root property.
    pub fn watch(&self, key: &str, callback: impl Fn(&Value) + 'static) -> Result<Watcher> {
        Ok(Watcher::new(self.require_object()?, key, callback))
    }

    /// Create a watcher on a dot-separated path below the root.
    pub fn watch_path(
        &self,
        path: &str,
        callback: impl Fn(&Value) + 'static,
    ) -> Result<Watcher> {
        Ok(Watcher::path(self.require_object()?, path, callback))
    }

    /// Untracked JSON snapshot of the whole state.
    pub fn snapshot(&self) -> Result<serde_json::Value> {
        self.root.to_json()
    }

    fn require_object(&self) -> Result<&Object> {
        self.object().ok_or(Error::NotAnObject)
    }
}
