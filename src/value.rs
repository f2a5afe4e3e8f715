//! Dynamic values and shared objects.
//!
//! An [`Object`] is a shared handle: cloning it aliases the same property
//! map, and two handles compare equal only when they are the same object.
//! Each property is either plain (stored on the object) or observed (stored
//! in a slot of the thread-local arena). `get` and `set` hide the
//! difference, so code reading and writing state is the same before and
//! after instrumentation.

use crate::error::{Error, Result};
use crate::observer;
use crate::storage::{self, with_slot_storage, SlotId};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::rc::Rc;

/// A value held by an object property.
#[derive(Clone, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Object(Object),
}

impl Value {
    /// The change test used everywhere a write or an invalidation decides
    /// whether anything happened.
    ///
    /// Numbers are equal when `==` holds or when both are NaN. Objects are
    /// equal only when they are the same object.
    pub fn same_value(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            _ => false,
        }
    }

    /// Whether this is `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// The boolean, if this is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// The number, if this is one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// The object handle, if this is one.
    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(object) => Some(object),
            _ => None,
        }
    }

    /// Untracked snapshot of this value as JSON.
    ///
    /// Fails with [`Error::CyclicValue`] when an object contains itself.
    /// Non-finite numbers become `null`.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        self.to_json_inner(&mut HashSet::new())
    }

    fn to_json_inner(&self, ancestors: &mut HashSet<usize>) -> Result<serde_json::Value> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Object(object) => {
                if !ancestors.insert(object.id()) {
                    return Err(Error::CyclicValue);
                }
                let mut map = serde_json::Map::new();
                for key in object.keys() {
                    let value = object.get_untracked(&key).unwrap_or_default();
                    map.insert(key, value.to_json_inner(ancestors)?);
                }
                ancestors.remove(&object.id());
                serde_json::Value::Object(map)
            }
        })
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.same_value(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Bool(b) => f.debug_tuple("Bool").field(b).finish(),
            Value::Number(n) => f.debug_tuple("Number").field(n).finish(),
            Value::String(s) => f.debug_tuple("String").field(s).finish(),
            Value::Object(object) => fmt::Debug::fmt(object, f),
        }
    }
}

/// Text rendering used by template bindings.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if n.is_nan() => f.write_str("NaN"),
            Value::Number(n) if n.is_infinite() => {
                f.write_str(if *n > 0.0 { "Infinity" } else { "-Infinity" })
            }
            Value::Number(n) if *n == 0.0 => f.write_str("0"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => f.write_str(s),
            Value::Object(_) => f.write_str("[object Object]"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Number(value.into())
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Value::Number(value.into())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Number(value as f64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Object> for Value {
    fn from(value: Object) -> Self {
        Value::Object(value)
    }
}

/// Converts JSON into fresh, not yet observed objects. Arrays become
/// objects keyed by index.
impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => Value::Object(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(index, item)| (index.to_string(), Value::from(item)))
                    .collect(),
            ),
            serde_json::Value::Object(map) => Value::Object(map.into_iter().collect()),
        }
    }
}

/// Where a property keeps its value.
#[derive(Clone)]
pub(crate) enum Property {
    Plain(Value),
    Observed(SlotId),
}

struct ObjectInner {
    properties: RefCell<BTreeMap<String, Property>>,
}

impl Drop for ObjectInner {
    fn drop(&mut self) {
        let slots: Vec<SlotId> = self
            .properties
            .get_mut()
            .values()
            .filter_map(|property| match property {
                Property::Observed(id) => Some(*id),
                Property::Plain(_) => None,
            })
            .collect();
        storage::release_slots(&slots);
    }
}

/// A shared, identity-compared map from keys to properties.
#[derive(Clone)]
pub struct Object(Rc<ObjectInner>);

impl Object {
    /// Create an empty object.
    pub fn new() -> Self {
        Self(Rc::new(ObjectInner {
            properties: RefCell::new(BTreeMap::new()),
        }))
    }

    /// Read a property.
    ///
    /// Reading an observed property while a watcher is collecting
    /// dependencies subscribes that watcher to the property.
    pub fn get(&self, key: &str) -> Option<Value> {
        match self.property(key)? {
            Property::Plain(value) => Some(value),
            Property::Observed(id) => with_slot_storage(|storage| storage.read(id)),
        }
    }

    /// Read a property without subscribing anything.
    pub fn get_untracked(&self, key: &str) -> Option<Value> {
        match self.property(key)? {
            Property::Plain(value) => Some(value),
            Property::Observed(id) => with_slot_storage(|storage| storage.get(id).cloned()),
        }
    }

    /// Read a dot-separated path such as `"user.name"`, tracking every
    /// segment. Returns `None` if a segment is missing or an intermediate
    /// value is not an object.
    pub fn get_path(&self, path: &str) -> Option<Value> {
        let mut segments = path.split('.');
        let mut current = self.get(segments.next()?)?;
        for segment in segments {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Write a property.
    ///
    /// Writing an observed property stores the value only if it differs
    /// (see [`Value::same_value`]), makes a newly stored object reactive and
    /// then notifies the property's subscribers before returning. Writing a
    /// key the object does not have adds a plain property.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        match self.observed_slot(key) {
            Some(id) => observer::write(id, value),
            None => {
                let previous = self
                    .0
                    .properties
                    .borrow_mut()
                    .insert(key.to_owned(), Property::Plain(value));
                drop(previous);
            }
        }
    }

    /// Write through a dot-separated path. Does nothing if the parent path
    /// does not resolve to an object.
    pub fn set_path(&self, path: &str, value: impl Into<Value>) {
        match path.rsplit_once('.') {
            Some((parent, key)) => {
                if let Some(Value::Object(parent)) = self.get_path(parent) {
                    parent.set(key, value);
                }
            }
            None => self.set(path, value),
        }
    }

    /// Property names in sorted order.
    pub fn keys(&self) -> Vec<String> {
        self.0.properties.borrow().keys().cloned().collect()
    }

    /// Number of properties.
    pub fn len(&self) -> usize {
        self.0.properties.borrow().len()
    }

    /// Whether the object has no properties.
    pub fn is_empty(&self) -> bool {
        self.0.properties.borrow().is_empty()
    }

    /// Whether `key` is a property, plain or observed.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.properties.borrow().contains_key(key)
    }

    /// Whether `key` has been instrumented.
    pub fn is_observed(&self, key: &str) -> bool {
        self.observed_slot(key).is_some()
    }

    /// Number of subscriber registrations on an observed property.
    pub fn subscriber_count(&self, key: &str) -> usize {
        self.observed_slot(key)
            .map(|id| with_slot_storage(|storage| storage.subscribers(id)).len())
            .unwrap_or(0)
    }

    /// Whether both handles refer to the same object.
    pub fn ptr_eq(&self, other: &Object) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Identity of the underlying object, stable while it is alive.
    pub(crate) fn id(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    pub(crate) fn property(&self, key: &str) -> Option<Property> {
        self.0.properties.borrow().get(key).cloned()
    }

    pub(crate) fn replace_property(&self, key: &str, property: Property) -> Option<Property> {
        self.0
            .properties
            .borrow_mut()
            .insert(key.to_owned(), property)
    }

    fn observed_slot(&self, key: &str) -> Option<SlotId> {
        match self.0.properties.borrow().get(key) {
            Some(Property::Observed(id)) => Some(*id),
            _ => None,
        }
    }
}

impl Default for Object {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Object {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Object {}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object").field("keys", &self.keys()).finish()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Object {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let properties = iter
            .into_iter()
            .map(|(key, value)| (key.into(), Property::Plain(value.into())))
            .collect();
        Self(Rc::new(ObjectInner {
            properties: RefCell::new(properties),
        }))
    }
}
