//! The view-model: data, methods and a mounted element wired together.
//!
//! # Example
//!
//! ```rust,no_run
//! use vue_signals::prelude::*;
//!
//! let root = Element::new("div")
//!     .attr("id", "app")
//!     .child(Element::new("button").attr("v-on:click", "increment"))
//!     .child(Element::new("span").text("{{ count }}"));
//!
//! let vm = ViewModel::new(
//!     Options::new()
//!         .mount(root)
//!         .data_json(r#"{ "count": 0 }"#)?
//!         .method("increment", |data| {
//!             let count = data.get("count").and_then(|v| v.as_f64()).unwrap_or(0.0);
//!             data.set("count", count + 1.0);
//!         }),
//! )?;
//! vm.call("increment")?;
//! # Ok::<(), vue_signals::Error>(())
//! ```

use crate::compiler::Compiler;
use crate::dom::Element;
use crate::error::{Error, Result};
use crate::observer::ReactiveState;
use crate::value::{Object, Value};
use crate::watcher::Watcher;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// A named handler; it receives the view-model's data object.
pub type Method = Rc<dyn Fn(&Object)>;

/// Where the view-model mounts.
#[derive(Clone, Debug)]
pub enum Mount {
    Element(Element),
    /// Resolve `selector` inside `document` at construction.
    Selector { document: Element, selector: String },
}

impl From<Element> for Mount {
    fn from(element: Element) -> Self {
        Mount::Element(element)
    }
}

/// View-model configuration.
#[derive(Clone, Default)]
pub struct Options {
    el: Option<Mount>,
    data: Value,
    methods: BTreeMap<String, Method>,
}

impl Options {
    /// Empty options: no mount point, `Null` data, no methods.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount on an element.
    pub fn mount(mut self, el: impl Into<Mount>) -> Self {
        self.el = Some(el.into());
        self
    }

    /// Mount on the first element in `document` matching `selector`.
    pub fn mount_selector(mut self, document: Element, selector: impl Into<String>) -> Self {
        self.el = Some(Mount::Selector {
            document,
            selector: selector.into(),
        });
        self
    }

    /// Set the data object.
    pub fn data(mut self, data: impl Into<Value>) -> Self {
        self.data = data.into();
        self
    }

    /// Parse the data from JSON text.
    pub fn data_json(self, json: &str) -> Result<Self> {
        let data: serde_json::Value = serde_json::from_str(json)?;
        Ok(self.data(data))
    }

    /// Register a method, replacing any with the same name.
    pub fn method(mut self, name: impl Into<String>, method: impl Fn(&Object) + 'static) -> Self {
        self.methods.insert(name.into(), Rc::new(method));
        self
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("el", &self.el)
            .field("data", &self.data)
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// A mounted, compiled view-model.
pub struct ViewModel {
    el: Element,
    state: ReactiveState,
    data: Object,
    methods: BTreeMap<String, Method>,
    watchers: Vec<Watcher>,
}

impl ViewModel {
    /// Resolve the mount point, make the data reactive and compile the
    /// element tree.
    pub fn new(options: Options) -> Result<Self> {
        let Options { el, data, methods } = options;
        let el = match el {
            Some(Mount::Element(element)) => element,
            Some(Mount::Selector { document, selector }) => document
                .query_selector(&selector)
                .ok_or(Error::ElementNotFound { selector })?,
            None => {
                return Err(Error::ElementNotFound {
                    selector: String::new(),
                })
            }
        };

        let state = ReactiveState::new(data);
        let data = state.object().cloned().ok_or(Error::NotAnObject)?;
        let watchers = Compiler::new(&data, &methods).compile(&el)?;
        tracing::debug!(tag = el.tag(), watchers = watchers.len(), "mounted view-model");

        Ok(Self {
            el,
            state,
            data,
            methods,
            watchers,
        })
    }

    /// The mounted element.
    pub fn el(&self) -> &Element {
        &self.el
    }

    /// The reactive state wrapping the data.
    pub fn state(&self) -> &ReactiveState {
        &self.state
    }

    /// The reactive data object.
    pub fn data(&self) -> &Object {
        &self.data
    }

    /// Tracked read of a data property.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.data().get(key)
    }

    /// Write a data property; unchanged values are skipped.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let unchanged = self
            .data()
            .get_untracked(key)
            .is_some_and(|current| current.same_value(&value));
        if !unchanged {
            self.data().set(key, value);
        }
    }

    /// Invoke a registered method.
    pub fn call(&self, name: &str) -> Result<()> {
        let method = self
            .methods
            .get(name)
            .ok_or_else(|| Error::UnknownMethod {
                name: name.to_owned(),
            })?;
        method(self.data());
        Ok(())
    }

    /// Add a watcher on a data key.
    pub fn watch(&self, key: &str, callback: impl Fn(&Value) + 'static) -> Watcher {
        Watcher::path(&self.data, key, callback)
    }

    /// The watchers created by compiling the mounted element.
    pub fn watchers(&self) -> &[Watcher] {
        &self.watchers
    }
}

impl fmt::Debug for ViewModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewModel")
            .field("el", &self.el.tag())
            .field("data", self.state.root())
            .field("watchers", &self.watchers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::cell::RefCell;

    fn counter_document() -> Element {
        Element::new("body").child(
            Element::new("div")
                .attr("id", "app")
                .child(Element::new("h1").text("{{ title }}"))
                .child(Element::new("input").attr("v-model", "title"))
                .child(Element::new("button").attr("v-on:click", "increment"))
                .child(Element::new("span").attr("class", "count").text("clicked {{ count }} times")),
        )
    }

    fn counter_options(document: Element) -> Options {
        Options::new()
            .mount_selector(document, "#app")
            .data(json!({ "title": "Counter", "count": 0 }))
            .method("increment", |data| {
                let count = data.get("count").and_then(|v| v.as_f64()).unwrap_or(0.0);
                data.set("count", count + 1.0);
            })
    }

    #[test]
    fn test_mount_by_selector_and_compile() {
        let document = counter_document();
        let vm = ViewModel::new(counter_options(document.clone())).unwrap();

        assert_eq!(vm.el().attribute("id").as_deref(), Some("app"));
        assert_eq!(vm.watchers().len(), 3);
        assert_eq!(
            document.query_selector("h1").unwrap().text_content(),
            "Counter"
        );
        assert_eq!(
            document.query_selector("input").unwrap().value(),
            "Counter"
        );
    }

    #[test]
    fn test_click_and_call_update_bindings() {
        let document = counter_document();
        let vm = ViewModel::new(counter_options(document.clone())).unwrap();
        let count = document.query_selector(".count").unwrap();

        document.query_selector("button").unwrap().dispatch("click");
        assert_eq!(count.text_content(), "clicked 1 times");

        vm.call("increment").unwrap();
        assert_eq!(count.text_content(), "clicked 2 times");
        assert_eq!(vm.get("count"), Some(Value::from(2)));
    }

    #[test]
    fn test_input_writes_back_to_data() {
        let document = counter_document();
        let vm = ViewModel::new(counter_options(document.clone())).unwrap();

        document.query_selector("input").unwrap().input("Renamed");
        assert_eq!(vm.get("title"), Some(Value::from("Renamed")));
        assert_eq!(
            document.query_selector("h1").unwrap().text_content(),
            "Renamed"
        );
    }

    #[test]
    fn test_proxy_set_skips_unchanged_values() {
        let vm = ViewModel::new(
            Options::new()
                .mount(Element::new("div"))
                .data(json!({ "x": 1 })),
        )
        .unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));
        let _watcher = vm.watch("x", {
            let log = log.clone();
            move |value| log.borrow_mut().push(value.clone())
        });

        vm.set("x", 1);
        vm.set("x", f64::NAN);
        vm.set("x", f64::NAN);
        assert_eq!(*log.borrow(), vec![Value::from(f64::NAN)]);
    }

    #[test]
    fn test_configuration_errors() {
        let missing = ViewModel::new(
            Options::new()
                .mount_selector(counter_document(), "#nope")
                .data(json!({})),
        );
        assert!(matches!(missing, Err(Error::ElementNotFound { selector }) if selector == "#nope"));

        let unmounted = ViewModel::new(Options::new().data(json!({})));
        assert!(matches!(unmounted, Err(Error::ElementNotFound { .. })));

        let primitive = ViewModel::new(Options::new().mount(Element::new("div")).data(3));
        assert!(matches!(primitive, Err(Error::NotAnObject)));

        assert!(matches!(Options::new().data_json("{ nope"), Err(Error::Json(_))));

        let vm = ViewModel::new(Options::new().mount(Element::new("div")).data(json!({})))
            .unwrap();
        assert!(matches!(vm.call("missing"), Err(Error::UnknownMethod { .. })));
    }
}
