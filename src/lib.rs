//! # Vue Signals
//!
//! A minimal reactive state engine with a small template binding layer.
//!
//! ## Features
//!
//! - **Transparent instrumentation**: [`observe`] turns every property of a
//!   plain object graph into an observed slot; `get`/`set` look the same
//!   before and after
//! - **Automatic tracking**: a [`Watcher`] subscribes to every observed
//!   property it reads while being constructed
//! - **No spurious updates**: writes and invalidations skip unchanged values,
//!   NaN replacing NaN included
//! - **Isolated broadcast**: a panicking binding is logged and does not stop
//!   its siblings from updating
//! - **Template bindings**: `{{ key }}`, `v-text`, `v-model` and `v-on:event`
//!   over a headless node tree
//!
//! ## Example
//!
//! ```rust,no_run
//! use serde_json::json;
//! use vue_signals::prelude::*;
//!
//! let state = ReactiveState::new(json!({ "count": 0 }));
//! let _watcher = state.watch("count", |value| println!("count changed to {value}"))?;
//! state.set("count", 5)?;
//! # Ok::<(), vue_signals::Error>(())
//! ```
//!
//! Everything here is single-threaded: handles are `Rc`-based and the
//! observable slots live in thread-local storage.

mod app;
mod compiler;
mod dom;
mod error;
mod observer;
mod storage;
mod subscribers;
mod value;
mod watcher;

pub use app::{Method, Mount, Options, ViewModel};
pub use compiler::{Compiler, Template};
pub use dom::{Element, Listener, Node, TextNode};
pub use error::{Error, Result};
pub use observer::{observe, ReactiveState};
pub use storage::SlotId;
pub use subscribers::SubscriberSet;
pub use value::{Object, Value};
pub use watcher::Watcher;

// Re-export the prelude
pub mod prelude {
    pub use crate::{
        observe, Element, Object, Options, ReactiveState, Value, ViewModel, Watcher,
    };
}
