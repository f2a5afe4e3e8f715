//! Crate error type.
//!
//! The reactive core itself never fails: reads, writes, broadcasts and
//! invalidations always complete. Errors only come from the binding layer
//! and from the view-model configuration.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("state root is not an object")]
    NotAnObject,

    #[error("value graph contains a cycle and cannot be snapshotted")]
    CyclicValue,

    #[error("template error: {message}")]
    Template { message: String },

    #[error("unknown method: {name}")]
    UnknownMethod { name: String },

    #[error("no element matches selector: {selector}")]
    ElementNotFound { selector: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn template(message: impl Into<String>) -> Self {
        Self::Template {
            message: message.into(),
        }
    }
}
