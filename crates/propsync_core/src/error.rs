//! Error types for the sync client.

use propsync_codec::{CodecError, ValueKind};
use std::fmt;
use thiserror::Error;

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;

/// Error type returned by property callbacks.
///
/// Boxed so that a callback can use `?` on any error it runs into.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for property callbacks.
pub type CallbackResult<T> = Result<T, CallbackError>;

/// Errors that can occur while running the client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// A value of the wrong kind was assigned to an initialized property.
    #[error("property {name}: expected {expected} value, got {found}")]
    TypeMismatch {
        /// Property name.
        name: String,
        /// Kind fixed by the first assignment.
        expected: ValueKind,
        /// Kind of the rejected value.
        found: ValueKind,
    },

    /// A scalar was assigned to an object property.
    #[error("property {0} is an object and cannot hold a scalar value")]
    NotALeaf(String),

    /// A field was addressed on a property that is not an object.
    #[error("property {0} is not an object")]
    NotAComposite(String),

    /// No property with this name is registered.
    #[error("unknown property: {0}")]
    UnknownProperty(String),

    /// The object has no field with this name.
    #[error("property {name} has no field {field}")]
    UnknownChild {
        /// Object name.
        name: String,
        /// Requested field.
        field: String,
    },

    /// A property or task with this name already exists.
    #[error("property or task already registered: {0}")]
    DuplicateProperty(String),

    /// Discovery produced an empty thing id.
    #[error("device is not linked to a thing (empty thing id)")]
    EmptyIdentity,

    /// Network or transport error. The client recovers by reconnecting.
    #[error("transport error: {0}")]
    Transport(String),

    /// A property callback returned an error.
    #[error("task {task} failed: {reason}")]
    TaskFailed {
        /// Task (property) name.
        task: String,
        /// Error reported by the callback.
        reason: String,
    },

    /// Record pack could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The async runtime could not be created.
    #[error("runtime error: {0}")]
    Runtime(#[from] std::io::Error),
}

impl ClientError {
    /// Creates a task failure from a callback error.
    pub fn task_failed(task: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::TaskFailed {
            task: task.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns true if this error stops the client.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ClientError::EmptyIdentity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors() {
        assert!(ClientError::EmptyIdentity.is_fatal());
        assert!(!ClientError::Transport("bad credentials".into()).is_fatal());
        assert!(!ClientError::task_failed("clk", "boom").is_fatal());
    }

    #[test]
    fn error_display() {
        let err = ClientError::TypeMismatch {
            name: "led".into(),
            expected: ValueKind::Bool,
            found: ValueKind::Integer,
        };
        assert_eq!(err.to_string(), "property led: expected bool value, got integer");

        let err = ClientError::Transport("not connected".into());
        assert_eq!(err.to_string(), "transport error: not connected");

        let err = ClientError::task_failed("clk", "sensor offline");
        assert_eq!(err.to_string(), "task clk failed: sensor offline");

        let err: ClientError = CodecError::MissingName { index: 0 }.into();
        assert!(err.to_string().starts_with("codec error"));
    }
}
