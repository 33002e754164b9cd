//! # Error Taxonomy
//!
//! Every fallible operation in the crate reports an [`EventError`]. The variants
//! map onto the four failure classes of the binding core:
//!
//! - **Parse** - a serialized member token could not be decoded
//! - **Binding** - a resolved member cannot produce a valid callable
//! - **Invocation** / **ArgumentMismatch** - a bound callable failed while running
//! - **Consistency** - one side of a subscription disagrees with the other
//!
//! Parse and binding failures are recoverable: the owning request or call is
//! dropped and its siblings proceed. Invocation failures propagate out of
//! [`Publisher::publish`](crate::Publisher::publish) untouched.

use thiserror::Error;

/// Errors produced while decoding, binding, or dispatching delegates.
#[derive(Error, Debug)]
pub enum EventError {
    /// A member token or type name was malformed
    #[error("Parse error: {0}")]
    Parse(String),
    /// A member could not be turned into a callable
    #[error("Binding error: {0}")]
    Binding(String),
    /// Arguments handed to a callable did not match its signature
    #[error("Argument mismatch: {0}")]
    ArgumentMismatch(String),
    /// A bound callable reported a failure while executing
    #[error("Invocation error: {0}")]
    Invocation(String),
    /// An argument container was written through the accessor of another type
    #[error("Argument tag mismatch: container holds '{actual}', write targeted '{expected}'")]
    TagMismatch { expected: String, actual: String },
    /// Publisher and subscriber disagree about a subscription
    #[error("Consistency violation: {0}")]
    Consistency(String),
    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for EventError {
    fn from(error: toml::de::Error) -> Self {
        EventError::Config(error.to_string())
    }
}

impl EventError {
    /// True for the failures that only cost one binding (parse and binding errors).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, EventError::Parse(_) | EventError::Binding(_))
    }
}
