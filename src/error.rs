//! Error types for tree and store operations.
//!
//! All fallible operations return [`Result`]. Errors fall into the kinds
//! from the locking/storage model:
//!
//! - [`TreeError::InvalidArgument`]: rejected before any state change
//! - [`TreeError::Serialization`]: raised by a key/value codec
//! - [`TreeError::Store`]: record store I/O failure, wraps the backend message
//! - [`TreeError::RecordNotFound`]: a recid resolved to no record
//! - [`TreeError::Corruption`]: decoded bytes violate the node format
//!
//! A mutator that hits any of these releases every node lock it holds
//! (see `LockTable::sweep_guard`) and propagates the error unchanged.

use std::fmt;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TreeError>;

/// Errors produced by tree operations and the record store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TreeError {
    /// Caller error: bad configuration value or bound ordering.
    /// Reported synchronously; no state was changed.
    InvalidArgument(String),

    /// A key or value codec rejected its input or found a malformed stream.
    Serialization(String),

    /// The record store failed; carries the backend's message.
    Store(String),

    /// No record exists under the given recid.
    RecordNotFound(u64),

    /// Record bytes do not decode as a valid tree node.
    Corruption(String),

    /// Write attempted against a read-only store.
    ReadOnly,
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),

            Self::Serialization(msg) => write!(f, "serialization error: {msg}"),

            Self::Store(msg) => write!(f, "record store error: {msg}"),

            Self::RecordNotFound(recid) => write!(f, "record not found: recid {recid}"),

            Self::Corruption(msg) => write!(f, "corrupted node record: {msg}"),

            Self::ReadOnly => write!(f, "store is read-only"),
        }
    }
}

impl std::error::Error for TreeError {}

impl TreeError {
    /// Shorthand for an [`TreeError::InvalidArgument`] with a formatted message.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Shorthand for a [`TreeError::Corruption`] with a formatted message.
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Self::Corruption(msg.into())
    }
}
