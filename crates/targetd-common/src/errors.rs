//! Error types for the targetd registry.
//!
//! # Rust Learning Note
//!
//! The store and the service share one error enum. The store raises
//! [`Error::NamespaceNotFound`]; the service reclassifies it as
//! [`Error::UnknownNamespace`] before it reaches the HTTP boundary, so the
//! boundary only ever matches on service-level variants.
//!
//! ```rust
//! use targetd_common::{Error, Result};
//!
//! fn list(kind: &str) -> Result<()> {
//!     if kind.is_empty() {
//!         return Err(Error::invalid_input("kind"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(list("").unwrap_err().is_invalid_input());
//! ```

use thiserror::Error;

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for registry operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A required field was missing or empty.
    #[error("Invalid input: missing or empty field '{field}'")]
    InvalidInput {
        field: String,
    },

    /// The store has no namespace for this kind.
    #[error("Namespace not found: {kind}")]
    NamespaceNotFound {
        kind: String,
    },

    /// A caller asked for a kind that was never registered.
    #[error("Unknown namespace: {kind}")]
    UnknownNamespace {
        kind: String,
    },

    /// A storage transaction failed.
    #[error("Storage failure: {0}")]
    Storage(String),

    /// Invalid process configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error (wraps std::io::Error).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Another error with added context.
    #[error("{message}: {source}")]
    WithContext {
        message: String,
        source: Box<Error>,
    },
}

impl Error {
    /// Creates an InvalidInput error for the named field.
    pub fn invalid_input(field: impl Into<String>) -> Self {
        Self::InvalidInput {
            field: field.into(),
        }
    }

    /// Creates a NamespaceNotFound error.
    pub fn namespace_not_found(kind: impl Into<String>) -> Self {
        Self::NamespaceNotFound { kind: kind.into() }
    }

    /// Creates an UnknownNamespace error.
    pub fn unknown_namespace(kind: impl Into<String>) -> Self {
        Self::UnknownNamespace { kind: kind.into() }
    }

    /// Creates a Storage error.
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage(message.into())
    }

    /// Creates a Config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Adds context to an error.
    ///
    /// Classification helpers look through the context wrapper, so
    /// `err.context("...").is_storage()` still holds for a storage error.
    pub fn context(self, message: impl Into<String>) -> Self {
        Self::WithContext {
            message: message.into(),
            source: Box::new(self),
        }
    }

    /// Returns the innermost error, skipping context wrappers.
    pub fn root(&self) -> &Error {
        match self {
            Self::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn is_invalid_input(&self) -> bool {
        matches!(self.root(), Self::InvalidInput { .. })
    }

    pub fn is_namespace_not_found(&self) -> bool {
        matches!(self.root(), Self::NamespaceNotFound { .. })
    }

    pub fn is_unknown_namespace(&self) -> bool {
        matches!(self.root(), Self::UnknownNamespace { .. })
    }

    pub fn is_storage(&self) -> bool {
        matches!(self.root(), Self::Storage(_))
    }
}

// Convenience methods for Result types
pub trait ResultExt<T> {
    /// Adds context to an error result.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.context(message))
    }
}
