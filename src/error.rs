//! Error types for repository operations

use thiserror::Error;

/// Errors that can occur while building queries, dispatching repository
/// methods, or mediating CRUD calls
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A condition needs more positional arguments than the call supplied
    #[error("Argument count error: {0}")]
    ArgumentCount(String),

    /// A required parameter (entity, ttl, query) was absent
    #[error("Null required: {0}")]
    NullRequired(String),

    /// The storage collaborator does not implement the requested variant
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// A repository method matches neither a CRUD signature nor the query naming convention
    #[error("Invocation mismatch: {0}")]
    InvocationMismatch(String),

    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    #[error("Invalid field: {0}")]
    InvalidField(String),

    #[error("Conversion error: {0}")]
    Conversion(String),

    /// A lifecycle observer rejected the operation
    #[error("Observer error: {0}")]
    Observer(String),

    /// Failure reported by the storage collaborator
    #[error("Store error: {0}")]
    Store(String),

    /// The storage collaborator dropped an async callback without invoking it
    #[error("Callback dropped before completion: {0}")]
    CallbackDropped(String),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RepositoryError {
    pub fn argument_count(msg: impl Into<String>) -> Self {
        Self::ArgumentCount(msg.into())
    }

    pub fn null_required(msg: impl Into<String>) -> Self {
        Self::NullRequired(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        Self::UnsupportedOperation(msg.into())
    }

    pub fn invocation_mismatch(msg: impl Into<String>) -> Self {
        Self::InvocationMismatch(msg.into())
    }

    pub fn illegal_state(msg: impl Into<String>) -> Self {
        Self::IllegalState(msg.into())
    }

    pub fn conversion(msg: impl Into<String>) -> Self {
        Self::Conversion(msg.into())
    }

    pub fn observer(msg: impl Into<String>) -> Self {
        Self::Observer(msg.into())
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, RepositoryError>;
