//! Storage collaborator contracts
//!
//! The crate never talks to a database itself. Document and column stores
//! implement [`CollectionManager`]; key-value stores implement
//! [`KeyValueRepository`]. Optional capabilities (TTL, native queries, async
//! variants) default to `UnsupportedOperation`.
//!
//! Async variants take a [`Callback`] and return as soon as the work is
//! handed off. The store picks its own thread or event loop and must invoke
//! the callback exactly once, with the result or the failure.

use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::oneshot;

use crate::error::{RepositoryError, Result};
use crate::query::StructuredQuery;
use crate::types::{Record, Ttl};

/// Completion continuation handed to a store's async operations
pub type Callback<T> = Box<dyn FnOnce(Result<T>) + Send + 'static>;

/// Document / column-family store driver
pub trait CollectionManager: Send + Sync {
    fn save(&self, record: Record) -> Result<Record>;

    fn save_with_ttl(&self, _record: Record, _ttl: Ttl) -> Result<Record> {
        Err(RepositoryError::unsupported("save with ttl"))
    }

    fn update(&self, record: Record) -> Result<Record>;

    fn delete(&self, query: &StructuredQuery) -> Result<()>;

    fn find(&self, query: &StructuredQuery) -> Result<Vec<Record>>;

    /// Run a query in the store's own language
    fn native_query(&self, _query: &str) -> Result<Vec<Record>> {
        Err(RepositoryError::unsupported("native query"))
    }

    fn save_async(&self, _record: Record, _callback: Callback<Record>) -> Result<()> {
        Err(RepositoryError::unsupported("async save"))
    }

    fn save_async_with_ttl(
        &self,
        _record: Record,
        _ttl: Ttl,
        _callback: Callback<Record>,
    ) -> Result<()> {
        Err(RepositoryError::unsupported("async save with ttl"))
    }

    fn update_async(&self, _record: Record, _callback: Callback<Record>) -> Result<()> {
        Err(RepositoryError::unsupported("async update"))
    }

    fn delete_async(&self, _query: StructuredQuery, _callback: Callback<()>) -> Result<()> {
        Err(RepositoryError::unsupported("async delete"))
    }

    fn find_async(
        &self,
        _query: StructuredQuery,
        _callback: Callback<Vec<Record>>,
    ) -> Result<()> {
        Err(RepositoryError::unsupported("async find"))
    }

    fn native_query_async(
        &self,
        _query: String,
        _callback: Callback<Vec<Record>>,
    ) -> Result<()> {
        Err(RepositoryError::unsupported("async native query"))
    }
}

/// Key-value bucket working directly on entities
///
/// Multi-key forms default to one call per key.
pub trait KeyValueRepository<E>: Send + Sync {
    fn put(&self, entity: E) -> Result<E>;

    fn put_with_ttl(&self, _entity: E, _ttl: Ttl) -> Result<E> {
        Err(RepositoryError::unsupported("put with ttl"))
    }

    fn put_all(&self, entities: Vec<E>) -> Result<Vec<E>> {
        entities.into_iter().map(|entity| self.put(entity)).collect()
    }

    fn put_all_with_ttl(&self, entities: Vec<E>, ttl: Ttl) -> Result<Vec<E>> {
        entities
            .into_iter()
            .map(|entity| self.put_with_ttl(entity, ttl))
            .collect()
    }

    fn get(&self, key: &Value) -> Result<Option<E>>;

    /// Entities for the keys that exist, in key order
    fn get_all(&self, keys: &[Value]) -> Result<Vec<E>> {
        let mut found = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(entity) = self.get(key)? {
                found.push(entity);
            }
        }
        Ok(found)
    }

    fn remove(&self, key: &Value) -> Result<()>;

    fn remove_all(&self, keys: &[Value]) -> Result<()> {
        keys.iter().try_for_each(|key| self.remove(key))
    }
}

// ============================================================================
// Completion
// ============================================================================

/// Pending result of an async operation that was accepted by the store
///
/// Await it, or call [`Completion::wait`] outside an async runtime. Dropping
/// it abandons the result; the store still runs the operation.
#[derive(Debug)]
pub struct Completion<T> {
    receiver: oneshot::Receiver<Result<T>>,
    operation: &'static str,
}

impl<T> Completion<T> {
    pub(crate) fn channel(operation: &'static str) -> (oneshot::Sender<Result<T>>, Self) {
        let (sender, receiver) = oneshot::channel();
        (
            sender,
            Self {
                receiver,
                operation,
            },
        )
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    /// Block the current thread until the store completes
    ///
    /// # Panics
    /// Panics when called on an async runtime worker thread. Await the
    /// completion there, or call `wait` from `tokio::task::spawn_blocking`.
    pub fn wait(self) -> Result<T> {
        let operation = self.operation;
        self.receiver
            .blocking_recv()
            .unwrap_or_else(|_| Err(RepositoryError::CallbackDropped(operation.to_string())))
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let operation = self.operation;
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(RepositoryError::CallbackDropped(
                operation.to_string(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}
