//! Lifecycle hooks around save and update
//!
//! Every write passes through four phases, in this order:
//!
//! 1. `PreEntity` with the entity as handed in
//! 2. `PreRecord` with the converted record, before the store sees it
//! 3. `PostRecord` with the record the store returned
//! 4. `PostEntity` with the entity converted back from that record
//!
//! Observers are called in registration order. An observer error aborts the
//! operation; later phases do not fire.

use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::types::Record;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    PreEntity,
    PreRecord,
    PostRecord,
    PostEntity,
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecyclePhase::PreEntity => "pre-entity",
            LifecyclePhase::PreRecord => "pre-record",
            LifecyclePhase::PostRecord => "post-record",
            LifecyclePhase::PostEntity => "post-entity",
        };
        f.write_str(name)
    }
}

/// Payload delivered to observers
#[derive(Debug)]
pub enum LifecycleEvent<'a, E> {
    PreEntity(&'a E),
    PreRecord(&'a Record),
    PostRecord(&'a Record),
    PostEntity(&'a E),
}

impl<'a, E> LifecycleEvent<'a, E> {
    pub fn phase(&self) -> LifecyclePhase {
        match self {
            LifecycleEvent::PreEntity(_) => LifecyclePhase::PreEntity,
            LifecycleEvent::PreRecord(_) => LifecyclePhase::PreRecord,
            LifecycleEvent::PostRecord(_) => LifecyclePhase::PostRecord,
            LifecycleEvent::PostEntity(_) => LifecyclePhase::PostEntity,
        }
    }

    pub fn entity(&self) -> Option<&'a E> {
        match *self {
            LifecycleEvent::PreEntity(entity) | LifecycleEvent::PostEntity(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn record(&self) -> Option<&'a Record> {
        match *self {
            LifecycleEvent::PreRecord(record) | LifecycleEvent::PostRecord(record) => Some(record),
            _ => None,
        }
    }
}

/// Receives lifecycle events for one entity type
pub trait LifecycleObserver<E>: Send + Sync {
    fn on_event(&self, event: &LifecycleEvent<'_, E>) -> Result<()>;
}

struct FnObserver<F>(F);

impl<E, F> LifecycleObserver<E> for FnObserver<F>
where
    F: Fn(&LifecycleEvent<'_, E>) -> Result<()> + Send + Sync,
{
    fn on_event(&self, event: &LifecycleEvent<'_, E>) -> Result<()> {
        (self.0)(event)
    }
}

/// Ordered set of observers shared by a mediator
pub struct LifecycleObservers<E> {
    observers: Vec<Arc<dyn LifecycleObserver<E>>>,
}

impl<E> LifecycleObservers<E> {
    pub fn new() -> Self {
        Self {
            observers: Vec::new(),
        }
    }

    /// Append an observer
    pub fn with(mut self, observer: impl LifecycleObserver<E> + 'static) -> Self {
        self.push(observer);
        self
    }

    /// Append a closure observer
    pub fn observe<F>(self, observer: F) -> Self
    where
        F: Fn(&LifecycleEvent<'_, E>) -> Result<()> + Send + Sync + 'static,
    {
        self.with(FnObserver(observer))
    }

    pub fn push(&mut self, observer: impl LifecycleObserver<E> + 'static) {
        self.observers.push(Arc::new(observer));
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }

    /// Deliver `event` to every observer, stopping at the first error
    pub fn fire(&self, event: LifecycleEvent<'_, E>) -> Result<()> {
        for observer in &self.observers {
            observer.on_event(&event)?;
        }
        Ok(())
    }
}

impl<E> Default for LifecycleObservers<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for LifecycleObservers<E> {
    fn clone(&self) -> Self {
        Self {
            observers: self.observers.clone(),
        }
    }
}

impl<E> fmt::Debug for LifecycleObservers<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleObservers")
            .field("len", &self.observers.len())
            .finish()
    }
}
