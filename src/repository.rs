//! Method-name dispatch for repository interfaces
//!
//! A [`RepositoryDispatcher`] is built for one entity type and one backend.
//! Each interface method is registered once by name. Registration resolves
//! the name into a [`MethodBinding`]: a known CRUD operation, or a derived
//! query plan for names carrying a query prefix (`findBy...`). Calls then
//! route by table lookup and pick the overload from the argument shapes.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use nosql_repository::{
//!     Argument, CollectionManager, CrudMediator, EntityMetadata, LifecycleObservers,
//!     RepositoryConfig, RepositoryDispatcher, SerdeConverter,
//! };
//!
//! # #[derive(serde::Serialize, serde::Deserialize)]
//! # struct Person { name: String, age: u32 }
//! # fn run(store: Arc<dyn CollectionManager>) -> nosql_repository::Result<()> {
//! let metadata = EntityMetadata::new("Person").with_field("name").with_field("age");
//! let converter = Arc::new(SerdeConverter::<Person>::new(metadata.clone()));
//! let mediator = CrudMediator::new(store, converter, LifecycleObservers::<Person>::new());
//!
//! let people = RepositoryDispatcher::document(metadata, mediator, RepositoryConfig::default())
//!     .register("save")?
//!     .register("findByNameAndAgeGreaterThan")?;
//!
//! let adults = people
//!     .invoke("findByNameAndAgeGreaterThan", vec![Argument::from("Ada"), Argument::from(18)])?
//!     .into_entities();
//! # Ok(())
//! # }
//! ```

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::config::RepositoryConfig;
use crate::error::{RepositoryError, Result};
use crate::mediator::CrudMediator;
use crate::metadata::EntityMetadata;
use crate::query::{MethodQueryParser, QueryPlan};
use crate::store::KeyValueRepository;
use crate::types::Argument;

/// CRUD operations reachable by method name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrudOperation {
    Save,
    Update,
    Delete,
    Find,
    NativeQuery,
    Put,
    Get,
    Remove,
}

impl CrudOperation {
    /// CRUD operation named `method` on a document or column store
    pub fn document(method: &str) -> Option<Self> {
        match method {
            "save" => Some(Self::Save),
            "update" => Some(Self::Update),
            "delete" => Some(Self::Delete),
            "find" => Some(Self::Find),
            "nativeQuery" => Some(Self::NativeQuery),
            _ => None,
        }
    }

    /// CRUD operation named `method` on a key-value store
    pub fn key_value(method: &str) -> Option<Self> {
        match method {
            "put" => Some(Self::Put),
            "get" => Some(Self::Get),
            "remove" => Some(Self::Remove),
            _ => None,
        }
    }

    pub fn method_name(&self) -> &'static str {
        match self {
            Self::Save => "save",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Find => "find",
            Self::NativeQuery => "nativeQuery",
            Self::Put => "put",
            Self::Get => "get",
            Self::Remove => "remove",
        }
    }
}

/// What a registered method name resolved to
#[derive(Debug, Clone, PartialEq)]
pub enum MethodBinding {
    Crud(CrudOperation),
    Query(QueryPlan),
}

/// Result of a dispatched call
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome<E> {
    /// Delete / remove
    Unit,
    Entity(E),
    Entities(Vec<E>),
    /// Single-key lookup
    Optional(Option<E>),
}

impl<E> Outcome<E> {
    pub fn into_entity(self) -> Option<E> {
        match self {
            Outcome::Entity(entity) => Some(entity),
            Outcome::Optional(entity) => entity,
            _ => None,
        }
    }

    /// All entities carried by the outcome; empty for `Unit`
    pub fn into_entities(self) -> Vec<E> {
        match self {
            Outcome::Unit => Vec::new(),
            Outcome::Entity(entity) => vec![entity],
            Outcome::Entities(entities) => entities,
            Outcome::Optional(entity) => entity.into_iter().collect(),
        }
    }
}

enum Backend<E> {
    Document(CrudMediator<E>),
    KeyValue(Arc<dyn KeyValueRepository<E>>),
}

impl<E> Backend<E> {
    fn kind(&self) -> &'static str {
        match self {
            Backend::Document(_) => "document",
            Backend::KeyValue(_) => "key-value",
        }
    }
}

/// Routes repository method calls for one entity type
pub struct RepositoryDispatcher<E> {
    metadata: EntityMetadata,
    backend: Backend<E>,
    parser: MethodQueryParser,
    methods: HashMap<String, MethodBinding>,
}

impl<E> RepositoryDispatcher<E>
where
    E: Send + 'static,
{
    /// Dispatcher backed by a document or column store
    pub fn document(
        metadata: EntityMetadata,
        mediator: CrudMediator<E>,
        config: RepositoryConfig,
    ) -> Self {
        Self::with_backend(metadata, Backend::Document(mediator), config)
    }

    /// Dispatcher backed by a key-value store
    pub fn key_value(
        metadata: EntityMetadata,
        repository: Arc<dyn KeyValueRepository<E>>,
        config: RepositoryConfig,
    ) -> Self {
        Self::with_backend(metadata, Backend::KeyValue(repository), config)
    }

    fn with_backend(
        metadata: EntityMetadata,
        backend: Backend<E>,
        config: RepositoryConfig,
    ) -> Self {
        Self {
            metadata,
            backend,
            parser: MethodQueryParser::new(config),
            methods: HashMap::new(),
        }
    }

    pub fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }

    pub fn binding(&self, method: &str) -> Option<&MethodBinding> {
        self.methods.get(method)
    }

    /// Resolve and record one interface method
    ///
    /// # Errors
    /// Returns `InvocationMismatch` when the name is neither a CRUD operation
    /// of this backend nor a valid derived query, or when a derived query
    /// references fields the metadata does not declare.
    pub fn register(mut self, method: &str) -> Result<Self> {
        let binding = self.resolve(method)?;
        debug!(
            entity = %self.metadata.name(),
            backend = self.backend.kind(),
            method,
            binding = ?binding,
            "Registered repository method"
        );
        self.methods.insert(method.to_string(), binding);
        Ok(self)
    }

    pub fn register_all<I, S>(self, methods: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        methods
            .into_iter()
            .try_fold(self, |dispatcher, method| dispatcher.register(method.as_ref()))
    }

    fn resolve(&self, method: &str) -> Result<MethodBinding> {
        let crud = match self.backend {
            Backend::Document(_) => CrudOperation::document(method),
            Backend::KeyValue(_) => CrudOperation::key_value(method),
        };
        if let Some(operation) = crud {
            return Ok(MethodBinding::Crud(operation));
        }

        if !self.parser.is_query_method(method) {
            return Err(RepositoryError::invocation_mismatch(format!(
                "method {} matches neither a {} CRUD operation nor the query naming convention",
                method,
                self.backend.kind()
            )));
        }

        if let Backend::KeyValue(_) = self.backend {
            return Err(RepositoryError::invocation_mismatch(format!(
                "method {} is a derived query; key-value repositories only support put, get and remove",
                method
            )));
        }

        let plan = self.parser.plan_for(method, &self.metadata)?;
        self.validate_fields(&plan)?;
        Ok(MethodBinding::Query(plan))
    }

    fn validate_fields(&self, plan: &QueryPlan) -> Result<()> {
        if !self.parser.config().validate_fields || !self.metadata.has_declared_fields() {
            return Ok(());
        }

        match plan.fields().find(|field| !self.metadata.declares(field)) {
            Some(field) => Err(RepositoryError::invocation_mismatch(format!(
                "method {} decodes to field '{}', which {} does not declare",
                plan.method(),
                field,
                self.metadata.name()
            ))),
            None => Ok(()),
        }
    }

    /// Call a registered method
    ///
    /// # Errors
    /// - `InvocationMismatch` for unregistered names or argument shapes that
    ///   fit no overload
    /// - `NullRequired` when a required entity, ttl, query or key is absent
    /// - anything the parser, mediator or store reports
    pub fn invoke(&self, method: &str, args: Vec<Argument<E>>) -> Result<Outcome<E>> {
        let binding = self.methods.get(method).ok_or_else(|| {
            RepositoryError::invocation_mismatch(format!(
                "method {} is not registered on the {} repository",
                method,
                self.metadata.name()
            ))
        })?;

        debug!(method, args = args.len(), "Dispatching repository call");

        match binding {
            MethodBinding::Query(plan) => {
                let query = self.parser.bind(plan, &args, &self.metadata)?;
                Ok(Outcome::Entities(self.mediator()?.find(&query)?))
            }
            MethodBinding::Crud(operation) => self.invoke_crud(*operation, args),
        }
    }

    fn mediator(&self) -> Result<&CrudMediator<E>> {
        match &self.backend {
            Backend::Document(mediator) => Ok(mediator),
            Backend::KeyValue(_) => Err(RepositoryError::illegal_state(
                "derived queries need a document backend",
            )),
        }
    }

    fn invoke_crud(&self, operation: CrudOperation, args: Vec<Argument<E>>) -> Result<Outcome<E>> {
        let method = operation.method_name();
        let (first, second) = split_args(method, args)?;

        match (&self.backend, operation) {
            (Backend::Document(mediator), CrudOperation::Save) => match (first, second) {
                (Some(Argument::Entity(entity)), None) => {
                    Ok(Outcome::Entity(mediator.save(&entity)?))
                }
                (Some(Argument::Entity(entity)), Some(Argument::Ttl(ttl))) => {
                    Ok(Outcome::Entity(mediator.save_with_ttl(&entity, ttl)?))
                }
                (Some(Argument::Entities(entities)), None) => {
                    Ok(Outcome::Entities(mediator.save_all(&entities)?))
                }
                (Some(Argument::Entities(entities)), Some(Argument::Ttl(ttl))) => {
                    Ok(Outcome::Entities(mediator.save_all_with_ttl(&entities, ttl)?))
                }
                (first, second) => Err(write_mismatch(method, first, second)),
            },

            (Backend::Document(mediator), CrudOperation::Update) => match (first, second) {
                (Some(Argument::Entity(entity)), None) => {
                    Ok(Outcome::Entity(mediator.update(&entity)?))
                }
                (Some(Argument::Entities(entities)), None) => {
                    Ok(Outcome::Entities(mediator.update_all(&entities)?))
                }
                (first, second) => Err(write_mismatch(method, first, second)),
            },

            (Backend::Document(mediator), CrudOperation::Delete) => match (first, second) {
                (Some(Argument::Query(query)), None) => {
                    mediator.delete(&query)?;
                    Ok(Outcome::Unit)
                }
                (first, second) => Err(single_mismatch(method, "query", first, second)),
            },

            (Backend::Document(mediator), CrudOperation::Find) => match (first, second) {
                (Some(Argument::Query(query)), None) => {
                    Ok(Outcome::Entities(mediator.find(&query)?))
                }
                (first, second) => Err(single_mismatch(method, "query", first, second)),
            },

            (Backend::Document(mediator), CrudOperation::NativeQuery) => match (first, second) {
                (Some(Argument::Value(Value::String(query))), None) => {
                    Ok(Outcome::Entities(mediator.native_query(&query)?))
                }
                (first, second) => Err(single_mismatch(method, "query", first, second)),
            },

            (Backend::KeyValue(repository), CrudOperation::Put) => match (first, second) {
                (Some(Argument::Entity(entity)), None) => {
                    Ok(Outcome::Entity(repository.put(entity)?))
                }
                (Some(Argument::Entity(entity)), Some(Argument::Ttl(ttl))) => {
                    Ok(Outcome::Entity(repository.put_with_ttl(entity, ttl)?))
                }
                (Some(Argument::Entities(entities)), None) => {
                    Ok(Outcome::Entities(repository.put_all(entities)?))
                }
                (Some(Argument::Entities(entities)), Some(Argument::Ttl(ttl))) => {
                    Ok(Outcome::Entities(repository.put_all_with_ttl(entities, ttl)?))
                }
                (first, second) => Err(write_mismatch(method, first, second)),
            },

            (Backend::KeyValue(repository), CrudOperation::Get) => match (first, second) {
                (Some(Argument::Value(Value::Array(keys))), None) => {
                    Ok(Outcome::Entities(repository.get_all(&keys)?))
                }
                (Some(Argument::Value(key)), None) if !key.is_null() => {
                    Ok(Outcome::Optional(repository.get(&key)?))
                }
                (first, second) => Err(single_mismatch(method, "key", first, second)),
            },

            (Backend::KeyValue(repository), CrudOperation::Remove) => match (first, second) {
                (Some(Argument::Value(Value::Array(keys))), None) => {
                    repository.remove_all(&keys)?;
                    Ok(Outcome::Unit)
                }
                (Some(Argument::Value(key)), None) if !key.is_null() => {
                    repository.remove(&key)?;
                    Ok(Outcome::Unit)
                }
                (first, second) => Err(single_mismatch(method, "key", first, second)),
            },

            (backend, operation) => Err(RepositoryError::invocation_mismatch(format!(
                "operation {} is not available on a {} repository",
                operation.method_name(),
                backend.kind()
            ))),
        }
    }
}

/// Split CRUD arguments into at most two positions
fn split_args<E>(
    method: &str,
    args: Vec<Argument<E>>,
) -> Result<(Option<Argument<E>>, Option<Argument<E>>)> {
    if args.len() > 2 {
        return Err(RepositoryError::invocation_mismatch(format!(
            "method {} takes at most 2 arguments, got {}",
            method,
            args.len()
        )));
    }
    let mut args = args.into_iter();
    Ok((args.next(), args.next()))
}

/// Error for a save / update / put call whose shapes fit no overload
fn write_mismatch<E>(
    method: &str,
    first: Option<Argument<E>>,
    second: Option<Argument<E>>,
) -> RepositoryError {
    match (&first, &second) {
        (None, _) => RepositoryError::null_required(format!("{}: entity is required", method)),
        (Some(arg), _) if arg.is_null() => {
            RepositoryError::null_required(format!("{}: entity is required", method))
        }
        (Some(Argument::Entity(_) | Argument::Entities(_)), Some(arg)) if arg.is_null() => {
            RepositoryError::null_required(format!("{}: ttl is required", method))
        }
        _ => shape_mismatch(method, first.as_ref(), second.as_ref()),
    }
}

/// Error for a call taking exactly one `what` argument
fn single_mismatch<E>(
    method: &str,
    what: &str,
    first: Option<Argument<E>>,
    second: Option<Argument<E>>,
) -> RepositoryError {
    match &first {
        None => RepositoryError::null_required(format!("{}: {} is required", method, what)),
        Some(arg) if arg.is_null() => {
            RepositoryError::null_required(format!("{}: {} is required", method, what))
        }
        _ => shape_mismatch(method, first.as_ref(), second.as_ref()),
    }
}

fn shape_mismatch<E>(
    method: &str,
    first: Option<&Argument<E>>,
    second: Option<&Argument<E>>,
) -> RepositoryError {
    let shapes: Vec<&str> = first.into_iter().chain(second).map(Argument::kind).collect();
    RepositoryError::invocation_mismatch(format!(
        "no overload of {} accepts ({})",
        method,
        shapes.join(", ")
    ))
}

impl<E> fmt::Debug for RepositoryDispatcher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryDispatcher")
            .field("entity", &self.metadata.name())
            .field("backend", &self.backend.kind())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .finish()
    }
}
