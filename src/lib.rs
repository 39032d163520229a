//! # nosql-repository
//!
//! Repository-pattern query engine for document and column NoSQL stores.
//!
//! Repository methods are declared by name (`findByNameAndAgeGreaterThan`,
//! `findByIdBetweenOrderByNameDesc`) and translated into backend-agnostic
//! [`StructuredQuery`] values. CRUD calls are mediated against an opaque
//! storage driver with lifecycle hooks fired in a fixed order.
//!
//! ## Features
//!
//! - **Derived Queries**: Method names decode into condition trees, sorts and
//!   pagination, with positional argument binding
//! - **Fluent Builder**: `select().from(..).filter(..).eq(..)` construction of
//!   the same queries, verbatim or remapped through entity metadata
//! - **Lifecycle Hooks**: pre-entity, pre-record, post-record and post-entity
//!   observers around every save and update
//! - **Async Completion**: callback-based store drivers surface as awaitable
//!   [`Completion`] values. [`Completion::wait`] blocks the calling thread and
//!   panics on an async runtime worker; inside a runtime, `.await` the
//!   completion or wait from `tokio::task::spawn_blocking`
//! - **Key-Value Backends**: `put` / `get` / `remove` dispatch over
//!   [`KeyValueRepository`] implementations
//!
//! ## Quick Start
//!
//! ```rust
//! use nosql_repository::{Argument, EntityMetadata, MethodQueryParser, QueryBuilder};
//!
//! let metadata = EntityMetadata::new("Person")
//!     .with_id("id", "_id")
//!     .with_field("name")
//!     .with_field("age");
//!
//! let parser = MethodQueryParser::default();
//! let args: Vec<Argument> = vec![10.into(), 20.into()];
//! let parsed = parser
//!     .parse("findByIdBetweenOrderByNameDesc", &args, &metadata)
//!     .unwrap();
//!
//! let built = QueryBuilder::for_entity(&metadata)
//!     .filter("id")
//!     .between(10, 20)
//!     .order_by("name")
//!     .desc()
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(parsed, built);
//! ```
//!
//! ## Configuration
//!
//! ```rust
//! use nosql_repository::RepositoryConfig;
//!
//! let config = RepositoryConfig::builder()
//!     .query_prefix("findBy")           // Default query prefix
//!     .query_prefix("queryBy")          // Additional prefixes are allowed
//!     .strict_trailing_arguments(false) // Ignore unknown trailing arguments (default)
//!     .validate_fields(true)            // Reject undeclared fields at registration (default)
//!     .build();
//! ```
//!
//! ## Logging
//!
//! The crate emits `tracing` events and installs no subscriber.

pub mod config;
pub mod convert;
pub mod error;
pub mod lifecycle;
pub mod mediator;
pub mod metadata;
pub mod query;
pub mod repository;
pub mod store;
pub mod types;

// Re-export main types for convenience
pub use config::{RepositoryConfig, RepositoryConfigBuilder};
pub use convert::{EntityConverter, SerdeConverter};
pub use error::{RepositoryError, Result};
pub use lifecycle::{LifecycleEvent, LifecycleObserver, LifecycleObservers, LifecyclePhase};
pub use mediator::CrudMediator;
pub use metadata::EntityMetadata;
pub use query::{
    Condition, ConditionBuilder, ConditionStage, MethodQueryParser, OrderStage, QueryBuilder,
    QueryPlan, StructuredQuery,
};
pub use repository::{CrudOperation, MethodBinding, Outcome, RepositoryDispatcher};
pub use store::{Callback, CollectionManager, Completion, KeyValueRepository};
pub use types::{Argument, Operator, Pagination, Record, Sort, SortDirection, Ttl};

// Free condition constructors
pub use query::condition as condition_helpers;
