//! Core type definitions for repository queries
//!
//! Includes condition operators, sort and pagination specifications,
//! time-to-live values, and the backend record shape.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::query::StructuredQuery;

// ============================================================================
// Condition Operators
// ============================================================================

/// Tag carried by every node of a condition tree
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Equals,
    Like,
    GreaterThan,
    GreaterEqualsThan,
    LesserThan,
    LesserEqualsThan,
    Between,
    In,
    And,
    Or,
    Not,
}

impl Operator {
    /// Number of operands a leaf with this operator consumes
    ///
    /// Returns `None` for the composite operators (AND, OR, NOT).
    pub fn arity(&self) -> Option<usize> {
        match self {
            Operator::Between => Some(2),
            Operator::Equals
            | Operator::Like
            | Operator::GreaterThan
            | Operator::GreaterEqualsThan
            | Operator::LesserThan
            | Operator::LesserEqualsThan
            | Operator::In => Some(1),
            Operator::And | Operator::Or | Operator::Not => None,
        }
    }

    /// Whether this operator builds a composite node
    pub fn is_composite(&self) -> bool {
        self.arity().is_none()
    }
}

// ============================================================================
// Sorting and Pagination
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

/// A single ORDER BY entry
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn new(field: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            field: field.into(),
            direction,
        }
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Asc)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortDirection::Desc)
    }
}

/// Offset/limit window applied to a query
///
/// A `limit` of zero means unbounded, and a `start` of zero means no offset;
/// both are stored on the query as absent.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub struct Pagination {
    pub start: u64,
    pub limit: u64,
}

impl Pagination {
    pub fn new(start: u64, limit: u64) -> Self {
        Self { start, limit }
    }

    /// Page `page` (zero-based) of `size` elements
    pub fn page(page: u64, size: u64) -> Self {
        Self {
            start: page.saturating_mul(size),
            limit: size,
        }
    }
}

// ============================================================================
// Time To Live
// ============================================================================

/// Expiration applied to a saved record by stores that support it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ttl(TimeDelta);

impl Ttl {
    pub fn new(duration: TimeDelta) -> Self {
        Self(duration)
    }

    pub fn seconds(seconds: i64) -> Self {
        Self(TimeDelta::seconds(seconds))
    }

    pub fn duration(&self) -> TimeDelta {
        self.0
    }

    /// Absolute expiry for a record written at `now`
    pub fn expires_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + self.0
    }
}

impl From<std::time::Duration> for Ttl {
    fn from(value: std::time::Duration) -> Self {
        Self(TimeDelta::from_std(value).unwrap_or(TimeDelta::MAX))
    }
}

// ============================================================================
// Backend Records
// ============================================================================

/// Store-level representation of an entity: a named collection plus fields
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Record {
    /// Collection, column family, or bucket name
    pub collection: String,
    pub fields: Map<String, Value>,
}

impl Record {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            fields: Map::new(),
        }
    }

    /// Add a field, replacing any existing value
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

// ============================================================================
// Call Arguments
// ============================================================================

/// Positional argument of a repository method call
///
/// Derived-query methods bind `Value` arguments to their conditions and read
/// trailing `Sort` / `Pagination` arguments; CRUD methods take entities,
/// keys, queries and TTLs.
#[derive(Debug, Clone)]
pub enum Argument<E = ()> {
    Value(Value),
    Sort(Sort),
    Pagination(Pagination),
    Ttl(Ttl),
    Query(StructuredQuery),
    Entity(E),
    Entities(Vec<E>),
}

impl<E> Argument<E> {
    /// Short shape name used in diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Argument::Value(Value::Null) => "null",
            Argument::Value(_) => "value",
            Argument::Sort(_) => "sort",
            Argument::Pagination(_) => "pagination",
            Argument::Ttl(_) => "ttl",
            Argument::Query(_) => "query",
            Argument::Entity(_) => "entity",
            Argument::Entities(_) => "entities",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Argument::Value(Value::Null))
    }
}

impl<E> From<Value> for Argument<E> {
    fn from(value: Value) -> Self {
        Argument::Value(value)
    }
}

impl<E> From<Sort> for Argument<E> {
    fn from(value: Sort) -> Self {
        Argument::Sort(value)
    }
}

impl<E> From<Pagination> for Argument<E> {
    fn from(value: Pagination) -> Self {
        Argument::Pagination(value)
    }
}

impl<E> From<Ttl> for Argument<E> {
    fn from(value: Ttl) -> Self {
        Argument::Ttl(value)
    }
}

impl<E> From<StructuredQuery> for Argument<E> {
    fn from(value: StructuredQuery) -> Self {
        Argument::Query(value)
    }
}

macro_rules! value_argument {
    ($($ty:ty),*) => {
        $(
            impl<E> From<$ty> for Argument<E> {
                fn from(value: $ty) -> Self {
                    Argument::Value(Value::from(value))
                }
            }
        )*
    };
}

value_argument!(&str, String, bool, i32, i64, u32, u64, f64);
