//! Structured queries and the fluent query builder
//!
//! ```rust
//! use nosql_repository::query::QueryBuilder;
//!
//! let query = QueryBuilder::select()
//!     .from("Person")
//!     .filter("name").eq("Ada")
//!     .and("age").gt(10)
//!     .order_by("name").desc()
//!     .limit(10)
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(query.collection(), "Person");
//! assert_eq!(query.sorts().len(), 1);
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RepositoryError, Result};
use crate::metadata::EntityMetadata;
use crate::query::condition::Condition;
use crate::types::{Operator, Pagination, Sort, SortDirection};

// ============================================================================
// Structured Query
// ============================================================================

/// Backend-agnostic query: target collection, predicate tree, sorts, window
///
/// Immutable once built. Equality is structural, with AND/OR children
/// compared as unordered collections.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StructuredQuery {
    collection: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    condition: Option<Condition>,
    #[serde(default)]
    sorts: Vec<Sort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    start: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u64>,
    #[serde(default)]
    fields: Vec<String>,
}

impl StructuredQuery {
    pub(crate) fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            condition: None,
            sorts: Vec::new(),
            start: None,
            limit: None,
            fields: Vec::new(),
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn condition(&self) -> Option<&Condition> {
        self.condition.as_ref()
    }

    pub fn sorts(&self) -> &[Sort] {
        &self.sorts
    }

    pub fn start(&self) -> Option<u64> {
        self.start
    }

    /// `None` means unbounded
    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// Projected fields; empty selects everything
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub(crate) fn and_condition(&mut self, condition: Condition) {
        self.condition = Some(match self.condition.take() {
            Some(current) => current.and(condition),
            None => condition,
        });
    }

    pub(crate) fn or_condition(&mut self, condition: Condition) {
        self.condition = Some(match self.condition.take() {
            Some(current) => current.or(condition),
            None => condition,
        });
    }

    pub(crate) fn add_sort(&mut self, sort: Sort) {
        self.sorts.push(sort);
    }

    pub(crate) fn set_start(&mut self, start: u64) {
        self.start = (start > 0).then_some(start);
    }

    pub(crate) fn set_limit(&mut self, limit: u64) {
        self.limit = (limit > 0).then_some(limit);
    }

    pub(crate) fn apply_pagination(&mut self, pagination: Pagination) {
        self.set_start(pagination.start);
        self.set_limit(pagination.limit);
    }
}

// ============================================================================
// Fluent Builder
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Connector {
    And,
    Or,
}

/// Fluent builder for [`StructuredQuery`]
///
/// Plain builders (`select`, `select_fields`) use field names verbatim.
/// `for_entity` targets the entity's collection and remaps every filter and
/// sort field through its metadata.
#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    collection: Option<String>,
    fields: Vec<String>,
    condition: Option<Condition>,
    sorts: Vec<Sort>,
    start: u64,
    limit: u64,
    metadata: Option<EntityMetadata>,
}

impl QueryBuilder {
    /// Select every field
    pub fn select() -> Self {
        Self::default()
    }

    /// Select only the given fields
    pub fn select_fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Select from the entity's collection with field remapping
    pub fn for_entity(metadata: &EntityMetadata) -> Self {
        Self {
            collection: Some(metadata.name().to_string()),
            metadata: Some(metadata.clone()),
            ..Self::default()
        }
    }

    pub fn from(mut self, collection: impl Into<String>) -> Self {
        self.collection = Some(collection.into());
        self
    }

    /// Start the predicate on `field`; combines with AND if one already exists
    pub fn filter(self, field: impl AsRef<str>) -> ConditionStage {
        self.stage(field.as_ref(), Connector::And)
    }

    pub fn and(self, field: impl AsRef<str>) -> ConditionStage {
        self.stage(field.as_ref(), Connector::And)
    }

    pub fn or(self, field: impl AsRef<str>) -> ConditionStage {
        self.stage(field.as_ref(), Connector::Or)
    }

    pub fn order_by(self, field: impl AsRef<str>) -> OrderStage {
        let field = self.resolve(field.as_ref());
        OrderStage {
            builder: self,
            field,
        }
    }

    /// Skip the first `start` results (0 = no offset)
    pub fn start(mut self, start: u64) -> Self {
        self.start = start;
        self
    }

    /// Return at most `limit` results (0 = unbounded)
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = limit;
        self
    }

    /// Finish the query
    ///
    /// # Errors
    /// Returns `IllegalState` when no collection was set with `from`.
    pub fn build(self) -> Result<StructuredQuery> {
        let collection = self.collection.ok_or_else(|| {
            RepositoryError::illegal_state("query has no target collection; call from() first")
        })?;

        let mut query = StructuredQuery::new(collection);
        query.condition = self.condition;
        query.sorts = self.sorts;
        query.fields = self.fields;
        query.set_start(self.start);
        query.set_limit(self.limit);
        Ok(query)
    }

    fn stage(self, field: &str, connector: Connector) -> ConditionStage {
        let field = self.resolve(field);
        ConditionStage {
            builder: self,
            field,
            connector,
            negated: false,
        }
    }

    fn resolve(&self, field: &str) -> String {
        match &self.metadata {
            Some(metadata) => metadata.physical_name(field).to_string(),
            None => field.to_string(),
        }
    }

    fn push(mut self, connector: Connector, condition: Condition) -> Self {
        self.condition = Some(match (self.condition.take(), connector) {
            (None, _) => condition,
            (Some(current), Connector::And) => current.and(condition),
            (Some(current), Connector::Or) => current.or(condition),
        });
        self
    }
}

/// Operator selection for one field
#[derive(Debug, Clone)]
pub struct ConditionStage {
    builder: QueryBuilder,
    field: String,
    connector: Connector,
    negated: bool,
}

impl ConditionStage {
    /// Negate the condition that follows
    pub fn not(mut self) -> Self {
        self.negated = !self.negated;
        self
    }

    pub fn eq(self, value: impl Into<Value>) -> QueryBuilder {
        self.finish(Operator::Equals, value.into())
    }

    pub fn like(self, value: impl Into<Value>) -> QueryBuilder {
        self.finish(Operator::Like, value.into())
    }

    pub fn gt(self, value: impl Into<Value>) -> QueryBuilder {
        self.finish(Operator::GreaterThan, value.into())
    }

    pub fn gte(self, value: impl Into<Value>) -> QueryBuilder {
        self.finish(Operator::GreaterEqualsThan, value.into())
    }

    pub fn lt(self, value: impl Into<Value>) -> QueryBuilder {
        self.finish(Operator::LesserThan, value.into())
    }

    pub fn lte(self, value: impl Into<Value>) -> QueryBuilder {
        self.finish(Operator::LesserEqualsThan, value.into())
    }

    pub fn between(self, min: impl Into<Value>, max: impl Into<Value>) -> QueryBuilder {
        self.finish(Operator::Between, Value::Array(vec![min.into(), max.into()]))
    }

    pub fn in_list<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> QueryBuilder {
        let values = values.into_iter().map(Into::into).collect();
        self.finish(Operator::In, Value::Array(values))
    }

    fn finish(self, operator: Operator, value: Value) -> QueryBuilder {
        let leaf = Condition::Leaf {
            field: self.field,
            operator,
            value,
        };
        let condition = if self.negated { leaf.negate() } else { leaf };
        self.builder.push(self.connector, condition)
    }
}

/// Direction selection for one sort field
#[derive(Debug, Clone)]
pub struct OrderStage {
    builder: QueryBuilder,
    field: String,
}

impl OrderStage {
    pub fn asc(self) -> QueryBuilder {
        self.finish(SortDirection::Asc)
    }

    pub fn desc(self) -> QueryBuilder {
        self.finish(SortDirection::Desc)
    }

    fn finish(mut self, direction: SortDirection) -> QueryBuilder {
        self.builder.sorts.push(Sort::new(self.field, direction));
        self.builder
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::condition::{and, between, eq, gt, gte, like, lt, lte, not, or};
    use serde_json::json;

    fn worker() -> EntityMetadata {
        EntityMetadata::new("Worker")
            .with_id("id", "_id")
            .with_mapped_field("salary", "money")
    }

    // ==================== Basics ====================

    #[test]
    fn test_select_star_from() {
        let query = QueryBuilder::select().from("Person").build().unwrap();

        assert_eq!(query.collection(), "Person");
        assert!(query.condition().is_none());
        assert!(query.sorts().is_empty());
        assert!(query.fields().is_empty());
        assert_eq!(query.start(), None);
        assert_eq!(query.limit(), None);
    }

    #[test]
    fn test_build_without_from_fails() {
        let err = QueryBuilder::select()
            .filter("name")
            .eq("Ada")
            .build()
            .unwrap_err();
        assert!(matches!(err, RepositoryError::IllegalState(_)));
    }

    #[test]
    fn test_select_fields() {
        let query = QueryBuilder::select_fields(["name", "age"])
            .from("Person")
            .build()
            .unwrap();
        assert_eq!(query.fields(), &["name".to_string(), "age".to_string()]);
    }

    #[test]
    fn test_start_and_limit() {
        let query = QueryBuilder::select()
            .from("Person")
            .start(10)
            .limit(5)
            .build()
            .unwrap();
        assert_eq!(query.start(), Some(10));
        assert_eq!(query.limit(), Some(5));
    }

    #[test]
    fn test_zero_limit_is_unbounded() {
        let zero = QueryBuilder::select()
            .from("Person")
            .start(0)
            .limit(0)
            .build()
            .unwrap();
        let unset = QueryBuilder::select().from("Person").build().unwrap();

        assert_eq!(zero.limit(), None);
        assert_eq!(zero, unset);
    }

    // ==================== Conditions ====================

    #[test]
    fn test_leaf_operators() {
        let cases = vec![
            (QueryBuilder::select().from("p").filter("a").eq(1), eq("a", 1)),
            (QueryBuilder::select().from("p").filter("a").like("x%"), like("a", "x%")),
            (QueryBuilder::select().from("p").filter("a").gt(1), gt("a", 1)),
            (QueryBuilder::select().from("p").filter("a").gte(1), gte("a", 1)),
            (QueryBuilder::select().from("p").filter("a").lt(1), lt("a", 1)),
            (QueryBuilder::select().from("p").filter("a").lte(1), lte("a", 1)),
            (QueryBuilder::select().from("p").filter("a").between(1, 2), between("a", 1, 2)),
        ];

        for (builder, expected) in cases {
            let query = builder.build().unwrap();
            assert_eq!(query.condition(), Some(&expected));
        }
    }

    #[test]
    fn test_not_wraps_following_leaf() {
        let query = QueryBuilder::select()
            .from("columnFamily")
            .filter("name")
            .not()
            .eq("Ada Lovelace")
            .build()
            .unwrap();

        let condition = query.condition().unwrap();
        assert_eq!(condition.operator(), Operator::Not);
        let negated = &condition.children()[0];
        assert_eq!(negated.operator(), Operator::Equals);
        assert_eq!(negated.field(), Some("name"));
        assert_eq!(negated.value(), Some(&json!("Ada Lovelace")));
    }

    #[test]
    fn test_and_composite_any_order() {
        let query = QueryBuilder::select()
            .from("columnFamily")
            .filter("name")
            .eq("Ada Lovelace")
            .and("age")
            .gt(10)
            .build()
            .unwrap();

        let condition = query.condition().unwrap();
        assert_eq!(condition.operator(), Operator::And);
        assert_eq!(
            condition,
            &and(vec![gt("age", 10), eq("name", "Ada Lovelace")])
        );
    }

    #[test]
    fn test_or_composite() {
        let query = QueryBuilder::select()
            .from("columnFamily")
            .filter("name")
            .eq("Ada Lovelace")
            .or("age")
            .gt(10)
            .build()
            .unwrap();

        assert_eq!(
            query.condition(),
            Some(&or(vec![eq("name", "Ada Lovelace"), gt("age", 10)]))
        );
    }

    #[test]
    fn test_repeated_and_flattens() {
        let query = QueryBuilder::select()
            .from("p")
            .filter("a")
            .eq(1)
            .and("b")
            .eq(2)
            .and("c")
            .not()
            .eq(3)
            .build()
            .unwrap();

        assert_eq!(
            query.condition(),
            Some(&and(vec![eq("a", 1), eq("b", 2), not(eq("c", 3))]))
        );
    }

    #[test]
    fn test_mixed_connectors_fold_left() {
        let query = QueryBuilder::select()
            .from("p")
            .filter("a")
            .eq(1)
            .and("b")
            .eq(2)
            .or("c")
            .eq(3)
            .build()
            .unwrap();

        assert_eq!(
            query.condition(),
            Some(&or(vec![and(vec![eq("a", 1), eq("b", 2)]), eq("c", 3)]))
        );
    }

    #[test]
    fn test_plain_builder_is_verbatim() {
        let query = QueryBuilder::select()
            .from("Person")
            .filter("id")
            .gt(10)
            .build()
            .unwrap();
        assert_eq!(query.condition(), Some(&gt("id", 10)));
    }

    // ==================== Sorting ====================

    #[test]
    fn test_order_by_keeps_call_order() {
        let query = QueryBuilder::select()
            .from("Person")
            .order_by("name")
            .asc()
            .order_by("age")
            .desc()
            .build()
            .unwrap();

        assert_eq!(query.sorts(), &[Sort::asc("name"), Sort::desc("age")]);
    }

    // ==================== Entity Mapping ====================

    #[test]
    fn test_for_entity_targets_collection() {
        let query = QueryBuilder::for_entity(&worker()).build().unwrap();
        let expected = QueryBuilder::select().from("Worker").build().unwrap();
        assert_eq!(query, expected);
    }

    #[test]
    fn test_for_entity_remaps_order_by() {
        let query = QueryBuilder::for_entity(&worker())
            .order_by("salary")
            .desc()
            .build()
            .unwrap();
        let expected = QueryBuilder::select()
            .from("Worker")
            .order_by("money")
            .desc()
            .build()
            .unwrap();
        assert_eq!(query, expected);
    }

    #[test]
    fn test_for_entity_remaps_identifier() {
        let query = QueryBuilder::for_entity(&worker())
            .filter("id")
            .between(10, 20)
            .build()
            .unwrap();
        let expected = QueryBuilder::select()
            .from("Worker")
            .filter("_id")
            .between(10, 20)
            .build()
            .unwrap();
        assert_eq!(query, expected);
    }

    #[test]
    fn test_query_serialization() {
        let query = QueryBuilder::select()
            .from("Person")
            .filter("name")
            .eq("Ada")
            .limit(3)
            .build()
            .unwrap();

        let json = serde_json::to_value(&query).unwrap();
        assert_eq!(json["collection"], "Person");
        assert_eq!(json["limit"], 3);
        assert!(json.get("start").is_none());

        let parsed: StructuredQuery = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, query);
    }
}
