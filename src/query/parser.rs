//! Derived-query parsing from repository method names
//!
//! Turns names like `findByNameAndAgeGreaterThanOrderByNameDesc` into a
//! [`StructuredQuery`], binding positional call arguments to the conditions
//! in the order they appear.
//!
//! # Tokenizing
//! The name minus its query prefix is split before each `OrderBy`, `And`,
//! `AND`, `Or` or `OR` marker. A marker only counts when the next character
//! is an uppercase letter, so `OrderDate` and `AndroidVersion` stay single
//! fields. Leftmost match wins and `OrderBy` is preferred over `Or`.
//!
//! # Field names
//! A condition token is matched against the operator suffixes longest first.
//! When entity metadata is supplied and declares the whole token as a field
//! (`findByCheckedIn` with a `checkedIn` field), the token is that field
//! compared with EQUALS and no suffix is stripped.
//!
//! # Argument binding
//! Each condition consumes one argument, BETWEEN consumes two. `OrderBy`
//! tokens consume none. Arguments left after the last condition may be
//! `Sort` (appended) or `Pagination` (sets start/limit); anything else is
//! ignored with a log line, or rejected in strict mode.

use regex::Regex;
use std::sync::LazyLock;
use tracing::{debug, info};

use crate::config::RepositoryConfig;
use crate::error::{RepositoryError, Result};
use crate::metadata::EntityMetadata;
use crate::query::builder::StructuredQuery;
use crate::query::condition::ConditionBuilder;
use crate::types::{Argument, Operator, Sort, SortDirection};

/// Zero-width split points: a marker followed by the first letter of a field
static MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(OrderBy|AND|And|OR|Or)\p{Lu}").unwrap());

/// Marker at the head of a token, with the remainder captured
static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(OrderBy|AND|And|OR|Or)(\p{Lu}.*)$").unwrap());

const ORDER_BY: &str = "OrderBy";

/// Operator suffixes, longest first
const OPERATOR_SUFFIXES: &[(&str, Operator, bool)] = &[
    ("GreaterEqualThan", Operator::GreaterEqualsThan, false),
    ("GreaterThanEqual", Operator::GreaterEqualsThan, false),
    ("LessorEqualThan", Operator::LesserEqualsThan, false),
    ("LessThanEqual", Operator::LesserEqualsThan, false),
    ("LessEqualThan", Operator::LesserEqualsThan, false),
    ("GreaterThan", Operator::GreaterThan, false),
    ("LessThan", Operator::LesserThan, false),
    ("Between", Operator::Between, false),
    ("Equals", Operator::Equals, false),
    ("Like", Operator::Like, false),
    ("Gte", Operator::GreaterEqualsThan, false),
    ("Lte", Operator::LesserEqualsThan, false),
    ("Not", Operator::Equals, true),
    ("Gt", Operator::GreaterThan, false),
    ("Lt", Operator::LesserThan, false),
    ("In", Operator::In, false),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connector {
    /// The first condition of the method
    Root,
    And,
    Or,
}

/// One decoded token of a method name
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStep {
    Condition {
        connector: Connector,
        /// Logical field name, before metadata remapping
        field: String,
        operator: Operator,
        negated: bool,
    },
    Sort {
        field: String,
        direction: SortDirection,
    },
}

/// A method name decoded once, ready to bind arguments on every call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryPlan {
    method: String,
    steps: Vec<PlanStep>,
}

impl QueryPlan {
    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Positional arguments consumed by the conditions
    pub fn arity(&self) -> usize {
        self.steps
            .iter()
            .map(|step| match step {
                PlanStep::Condition { operator, .. } => operator.arity().unwrap_or(0),
                PlanStep::Sort { .. } => 0,
            })
            .sum()
    }

    /// Logical field names referenced by conditions and sorts
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.steps.iter().map(|step| match step {
            PlanStep::Condition { field, .. } | PlanStep::Sort { field, .. } => field.as_str(),
        })
    }
}

/// Parser for derived-query method names
#[derive(Debug, Clone, Default)]
pub struct MethodQueryParser {
    config: RepositoryConfig,
}

impl MethodQueryParser {
    pub fn new(config: RepositoryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Whether `method` carries one of the configured query prefixes
    pub fn is_query_method(&self, method: &str) -> bool {
        self.config.strip_query_prefix(method).is_some()
    }

    /// Parse `method` and bind `args` in one step
    pub fn parse<E>(
        &self,
        method: &str,
        args: &[Argument<E>],
        metadata: &EntityMetadata,
    ) -> Result<StructuredQuery> {
        let plan = self.plan_for(method, metadata)?;
        self.bind(&plan, args, metadata)
    }

    /// Decode a method name without binding arguments
    ///
    /// # Errors
    /// Returns `InvocationMismatch` when the name has no query prefix,
    /// nothing after it, or an `OrderBy` with no field.
    pub fn plan(&self, method: &str) -> Result<QueryPlan> {
        self.decode(method, None)
    }

    /// Decode a method name, preferring fields declared by `metadata` over
    /// operator suffixes
    pub fn plan_for(&self, method: &str, metadata: &EntityMetadata) -> Result<QueryPlan> {
        self.decode(method, Some(metadata))
    }

    fn decode(&self, method: &str, metadata: Option<&EntityMetadata>) -> Result<QueryPlan> {
        let body = self.config.strip_query_prefix(method).ok_or_else(|| {
            RepositoryError::invocation_mismatch(format!(
                "method {} does not start with a query prefix {:?}",
                method, self.config.query_prefixes
            ))
        })?;

        if body.is_empty() {
            return Err(RepositoryError::invocation_mismatch(format!(
                "method {} has no query after its prefix",
                method
            )));
        }

        let steps = tokenize(body)
            .into_iter()
            .map(|token| decode_token(token, metadata))
            .collect::<Vec<_>>();

        if steps
            .iter()
            .any(|step| matches!(step, PlanStep::Sort { field, .. } if field.is_empty()))
        {
            return Err(RepositoryError::invocation_mismatch(format!(
                "method {} has an OrderBy without a field",
                method
            )));
        }

        Ok(QueryPlan {
            method: method.to_string(),
            steps,
        })
    }

    /// Bind positional arguments to a decoded plan
    ///
    /// # Errors
    /// - `ArgumentCount` when a condition needs more arguments than remain
    /// - `InvocationMismatch` when a condition argument is not a plain value,
    ///   or a trailing argument is neither `Sort` nor `Pagination` in strict mode
    pub fn bind<E>(
        &self,
        plan: &QueryPlan,
        args: &[Argument<E>],
        metadata: &EntityMetadata,
    ) -> Result<StructuredQuery> {
        let mut query = StructuredQuery::new(metadata.name());
        let conditions = ConditionBuilder::new(metadata);
        let mut index = 0;

        for step in &plan.steps {
            match step {
                PlanStep::Condition {
                    connector,
                    field,
                    operator,
                    negated,
                } => {
                    let required = operator.arity().unwrap_or(1);
                    if index + required > args.len() {
                        return Err(RepositoryError::argument_count(format!(
                            "There is a missed argument in the method {}",
                            plan.method
                        )));
                    }

                    let operands = args[index..index + required]
                        .iter()
                        .enumerate()
                        .map(|(offset, arg)| match arg {
                            Argument::Value(value) => Ok(value.clone()),
                            other => Err(RepositoryError::invocation_mismatch(format!(
                                "argument {} of {} must be a value, got {}",
                                index + offset,
                                plan.method,
                                other.kind()
                            ))),
                        })
                        .collect::<Result<Vec<_>>>()?;

                    let mut condition = conditions.condition(field, *operator, operands)?;
                    if *negated {
                        condition = condition.negate();
                    }

                    match connector {
                        Connector::Root | Connector::And => query.and_condition(condition),
                        Connector::Or => query.or_condition(condition),
                    }
                    index += required;
                }
                PlanStep::Sort { field, direction } => {
                    query.add_sort(Sort::new(metadata.physical_name(field), *direction));
                }
            }
        }

        while index < args.len() {
            match &args[index] {
                Argument::Sort(sort) => query.add_sort(sort.clone()),
                Argument::Pagination(pagination) => query.apply_pagination(*pagination),
                other if self.config.strict_trailing_arguments => {
                    return Err(RepositoryError::invocation_mismatch(format!(
                        "unexpected {} argument {} on method {} of {}",
                        other.kind(),
                        index,
                        plan.method,
                        metadata.name()
                    )));
                }
                other => {
                    info!(
                        method = %plan.method,
                        entity = %metadata.name(),
                        arg_number = index,
                        kind = other.kind(),
                        "Ignoring parameter"
                    );
                }
            }
            index += 1;
        }

        debug!(method = %plan.method, query = ?query, "Parsed derived query");
        Ok(query)
    }
}

/// Split a method body at marker boundaries; markers stay on their token
pub fn tokenize(body: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut token_start = 0;
    let mut search_from = 0;

    while let Some(found) = MARKER.find_at(body, search_from) {
        if found.start() > token_start {
            tokens.push(&body[token_start..found.start()]);
            token_start = found.start();
        }
        // Markers are ASCII, so the next byte is a char boundary
        search_from = found.start() + 1;
    }

    if token_start < body.len() {
        tokens.push(&body[token_start..]);
    }
    tokens
}

fn decode_token(token: &str, metadata: Option<&EntityMetadata>) -> PlanStep {
    let (marker, rest) = match TOKEN.captures(token) {
        Some(captures) => match (captures.get(1), captures.get(2)) {
            (Some(marker), Some(rest)) => (marker.as_str(), rest.as_str()),
            _ => ("", token),
        },
        None => ("", token),
    };

    match marker {
        ORDER_BY => decode_sort(rest),
        "AND" | "And" => decode_condition(rest, Connector::And, metadata),
        "OR" | "Or" => decode_condition(rest, Connector::Or, metadata),
        _ => decode_condition(token, Connector::Root, metadata),
    }
}

fn decode_sort(token: &str) -> PlanStep {
    let (field, direction) = if let Some(field) = token.strip_suffix("Desc") {
        (field, SortDirection::Desc)
    } else if let Some(field) = token.strip_suffix("Asc") {
        (field, SortDirection::Asc)
    } else {
        (token, SortDirection::Asc)
    };

    PlanStep::Sort {
        field: decapitalize(field),
        direction,
    }
}

fn decode_condition(
    token: &str,
    connector: Connector,
    metadata: Option<&EntityMetadata>,
) -> PlanStep {
    let whole = decapitalize(token);
    if metadata.is_some_and(|metadata| metadata.declares(&whole)) {
        return PlanStep::Condition {
            connector,
            field: whole,
            operator: Operator::Equals,
            negated: false,
        };
    }

    let (field, operator, negated) = OPERATOR_SUFFIXES
        .iter()
        .find_map(|(suffix, operator, negated)| {
            token
                .strip_suffix(suffix)
                .filter(|field| !field.is_empty())
                .map(|field| (field, *operator, *negated))
        })
        .unwrap_or((token, Operator::Equals, false));

    PlanStep::Condition {
        connector,
        field: decapitalize(field),
        operator,
        negated,
    }
}

/// Lowercase the first character: `FirstName` -> `firstName`
fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}
