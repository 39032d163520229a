//! Condition trees and the leaf condition builder
//!
//! A condition is either a `(field, operator, value)` leaf or an AND / OR / NOT
//! composite. AND and OR children compare as unordered collections, so two
//! trees built in different orders are equal.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{RepositoryError, Result};
use crate::metadata::EntityMetadata;
use crate::types::Operator;

/// Node of a query predicate tree
///
/// BETWEEN leaves hold a two-element array `[min, max]`; IN leaves hold the
/// array of candidates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Condition {
    Leaf {
        field: String,
        operator: Operator,
        value: Value,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    /// The node's own tag
    pub fn operator(&self) -> Operator {
        match self {
            Condition::Leaf { operator, .. } => *operator,
            Condition::And(_) => Operator::And,
            Condition::Or(_) => Operator::Or,
            Condition::Not(_) => Operator::Not,
        }
    }

    /// Field name of a leaf
    pub fn field(&self) -> Option<&str> {
        match self {
            Condition::Leaf { field, .. } => Some(field),
            _ => None,
        }
    }

    /// Operand of a leaf
    pub fn value(&self) -> Option<&Value> {
        match self {
            Condition::Leaf { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Direct children: the members of AND/OR, the wrapped node of NOT
    pub fn children(&self) -> &[Condition] {
        match self {
            Condition::Leaf { .. } => &[],
            Condition::And(children) | Condition::Or(children) => children,
            Condition::Not(inner) => std::slice::from_ref(inner.as_ref()),
        }
    }

    /// Combine with AND, appending to an existing AND node instead of nesting
    pub fn and(self, other: Condition) -> Condition {
        match self {
            Condition::And(mut children) => {
                children.push(other);
                Condition::And(children)
            }
            current => Condition::And(vec![current, other]),
        }
    }

    /// Combine with OR, appending to an existing OR node instead of nesting
    pub fn or(self, other: Condition) -> Condition {
        match self {
            Condition::Or(mut children) => {
                children.push(other);
                Condition::Or(children)
            }
            current => Condition::Or(vec![current, other]),
        }
    }

    pub fn negate(self) -> Condition {
        Condition::Not(Box::new(self))
    }
}

impl PartialEq for Condition {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Condition::Leaf {
                    field: f1,
                    operator: o1,
                    value: v1,
                },
                Condition::Leaf {
                    field: f2,
                    operator: o2,
                    value: v2,
                },
            ) => f1 == f2 && o1 == o2 && v1 == v2,
            (Condition::And(a), Condition::And(b)) | (Condition::Or(a), Condition::Or(b)) => {
                same_members(a, b)
            }
            (Condition::Not(a), Condition::Not(b)) => a == b,
            _ => false,
        }
    }
}

/// Multiset comparison: every member of `a` pairs with a distinct equal member of `b`
fn same_members(a: &[Condition], b: &[Condition]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    a.iter().all(|left| {
        let matched = b
            .iter()
            .enumerate()
            .position(|(i, right)| !used[i] && left == right);
        match matched {
            Some(i) => {
                used[i] = true;
                true
            }
            None => false,
        }
    })
}

// ============================================================================
// Condition Builder
// ============================================================================

/// Builds validated leaf conditions, remapping field names through metadata
#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionBuilder<'a> {
    metadata: Option<&'a EntityMetadata>,
}

impl<'a> ConditionBuilder<'a> {
    /// Builder that remaps fields through `metadata`
    pub fn new(metadata: &'a EntityMetadata) -> Self {
        Self {
            metadata: Some(metadata),
        }
    }

    /// Builder that keeps field names as given
    pub fn verbatim() -> Self {
        Self { metadata: None }
    }

    /// Physical name for `field`, or `field` itself without metadata
    pub fn resolve_field(&self, field: &str) -> String {
        match self.metadata {
            Some(metadata) => metadata.physical_name(field).to_string(),
            None => field.to_string(),
        }
    }

    /// Build a leaf condition
    ///
    /// # Errors
    /// - `InvalidField` when `field` is empty
    /// - `InvalidCondition` when `operator` is AND, OR or NOT
    /// - `ArgumentCount` when the operand count does not match the operator
    ///   (two for BETWEEN, one otherwise)
    /// - `InvalidCondition` when the IN operand is not an array
    pub fn condition(
        &self,
        field: &str,
        operator: Operator,
        mut operands: Vec<Value>,
    ) -> Result<Condition> {
        if field.trim().is_empty() {
            return Err(RepositoryError::InvalidField(
                "field name cannot be empty".to_string(),
            ));
        }

        let Some(arity) = operator.arity() else {
            return Err(RepositoryError::InvalidCondition(format!(
                "{:?} is not a leaf operator",
                operator
            )));
        };

        if operands.len() != arity {
            return Err(RepositoryError::argument_count(format!(
                "{:?} on '{}' requires {} operand(s), got {}",
                operator,
                field,
                arity,
                operands.len()
            )));
        }

        if operator == Operator::In && !operands[0].is_array() {
            return Err(RepositoryError::InvalidCondition(format!(
                "In on '{}' requires an array operand, got {}",
                field, operands[0]
            )));
        }

        let value = if operator == Operator::Between {
            Value::Array(operands)
        } else {
            operands.remove(0)
        };

        Ok(Condition::Leaf {
            field: self.resolve_field(field),
            operator,
            value,
        })
    }
}

// ============================================================================
// Verbatim Constructors
// ============================================================================

fn leaf(field: impl Into<String>, operator: Operator, value: Value) -> Condition {
    Condition::Leaf {
        field: field.into(),
        operator,
        value,
    }
}

/// field == value
pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Condition {
    leaf(field, Operator::Equals, value.into())
}

/// field LIKE pattern
pub fn like(field: impl Into<String>, value: impl Into<Value>) -> Condition {
    leaf(field, Operator::Like, value.into())
}

/// field > value
pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Condition {
    leaf(field, Operator::GreaterThan, value.into())
}

/// field >= value
pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Condition {
    leaf(field, Operator::GreaterEqualsThan, value.into())
}

/// field < value
pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Condition {
    leaf(field, Operator::LesserThan, value.into())
}

/// field <= value
pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Condition {
    leaf(field, Operator::LesserEqualsThan, value.into())
}

/// min <= field <= max
pub fn between(
    field: impl Into<String>,
    min: impl Into<Value>,
    max: impl Into<Value>,
) -> Condition {
    leaf(
        field,
        Operator::Between,
        Value::Array(vec![min.into(), max.into()]),
    )
}

/// field IN values
pub fn in_list<V: Into<Value>>(
    field: impl Into<String>,
    values: impl IntoIterator<Item = V>,
) -> Condition {
    leaf(
        field,
        Operator::In,
        Value::Array(values.into_iter().map(Into::into).collect()),
    )
}

pub fn not(condition: Condition) -> Condition {
    condition.negate()
}

pub fn and(conditions: Vec<Condition>) -> Condition {
    Condition::And(conditions)
}

pub fn or(conditions: Vec<Condition>) -> Condition {
    Condition::Or(conditions)
}
