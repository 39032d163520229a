//! Query construction: condition trees, the fluent builder, and method-name parsing

pub mod builder;
pub mod condition;
pub mod parser;

pub use builder::{ConditionStage, OrderStage, QueryBuilder, StructuredQuery};
pub use condition::{Condition, ConditionBuilder};
pub use parser::{MethodQueryParser, QueryPlan};
