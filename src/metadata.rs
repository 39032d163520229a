//! Entity metadata consumed by the query layer
//!
//! A pre-built, read-only lookup of logical field name to physical field
//! name plus the entity's identifier field.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Field mapping for one entity type
///
/// The entity name doubles as the target collection name. Lookups are total:
/// a field without an explicit mapping resolves to itself.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityMetadata {
    /// Entity name, used as collection / column family
    pub name: String,
    /// Logical field name -> physical field name
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    /// Logical name of the identifier field
    #[serde(rename = "idField", skip_serializing_if = "Option::is_none")]
    pub id_field: Option<String>,
}

impl EntityMetadata {
    /// Create metadata with no declared fields
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: BTreeMap::new(),
            id_field: None,
        }
    }

    /// Declare a field stored under its own name
    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        let field = field.into();
        self.fields.insert(field.clone(), field);
        self
    }

    /// Declare a field stored under a different physical name
    pub fn with_mapped_field(
        mut self,
        field: impl Into<String>,
        physical: impl Into<String>,
    ) -> Self {
        self.fields.insert(field.into(), physical.into());
        self
    }

    /// Declare the identifier field and its physical name
    pub fn with_id(mut self, field: impl Into<String>, physical: impl Into<String>) -> Self {
        let field = field.into();
        self.fields.insert(field.clone(), physical.into());
        self.id_field = Some(field);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id_field(&self) -> Option<&str> {
        self.id_field.as_deref()
    }

    /// Physical name of the identifier field, if one is declared
    pub fn id_physical_name(&self) -> Option<&str> {
        self.id_field().map(|id| self.physical_name(id))
    }

    /// Resolve a logical field to its physical name; unknown fields pass through
    pub fn physical_name<'a>(&'a self, field: &'a str) -> &'a str {
        self.fields.get(field).map(String::as_str).unwrap_or(field)
    }

    /// Whether `field` is declared, by logical or physical name
    pub fn declares(&self, field: &str) -> bool {
        self.fields.contains_key(field) || self.fields.values().any(|p| p == field)
    }

    pub fn declared_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn has_declared_fields(&self) -> bool {
        !self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> EntityMetadata {
        EntityMetadata::new("Person")
            .with_id("id", "_id")
            .with_field("name")
            .with_field("age")
    }

    #[test]
    fn test_identifier_alias() {
        let metadata = person();
        assert_eq!(metadata.id_field(), Some("id"));
        assert_eq!(metadata.id_physical_name(), Some("_id"));
        assert_eq!(metadata.physical_name("id"), "_id");
    }

    #[test]
    fn test_unknown_fields_pass_through() {
        let metadata = person();
        assert_eq!(metadata.physical_name("name"), "name");
        assert_eq!(metadata.physical_name("nickname"), "nickname");
    }

    #[test]
    fn test_mapped_field() {
        let metadata = EntityMetadata::new("Worker").with_mapped_field("salary", "money");
        assert_eq!(metadata.physical_name("salary"), "money");
        assert!(metadata.declares("salary"));
        assert!(metadata.declares("money"));
        assert!(!metadata.declares("job"));
    }

    #[test]
    fn test_declared_fields() {
        let metadata = person();
        let fields: Vec<&str> = metadata.declared_fields().collect();
        assert_eq!(fields, vec!["age", "id", "name"]);
        assert!(metadata.has_declared_fields());
        assert!(!EntityMetadata::new("Empty").has_declared_fields());
    }

    #[test]
    fn test_metadata_serialization() {
        let metadata = person();
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["idField"], "id");
        assert_eq!(json["fields"]["id"], "_id");

        let parsed: EntityMetadata = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, metadata);
    }
}
