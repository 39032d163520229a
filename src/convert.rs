//! Entity <-> record conversion

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::marker::PhantomData;

use crate::error::{RepositoryError, Result};
use crate::metadata::EntityMetadata;
use crate::types::Record;

/// Translates entities into store records and back
///
/// Must be deterministic and free of side effects.
pub trait EntityConverter<E>: Send + Sync {
    fn to_record(&self, entity: &E) -> Result<Record>;

    fn to_entity(&self, record: &Record) -> Result<E>;
}

/// Converter for serde-serializable entities
///
/// Entities serialize to a JSON object whose keys are renamed to their
/// physical names; the record lands in the collection named after the entity.
pub struct SerdeConverter<E> {
    metadata: EntityMetadata,
    _entity: PhantomData<fn() -> E>,
}

impl<E> SerdeConverter<E> {
    pub fn new(metadata: EntityMetadata) -> Self {
        Self {
            metadata,
            _entity: PhantomData,
        }
    }

    pub fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }

    fn logical_name<'a>(&'a self, physical: &'a str) -> &'a str {
        self.metadata
            .fields
            .iter()
            .find(|(_, mapped)| mapped.as_str() == physical)
            .map(|(logical, _)| logical.as_str())
            .unwrap_or(physical)
    }
}

impl<E> EntityConverter<E> for SerdeConverter<E>
where
    E: Serialize + DeserializeOwned,
{
    fn to_record(&self, entity: &E) -> Result<Record> {
        let Value::Object(object) = serde_json::to_value(entity)? else {
            return Err(RepositoryError::conversion(format!(
                "entity {} does not serialize to an object",
                self.metadata.name()
            )));
        };

        let fields = object
            .into_iter()
            .map(|(field, value)| (self.metadata.physical_name(&field).to_string(), value))
            .collect();

        Ok(Record {
            collection: self.metadata.name().to_string(),
            fields,
        })
    }

    fn to_entity(&self, record: &Record) -> Result<E> {
        let object: Map<String, Value> = record
            .fields
            .iter()
            .map(|(field, value)| (self.logical_name(field).to_string(), value.clone()))
            .collect();

        serde_json::from_value(Value::Object(object)).map_err(|e| {
            RepositoryError::conversion(format!(
                "record from {} does not match entity {}: {}",
                record.collection,
                self.metadata.name(),
                e
            ))
        })
    }
}
