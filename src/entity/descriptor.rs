//! Entity Descriptors
//!
//! Static per-kind metadata: the fields a complete server record carries (with
//! the coercion applied to each), the identifier field, the optional
//! human-readable name field, and the wire keys used by the remote service.

use serde_json::Value;
use std::fmt;

use crate::error::{CatalogError, Result};

/// The seven kinds of catalog entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    User,
    DataStore,
    DataSchema,
    DataField,
    FieldValue,
    Transformation,
    TransformationLink,
}

impl EntityKind {
    pub fn descriptor(&self) -> &'static EntityDescriptor {
        match self {
            EntityKind::User => &USER,
            EntityKind::DataStore => &DATA_STORE,
            EntityKind::DataSchema => &DATA_SCHEMA,
            EntityKind::DataField => &DATA_FIELD,
            EntityKind::FieldValue => &FIELD_VALUE,
            EntityKind::Transformation => &TRANSFORMATION,
            EntityKind::TransformationLink => &TRANSFORMATION_LINK,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            EntityKind::User => "user",
            EntityKind::DataStore => "data store",
            EntityKind::DataSchema => "data schema",
            EntityKind::DataField => "data field",
            EntityKind::FieldValue => "field value",
            EntityKind::Transformation => "transformation",
            EntityKind::TransformationLink => "transformation link",
        };
        f.write_str(label)
    }
}

/// How a raw record value is coerced when a record is hydrated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    Integer,
    Text,
    Boolean,
    Object,
    /// Wrap the value (an id or a user record) as a lazily hydrated user
    User,
}

impl Coercion {
    /// Coerce a non-null scalar value. `User` values pass through untouched;
    /// they are wrapped by the entity core.
    pub fn apply(&self, field: &str, value: &Value) -> Result<Value> {
        let coerced = match (self, value) {
            (Coercion::Integer, Value::Number(n)) if n.is_i64() => Some(value.clone()),
            (Coercion::Integer, Value::String(s)) => s.trim().parse::<i64>().ok().map(Value::from),
            (Coercion::Text, Value::String(_)) => Some(value.clone()),
            (Coercion::Text, Value::Number(n)) => Some(Value::String(n.to_string())),
            (Coercion::Text, Value::Bool(b)) => Some(Value::String(b.to_string())),
            (Coercion::Boolean, Value::Bool(_)) => Some(value.clone()),
            (Coercion::Boolean, Value::String(s)) => match s.to_ascii_lowercase().as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            (Coercion::Object, Value::Object(_)) => Some(value.clone()),
            (Coercion::User, Value::Number(_) | Value::Object(_)) => Some(value.clone()),
            _ => None,
        };

        coerced.ok_or_else(|| {
            CatalogError::InvalidFieldInputs(format!(
                "field '{}' cannot be read as {:?}: {}",
                field, self, value
            ))
        })
    }
}

/// Immutable per-kind metadata
#[derive(Debug)]
pub struct EntityDescriptor {
    pub kind: EntityKind,
    /// Fields of a complete server record with their coercions
    pub fields: &'static [(&'static str, Coercion)],
    pub id_field: &'static str,
    /// Field holding the human-readable lookup key
    pub name_field: Option<&'static str>,
    /// Query parameter used for remote lookups by name
    pub name_query: Option<&'static str>,
    /// Response key wrapping a single record, e.g. `data_store`
    pub record_key: &'static str,
    /// Response key wrapping a page of records, e.g. `data_stores`
    pub collection_key: &'static str,
    /// Path segment of the collection, e.g. `data-stores`
    pub segment: &'static str,
    /// Fields a creation payload must carry
    pub create_required: &'static [&'static str],
}

impl EntityDescriptor {
    /// Whether `inputs` carries every field of a complete server record
    pub fn is_complete(&self, inputs: &serde_json::Map<String, Value>) -> bool {
        self.fields.iter().all(|(field, _)| inputs.contains_key(*field))
    }

    pub fn coercion(&self, field: &str) -> Option<Coercion> {
        self.fields
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, coercion)| *coercion)
    }

    /// Fields wrapped as user sub-entities
    pub fn user_fields(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields
            .iter()
            .filter(|(_, coercion)| *coercion == Coercion::User)
            .map(|(field, _)| *field)
    }

    /// Check that a creation payload carries the required fields
    pub fn validate_creation(&self, inputs: &serde_json::Map<String, Value>) -> Result<()> {
        let missing: Vec<&str> = self
            .create_required
            .iter()
            .copied()
            .filter(|field| inputs.get(*field).map(Value::is_null).unwrap_or(true))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CatalogError::InvalidFieldInputs(format!(
                "creating a {} requires the fields: {}",
                self.kind,
                missing.join(", ")
            )))
        }
    }
}

const OWNED_ASSET_FIELDS: [(&str, Coercion); 2] =
    [("steward", Coercion::User), ("tech_poc", Coercion::User)];

pub static USER: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::User,
    fields: &[
        ("user_id", Coercion::Integer),
        ("name", Coercion::Text),
        ("email", Coercion::Text),
    ],
    id_field: "user_id",
    name_field: Some("email"),
    name_query: Some("email"),
    record_key: "user",
    collection_key: "users",
    segment: "users",
    create_required: &[],
};

pub static DATA_STORE: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::DataStore,
    fields: &[
        ("created_ts", Coercion::Text),
        ("data_store_id", Coercion::Integer),
        ("description_markup", Coercion::Text),
        ("description_raw", Coercion::Text),
        ("details", Coercion::Object),
        ("name", Coercion::Text),
        ("other_type", Coercion::Text),
        OWNED_ASSET_FIELDS[0],
        OWNED_ASSET_FIELDS[1],
        ("type", Coercion::Text),
        ("updated_ts", Coercion::Text),
    ],
    id_field: "data_store_id",
    name_field: Some("name"),
    name_query: Some("name"),
    record_key: "data_store",
    collection_key: "data_stores",
    segment: "data-stores",
    create_required: &["name", "type"],
};

pub static DATA_SCHEMA: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::DataSchema,
    fields: &[
        ("created_ts", Coercion::Text),
        ("data_schema_id", Coercion::Integer),
        ("description_markup", Coercion::Text),
        ("description_raw", Coercion::Text),
        ("name", Coercion::Text),
        ("schema_loc", Coercion::Text),
        OWNED_ASSET_FIELDS[0],
        OWNED_ASSET_FIELDS[1],
        ("type", Coercion::Text),
        ("updated_ts", Coercion::Text),
    ],
    id_field: "data_schema_id",
    name_field: Some("name"),
    name_query: Some("name"),
    record_key: "data_schema",
    collection_key: "data_schemas",
    segment: "schemas",
    create_required: &["name", "type"],
};

pub static DATA_FIELD: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::DataField,
    fields: &[
        ("created_ts", Coercion::Text),
        ("data_format", Coercion::Text),
        ("data_type", Coercion::Text),
        ("description_markup", Coercion::Text),
        ("description_raw", Coercion::Text),
        ("field_id", Coercion::Integer),
        ("full_path_name", Coercion::Text),
        ("name", Coercion::Text),
        ("nullable", Coercion::Boolean),
        ("parent_path", Coercion::Text),
        OWNED_ASSET_FIELDS[0],
        OWNED_ASSET_FIELDS[1],
        ("type", Coercion::Text),
        ("updated_ts", Coercion::Text),
    ],
    id_field: "field_id",
    name_field: Some("full_path_name"),
    name_query: Some("name"),
    record_key: "data_field",
    collection_key: "data_fields",
    segment: "fields",
    create_required: &["name", "type"],
};

pub static FIELD_VALUE: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::FieldValue,
    fields: &[
        ("created_ts", Coercion::Text),
        ("description_markup", Coercion::Text),
        ("description_raw", Coercion::Text),
        ("field_value", Coercion::Text),
        ("field_value_id", Coercion::Integer),
        ("updated_ts", Coercion::Text),
    ],
    id_field: "field_value_id",
    name_field: Some("field_value"),
    name_query: Some("value"),
    record_key: "field_value",
    collection_key: "field_values",
    segment: "values",
    create_required: &["field_value"],
};

pub static TRANSFORMATION: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::Transformation,
    fields: &[
        ("created_ts", Coercion::Text),
        ("description_markup", Coercion::Text),
        ("description_raw", Coercion::Text),
        ("name", Coercion::Text),
        OWNED_ASSET_FIELDS[0],
        OWNED_ASSET_FIELDS[1],
        ("transformation_id", Coercion::Integer),
        ("type", Coercion::Text),
        ("updated_ts", Coercion::Text),
    ],
    id_field: "transformation_id",
    name_field: Some("name"),
    name_query: Some("name"),
    record_key: "transformation",
    collection_key: "transformations",
    segment: "transformations",
    create_required: &["name", "type"],
};

pub static TRANSFORMATION_LINK: EntityDescriptor = EntityDescriptor {
    kind: EntityKind::TransformationLink,
    fields: &[
        ("created_ts", Coercion::Text),
        ("source_data_store_id", Coercion::Integer),
        ("source_data_store_name", Coercion::Text),
        ("source_schema_id", Coercion::Integer),
        ("source_schema_name", Coercion::Text),
        ("source_field_id", Coercion::Integer),
        ("source_field_name", Coercion::Text),
        ("target_data_store_id", Coercion::Integer),
        ("target_data_store_name", Coercion::Text),
        ("target_schema_id", Coercion::Integer),
        ("target_schema_name", Coercion::Text),
        ("target_field_id", Coercion::Integer),
        ("target_field_name", Coercion::Text),
        ("transformation_link_id", Coercion::Integer),
        ("updated_ts", Coercion::Text),
    ],
    id_field: "transformation_link_id",
    name_field: None,
    name_query: None,
    record_key: "transformation_link",
    collection_key: "transformation_links",
    segment: "links",
    create_required: &["source_field_id", "target_field_id"],
};

pub static ALL_DESCRIPTORS: [&EntityDescriptor; 7] = [
    &USER,
    &DATA_STORE,
    &DATA_SCHEMA,
    &DATA_FIELD,
    &FIELD_VALUE,
    &TRANSFORMATION,
    &TRANSFORMATION_LINK,
];

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_id_field_is_always_a_field() {
        for descriptor in ALL_DESCRIPTORS {
            assert_eq!(
                descriptor.coercion(descriptor.id_field),
                Some(Coercion::Integer),
                "{} id field",
                descriptor.kind
            );
            if let Some(name_field) = descriptor.name_field {
                assert!(descriptor.coercion(name_field).is_some());
            }
            assert!(std::ptr::eq(descriptor.kind.descriptor(), descriptor));
        }
    }

    #[test]
    fn test_is_complete() {
        let complete = json!({"user_id": 1, "name": "Grant", "email": "grant@example.com"});
        let partial = json!({"name": "Grant"});
        assert!(USER.is_complete(complete.as_object().unwrap()));
        assert!(!USER.is_complete(partial.as_object().unwrap()));
    }

    #[test]
    fn test_coercions() {
        assert_eq!(Coercion::Integer.apply("id", &json!("42")).unwrap(), json!(42));
        assert_eq!(Coercion::Text.apply("name", &json!(7)).unwrap(), json!("7"));
        assert_eq!(Coercion::Boolean.apply("nullable", &json!("TRUE")).unwrap(), json!(true));
        assert!(Coercion::Object.apply("details", &json!([1, 2])).is_err());
        assert!(Coercion::Integer.apply("id", &json!(1.5)).is_err());
        assert!(Coercion::User.apply("steward", &json!("grant")).is_err());
    }

    #[test]
    fn test_validate_creation() {
        let ok = json!({"name": "orders", "type": "kafka"});
        let missing = json!({"name": "orders", "type": null});
        assert!(DATA_STORE.validate_creation(ok.as_object().unwrap()).is_ok());
        let err = DATA_STORE
            .validate_creation(missing.as_object().unwrap())
            .unwrap_err();
        assert!(matches!(err, CatalogError::InvalidFieldInputs(msg) if msg.contains("type")));
    }
}
