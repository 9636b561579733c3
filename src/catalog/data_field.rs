use std::cell::OnceCell;
use std::rc::Rc;

use serde::Serialize;
use serde_json::{Map, Value};

use super::tags::{Tagged, Tags};
use super::{changes, FieldValue};
use crate::endpoints::Parent;
use crate::entity::descriptor::DATA_FIELD;
use crate::entity::{
    CatalogEntity, Children, EntityCore, EntityDescriptor, EntityInput, Record, ResolveOptions,
};
use crate::error::{CatalogError, Result};

const FIELD_TYPES: [&str; 3] = ["scalar", "list", "object"];

/// Native type shorthands: (shorthand, field type, data type)
const TYPE_SHORTHANDS: [(&str, &str, &str); 7] = [
    ("str", "scalar", "string"),
    ("int", "scalar", "number"),
    ("float", "scalar", "number"),
    ("bool", "scalar", "boolean"),
    ("bytes", "scalar", "bytes"),
    ("list", "list", "array"),
    ("dict", "object", "object"),
];

/// A single attribute of a data schema
#[derive(Debug)]
pub struct DataField {
    core: EntityCore,
    field_values: OnceCell<Children<FieldValue>>,
    tags: Tags,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DataFieldUpdate {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub field_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steward: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tech_poc: Option<i64>,
}

/// Normalize the type information of a field creation payload.
///
/// `type` must be a field type (`scalar`, `list`, `object`) or a native type
/// shorthand such as `int`, which also supplies defaults for `data_type` and
/// `data_format`. A missing `data_format` becomes `unknown`.
pub fn clean_field_inputs(mut inputs: Map<String, Value>) -> Result<Map<String, Value>> {
    let given = inputs.get("type").and_then(Value::as_str).map(str::to_string);
    let shorthand = given
        .as_deref()
        .and_then(|t| TYPE_SHORTHANDS.iter().find(|(name, _, _)| *name == t));

    match (given.as_deref(), shorthand) {
        // "list" is both a field type and a shorthand; the shorthand adds defaults
        (_, Some((name, field_type, data_type))) => {
            inputs.insert("type".into(), Value::from(*field_type));
            if inputs.get("data_type").map(Value::is_null).unwrap_or(true) {
                inputs.insert("data_type".into(), Value::from(*data_type));
            }
            if inputs.get("data_format").map(Value::is_null).unwrap_or(true) {
                inputs.insert("data_format".into(), Value::from(*name));
            }
        }
        (Some(t), None) if FIELD_TYPES.contains(&t) => {}
        _ => {
            return Err(CatalogError::InvalidFieldInputs(format!(
                "field type must be one of {:?} or a native type shorthand {:?}, got {}",
                FIELD_TYPES,
                TYPE_SHORTHANDS.iter().map(|(name, _, _)| *name).collect::<Vec<_>>(),
                inputs.get("type").cloned().unwrap_or(Value::Null)
            )))
        }
    }

    if !inputs.get("data_format").map(Value::is_string).unwrap_or(false) {
        inputs.insert("data_format".into(), Value::from("unknown"));
    }
    Ok(inputs)
}

impl CatalogEntity for DataField {
    fn descriptor() -> &'static EntityDescriptor {
        &DATA_FIELD
    }

    fn from_core(core: EntityCore) -> Self {
        Self {
            core,
            field_values: OnceCell::new(),
            tags: Tags::default(),
        }
    }

    fn core(&self) -> &EntityCore {
        &self.core
    }

    fn prepare_creation(attributes: Map<String, Value>) -> Result<Map<String, Value>> {
        clean_field_inputs(attributes)
    }
}

impl Tagged for DataField {
    fn tag_cache(&self) -> &Tags {
        &self.tags
    }
}

impl DataField {
    pub fn data_store_id(&self) -> Option<i64> {
        match self.core.parent() {
            Parent::DataSchema { data_store_id, .. } => Some(data_store_id),
            _ => None,
        }
    }

    pub fn data_schema_id(&self) -> Option<i64> {
        match self.core.parent() {
            Parent::DataSchema { data_schema_id, .. } => Some(data_schema_id),
            _ => None,
        }
    }

    pub fn field_values(&self) -> Result<&Children<FieldValue>> {
        let parent = self.core.child_parent()?;
        Ok(self
            .field_values
            .get_or_init(|| Children::new(parent, self.core.session().clone())))
    }

    /// Get or create a sample value by id, value or attributes
    pub fn field_value(&self, input: impl Into<EntityInput>) -> Result<Option<Rc<FieldValue>>> {
        self.field_value_with(input, ResolveOptions::default())
    }

    pub fn field_value_with(
        &self,
        input: impl Into<EntityInput>,
        options: ResolveOptions,
    ) -> Result<Option<Rc<FieldValue>>> {
        self.field_values()?.resolve(input, options)
    }

    pub fn get_field_values(&self, refresh: bool) -> Result<Vec<Rc<FieldValue>>> {
        self.field_values()?.all(refresh)
    }

    pub fn update(&self, update: &DataFieldUpdate) -> Result<Rc<Record>> {
        self.core.update(changes(update)?)
    }
}
