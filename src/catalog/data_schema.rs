use std::cell::OnceCell;
use std::rc::Rc;

use serde::Serialize;

use super::tags::{Tagged, Tags};
use super::{changes, DataField};
use crate::endpoints::Parent;
use crate::entity::descriptor::DATA_SCHEMA;
use crate::entity::{
    AsEntityId, CatalogEntity, Children, EntityCore, EntityDescriptor, EntityInput, Record,
    ResolveOptions,
};
use crate::error::Result;

/// A named structure inside a data store, such as a table or a topic
#[derive(Debug)]
pub struct DataSchema {
    core: EntityCore,
    fields: OnceCell<Children<DataField>>,
    tags: Tags,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DataSchemaUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_loc: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steward: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tech_poc: Option<i64>,
}

impl CatalogEntity for DataSchema {
    fn descriptor() -> &'static EntityDescriptor {
        &DATA_SCHEMA
    }

    fn from_core(core: EntityCore) -> Self {
        Self {
            core,
            fields: OnceCell::new(),
            tags: Tags::default(),
        }
    }

    fn core(&self) -> &EntityCore {
        &self.core
    }
}

impl Tagged for DataSchema {
    fn tag_cache(&self) -> &Tags {
        &self.tags
    }
}

impl DataSchema {
    pub fn data_store_id(&self) -> Option<i64> {
        match self.core.parent() {
            Parent::DataStore { data_store_id } => Some(data_store_id),
            _ => None,
        }
    }

    pub fn fields(&self) -> Result<&Children<DataField>> {
        let parent = self.core.child_parent()?;
        Ok(self
            .fields
            .get_or_init(|| Children::new(parent, self.core.session().clone())))
    }

    /// Get or create a field by id, full path name or attributes
    pub fn field(&self, input: impl Into<EntityInput>) -> Result<Option<Rc<DataField>>> {
        self.field_with(input, ResolveOptions::default())
    }

    pub fn field_with(
        &self,
        input: impl Into<EntityInput>,
        options: ResolveOptions,
    ) -> Result<Option<Rc<DataField>>> {
        self.fields()?.resolve(input, options)
    }

    pub fn get_fields(&self, refresh: bool) -> Result<Vec<Rc<DataField>>> {
        self.fields()?.all(refresh)
    }

    pub fn delete_fields<F: AsEntityId>(&self, fields: &[F]) -> Result<bool> {
        let ids = fields
            .iter()
            .map(|field| field.entity_id())
            .collect::<Result<Vec<_>>>()?;
        self.fields()?.delete(ids, "field_ids")
    }

    pub fn update(&self, update: &DataSchemaUpdate) -> Result<Rc<Record>> {
        self.core.update(changes(update)?)
    }
}
