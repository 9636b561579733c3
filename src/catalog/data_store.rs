use std::cell::OnceCell;
use std::rc::Rc;

use serde::Serialize;
use serde_json::{Map, Value};

use super::tags::{Tagged, Tags};
use super::{changes, DataSchema};
use crate::entity::descriptor::DATA_STORE;
use crate::entity::{
    AsEntityId, CatalogEntity, Children, EntityCore, EntityDescriptor, EntityInput, Record,
    ResolveOptions,
};
use crate::error::Result;
use crate::manifest::ManifestIngestion;

/// A registered data system: a Kafka cluster, a database, a bucket
#[derive(Debug)]
pub struct DataStore {
    core: EntityCore,
    schemas: OnceCell<Children<DataSchema>>,
    tags: Tags,
}

/// Partial update of a data store; unset fields are left untouched
#[derive(Debug, Clone, Default, Serialize)]
pub struct DataStoreUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub store_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Map<String, Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steward: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tech_poc: Option<i64>,
}

impl CatalogEntity for DataStore {
    fn descriptor() -> &'static EntityDescriptor {
        &DATA_STORE
    }

    fn from_core(core: EntityCore) -> Self {
        Self {
            core,
            schemas: OnceCell::new(),
            tags: Tags::default(),
        }
    }

    fn core(&self) -> &EntityCore {
        &self.core
    }
}

impl Tagged for DataStore {
    fn tag_cache(&self) -> &Tags {
        &self.tags
    }
}

impl DataStore {
    /// The schema cache of this data store
    pub fn schemas(&self) -> Result<&Children<DataSchema>> {
        let parent = self.core.child_parent()?;
        Ok(self
            .schemas
            .get_or_init(|| Children::new(parent, self.core.session().clone())))
    }

    /// Get or create a schema by id, name or attributes
    pub fn schema(&self, input: impl Into<EntityInput>) -> Result<Option<Rc<DataSchema>>> {
        self.schema_with(input, ResolveOptions::default())
    }

    pub fn schema_with(
        &self,
        input: impl Into<EntityInput>,
        options: ResolveOptions,
    ) -> Result<Option<Rc<DataSchema>>> {
        self.schemas()?.resolve(input, options)
    }

    pub fn get_schemas(&self, refresh: bool) -> Result<Vec<Rc<DataSchema>>> {
        self.schemas()?.all(refresh)
    }

    /// Deprecate schemas given as ids or entities
    pub fn delete_schemas<S: AsEntityId>(&self, schemas: &[S]) -> Result<bool> {
        let ids = schemas
            .iter()
            .map(|schema| schema.entity_id())
            .collect::<Result<Vec<_>>>()?;
        self.schemas()?.delete(ids, "schema_ids")
    }

    pub fn update(&self, update: &DataStoreUpdate) -> Result<Rc<Record>> {
        self.core.update(changes(update)?)
    }

    /// Manifest ingestion bound to this data store
    pub fn manifest(&self) -> Result<ManifestIngestion> {
        Ok(ManifestIngestion::new(
            self.core.require_id()?,
            self.core.session().clone(),
        ))
    }
}
