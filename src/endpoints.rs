//! Endpoint paths of the catalog service
//!
//! Every path is relative to the configured base URL. Child collections are
//! nested beneath their parent's item path, e.g.
//! `data-stores/3/schemas/12/fields`.

use crate::entity::descriptor::EntityDescriptor;

pub const BATCH_LOAD: &str = "batch-load";
pub const DBT_PARSE_RESULTS: &str = "dbt/parse-results";
pub const DBT_SAVE_RESULTS: &str = "dbt/save-results";

/// Position of a collection in the entity hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parent {
    Root,
    DataStore {
        data_store_id: i64,
    },
    DataSchema {
        data_store_id: i64,
        data_schema_id: i64,
    },
    DataField {
        data_store_id: i64,
        data_schema_id: i64,
        field_id: i64,
    },
    Transformation {
        transformation_id: i64,
    },
}

impl Parent {
    /// Item path of the parent itself; empty at the root
    pub fn path(&self) -> String {
        match self {
            Parent::Root => String::new(),
            Parent::DataStore { data_store_id } => format!("data-stores/{}", data_store_id),
            Parent::DataSchema {
                data_store_id,
                data_schema_id,
            } => format!("data-stores/{}/schemas/{}", data_store_id, data_schema_id),
            Parent::DataField {
                data_store_id,
                data_schema_id,
                field_id,
            } => format!(
                "data-stores/{}/schemas/{}/fields/{}",
                data_store_id, data_schema_id, field_id
            ),
            Parent::Transformation { transformation_id } => {
                format!("transformations/{}", transformation_id)
            }
        }
    }

    pub fn collection_path(&self, segment: &str) -> String {
        match self {
            Parent::Root => segment.to_string(),
            _ => format!("{}/{}", self.path(), segment),
        }
    }

    pub fn item_path(&self, descriptor: &EntityDescriptor, id: i64) -> String {
        format!("{}/{}", self.collection_path(descriptor.segment), id)
    }

    pub fn tags_path(&self, descriptor: &EntityDescriptor, id: i64) -> String {
        format!("{}/tags", self.item_path(descriptor, id))
    }

    /// The parent of the children of the entity with `id` in this collection.
    /// Field values and transformation links have no children.
    pub fn descend(&self, id: i64) -> Option<Parent> {
        Some(match *self {
            Parent::Root => Parent::DataStore { data_store_id: id },
            Parent::DataStore { data_store_id } => Parent::DataSchema {
                data_store_id,
                data_schema_id: id,
            },
            Parent::DataSchema {
                data_store_id,
                data_schema_id,
            } => Parent::DataField {
                data_store_id,
                data_schema_id,
                field_id: id,
            },
            Parent::DataField { .. } | Parent::Transformation { .. } => return None,
        })
    }
}

pub fn check_breaking_change(transformation_id: i64) -> String {
    format!("transformations/{}/check-breaking-change", transformation_id)
}

pub fn parse_manifest(data_store_id: i64) -> String {
    format!("data-stores/{}/dbt/parse-manifest", data_store_id)
}
