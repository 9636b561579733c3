//! The catalog root and its entity kinds
//!
//! A [`Catalog`] owns the top-level caches (users, data stores and
//! transformations). Every other cache hangs off its parent entity, so a
//! schema is looked up through its data store and a field through its schema.

pub mod data_field;
pub mod data_schema;
pub mod data_store;
pub mod field_value;
pub mod links;
pub mod tags;
pub mod transformation;
pub mod transformation_link;
pub mod user;

pub use data_field::{clean_field_inputs, DataField, DataFieldUpdate};
pub use data_schema::{DataSchema, DataSchemaUpdate};
pub use data_store::{DataStore, DataStoreUpdate};
pub use field_value::{FieldValue, FieldValueUpdate};
pub use links::{normalize_links, LinkInput, LinkItem, LinkSpec};
pub use tags::{TagResponse, Tagged, Tags};
pub use transformation::{Transformation, TransformationUpdate};
pub use transformation_link::{LinkEndpoint, TransformationLink};
pub use user::User;

use std::collections::BTreeMap;
use std::rc::Rc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info, warn};

use crate::config::CatalogConfig;
use crate::endpoints::{self, Parent};
use crate::entity::{AsEntityId, Children, EntityInput, ResolveOptions};
use crate::error::{CatalogError, Result};
use crate::lineage::LineageImpact;
use crate::session::Session;
use crate::transport::{batch_resolve, BatchRequest};

/// Serialize a partial update, dropping unset fields
pub(crate) fn changes<U: Serialize>(update: &U) -> Result<Map<String, Value>> {
    match serde_json::to_value(update)? {
        Value::Object(map) => Ok(map),
        other => Err(CatalogError::InvalidInputs(format!(
            "an update must serialize to a map, got {}",
            other
        ))),
    }
}

/// Records merged by [`Catalog::batch_load_by_id`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchLoadSummary {
    pub data_stores: usize,
    pub data_schemas: usize,
    pub data_fields: usize,
    pub skipped: usize,
}

/// Entry point to the catalog
#[derive(Debug)]
pub struct Catalog {
    session: Session,
    users: Children<User>,
    data_stores: Children<DataStore>,
    transformations: Children<Transformation>,
}

impl Catalog {
    pub fn new(session: Session) -> Self {
        Self {
            users: Children::new(Parent::Root, session.clone()),
            data_stores: Children::new(Parent::Root, session.clone()),
            transformations: Children::new(Parent::Root, session.clone()),
            session,
        }
    }

    /// Connect with credentials and resolution defaults from configuration
    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        Ok(Self::new(Session::from_config(config)?))
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn users(&self) -> &Children<User> {
        &self.users
    }

    pub fn data_stores(&self) -> &Children<DataStore> {
        &self.data_stores
    }

    pub fn transformations(&self) -> &Children<Transformation> {
        &self.transformations
    }

    /// Look up a user by id or email
    pub fn user(&self, input: impl Into<EntityInput>) -> Result<Option<Rc<User>>> {
        self.user_with(input, ResolveOptions::default())
    }

    pub fn user_with(
        &self,
        input: impl Into<EntityInput>,
        options: ResolveOptions,
    ) -> Result<Option<Rc<User>>> {
        self.users.resolve(input, options)
    }

    pub fn get_users(&self, refresh: bool) -> Result<Vec<Rc<User>>> {
        self.users.all(refresh)
    }

    /// Get or create a data store by id, name or attributes
    pub fn data_store(&self, input: impl Into<EntityInput>) -> Result<Option<Rc<DataStore>>> {
        self.data_store_with(input, ResolveOptions::default())
    }

    pub fn data_store_with(
        &self,
        input: impl Into<EntityInput>,
        options: ResolveOptions,
    ) -> Result<Option<Rc<DataStore>>> {
        self.data_stores.resolve(input, options)
    }

    pub fn get_data_stores(&self, refresh: bool) -> Result<Vec<Rc<DataStore>>> {
        self.data_stores.all(refresh)
    }

    /// Get or create a transformation by id, name or attributes
    pub fn transformation(
        &self,
        input: impl Into<EntityInput>,
    ) -> Result<Option<Rc<Transformation>>> {
        self.transformation_with(input, ResolveOptions::default())
    }

    pub fn transformation_with(
        &self,
        input: impl Into<EntityInput>,
        options: ResolveOptions,
    ) -> Result<Option<Rc<Transformation>>> {
        self.transformations.resolve(input, options)
    }

    pub fn get_transformations(&self, refresh: bool) -> Result<Vec<Rc<Transformation>>> {
        self.transformations.all(refresh)
    }

    /// Bulk-load data stores, schemas and fields by id into their caches.
    ///
    /// Parents missing from the response are resolved by id; records whose
    /// parent cannot be obtained are skipped.
    pub fn batch_load_by_id(&self, request: &BatchRequest) -> Result<BatchLoadSummary> {
        let mut summary = BatchLoadSummary::default();
        if request.is_empty() {
            return Ok(summary);
        }
        let response = batch_resolve(
            self.session.transport(),
            request,
            self.session.batch_size(),
        )?;
        let cached = ResolveOptions::default().pre_fetch(false);

        summary.data_stores = self.data_stores.merge(response.data_stores, false)?.len();

        for (data_store_id, schemas) in group_by(response.data_schemas, &["data_store_id"]) {
            let count = schemas.len();
            match self.data_store_with(data_store_id[0], cached)? {
                Some(store) => summary.data_schemas += store.schemas()?.merge(schemas, false)?.len(),
                None => {
                    warn!(data_store_id = data_store_id[0], count, "Skipping schemas of unknown data store");
                    summary.skipped += count;
                }
            }
        }

        let field_parents = ["data_store_id", "data_schema_id"];
        for (parent_ids, fields) in group_by(response.data_fields, &field_parents) {
            let count = fields.len();
            let schema = match self.data_store_with(parent_ids[0], cached)? {
                Some(store) => store.schema_with(parent_ids[1], cached)?,
                None => None,
            };
            match schema {
                Some(schema) => summary.data_fields += schema.fields()?.merge(fields, false)?.len(),
                None => {
                    warn!(
                        data_store_id = parent_ids[0],
                        data_schema_id = parent_ids[1],
                        count,
                        "Skipping fields of unknown schema"
                    );
                    summary.skipped += count;
                }
            }
        }

        debug!(?summary, "Batch load complete");
        Ok(summary)
    }

    /// Ask the service which lineage would break if `transformation` had
    /// exactly `links`, and resolve every impacted asset
    pub fn check_breaking_change(
        &self,
        transformation: impl AsEntityId,
        links: impl Into<LinkInput>,
    ) -> Result<LineageImpact> {
        let specs = normalize_links(&links.into())?;
        let transformation_id = transformation.entity_id()?;
        let response = self.session.transport().post(
            &endpoints::check_breaking_change(transformation_id),
            &json!({ "links": specs }),
            &[],
        )?;

        let mut impact = LineageImpact::from_value(&response)?;
        info!(
            transformation_id,
            breaking = impact.breaking(),
            impacted = impact.impacted_assets().len(),
            "Checked breaking change"
        );
        impact.resolve(self)?;
        Ok(impact)
    }
}

/// Group raw records by the integer values of `keys`, in key order. Records
/// missing any key are dropped.
fn group_by(records: Vec<Value>, keys: &[&str]) -> BTreeMap<Vec<i64>, Vec<Value>> {
    let mut groups: BTreeMap<Vec<i64>, Vec<Value>> = BTreeMap::new();
    for record in records {
        let ids: Option<Vec<i64>> = keys
            .iter()
            .map(|key| record.get(*key).and_then(Value::as_i64))
            .collect();
        match ids {
            Some(ids) => groups.entry(ids).or_default().push(record),
            None => warn!(keys = ?keys, "Bulk-loaded record without parent ids"),
        }
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::CatalogEntity;
    use crate::lineage::ShowBy;
    use crate::testutils::{Method, MockTransport};

    fn store(id: i64, name: &str) -> Value {
        json!({
            "created_ts": null, "data_store_id": id, "description_markup": null,
            "description_raw": null, "details": {}, "name": name, "other_type": null,
            "steward": null, "tech_poc": null, "type": "postgres", "updated_ts": null,
        })
    }

    fn schema(store_id: i64, id: i64) -> Value {
        json!({
            "created_ts": null, "data_schema_id": id, "data_store_id": store_id,
            "description_markup": null, "description_raw": null,
            "name": format!("schema_{}", id), "schema_loc": null, "steward": null,
            "tech_poc": null, "type": "table", "updated_ts": null,
        })
    }

    fn field(store_id: i64, schema_id: i64, id: i64) -> Value {
        json!({
            "created_ts": null, "data_format": "int", "data_schema_id": schema_id,
            "data_store_id": store_id, "data_type": "number", "description_markup": null,
            "description_raw": null, "field_id": id, "full_path_name": format!("f{}", id),
            "name": format!("f{}", id), "nullable": true, "parent_path": null,
            "steward": null, "tech_poc": null, "type": "scalar", "updated_ts": null,
        })
    }

    #[test]
    fn test_batch_load_fills_nested_caches() {
        let (transport, session) = MockTransport::session();
        transport.push_post(
            endpoints::BATCH_LOAD,
            json!({
                "data_stores": [store(1, "Warehouse")],
                "data_schemas": [schema(1, 10), schema(1, 11)],
                "data_fields": [field(1, 10, 100), field(1, 11, 101), field(2, 20, 200)],
            }),
        );
        let catalog = Catalog::new(session);

        let summary = catalog
            .batch_load_by_id(&BatchRequest::fields([100, 101, 200]))
            .unwrap();
        assert_eq!(
            summary,
            BatchLoadSummary { data_stores: 1, data_schemas: 2, data_fields: 2, skipped: 1 }
        );

        // served from the caches
        let cached = ResolveOptions::default().pre_fetch(false);
        let store = catalog.data_store_with(1_i64, cached).unwrap().unwrap();
        let schema = store.schema_with(11_i64, cached).unwrap().unwrap();
        let field = schema.field_with("F101", cached).unwrap().unwrap();
        assert_eq!(field.id(), Some(101));
        assert_eq!(field.data_schema_id(), Some(11));

        // one bulk call and one failed lookup of data store 2
        assert_eq!(transport.count(Method::Post, endpoints::BATCH_LOAD), 1);
        assert_eq!(transport.count(Method::Get, "data-stores/2"), 1);
        assert_eq!(transport.calls().len(), 2);
    }

    #[test]
    fn test_check_breaking_change_resolves_with_one_bulk_load() {
        let (transport, session) = MockTransport::session();
        transport.push_post(
            "transformations/5/check-breaking-change",
            json!({
                "breaking": true,
                "impact_summary": {"data_stores": 1, "schemas": 2, "fields": 3},
                "impacted_assets": [
                    {"data_store_id": 1, "schema_id": 10, "field_id": 101,
                     "impact_chain": [{"data_store_id": 1, "schema_id": 10, "field_id": 100}]},
                    {"data_store_id": 1, "schema_id": 11, "field_id": 102,
                     "impact_chain": [
                         {"data_store_id": 1, "schema_id": 10, "field_id": 100},
                         {"data_store_id": 1, "schema_id": 10, "field_id": 101},
                     ]},
                ],
            }),
        );
        transport.push_post(
            endpoints::BATCH_LOAD,
            json!({
                "data_stores": [store(1, "Warehouse")],
                "data_schemas": [schema(1, 10), schema(1, 11)],
                "data_fields": [field(1, 10, 100), field(1, 10, 101), field(1, 11, 102)],
            }),
        );
        let catalog = Catalog::new(session);

        let impact = catalog
            .check_breaking_change(5_i64, LinkSpec::new(100, 101))
            .unwrap();
        assert!(impact.breaking());

        let calls = transport.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(
            calls[0].body,
            Some(json!({"links": [{"source_field_id": 100, "target_field_id": 101}]}))
        );
        assert_eq!(
            calls[1].body.as_ref().unwrap()["field_ids"],
            json!([100, 101, 102])
        );

        let report = impact.all_impact_strings(ShowBy::Field, 25);
        assert!(report.contains(concat!(
            "Data Store: Warehouse (1), Schema: schema_10 (10), Field: f100 (100)\n",
            "    └-->Data Store: Warehouse (1), Schema: schema_10 (10), Field: f101 (101)\n",
            "        └-->Data Store: Warehouse (1), Schema: schema_11 (11), Field: f102 (102)",
        )));
        assert!(impact.impacted_assets().iter().all(|asset| asset.is_processed()));
    }

    #[test]
    fn test_changes_skip_unset_fields() {
        let update = DataStoreUpdate {
            description: Some("new".into()),
            store_type: Some("kafka".into()),
            ..Default::default()
        };
        assert_eq!(
            Value::Object(changes(&update).unwrap()),
            json!({"description": "new", "type": "kafka"})
        );
    }
}
