//! Transformations and the reconciliation of their link sets
//!
//! `create_links` appends: links are created when absent and left alone when
//! present. `set_links_state` replaces: the service deprecates every current
//! link not named in the request. In both cases the service computes the
//! difference and answers with the resulting `updated_links`, which are merged
//! into the local cache.

use std::cell::OnceCell;
use std::rc::Rc;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::info;

use super::links::{normalize_links, LinkInput};
use super::tags::{Tagged, Tags};
use super::{changes, TransformationLink};
use crate::endpoints::Parent;
use crate::entity::descriptor::TRANSFORMATION;
use crate::entity::{
    AsEntityId, CatalogEntity, Children, EntityCore, EntityDescriptor, EntityInput, Record,
    ResolveOptions,
};
use crate::error::Result;

/// A named process mapping source fields onto target fields
#[derive(Debug)]
pub struct Transformation {
    core: EntityCore,
    links: OnceCell<Children<TransformationLink>>,
    tags: Tags,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TransformationUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub transformation_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub steward: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tech_poc: Option<i64>,
}

impl CatalogEntity for Transformation {
    fn descriptor() -> &'static EntityDescriptor {
        &TRANSFORMATION
    }

    fn from_core(core: EntityCore) -> Self {
        Self {
            core,
            links: OnceCell::new(),
            tags: Tags::default(),
        }
    }

    fn core(&self) -> &EntityCore {
        &self.core
    }
}

impl Tagged for Transformation {
    fn tag_cache(&self) -> &Tags {
        &self.tags
    }
}

impl Transformation {
    pub fn links(&self) -> Result<&Children<TransformationLink>> {
        let transformation_id = self.core.require_id()?;
        Ok(self.links.get_or_init(|| {
            Children::new(
                Parent::Transformation { transformation_id },
                self.core.session().clone(),
            )
        }))
    }

    /// Get a link by id, or get-or-create one from a
    /// `{source_field_id, target_field_id}` map
    pub fn link(&self, input: impl Into<EntityInput>) -> Result<Option<Rc<TransformationLink>>> {
        self.link_with(input, ResolveOptions::default())
    }

    pub fn link_with(
        &self,
        input: impl Into<EntityInput>,
        options: ResolveOptions,
    ) -> Result<Option<Rc<TransformationLink>>> {
        self.links()?.resolve(input, options)
    }

    pub fn get_links(&self, refresh: bool) -> Result<Vec<Rc<TransformationLink>>> {
        self.links()?.all(refresh)
    }

    /// Create the given links if absent; other existing links are untouched
    pub fn create_links(&self, links: impl Into<LinkInput>) -> Result<Vec<Rc<TransformationLink>>> {
        self.apply_links(&links.into(), false)
    }

    /// Make the given links the complete link set of this transformation
    pub fn set_links_state(
        &self,
        links: impl Into<LinkInput>,
    ) -> Result<Vec<Rc<TransformationLink>>> {
        self.apply_links(&links.into(), true)
    }

    fn apply_links(
        &self,
        input: &LinkInput,
        replace_all: bool,
    ) -> Result<Vec<Rc<TransformationLink>>> {
        let specs = normalize_links(input)?;
        let links = self.links()?;
        let query = if replace_all {
            vec![("set_state", "true".to_string())]
        } else {
            Vec::new()
        };

        let response = self.core.session().transport().post(
            &links.path(),
            &json!({ "links": specs }),
            &query,
        )?;
        let updated = response
            .get("updated_links")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let merged = links.merge(updated, replace_all)?;
        if replace_all {
            links.mark_fully_retrieved();
        }
        info!(
            transformation = self.core.id(),
            requested = specs.len(),
            updated = merged.len(),
            replace_all,
            "Reconciled transformation links"
        );
        Ok(merged)
    }

    /// Deprecate links given as ids or entities
    pub fn delete_links<L: AsEntityId>(&self, links: &[L]) -> Result<bool> {
        let ids = links
            .iter()
            .map(|link| link.entity_id())
            .collect::<Result<Vec<_>>>()?;
        self.links()?.delete(ids, "transform_link_ids")
    }

    pub fn update(&self, update: &TransformationUpdate) -> Result<Rc<Record>> {
        self.core.update(changes(update)?)
    }
}
