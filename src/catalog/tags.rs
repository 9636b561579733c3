//! Tags on data stores, schemas, fields and transformations

use std::cell::RefCell;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::entity::{CatalogEntity, EntityCore};
use crate::error::Result;

/// Per-tag outcome reported by the service
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagResponse {
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub tag_statuses: Vec<String>,
}

impl TagResponse {
    /// Tags whose status is `added` or `exists`
    pub fn accepted(&self) -> Vec<String> {
        self.tags
            .iter()
            .zip(&self.tag_statuses)
            .filter(|(_, status)| matches!(status.as_str(), "added" | "exists"))
            .map(|(tag, _)| tag.clone())
            .collect()
    }
}

/// Tags known to be attached to one entity
#[derive(Debug, Default)]
pub struct Tags {
    known: RefCell<Vec<String>>,
}

impl Tags {
    pub fn known(&self) -> Vec<String> {
        self.known.borrow().clone()
    }

    fn add(&self, core: &EntityCore, tags: &[&str]) -> Result<Option<TagResponse>> {
        let mut to_add: Vec<String> = Vec::new();
        {
            let known = self.known.borrow();
            for tag in tags {
                if !known.iter().any(|k| k == tag) && !to_add.iter().any(|t| t == tag) {
                    to_add.push(tag.to_string());
                }
            }
        }
        if to_add.is_empty() {
            return Ok(None);
        }

        let path = core.tags_path()?;
        let response = core
            .session()
            .transport()
            .post(&path, &json!({ "tags": to_add }), &[])?;
        let response: TagResponse = serde_json::from_value(response)?;
        let accepted = response.accepted();
        info!(kind = %core.kind(), path = %path, accepted = accepted.len(), "Added tags");

        let mut known = self.known.borrow_mut();
        for tag in accepted {
            if !known.contains(&tag) {
                known.push(tag);
            }
        }
        Ok(Some(response))
    }

    fn remove(&self, core: &EntityCore, tags: &[&str]) -> Result<Vec<String>> {
        let path = core.tags_path()?;
        let response = core
            .session()
            .transport()
            .delete(&path, Some(&json!({ "tags": tags })))?;

        let removed: Vec<String> = match response {
            Some(response) => response
                .get("tags_removed")
                .and_then(Value::as_array)
                .map(|removed| {
                    removed
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default(),
            None => {
                warn!(kind = %core.kind(), path = %path, "Tag removal was not accepted");
                Vec::new()
            }
        };

        self.known.borrow_mut().retain(|tag| !removed.contains(tag));
        Ok(removed)
    }
}

/// Entities that carry tags
pub trait Tagged: CatalogEntity {
    fn tag_cache(&self) -> &Tags;

    /// Tags added through this handle
    fn tags(&self) -> Vec<String> {
        self.tag_cache().known()
    }

    /// Adds the tags not already known locally; `None` when nothing was sent
    fn add_tags(&self, tags: &[&str]) -> Result<Option<TagResponse>> {
        self.tag_cache().add(self.core(), tags)
    }

    /// The tags the service reports as removed; empty when refused
    fn remove_tags(&self, tags: &[&str]) -> Result<Vec<String>> {
        self.tag_cache().remove(self.core(), tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataStore;
    use crate::endpoints::Parent;
    use crate::testutils::MockTransport;

    fn store(session: &crate::session::Session) -> DataStore {
        let raw = json!({
            "created_ts": null, "data_store_id": 2, "description_markup": null,
            "description_raw": null, "details": null, "name": "Warehouse",
            "other_type": null, "steward": null, "tech_poc": null,
            "type": "postgres", "updated_ts": null,
        });
        DataStore::construct(
            raw.as_object().unwrap().clone().into(),
            Parent::Root,
            session,
        )
        .unwrap()
    }

    #[test]
    fn test_only_accepted_tags_are_recorded() {
        let (transport, session) = MockTransport::session();
        let store = store(&session);
        transport.push_post(
            "data-stores/2/tags",
            json!({"tags": ["pii", "gold", "bad"], "tag_statuses": ["added", "exists", "error"]}),
        );

        let response = store.add_tags(&["pii", "gold", "bad"]).unwrap().unwrap();
        assert_eq!(response.accepted(), vec!["pii", "gold"]);
        assert_eq!(store.tags(), vec!["pii", "gold"]);

        // known tags are not sent again
        assert!(store.add_tags(&["pii"]).unwrap().is_none());
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_remove_tags_degrades_to_empty() {
        let (transport, session) = MockTransport::session();
        let store = store(&session);
        transport.push_post(
            "data-stores/2/tags",
            json!({"tags": ["pii"], "tag_statuses": ["added"]}),
        );
        store.add_tags(&["pii"]).unwrap();

        transport.push_delete("data-stores/2/tags", None);
        assert!(store.remove_tags(&["pii"]).unwrap().is_empty());
        assert_eq!(store.tags(), vec!["pii"]);

        transport.push_delete("data-stores/2/tags", Some(json!({"tags_removed": ["pii"]})));
        assert_eq!(store.remove_tags(&["pii"]).unwrap(), vec!["pii"]);
        assert!(store.tags().is_empty());
    }
}
