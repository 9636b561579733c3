//! Transport adapter between the entity layer and the catalog service
//!
//! The entity layer only ever talks to a [`Transport`]; the blocking HTTP
//! implementation lives in [`http`], bulk loading in [`batch`].

pub mod batch;
pub mod http;

pub use batch::{batch_resolve, BatchRequest, BatchResponse};
pub use http::HttpTransport;

use serde_json::Value;
use tracing::debug;

use crate::error::{CatalogError, Result};

/// Query parameters attached to a request
pub type Query<'a> = &'a [(&'a str, String)];

/// Request primitives consumed by the entity layer.
///
/// Every method fails with [`CatalogError::Api`] when the service answers with
/// a status >= 400, except [`Transport::delete`] which degrades to `None`.
pub trait Transport {
    fn get(&self, path: &str, query: Query<'_>) -> Result<Value>;

    /// Status 200 and 201 both count as success
    fn post(&self, path: &str, body: &Value, query: Query<'_>) -> Result<Value>;

    /// Multipart upload of a single file
    fn post_file(&self, path: &str, file_name: &str, content: Vec<u8>) -> Result<Value>;

    /// `None` when the service refused the delete
    fn delete(&self, path: &str, body: Option<&Value>) -> Result<Option<Value>>;

    fn delete_ok(&self, path: &str, body: Option<&Value>) -> Result<bool> {
        Ok(self.delete(path, body)?.is_some())
    }

    /// Fetch every page of a collection, concatenating `result_key` across
    /// pages in server order until `meta.next_page` is null.
    fn get_paginated(&self, path: &str, result_key: &str) -> Result<Vec<Value>> {
        let mut entities = Vec::new();
        let mut page: u64 = 1;

        loop {
            let found = self.get(path, &[("page", page.to_string())])?;
            match found.get(result_key) {
                Some(Value::Array(items)) => entities.extend(items.iter().cloned()),
                Some(Value::Null) | None => {}
                Some(other) => {
                    return Err(CatalogError::InvalidFieldInputs(format!(
                        "expected a list under '{}', found {}",
                        result_key, other
                    )))
                }
            }

            let has_next = found
                .get("meta")
                .and_then(|meta| meta.get("next_page"))
                .map(|next| !next.is_null())
                .unwrap_or(false);
            if !has_next {
                break;
            }
            page += 1;
        }

        debug!(path, result_key, pages = page, count = entities.len(), "Fetched collection");
        Ok(entities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::MockTransport;
    use serde_json::json;

    #[test]
    fn test_paginated_concatenates_pages_in_order() {
        let transport = MockTransport::new();
        transport.push_get(
            "users",
            json!({"users": [{"user_id": 1}], "meta": {"next_page": 2}}),
        );
        transport.push_get(
            "users",
            json!({"users": [{"user_id": 2}, {"user_id": 3}], "meta": {"next_page": null}}),
        );

        let users = transport.get_paginated("users", "users").unwrap();
        let ids: Vec<i64> = users.iter().map(|u| u["user_id"].as_i64().unwrap()).collect();
        assert_eq!(ids, vec![1, 2, 3]);

        let pages: Vec<String> = transport
            .calls()
            .iter()
            .filter_map(|call| call.query_value("page"))
            .collect();
        assert_eq!(pages, vec!["1", "2"]);
    }

    #[test]
    fn test_paginated_stops_without_meta() {
        let transport = MockTransport::new();
        transport.push_get("transformations", json!({"transformations": []}));

        let found = transport
            .get_paginated("transformations", "transformations")
            .unwrap();
        assert!(found.is_empty());
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_delete_ok_degrades() {
        let transport = MockTransport::new();
        transport.push_delete("data-stores/1/schemas", None);
        assert!(!transport.delete_ok("data-stores/1/schemas", None).unwrap());
    }
}
