//! Bulk loading of data stores, schemas and fields by id

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::Transport;
use crate::endpoints;
use crate::error::Result;

/// Ids to load in one bulk request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub field_ids: Vec<i64>,
    #[serde(default)]
    pub schema_ids: Vec<i64>,
    #[serde(default)]
    pub data_store_ids: Vec<i64>,
}

impl BatchRequest {
    pub fn fields(field_ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            field_ids: field_ids.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.field_ids.is_empty() && self.schema_ids.is_empty() && self.data_store_ids.is_empty()
    }

    fn page(&self, page: usize, batch_size: usize) -> Self {
        fn slice(ids: &[i64], page: usize, batch_size: usize) -> Vec<i64> {
            ids.iter().skip(page * batch_size).take(batch_size).copied().collect()
        }
        Self {
            field_ids: slice(&self.field_ids, page, batch_size),
            schema_ids: slice(&self.schema_ids, page, batch_size),
            data_store_ids: slice(&self.data_store_ids, page, batch_size),
        }
    }

    fn is_full(&self, batch_size: usize) -> bool {
        self.field_ids.len() == batch_size
            || self.schema_ids.len() == batch_size
            || self.data_store_ids.len() == batch_size
    }
}

/// Raw records returned by the bulk-load endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchResponse {
    #[serde(default)]
    pub data_stores: Vec<Value>,
    #[serde(default)]
    pub data_schemas: Vec<Value>,
    #[serde(default)]
    pub data_fields: Vec<Value>,
}

impl BatchResponse {
    fn extend(&mut self, other: BatchResponse) {
        self.data_stores.extend(other.data_stores);
        self.data_schemas.extend(other.data_schemas);
        self.data_fields.extend(other.data_fields);
    }
}

/// Post `request` in pages of at most `batch_size` ids per list, requesting
/// the next page only while the previous one was full.
pub fn batch_resolve(
    transport: &dyn Transport,
    request: &BatchRequest,
    batch_size: usize,
) -> Result<BatchResponse> {
    let batch_size = batch_size.max(1);
    let mut combined = BatchResponse::default();
    let mut page = 0;

    loop {
        let chunk = request.page(page, batch_size);
        if chunk.is_empty() {
            break;
        }

        debug!(
            page,
            fields = chunk.field_ids.len(),
            schemas = chunk.schema_ids.len(),
            data_stores = chunk.data_store_ids.len(),
            "Batch loading"
        );
        let body = serde_json::to_value(&chunk)?;
        let response = transport.post(endpoints::BATCH_LOAD, &body, &[])?;
        if !response.is_null() {
            combined.extend(serde_json::from_value(response)?);
        }

        if !chunk.is_full(batch_size) {
            break;
        }
        page += 1;
    }

    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::MockTransport;
    use serde_json::json;

    #[test]
    fn test_pages_never_exceed_batch_size() {
        let transport = MockTransport::new();
        transport.route_post(endpoints::BATCH_LOAD, json!({"data_fields": [{"field_id": 1}]}));

        let request = BatchRequest::fields(1..=5);
        let response = batch_resolve(&transport, &request, 2).unwrap();

        let bodies: Vec<Value> = transport
            .calls()
            .into_iter()
            .filter_map(|call| call.body)
            .collect();
        assert_eq!(bodies.len(), 3);
        assert_eq!(bodies[0]["field_ids"], json!([1, 2]));
        assert_eq!(bodies[1]["field_ids"], json!([3, 4]));
        assert_eq!(bodies[2]["field_ids"], json!([5]));
        assert_eq!(response.data_fields.len(), 3);
    }

    #[test]
    fn test_exact_multiple_requests_trailing_empty_page_is_skipped() {
        let transport = MockTransport::new();
        transport.route_post(endpoints::BATCH_LOAD, json!({}));

        let request = BatchRequest::fields(1..=4);
        batch_resolve(&transport, &request, 2).unwrap();
        assert_eq!(transport.calls().len(), 2);
    }

    #[test]
    fn test_empty_request_sends_nothing() {
        let transport = MockTransport::new();
        let response = batch_resolve(&transport, &BatchRequest::default(), 100).unwrap();
        assert!(response.data_fields.is_empty());
        assert!(transport.calls().is_empty());
    }
}
