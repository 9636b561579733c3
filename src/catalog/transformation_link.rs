use crate::entity::descriptor::TRANSFORMATION_LINK;
use crate::entity::{CatalogEntity, EntityCore, EntityDescriptor, Record};
use crate::error::Result;

/// One directed source -> target field mapping of a transformation
#[derive(Debug)]
pub struct TransformationLink {
    core: EntityCore,
}

/// Location of one end of a link, as denormalized on the link record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkEndpoint {
    pub data_store_id: Option<i64>,
    pub data_store_name: Option<String>,
    pub schema_id: Option<i64>,
    pub schema_name: Option<String>,
    pub field_id: Option<i64>,
    pub field_name: Option<String>,
}

impl LinkEndpoint {
    fn read(record: &Record, side: &str) -> Self {
        let int = |field: &str| record.i64_field(&format!("{}_{}", side, field));
        let text = |field: &str| {
            record
                .str_field(&format!("{}_{}", side, field))
                .map(str::to_string)
        };
        Self {
            data_store_id: int("data_store_id"),
            data_store_name: text("data_store_name"),
            schema_id: int("schema_id"),
            schema_name: text("schema_name"),
            field_id: int("field_id"),
            field_name: text("field_name"),
        }
    }
}

impl CatalogEntity for TransformationLink {
    fn descriptor() -> &'static EntityDescriptor {
        &TRANSFORMATION_LINK
    }

    fn from_core(core: EntityCore) -> Self {
        Self { core }
    }

    fn core(&self) -> &EntityCore {
        &self.core
    }
}

impl TransformationLink {
    pub fn source(&self) -> Result<LinkEndpoint> {
        let record = self.record()?;
        Ok(LinkEndpoint::read(&record, "source"))
    }

    pub fn target(&self) -> Result<LinkEndpoint> {
        let record = self.record()?;
        Ok(LinkEndpoint::read(&record, "target"))
    }

    /// `(source_field_id, target_field_id)`
    pub fn field_ids(&self) -> Result<(Option<i64>, Option<i64>)> {
        let record = self.record()?;
        Ok((
            record.i64_field("source_field_id"),
            record.i64_field("target_field_id"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoints::Parent;
    use crate::testutils::MockTransport;
    use serde_json::json;

    #[test]
    fn test_endpoints_read_from_record() {
        let (_transport, session) = MockTransport::session();
        let raw = json!({
            "created_ts": null,
            "source_data_store_id": "1", "source_data_store_name": "Events",
            "source_schema_id": 10, "source_schema_name": "raw",
            "source_field_id": 3, "source_field_name": "user_id",
            "target_data_store_id": 2, "target_data_store_name": "Warehouse",
            "target_schema_id": 20, "target_schema_name": "clean",
            "target_field_id": 4, "target_field_name": "customer_id",
            "transformation_link_id": 9,
            "updated_ts": null,
        });
        let link = TransformationLink::construct(
            raw.as_object().unwrap().clone().into(),
            Parent::Transformation { transformation_id: 5 },
            &session,
        )
        .unwrap();

        let source = link.source().unwrap();
        // ids are coerced from strings
        assert_eq!(source.data_store_id, Some(1));
        assert_eq!(source.field_name.as_deref(), Some("user_id"));
        assert_eq!(link.target().unwrap().schema_name.as_deref(), Some("clean"));
        assert_eq!(link.field_ids().unwrap(), (Some(3), Some(4)));
        assert_eq!(link.name(), None);
    }
}
