use std::rc::Rc;

use serde::Serialize;

use super::changes;
use crate::entity::descriptor::FIELD_VALUE;
use crate::entity::{CatalogEntity, EntityCore, EntityDescriptor, Record};
use crate::error::Result;

/// A sample value of a data field
#[derive(Debug)]
pub struct FieldValue {
    core: EntityCore,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FieldValueUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CatalogEntity for FieldValue {
    fn descriptor() -> &'static EntityDescriptor {
        &FIELD_VALUE
    }

    fn from_core(core: EntityCore) -> Self {
        Self { core }
    }

    fn core(&self) -> &EntityCore {
        &self.core
    }
}

impl FieldValue {
    pub fn value(&self) -> Result<Option<String>> {
        Ok(self.record()?.str_field("field_value").map(str::to_string))
    }

    pub fn update(&self, update: &FieldValueUpdate) -> Result<Rc<Record>> {
        self.core.update(changes(update)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataField;
    use crate::endpoints::Parent;
    use crate::entity::{Children, ResolveOptions};
    use crate::testutils::MockTransport;
    use serde_json::json;

    #[test]
    fn test_value_created_under_field() {
        let (transport, session) = MockTransport::session();
        let raw = json!({
            "created_ts": null, "data_format": "int", "data_type": "number",
            "description_markup": null, "description_raw": null, "field_id": 40,
            "full_path_name": "order_id", "name": "order_id", "nullable": false,
            "parent_path": null, "steward": null, "tech_poc": null, "type": "scalar",
            "updated_ts": null,
        });
        let field = DataField::construct(
            raw.as_object().unwrap().clone().into(),
            Parent::Root.descend(3).unwrap().descend(12).unwrap(),
            &session,
        )
        .unwrap();

        let path = "data-stores/3/schemas/12/fields/40/values";
        transport.push_post(
            path,
            json!({"field_value": {"field_value_id": 77, "field_value": "1001"}}),
        );
        let sample = json!({"field_value": "1001"});
        let value = field
            .field_value_with(
                sample.as_object().unwrap().clone(),
                ResolveOptions::default().pre_fetch(false),
            )
            .unwrap()
            .unwrap();
        assert_eq!(value.id(), Some(77));
        assert_eq!(value.value().unwrap().as_deref(), Some("1001"));

        // cached under its value
        let again = field
            .field_value_with("1001", ResolveOptions::default().pre_fetch(false))
            .unwrap()
            .unwrap();
        assert!(Rc::ptr_eq(&value, &again));
        assert_eq!(transport.count(crate::testutils::Method::Post, path), 1);
        assert_eq!(transport.calls().len(), 1);
    }

    fn value_record(id: i64, value: &str) -> serde_json::Value {
        json!({
            "created_ts": null, "description_markup": null, "description_raw": null,
            "field_value": value, "field_value_id": id, "updated_ts": null,
        })
    }

    #[test]
    fn test_changed_value_moves_in_name_index() {
        let (transport, session) = MockTransport::session();
        let parent = Parent::DataField {
            data_store_id: 3,
            data_schema_id: 12,
            field_id: 40,
        };
        let values: Children<FieldValue> = Children::new(parent, session.clone());
        values.merge(vec![value_record(77, "old")], false).unwrap();
        let value = values.by_id(77).unwrap();

        transport.push_post(
            "data-stores/3/schemas/12/fields/40/values/77",
            json!({"field_value": value_record(77, "new")}),
        );
        let update = FieldValueUpdate {
            field_value: Some("new".to_string()),
            ..Default::default()
        };
        value.update(&update).unwrap();
        assert_eq!(transport.calls()[0].body, Some(json!({"field_value": "new"})));

        assert!(values.by_name("old").is_none());
        assert!(Rc::ptr_eq(&values.by_name("NEW").unwrap(), &value));
        assert!(Rc::ptr_eq(&values.by_id(77).unwrap(), &value));

        // eviction clears both indexes
        values.remove(77);
        assert!(values.by_id(77).is_none());
        assert!(values.by_name("new").is_none());
        assert!(values.by_name("old").is_none());
    }
}
