use std::rc::Rc;

use serde_json::Value;

use crate::endpoints::Parent;
use crate::entity::descriptor::USER;
use crate::entity::{CatalogEntity, EntityCore, EntityDescriptor, EntityInput, Record};
use crate::error::Result;
use crate::session::Session;

/// A member of the catalog's organization. Users are looked up by id or by
/// email and are never created through the client.
#[derive(Debug)]
pub struct User {
    core: EntityCore,
}

impl CatalogEntity for User {
    fn descriptor() -> &'static EntityDescriptor {
        &USER
    }

    fn from_core(core: EntityCore) -> Self {
        Self { core }
    }

    fn core(&self) -> &EntityCore {
        &self.core
    }
}

impl User {
    /// Wrap a user-valued field. A complete record hydrates in place, a bare
    /// id (or a partial record carrying `user_id`) stays unhydrated.
    pub(crate) fn lazy(value: &Value, session: &Session) -> Result<Option<User>> {
        let input = match value {
            Value::Number(id) => match id.as_i64() {
                Some(id) => EntityInput::ById(id),
                None => return Ok(None),
            },
            Value::Object(record) if USER.is_complete(record) => {
                let record = Record::from_raw(&USER, record.clone(), session)?;
                return Ok(Some(Self::from_core(EntityCore::hydrated(
                    &USER,
                    Parent::Root,
                    session,
                    Rc::new(record),
                ))));
            }
            Value::Object(record) => match record.get(USER.id_field).and_then(Value::as_i64) {
                Some(id) => EntityInput::ById(id),
                None => return Ok(None),
            },
            _ => return Ok(None),
        };
        Self::construct(input, Parent::Root, session).map(Some)
    }

    pub fn email(&self) -> Result<Option<String>> {
        Ok(self.record()?.str_field("email").map(str::to_string))
    }

    pub fn full_name(&self) -> Result<Option<String>> {
        Ok(self.record()?.str_field("name").map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils::MockTransport;
    use serde_json::json;

    #[test]
    fn test_lazy_user_from_id_fetches_on_demand() {
        let (transport, session) = MockTransport::session();
        transport.push_get(
            "users/7",
            json!({"user": {"user_id": 7, "name": "Grant", "email": "grant@example.com"}}),
        );

        let user = User::lazy(&json!(7), &session).unwrap().unwrap();
        assert!(transport.calls().is_empty());
        assert_eq!(user.email().unwrap().as_deref(), Some("grant@example.com"));
        assert_eq!(user.name().as_deref(), Some("grant@example.com"));
    }

    #[test]
    fn test_lazy_user_from_record_needs_no_network() {
        let (transport, session) = MockTransport::session();
        let user = User::lazy(
            &json!({"user_id": 8, "name": "Ana", "email": "ana@example.com"}),
            &session,
        )
        .unwrap()
        .unwrap();
        assert_eq!(user.id(), Some(8));
        assert_eq!(user.full_name().unwrap().as_deref(), Some("Ana"));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_users_are_not_created() {
        let (transport, session) = MockTransport::session();
        let partial = json!({"name": "Nobody"});
        let user = User::construct(
            partial.as_object().unwrap().clone().into(),
            Parent::Root,
            &session,
        )
        .unwrap();
        assert!(matches!(
            user.ensure_hydrated(),
            Err(crate::error::CatalogError::InvalidFieldInputs(_))
        ));
        assert!(transport.calls().is_empty());
    }
}
