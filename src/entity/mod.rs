//! Serializable entities
//!
//! Every catalog entity wraps an [`EntityCore`]: the descriptor of its kind,
//! its position in the hierarchy, the shared [`Session`] and a mutable slot
//! holding the current immutable [`Record`] snapshot. Hydration is explicit
//! through [`EntityCore::ensure_hydrated`]; an update replaces the snapshot
//! wholesale with the service's post-update record.

pub mod collection;
pub mod descriptor;

pub use collection::{Children, Collection, ResolveOptions};
pub use descriptor::{Coercion, EntityDescriptor, EntityKind};

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use chrono::NaiveDateTime;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::catalog::User;
use crate::endpoints::Parent;
use crate::error::{CatalogError, Result};
use crate::session::Session;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Constructor input, classified once at the boundary
#[derive(Debug, Clone, PartialEq)]
pub enum EntityInput {
    ById(i64),
    ByName(String),
    ByAttributes(Map<String, Value>),
}

impl From<i64> for EntityInput {
    fn from(id: i64) -> Self {
        EntityInput::ById(id)
    }
}

impl From<i32> for EntityInput {
    fn from(id: i32) -> Self {
        EntityInput::ById(i64::from(id))
    }
}

impl From<&str> for EntityInput {
    fn from(name: &str) -> Self {
        EntityInput::ByName(name.to_string())
    }
}

impl From<String> for EntityInput {
    fn from(name: String) -> Self {
        EntityInput::ByName(name)
    }
}

impl From<&String> for EntityInput {
    fn from(name: &String) -> Self {
        EntityInput::ByName(name.clone())
    }
}

impl From<Map<String, Value>> for EntityInput {
    fn from(attributes: Map<String, Value>) -> Self {
        EntityInput::ByAttributes(attributes)
    }
}

impl TryFrom<Value> for EntityInput {
    type Error = CatalogError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(EntityInput::ById).ok_or_else(|| {
                CatalogError::InvalidInputs(format!("{} is not an integer id", n))
            }),
            Value::String(name) => Ok(EntityInput::ByName(name)),
            Value::Object(attributes) => Ok(EntityInput::ByAttributes(attributes)),
            other => Err(CatalogError::InvalidInputs(format!(
                "Must provide an integer, string or map to create an entity, got {}",
                other
            ))),
        }
    }
}

impl fmt::Display for EntityInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityInput::ById(id) => write!(f, "{}", id),
            EntityInput::ByName(name) => f.write_str(name),
            EntityInput::ByAttributes(attributes) => {
                write!(f, "{}", Value::Object(attributes.clone()))
            }
        }
    }
}

/// Immutable snapshot of a hydrated entity
#[derive(Debug, Clone)]
pub struct Record {
    id: i64,
    name: Option<String>,
    attributes: Map<String, Value>,
    users: BTreeMap<&'static str, Rc<User>>,
}

impl Record {
    /// Coerce a raw server record. The id field is mandatory; other missing
    /// fields stay absent and nulls stay null.
    pub fn from_raw(
        descriptor: &'static EntityDescriptor,
        raw: Map<String, Value>,
        session: &Session,
    ) -> Result<Self> {
        let mut attributes = raw;
        let mut users = BTreeMap::new();

        for (field, coercion) in descriptor.fields {
            let value = match attributes.get(*field) {
                Some(value) if !value.is_null() => value,
                _ => continue,
            };
            let coerced = coercion.apply(field, value)?;
            if *coercion == Coercion::User {
                if let Some(user) = User::lazy(&coerced, session)? {
                    users.insert(*field, Rc::new(user));
                }
            }
            attributes.insert(field.to_string(), coerced);
        }

        let id = attributes
            .get(descriptor.id_field)
            .and_then(Value::as_i64)
            .ok_or_else(|| {
                CatalogError::InvalidFieldInputs(format!(
                    "{} record is missing '{}'",
                    descriptor.kind, descriptor.id_field
                ))
            })?;
        let name = descriptor
            .name_field
            .and_then(|field| attributes.get(field))
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            id,
            name,
            attributes,
            users,
        })
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn attributes(&self) -> &Map<String, Value> {
        &self.attributes
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.attributes.get(field).filter(|value| !value.is_null())
    }

    pub fn str_field(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    pub fn i64_field(&self, field: &str) -> Option<i64> {
        self.get(field).and_then(Value::as_i64)
    }

    pub fn bool_field(&self, field: &str) -> Option<bool> {
        self.get(field).and_then(Value::as_bool)
    }

    /// A user-valued field such as `steward` or `tech_poc`
    pub fn user(&self, field: &str) -> Option<&Rc<User>> {
        self.users.get(field)
    }

    pub fn description(&self) -> Option<&str> {
        self.str_field("description_raw")
    }

    pub fn created_ts(&self) -> Option<NaiveDateTime> {
        self.timestamp("created_ts")
    }

    pub fn updated_ts(&self) -> Option<NaiveDateTime> {
        self.timestamp("updated_ts")
    }

    fn timestamp(&self, field: &str) -> Option<NaiveDateTime> {
        self.str_field(field)
            .and_then(|ts| NaiveDateTime::parse_from_str(ts, TIMESTAMP_FORMAT).ok())
    }
}

#[derive(Debug)]
struct EntityState {
    id: Option<i64>,
    name: Option<String>,
    input: EntityInput,
    record: Option<Rc<Record>>,
}

/// Shared state and behavior of every catalog entity
#[derive(Debug)]
pub struct EntityCore {
    descriptor: &'static EntityDescriptor,
    parent: Parent,
    session: Session,
    state: RefCell<EntityState>,
}

impl EntityCore {
    /// An unhydrated entity; nothing is fetched until [`Self::ensure_hydrated`]
    pub fn pending(
        descriptor: &'static EntityDescriptor,
        parent: Parent,
        session: &Session,
        input: EntityInput,
    ) -> Self {
        let (id, name) = match &input {
            EntityInput::ById(id) => (Some(*id), None),
            EntityInput::ByName(name) => (None, Some(name.clone())),
            EntityInput::ByAttributes(_) => (None, None),
        };
        Self {
            descriptor,
            parent,
            session: session.clone(),
            state: RefCell::new(EntityState {
                id,
                name,
                input,
                record: None,
            }),
        }
    }

    /// An entity hydrated from a record already in hand
    pub fn hydrated(
        descriptor: &'static EntityDescriptor,
        parent: Parent,
        session: &Session,
        record: Rc<Record>,
    ) -> Self {
        let core = Self::pending(descriptor, parent, session, EntityInput::ById(record.id()));
        core.install(record);
        core
    }

    pub fn descriptor(&self) -> &'static EntityDescriptor {
        self.descriptor
    }

    pub fn kind(&self) -> EntityKind {
        self.descriptor.kind
    }

    pub fn parent(&self) -> Parent {
        self.parent
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Known id, without any network call
    pub fn id(&self) -> Option<i64> {
        self.state.borrow().id
    }

    /// Known name, without any network call
    pub fn name(&self) -> Option<String> {
        self.state.borrow().name.clone()
    }

    pub fn is_hydrated(&self) -> bool {
        self.state.borrow().record.is_some()
    }

    /// Current snapshot, hydrating on first use.
    ///
    /// Returns `None` when the entity cannot be obtained: an unknown id or
    /// name, or a creation the service did not answer with a record.
    pub fn ensure_hydrated(&self) -> Result<Option<Rc<Record>>> {
        let input = {
            let state = self.state.borrow();
            if let Some(record) = &state.record {
                return Ok(Some(record.clone()));
            }
            state.input.clone()
        };

        let raw = match input {
            EntityInput::ById(id) => self.fetch_by_id(id)?,
            EntityInput::ByName(name) => self.fetch_by_name(&name)?,
            EntityInput::ByAttributes(attributes) => {
                if self.descriptor.is_complete(&attributes) {
                    Some(attributes)
                } else {
                    self.create(attributes)?
                }
            }
        };

        match raw {
            Some(raw) => {
                let record = Rc::new(Record::from_raw(self.descriptor, raw, &self.session)?);
                self.install(record.clone());
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    /// Current snapshot, or [`CatalogError::DoesNotExist`]
    pub fn record(&self) -> Result<Rc<Record>> {
        match self.ensure_hydrated()? {
            Some(record) => Ok(record),
            None => Err(self.does_not_exist()),
        }
    }

    pub fn require_id(&self) -> Result<i64> {
        self.record().map(|record| record.id())
    }

    /// Replace the snapshot and back-fill id and name from it
    pub fn install(&self, record: Rc<Record>) {
        let mut state = self.state.borrow_mut();
        state.id = Some(record.id());
        if let Some(name) = record.name() {
            state.name = Some(name.to_string());
        }
        state.input = EntityInput::ById(record.id());
        state.record = Some(record);
    }

    /// Locator of this entity's own child collections
    pub fn child_parent(&self) -> Result<Parent> {
        let id = self.require_id()?;
        self.parent.descend(id).ok_or_else(|| {
            CatalogError::InvalidInputs(format!("{} has no child collections", self.kind()))
        })
    }

    pub fn item_path(&self) -> Result<String> {
        Ok(self.parent.item_path(self.descriptor, self.require_id()?))
    }

    pub fn tags_path(&self) -> Result<String> {
        Ok(self.parent.tags_path(self.descriptor, self.require_id()?))
    }

    /// Send a partial update and adopt the service's authoritative record
    pub fn update(&self, changes: Map<String, Value>) -> Result<Rc<Record>> {
        if changes.is_empty() {
            return self.record();
        }

        let path = self.item_path()?;
        debug!(kind = %self.kind(), path = %path, fields = changes.len(), "Updating");
        let response = self
            .session
            .transport()
            .post(&path, &Value::Object(changes), &[])?;

        let raw = match Self::extract(&response, self.descriptor.record_key) {
            Some(raw) if self.descriptor.is_complete(&raw) => Some(raw),
            _ => self.fetch_by_id(self.require_id()?)?,
        };
        let raw = raw.ok_or_else(|| self.does_not_exist())?;
        let record = Rc::new(Record::from_raw(self.descriptor, raw, &self.session)?);
        self.install(record.clone());
        Ok(record)
    }

    fn does_not_exist(&self) -> CatalogError {
        let state = self.state.borrow();
        CatalogError::does_not_exist(self.kind(), &state.input)
    }

    fn extract(response: &Value, key: &str) -> Option<Map<String, Value>> {
        response.get(key).and_then(Value::as_object).cloned()
    }

    fn fetch_by_id(&self, id: i64) -> Result<Option<Map<String, Value>>> {
        let path = self.parent.item_path(self.descriptor, id);
        debug!(kind = %self.kind(), id, "Fetching by id");
        match self.session.transport().get(&path, &[]) {
            Ok(response) => Ok(Self::extract(&response, self.descriptor.record_key)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    fn fetch_by_name(&self, name: &str) -> Result<Option<Map<String, Value>>> {
        let query_key = match self.descriptor.name_query {
            Some(key) => key,
            None => return Ok(None),
        };
        let path = self.parent.collection_path(self.descriptor.segment);
        debug!(kind = %self.kind(), name, "Fetching by name");
        match self
            .session
            .transport()
            .get(&path, &[(query_key, name.to_string())])
        {
            Ok(response) => Ok(Self::extract(&response, self.descriptor.record_key)),
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Get-or-create through the service; uniqueness is decided remotely
    fn create(&self, attributes: Map<String, Value>) -> Result<Option<Map<String, Value>>> {
        if self.kind() == EntityKind::User {
            return match attributes.get(self.descriptor.id_field).and_then(Value::as_i64) {
                Some(id) => self.fetch_by_id(id),
                None => Err(CatalogError::InvalidFieldInputs(
                    "users cannot be created, provide a user_id or a complete user record"
                        .to_string(),
                )),
            };
        }

        self.descriptor.validate_creation(&attributes)?;
        let payload = self.simplify_users(attributes);
        let path = self.parent.collection_path(self.descriptor.segment);

        let created = if self.kind() == EntityKind::TransformationLink {
            let body = serde_json::json!({ "links": [Value::Object(payload)] });
            let response = self.session.transport().post(&path, &body, &[])?;
            response
                .get("updated_links")
                .and_then(Value::as_array)
                .and_then(|links| links.first())
                .and_then(Value::as_object)
                .cloned()
        } else {
            let response = self
                .session
                .transport()
                .post(&path, &Value::Object(payload), &[])?;
            Self::extract(&response, self.descriptor.record_key)
        };

        if let Some(record) = &created {
            let id = record.get(self.descriptor.id_field).and_then(Value::as_i64);
            info!(kind = %self.kind(), id = ?id, "Created or matched existing entity");
        }
        Ok(created)
    }

    /// Replace user records in a payload with their ids
    fn simplify_users(&self, mut payload: Map<String, Value>) -> Map<String, Value> {
        for field in self.descriptor.user_fields() {
            let user_id = payload
                .get(field)
                .and_then(Value::as_object)
                .and_then(|user| user.get("user_id"))
                .cloned();
            if let Some(user_id) = user_id {
                payload.insert(field.to_string(), user_id);
            }
        }
        payload
    }
}

/// A concrete catalog entity kind built on an [`EntityCore`]
pub trait CatalogEntity: Sized {
    fn descriptor() -> &'static EntityDescriptor;

    fn from_core(core: EntityCore) -> Self;

    fn core(&self) -> &EntityCore;

    /// Rewrite creation attributes before they are sent
    fn prepare_creation(attributes: Map<String, Value>) -> Result<Map<String, Value>> {
        Ok(attributes)
    }

    fn construct(input: EntityInput, parent: Parent, session: &Session) -> Result<Self> {
        let input = match input {
            EntityInput::ByAttributes(attributes)
                if !Self::descriptor().is_complete(&attributes) =>
            {
                EntityInput::ByAttributes(Self::prepare_creation(attributes)?)
            }
            other => other,
        };
        Ok(Self::from_core(EntityCore::pending(
            Self::descriptor(),
            parent,
            session,
            input,
        )))
    }

    fn id(&self) -> Option<i64> {
        self.core().id()
    }

    fn name(&self) -> Option<String> {
        self.core().name()
    }

    fn ensure_hydrated(&self) -> Result<Option<Rc<Record>>> {
        self.core().ensure_hydrated()
    }

    fn record(&self) -> Result<Rc<Record>> {
        self.core().record()
    }
}

/// Foreign-key coercion: an entity or a bare id
pub trait AsEntityId {
    fn entity_id(&self) -> Result<i64>;
}

impl AsEntityId for i64 {
    fn entity_id(&self) -> Result<i64> {
        Ok(*self)
    }
}

impl<T: AsEntityId> AsEntityId for Rc<T> {
    fn entity_id(&self) -> Result<i64> {
        self.as_ref().entity_id()
    }
}

impl<T: AsEntityId + ?Sized> AsEntityId for &T {
    fn entity_id(&self) -> Result<i64> {
        (**self).entity_id()
    }
}

macro_rules! entity_id_via_core {
    ($($entity:ty),* $(,)?) => {
        $(
            impl AsEntityId for $entity {
                fn entity_id(&self) -> Result<i64> {
                    self.core().require_id()
                }
            }
        )*
    };
}

entity_id_via_core!(
    crate::catalog::User,
    crate::catalog::DataStore,
    crate::catalog::DataSchema,
    crate::catalog::DataField,
    crate::catalog::FieldValue,
    crate::catalog::Transformation,
    crate::catalog::TransformationLink,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::DataStore;
    use crate::testutils::MockTransport;
    use serde_json::json;

    fn store_record(id: i64, name: &str) -> Value {
        json!({
            "created_ts": "2020-09-23 14:56:02",
            "data_store_id": id,
            "description_markup": null,
            "description_raw": "raw events",
            "details": {"region": "us-east-1"},
            "name": name,
            "other_type": null,
            "steward": 7,
            "tech_poc": null,
            "type": "kafka",
            "updated_ts": "2020-09-24 10:00:00",
        })
    }

    #[test]
    fn test_input_classification() {
        assert_eq!(EntityInput::from(3), EntityInput::ById(3));
        assert_eq!(EntityInput::from("orders"), EntityInput::ByName("orders".into()));
        assert!(matches!(
            EntityInput::try_from(json!({"name": "x"})),
            Ok(EntityInput::ByAttributes(_))
        ));
        assert!(matches!(
            EntityInput::try_from(json!([1, 2])),
            Err(CatalogError::InvalidInputs(_))
        ));
        assert!(matches!(
            EntityInput::try_from(json!(1.5)),
            Err(CatalogError::InvalidInputs(_))
        ));
    }

    #[test]
    fn test_complete_attributes_hydrate_without_network() {
        let (transport, session) = MockTransport::session();
        let attributes = store_record(4, "Events").as_object().unwrap().clone();
        let store = DataStore::construct(attributes.into(), Parent::Root, &session).unwrap();

        let record = store.record().unwrap();
        assert_eq!(record.id(), 4);
        assert_eq!(record.name(), Some("Events"));
        assert_eq!(store.id(), Some(4));
        assert_eq!(record.description(), Some("raw events"));
        assert_eq!(
            record.created_ts().unwrap().format("%Y-%m-%d").to_string(),
            "2020-09-23"
        );
        assert!(transport.calls().is_empty());

        // user fields are wrapped lazily
        let steward = record.user("steward").unwrap();
        assert_eq!(steward.id(), Some(7));
        assert!(!steward.core().is_hydrated());
        assert!(record.user("tech_poc").is_none());
    }

    #[test]
    fn test_hydrate_by_name_back_fills_id() {
        let (transport, session) = MockTransport::session();
        transport.push_get_query(
            "data-stores",
            "name",
            "events",
            json!({"data_store": store_record(4, "Events")}),
        );

        let store = DataStore::construct("events".into(), Parent::Root, &session).unwrap();
        assert_eq!(store.id(), None);
        store.ensure_hydrated().unwrap();
        assert_eq!(store.id(), Some(4));
        assert_eq!(store.name().as_deref(), Some("Events"));

        // idempotent
        store.ensure_hydrated().unwrap();
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_missing_by_id_is_none() {
        let (_transport, session) = MockTransport::session();
        let store = DataStore::construct(99_i64.into(), Parent::Root, &session).unwrap();
        assert!(store.ensure_hydrated().unwrap().is_none());
        assert!(matches!(
            store.record(),
            Err(CatalogError::DoesNotExist { kind: EntityKind::DataStore, .. })
        ));
    }

    #[test]
    fn test_partial_attributes_create_with_simplified_users() {
        let (transport, session) = MockTransport::session();
        transport.push_post("data-stores", json!({"data_store": store_record(5, "Orders")}));

        let inputs = json!({
            "name": "Orders",
            "type": "kafka",
            "steward": {"user_id": 7, "email": "grant@example.com", "name": "Grant"},
        });
        let store = DataStore::construct(
            inputs.as_object().unwrap().clone().into(),
            Parent::Root,
            &session,
        )
        .unwrap();
        assert_eq!(store.record().unwrap().id(), 5);

        let calls = transport.calls();
        assert_eq!(calls[0].body.as_ref().unwrap()["steward"], json!(7));
    }

    #[test]
    fn test_creation_requires_fields() {
        let (transport, session) = MockTransport::session();
        let inputs = json!({"name": "Orders"});
        let store = DataStore::construct(
            inputs.as_object().unwrap().clone().into(),
            Parent::Root,
            &session,
        )
        .unwrap();
        assert!(matches!(
            store.ensure_hydrated(),
            Err(CatalogError::InvalidFieldInputs(_))
        ));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_update_replaces_snapshot() {
        let (transport, session) = MockTransport::session();
        let raw = store_record(4, "Events").as_object().unwrap().clone();
        let store = DataStore::construct(raw.into(), Parent::Root, &session).unwrap();
        let before = store.record().unwrap();

        let mut updated = store_record(4, "Events");
        updated["description_raw"] = json!("all events");
        updated["description_markup"] = json!("<p>all events</p>");
        transport.push_post("data-stores/4", json!({"data_store": updated}));

        let mut changes = Map::new();
        changes.insert("description".into(), json!("all events"));
        let after = store.core().update(changes).unwrap();

        assert_eq!(after.description(), Some("all events"));
        assert_eq!(after.str_field("description_markup"), Some("<p>all events</p>"));
        // the old snapshot is untouched
        assert_eq!(before.description(), Some("raw events"));
        assert!(Rc::ptr_eq(&store.record().unwrap(), &after));
    }

    #[test]
    fn test_scalar_or_id() {
        let (_transport, session) = MockTransport::session();
        let raw = store_record(4, "Events").as_object().unwrap().clone();
        let store = Rc::new(DataStore::construct(raw.into(), Parent::Root, &session).unwrap());
        assert_eq!(store.entity_id().unwrap(), 4);
        assert_eq!(12_i64.entity_id().unwrap(), 12);
        assert_eq!((&store).entity_id().unwrap(), 4);
    }
}
