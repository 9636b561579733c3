//! Identity-mapped collection caches and get-or-create resolution
//!
//! A [`Children`] cache exists once per parent entity and child kind. It
//! indexes entities by id and by lowercased name, and remembers whether the
//! parent's full child listing was fetched so that the listing is paid for
//! at most once unless a refresh is forced.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use super::{CatalogEntity, EntityCore, EntityInput, Record};
use crate::endpoints::Parent;
use crate::error::{CatalogError, Result};
use crate::session::Session;

/// Dual index over the entities of one kind under one parent.
///
/// `name_keys` remembers the key each id was indexed under, so an entity
/// renamed after insertion is still unlinked by its old key.
#[derive(Debug)]
pub struct Collection<T> {
    by_id: BTreeMap<i64, Rc<T>>,
    by_name: HashMap<String, Rc<T>>,
    name_keys: HashMap<i64, String>,
    fully_retrieved: bool,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            by_id: BTreeMap::new(),
            by_name: HashMap::new(),
            name_keys: HashMap::new(),
            fully_retrieved: false,
        }
    }
}

impl<T: CatalogEntity> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert into both indexes. Entities without a known id are ignored.
    pub fn add(&mut self, entity: Rc<T>) {
        let id = match entity.id() {
            Some(id) => id,
            None => return,
        };
        self.remove(id);
        self.by_id.insert(id, entity.clone());
        if let Some(name) = entity.name() {
            let key = name.to_lowercase();
            self.by_name.insert(key.clone(), entity);
            self.name_keys.insert(id, key);
        }
    }

    /// Evict by id; a miss is a no-op
    pub fn remove(&mut self, id: i64) -> Option<Rc<T>> {
        let removed = self.by_id.remove(&id)?;
        if let Some(key) = self.name_keys.remove(&id) {
            let same = self
                .by_name
                .get(&key)
                .map(|current| Rc::ptr_eq(current, &removed))
                .unwrap_or(false);
            if same {
                self.by_name.remove(&key);
            }
        }
        Some(removed)
    }

    /// Re-index entities whose name changed since they were added
    pub fn sync_names(&mut self) {
        let renamed: Vec<Rc<T>> = self
            .by_id
            .iter()
            .filter(|(id, entity)| {
                entity.name().map(|name| name.to_lowercase()).as_ref() != self.name_keys.get(*id)
            })
            .map(|(_, entity)| entity.clone())
            .collect();
        for entity in renamed {
            self.add(entity);
        }
    }

    pub fn reset(&mut self) {
        self.by_id.clear();
        self.by_name.clear();
        self.name_keys.clear();
        self.fully_retrieved = false;
    }

    pub fn get_by_id(&self, id: i64) -> Option<Rc<T>> {
        self.by_id.get(&id).cloned()
    }

    /// Case-insensitive
    pub fn get_by_name(&self, name: &str) -> Option<Rc<T>> {
        self.by_name.get(&name.to_lowercase()).cloned()
    }

    pub fn fully_retrieved(&self) -> bool {
        self.fully_retrieved
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn name_count(&self) -> usize {
        self.by_name.len()
    }

    /// Entities in id order
    pub fn values(&self) -> Vec<Rc<T>> {
        self.by_id.values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<i64> {
        self.by_id.keys().copied().collect()
    }
}

/// Options for [`Children::resolve`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    pub refresh: bool,
    /// `None` uses the session default
    pub pre_fetch: Option<bool>,
    pub raise_if_missing: bool,
}

impl ResolveOptions {
    pub fn refresh(mut self, refresh: bool) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn pre_fetch(mut self, pre_fetch: bool) -> Self {
        self.pre_fetch = Some(pre_fetch);
        self
    }

    pub fn raise_if_missing(mut self, raise: bool) -> Self {
        self.raise_if_missing = raise;
        self
    }
}

/// The cache of one child kind under one parent, with resolution on top
#[derive(Debug)]
pub struct Children<T> {
    parent: Parent,
    session: Session,
    cache: RefCell<Collection<T>>,
}

impl<T: CatalogEntity> Children<T> {
    pub fn new(parent: Parent, session: Session) -> Self {
        Self {
            parent,
            session,
            cache: RefCell::new(Collection::new()),
        }
    }

    pub fn parent(&self) -> Parent {
        self.parent
    }

    pub fn path(&self) -> String {
        self.parent.collection_path(T::descriptor().segment)
    }

    /// Fetch the full listing once, or again when `force` is set
    pub fn ensure_fully_retrieved(&self, force: bool) -> Result<()> {
        if !force && self.cache.borrow().fully_retrieved {
            return Ok(());
        }

        let path = self.path();
        debug!(kind = %T::descriptor().kind, path = %path, force, "Retrieving full collection");
        let records = self
            .session
            .transport()
            .get_paginated(&path, T::descriptor().collection_key)?;
        self.merge(records, force)?;
        self.cache.borrow_mut().fully_retrieved = true;
        Ok(())
    }

    /// Get-or-create: cache by id, then cache by name, then construct.
    ///
    /// Attribute maps always construct; the entity decides during hydration
    /// whether it is a complete record or a creation request.
    pub fn resolve(
        &self,
        input: impl Into<EntityInput>,
        options: ResolveOptions,
    ) -> Result<Option<Rc<T>>> {
        let input = input.into();
        let pre_fetch = options.pre_fetch.unwrap_or(self.session.pre_fetch());
        if pre_fetch || options.refresh {
            self.ensure_fully_retrieved(options.refresh)?;
        }

        let hit = match &input {
            EntityInput::ById(id) => self.cache.borrow().get_by_id(*id),
            EntityInput::ByName(name) => self.lookup_name(name),
            EntityInput::ByAttributes(_) => None,
        };
        if hit.is_some() {
            return Ok(hit);
        }

        let entity = T::construct(input.clone(), self.parent, &self.session)?;
        let resolved = match entity.core().ensure_hydrated()? {
            Some(record) => Some(self.adopt(entity, record)),
            None => None,
        };

        match resolved {
            None if options.raise_if_missing => Err(CatalogError::does_not_exist(
                T::descriptor().kind,
                input,
            )),
            resolved => Ok(resolved),
        }
    }

    /// Keep one live object per id: an already cached id takes the new record
    fn adopt(&self, entity: T, record: Rc<Record>) -> Rc<T> {
        let entity = match self.refresh_existing(record) {
            Ok(existing) => existing,
            Err(_) => Rc::new(entity),
        };
        self.cache.borrow_mut().add(entity.clone());
        entity
    }

    /// Install `record` into the cached object with the same id. The object
    /// is unindexed first so that a changed name does not leave a stale key;
    /// callers re-add it. Hands the record back when the id is not cached.
    fn refresh_existing(&self, record: Rc<Record>) -> std::result::Result<Rc<T>, Rc<Record>> {
        let existing = self.cache.borrow_mut().remove(record.id());
        match existing {
            Some(existing) => {
                existing.core().install(record);
                Ok(existing)
            }
            None => Err(record),
        }
    }

    /// Merge raw records into the cache, reusing live objects by id. With
    /// `replace` the cache is rebuilt from exactly these records.
    ///
    /// Every record is validated before the cache is touched, so a bad
    /// record leaves the cache as it was.
    pub fn merge(&self, records: Vec<Value>, replace: bool) -> Result<Vec<Rc<T>>> {
        let descriptor = T::descriptor();
        let records = records
            .into_iter()
            .map(|raw| match raw {
                Value::Object(raw) => Record::from_raw(descriptor, raw, &self.session).map(Rc::new),
                other => Err(CatalogError::InvalidFieldInputs(format!(
                    "expected a {} record, found {}",
                    descriptor.kind, other
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        let mut merged = Vec::with_capacity(records.len());
        for record in records {
            let entity = match self.refresh_existing(record) {
                Ok(existing) => existing,
                Err(record) => Rc::new(T::from_core(EntityCore::hydrated(
                    descriptor,
                    self.parent,
                    &self.session,
                    record,
                ))),
            };
            merged.push(entity);
        }

        let mut cache = self.cache.borrow_mut();
        if replace {
            cache.reset();
        }
        for entity in &merged {
            cache.add(entity.clone());
        }
        Ok(merged)
    }

    pub fn mark_fully_retrieved(&self) {
        self.cache.borrow_mut().fully_retrieved = true;
    }

    /// Insert an entity resolved elsewhere
    pub fn insert(&self, entity: Rc<T>) {
        self.cache.borrow_mut().add(entity);
    }

    pub fn remove(&self, id: i64) -> Option<Rc<T>> {
        self.cache.borrow_mut().remove(id)
    }

    pub fn reset(&self) {
        self.cache.borrow_mut().reset();
    }

    /// Every child, fetching the full listing if needed
    pub fn all(&self, refresh: bool) -> Result<Vec<Rc<T>>> {
        self.ensure_fully_retrieved(refresh)?;
        Ok(self.cached())
    }

    /// Children known locally, without any network call
    pub fn cached(&self) -> Vec<Rc<T>> {
        self.cache.borrow().values()
    }

    pub fn by_id(&self, id: i64) -> Option<Rc<T>> {
        self.cache.borrow().get_by_id(id)
    }

    pub fn by_name(&self, name: &str) -> Option<Rc<T>> {
        self.lookup_name(name)
    }

    /// Name lookup after picking up renames made through entity updates
    fn lookup_name(&self, name: &str) -> Option<Rc<T>> {
        let mut cache = self.cache.borrow_mut();
        cache.sync_names();
        cache.get_by_name(name)
    }

    pub fn is_fully_retrieved(&self) -> bool {
        self.cache.borrow().fully_retrieved()
    }

    pub fn len(&self) -> usize {
        self.cache.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.borrow().is_empty()
    }

    /// Deprecate children remotely; evicts locally only when the service
    /// accepted the delete.
    pub fn delete(&self, ids: Vec<i64>, body_key: &str) -> Result<bool> {
        if ids.is_empty() {
            return Ok(false);
        }
        let body = json!({ body_key: ids });
        let deleted = self.session.transport().delete_ok(&self.path(), Some(&body))?;
        if deleted {
            let mut cache = self.cache.borrow_mut();
            for id in &ids {
                cache.remove(*id);
            }
            debug!(kind = %T::descriptor().kind, count = ids.len(), "Deleted");
        } else {
            warn!(kind = %T::descriptor().kind, ids = ?ids, "Delete was not accepted");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataSchema, User};
    use crate::testutils::MockTransport;
    use rstest::rstest;
    use serde_json::json;

    fn user(id: i64, email: &str) -> Value {
        json!({"user_id": id, "name": format!("User {}", id), "email": email})
    }

    fn schema(id: i64, name: &str) -> Value {
        json!({
            "created_ts": "2020-09-23 14:56:02",
            "data_schema_id": id,
            "description_markup": null,
            "description_raw": null,
            "name": name,
            "schema_loc": name,
            "steward": null,
            "tech_poc": null,
            "type": "table",
            "updated_ts": "2020-09-23 14:56:02",
        })
    }

    fn users(session: &Session) -> Children<User> {
        Children::new(Parent::Root, session.clone())
    }

    #[test]
    fn test_add_remove_add_round_trips() {
        let (_transport, session) = MockTransport::session();
        let children = users(&session);
        let merged = children.merge(vec![user(1, "A@x.com")], false).unwrap();
        let entity = merged[0].clone();

        let mut cache: Collection<User> = Collection::new();
        cache.add(entity.clone());
        assert_eq!((cache.len(), cache.name_count()), (1, 1));
        assert!(Rc::ptr_eq(&cache.get_by_name("a@x.com").unwrap(), &entity));

        cache.remove(1);
        assert_eq!((cache.len(), cache.name_count()), (0, 0));
        assert!(cache.remove(1).is_none());

        cache.add(entity.clone());
        assert_eq!((cache.len(), cache.name_count()), (1, 1));
        assert!(Rc::ptr_eq(
            &cache.get_by_id(1).unwrap(),
            &cache.get_by_name("A@X.COM").unwrap()
        ));
    }

    #[test]
    fn test_two_name_lookups_fetch_listing_once() {
        let (transport, session) = MockTransport::session();
        transport.route_get(
            "users",
            json!({"users": [user(1, "a@x.com"), user(2, "b@x.com")], "meta": {"next_page": null}}),
        );
        let children = users(&session);

        let a = children.resolve("a@x.com", ResolveOptions::default()).unwrap();
        let b = children.resolve("B@x.com", ResolveOptions::default()).unwrap();
        assert_eq!(a.unwrap().id(), Some(1));
        assert_eq!(b.unwrap().id(), Some(2));
        assert_eq!(transport.paginated_fetches("users"), 1);
        assert_eq!(transport.calls().len(), 1);
    }

    #[test]
    fn test_resolve_same_id_twice_is_same_object() {
        let (transport, session) = MockTransport::session();
        transport.push_get("users/3", json!({"user": user(3, "c@x.com")}));
        let children = users(&session);
        let options = ResolveOptions::default().pre_fetch(false);

        let first = children.resolve(3_i64, options).unwrap().unwrap();
        let second = children.resolve(3_i64, options).unwrap().unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(transport.calls().len(), 1);

        // and the name index points at the same object
        let by_name = children.resolve("c@x.com", options).unwrap().unwrap();
        assert!(Rc::ptr_eq(&first, &by_name));
    }

    #[test]
    fn test_name_resolved_remotely_joins_existing_identity() {
        let (transport, session) = MockTransport::session();
        transport.push_get("users/3", json!({"user": user(3, "old@x.com")}));
        transport.push_get_query("users", "email", "C@X.com", json!({"user": user(3, "c@x.com")}));
        let children = users(&session);
        let options = ResolveOptions::default().pre_fetch(false);

        let by_id = children.resolve(3_i64, options).unwrap().unwrap();
        let by_name = children.resolve("C@X.com", options).unwrap().unwrap();
        assert!(Rc::ptr_eq(&by_id, &by_name));
        assert_eq!(by_id.name().as_deref(), Some("c@x.com"));
        assert_eq!(children.len(), 1);
        assert!(children.by_name("old@x.com").is_none());
        assert_eq!(transport.calls().len(), 2);
    }

    #[rstest]
    #[case(false, Ok(()))]
    #[case(true, Err(()))]
    fn test_missing_entity(#[case] raise: bool, #[case] expected: std::result::Result<(), ()>) {
        let (_transport, session) = MockTransport::session();
        let children = users(&session);
        let options = ResolveOptions::default().pre_fetch(false).raise_if_missing(raise);

        let resolved = children.resolve("nobody@x.com", options);
        match expected {
            Ok(()) => assert!(resolved.unwrap().is_none()),
            Err(()) => assert!(matches!(
                resolved,
                Err(CatalogError::DoesNotExist { .. })
            )),
        }
        assert!(children.is_empty());
    }

    #[test]
    fn test_forced_refresh_reuses_objects_and_drops_absent() {
        let (transport, session) = MockTransport::session();
        let parent = Parent::Root.descend(1).unwrap();
        transport.push_get(
            "data-stores/1/schemas",
            json!({"data_schemas": [schema(10, "a"), schema(11, "b")]}),
        );
        transport.push_get(
            "data-stores/1/schemas",
            json!({"data_schemas": [schema(10, "a_renamed")]}),
        );
        let children: Children<DataSchema> = Children::new(parent, session.clone());

        let before = children.all(false).unwrap();
        assert_eq!(before.len(), 2);
        let after = children.all(true).unwrap();
        assert_eq!(after.len(), 1);
        assert!(Rc::ptr_eq(&before[0], &after[0]));
        assert!(children.by_name("a").is_none());
        assert!(children.by_name("A_RENAMED").is_some());
        assert_eq!(transport.paginated_fetches("data-stores/1/schemas"), 2);
    }

    #[test]
    fn test_delete_evicts_only_on_success() {
        let (transport, session) = MockTransport::session();
        let parent = Parent::Root.descend(1).unwrap();
        let children: Children<DataSchema> = Children::new(parent, session.clone());
        children
            .merge(vec![schema(10, "a"), schema(11, "b")], false)
            .unwrap();

        transport.push_delete("data-stores/1/schemas", None);
        assert!(!children.delete(vec![10], "schema_ids").unwrap());
        assert_eq!(children.len(), 2);

        transport.push_delete("data-stores/1/schemas", Some(json!({})));
        assert!(children.delete(vec![10], "schema_ids").unwrap());
        assert_eq!(children.len(), 1);
        assert!(children.by_name("a").is_none());

        let calls = transport.calls();
        assert_eq!(calls[1].body, Some(json!({"schema_ids": [10]})));
    }

    #[test]
    fn test_rename_through_update_keeps_indexes_in_step() {
        let (transport, session) = MockTransport::session();
        let parent = Parent::Root.descend(1).unwrap();
        let children: Children<DataSchema> = Children::new(parent, session.clone());
        children
            .merge(vec![schema(10, "a"), schema(11, "b")], false)
            .unwrap();
        let renamed = children.by_id(10).unwrap();

        let mut changes = serde_json::Map::new();
        changes.insert("name".to_string(), json!("c"));
        transport.push_post(
            "data-stores/1/schemas/10",
            json!({"data_schema": schema(10, "c")}),
        );
        renamed.core().update(changes).unwrap();

        assert!(children.by_name("a").is_none());
        assert!(Rc::ptr_eq(&children.by_name("C").unwrap(), &renamed));
        let options = ResolveOptions::default().pre_fetch(false);
        let resolved = children.resolve("c", options).unwrap().unwrap();
        assert!(Rc::ptr_eq(&resolved, &renamed));
        assert_eq!(transport.calls().len(), 1);

        children.remove(10);
        assert!(children.by_name("c").is_none());
        assert!(children.by_name("a").is_none());
        assert!(children.by_name("b").is_some());
        assert_eq!(children.len(), 1);
    }

    #[test]
    fn test_failed_refresh_keeps_cached_objects() {
        let (transport, session) = MockTransport::session();
        let children = users(&session);
        let first = children.merge(vec![user(1, "a@x.com")], false).unwrap()[0].clone();

        transport.push_get(
            "users",
            json!({"users": [user(1, "a@x.com"), {"user_id": "not-an-int"}], "meta": {"next_page": null}}),
        );
        assert!(matches!(
            children.ensure_fully_retrieved(true),
            Err(CatalogError::InvalidFieldInputs(_))
        ));

        assert!(Rc::ptr_eq(&children.by_id(1).unwrap(), &first));
        assert!(Rc::ptr_eq(&children.by_name("a@x.com").unwrap(), &first));
        assert!(!children.is_fully_retrieved());

        let options = ResolveOptions::default().pre_fetch(false);
        let again = children.resolve(1_i64, options).unwrap().unwrap();
        assert!(Rc::ptr_eq(&first, &again));
        assert_eq!(transport.calls().len(), 1);
    }
}
