//! Transformation link inputs and their normalization
//!
//! Four shapes are accepted: a single `{source_field_id, target_field_id}`
//! map, a list of such maps, a `(source, target)` pair of data fields, or a
//! list of such pairs. A list must use one shape throughout; any element that
//! does not conform invalidates the whole batch.

use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::DataField;
use crate::entity::{AsEntityId, EntityInput};
use crate::error::{CatalogError, Result};

const LINK_SHAPES: &str = "links must be one of: a single map of source and target field ids \
{\"source_field_id\": 1, \"target_field_id\": 2}; a list of such maps; a single (source, target) \
pair of data fields; or a list of such pairs";

/// One directed source -> target field mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkSpec {
    pub source_field_id: i64,
    pub target_field_id: i64,
}

impl LinkSpec {
    pub fn new(source_field_id: i64, target_field_id: i64) -> Self {
        Self {
            source_field_id,
            target_field_id,
        }
    }

    fn to_map(self) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("source_field_id".into(), Value::from(self.source_field_id));
        map.insert("target_field_id".into(), Value::from(self.target_field_id));
        map
    }
}

impl From<LinkSpec> for EntityInput {
    fn from(spec: LinkSpec) -> Self {
        EntityInput::ByAttributes(spec.to_map())
    }
}

/// A single link as given by the caller
#[derive(Debug, Clone)]
pub enum LinkItem {
    Map(Map<String, Value>),
    Fields(Rc<DataField>, Rc<DataField>),
}

impl LinkItem {
    /// Exactly the two id keys, both integers
    fn as_spec(map: &Map<String, Value>) -> Option<LinkSpec> {
        if map.len() != 2 {
            return None;
        }
        let source = map.get("source_field_id")?.as_i64()?;
        let target = map.get("target_field_id")?.as_i64()?;
        Some(LinkSpec::new(source, target))
    }
}

impl From<LinkSpec> for LinkItem {
    fn from(spec: LinkSpec) -> Self {
        LinkItem::Map(spec.to_map())
    }
}

impl From<Map<String, Value>> for LinkItem {
    fn from(map: Map<String, Value>) -> Self {
        LinkItem::Map(map)
    }
}

impl From<(Rc<DataField>, Rc<DataField>)> for LinkItem {
    fn from((source, target): (Rc<DataField>, Rc<DataField>)) -> Self {
        LinkItem::Fields(source, target)
    }
}

/// A single link or a batch of links
#[derive(Debug, Clone)]
pub enum LinkInput {
    Single(LinkItem),
    Batch(Vec<LinkItem>),
}

impl From<LinkItem> for LinkInput {
    fn from(item: LinkItem) -> Self {
        LinkInput::Single(item)
    }
}

impl From<Vec<LinkItem>> for LinkInput {
    fn from(items: Vec<LinkItem>) -> Self {
        LinkInput::Batch(items)
    }
}

impl From<LinkSpec> for LinkInput {
    fn from(spec: LinkSpec) -> Self {
        LinkInput::Single(spec.into())
    }
}

impl From<Vec<LinkSpec>> for LinkInput {
    fn from(specs: Vec<LinkSpec>) -> Self {
        LinkInput::Batch(specs.into_iter().map(LinkItem::from).collect())
    }
}

impl From<Map<String, Value>> for LinkInput {
    fn from(map: Map<String, Value>) -> Self {
        LinkInput::Single(map.into())
    }
}

impl From<Vec<Map<String, Value>>> for LinkInput {
    fn from(maps: Vec<Map<String, Value>>) -> Self {
        LinkInput::Batch(maps.into_iter().map(LinkItem::from).collect())
    }
}

impl From<(Rc<DataField>, Rc<DataField>)> for LinkInput {
    fn from(pair: (Rc<DataField>, Rc<DataField>)) -> Self {
        LinkInput::Single(pair.into())
    }
}

impl From<Vec<(Rc<DataField>, Rc<DataField>)>> for LinkInput {
    fn from(pairs: Vec<(Rc<DataField>, Rc<DataField>)>) -> Self {
        LinkInput::Batch(pairs.into_iter().map(LinkItem::from).collect())
    }
}

impl TryFrom<Value> for LinkInput {
    type Error = CatalogError;

    /// A JSON map or a JSON list of maps
    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(map.into()),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Object(map) => Ok(LinkItem::Map(map)),
                    _ => Err(CatalogError::InvalidLinks(LINK_SHAPES.to_string())),
                })
                .collect::<Result<Vec<_>>>()
                .map(LinkInput::Batch),
            _ => Err(CatalogError::InvalidLinks(LINK_SHAPES.to_string())),
        }
    }
}

/// Flatten any accepted shape into an ordered list of id pairs
pub fn normalize_links(input: &LinkInput) -> Result<Vec<LinkSpec>> {
    let invalid = || CatalogError::InvalidLinks(LINK_SHAPES.to_string());

    match input {
        LinkInput::Single(LinkItem::Map(map)) => {
            LinkItem::as_spec(map).map(|spec| vec![spec]).ok_or_else(invalid)
        }
        LinkInput::Single(LinkItem::Fields(source, target)) => {
            Ok(vec![LinkSpec::new(source.entity_id()?, target.entity_id()?)])
        }
        LinkInput::Batch(items) if items.is_empty() => Err(invalid()),
        LinkInput::Batch(items) => match &items[0] {
            LinkItem::Map(_) => items
                .iter()
                .map(|item| match item {
                    LinkItem::Map(map) => LinkItem::as_spec(map).ok_or_else(invalid),
                    LinkItem::Fields(..) => Err(invalid()),
                })
                .collect(),
            LinkItem::Fields(..) => {
                if items.iter().any(|item| matches!(item, LinkItem::Map(_))) {
                    return Err(invalid());
                }
                items
                    .iter()
                    .map(|item| match item {
                        LinkItem::Fields(source, target) => {
                            Ok(LinkSpec::new(source.entity_id()?, target.entity_id()?))
                        }
                        LinkItem::Map(_) => Err(invalid()),
                    })
                    .collect()
            }
        },
    }
}
