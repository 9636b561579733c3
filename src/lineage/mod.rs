//! Lineage impact of a breaking change
//!
//! A [`LineageImpact`] is built from the breaking-change response. Each
//! [`ImpactedAsset`] carries the ids of one affected field plus the chain of
//! upstream fields whose lineage leads to it. Resolution is two-phase: the
//! unique field ids across every chain are bulk-loaded once, then each asset
//! resolves its store, schema and field from the warmed caches.

pub mod graph;

pub use graph::ImpactGraph;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::catalog::{Catalog, DataField, DataSchema, DataStore};
use crate::entity::{CatalogEntity, ResolveOptions};
use crate::error::{CatalogError, Result};
use crate::transport::BatchRequest;

const IMPACT_HEADER: &str = "Lineage for Each Breaking Change\n--------------------------------\n\n";
const IMPACT_SEPARATOR: &str = "\n\n-----\n\n";

/// Number of unique assets of each level affected by a change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageImpactSummary {
    pub data_stores: u64,
    pub schemas: u64,
    pub fields: u64,
}

impl LineageImpactSummary {
    pub fn from_value(value: &Value) -> Result<Self> {
        let invalid = || {
            CatalogError::InvalidInputs(
                "Impact summary must be a map with integer \"data_stores\", \"schemas\" and \"fields\""
                    .to_string(),
            )
        };
        let map = value.as_object().ok_or_else(invalid)?;
        let count = |key: &str| map.get(key).and_then(Value::as_u64).ok_or_else(invalid);
        Ok(Self {
            data_stores: count("data_stores")?,
            schemas: count("schemas")?,
            fields: count("fields")?,
        })
    }
}

impl fmt::Display for LineageImpactSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Data Stores: {}, Schemas: {}, Fields: {}",
            self.data_stores, self.schemas, self.fields
        )
    }
}

/// Ids locating one field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetKey {
    pub data_store_id: i64,
    pub schema_id: i64,
    pub field_id: i64,
}

impl AssetKey {
    fn from_value(value: &Value) -> Result<Self> {
        let id = |key: &str| value.get(key).and_then(Value::as_i64);
        match (id("data_store_id"), id("schema_id"), id("field_id")) {
            (Some(data_store_id), Some(schema_id), Some(field_id)) => Ok(Self {
                data_store_id,
                schema_id,
                field_id,
            }),
            _ => Err(CatalogError::InvalidInputs(
                "Impacted asset must contain the keys 'data_store_id', 'schema_id', 'field_id'"
                    .to_string(),
            )),
        }
    }
}

/// Level of detail of an impact report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ShowBy {
    #[default]
    Field,
    Schema,
}

impl FromStr for ShowBy {
    type Err = CatalogError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "field" => Ok(ShowBy::Field),
            "schema" => Ok(ShowBy::Schema),
            other => Err(CatalogError::InvalidInputs(format!(
                "show_by must be one of: \"field\" or \"schema\", value \"{}\" provided",
                other
            ))),
        }
    }
}

impl fmt::Display for ShowBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShowBy::Field => f.write_str("field"),
            ShowBy::Schema => f.write_str("schema"),
        }
    }
}

/// One affected field and the upstream chain leading to it
#[derive(Debug, Clone)]
pub struct ImpactedAsset {
    key: AssetKey,
    impact_chain: Vec<ImpactedAsset>,
    processed: bool,
    data_store: Option<Rc<DataStore>>,
    schema: Option<Rc<DataSchema>>,
    field: Option<Rc<DataField>>,
}

impl ImpactedAsset {
    /// Validate a raw asset and, recursively, every element of its chain
    pub fn from_value(value: &Value) -> Result<Self> {
        let key = AssetKey::from_value(value)?;
        let impact_chain = match value.get("impact_chain") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(chain)) => chain
                .iter()
                .map(ImpactedAsset::from_value)
                .collect::<Result<Vec<_>>>()?,
            Some(_) => {
                return Err(CatalogError::InvalidInputs(
                    "impact_chain must be a list of impacted assets".to_string(),
                ))
            }
        };
        Ok(Self {
            key,
            impact_chain,
            processed: false,
            data_store: None,
            schema: None,
            field: None,
        })
    }

    pub fn key(&self) -> AssetKey {
        self.key
    }

    pub fn impact_chain(&self) -> &[ImpactedAsset] {
        &self.impact_chain
    }

    pub fn is_processed(&self) -> bool {
        self.processed
    }

    pub fn data_store(&self) -> Option<&Rc<DataStore>> {
        self.data_store.as_ref()
    }

    pub fn schema(&self) -> Option<&Rc<DataSchema>> {
        self.schema.as_ref()
    }

    pub fn field(&self) -> Option<&Rc<DataField>> {
        self.field.as_ref()
    }

    /// Every asset of the chain, oldest ancestor first, then this asset
    pub fn flattened(&self) -> Vec<AssetKey> {
        let mut keys = Vec::with_capacity(self.impact_chain.len() + 1);
        for ancestor in &self.impact_chain {
            keys.extend(ancestor.flattened());
        }
        keys.push(self.key);
        keys
    }

    /// Resolve store, schema and field, then every chain element. A second
    /// call is a no-op.
    pub fn resolve(&mut self, catalog: &Catalog) -> Result<()> {
        if self.processed {
            return Ok(());
        }
        let cached = ResolveOptions::default().pre_fetch(false);

        self.data_store = catalog.data_store_with(self.key.data_store_id, cached)?;
        if let Some(store) = &self.data_store {
            self.schema = store.schema_with(self.key.schema_id, cached)?;
        }
        if let Some(schema) = &self.schema {
            self.field = schema.field_with(self.key.field_id, cached)?;
        }
        for ancestor in &mut self.impact_chain {
            ancestor.resolve(catalog)?;
        }
        self.processed = true;
        Ok(())
    }

    /// One line for this asset, e.g. `Data Store: events (1), Schema: raw (2)`
    pub fn pretty_print_string(&self, show_by: ShowBy) -> String {
        let mut line = format!(
            "{}, {}",
            describe("Data Store", self.data_store.as_deref(), self.key.data_store_id),
            describe("Schema", self.schema.as_deref(), self.key.schema_id),
        );
        if show_by == ShowBy::Field {
            line.push_str(", ");
            line.push_str(&describe("Field", self.field.as_deref(), self.key.field_id));
        }
        line
    }

    /// The chain as an indented arrow list ending with this asset
    pub fn pretty_print_impact(&self, show_by: ShowBy) -> String {
        self.impact_chain
            .iter()
            .map(|ancestor| ancestor.pretty_print_string(show_by))
            .chain(std::iter::once(self.pretty_print_string(show_by)))
            .enumerate()
            .map(|(depth, line)| match depth {
                0 => line,
                _ => format!("{}└-->{}", " ".repeat(depth * 4), line),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl fmt::Display for ImpactedAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pretty_print_string(ShowBy::Field))
    }
}

fn describe<T: CatalogEntity>(label: &str, entity: Option<&T>, id: i64) -> String {
    match entity.and_then(T::name) {
        Some(name) => format!("{}: {} ({})", label, name, id),
        None => format!("{} ({})", label, id),
    }
}

/// Expected impact of a change to a transformation's links
#[derive(Debug, Clone)]
pub struct LineageImpact {
    breaking: bool,
    impact_summary: LineageImpactSummary,
    impacted_assets: Vec<ImpactedAsset>,
}

impl LineageImpact {
    pub fn from_value(value: &Value) -> Result<Self> {
        let breaking = value
            .get("breaking")
            .and_then(Value::as_bool)
            .ok_or_else(|| {
                CatalogError::InvalidInputs("The field \"breaking\" must be a boolean".to_string())
            })?;
        let impact_summary =
            LineageImpactSummary::from_value(value.get("impact_summary").unwrap_or(&Value::Null))?;
        let impacted_assets = match value.get("impacted_assets") {
            Some(Value::Array(assets)) => assets
                .iter()
                .map(ImpactedAsset::from_value)
                .collect::<Result<Vec<_>>>()?,
            _ => {
                return Err(CatalogError::InvalidInputs(
                    "The field \"impacted_assets\" must be a list".to_string(),
                ))
            }
        };
        Ok(Self {
            breaking,
            impact_summary,
            impacted_assets,
        })
    }

    pub fn breaking(&self) -> bool {
        self.breaking
    }

    pub fn impact_summary(&self) -> LineageImpactSummary {
        self.impact_summary
    }

    pub fn impacted_assets(&self) -> &[ImpactedAsset] {
        &self.impacted_assets
    }

    /// Unique field ids across every unprocessed chain, first occurrence order
    pub fn unique_field_ids(&self) -> Vec<i64> {
        let mut seen = HashSet::new();
        self.impacted_assets
            .iter()
            .filter(|asset| !asset.processed)
            .flat_map(ImpactedAsset::flattened)
            .map(|key| key.field_id)
            .filter(|id| seen.insert(*id))
            .collect()
    }

    /// Bulk-load every unique field once, then resolve each asset in place
    pub fn resolve(&mut self, catalog: &Catalog) -> Result<()> {
        let field_ids = self.unique_field_ids();
        if !field_ids.is_empty() {
            debug!(fields = field_ids.len(), "Bulk loading impacted fields");
            catalog.batch_load_by_id(&BatchRequest::fields(field_ids))?;
        }
        for asset in &mut self.impacted_assets {
            asset.resolve(catalog)?;
        }
        Ok(())
    }

    /// One asset per field or per schema. A later duplicate replaces the
    /// earlier one but keeps its position.
    pub fn filtered_impacts(&self, show_by: ShowBy) -> Vec<&ImpactedAsset> {
        let mut order: Vec<i64> = Vec::new();
        let mut chosen: HashMap<i64, &ImpactedAsset> = HashMap::new();
        for asset in &self.impacted_assets {
            let key = match show_by {
                ShowBy::Field => asset.key.field_id,
                ShowBy::Schema => asset.key.schema_id,
            };
            if chosen.insert(key, asset).is_none() {
                order.push(key);
            }
        }
        order.iter().filter_map(|key| chosen.get(key).copied()).collect()
    }

    /// Report of at most `show` impacts, separated by `-----`
    pub fn all_impact_strings(&self, show_by: ShowBy, show: usize) -> String {
        let impacts: Vec<String> = self
            .filtered_impacts(show_by)
            .into_iter()
            .take(show)
            .map(|asset| asset.pretty_print_impact(show_by))
            .collect();
        format!("{}{}", IMPACT_HEADER, impacts.join(IMPACT_SEPARATOR))
    }

    pub fn impact_graph(&self) -> ImpactGraph {
        ImpactGraph::from_assets(&self.impacted_assets)
    }
}

impl fmt::Display for LineageImpact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Breaking: {}, {}", self.breaking, self.impact_summary)
    }
}
