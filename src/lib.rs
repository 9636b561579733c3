//! Data Catalog Client
//!
//! A client SDK for a remote data catalog service. Catalog assets (data
//! stores, schemas, fields, field values, transformations and their links)
//! are exposed as identity-mapped entities: within one parent's cache there
//! is at most one live object per id, whether it was reached by id, by name
//! or through a get-or-create attribute map.
//!
//! ## Features
//!
//! - **Get-or-create resolution**: look up by id or name, or hand over
//!   attributes and let the service match or create the asset
//! - **Lazy hierarchy**: child caches are filled on first use, with one
//!   paginated listing per parent unless a refresh is forced
//! - **Link reconciliation**: append links to a transformation or replace
//!   its whole link set
//! - **Lineage impact**: check which downstream fields a link change breaks,
//!   resolved with one bulk load
//!
//! ## Architecture
//!
//! ```text
//! Catalog
//! ├── users
//! ├── data stores
//! │   └── schemas
//! │       └── fields
//! │           └── field values
//! └── transformations
//!     └── links
//! ```

pub mod auth;
pub mod catalog;
pub mod config;
pub mod endpoints;
pub mod entity;
pub mod error;
pub mod lineage;
pub mod manifest;
pub mod session;
pub mod testutils;
pub mod transport;

pub use auth::Credentials;
pub use catalog::{
    BatchLoadSummary, Catalog, DataField, DataSchema, DataStore, FieldValue, LinkInput, LinkSpec,
    Tagged, Transformation, TransformationLink, User,
};
pub use config::CatalogConfig;
pub use entity::{AsEntityId, CatalogEntity, EntityInput, Record, ResolveOptions};
pub use error::{CatalogError, Result};
pub use lineage::{ImpactGraph, ImpactedAsset, LineageImpact, LineageImpactSummary, ShowBy};
pub use manifest::{ManifestIngestion, ManifestParseStatus, SaveOptions};
pub use session::Session;
pub use transport::{BatchRequest, HttpTransport, Transport};
