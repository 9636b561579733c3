//! Error types for the catalog client

use thiserror::Error;

use crate::entity::descriptor::EntityKind;

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Catalog client errors
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Top-level constructor input was not an id, a name or an attribute map
    #[error("Invalid inputs: {0}")]
    InvalidInputs(String),

    /// A creation payload or server record is missing or mistyped a field
    #[error("Invalid field inputs: {0}")]
    InvalidFieldInputs(String),

    /// No link normalization shape matched
    #[error("Invalid links: {0}")]
    InvalidLinks(String),

    #[error("The {kind} requested: {input} does not exist")]
    DoesNotExist { kind: EntityKind, input: String },

    /// The remote service answered with a status >= 400
    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Must provide a username and API secret key")]
    CredentialsRequired,

    #[error("Invalid manifest: {0}")]
    ManifestInvalid(String),

    #[error("No manifest has been parsed: {0}")]
    ManifestNotParsed(String),

    #[error("Invalid manifest parse status: {0}")]
    InvalidManifestStatus(String),

    #[error("Manifest parse did not complete within {0} seconds")]
    ManifestParseTimeout(u64),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config_crate::ConfigError),
}

impl CatalogError {
    /// Whether this is a 404 answer from the remote service
    pub fn is_not_found(&self) -> bool {
        matches!(self, CatalogError::Api { status: 404, .. })
    }

    pub(crate) fn does_not_exist(kind: EntityKind, input: impl std::fmt::Display) -> Self {
        CatalogError::DoesNotExist {
            kind,
            input: input.to_string(),
        }
    }
}
