//! dbt manifest ingestion for a data store
//!
//! The service parses an uploaded `manifest.json` asynchronously. A parse is
//! started with [`ManifestIngestion::parse_manifest`], polled until it leaves
//! the `waiting` state, and its results are then saved with
//! [`ManifestIngestion::save_results`].

use std::fmt;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::endpoints;
use crate::error::{CatalogError, Result};
use crate::session::Session;

const MANIFEST_FILE_NAME: &str = "manifest.json";

/// Default upper bound for [`ManifestIngestion::wait_for_parse`]
pub const DEFAULT_PARSE_WAIT_SECS: u64 = 360;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestParseStatus {
    Waiting,
    Parsed,
    Processed,
    Error,
    Success,
    Other(String),
}

impl ManifestParseStatus {
    fn parse(status: &str) -> Self {
        match status {
            "waiting" => ManifestParseStatus::Waiting,
            "parsed" => ManifestParseStatus::Parsed,
            "processed" => ManifestParseStatus::Processed,
            "error" => ManifestParseStatus::Error,
            "success" => ManifestParseStatus::Success,
            other => ManifestParseStatus::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ManifestParseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManifestParseStatus::Waiting => f.write_str("waiting"),
            ManifestParseStatus::Parsed => f.write_str("parsed"),
            ManifestParseStatus::Processed => f.write_str("processed"),
            ManifestParseStatus::Error => f.write_str("error"),
            ManifestParseStatus::Success => f.write_str("success"),
            ManifestParseStatus::Other(status) => f.write_str(status),
        }
    }
}

/// Which parse results to save
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SaveOptions {
    pub add_schemas_fields: bool,
    pub update_descriptions: bool,
    pub update_tags: bool,
    pub add_lineage: bool,
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            add_schemas_fields: false,
            update_descriptions: false,
            update_tags: true,
            add_lineage: true,
        }
    }
}

#[derive(Debug)]
pub struct ManifestIngestion {
    data_store_id: i64,
    session: Session,
    poll_interval: Duration,
    process_id: Option<String>,
    status: Option<ManifestParseStatus>,
    error_message: Option<String>,
    parsed_schemas: Value,
    parsed_lineage: Value,
}

impl ManifestIngestion {
    pub fn new(data_store_id: i64, session: Session) -> Self {
        Self {
            data_store_id,
            session,
            poll_interval: Duration::from_secs(1),
            process_id: None,
            status: None,
            error_message: None,
            parsed_schemas: Value::Null,
            parsed_lineage: Value::Null,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn data_store_id(&self) -> i64 {
        self.data_store_id
    }

    pub fn process_id(&self) -> Option<&str> {
        self.process_id.as_deref()
    }

    /// Last status seen by [`Self::parse_status`]
    pub fn status(&self) -> Option<&ManifestParseStatus> {
        self.status.as_ref()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    pub fn parsed_schemas(&self) -> &Value {
        &self.parsed_schemas
    }

    pub fn parsed_lineage(&self) -> &Value {
        &self.parsed_lineage
    }

    /// Upload a manifest read from disk
    pub fn parse_manifest_file(&mut self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(CatalogError::ManifestInvalid(format!(
                "Could not find a file at {}",
                path.display()
            )));
        }
        self.parse_manifest(fs::read(path)?)
    }

    /// Upload manifest content; returns the parse process id
    pub fn parse_manifest(&mut self, content: Vec<u8>) -> Result<String> {
        if serde_json::from_slice::<Value>(&content).is_err() {
            return Err(CatalogError::ManifestInvalid(
                "The manifest must be valid JSON".to_string(),
            ));
        }

        let response = self.session.transport().post_file(
            &endpoints::parse_manifest(self.data_store_id),
            MANIFEST_FILE_NAME,
            content,
        )?;
        let process_id = match response.get("dbt_process_id") {
            Some(Value::String(id)) => id.clone(),
            Some(Value::Number(id)) => id.to_string(),
            _ => {
                return Err(CatalogError::Api {
                    status: 200,
                    body: format!("manifest upload returned no dbt_process_id: {}", response),
                })
            }
        };

        info!(data_store_id = self.data_store_id, process_id = %process_id, "Manifest uploaded");
        self.process_id = Some(process_id.clone());
        self.status = None;
        Ok(process_id)
    }

    /// Fetch the parse status and cache any results
    pub fn parse_status(&mut self) -> Result<ManifestParseStatus> {
        let process_id = self.process_id.clone().ok_or_else(|| {
            CatalogError::ManifestNotParsed(
                "Parse a dbt manifest before requesting its status".to_string(),
            )
        })?;

        let response = self.session.transport().get(
            endpoints::DBT_PARSE_RESULTS,
            &[("dbt_process_id", process_id)],
        )?;
        let status = ManifestParseStatus::parse(
            response.get("status").and_then(Value::as_str).unwrap_or_default(),
        );
        self.error_message = response
            .get("error_msg")
            .and_then(Value::as_str)
            .map(str::to_string);
        self.parsed_schemas = response.get("dbt_schemas").cloned().unwrap_or(Value::Null);
        self.parsed_lineage = response.get("dbt_lineage").cloned().unwrap_or(Value::Null);
        self.status = Some(status.clone());
        Ok(status)
    }

    /// Poll until the parse leaves `waiting`, for at most `max_secs`
    pub fn wait_for_parse(&mut self, max_secs: u64) -> Result<ManifestParseStatus> {
        let started = Instant::now();
        let limit = Duration::from_secs(max_secs);
        loop {
            let status = self.parse_status()?;
            if status != ManifestParseStatus::Waiting {
                return Ok(status);
            }
            debug!(status = %status, elapsed = ?started.elapsed(), "Manifest parse pending");
            if started.elapsed() >= limit {
                return Err(CatalogError::ManifestParseTimeout(max_secs));
            }
            thread::sleep(self.poll_interval);
        }
    }

    /// Save parse results; only allowed once the parse reports `parsed`
    pub fn save_results(&mut self, options: SaveOptions) -> Result<bool> {
        let process_id = match (&self.process_id, &self.status) {
            (Some(process_id), Some(ManifestParseStatus::Parsed)) => process_id.clone(),
            (None, _) | (_, None) => {
                return Err(CatalogError::InvalidManifestStatus(
                    "A manifest must be parsed and its status checked before saving".to_string(),
                ))
            }
            (_, Some(ManifestParseStatus::Waiting)) => {
                return Err(CatalogError::InvalidManifestStatus(
                    "The parse has not completed; wait for the status to become \"parsed\""
                        .to_string(),
                ))
            }
            (_, Some(ManifestParseStatus::Error)) => {
                return Err(CatalogError::InvalidManifestStatus(format!(
                    "The parse returned an error: {}",
                    self.error_message.as_deref().unwrap_or("unknown error")
                )))
            }
            (_, Some(ManifestParseStatus::Processed)) => {
                return Err(CatalogError::InvalidManifestStatus(
                    "This manifest has already been processed and saved".to_string(),
                ))
            }
            (_, Some(other)) => {
                return Err(CatalogError::InvalidManifestStatus(format!(
                    "Unknown parse status found: {}",
                    other
                )))
            }
        };

        let mut body = serde_json::to_value(options)?;
        body["dbt_process_id"] = json!(process_id);
        let response = self
            .session
            .transport()
            .post(endpoints::DBT_SAVE_RESULTS, &body, &[])?;
        let saved = response.get("dbt_process_id").is_some();
        info!(process_id = %process_id, saved, "Saved manifest parse results");
        Ok(saved)
    }
}
