//! Shared resolution context handed to every entity and collection

use std::rc::Rc;

use crate::config::CatalogConfig;
use crate::error::Result;
use crate::transport::{HttpTransport, Transport};

/// Transport plus resolution settings. Cloning shares the transport.
#[derive(Clone)]
pub struct Session {
    transport: Rc<dyn Transport>,
    batch_size: usize,
    pre_fetch: bool,
}

impl Session {
    pub fn new(transport: Rc<dyn Transport>) -> Self {
        Self {
            transport,
            batch_size: 100,
            pre_fetch: true,
        }
    }

    /// HTTP session built from configuration; fails without credentials
    pub fn from_config(config: &CatalogConfig) -> Result<Self> {
        let credentials = config.credentials()?;
        let transport = HttpTransport::new(config, &credentials)?;
        Ok(Self {
            transport: Rc::new(transport),
            batch_size: config.resolution.batch_size.max(1),
            pre_fetch: config.resolution.pre_fetch,
        })
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_pre_fetch(mut self, pre_fetch: bool) -> Self {
        self.pre_fetch = pre_fetch;
        self
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn pre_fetch(&self) -> bool {
        self.pre_fetch
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("batch_size", &self.batch_size)
            .field("pre_fetch", &self.pre_fetch)
            .finish_non_exhaustive()
    }
}
