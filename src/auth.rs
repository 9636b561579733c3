//! Basic authorization for the catalog service

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::error::{CatalogError, Result};

/// A username and API secret key pair
#[derive(Clone)]
pub struct Credentials {
    username: String,
    secret_key: String,
}

impl Credentials {
    /// Both parts must be non-empty
    pub fn new(username: impl Into<String>, secret_key: impl Into<String>) -> Result<Self> {
        let username = username.into();
        let secret_key = secret_key.into();
        if username.trim().is_empty() || secret_key.trim().is_empty() {
            return Err(CatalogError::CredentialsRequired);
        }
        Ok(Self {
            username,
            secret_key,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// `base64(username:secret_key)`
    pub fn encoded_secret(&self) -> String {
        STANDARD.encode(format!("{}:{}", self.username, self.secret_key))
    }

    pub fn authorization_header(&self) -> String {
        format!("Basic {}", self.encoded_secret())
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}
