//! Blocking HTTP transport

use std::time::Duration;

use reqwest::blocking::{multipart, Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use tracing::{debug, warn};

use super::{Query, Transport};
use crate::auth::Credentials;
use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};

/// [`Transport`] over `reqwest::blocking`
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &CatalogConfig, credentials: &Credentials) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let mut authorization = HeaderValue::from_str(&credentials.authorization_header())
            .map_err(|_| CatalogError::CredentialsRequired)?;
        authorization.set_sensitive(true);
        headers.insert(AUTHORIZATION, authorization);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(config.api.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path.trim_start_matches('/'))
    }

    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let response = request.send()?;
        let status = response.status();
        if status.as_u16() >= 400 {
            let body = response.text().unwrap_or_default();
            return Err(CatalogError::Api {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    fn decode(response: Response) -> Result<Value> {
        let bytes = response.bytes()?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

impl Transport for HttpTransport {
    fn get(&self, path: &str, query: Query<'_>) -> Result<Value> {
        debug!(path, "GET");
        let response = self.send(self.client.get(self.url(path)).query(query))?;
        Self::decode(response)
    }

    fn post(&self, path: &str, body: &Value, query: Query<'_>) -> Result<Value> {
        debug!(path, "POST");
        let response = self.send(self.client.post(self.url(path)).query(query).json(body))?;
        Self::decode(response)
    }

    fn post_file(&self, path: &str, file_name: &str, content: Vec<u8>) -> Result<Value> {
        debug!(path, file_name, bytes = content.len(), "POST multipart");
        let part = multipart::Part::bytes(content).file_name(file_name.to_string());
        let form = multipart::Form::new().part("file", part);
        let response = self.send(self.client.post(self.url(path)).multipart(form))?;
        Self::decode(response)
    }

    fn delete(&self, path: &str, body: Option<&Value>) -> Result<Option<Value>> {
        debug!(path, "DELETE");
        let mut request = self.client.delete(self.url(path));
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send()?;
        let status = response.status();
        if status.as_u16() >= 400 {
            warn!(path, status = status.as_u16(), "Delete refused");
            return Ok(None);
        }
        Self::decode(response).map(Some)
    }
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_base() {
        let mut config = CatalogConfig::default();
        config.api.host = "http://localhost:9000".to_string();
        let credentials = Credentials::new("user", "pass").unwrap();
        let transport = HttpTransport::new(&config, &credentials).unwrap();
        assert_eq!(
            transport.url("/data-stores/1"),
            "http://localhost:9000/catalog/data-stores/1"
        );
    }
}
