//! Scripted in-memory transport for tests
//!
//! Responses are either queued (consumed once, in order) or routed (returned
//! for every matching request). Queued responses win over routes. An
//! unmatched request answers like the service would for a missing resource:
//! a 404 for reads and writes, a refused delete.

use std::cell::RefCell;
use std::rc::Rc;

use serde_json::Value;

use crate::error::{CatalogError, Result};
use crate::session::Session;
use crate::transport::{Query, Transport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    PostFile,
    Delete,
}

/// A request seen by the mock
#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl Call {
    pub fn query_value(&self, key: &str) -> Option<String> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }
}

#[derive(Debug, Clone)]
enum Reply {
    Json(Value),
    Status(u16),
    Refused,
}

#[derive(Debug)]
struct Expectation {
    method: Method,
    path: String,
    query: Option<(String, String)>,
    reply: Reply,
    persistent: bool,
}

impl Expectation {
    fn matches(&self, method: Method, path: &str, query: &[(String, String)]) -> bool {
        self.method == method
            && self.path == path
            && self
                .query
                .as_ref()
                .map(|expected| query.iter().any(|pair| pair == expected))
                .unwrap_or(true)
    }
}

#[derive(Debug, Default)]
pub struct MockTransport {
    expectations: RefCell<Vec<Expectation>>,
    calls: RefCell<Vec<Call>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// A shared mock and a session over it
    pub fn session() -> (Rc<MockTransport>, Session) {
        let transport = Rc::new(MockTransport::new());
        let session = Session::new(transport.clone());
        (transport, session)
    }

    fn expect(
        &self,
        method: Method,
        path: &str,
        query: Option<(&str, &str)>,
        reply: Reply,
        persistent: bool,
    ) {
        self.expectations.borrow_mut().push(Expectation {
            method,
            path: path.to_string(),
            query: query.map(|(k, v)| (k.to_string(), v.to_string())),
            reply,
            persistent,
        });
    }

    pub fn push_get(&self, path: &str, response: Value) {
        self.expect(Method::Get, path, None, Reply::Json(response), false);
    }

    /// Queue a response for a GET carrying `key=value` in its query
    pub fn push_get_query(&self, path: &str, key: &str, value: &str, response: Value) {
        self.expect(Method::Get, path, Some((key, value)), Reply::Json(response), false);
    }

    pub fn route_get(&self, path: &str, response: Value) {
        self.expect(Method::Get, path, None, Reply::Json(response), true);
    }

    pub fn route_get_query(&self, path: &str, key: &str, value: &str, response: Value) {
        self.expect(Method::Get, path, Some((key, value)), Reply::Json(response), true);
    }

    pub fn push_post(&self, path: &str, response: Value) {
        self.expect(Method::Post, path, None, Reply::Json(response), false);
    }

    pub fn route_post(&self, path: &str, response: Value) {
        self.expect(Method::Post, path, None, Reply::Json(response), true);
    }

    pub fn push_post_file(&self, path: &str, response: Value) {
        self.expect(Method::PostFile, path, None, Reply::Json(response), false);
    }

    /// `None` scripts a refused delete
    pub fn push_delete(&self, path: &str, response: Option<Value>) {
        let reply = response.map(Reply::Json).unwrap_or(Reply::Refused);
        self.expect(Method::Delete, path, None, reply, false);
    }

    /// Queue an error status for the next matching request
    pub fn push_status(&self, method: Method, path: &str, status: u16) {
        self.expect(method, path, None, Reply::Status(status), false);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| call.method == method && call.path == path)
            .count()
    }

    /// Number of full listings started for a collection
    pub fn paginated_fetches(&self, path: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|call| {
                call.method == Method::Get
                    && call.path == path
                    && call.query_value("page").as_deref() == Some("1")
            })
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn respond(
        &self,
        method: Method,
        path: &str,
        query: Query<'_>,
        body: Option<&Value>,
    ) -> Reply {
        let query: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        self.calls.borrow_mut().push(Call {
            method,
            path: path.to_string(),
            query: query.clone(),
            body: body.cloned(),
        });

        let mut expectations = self.expectations.borrow_mut();
        let queued = expectations
            .iter()
            .position(|e| !e.persistent && e.matches(method, path, &query));
        if let Some(index) = queued {
            return expectations.remove(index).reply;
        }

        expectations
            .iter()
            .find(|e| e.persistent && e.matches(method, path, &query))
            .map(|e| e.reply.clone())
            .unwrap_or(match method {
                Method::Delete => Reply::Refused,
                _ => Reply::Status(404),
            })
    }

    fn into_result(reply: Reply, path: &str) -> Result<Value> {
        match reply {
            Reply::Json(value) => Ok(value),
            Reply::Status(status) => Err(CatalogError::Api {
                status,
                body: format!("no scripted response for {}", path),
            }),
            Reply::Refused => Err(CatalogError::Api {
                status: 400,
                body: format!("refused {}", path),
            }),
        }
    }
}

impl Transport for MockTransport {
    fn get(&self, path: &str, query: Query<'_>) -> Result<Value> {
        let reply = self.respond(Method::Get, path, query, None);
        Self::into_result(reply, path)
    }

    fn post(&self, path: &str, body: &Value, query: Query<'_>) -> Result<Value> {
        let reply = self.respond(Method::Post, path, query, Some(body));
        Self::into_result(reply, path)
    }

    fn post_file(&self, path: &str, file_name: &str, content: Vec<u8>) -> Result<Value> {
        let body = serde_json::json!({
            "file_name": file_name,
            "size": content.len(),
        });
        let reply = self.respond(Method::PostFile, path, &[], Some(&body));
        Self::into_result(reply, path)
    }

    fn delete(&self, path: &str, body: Option<&Value>) -> Result<Option<Value>> {
        match self.respond(Method::Delete, path, &[], body) {
            Reply::Json(value) => Ok(Some(value)),
            Reply::Status(_) | Reply::Refused => Ok(None),
        }
    }
}
