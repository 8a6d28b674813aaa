//! REST client for statechart definitions and instances.
//!
//! Stateless request/response wrappers. No retries; every non-2xx response
//! becomes [`ApiError::Status`] carrying the response body.

use reqwest::header::{CONTENT_TYPE, LOCATION};
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use scxml_core::{ResourceRef, SyncError};

const CONFIGURATION_HEADER: &str = "X-Configuration";

/// Errors from the REST client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request never produced a response.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("server returned {status}: {body}")]
    Status { status: StatusCode, body: String },

    /// The body did not decode.
    #[error("invalid response body: {0}")]
    Json(#[from] serde_json::Error),
}

impl ApiError {
    /// HTTP status, when the server answered.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http(e) => e.status(),
            Self::Status { status, .. } => Some(*status),
            Self::Json(_) => None,
        }
    }

    /// Re-home this error in the sync taxonomy for `resource`.
    pub fn into_sync_error(self, resource: &ResourceRef) -> SyncError {
        match self {
            Self::Http(e) => SyncError::transport(resource, e),
            Self::Status { status, body } => SyncError::from_status(resource, status.as_u16(), &body),
            Self::Json(e) => SyncError::parse(resource, e),
        }
    }
}

/// Event sent to an instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InstanceEvent<'a> {
    /// Event name.
    pub name: &'a str,
    /// Optional event data, sent as given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<&'a str>,
}

/// Definition upload with an attached handlers module.
#[derive(Serialize)]
struct DefinitionWithHandlers<'a> {
    scxml: &'a str,
    handlers: &'a str,
}

/// List endpoints answer either with a bare array or wrapped in `data`.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListResponse {
    Plain(Vec<String>),
    Wrapped { data: ListData },
}

#[derive(Deserialize)]
struct ListData {
    #[serde(alias = "charts", alias = "instances")]
    items: Vec<String>,
}

impl ListResponse {
    fn into_items(self) -> Vec<String> {
        match self {
            Self::Plain(items) | Self::Wrapped { data: ListData { items } } => items,
        }
    }
}

/// Typed client for the statechart REST API.
#[derive(Clone, Debug)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    /// Client rooted at `base_url`, e.g. `http://localhost:8002/api/v1`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Same as [`ApiClient::new`] with a caller-built HTTP client.
    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    /// Root URL requests are built from.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    /// Create or replace the definition `name`.
    ///
    /// Sent as `application/xml`, or as JSON `{scxml, handlers}` when a
    /// handlers module is attached. Returns the `Location` header.
    pub async fn save_definition(
        &self,
        name: &str,
        scxml: &str,
        handlers: Option<&str>,
    ) -> Result<Option<String>, ApiError> {
        let req = self.http.put(self.url(name));
        let req = match handlers {
            Some(handlers) => req.json(&DefinitionWithHandlers { scxml, handlers }),
            None => req.header(CONTENT_TYPE, "application/xml").body(scxml.to_string()),
        };
        debug!(name, with_handlers = handlers.is_some(), "saving definition");
        let resp = check(req.send().await?).await?;
        Ok(header(&resp, LOCATION.as_str()))
    }

    /// Definition document text.
    pub async fn get_definition(&self, name: &str) -> Result<String, ApiError> {
        let resp = check(self.http.get(self.url(name)).send().await?).await?;
        Ok(resp.text().await?)
    }

    /// Names of all saved definitions.
    pub async fn list_definitions(&self) -> Result<Vec<String>, ApiError> {
        self.list("_all_statechart_definitions").await
    }

    /// Ids of the instances of definition `name`.
    pub async fn list_instances(&self, name: &str) -> Result<Vec<String>, ApiError> {
        self.list(&format!("{name}/_all_instances")).await
    }

    async fn list(&self, path: &str) -> Result<Vec<String>, ApiError> {
        let resp = check(self.http.get(self.url(path)).send().await?).await?;
        let body = resp.text().await?;
        let list: ListResponse = serde_json::from_str(&body)?;
        Ok(list.into_items())
    }

    /// Start an instance of `name`, server-named unless `id` is given.
    ///
    /// Returns the `Location` header naming the new instance.
    pub async fn create_instance(&self, name: &str, id: Option<&str>) -> Result<Option<String>, ApiError> {
        let req = match id {
            Some(id) => self.http.put(self.url(&format!("{name}/{id}"))),
            None => self.http.post(self.url(name)),
        };
        let resp = check(req.send().await?).await?;
        Ok(header(&resp, LOCATION.as_str()))
    }

    /// Current configuration of an instance as the server reports it.
    pub async fn get_instance(&self, name: &str, id: &str) -> Result<Value, ApiError> {
        let resp = check(self.http.get(self.url(&format!("{name}/{id}"))).send().await?).await?;
        let body = resp.text().await?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Send an event to an instance. Returns the `X-Configuration` header.
    pub async fn send_event(
        &self,
        name: &str,
        id: &str,
        event: &InstanceEvent<'_>,
    ) -> Result<Option<String>, ApiError> {
        debug!(name, id, event = event.name, "sending event");
        let req = self.http.post(self.url(&format!("{name}/{id}"))).json(event);
        let resp = check(req.send().await?).await?;
        Ok(header(&resp, CONFIGURATION_HEADER))
    }

    /// Delete a definition (with its instances) or a single instance.
    pub async fn delete(&self, resource: &ResourceRef) -> Result<(), ApiError> {
        let _ = check(self.http.delete(self.url(&resource.resource_path())).send().await?).await?;
        Ok(())
    }
}

async fn check(resp: Response) -> Result<Response, ApiError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(ApiError::Status { status, body })
}

fn header(resp: &Response, name: &str) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}
