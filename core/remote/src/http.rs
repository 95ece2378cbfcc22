//! HTTP adapter for the row-oriented data service.

use async_trait::async_trait;
use reqwest::{header, Client, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tracing::debug;

use outpost_common::{Error, Result, WriteAction};

use crate::backend::RemoteBackend;

/// Configuration for the HTTP backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpBackendConfig {
    /// Base URL of the data service, e.g. `https://api.example.com/rest`.
    pub base_url: String,
    /// Bearer token attached to every request. Supplied and refreshed by
    /// the session collaborator; `None` sends unauthenticated requests.
    pub auth_token: Option<String>,
    /// Transport-level request timeout.
    pub timeout: Duration,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            auth_token: None,
            timeout: Duration::from_secs(10),
        }
    }
}

/// HTTP implementation of [`RemoteBackend`].
///
/// Maps writes onto the service's per-collection REST verbs:
/// `POST /{collection}` insert, `PATCH` update (`{"match", "set"}` body),
/// `DELETE` (`{"match"}` body), `PUT` upsert, `GET ?filter=` select.
pub struct HttpBackend {
    http: Client,
    config: HttpBackendConfig,
}

impl HttpBackend {
    /// Create a new backend from config.
    pub fn new(config: HttpBackendConfig) -> Self {
        let http = Client::builder()
            .user_agent("Outpost/0.1")
            .timeout(config.timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self { http, config }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            collection
        )
    }

    fn request(&self, method: Method, collection: &str) -> reqwest::RequestBuilder {
        let mut builder = self.http.request(method, self.collection_url(collection));
        if let Some(token) = &self.config.auth_token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder
    }

    async fn handle_response(&self, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if status.is_success() {
            return response
                .json()
                .await
                .map_err(|e| Error::Serialization(format!("Malformed response body: {}", e)));
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(Error::NotFound(body)),
            _ => Err(Error::RemoteUnavailable(format!(
                "Backend returned {}: {}",
                status, body
            ))),
        }
    }
}

#[async_trait]
impl RemoteBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn execute(&self, collection: &str, action: &WriteAction) -> Result<Option<Value>> {
        debug!(collection, kind = action.kind(), "Dispatching remote write");

        let builder = match action {
            WriteAction::Insert { record } => {
                self.request(Method::POST, collection).json(record)
            }
            WriteAction::Update { criteria, patch } => self
                .request(Method::PATCH, collection)
                .json(&json!({"match": criteria, "set": patch})),
            WriteAction::Delete { criteria } => self
                .request(Method::DELETE, collection)
                .json(&json!({"match": criteria})),
            WriteAction::Upsert { record } => {
                self.request(Method::PUT, collection).json(record)
            }
        };

        let response = builder
            .send()
            .await
            .map_err(|e| Error::RemoteUnavailable(format!("Request failed: {}", e)))?;

        match action {
            WriteAction::Delete { .. } => {
                let status = response.status();
                if status.is_success() || status == StatusCode::NOT_FOUND {
                    // Deleting an already-deleted row is a replay no-op.
                    Ok(None)
                } else {
                    let body = response.text().await.unwrap_or_default();
                    Err(Error::RemoteUnavailable(format!(
                        "Backend returned {}: {}",
                        status, body
                    )))
                }
            }
            _ => Ok(Some(self.handle_response(response).await?)),
        }
    }

    async fn query(&self, collection: &str, filter: Option<&Value>) -> Result<Vec<Value>> {
        let mut builder = self.request(Method::GET, collection);
        if let Some(filter) = filter {
            let encoded = serde_json::to_string(filter)
                .map_err(|e| Error::Serialization(e.to_string()))?;
            builder = builder.query(&[("filter", encoded)]);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| Error::RemoteUnavailable(format!("Request failed: {}", e)))?;

        let body = self.handle_response(response).await?;
        match body {
            Value::Array(rows) => Ok(rows),
            other => Err(Error::Serialization(format!(
                "Expected a row array, got: {}",
                other
            ))),
        }
    }
}
