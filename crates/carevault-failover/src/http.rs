//! REST client for the hosted primary backend.
//!
//! Routes:
//! - `POST   {base}/collections/{c}/records`       create
//! - `GET    {base}/collections/{c}/records`       list
//! - `GET    {base}/collections/{c}/records/{id}`  get (404 means absent)
//! - `PATCH  {base}/collections/{c}/records/{id}`  update (404 means absent)
//! - `DELETE {base}/collections/{c}/records/{id}`  delete (404 means absent)

use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::backend::{validate_collection, RecordBackend};
use crate::error::{BackendError, BackendResult};
use crate::record::Record;

/// Connection settings for [`HttpBackend`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpBackendConfig {
    /// Base URL, e.g. `https://records.example.org/api`.
    pub base_url: String,
    /// Bearer token sent with every request, if set.
    pub token: Option<String>,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8090/api".to_string(),
            token: None,
            timeout_ms: 5_000,
        }
    }
}

/// The remote primary backend.
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpBackend {
    /// Builds a client for `config`.
    pub fn new(config: &HttpBackendConfig) -> BackendResult<Self> {
        let invalid = |reason: String| BackendError::InvalidUrl {
            url: config.base_url.clone(),
            reason,
        };
        let base_url = Url::parse(config.base_url.trim_end_matches('/'))
            .map_err(|e| invalid(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(invalid("URL cannot carry a path".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            client,
            base_url,
            token: config.token.clone(),
        })
    }

    /// The normalized base URL.
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Appends path segments to the base URL. Each segment is
    /// percent-encoded, so `/` or `?` inside an id cannot change the route.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn records_url(&self, collection: &str) -> Url {
        self.url(&["collections", collection, "records"])
    }

    fn record_url(&self, collection: &str, id: &str) -> Url {
        self.url(&["collections", collection, "records", id])
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> BackendResult<Response> {
        let response = self.authorize(request).send().await?;
        debug!(url = %response.url(), status = %response.status(), "primary responded");
        Ok(response)
    }
}

async fn decode_body<T: DeserializeOwned>(response: Response) -> BackendResult<T> {
    let response = ensure_success(response).await?;
    response
        .json::<T>()
        .await
        .map_err(|e| BackendError::decode(e.to_string()))
}

async fn ensure_success(response: Response) -> BackendResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let reason = if body.is_empty() {
        status.canonical_reason().unwrap_or("unknown").to_string()
    } else {
        body
    };
    Err(BackendError::Remote {
        status: status.as_u16(),
        reason,
    })
}

impl RecordBackend for HttpBackend {
    fn name(&self) -> &str {
        "http"
    }

    async fn create(&self, collection: &str, data: Value) -> BackendResult<Record> {
        validate_collection(collection)?;
        let request = self.client.post(self.records_url(collection)).json(&data);
        decode_body(self.send(request).await?).await
    }

    async fn get(&self, collection: &str, id: &str) -> BackendResult<Option<Record>> {
        validate_collection(collection)?;
        let response = self.send(self.client.get(self.record_url(collection, id))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode_body(response).await.map(Some)
    }

    async fn list(&self, collection: &str) -> BackendResult<Vec<Record>> {
        validate_collection(collection)?;
        let response = self.send(self.client.get(self.records_url(collection))).await?;
        decode_body(response).await
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> BackendResult<Option<Record>> {
        validate_collection(collection)?;
        let request = self.client.patch(self.record_url(collection, id)).json(&patch);
        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode_body(response).await.map(Some)
    }

    async fn delete(&self, collection: &str, id: &str) -> BackendResult<bool> {
        validate_collection(collection)?;
        let response = self.send(self.client.delete(self.record_url(collection, id))).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        ensure_success(response).await?;
        Ok(true)
    }
}
