//! Authenticated requests against the HighLevel REST API
//!
//! [`HighLevelClient`] resolves a valid access token through the
//! [`TokenManager`] on every call, so callers never handle refreshes
//! themselves.

use crate::auth::TokenManager;
use crate::config::OAuthConfig;
use crate::error::{HighLevelError, Result};
use crate::pagination::{Cursor, PageStrategy};
use reqwest::Method;
use reqwest::header::HeaderMap;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;

/// Successful API response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers
    pub headers: HeaderMap,
    /// Raw response body
    pub body: String,
}

impl ApiResponse {
    /// Deserialize the body as JSON
    ///
    /// # Errors
    ///
    /// Returns [`HighLevelError::Json`] if the body does not match `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// The raw body
    #[must_use]
    pub fn text(&self) -> &str {
        &self.body
    }
}

#[derive(Debug)]
struct ClientInner {
    http_client: reqwest::Client,
    tokens: Arc<TokenManager>,
    api_base_url: String,
    api_version: String,
}

/// Client for the HighLevel API v2
///
/// Cheap to clone; clones share the HTTP connection pool and token manager.
#[derive(Debug, Clone)]
pub struct HighLevelClient {
    inner: Arc<ClientInner>,
}

impl HighLevelClient {
    /// Create a client
    ///
    /// # Errors
    ///
    /// Returns [`HighLevelError::Configuration`] if the HTTP client cannot be built.
    pub fn new(tokens: Arc<TokenManager>, config: &OAuthConfig) -> Result<Self> {
        let http_client = config.http_client()?;
        Ok(Self::with_http_client(tokens, config, http_client))
    }

    /// Create a client sharing an existing HTTP client
    #[must_use]
    pub fn with_http_client(
        tokens: Arc<TokenManager>,
        config: &OAuthConfig,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                http_client,
                tokens,
                api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
                api_version: config.api_version.clone(),
            }),
        }
    }

    /// The token manager backing this client
    #[must_use]
    pub fn tokens(&self) -> &Arc<TokenManager> {
        &self.inner.tokens
    }

    /// Send a request to `path`
    ///
    /// `path` is relative to the API base URL; absolute URLs (such as a
    /// `nextPageUrl`) are used as given. GET and DELETE send `params` as the
    /// query string, other methods as a JSON body.
    ///
    /// # Errors
    ///
    /// - [`HighLevelError::Api`] for HTTP status >= 400
    /// - [`HighLevelError::Transport`] on network failure or timeout
    /// - token errors from [`TokenManager::valid_token`]
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: Option<&Value>,
    ) -> Result<ApiResponse> {
        let token = self.inner.tokens.valid_token().await?;
        let url = self.url_for(path);

        let mut request = self
            .inner
            .http_client
            .request(method.clone(), &url)
            .header("Authorization", token.authorization_header())
            .header("Version", &self.inner.api_version)
            .header("Accept", "application/json");

        if let Some(params) = params {
            if method == Method::GET || method == Method::DELETE {
                request = request.query(&query_pairs(params));
            } else {
                request = request.json(params);
            }
        }

        tracing::debug!(method = %method, path = %path, "Calling HighLevel API");

        let response = request.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;

        if status >= 400 {
            tracing::warn!(method = %method, path = %path, status = status, "HighLevel API call failed");
            return Err(HighLevelError::api(status, method.as_str(), path, body));
        }

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }

    /// GET `path` with optional query parameters
    ///
    /// # Errors
    ///
    /// See [`HighLevelClient::request`].
    pub async fn get(&self, path: &str, params: Option<&Value>) -> Result<ApiResponse> {
        self.request(Method::GET, path, params).await
    }

    /// POST a JSON body to `path`
    ///
    /// # Errors
    ///
    /// See [`HighLevelClient::request`].
    pub async fn post(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        self.request(Method::POST, path, Some(body)).await
    }

    /// PUT a JSON body to `path`
    ///
    /// # Errors
    ///
    /// See [`HighLevelClient::request`].
    pub async fn put(&self, path: &str, body: &Value) -> Result<ApiResponse> {
        self.request(Method::PUT, path, Some(body)).await
    }

    /// DELETE `path`
    ///
    /// # Errors
    ///
    /// See [`HighLevelClient::request`].
    pub async fn delete(&self, path: &str, params: Option<&Value>) -> Result<ApiResponse> {
        self.request(Method::DELETE, path, params).await
    }

    /// Page through a list endpoint
    #[must_use]
    pub fn cursor(&self, path: &str, params: Map<String, Value>, strategy: PageStrategy) -> Cursor {
        Cursor::new(self.clone(), path, params, strategy)
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!(
                "{}/{}",
                self.inner.api_base_url,
                path.trim_start_matches('/')
            )
        }
    }
}

/// Flatten a JSON object into query pairs
///
/// Arrays repeat the key, nulls are dropped, nested objects are sent as JSON.
fn query_pairs(params: &Value) -> Vec<(String, String)> {
    let Some(object) = params.as_object() else {
        return Vec::new();
    };

    let scalar = |value: &Value| match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    };

    let mut pairs = Vec::with_capacity(object.len());
    for (key, value) in object {
        match value {
            Value::Array(items) => {
                pairs.extend(items.iter().filter_map(scalar).map(|v| (key.clone(), v)));
            }
            other => {
                if let Some(v) = scalar(other) {
                    pairs.push((key.clone(), v));
                }
            }
        }
    }
    pairs
}
