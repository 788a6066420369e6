//! HTTP client for communicating with the Civica API server.

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// API response wrapper matching the server's envelope.
#[derive(Debug, serde::Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub error_code: Option<String>,
}

/// Errors surfaced by [`ApiClient`].
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("failed to build HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("{method} {url} failed: {source}")]
    Transport {
        method: Method,
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("API error ({status}){}: {message}", .code.as_deref().map(|c| format!(" [{}]", c)).unwrap_or_default())]
    Api {
        status: StatusCode,
        code: Option<String>,
        message: String,
    },

    #[error("failed to parse response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("API returned success but no data")]
    EmptyData,
}

impl ClientError {
    /// Whether the server rejected the caller's credentials or permissions.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            Self::Api { status, .. } if *status == StatusCode::UNAUTHORIZED || *status == StatusCode::FORBIDDEN
        )
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

/// HTTP client for the Civica API.
pub struct ApiClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create a new API client pointing at the given base URL.
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(ClientError::Build)?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// Return the configured base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> (RequestBuilder, String) {
        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.request(method, &url);
        if let Some(token) = &self.token {
            builder = builder.bearer_auth(token);
        }
        (builder, url)
    }

    /// Send a request and unwrap the `data` field of the envelope.
    async fn send<T: DeserializeOwned>(&self, method: Method, url: String, builder: RequestBuilder) -> Result<T> {
        let resp = builder.send().await.map_err(|source| ClientError::Transport {
            method,
            url: url.clone(),
            source,
        })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let envelope: Option<ApiResponse<serde_json::Value>> = serde_json::from_str(&body).ok();
            let (code, message) = match envelope {
                Some(env) => (env.error_code, env.error.unwrap_or(body)),
                None => (None, body),
            };
            return Err(ClientError::Api {
                status,
                code,
                message,
            });
        }

        let api_resp: ApiResponse<T> = resp
            .json()
            .await
            .map_err(|source| ClientError::Decode { url, source })?;

        if api_resp.success {
            api_resp.data.ok_or(ClientError::EmptyData)
        } else {
            Err(ClientError::Api {
                status,
                code: api_resp.error_code,
                message: api_resp.error.unwrap_or_else(|| "Unknown error".into()),
            })
        }
    }

    /// Perform a GET request with query parameters.
    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(String, String)]) -> Result<T> {
        let (builder, url) = self.request(Method::GET, path);
        self.send(Method::GET, url, builder.query(query)).await
    }

    /// Perform a POST request with a JSON body.
    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let (builder, url) = self.request(Method::POST, path);
        self.send(Method::POST, url, builder.json(body)).await
    }

    /// Perform a PUT request with a JSON body.
    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let (builder, url) = self.request(Method::PUT, path);
        self.send(Method::PUT, url, builder.json(body)).await
    }

    /// Perform a DELETE request.
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let (builder, url) = self.request(Method::DELETE, path);
        self.send(Method::DELETE, url, builder).await
    }

    /// Perform a raw GET request and return the full JSON value (for health endpoint).
    pub async fn get_raw(&self, path: &str) -> Result<serde_json::Value> {
        let (builder, url) = self.request(Method::GET, path);
        let resp = builder.send().await.map_err(|source| ClientError::Transport {
            method: Method::GET,
            url: url.clone(),
            source,
        })?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ClientError::Api {
                status,
                code: None,
                message,
            });
        }

        resp.json()
            .await
            .map_err(|source| ClientError::Decode { url, source })
    }
}
