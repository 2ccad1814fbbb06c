//! Common utilities for the inventory API client
//!
//! Provides the authenticated HTTP wrapper and status classification shared
//! by every endpoint.

use crate::error::InventoryError;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Paginated response wrapper from the inventory API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedResponse<T> {
    pub count: u64,
    pub next: Option<String>,
    pub previous: Option<String>,
    pub results: Vec<T>,
}

/// HTTP client wrapper with authentication
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpClient {
    /// Create a new HTTP client wrapper
    pub fn new(client: Client, base_url: String, token: String) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Build a full URL from a path
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Get authorization header value
    pub fn auth_header(&self) -> String {
        format!("Token {}", self.token)
    }

    /// Make a GET request
    pub async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T, InventoryError> {
        let url = self.build_url(path);
        debug!("GET {}", url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(InventoryError::from_transport)?;

        let response = check_status("GET", path, response).await?;
        decode(path, response).await
    }

    /// Make a POST request and decode the JSON reply
    pub async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &serde_json::Value,
    ) -> Result<T, InventoryError> {
        let response = self.send_post(path, body).await?;
        decode(path, response).await
    }

    /// Make a POST request whose reply body is ignored
    pub async fn post_discard(&self, path: &str, body: &serde_json::Value) -> Result<(), InventoryError> {
        self.send_post(path, body).await.map(|_| ())
    }

    async fn send_post(&self, path: &str, body: &serde_json::Value) -> Result<Response, InventoryError> {
        let url = self.build_url(path);
        debug!("POST {} with body: {}", url, body);

        let response = self
            .client
            .post(&url)
            .header("Authorization", self.auth_header())
            .header("Accept", "application/json")
            .json(body)
            .send()
            .await
            .map_err(InventoryError::from_transport)?;

        check_status("POST", path, response).await
    }

    /// Build query string from filters
    pub fn build_query_string(&self, filters: &[(&str, &str)]) -> String {
        filters
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&")
    }
}

/// Map a non-success status onto the error taxonomy.
async fn check_status(method: &str, path: &str, response: Response) -> Result<Response, InventoryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = format!("{} {} failed: {} - {}", method, path, status, body);
    Err(match status {
        StatusCode::NOT_FOUND => InventoryError::NotFound(detail),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => InventoryError::Authentication(detail),
        s if s.is_server_error() => InventoryError::Unavailable(detail),
        _ => InventoryError::Api(detail),
    })
}

async fn decode<T: for<'de> Deserialize<'de>>(path: &str, response: Response) -> Result<T, InventoryError> {
    let text = response.text().await.map_err(InventoryError::from_transport)?;
    serde_json::from_str(&text).map_err(|e| {
        InventoryError::Api(format!(
            "error decoding response body for {}: {} - Response (first 500 chars): {}",
            path,
            e,
            text.chars().take(500).collect::<String>()
        ))
    })
}
