//! ============================================================================
//! ApiClient - Authenticated fetch boundary
//! ============================================================================
//! Every store talks to the API through here:
//! - resolves endpoints against the configured base URL
//! - attaches `Authorization: Bearer <access token>` when signed in
//! - sends JSON unless the caller overrides Content-Type
//! - turns non-2xx responses into `ApiError::Http`
//!
//! 401 handling (refresh + one replay) lives in `refresh.rs`.
//! ============================================================================

use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

use crate::config::ClientConfig;
use crate::error::ApiError;
use crate::session::SessionManager;
use crate::transport::{HttpRequest, HttpResponse, HttpTransport, Method};

/// Per-request options
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
    pub query: Vec<(String, String)>,
    /// Page the request was issued from; becomes the login redirect target
    pub origin: Option<String>,
    /// Attempt a token refresh + replay on 401
    pub refresh_on_unauthorized: bool,
    pub(crate) retried: bool,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            method: Method::Get,
            body: None,
            headers: Vec::new(),
            query: Vec::new(),
            origin: None,
            refresh_on_unauthorized: true,
            retried: false,
        }
    }
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Option<Value>) -> Self {
        Self { method: Method::Post, body, ..Self::default() }
    }

    pub fn put(body: Value) -> Self {
        Self { method: Method::Put, body: Some(body), ..Self::default() }
    }

    pub fn patch(body: Value) -> Self {
        Self { method: Method::Patch, body: Some(body), ..Self::default() }
    }

    pub fn delete() -> Self {
        Self { method: Method::Delete, ..Self::default() }
    }

    pub fn with_query(mut self, query: Vec<(String, String)>) -> Self {
        self.query.extend(query);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn from_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Surface 401 as-is (login / register / refresh itself)
    pub fn without_refresh(mut self) -> Self {
        self.refresh_on_unauthorized = false;
        self
    }
}

/// Serialize a request payload
pub fn json_body<B: Serialize>(body: &B) -> Result<Value, ApiError> {
    serde_json::to_value(body).map_err(|e| ApiError::Validation(format!("Failed to encode request body: {}", e)))
}

pub struct ApiClient {
    base_url: String,
    transport: Arc<dyn HttpTransport>,
    session: Arc<SessionManager>,
    /// Serializes token refreshes
    pub(crate) refresh_lock: Mutex<()>,
    /// Page the UI is currently on, fallback for `RequestOptions::origin`
    origin: RwLock<Option<String>>,
}

impl ApiClient {
    pub fn new(
        config: &ClientConfig,
        transport: Arc<dyn HttpTransport>,
        session: Arc<SessionManager>,
    ) -> Result<Self, ApiError> {
        url::Url::parse(&config.api_url)
            .map_err(|e| ApiError::Validation(format!("Invalid API URL '{}': {}", config.api_url, e)))?;

        Ok(Self {
            base_url: config.api_url.trim_end_matches('/').to_string(),
            transport,
            session,
            refresh_lock: Mutex::new(()),
            origin: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    /// Record the page the UI navigated to
    pub fn set_origin(&self, origin: Option<String>) {
        if let Ok(mut current) = self.origin.write() {
            *current = origin;
        }
    }

    pub(crate) fn current_origin(&self) -> Option<String> {
        self.origin.read().ok().and_then(|o| o.clone())
    }

    /// Absolute URL for an endpoint; a missing leading slash is added
    pub fn url_for(&self, endpoint: &str, query: &[(String, String)]) -> String {
        let mut url = if endpoint.starts_with('/') {
            format!("{}{}", self.base_url, endpoint)
        } else {
            format!("{}/{}", self.base_url, endpoint)
        };

        if !query.is_empty() {
            let encoded = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(query.iter())
                .finish();
            url.push(if url.contains('?') { '&' } else { '?' });
            url.push_str(&encoded);
        }
        url
    }

    // ========================================================================
    // Requests
    // ========================================================================

    /// Issue a request and decode the JSON body as `T`
    pub async fn request<T: DeserializeOwned>(&self, endpoint: &str, options: RequestOptions) -> Result<T, ApiError> {
        let response = self.execute(endpoint, options).await?;
        decode(response)
    }

    pub async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.request(endpoint, RequestOptions::get()).await
    }

    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: Vec<(String, String)>,
    ) -> Result<T, ApiError> {
        self.request(endpoint, RequestOptions::get().with_query(query)).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, endpoint: &str, body: &B) -> Result<T, ApiError> {
        self.request(endpoint, RequestOptions::post(Some(json_body(body)?))).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(&self, endpoint: &str, body: &B) -> Result<T, ApiError> {
        self.request(endpoint, RequestOptions::put(json_body(body)?)).await
    }

    pub async fn patch<T: DeserializeOwned, B: Serialize>(&self, endpoint: &str, body: &B) -> Result<T, ApiError> {
        self.request(endpoint, RequestOptions::patch(json_body(body)?)).await
    }

    pub async fn delete(&self, endpoint: &str) -> Result<(), ApiError> {
        self.request::<Value>(endpoint, RequestOptions::delete()).await.map(|_| ())
    }

    /// One round trip with the given bearer credential, no 401 handling
    pub(crate) async fn send_once(
        &self,
        endpoint: &str,
        options: &RequestOptions,
        bearer: Option<String>,
    ) -> Result<HttpResponse, ApiError> {
        let mut headers = Vec::with_capacity(options.headers.len() + 2);
        if let Some(token) = bearer {
            headers.push(("Authorization".to_string(), format!("Bearer {}", token)));
        }
        if !options.headers.iter().any(|(k, _)| k.eq_ignore_ascii_case("content-type")) {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        headers.extend(options.headers.iter().cloned());

        let request = HttpRequest {
            request_id: Uuid::new_v4(),
            method: options.method,
            url: self.url_for(endpoint, &options.query),
            headers,
            body: options.body.as_ref().map(|b| b.to_string()),
        };

        debug!("[{}] -> {} {}", request.request_id, request.method.as_str(), request.url);
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            debug!("{} {} failed with {}", options.method.as_str(), endpoint, response.status);
        }
        Ok(response)
    }
}

/// 2xx -> JSON body as `T` (an empty body reads as `null`); otherwise ApiError::Http
pub(crate) fn decode<T: DeserializeOwned>(response: HttpResponse) -> Result<T, ApiError> {
    if !response.is_success() {
        return Err(ApiError::from_response(response.status, &response.body));
    }
    let body = if response.body.trim().is_empty() { "null" } else { response.body.as_str() };
    serde_json::from_str(body).map_err(|e| ApiError::Decode(e.to_string()))
}
