//! ============================================================================
//! API Errors - Typed failures of the fetch boundary
//! ============================================================================
//! Every request through the ApiClient resolves to `Result<T, ApiError>`.
//! Stores catch these at their boundary and keep the Display string in
//! their `error` field.
//! ============================================================================

use serde::Deserialize;
use thiserror::Error;

/// Failure surfaced by the fetch boundary
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    /// Non-2xx response from the API
    #[error("API error ({status}): {message}")]
    Http { status: u16, message: String },

    /// The request never produced a response (connection refused, DNS, TLS...)
    #[error("Network error: {0}")]
    Transport(String),

    /// 2xx response whose body did not match the expected shape
    #[error("Invalid response from server: {0}")]
    Decode(String),

    /// Rejected client-side before dispatch
    #[error("{0}")]
    Validation(String),

    /// Operation needs a signed-in user
    #[error("Not authenticated")]
    NotAuthenticated,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
    message: Option<String>,
}

impl ApiError {
    /// Build an HTTP error from a status code and raw response body.
    /// Prefers the API's `detail` / `message` field over the raw text.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = extract_message(body).unwrap_or_else(|| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                reason_phrase(status).to_string()
            } else {
                trimmed.to_string()
            }
        });
        ApiError::Http { status, message }
    }

    /// HTTP status, when the failure came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

fn extract_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    match parsed.detail {
        Some(serde_json::Value::String(s)) => return Some(s),
        // FastAPI validation errors: [{ "msg": "...", ... }]
        Some(serde_json::Value::Array(items)) => {
            let msgs: Vec<String> = items
                .iter()
                .filter_map(|i| i.get("msg").and_then(|m| m.as_str()).map(String::from))
                .collect();
            if !msgs.is_empty() {
                return Some(msgs.join("; "));
            }
        }
        _ => {}
    }
    parsed.message
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        409 => "Conflict",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Request failed",
    }
}
