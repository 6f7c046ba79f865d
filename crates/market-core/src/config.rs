// ============================================================================
// ClientConfig - Environment-provided client settings
// ============================================================================
// Every field has a default; env vars override:
//   MARKET_API_URL                    base URL of the REST API
//   MARKET_TOKEN_EXPIRE_MINUTES       access token lifetime (minutes)
//   MARKET_REFRESH_TOKEN_EXPIRE_DAYS  refresh token lifetime (days)
//   MARKET_DB_PATH                    persisted session database
//   MARKET_LOGIN_PATH                 page the UI redirects to on expiry
//   MARKET_PAGE_SIZE                  default list page size
// ============================================================================

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

pub const DEFAULT_API_URL: &str = "http://localhost:8000/api/v1";
pub const DEFAULT_ACCESS_TTL_MINUTES: i64 = 30;
pub const DEFAULT_REFRESH_TTL_DAYS: i64 = 7;
pub const DEFAULT_PAGE_SIZE: u32 = 12;
pub const DEFAULT_LOGIN_PATH: &str = "/login";

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub api_url: String,
    pub access_token_ttl_minutes: i64,
    pub refresh_token_ttl_days: i64,
    /// None = ~/.prompt-market/session.redb
    pub db_path: Option<PathBuf>,
    pub login_path: String,
    pub page_size: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: std::env::var("MARKET_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            access_token_ttl_minutes: env_number("MARKET_TOKEN_EXPIRE_MINUTES", DEFAULT_ACCESS_TTL_MINUTES),
            refresh_token_ttl_days: env_number("MARKET_REFRESH_TOKEN_EXPIRE_DAYS", DEFAULT_REFRESH_TTL_DAYS),
            db_path: std::env::var("MARKET_DB_PATH").ok().map(PathBuf::from),
            login_path: std::env::var("MARKET_LOGIN_PATH")
                .unwrap_or_else(|_| DEFAULT_LOGIN_PATH.to_string()),
            page_size: env_number("MARKET_PAGE_SIZE", DEFAULT_PAGE_SIZE),
        }
    }
}

impl ClientConfig {
    /// Config pointing at the given API, all other fields at their built-in
    /// defaults (environment ignored)
    pub fn for_api(api_url: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            access_token_ttl_minutes: DEFAULT_ACCESS_TTL_MINUTES,
            refresh_token_ttl_days: DEFAULT_REFRESH_TTL_DAYS,
            db_path: None,
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn access_ttl_secs(&self) -> i64 {
        self.access_token_ttl_minutes.max(0).saturating_mul(60)
    }

    pub fn refresh_ttl_secs(&self) -> i64 {
        self.refresh_token_ttl_days.max(0).saturating_mul(24 * 60 * 60)
    }
}

fn env_number<T: FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => parse_or(key, &raw, default),
        Err(_) => default,
    }
}

fn parse_or<T: FromStr + Copy + std::fmt::Display>(key: &str, raw: &str, default: T) -> T {
    match raw.trim().parse::<T>() {
        Ok(v) => v,
        Err(_) => {
            warn!("Ignoring invalid {}='{}', using {}", key, raw, default);
            default
        }
    }
}
