//! ============================================================================
//! Database Types - Serializable records for redb storage
//! ============================================================================

use serde::{Deserialize, Serialize};

use crate::types::UserProfile;

/// Which credential a stored token is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn key(&self) -> &'static str {
        match self {
            TokenKind::Access => "tokens:access",
            TokenKind::Refresh => "tokens:refresh",
        }
    }
}

/// A credential with its own expiry (unix seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredToken {
    pub value: String,
    pub expires_at: i64,
}

impl StoredToken {
    pub fn new(value: impl Into<String>, ttl_secs: i64) -> Self {
        Self {
            value: value.into(),
            expires_at: chrono::Utc::now().timestamp().saturating_add(ttl_secs),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.expires_at <= chrono::Utc::now().timestamp()
    }
}

/// The restorable, non-credential part of the session.
/// Tokens are deliberately stored apart from this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PersistedAuth {
    pub user: Option<UserProfile>,
    pub is_authenticated: bool,
}

/// What the database currently holds, for inspection tooling
#[derive(Debug, Clone, Serialize)]
pub struct DbStats {
    pub has_access_token: bool,
    pub access_expires_at: Option<i64>,
    pub has_refresh_token: bool,
    pub refresh_expires_at: Option<i64>,
    pub persisted_user: Option<String>,
    pub is_authenticated: bool,
}
