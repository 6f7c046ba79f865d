// ============================================================================
// SessionDb - Embedded Database (redb)
// ============================================================================
// Durable client state: the two credentials (each with its own expiry) and
// the restorable { user, is_authenticated } record.
// Default path: ~/.prompt-market/session.redb (override via MARKET_DB_PATH)
// ============================================================================

pub mod types;

pub use types::{DbStats, PersistedAuth, StoredToken, TokenKind};

use anyhow::{anyhow, Result};
use redb::backends::InMemoryBackend;
use redb::{Database, TableDefinition};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

type RecordTable = TableDefinition<'static, &'static str, &'static [u8]>;

// Table definitions
const TOKENS: RecordTable = TableDefinition::new("tokens");
const AUTH: RecordTable = TableDefinition::new("auth");

const AUTH_KEY: &str = "auth:state";

/// Embedded database for the persisted session
pub struct SessionDb {
    db: Database,
    path: Option<PathBuf>,
}

impl SessionDb {
    /// Open (or create) the database at the given path.
    /// If `path` is None, uses ~/.prompt-market/session.redb
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let db_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
                home.join(".prompt-market").join("session.redb")
            }
        };

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| anyhow!("Failed to create {}: {}", parent.display(), e))?;
        }

        info!("Opening session database at: {}", db_path.display());

        let db = Database::create(&db_path).map_err(|e| anyhow!("Failed to open database: {}", e))?;
        let session_db = Self { db, path: Some(db_path) };
        session_db.ensure_tables()?;
        Ok(session_db)
    }

    /// Memory-only database; nothing survives the process
    pub fn in_memory() -> Result<Self> {
        let db = Database::builder()
            .create_with_backend(InMemoryBackend::new())
            .map_err(|e| anyhow!("Failed to create in-memory database: {}", e))?;
        let session_db = Self { db, path: None };
        session_db.ensure_tables()?;
        Ok(session_db)
    }

    fn ensure_tables(&self) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let _ = write_txn.open_table(TOKENS).map_err(|e| anyhow!("Failed to create tokens table: {}", e))?;
            let _ = write_txn.open_table(AUTH).map_err(|e| anyhow!("Failed to create auth table: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit init: {}", e))?;
        Ok(())
    }

    /// Database file path (None for in-memory)
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ========================================================================
    // Raw record helpers
    // ========================================================================

    fn put(&self, table: RecordTable, key: &str, value: &[u8]) -> Result<()> {
        let write_txn = self.db.begin_write().map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let mut t = write_txn.open_table(table).map_err(|e| anyhow!("Failed to open table: {}", e))?;
            t.insert(key, value).map_err(|e| anyhow!("Failed to insert {}: {}", key, e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;
        Ok(())
    }

    fn fetch(&self, table: RecordTable, key: &str) -> Result<Option<Vec<u8>>> {
        let read_txn = self.db.begin_read().map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let t = read_txn.open_table(table).map_err(|e| anyhow!("Failed to open table: {}", e))?;
        let value = t
            .get(key)
            .map_err(|e| anyhow!("Failed to get {}: {}", key, e))?
            .map(|v| v.value().to_vec());
        Ok(value)
    }

    fn remove(&self, table: RecordTable, key: &str) -> Result<bool> {
        let write_txn = self.db.begin_write().map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        let removed;
        {
            let mut t = write_txn.open_table(table).map_err(|e| anyhow!("Failed to open table: {}", e))?;
            removed = t
                .remove(key)
                .map_err(|e| anyhow!("Failed to remove {}: {}", key, e))?
                .is_some();
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit delete: {}", e))?;
        Ok(removed)
    }

    // ========================================================================
    // Token Operations
    // ========================================================================

    pub fn store_token(&self, kind: TokenKind, token: &StoredToken) -> Result<()> {
        let value = bincode::serialize(token).map_err(|e| anyhow!("Failed to serialize token: {}", e))?;
        self.put(TOKENS, kind.key(), &value)?;
        debug!("Stored {:?} token (expires_at {})", kind, token.expires_at);
        Ok(())
    }

    /// Stored token, regardless of expiry
    pub fn get_token_raw(&self, kind: TokenKind) -> Result<Option<StoredToken>> {
        match self.fetch(TOKENS, kind.key())? {
            Some(bytes) => {
                let token: StoredToken = bincode::deserialize(&bytes)
                    .map_err(|e| anyhow!("Failed to deserialize token: {}", e))?;
                Ok(Some(token))
            }
            None => Ok(None),
        }
    }

    /// Unexpired token. An expired entry reads as absent and is dropped.
    pub fn get_token(&self, kind: TokenKind) -> Result<Option<StoredToken>> {
        match self.get_token_raw(kind)? {
            Some(token) if token.is_expired() => {
                debug!("{:?} token expired at {}, discarding", kind, token.expires_at);
                self.remove(TOKENS, kind.key())?;
                Ok(None)
            }
            other => Ok(other),
        }
    }

    pub fn delete_token(&self, kind: TokenKind) -> Result<bool> {
        self.remove(TOKENS, kind.key())
    }

    /// Remove both credentials
    pub fn clear_tokens(&self) -> Result<()> {
        self.delete_token(TokenKind::Access)?;
        self.delete_token(TokenKind::Refresh)?;
        debug!("Cleared stored tokens");
        Ok(())
    }

    // ========================================================================
    // Auth Record Operations
    // ========================================================================

    pub fn store_auth(&self, auth: &PersistedAuth) -> Result<()> {
        let value = bincode::serialize(auth).map_err(|e| anyhow!("Failed to serialize auth state: {}", e))?;
        self.put(AUTH, AUTH_KEY, &value)?;
        debug!("Stored auth state (authenticated: {})", auth.is_authenticated);
        Ok(())
    }

    pub fn get_auth(&self) -> Result<Option<PersistedAuth>> {
        match self.fetch(AUTH, AUTH_KEY)? {
            Some(bytes) => {
                let auth: PersistedAuth = bincode::deserialize(&bytes)
                    .map_err(|e| anyhow!("Failed to deserialize auth state: {}", e))?;
                Ok(Some(auth))
            }
            None => Ok(None),
        }
    }

    pub fn delete_auth(&self) -> Result<bool> {
        self.remove(AUTH, AUTH_KEY)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn stats(&self) -> Result<DbStats> {
        let access = self.get_token_raw(TokenKind::Access)?.filter(|t| !t.is_expired());
        let refresh = self.get_token_raw(TokenKind::Refresh)?.filter(|t| !t.is_expired());
        let auth = self.get_auth()?.unwrap_or_default();

        Ok(DbStats {
            has_access_token: access.is_some(),
            access_expires_at: access.map(|t| t.expires_at),
            has_refresh_token: refresh.is_some(),
            refresh_expires_at: refresh.map(|t| t.expires_at),
            persisted_user: auth.user.map(|u| u.username),
            is_authenticated: auth.is_authenticated,
        })
    }
}
