//! ============================================================================
//! Session Manager - Identity, credentials and their persistence
//! ============================================================================
//! The one owner of the session. Every other component reads it; only
//! login/register (establish), refresh (rotate), profile updates and
//! logout/expiry (clear) write it.
//!
//! ## Serialization boundary
//! - tokens: two SessionDb entries, each with its own expiry
//! - { user, is_authenticated }: one SessionDb record, no credentials
//! - everything else (loading flags, caches) is memory-only
//!
//! `restore()` is the only rehydration entrypoint.
//! ============================================================================

use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::db::{PersistedAuth, SessionDb, StoredToken, TokenKind};
use crate::types::{TokenPair, UserProfile};

const EVENT_CAPACITY: usize = 32;

/// In-memory session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub user: Option<UserProfile>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub is_authenticated: bool,
}

/// Session lifecycle notifications for the UI layer
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Established { user_id: i64 },
    Refreshed,
    UserUpdated,
    Cleared,
    /// Refresh failed; the UI should navigate to `redirect`
    Expired { redirect: String },
}

pub struct SessionManager {
    state: RwLock<Session>,
    db: SessionDb,
    access_ttl_secs: i64,
    refresh_ttl_secs: i64,
    login_path: String,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new(db: SessionDb, config: &ClientConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            state: RwLock::new(Session::default()),
            db,
            access_ttl_secs: config.access_ttl_secs(),
            refresh_ttl_secs: config.refresh_ttl_secs(),
            login_path: config.login_path.clone(),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn db(&self) -> &SessionDb {
        &self.db
    }

    pub async fn snapshot(&self) -> Session {
        self.state.read().await.clone()
    }

    pub async fn access_token(&self) -> Option<String> {
        self.state.read().await.access_token.clone()
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.state.read().await.refresh_token.clone()
    }

    pub async fn user(&self) -> Option<UserProfile> {
        self.state.read().await.user.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.read().await.is_authenticated
    }

    // ========================================================================
    // Transitions
    // ========================================================================

    /// anonymous -> authenticated (login / register)
    pub async fn establish(&self, user: UserProfile, tokens: TokenPair) {
        let user_id = user.id;
        {
            let mut state = self.state.write().await;
            *state = Session {
                user: Some(user.clone()),
                access_token: Some(tokens.access_token.clone()),
                refresh_token: tokens.refresh_token.clone(),
                is_authenticated: true,
            };
            self.persist_tokens(&tokens, true);
            self.persist_auth(&PersistedAuth { user: Some(user), is_authenticated: true });
        }
        info!("Session established for user {}", user_id);
        let _ = self.events.send(SessionEvent::Established { user_id });
    }

    /// authenticated -> authenticated with rotated credentials.
    /// Applied only while the session still holds `sent_refresh`, the
    /// refresh token the new pair was minted from; a logout or a new
    /// sign-in during the refresh drops the pair. A missing refresh token
    /// in `tokens` keeps the current one.
    pub async fn rotate(&self, sent_refresh: &str, tokens: TokenPair) -> bool {
        {
            let mut state = self.state.write().await;
            if !state.is_authenticated || state.refresh_token.as_deref() != Some(sent_refresh) {
                debug!("Session changed during refresh, dropping rotated tokens");
                return false;
            }
            state.access_token = Some(tokens.access_token.clone());
            if tokens.refresh_token.is_some() {
                state.refresh_token = tokens.refresh_token.clone();
            }
            self.persist_tokens(&tokens, false);
        }
        debug!("Session tokens rotated");
        let _ = self.events.send(SessionEvent::Refreshed);
        true
    }

    /// Replace the profile (profile update, wallet update, /auth/me)
    pub async fn set_user(&self, user: UserProfile) {
        {
            let mut state = self.state.write().await;
            state.user = Some(user.clone());
            let is_authenticated = state.is_authenticated;
            self.persist_auth(&PersistedAuth { user: Some(user), is_authenticated });
        }
        let _ = self.events.send(SessionEvent::UserUpdated);
    }

    /// authenticated -> anonymous. Removes both credentials and the auth record.
    pub async fn clear(&self) {
        {
            let mut state = self.state.write().await;
            self.wipe(&mut state);
        }
        info!("Session cleared");
        let _ = self.events.send(SessionEvent::Cleared);
    }

    /// Forced logout after an irrecoverable refresh failure.
    /// Only a session still holding `failed_access` is expired, so one
    /// failure yields one redirect and a session that was signed out (or
    /// replaced) meanwhile is left alone. Returns the login redirect the
    /// UI should follow.
    pub async fn expire(&self, failed_access: &str, origin: Option<&str>) -> Option<String> {
        {
            let mut state = self.state.write().await;
            if state.access_token.as_deref() != Some(failed_access) {
                debug!("Session already changed, not expiring");
                return None;
            }
            self.wipe(&mut state);
        }
        info!("Session cleared");
        let _ = self.events.send(SessionEvent::Cleared);

        let redirect = self.login_redirect(origin);
        warn!("Session expired, redirecting to {}", redirect);
        let _ = self.events.send(SessionEvent::Expired { redirect: redirect.clone() });
        Some(redirect)
    }

    /// `/login?redirect=<origin>` (or the bare login path without an origin)
    pub fn login_redirect(&self, origin: Option<&str>) -> String {
        match origin.filter(|o| !o.is_empty()) {
            Some(origin) => format!("{}?redirect={}", self.login_path, urlencoding::encode(origin)),
            None => self.login_path.clone(),
        }
    }

    /// Rebuild the authenticated state from durable storage.
    /// Needs a persisted user and both unexpired tokens; otherwise the
    /// session stays anonymous. Never writes to storage.
    pub async fn restore(&self) -> bool {
        let access = self.read_live_token(TokenKind::Access);
        let refresh = self.read_live_token(TokenKind::Refresh);
        let persisted = match self.db.get_auth() {
            Ok(auth) => auth,
            Err(e) => {
                warn!("Error restoring auth state: {}", e);
                None
            }
        };

        match (persisted.and_then(|p| p.user), access, refresh) {
            (Some(user), Some(access), Some(refresh)) => {
                let user_id = user.id;
                *self.state.write().await = Session {
                    user: Some(user),
                    access_token: Some(access.value),
                    refresh_token: Some(refresh.value),
                    is_authenticated: true,
                };
                info!("Restored session for user {}", user_id);
                true
            }
            _ => {
                debug!("No restorable session");
                false
            }
        }
    }

    // ========================================================================
    // Persistence helpers (failures are logged, never fatal)
    // ========================================================================

    /// Reset `state` and durable storage under the caller's write lock
    fn wipe(&self, state: &mut Session) {
        *state = Session::default();
        if let Err(e) = self.db.clear_tokens() {
            warn!("Failed to clear persisted tokens: {}", e);
        }
        if let Err(e) = self.db.delete_auth() {
            warn!("Failed to clear persisted auth state: {}", e);
        }
    }

    fn read_live_token(&self, kind: TokenKind) -> Option<StoredToken> {
        match self.db.get_token_raw(kind) {
            Ok(token) => token.filter(|t| !t.is_expired()),
            Err(e) => {
                warn!("Failed to read {:?} token: {}", kind, e);
                None
            }
        }
    }

    fn persist_tokens(&self, tokens: &TokenPair, replace_refresh: bool) {
        let access = StoredToken::new(tokens.access_token.clone(), self.access_ttl_secs);
        if let Err(e) = self.db.store_token(TokenKind::Access, &access) {
            warn!("Failed to persist access token: {}", e);
        }

        let result = match &tokens.refresh_token {
            Some(refresh) => self
                .db
                .store_token(TokenKind::Refresh, &StoredToken::new(refresh.clone(), self.refresh_ttl_secs)),
            None if replace_refresh => self.db.delete_token(TokenKind::Refresh).map(|_| ()),
            None => Ok(()),
        };
        if let Err(e) = result {
            warn!("Failed to persist refresh token: {}", e);
        }
    }

    fn persist_auth(&self, auth: &PersistedAuth) {
        if let Err(e) = self.db.store_auth(auth) {
            warn!("Failed to persist auth state: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::user;

    fn manager_with(db: SessionDb) -> SessionManager {
        SessionManager::new(db, &ClientConfig::for_api("http://api.test"))
    }

    fn pair(access: &str, refresh: Option<&str>) -> TokenPair {
        TokenPair {
            access_token: access.to_string(),
            refresh_token: refresh.map(String::from),
        }
    }

    #[tokio::test]
    async fn test_establish_persists_tokens_and_user() {
        let manager = manager_with(SessionDb::in_memory().unwrap());
        manager.establish(user(1), pair("t1", Some("r1"))).await;

        let session = manager.snapshot().await;
        assert!(session.is_authenticated);
        assert_eq!(session.access_token.as_deref(), Some("t1"));

        let db = manager.db();
        assert_eq!(db.get_token(TokenKind::Access).unwrap().unwrap().value, "t1");
        assert_eq!(db.get_token(TokenKind::Refresh).unwrap().unwrap().value, "r1");
        let auth = db.get_auth().unwrap().unwrap();
        assert!(auth.is_authenticated);
        assert_eq!(auth.user.unwrap().id, 1);
    }

    #[tokio::test]
    async fn test_token_expirations_are_independent() {
        let manager = manager_with(SessionDb::in_memory().unwrap());
        manager.establish(user(1), pair("t1", Some("r1"))).await;

        let now = chrono::Utc::now().timestamp();
        let access = manager.db().get_token_raw(TokenKind::Access).unwrap().unwrap();
        let refresh = manager.db().get_token_raw(TokenKind::Refresh).unwrap().unwrap();
        assert!((access.expires_at - (now + 30 * 60)).abs() <= 2);
        assert!((refresh.expires_at - (now + 7 * 24 * 3600)).abs() <= 2);
    }

    #[tokio::test]
    async fn test_clear_removes_durable_state() {
        let manager = manager_with(SessionDb::in_memory().unwrap());
        let mut events = manager.subscribe();
        manager.establish(user(1), pair("t1", Some("r1"))).await;
        manager.clear().await;

        assert_eq!(manager.snapshot().await, Session::default());
        assert!(manager.db().get_token(TokenKind::Access).unwrap().is_none());
        assert!(manager.db().get_token(TokenKind::Refresh).unwrap().is_none());
        assert!(manager.db().get_auth().unwrap().is_none());

        assert_eq!(events.recv().await.unwrap(), SessionEvent::Established { user_id: 1 });
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Cleared);
    }

    #[tokio::test]
    async fn test_rotate_keeps_refresh_when_absent() {
        let manager = manager_with(SessionDb::in_memory().unwrap());
        manager.establish(user(1), pair("t1", Some("r1"))).await;
        assert!(manager.rotate("r1", pair("t2", None)).await);

        let session = manager.snapshot().await;
        assert_eq!(session.access_token.as_deref(), Some("t2"));
        assert_eq!(session.refresh_token.as_deref(), Some("r1"));
        assert_eq!(manager.db().get_token(TokenKind::Refresh).unwrap().unwrap().value, "r1");
    }

    #[tokio::test]
    async fn test_restore_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.redb");

        let before = {
            let manager = manager_with(SessionDb::open(Some(&path)).unwrap());
            manager.establish(user(7), pair("t1", Some("r1"))).await;
            manager.snapshot().await
        };

        let manager = manager_with(SessionDb::open(Some(&path)).unwrap());
        assert!(!manager.is_authenticated().await);
        assert!(manager.restore().await);
        let after = manager.snapshot().await;
        assert_eq!(after.user, before.user);
        assert_eq!(after.is_authenticated, before.is_authenticated);
        assert_eq!(after.access_token.as_deref(), Some("t1"));

        // idempotent
        assert!(manager.restore().await);
        assert_eq!(manager.snapshot().await, after);
    }

    #[tokio::test]
    async fn test_restore_with_expired_token_stays_anonymous() {
        let db = SessionDb::in_memory().unwrap();
        db.store_auth(&PersistedAuth { user: Some(user(1)), is_authenticated: true }).unwrap();
        db.store_token(TokenKind::Refresh, &StoredToken::new("r1", 3600)).unwrap();
        db.store_token(
            TokenKind::Access,
            &StoredToken { value: "t1".into(), expires_at: chrono::Utc::now().timestamp() - 10 },
        )
        .unwrap();

        let manager = manager_with(db);
        assert!(!manager.restore().await);
        assert_eq!(manager.snapshot().await, Session::default());
        // restore never writes: the expired entry is still there
        assert!(manager.db().get_token_raw(TokenKind::Access).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_restore_without_user_record() {
        let db = SessionDb::in_memory().unwrap();
        db.store_token(TokenKind::Access, &StoredToken::new("t1", 60)).unwrap();
        db.store_token(TokenKind::Refresh, &StoredToken::new("r1", 60)).unwrap();
        let manager = manager_with(db);
        assert!(!manager.restore().await);
    }

    #[tokio::test]
    async fn test_expire_emits_redirect() {
        let manager = manager_with(SessionDb::in_memory().unwrap());
        manager.establish(user(1), pair("t1", Some("r1"))).await;
        let mut events = manager.subscribe();

        let redirect = manager.expire("t1", Some("/prompts/9")).await.unwrap();
        assert_eq!(redirect, "/login?redirect=%2Fprompts%2F9");
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Cleared);
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Expired { redirect });
        assert!(!manager.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_rotate_dropped_after_logout() {
        let manager = manager_with(SessionDb::in_memory().unwrap());
        manager.establish(user(1), pair("t1", Some("r1"))).await;
        manager.clear().await;

        assert!(!manager.rotate("r1", pair("t2", Some("r2"))).await);
        assert_eq!(manager.snapshot().await, Session::default());
        assert!(manager.db().get_token(TokenKind::Access).unwrap().is_none());
        assert!(manager.db().get_token(TokenKind::Refresh).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rotate_dropped_after_new_sign_in() {
        let manager = manager_with(SessionDb::in_memory().unwrap());
        manager.establish(user(1), pair("t1", Some("r1"))).await;
        manager.establish(user(2), pair("u1", Some("s1"))).await;

        assert!(!manager.rotate("r1", pair("t2", Some("r2"))).await);
        let session = manager.snapshot().await;
        assert_eq!(session.access_token.as_deref(), Some("u1"));
        assert_eq!(manager.db().get_token(TokenKind::Refresh).unwrap().unwrap().value, "s1");
    }

    #[tokio::test]
    async fn test_expire_ignores_changed_session() {
        let manager = manager_with(SessionDb::in_memory().unwrap());
        manager.establish(user(2), pair("u1", Some("s1"))).await;
        let mut events = manager.subscribe();

        assert!(manager.expire("t1", Some("/orders")).await.is_none());
        assert!(manager.is_authenticated().await);
        assert!(events.try_recv().is_err());

        manager.clear().await;
        assert!(manager.expire("u1", None).await.is_none());
        assert_eq!(events.recv().await.unwrap(), SessionEvent::Cleared);
        assert!(events.try_recv().is_err());
    }

    #[test]
    fn test_login_redirect_without_origin() {
        let manager = manager_with(SessionDb::in_memory().unwrap());
        assert_eq!(manager.login_redirect(None), "/login");
        assert_eq!(manager.login_redirect(Some("")), "/login");
    }

    #[tokio::test]
    async fn test_set_user_persists_profile() {
        let manager = manager_with(SessionDb::in_memory().unwrap());
        manager.establish(user(1), pair("t1", Some("r1"))).await;

        let mut updated = user(1);
        updated.wallet_address = Some("9xQeWvG816bUx9EPjHmaT23yvVM2ZWbrrpZb9PusVFin".into());
        manager.set_user(updated.clone()).await;

        assert_eq!(manager.user().await, Some(updated.clone()));
        assert_eq!(manager.db().get_auth().unwrap().unwrap().user, Some(updated));
    }
}
