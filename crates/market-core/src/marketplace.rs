//! ============================================================================
//! Marketplace - The application's state container
//! ============================================================================
//! Owns the shared ApiClient (and through it the session) plus one
//! instance of every store. Construct once per application instance and
//! pass it by reference; nothing here is a process-wide singleton.
//! ============================================================================

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::broadcast;
use tracing::info;

use crate::client::ApiClient;
use crate::config::ClientConfig;
use crate::db::SessionDb;
use crate::session::{SessionEvent, SessionManager};
use crate::store::{AuthStore, FavoriteStore, OrderStore, PromptStore, ReviewStore, WalletStore};
use crate::transport::{HttpTransport, ReqwestTransport};

pub struct Marketplace {
    config: ClientConfig,
    client: Arc<ApiClient>,
    auth: Arc<AuthStore>,
    prompts: PromptStore,
    orders: OrderStore,
    favorites: FavoriteStore,
    reviews: ReviewStore,
    wallet: WalletStore,
}

impl Marketplace {
    /// Production wiring: reqwest transport, session database at
    /// `config.db_path` (or the default location)
    pub fn new(config: ClientConfig) -> Result<Self> {
        let db = SessionDb::open(config.db_path.as_deref())?;
        Self::with_parts(config, Arc::new(ReqwestTransport::new()), db)
    }

    /// Wire the stores over a custom transport and session database
    pub fn with_parts(config: ClientConfig, transport: Arc<dyn HttpTransport>, db: SessionDb) -> Result<Self> {
        let session = Arc::new(SessionManager::new(db, &config));
        let client = Arc::new(ApiClient::new(&config, transport, session)?);
        let auth = Arc::new(AuthStore::new(client.clone()));

        info!("Marketplace client ready (api: {})", client.base_url());

        Ok(Self {
            prompts: PromptStore::new(client.clone(), config.page_size),
            orders: OrderStore::new(client.clone()),
            favorites: FavoriteStore::new(client.clone()),
            reviews: ReviewStore::new(client.clone()),
            wallet: WalletStore::new(client.clone(), auth.clone()),
            auth,
            client,
            config,
        })
    }

    /// Rehydrate the session from durable storage; adopts the profile's
    /// wallet address when one is saved
    pub async fn restore(&self) -> bool {
        let restored = self.auth.restore().await;
        if restored {
            self.wallet.sync_from_profile().await;
        }
        restored
    }

    /// Sign out and drop everything cached for the signed-in user, so the
    /// next account starts from empty stores. The prompt catalog is shared
    /// and stays cached.
    pub async fn logout(&self) {
        self.auth.logout().await;
        self.clear_user_data().await;
    }

    /// Reset the per-user stores. Call this on `SessionEvent::Expired` too.
    pub async fn clear_user_data(&self) {
        self.orders.reset().await;
        self.favorites.reset().await;
        self.reviews.reset().await;
        self.wallet.reset().await;
        info!("Cleared cached user data");
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        self.client.session()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session().subscribe()
    }

    pub fn auth(&self) -> &AuthStore {
        &self.auth
    }

    pub fn prompts(&self) -> &PromptStore {
        &self.prompts
    }

    pub fn orders(&self) -> &OrderStore {
        &self.orders
    }

    pub fn favorites(&self) -> &FavoriteStore {
        &self.favorites
    }

    pub fn reviews(&self) -> &ReviewStore {
        &self.reviews
    }

    pub fn wallet(&self) -> &WalletStore {
        &self.wallet
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sol::test_address;
    use crate::testing::{user_json, StubTransport, TEST_API};
    use crate::transport::Method;
    use serde_json::json;

    #[tokio::test]
    async fn test_stores_share_one_session() {
        let stub = StubTransport::new();
        stub.on(
            Method::Post,
            "/auth/login",
            200,
            json!({"access_token": "t1", "refresh_token": "r1", "user": user_json(1)}),
        );
        stub.on(Method::Get, "/orders", 200, json!({"items": []}));
        let market =
            Marketplace::with_parts(ClientConfig::for_api(TEST_API), stub.clone(), SessionDb::in_memory().unwrap())
                .unwrap();

        assert!(market.auth().login("a@b.com", "x").await);
        market.orders().fetch_orders().await;
        assert_eq!(stub.requests_to(Method::Get, "/orders")[0].header("Authorization"), Some("Bearer t1"));
    }

    #[tokio::test]
    async fn test_restore_adopts_profile_wallet() {
        let dir = tempfile::tempdir().unwrap();
        let config = ClientConfig {
            db_path: Some(dir.path().join("session.redb")),
            ..ClientConfig::for_api(TEST_API)
        };
        let mut profile = user_json(1);
        profile["wallet_address"] = json!(test_address(3));
        let stub = StubTransport::new();
        stub.on(
            Method::Post,
            "/auth/login",
            200,
            json!({"access_token": "t1", "refresh_token": "r1", "user": profile}),
        );

        {
            let db = SessionDb::open(config.db_path.as_deref()).unwrap();
            let market = Marketplace::with_parts(config.clone(), stub.clone(), db).unwrap();
            assert!(market.auth().login("a@b.com", "x").await);
        }

        let db = SessionDb::open(config.db_path.as_deref()).unwrap();
        let market = Marketplace::with_parts(config, stub.clone(), db).unwrap();
        assert!(market.restore().await);
        assert_eq!(market.wallet().state().await.wallet_address, Some(test_address(3)));
    }

    #[tokio::test]
    async fn test_logout_drops_previous_user_data() {
        let mut profile = user_json(1);
        profile["wallet_address"] = json!(test_address(3));
        let stub = StubTransport::new();
        stub.on(
            Method::Post,
            "/auth/login",
            200,
            json!({"access_token": "t1", "refresh_token": "r1", "user": profile}),
        );
        stub.on(
            Method::Get,
            "/orders",
            200,
            json!({"items": [{"id": 42, "prompt_id": 7, "amount": 9.5, "status": "completed"}]}),
        );
        stub.on(
            Method::Get,
            "/favorites",
            200,
            json!({"items": [{"id": 7, "title": "Prompt 7", "description": "", "price": 4.5}]}),
        );
        stub.on(Method::Get, "/reviews/check-purchase/7", 200, json!(true));
        stub.on(Method::Put, "/users/wallet", 200, json!({}));
        stub.on(Method::Get, "/wallet/balance", 200, json!({"balance": 3.0}));
        let market =
            Marketplace::with_parts(ClientConfig::for_api(TEST_API), stub.clone(), SessionDb::in_memory().unwrap())
                .unwrap();

        assert!(market.auth().login("a@b.com", "x").await);
        market.orders().fetch_orders().await;
        market.favorites().fetch_favorites().await;
        assert!(market.reviews().check_purchase_status(7).await);
        assert!(market.wallet().connect_wallet(&test_address(3)).await);
        assert_eq!(market.orders().state().await.orders.len(), 1);
        assert!(market.favorites().is_favorited(7).await);

        market.logout().await;

        assert!(!market.session().is_authenticated().await);
        assert!(market.orders().state().await.orders.is_empty());
        assert!(!market.favorites().is_favorited(7).await);
        assert!(!market.reviews().state().await.has_review_permission);
        let wallet = market.wallet().state().await;
        assert!(wallet.wallet_address.is_none());
        assert!(wallet.balance.is_none());
    }

    #[test]
    fn test_invalid_api_url() {
        let result = Marketplace::with_parts(
            ClientConfig::for_api("::nope::"),
            StubTransport::new(),
            SessionDb::in_memory().unwrap(),
        );
        assert!(result.is_err());
    }
}
